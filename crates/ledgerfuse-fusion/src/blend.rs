//! Weighted multi-signal blending and threshold routing.
//!
//! Combines the rules, classifier, and LLM signals into one blended score:
//!
//! ```text
//! blend_score = w_rules * rule_score + w_ml * ml_score + w_llm * llm_score
//! ```
//!
//! Missing-signal behavior is intentional and easy to misread:
//! - A missing signal contributes `0.0` to its term.
//! - Its weight is **not** redistributed to the remaining sources.
//!
//! This penalizes under-evidenced decisions rather than inflating confidence
//! from fewer sources. With default weights, a transaction scored only by
//! rules can never exceed `0.55` -- by design it cannot auto-post on a single
//! signal. Do not "fix" this without product confirmation.
//!
//! Routing is ordered, first match wins:
//! `auto_post`, `needs_review`, `llm_validation` (only while the LLM has not
//! been consulted -- it exists solely to trigger one second pass), then
//! `human_review`.

use tracing::instrument;

use ledgerfuse_core::config::{BlendWeights, RouteThresholds};
use ledgerfuse_core::types::{BlendTerm, RouteAction, SignalKind, SignalScore};

/// The three signal slots feeding one blend.
///
/// `llm_consulted` is set by the engine once the LLM source has been asked,
/// whether or not it answered; a timed-out consultation still counts, so a
/// decision can never loop on `llm_validation`.
#[derive(Debug, Clone, Default)]
pub struct BlendInputs {
    /// Rules signal, when a rule matched.
    pub rules: Option<SignalScore>,
    /// Calibrated classifier signal.
    pub ml: Option<SignalScore>,
    /// LLM signal, when consulted and answered in time.
    pub llm: Option<SignalScore>,
    /// Whether the LLM source has been consulted for this transaction.
    pub llm_consulted: bool,
}

/// Output of one blend: the score, the route, and the literal arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendOutcome {
    /// Weighted blend score in `[0, 1]`.
    pub blend_score: f64,
    /// Routing decision.
    pub route: RouteAction,
    /// One term per signal slot, including zero terms for missing signals.
    pub terms: Vec<BlendTerm>,
    /// The signals that were actually present, in slot order.
    pub breakdown: Vec<SignalScore>,
    /// Carried through from [`BlendInputs::llm_consulted`].
    pub llm_consulted: bool,
}

fn term(weight: f64, signal: Option<&SignalScore>, source: SignalKind) -> BlendTerm {
    let (score, present) = signal.map_or((0.0, false), |s| (s.score, true));
    BlendTerm {
        source,
        weight,
        score,
        weighted: weight * score,
        present,
    }
}

/// Blend the three signal slots into a score and route.
///
/// Pure and stateless: trivially parallelizable across transactions. The
/// caller is responsible for validating `weights` (sum to 1.0) via
/// [`BlendWeights::validate`]; non-finite arithmetic is clamped defensively
/// so a bad signal can at worst zero its own term.
#[must_use]
#[instrument(
    name = "ledgerfuse::blend",
    skip(inputs, weights, thresholds),
    fields(
        rules_present = inputs.rules.is_some(),
        ml_present = inputs.ml.is_some(),
        llm_present = inputs.llm.is_some(),
        llm_consulted = inputs.llm_consulted,
    )
)]
pub fn blend(
    inputs: &BlendInputs,
    weights: &BlendWeights,
    thresholds: &RouteThresholds,
) -> BlendOutcome {
    let terms = vec![
        term(weights.rules, inputs.rules.as_ref(), SignalKind::Rules),
        term(weights.ml, inputs.ml.as_ref(), SignalKind::Ml),
        term(weights.llm, inputs.llm.as_ref(), SignalKind::Llm),
    ];

    let raw: f64 = terms.iter().map(|t| t.weighted).sum();
    let blend_score = if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let route = route_for(blend_score, thresholds, inputs.llm_consulted);

    let breakdown: Vec<SignalScore> = [&inputs.rules, &inputs.ml, &inputs.llm]
        .into_iter()
        .filter_map(|slot| slot.clone())
        .collect();

    BlendOutcome {
        blend_score,
        route,
        terms,
        breakdown,
        llm_consulted: inputs.llm_consulted,
    }
}

/// Ordered threshold routing, first match wins.
///
/// The `llm_validation` band only fires while the LLM has not been
/// consulted; afterwards scores in that band fall through to
/// `human_review`.
#[must_use]
pub fn route_for(
    blend_score: f64,
    thresholds: &RouteThresholds,
    llm_consulted: bool,
) -> RouteAction {
    if blend_score >= thresholds.auto_post_min {
        RouteAction::AutoPost
    } else if blend_score >= thresholds.review_min {
        RouteAction::NeedsReview
    } else if blend_score >= thresholds.llm_min && !llm_consulted {
        RouteAction::LlmValidation
    } else {
        RouteAction::HumanReview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerfuse_core::types::SignalExplanation;

    fn signal(kind: SignalKind, score: f64) -> SignalScore {
        let explanation = match kind {
            SignalKind::Rules => SignalExplanation::RuleMatch {
                rule_id: 1,
                pattern: "vendor".into(),
                account: "Account".into(),
            },
            SignalKind::Ml => SignalExplanation::Classifier {
                raw_probability: score,
                calibrated: true,
                top_features: vec![],
            },
            SignalKind::Llm => SignalExplanation::Llm {
                rationale: "test".into(),
            },
        };
        SignalScore::new(kind, score, explanation)
    }

    fn defaults() -> (BlendWeights, RouteThresholds) {
        (BlendWeights::default(), RouteThresholds::default())
    }

    #[test]
    fn blend_is_deterministic_with_all_signals() {
        let (weights, thresholds) = defaults();
        let inputs = BlendInputs {
            rules: Some(signal(SignalKind::Rules, 0.98)),
            ml: Some(signal(SignalKind::Ml, 0.91)),
            llm: Some(signal(SignalKind::Llm, 0.72)),
            llm_consulted: true,
        };
        let outcome = blend(&inputs, &weights, &thresholds);
        // 0.55*0.98 + 0.35*0.91 + 0.10*0.72 = 0.930
        assert!((outcome.blend_score - 0.930).abs() < 1e-9);
        assert_eq!(outcome.route, RouteAction::AutoPost);
    }

    #[test]
    fn missing_llm_weight_is_not_redistributed() {
        let (weights, thresholds) = defaults();
        let inputs = BlendInputs {
            rules: Some(signal(SignalKind::Rules, 0.80)),
            ml: Some(signal(SignalKind::Ml, 0.70)),
            llm: None,
            llm_consulted: false,
        };
        let outcome = blend(&inputs, &weights, &thresholds);
        // 0.55*0.80 + 0.35*0.70 + 0.10*0 = 0.685: below llm_min, so the
        // decision is not silently boosted -- it goes to a human.
        assert!((outcome.blend_score - 0.685).abs() < 1e-9);
        assert_eq!(outcome.route, RouteAction::HumanReview);

        let llm_term = &outcome.terms[2];
        assert!(!llm_term.present);
        assert!(llm_term.weighted.abs() < f64::EPSILON);
        assert!((llm_term.weight - 0.10).abs() < 1e-12);
    }

    #[test]
    fn llm_validation_band_triggers_second_pass_only_once() {
        let (weights, thresholds) = defaults();
        let inputs = BlendInputs {
            rules: Some(signal(SignalKind::Rules, 0.85)),
            ml: Some(signal(SignalKind::Ml, 0.72)),
            llm: None,
            llm_consulted: false,
        };
        let outcome = blend(&inputs, &weights, &thresholds);
        // 0.55*0.85 + 0.35*0.72 = 0.7195: inside [0.70, 0.75).
        assert_eq!(outcome.route, RouteAction::LlmValidation);

        // Same score after consultation falls through to human review.
        let consulted = BlendInputs {
            llm_consulted: true,
            ..inputs
        };
        let outcome = blend(&consulted, &weights, &thresholds);
        assert_eq!(outcome.route, RouteAction::HumanReview);
    }

    #[test]
    fn routing_band_edges_are_inclusive_lower() {
        let (_, thresholds) = defaults();
        assert_eq!(route_for(0.90, &thresholds, true), RouteAction::AutoPost);
        assert_eq!(route_for(0.8999, &thresholds, true), RouteAction::NeedsReview);
        assert_eq!(route_for(0.75, &thresholds, true), RouteAction::NeedsReview);
        assert_eq!(route_for(0.70, &thresholds, false), RouteAction::LlmValidation);
        assert_eq!(route_for(0.70, &thresholds, true), RouteAction::HumanReview);
        assert_eq!(route_for(0.6999, &thresholds, false), RouteAction::HumanReview);
    }

    #[test]
    fn no_signals_routes_to_human_review() {
        let (weights, thresholds) = defaults();
        let outcome = blend(&BlendInputs::default(), &weights, &thresholds);
        assert!(outcome.blend_score.abs() < f64::EPSILON);
        assert_eq!(outcome.route, RouteAction::HumanReview);
        assert!(outcome.breakdown.is_empty());
        assert_eq!(outcome.terms.len(), 3);
        assert!(outcome.terms.iter().all(|t| !t.present));
    }

    #[test]
    fn terms_record_literal_arithmetic() {
        let (weights, thresholds) = defaults();
        let inputs = BlendInputs {
            rules: Some(signal(SignalKind::Rules, 0.80)),
            ml: None,
            llm: None,
            llm_consulted: false,
        };
        let outcome = blend(&inputs, &weights, &thresholds);
        let rules_term = &outcome.terms[0];
        assert_eq!(rules_term.source, SignalKind::Rules);
        assert!((rules_term.weighted - 0.44).abs() < 1e-9);
        // The sum of the recorded terms IS the blend score.
        let sum: f64 = outcome.terms.iter().map(|t| t.weighted).sum();
        assert!((sum - outcome.blend_score).abs() < 1e-12);
    }

    proptest::proptest! {
        /// The blend score is always in [0, 1], equals the sum of its
        /// recorded terms, and every score lands in exactly one route band.
        #[test]
        fn blend_is_bounded_and_term_consistent(
            rule in proptest::option::of(0.0f64..=1.0),
            ml in proptest::option::of(0.0f64..=1.0),
            llm in proptest::option::of(0.0f64..=1.0),
            consulted in proptest::bool::ANY,
        ) {
            let (weights, thresholds) = defaults();
            let inputs = BlendInputs {
                rules: rule.map(|s| signal(SignalKind::Rules, s)),
                ml: ml.map(|s| signal(SignalKind::Ml, s)),
                llm: llm.map(|s| signal(SignalKind::Llm, s)),
                llm_consulted: consulted,
            };
            let outcome = blend(&inputs, &weights, &thresholds);
            proptest::prop_assert!((0.0..=1.0).contains(&outcome.blend_score));
            let sum: f64 = outcome.terms.iter().map(|t| t.weighted).sum();
            proptest::prop_assert!((sum - outcome.blend_score).abs() < 1e-12);
            proptest::prop_assert_eq!(
                outcome.route,
                route_for(outcome.blend_score, &thresholds, consulted)
            );
        }
    }

    #[test]
    fn breakdown_preserves_slot_order() {
        let (weights, thresholds) = defaults();
        let inputs = BlendInputs {
            rules: None,
            ml: Some(signal(SignalKind::Ml, 0.5)),
            llm: Some(signal(SignalKind::Llm, 0.6)),
            llm_consulted: true,
        };
        let outcome = blend(&inputs, &weights, &thresholds);
        let kinds: Vec<SignalKind> = outcome.breakdown.iter().map(|s| s.source).collect();
        assert_eq!(kinds, vec![SignalKind::Ml, SignalKind::Llm]);
    }
}
