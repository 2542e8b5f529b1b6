//! Explainability: reconstructing why a decision was made.
//!
//! An [`ExplanationTrace`] is derived *purely* from the persisted
//! [`BlendedDecision`] record -- the signal scores, the literal blend
//! arithmetic, and the weights and thresholds snapshotted at evaluation
//! time. Nothing is recomputed against live configuration or the current
//! rule version, so an explanation stays stable even after rules are
//! promoted or rolled back and weights are retuned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerfuse_core::config::RouteThresholds;
use ledgerfuse_core::types::{
    BlendedDecision, RouteAction, SignalExplanation, SignalKind, SignalScore,
};

/// One signal line in a trace: the slot, its weight, its score, and a
/// rendered rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalTraceLine {
    /// Which signal slot.
    pub source: SignalKind,
    /// Weight applied at evaluation time.
    pub weight: f64,
    /// The signal's score (0.0 when missing).
    pub score: f64,
    /// `weight × score`.
    pub weighted: f64,
    /// Whether the signal was present.
    pub present: bool,
    /// Human-readable rationale, rendered from the persisted explanation.
    pub rationale: String,
}

/// The full reconstructed decision trace for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationTrace {
    /// Transaction the trace explains.
    pub txn_id: String,
    /// Normalized vendor key the decision keyed on.
    pub vendor_key: String,
    /// Final routing outcome.
    pub route: RouteAction,
    /// Blended score.
    pub blend_score: f64,
    /// Rule version in force at evaluation time.
    pub rule_version_id: u64,
    /// Per-signal lines in slot order (rules, ml, llm).
    pub signals: Vec<SignalTraceLine>,
    /// The blend arithmetic with literal weight×score terms.
    pub arithmetic: String,
    /// Why the score routed where it did, against the persisted thresholds.
    pub routing_reason: String,
    /// Thresholds in force at evaluation time.
    pub thresholds: RouteThresholds,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
}

fn render_rationale(signal: &SignalScore) -> String {
    match &signal.explanation {
        SignalExplanation::RuleMatch {
            rule_id,
            pattern,
            account,
        } => format!("rule #{rule_id} \"{pattern}\" posts to {account}"),
        SignalExplanation::Classifier {
            raw_probability,
            calibrated,
            top_features,
        } => {
            let mut line = format!(
                "classifier p={raw_probability:.3} ({})",
                if *calibrated {
                    "calibrated"
                } else {
                    "uncalibrated"
                }
            );
            if !top_features.is_empty() {
                let names: Vec<String> = top_features
                    .iter()
                    .take(3)
                    .map(|f| format!("{} ({:+.3})", f.name, f.weight))
                    .collect();
                line.push_str(&format!("; top features: {}", names.join(", ")));
            }
            line
        }
        SignalExplanation::Llm { rationale } => format!("llm: {rationale}"),
    }
}

fn routing_reason(decision: &BlendedDecision) -> String {
    let t = &decision.thresholds;
    let score = decision.blend_score;
    match decision.route {
        RouteAction::AutoPost => format!(
            "blend {score:.3} >= auto_post_min {:.2} -> auto_post",
            t.auto_post_min
        ),
        RouteAction::NeedsReview => format!(
            "review_min {:.2} <= blend {score:.3} < auto_post_min {:.2} -> needs_review",
            t.review_min, t.auto_post_min
        ),
        RouteAction::LlmValidation => format!(
            "llm_min {:.2} <= blend {score:.3} < review_min {:.2} and llm not consulted -> llm_validation",
            t.llm_min, t.review_min
        ),
        RouteAction::HumanReview => {
            if decision.llm_consulted && score >= t.llm_min && score < t.review_min {
                format!(
                    "blend {score:.3} in llm band but llm already consulted -> human_review",
                )
            } else {
                format!("blend {score:.3} < llm_min {:.2} -> human_review", t.llm_min)
            }
        }
    }
}

impl ExplanationTrace {
    /// Build a trace from a persisted decision record.
    ///
    /// This is a pure projection: it reads only the record.
    #[must_use]
    pub fn from_decision(decision: &BlendedDecision) -> Self {
        let signals: Vec<SignalTraceLine> = decision
            .terms
            .iter()
            .map(|term| {
                let rationale = decision
                    .signal_breakdown
                    .iter()
                    .find(|signal| signal.source == term.source)
                    .map_or_else(|| "signal missing".to_owned(), render_rationale);
                SignalTraceLine {
                    source: term.source,
                    weight: term.weight,
                    score: term.score,
                    weighted: term.weighted,
                    present: term.present,
                    rationale,
                }
            })
            .collect();

        let arithmetic = {
            let terms: Vec<String> = decision
                .terms
                .iter()
                .map(|t| format!("{:.2} x {:.3} = {:.4}", t.weight, t.score, t.weighted))
                .collect();
            format!("{} -> blend {:.3}", terms.join(" + "), decision.blend_score)
        };

        Self {
            txn_id: decision.txn_id.clone(),
            vendor_key: decision.vendor_key.as_str().to_owned(),
            route: decision.route,
            blend_score: decision.blend_score,
            rule_version_id: decision.rule_version_id,
            signals,
            arithmetic,
            routing_reason: routing_reason(decision),
            thresholds: decision.thresholds,
            timestamp: decision.timestamp,
        }
    }

    /// Render the trace as a multi-line human-readable summary for the
    /// review UI's "why" drawer.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!(
            "decision for {}: {} (blend {:.3}, rules v{})\n",
            self.txn_id, self.route, self.blend_score, self.rule_version_id
        );
        for line in &self.signals {
            out.push_str(&format!(
                "  [{}] {} x {:.3} = {:.4}  {}\n",
                line.source,
                line.weight,
                line.score,
                line.weighted,
                if line.present {
                    line.rationale.clone()
                } else {
                    "(missing; weight not redistributed)".to_owned()
                }
            ));
        }
        out.push_str(&format!("  {}\n", self.routing_reason));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerfuse_core::config::BlendWeights;
    use ledgerfuse_core::types::{BlendTerm, VendorKey};

    fn decision() -> BlendedDecision {
        BlendedDecision {
            txn_id: "txn-9".into(),
            vendor_key: VendorKey::new("github"),
            final_account: Some("Software".into()),
            blend_score: 0.93,
            route: RouteAction::AutoPost,
            rule_version_id: 4,
            signal_breakdown: vec![
                SignalScore::new(
                    SignalKind::Rules,
                    0.98,
                    SignalExplanation::RuleMatch {
                        rule_id: 7,
                        pattern: "github".into(),
                        account: "Software".into(),
                    },
                ),
                SignalScore::new(
                    SignalKind::Ml,
                    0.91,
                    SignalExplanation::Classifier {
                        raw_probability: 0.94,
                        calibrated: true,
                        top_features: vec![],
                    },
                ),
            ],
            terms: vec![
                BlendTerm {
                    source: SignalKind::Rules,
                    weight: 0.55,
                    score: 0.98,
                    weighted: 0.539,
                    present: true,
                },
                BlendTerm {
                    source: SignalKind::Ml,
                    weight: 0.35,
                    score: 0.91,
                    weighted: 0.3185,
                    present: true,
                },
                BlendTerm {
                    source: SignalKind::Llm,
                    weight: 0.10,
                    score: 0.0,
                    weighted: 0.0,
                    present: false,
                },
            ],
            weights: BlendWeights::default(),
            thresholds: RouteThresholds::default(),
            llm_consulted: false,
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp"),
        }
    }

    #[test]
    fn trace_reconstructs_literal_arithmetic() {
        let trace = ExplanationTrace::from_decision(&decision());
        assert!(trace.arithmetic.contains("0.55 x 0.980 = 0.5390"));
        assert!(trace.arithmetic.contains("0.35 x 0.910 = 0.3185"));
        assert!(trace.arithmetic.contains("blend 0.930"));
    }

    #[test]
    fn trace_carries_rule_version_and_thresholds() {
        let trace = ExplanationTrace::from_decision(&decision());
        assert_eq!(trace.rule_version_id, 4);
        assert!((trace.thresholds.auto_post_min - 0.90).abs() < 1e-12);
        assert!(trace.routing_reason.contains("auto_post"));
    }

    #[test]
    fn missing_signal_is_labelled_not_redistributed() {
        let trace = ExplanationTrace::from_decision(&decision());
        let llm_line = trace
            .signals
            .iter()
            .find(|l| l.source == SignalKind::Llm)
            .expect("llm line present");
        assert!(!llm_line.present);
        let rendered = trace.render();
        assert!(rendered.contains("weight not redistributed"));
    }

    #[test]
    fn rationales_render_per_source() {
        let trace = ExplanationTrace::from_decision(&decision());
        let rules_line = &trace.signals[0];
        assert!(rules_line.rationale.contains("rule #7"));
        assert!(rules_line.rationale.contains("Software"));
        let ml_line = &trace.signals[1];
        assert!(ml_line.rationale.contains("calibrated"));
    }

    #[test]
    fn trace_is_a_pure_projection() {
        let d = decision();
        let first = ExplanationTrace::from_decision(&d);
        let second = ExplanationTrace::from_decision(&d);
        assert_eq!(first, second);
    }

    #[test]
    fn trace_serializes_for_the_review_ui() {
        let trace = ExplanationTrace::from_decision(&decision());
        let json = serde_json::to_string(&trace).expect("serialize");
        assert!(json.contains("auto_post"));
        assert!(json.contains("rule_version_id"));
        let decoded: ExplanationTrace = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded, trace);
    }
}
