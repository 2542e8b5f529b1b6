//! The decision engine: orchestrates one transaction evaluation end to end.
//!
//! For each transaction the engine:
//! 1. Normalizes the raw vendor string and looks it up in the active rule
//!    version (rules signal).
//! 2. Calibrates the inbound classifier probability (ML signal).
//! 3. Blends and routes. When the first pass lands in the `llm_validation`
//!    band and an LLM source is configured, the engine consults it exactly
//!    once and re-blends with the LLM slot filled and marked consulted.
//! 4. Persists the resulting [`BlendedDecision`] -- tagged with the rule
//!    version and the weights/thresholds in force -- to the decision store.
//!
//! The LLM is an optional, fallible collaborator: a timeout or error from
//! its [`SignalSource`] degrades to a missing signal (score 0, weight not
//! redistributed) and never blocks the decision. With no LLM source
//! configured, the `llm_validation` band is disabled from the start so no
//! decision can strand there.
//!
//! Operator corrections flow back through [`DecisionEngine::record_approval`],
//! which feeds the evidence ledger and registers any newly minted rule
//! candidate with the version store.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{info, instrument, warn};

use ledgerfuse_core::config::EngineConfig;
use ledgerfuse_core::error::{EngineError, EngineResult};
use ledgerfuse_core::traits::{DecisionStore, SignalSource};
use ledgerfuse_core::types::{
    BlendedDecision, RouteAction, RuleCandidate, RuleSpec, RuleVersion, SignalExplanation,
    SignalKind, SignalScore, TransactionSignals, VendorKey,
};
use ledgerfuse_core::vendor::{DefaultNormalizer, VendorNormalizer};
use ledgerfuse_fusion::blend::{BlendInputs, blend};
use ledgerfuse_fusion::calibration::{CalibrationModel, Calibrator};
use ledgerfuse_rules::evidence::EvidenceLedger;
use ledgerfuse_rules::version_store::{ImpactReport, RuleVersionStore};

use crate::decision_log::DecisionLog;
use crate::explain::ExplanationTrace;

/// The adaptive decision engine.
pub struct DecisionEngine {
    config: EngineConfig,
    normalizer: Arc<dyn VendorNormalizer>,
    rules: Arc<RuleVersionStore>,
    ledger: Arc<EvidenceLedger>,
    calibrator: RwLock<Calibrator>,
    decisions: Arc<dyn DecisionStore>,
    llm: Option<Arc<dyn SignalSource>>,
}

impl DecisionEngine {
    /// Build an engine with the given config and seed rule set.
    ///
    /// Fails fast on invalid configuration; everything else starts empty:
    /// an in-memory decision log, an unfitted calibrator, no LLM source.
    pub fn new(config: EngineConfig, initial_rules: Vec<RuleSpec>) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            normalizer: Arc::new(DefaultNormalizer),
            rules: Arc::new(RuleVersionStore::new(initial_rules, "system")),
            ledger: Arc::new(EvidenceLedger::new(config.promotion)),
            calibrator: RwLock::new(Calibrator::new(config.calibration)),
            decisions: Arc::new(DecisionLog::new()),
            llm: None,
            config,
        })
    }

    /// Attach an LLM signal source, enabling the `llm_validation` band.
    #[must_use]
    pub fn with_llm_source(mut self, source: Arc<dyn SignalSource>) -> Self {
        self.llm = Some(source);
        self
    }

    /// Replace the decision store (e.g. a database-backed implementation).
    #[must_use]
    pub fn with_decision_store(mut self, store: Arc<dyn DecisionStore>) -> Self {
        self.decisions = store;
        self
    }

    /// Replace the vendor normalizer.
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: Arc<dyn VendorNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// The engine configuration in force.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The rule version store (promotion, rollback, dry-run, history).
    #[must_use]
    pub fn rules(&self) -> &RuleVersionStore {
        &self.rules
    }

    /// The evidence ledger (conflict surfacing, stats).
    #[must_use]
    pub fn ledger(&self) -> &EvidenceLedger {
        &self.ledger
    }

    /// The decision store.
    #[must_use]
    pub fn decisions(&self) -> &dyn DecisionStore {
        self.decisions.as_ref()
    }

    /// Normalize a raw vendor descriptor with the engine's normalizer.
    #[must_use]
    pub fn normalize_vendor(&self, raw: &str) -> VendorKey {
        self.normalizer.normalize(raw)
    }

    fn rule_signal(&self, active: &RuleVersion, vendor: &VendorKey) -> Option<SignalScore> {
        active.rule_for(vendor).map(|rule| {
            SignalScore::new(
                SignalKind::Rules,
                rule.confidence,
                SignalExplanation::RuleMatch {
                    rule_id: rule.id,
                    pattern: rule.pattern.as_str().to_owned(),
                    account: rule.account.clone(),
                },
            )
        })
    }

    fn ml_signal(&self, txn: &TransactionSignals) -> SignalScore {
        let (calibrated_score, calibrated) = self
            .calibrator
            .read()
            .expect("calibrator lock poisoned")
            .transform(txn.classifier_probability);
        SignalScore::new(
            SignalKind::Ml,
            calibrated_score,
            SignalExplanation::Classifier {
                raw_probability: txn.classifier_probability,
                calibrated,
                top_features: txn.top_features.clone(),
            },
        )
    }

    fn llm_signal(&self, txn: &TransactionSignals) -> Option<SignalScore> {
        let source = self.llm.as_ref()?;
        match source.evaluate(txn) {
            Ok(score) => Some(score),
            Err(err) => {
                // Timeout or transport failure: the term stays missing and
                // its weight is not redistributed.
                warn!(
                    target: "ledgerfuse",
                    source = source.id(),
                    error = %err,
                    txn_id = %txn.txn_id,
                    "llm signal unavailable; blending without it"
                );
                None
            }
        }
    }

    /// Evaluate one transaction and persist the decision.
    ///
    /// Re-evaluating the same transaction (e.g. after a rollback) appends a
    /// new record under the then-active rule version; earlier records are
    /// never patched.
    #[instrument(
        name = "ledgerfuse::evaluate",
        skip(self, txn),
        fields(txn_id = %txn.txn_id)
    )]
    pub fn evaluate(&self, txn: &TransactionSignals) -> EngineResult<BlendedDecision> {
        let vendor = self.normalizer.normalize(&txn.raw_vendor);
        let active = self.rules.active();

        let rule_signal = self.rule_signal(&active, &vendor);
        let ml_signal = self.ml_signal(txn);

        // With no LLM source the validation band is disabled outright.
        let mut inputs = BlendInputs {
            rules: rule_signal,
            ml: Some(ml_signal),
            llm: None,
            llm_consulted: self.llm.is_none(),
        };
        let mut outcome = blend(&inputs, &self.config.weights, &self.config.thresholds);

        if outcome.route == RouteAction::LlmValidation {
            // Exactly one second pass; the consultation counts even when the
            // source times out, so this cannot loop.
            inputs.llm = self.llm_signal(txn);
            inputs.llm_consulted = true;
            outcome = blend(&inputs, &self.config.weights, &self.config.thresholds);
        }

        let suggested_account = active
            .rule_for(&vendor)
            .map_or_else(|| txn.predicted_account.clone(), |rule| rule.account.clone());
        let final_account = match outcome.route {
            RouteAction::AutoPost | RouteAction::NeedsReview => Some(suggested_account),
            RouteAction::LlmValidation | RouteAction::HumanReview => None,
        };

        let decision = BlendedDecision {
            txn_id: txn.txn_id.clone(),
            vendor_key: vendor,
            final_account,
            blend_score: outcome.blend_score,
            route: outcome.route,
            rule_version_id: active.version_id,
            signal_breakdown: outcome.breakdown,
            terms: outcome.terms,
            weights: self.config.weights,
            thresholds: self.config.thresholds,
            llm_consulted: outcome.llm_consulted,
            timestamp: Utc::now(),
        };
        self.decisions.append(decision.clone())?;
        info!(
            target: "ledgerfuse",
            txn_id = %decision.txn_id,
            vendor_key = %decision.vendor_key,
            blend_score = decision.blend_score,
            route = %decision.route,
            rule_version = decision.rule_version_id,
            "decision persisted"
        );
        Ok(decision)
    }

    /// Record a human approval or correction.
    ///
    /// Feeds the evidence ledger; when the observation pushes the vendor
    /// over the promotion thresholds, the freshly minted candidate is
    /// registered with the version store and returned.
    pub fn record_approval(
        &self,
        raw_vendor: &str,
        account: &str,
        confidence: f64,
    ) -> EngineResult<Option<RuleCandidate>> {
        let vendor = self.normalizer.normalize(raw_vendor);
        let candidate = self.ledger.observe(&vendor, account, confidence)?;
        if let Some(candidate) = &candidate {
            self.rules.register_candidate(candidate.clone());
        }
        Ok(candidate)
    }

    /// Simulate the impact of pending candidates against the decision log.
    ///
    /// Read-only: samples historical outcomes from the decision store and
    /// delegates to the version store's dry run.
    pub fn dry_run(&self, candidate_ids: &[u64], sample_size: usize) -> EngineResult<ImpactReport> {
        let sample = self.decisions.outcomes();
        self.rules.dry_run(candidate_ids, &sample, sample_size)
    }

    /// Refit the calibration model from labeled outcomes.
    ///
    /// On failure the previous model stays in force and the error is
    /// returned; uncalibrated scores are never silently served as
    /// calibrated.
    pub fn fit_calibration(
        &self,
        raw_probs: &[f64],
        outcomes: &[f64],
    ) -> EngineResult<CalibrationModel> {
        let mut calibrator = self.calibrator.write().expect("calibrator lock poisoned");
        calibrator.fit(raw_probs, outcomes).cloned()
    }

    /// Reconstruct the decision trace for a transaction, purely from the
    /// persisted record.
    pub fn explain(&self, txn_id: &str) -> EngineResult<ExplanationTrace> {
        let decision = self
            .decisions
            .latest(txn_id)
            .ok_or_else(|| EngineError::DecisionNotFound {
                txn_id: txn_id.to_owned(),
            })?;
        Ok(ExplanationTrace::from_decision(&decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerfuse_core::traits::FixedSignalSource;

    fn txn(txn_id: &str, raw_vendor: &str, probability: f64) -> TransactionSignals {
        TransactionSignals {
            txn_id: txn_id.into(),
            raw_vendor: raw_vendor.into(),
            predicted_account: "Software".into(),
            classifier_probability: probability,
            top_features: vec![],
        }
    }

    fn rule(id: u64, vendor: &str, account: &str, confidence: f64) -> RuleSpec {
        RuleSpec {
            id,
            pattern: VendorKey::new(vendor),
            account: account.into(),
            confidence,
        }
    }

    fn engine_with_rules(rules: Vec<RuleSpec>) -> DecisionEngine {
        DecisionEngine::new(EngineConfig::default(), rules).expect("valid default config")
    }

    #[test]
    fn rule_match_with_strong_ml_routes_to_review() {
        let engine = engine_with_rules(vec![rule(1, "github com", "Software", 0.98)]);
        let decision = engine
            .evaluate(&txn("t1", "GITHUB.COM #123", 0.97))
            .expect("evaluate");
        // 0.55*0.98 + 0.35*0.97 = 0.8785 -> needs_review under defaults.
        assert_eq!(decision.route, RouteAction::NeedsReview);
        assert_eq!(decision.final_account.as_deref(), Some("Software"));
        assert_eq!(decision.rule_version_id, 1);
        assert_eq!(decision.vendor_key.as_str(), "github com");
    }

    #[test]
    fn vendor_normalization_applies_before_rule_match() {
        let engine = engine_with_rules(vec![rule(1, "starbucks", "Meals", 0.95)]);
        let decision = engine
            .evaluate(&txn("t1", "POS PURCHASE STARBUCKS STORE #4411", 0.9))
            .expect("evaluate");
        assert_eq!(decision.vendor_key.as_str(), "starbucks");
        assert!(
            decision
                .signal_breakdown
                .iter()
                .any(|s| s.source == SignalKind::Rules)
        );
    }

    #[test]
    fn missing_llm_decision_is_not_boosted() {
        let engine = engine_with_rules(vec![rule(1, "acme", "Supplies", 0.80)]);
        let decision = engine
            .evaluate(&txn("t1", "ACME", 0.70))
            .expect("evaluate");
        // 0.55*0.80 + 0.35*0.70 + 0.10*0 = 0.685 -> human review.
        assert!((decision.blend_score - 0.685).abs() < 1e-9);
        assert_eq!(decision.route, RouteAction::HumanReview);
        assert_eq!(decision.final_account, None);
        let llm_term = decision
            .terms
            .iter()
            .find(|t| t.source == SignalKind::Llm)
            .expect("llm term recorded");
        assert!(!llm_term.present);
        assert!((llm_term.weight - 0.10).abs() < 1e-12);
    }

    #[test]
    fn llm_band_triggers_exactly_one_second_pass() {
        let engine = engine_with_rules(vec![rule(1, "acme", "Supplies", 0.85)])
            .with_llm_source(Arc::new(FixedSignalSource::llm(0.9, "consistent history")));
        // First pass: 0.55*0.85 + 0.35*0.72 = 0.7195 -> llm_validation band.
        let decision = engine
            .evaluate(&txn("t1", "ACME", 0.72))
            .expect("evaluate");
        assert!(decision.llm_consulted);
        // Second pass adds 0.10*0.9: 0.8095 -> needs_review.
        assert!((decision.blend_score - 0.8095).abs() < 1e-9);
        assert_eq!(decision.route, RouteAction::NeedsReview);
        assert_eq!(decision.signal_breakdown.len(), 3);
    }

    #[test]
    fn llm_failure_degrades_to_missing_signal() {
        struct TimingOutSource;
        impl SignalSource for TimingOutSource {
            fn id(&self) -> &str {
                "slow-llm"
            }
            fn kind(&self) -> SignalKind {
                SignalKind::Llm
            }
            fn evaluate(&self, _txn: &TransactionSignals) -> EngineResult<SignalScore> {
                Err(EngineError::SignalTimeout {
                    signal_source: "slow-llm".into(),
                    elapsed_ms: 2300,
                    budget_ms: 2000,
                })
            }
        }

        let engine = engine_with_rules(vec![rule(1, "acme", "Supplies", 0.85)])
            .with_llm_source(Arc::new(TimingOutSource));
        let decision = engine
            .evaluate(&txn("t1", "ACME", 0.72))
            .expect("evaluate never fails on llm timeout");
        // The consultation counted but produced nothing: same score, and the
        // llm band is now closed, so the decision goes to a human.
        assert!(decision.llm_consulted);
        assert!((decision.blend_score - 0.7195).abs() < 1e-9);
        assert_eq!(decision.route, RouteAction::HumanReview);
        assert_eq!(decision.signal_breakdown.len(), 2);
    }

    #[test]
    fn reevaluation_appends_new_record_with_new_version() {
        let engine = engine_with_rules(vec![rule(1, "acme", "Supplies", 0.9)]);
        let first = engine.evaluate(&txn("t1", "ACME", 0.8)).expect("evaluate");
        engine.rules().rollback(1, "ops").expect("rollback");
        let second = engine.evaluate(&txn("t1", "ACME", 0.8)).expect("evaluate");

        assert_eq!(first.rule_version_id, 1);
        assert_eq!(second.rule_version_id, 2);
        assert_eq!(engine.decisions().len(), 2);
    }

    #[test]
    fn record_approval_mints_and_registers_candidate() {
        let engine = engine_with_rules(vec![]);
        assert!(
            engine
                .record_approval("BLUE BOTTLE #7", "Meals", 0.95)
                .expect("observe")
                .is_none()
        );
        assert!(
            engine
                .record_approval("Blue Bottle Store 12", "Meals", 0.93)
                .expect("observe")
                .is_none()
        );
        let candidate = engine
            .record_approval("POS PURCHASE BLUE BOTTLE", "Meals", 0.94)
            .expect("observe")
            .expect("third observation promotes");
        assert_eq!(candidate.vendor_key.as_str(), "blue bottle");
        assert_eq!(engine.rules().candidates(None).len(), 1);
    }

    #[test]
    fn explain_unknown_txn_fails() {
        let engine = engine_with_rules(vec![]);
        let err = engine.explain("ghost").expect_err("no decision recorded");
        assert!(matches!(err, EngineError::DecisionNotFound { .. }));
    }
}
