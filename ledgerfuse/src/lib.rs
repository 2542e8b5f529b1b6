//! # ledgerfuse
//!
//! Adaptive decision engine for transaction categorization: turns raw
//! categorization signals -- deterministic vendor rules, a calibrated
//! statistical classifier, and an optional LLM -- into a single audited
//! posting decision, learns new rules from operator corrections, and lets
//! the rule set evolve safely via immutable versions, dry-run simulation,
//! and copy-forward rollback.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ledgerfuse::{DecisionEngine, EngineConfig, TransactionSignals};
//!
//! let engine = DecisionEngine::new(EngineConfig::default(), vec![])?;
//!
//! // Evaluate a transaction.
//! let decision = engine.evaluate(&TransactionSignals {
//!     txn_id: "txn-1".into(),
//!     raw_vendor: "GITHUB.COM #123".into(),
//!     predicted_account: "Software".into(),
//!     classifier_probability: 0.94,
//!     top_features: vec![],
//! })?;
//! println!("{} -> {}", decision.txn_id, decision.route);
//!
//! // Operator corrections teach the engine new rules.
//! engine.record_approval("GITHUB.COM #123", "Software", 0.97)?;
//!
//! // And any decision can explain itself, forever.
//! println!("{}", engine.explain("txn-1")?.render());
//! ```
//!
//! # Architecture
//!
//! - [`ledgerfuse_core`]: shared types, errors, config, vendor normalization.
//! - [`ledgerfuse_rules`]: evidence aggregation and the versioned rule store.
//! - [`ledgerfuse_fusion`]: blending, calibration, drift monitoring.
//! - This crate: the [`DecisionEngine`] orchestrator, the decision log, and
//!   the explainability layer.

pub mod decision_log;
pub mod engine;
pub mod explain;

pub use decision_log::DecisionLog;
pub use engine::DecisionEngine;
pub use explain::{ExplanationTrace, SignalTraceLine};

pub use ledgerfuse_core::{
    AlertLevel, BlendWeights, BlendedDecision, CandidateStatus, DefaultNormalizer, DriftConfig,
    DriftSnapshot, EngineConfig, EngineError, EngineResult, EvidenceStats, FixedSignalSource,
    HistoricalOutcome, PromotionThresholds, RouteAction, RouteThresholds, RuleCandidate, RuleSpec,
    RuleVersion, SignalExplanation, SignalKind, SignalScore, SignalSource, TransactionSignals,
    VendorKey, VendorNormalizer,
};
pub use ledgerfuse_fusion::{
    BlendInputs, BlendOutcome, CalibrationModel, Calibrator, DriftMonitor, FeatureDistribution,
    TrainingContext, blend,
};
pub use ledgerfuse_rules::{AuditEntry, EvidenceLedger, ImpactReport, RuleVersionStore};
