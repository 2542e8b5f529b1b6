//! Core traits, types, and error types for the ledgerfuse decision engine.
//!
//! This crate defines the shared data model (`SignalScore`, `BlendedDecision`,
//! `RuleVersion`, `EvidenceStats`), the unified error type (`EngineError`),
//! engine configuration, vendor string normalization, and the capability
//! traits (`SignalSource`, `DecisionStore`) used across all ledgerfuse crates.
//!
//! It has minimal external dependencies and is intended to be depended on by
//! every other crate in the workspace.

pub mod config;
pub mod error;
pub mod tracing_config;
pub mod traits;
pub mod types;
pub mod vendor;

pub use config::{
    BlendWeights, CalibrationConfig, DriftConfig, EngineConfig, LlmBudget, PromotionThresholds,
    RouteThresholds,
};
pub use error::{EngineError, EngineResult};
pub use traits::{DecisionStore, FixedSignalSource, SignalSource};
pub use types::{
    AlertLevel, BlendTerm, BlendedDecision, CandidateStatus, DriftSnapshot, EvidenceStats,
    FeatureDrift, FeatureWeight, HistoricalOutcome, RouteAction, RuleCandidate, RuleSpec,
    RuleVersion, SignalExplanation, SignalKind, SignalScore, TransactionSignals, VendorKey,
};
pub use vendor::{DefaultNormalizer, VendorNormalizer};
