//! Capability traits at the engine's seams.
//!
//! The engine never couples directly to an LLM bridge or a storage backend.
//! Signal sources and decision stores are injected as trait objects so the
//! blend path is testable without any network or database dependency.

use crate::error::EngineResult;
use crate::types::{
    BlendedDecision, HistoricalOutcome, SignalExplanation, SignalKind, SignalScore,
    TransactionSignals,
};

/// An external producer of signal scores (in practice: the LLM bridge).
///
/// Implementations own their transport and timeout. The engine maps any
/// `Err` -- including [`EngineError::SignalTimeout`](crate::EngineError::SignalTimeout) --
/// to a *missing* signal (score 0, weight not redistributed) rather than
/// failing the decision.
pub trait SignalSource: Send + Sync {
    /// Stable identifier for logs and audit trails.
    fn id(&self) -> &str;

    /// Which blend slot this source fills.
    fn kind(&self) -> SignalKind;

    /// Produce a score for one transaction.
    fn evaluate(&self, txn: &TransactionSignals) -> EngineResult<SignalScore>;
}

/// Append-only persistence for blended decisions.
///
/// Records are immutable once appended; a re-evaluation appends a new record
/// rather than patching an old one. The explainability layer reads only
/// from this store.
pub trait DecisionStore: Send + Sync {
    /// Append one decision record.
    fn append(&self, decision: BlendedDecision) -> EngineResult<()>;

    /// The most recent decision for a transaction, if any.
    fn latest(&self, txn_id: &str) -> Option<BlendedDecision>;

    /// Compact outcome view of every record, oldest first, for dry-run
    /// replay sampling.
    fn outcomes(&self) -> Vec<HistoricalOutcome>;

    /// Number of persisted records.
    fn len(&self) -> usize;

    /// Whether the store holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`SignalSource`] returning a fixed score; useful in tests and as a
/// stand-in while wiring a real bridge.
#[derive(Debug, Clone)]
pub struct FixedSignalSource {
    id: String,
    kind: SignalKind,
    score: f64,
    rationale: String,
}

impl FixedSignalSource {
    /// A fixed LLM-slot source with the given score and rationale.
    #[must_use]
    pub fn llm(score: f64, rationale: impl Into<String>) -> Self {
        Self {
            id: "fixed-llm".into(),
            kind: SignalKind::Llm,
            score,
            rationale: rationale.into(),
        }
    }
}

impl SignalSource for FixedSignalSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SignalKind {
        self.kind
    }

    fn evaluate(&self, _txn: &TransactionSignals) -> EngineResult<SignalScore> {
        Ok(SignalScore::new(
            self.kind,
            self.score,
            SignalExplanation::Llm {
                rationale: self.rationale.clone(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traits_are_object_safe() {
        fn assert_object_safe(_: &dyn SignalSource, _: &dyn DecisionStore) {}
        let _ = assert_object_safe;
    }

    #[test]
    fn fixed_source_returns_its_score() {
        let source = FixedSignalSource::llm(0.72, "matches prior vendor usage");
        let txn = TransactionSignals {
            txn_id: "t1".into(),
            raw_vendor: "ACME".into(),
            predicted_account: "Supplies".into(),
            classifier_probability: 0.8,
            top_features: vec![],
        };
        let score = source.evaluate(&txn).expect("fixed source never fails");
        assert_eq!(score.source, SignalKind::Llm);
        assert!((score.score - 0.72).abs() < 1e-12);
        match score.explanation {
            SignalExplanation::Llm { rationale } => {
                assert!(rationale.contains("prior vendor"));
            }
            other => panic!("unexpected explanation: {other:?}"),
        }
    }
}
