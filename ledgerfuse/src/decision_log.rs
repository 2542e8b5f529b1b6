//! Append-only in-memory decision log.
//!
//! The canonical [`DecisionStore`] implementation: an append-only record
//! vector behind an `RwLock`. Reads (explanations, dry-run sampling) take a
//! shared lock; appends take an exclusive lock. Records are never updated --
//! a re-evaluation appends a fresh record and `latest` returns the newest
//! one for a transaction, with the older records retained for audit.

use std::sync::RwLock;

use ledgerfuse_core::error::EngineResult;
use ledgerfuse_core::traits::DecisionStore;
use ledgerfuse_core::types::{BlendedDecision, HistoricalOutcome};

/// In-memory append-only decision store.
#[derive(Debug, Default)]
pub struct DecisionLog {
    records: RwLock<Vec<BlendedDecision>>,
}

impl DecisionLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record for a transaction, oldest first.
    #[must_use]
    pub fn all_for(&self, txn_id: &str) -> Vec<BlendedDecision> {
        let records = self.records.read().expect("decision log lock poisoned");
        records
            .iter()
            .filter(|d| d.txn_id == txn_id)
            .cloned()
            .collect()
    }
}

impl DecisionStore for DecisionLog {
    fn append(&self, decision: BlendedDecision) -> EngineResult<()> {
        let mut records = self.records.write().expect("decision log lock poisoned");
        records.push(decision);
        Ok(())
    }

    fn latest(&self, txn_id: &str) -> Option<BlendedDecision> {
        let records = self.records.read().expect("decision log lock poisoned");
        records.iter().rev().find(|d| d.txn_id == txn_id).cloned()
    }

    fn outcomes(&self) -> Vec<HistoricalOutcome> {
        let records = self.records.read().expect("decision log lock poisoned");
        records
            .iter()
            .map(|d| HistoricalOutcome {
                vendor_key: d.vendor_key.clone(),
                route: d.route,
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.records.read().expect("decision log lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use ledgerfuse_core::config::{BlendWeights, RouteThresholds};
    use ledgerfuse_core::types::{RouteAction, VendorKey};

    fn decision(txn_id: &str, route: RouteAction) -> BlendedDecision {
        BlendedDecision {
            txn_id: txn_id.into(),
            vendor_key: VendorKey::new("starbucks"),
            final_account: None,
            blend_score: 0.5,
            route,
            rule_version_id: 1,
            signal_breakdown: vec![],
            terms: vec![],
            weights: BlendWeights::default(),
            thresholds: RouteThresholds::default(),
            llm_consulted: false,
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp"),
        }
    }

    #[test]
    fn latest_wins_but_history_is_retained() {
        let log = DecisionLog::new();
        log.append(decision("t1", RouteAction::HumanReview)).expect("append");
        log.append(decision("t1", RouteAction::AutoPost)).expect("append");

        let latest = log.latest("t1").expect("record exists");
        assert_eq!(latest.route, RouteAction::AutoPost);
        assert_eq!(log.all_for("t1").len(), 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn missing_txn_returns_none() {
        let log = DecisionLog::new();
        assert!(log.latest("absent").is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn outcomes_expose_vendor_and_route() {
        let log = DecisionLog::new();
        log.append(decision("t1", RouteAction::NeedsReview)).expect("append");
        let outcomes = log.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].vendor_key.as_str(), "starbucks");
        assert_eq!(outcomes[0].route, RouteAction::NeedsReview);
    }
}
