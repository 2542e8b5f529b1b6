//! Immutable, append-only rule version store.
//!
//! Versions form an arena: an append-only `Vec<RuleVersion>` plus a single
//! active index, both guarded by one mutex so that "exactly one version is
//! active" holds at every observation point. Editing the rule set always
//! appends a new version whose `parent_version_id` points at the version it
//! superseded; rollback is "copy forward" -- a brand-new version that is a
//! structural copy of an older one -- never "delete back", so history stays
//! linear and fully auditable at O(1) cost per rollback.
//!
//! Every mutating operation records an [`AuditEntry`](crate::audit::AuditEntry)
//! on success *and* on failure. [`RuleVersionStore::dry_run`] is the one
//! read-only operation: it snapshots state under the lock, releases it, and
//! simulates -- it never blocks writers for the duration of the replay and
//! never mutates anything.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use ledgerfuse_core::error::{EngineError, EngineResult};
use ledgerfuse_core::types::{
    CandidateStatus, HistoricalOutcome, RouteAction, RuleCandidate, RuleSpec, RuleVersion,
    VendorKey,
};

use crate::audit::{AuditAction, AuditLog, AuditOutcome};

/// Dry-run samples below this size set `low_confidence` on the report.
pub const DEFAULT_MIN_DRY_RUN_SAMPLE: usize = 50;

/// Result of a read-only rule-change simulation.
///
/// Consumed by the rules-review UI before a human accepts candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactReport {
    /// Fraction of the sample that auto-posted under the active rules.
    pub automation_rate_before: f64,
    /// Fraction that would auto-post with the candidate rules added.
    pub automation_rate_after: f64,
    /// `automation_rate_after - automation_rate_before`.
    pub delta: f64,
    /// Route-label count changes, e.g. `{"auto_post": +3, "needs_review": -3}`.
    pub reason_code_deltas: BTreeMap<String, i64>,
    /// Number of sampled records whose route would change.
    pub affected_count: usize,
    /// Number of records actually replayed.
    pub sample_size: usize,
    /// Set when the sample was smaller than the configured minimum; the
    /// report is still returned rather than failing outright.
    pub low_confidence: bool,
}

/// Internal state guarded by one mutex: the version arena, the active
/// pointer, the candidate registry, and the audit log.
struct StoreState {
    versions: Vec<RuleVersion>,
    active_idx: usize,
    candidates: BTreeMap<u64, RuleCandidate>,
    audit: AuditLog,
    next_rule_id: u64,
}

/// The versioned rule store.
pub struct RuleVersionStore {
    state: Mutex<StoreState>,
    min_dry_run_sample: usize,
}

impl RuleVersionStore {
    /// Create a store whose root version (v1, active) holds `initial_rules`.
    #[must_use]
    pub fn new(initial_rules: Vec<RuleSpec>, author: &str) -> Self {
        Self::with_min_sample(initial_rules, author, DEFAULT_MIN_DRY_RUN_SAMPLE)
    }

    /// [`new`](Self::new) with an explicit dry-run low-confidence floor.
    #[must_use]
    pub fn with_min_sample(
        initial_rules: Vec<RuleSpec>,
        author: &str,
        min_dry_run_sample: usize,
    ) -> Self {
        let next_rule_id = initial_rules.iter().map(|r| r.id + 1).max().unwrap_or(1);
        let root = RuleVersion {
            version_id: 1,
            rules: initial_rules,
            created_at: Utc::now(),
            author: author.to_owned(),
            parent_version_id: None,
            active: true,
        };
        Self {
            state: Mutex::new(StoreState {
                versions: vec![root],
                active_idx: 0,
                candidates: BTreeMap::new(),
                audit: AuditLog::new(),
                next_rule_id,
            }),
            min_dry_run_sample,
        }
    }

    /// Register a candidate minted by the evidence ledger.
    ///
    /// Registering the same candidate id twice is a no-op, keeping the
    /// aggregator's promotion idempotence end to end.
    pub fn register_candidate(&self, candidate: RuleCandidate) {
        let mut state = self.state.lock().expect("version store lock poisoned");
        state.candidates.entry(candidate.id).or_insert(candidate);
    }

    /// Candidates, optionally filtered by status, in id order.
    #[must_use]
    pub fn candidates(&self, status: Option<CandidateStatus>) -> Vec<RuleCandidate> {
        let state = self.state.lock().expect("version store lock poisoned");
        state
            .candidates
            .values()
            .filter(|c| status.is_none_or(|s| c.status == s))
            .cloned()
            .collect()
    }

    /// The currently active version (cheap snapshot for read-mostly callers).
    #[must_use]
    pub fn active(&self) -> RuleVersion {
        let state = self.state.lock().expect("version store lock poisoned");
        state.versions[state.active_idx].clone()
    }

    /// Full linear history in creation order.
    #[must_use]
    pub fn history(&self) -> Vec<RuleVersion> {
        let state = self.state.lock().expect("version store lock poisoned");
        state.versions.clone()
    }

    /// Audit entries in recording order.
    #[must_use]
    pub fn audit_entries(&self) -> Vec<crate::audit::AuditEntry> {
        let state = self.state.lock().expect("version store lock poisoned");
        state.audit.entries().to_vec()
    }

    /// Read-only impact simulation of candidate rules over historical
    /// outcomes.
    ///
    /// Takes a point-in-time snapshot under the lock, then replays without
    /// holding it. Repeated calls with no intervening writes yield identical
    /// reports; no persisted state is touched.
    #[instrument(
        name = "ledgerfuse::dry_run",
        skip(self, sample),
        fields(candidates = candidate_ids.len(), sample = sample.len())
    )]
    pub fn dry_run(
        &self,
        candidate_ids: &[u64],
        sample: &[HistoricalOutcome],
        sample_size: usize,
    ) -> EngineResult<ImpactReport> {
        // Snapshot, then release the lock before replaying.
        let (active_rules, selected): (Vec<RuleSpec>, Vec<RuleCandidate>) = {
            let state = self.state.lock().expect("version store lock poisoned");
            let selected = candidate_ids
                .iter()
                .map(|id| {
                    state
                        .candidates
                        .get(id)
                        .cloned()
                        .ok_or(EngineError::UnknownCandidate { candidate_id: *id })
                })
                .collect::<EngineResult<Vec<_>>>()?;
            (state.versions[state.active_idx].rules.clone(), selected)
        };

        let replayed = &sample[..sample.len().min(sample_size)];
        let candidate_keys: Vec<&VendorKey> =
            selected.iter().map(|c| &c.vendor_key).collect();

        let mut before_auto = 0_usize;
        let mut affected = 0_usize;
        let mut deltas: BTreeMap<String, i64> = BTreeMap::new();
        for outcome in replayed {
            let was_auto = outcome.route == RouteAction::AutoPost;
            if was_auto {
                before_auto += 1;
            }
            // A record changes route when a candidate rule now covers its
            // vendor and no active rule already did.
            let newly_covered = !was_auto
                && candidate_keys.contains(&&outcome.vendor_key)
                && !active_rules
                    .iter()
                    .any(|rule| rule.pattern == outcome.vendor_key);
            if newly_covered {
                affected += 1;
                *deltas.entry(outcome.route.to_string()).or_insert(0) -= 1;
                *deltas.entry(RouteAction::AutoPost.to_string()).or_insert(0) += 1;
            }
        }

        let total = replayed.len();
        #[allow(clippy::cast_precision_loss)]
        let rate = |count: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            }
        };
        let automation_rate_before = rate(before_auto);
        let automation_rate_after = rate(before_auto + affected);

        Ok(ImpactReport {
            automation_rate_before,
            automation_rate_after,
            delta: automation_rate_after - automation_rate_before,
            reason_code_deltas: deltas,
            affected_count: affected,
            sample_size: total,
            low_confidence: total < self.min_dry_run_sample,
        })
    }

    /// Promote pending candidates into a new active version.
    ///
    /// Reads the active version and applies in one critical section, so a
    /// plain `promote` can never observe a stale active version. An empty
    /// candidate list is a no-op: no version is created, and the attempt is
    /// audited as refused.
    pub fn promote(&self, candidate_ids: &[u64], author: &str) -> EngineResult<RuleVersion> {
        let mut state = self.state.lock().expect("version store lock poisoned");
        let expected = state.versions[state.active_idx].version_id;
        Self::promote_locked(&mut state, expected, candidate_ids, author)
    }

    /// Promote against an expected active version (optimistic concurrency).
    ///
    /// Fails with [`EngineError::StaleRuleVersion`] when another promoter
    /// committed first; the loser re-reads the active version and retries.
    /// The failed attempt is still audited.
    pub fn promote_against(
        &self,
        expected_active: u64,
        candidate_ids: &[u64],
        author: &str,
    ) -> EngineResult<RuleVersion> {
        let mut state = self.state.lock().expect("version store lock poisoned");
        Self::promote_locked(&mut state, expected_active, candidate_ids, author)
    }

    fn promote_locked(
        state: &mut StoreState,
        expected_active: u64,
        candidate_ids: &[u64],
        author: &str,
    ) -> EngineResult<RuleVersion> {
        let now = Utc::now();
        let actual = state.versions[state.active_idx].version_id;
        if actual != expected_active {
            let err = EngineError::StaleRuleVersion {
                expected: expected_active,
                actual,
            };
            state.audit.record(
                AuditAction::Promote,
                AuditOutcome::Refused {
                    reason: err.to_string(),
                },
                None,
                Some(expected_active),
                candidate_ids.to_vec(),
                author,
                now,
            );
            return Err(err);
        }

        if candidate_ids.is_empty() {
            state.audit.record(
                AuditAction::Promote,
                AuditOutcome::Refused {
                    reason: "empty candidate set; no version created".into(),
                },
                None,
                Some(actual),
                vec![],
                author,
                now,
            );
            return Ok(state.versions[state.active_idx].clone());
        }

        // Validate before touching anything, so a refused promote leaves the
        // store byte-identical.
        for id in candidate_ids {
            match state.candidates.get(id) {
                None => {
                    let err = EngineError::UnknownCandidate { candidate_id: *id };
                    state.audit.record(
                        AuditAction::Promote,
                        AuditOutcome::Refused {
                            reason: err.to_string(),
                        },
                        None,
                        Some(actual),
                        candidate_ids.to_vec(),
                        author,
                        now,
                    );
                    return Err(err);
                }
                Some(candidate) if candidate.status != CandidateStatus::Pending => {
                    let err = EngineError::CandidateAlreadyDecided {
                        candidate_id: *id,
                        status: candidate.status.to_string(),
                        decided_by: candidate
                            .decided_by
                            .clone()
                            .unwrap_or_else(|| "unknown".into()),
                    };
                    state.audit.record(
                        AuditAction::Promote,
                        AuditOutcome::Refused {
                            reason: err.to_string(),
                        },
                        None,
                        Some(actual),
                        candidate_ids.to_vec(),
                        author,
                        now,
                    );
                    return Err(err);
                }
                Some(_) => {}
            }
        }

        let mut rules = state.versions[state.active_idx].rules.clone();
        for id in candidate_ids {
            let candidate = state
                .candidates
                .get_mut(id)
                .expect("candidate validated above");
            let rule_id = state.next_rule_id;
            state.next_rule_id += 1;
            rules.push(RuleSpec {
                id: rule_id,
                pattern: candidate.vendor_key.clone(),
                account: candidate.suggested_account.clone(),
                confidence: candidate.evidence.mean,
            });
            candidate.status = CandidateStatus::Accepted;
            candidate.decided_by = Some(author.to_owned());
            candidate.decided_at = Some(now);
        }

        let version = Self::append_version(state, rules, author, now);
        state.audit.record(
            AuditAction::Promote,
            AuditOutcome::Applied,
            Some(version.version_id),
            Some(actual),
            candidate_ids.to_vec(),
            author,
            now,
        );
        info!(
            target: "ledgerfuse",
            rule_version = version.version_id,
            parent = actual,
            promoted = candidate_ids.len(),
            "candidates promoted into new rule version"
        );
        Ok(version)
    }

    /// Reject a pending candidate. No version is created.
    pub fn reject(&self, candidate_id: u64, reason: &str, author: &str) -> EngineResult<()> {
        let mut state = self.state.lock().expect("version store lock poisoned");
        let now = Utc::now();
        let err = match state.candidates.get_mut(&candidate_id) {
            None => Some(EngineError::UnknownCandidate { candidate_id }),
            Some(candidate) if candidate.status != CandidateStatus::Pending => {
                Some(EngineError::CandidateAlreadyDecided {
                    candidate_id,
                    status: candidate.status.to_string(),
                    decided_by: candidate
                        .decided_by
                        .clone()
                        .unwrap_or_else(|| "unknown".into()),
                })
            }
            Some(candidate) => {
                candidate.status = CandidateStatus::Rejected;
                candidate.decided_by = Some(author.to_owned());
                candidate.decided_at = Some(now);
                None
            }
        };
        let outcome = err.as_ref().map_or(AuditOutcome::Applied, |e| {
            AuditOutcome::Refused {
                reason: e.to_string(),
            }
        });
        state.audit.record(
            AuditAction::Reject,
            outcome,
            None,
            None,
            vec![candidate_id],
            author,
            now,
        );
        match err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Roll back to an earlier version by structural copy.
    ///
    /// Creates a brand-new active version whose rules are copied from the
    /// target; the target row itself is never mutated or resurrected.
    /// Rolling back to the currently active version still creates a new
    /// version, keeping the audit trail consistent.
    pub fn rollback(&self, target_version_id: u64, author: &str) -> EngineResult<RuleVersion> {
        let mut state = self.state.lock().expect("version store lock poisoned");
        let now = Utc::now();
        let Some(target_rules) = state
            .versions
            .iter()
            .find(|v| v.version_id == target_version_id)
            .map(|v| v.rules.clone())
        else {
            let err = EngineError::UnknownVersion {
                version_id: target_version_id,
            };
            state.audit.record(
                AuditAction::Rollback,
                AuditOutcome::Refused {
                    reason: err.to_string(),
                },
                None,
                Some(target_version_id),
                vec![],
                author,
                now,
            );
            return Err(err);
        };

        let version = Self::append_version(&mut state, target_rules, author, now);
        state.audit.record(
            AuditAction::Rollback,
            AuditOutcome::Applied,
            Some(version.version_id),
            Some(target_version_id),
            vec![],
            author,
            now,
        );
        info!(
            target: "ledgerfuse",
            rule_version = version.version_id,
            rollback_target = target_version_id,
            "rule set rolled back by copy"
        );
        Ok(version)
    }

    /// Append a new active version derived from the current active one.
    fn append_version(
        state: &mut StoreState,
        rules: Vec<RuleSpec>,
        author: &str,
        now: DateTime<Utc>,
    ) -> RuleVersion {
        let parent = state.versions[state.active_idx].version_id;
        let version = RuleVersion {
            version_id: state.versions.len() as u64 + 1,
            rules,
            created_at: now,
            author: author.to_owned(),
            parent_version_id: Some(parent),
            active: true,
        };
        state.versions[state.active_idx].active = false;
        state.versions.push(version.clone());
        state.active_idx = state.versions.len() - 1;
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerfuse_core::types::EvidenceStats;
    use std::sync::Arc;
    use std::thread;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
    }

    fn rule(id: u64, vendor: &str, account: &str) -> RuleSpec {
        RuleSpec {
            id,
            pattern: VendorKey::new(vendor),
            account: account.into(),
            confidence: 0.9,
        }
    }

    fn candidate(id: u64, vendor: &str, account: &str) -> RuleCandidate {
        RuleCandidate {
            id,
            vendor_key: VendorKey::new(vendor),
            suggested_account: account.into(),
            evidence: EvidenceStats::first(0.92, t0()),
            status: CandidateStatus::Pending,
            decided_by: None,
            decided_at: None,
        }
    }

    fn outcome(vendor: &str, route: RouteAction) -> HistoricalOutcome {
        HistoricalOutcome {
            vendor_key: VendorKey::new(vendor),
            route,
        }
    }

    fn seeded_store() -> RuleVersionStore {
        let store = RuleVersionStore::with_min_sample(
            vec![rule(1, "starbucks", "Meals"), rule(2, "github", "Software")],
            "system",
            3,
        );
        store.register_candidate(candidate(10, "blue bottle", "Meals"));
        store.register_candidate(candidate(11, "hertz", "Travel"));
        store
    }

    #[test]
    fn exactly_one_active_version_at_all_times() {
        let store = seeded_store();
        assert_eq!(store.active().version_id, 1);
        store.promote(&[10], "reviewer").expect("promote");
        store.rollback(1, "ops").expect("rollback");

        let history = store.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().filter(|v| v.active).count(), 1);
        // Strictly ordered ids with a linear parent chain.
        for (i, version) in history.iter().enumerate() {
            assert_eq!(version.version_id, i as u64 + 1);
            if i > 0 {
                assert_eq!(version.parent_version_id, Some(i as u64));
            }
        }
    }

    #[test]
    fn promote_then_rollback_scenario() {
        // v1 (2 rules) → accept 1 candidate → v2 (3 rules, active) →
        // rollback to v1 → v3 (2 rules, structurally identical to v1).
        let store = seeded_store();
        let v1 = store.active();
        assert_eq!(v1.rules.len(), 2);

        let v2 = store.promote(&[10], "reviewer").expect("promote");
        assert_eq!(v2.version_id, 2);
        assert_eq!(v2.rules.len(), 3);
        assert!(v2.active);

        let v3 = store.rollback(1, "ops").expect("rollback");
        assert_eq!(v3.version_id, 3);
        assert_eq!(v3.rules, v1.rules);
        assert!(v3.active);

        // v1 and v2 remain in history, untouched apart from deactivation.
        let history = store.history();
        assert_eq!(history[0].rules, v1.rules);
        assert_eq!(history[1].rules.len(), 3);
        assert!(!history[0].active);
        assert!(!history[1].active);

        // Accepted candidate carries the reviewer decision.
        let accepted = store.candidates(Some(CandidateStatus::Accepted));
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].decided_by.as_deref(), Some("reviewer"));
    }

    #[test]
    fn rollback_to_active_version_still_creates_new_version() {
        let store = seeded_store();
        let v_new = store.rollback(1, "ops").expect("rollback to self");
        assert_eq!(v_new.version_id, 2);
        assert_eq!(v_new.rules, store.history()[0].rules);
        assert_eq!(store.history().len(), 2);
    }

    #[test]
    fn promote_empty_set_is_audited_no_op() {
        let store = seeded_store();
        let version = store.promote(&[], "reviewer").expect("empty promote");
        assert_eq!(version.version_id, 1);
        assert_eq!(store.history().len(), 1);
        let audit = store.audit_entries();
        assert_eq!(audit.len(), 1);
        assert!(matches!(audit[0].outcome, AuditOutcome::Refused { .. }));
    }

    #[test]
    fn stale_promote_is_rejected_and_audited() {
        let store = seeded_store();
        store.promote(&[10], "first").expect("first promote");

        let err = store
            .promote_against(1, &[11], "second")
            .expect_err("stale expected version must fail");
        assert!(matches!(
            err,
            EngineError::StaleRuleVersion {
                expected: 1,
                actual: 2
            }
        ));
        // Loser retries against the new active version and succeeds.
        store
            .promote_against(2, &[11], "second")
            .expect("retry succeeds");

        let audit = store.audit_entries();
        assert_eq!(audit.len(), 3);
        assert!(matches!(audit[1].outcome, AuditOutcome::Refused { .. }));
    }

    #[test]
    fn concurrent_promoters_serialize_with_one_loser() {
        let store = Arc::new(seeded_store());
        let expected = store.active().version_id;
        let handles: Vec<_> = [10_u64, 11]
            .into_iter()
            .map(|id| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.promote_against(expected, &[id], "racer"))
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread join"))
            .collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        let losers = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::StaleRuleVersion { .. })))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(losers, 1);
        assert_eq!(store.history().len(), 2);
    }

    #[test]
    fn reject_transitions_candidate_without_new_version() {
        let store = seeded_store();
        store
            .reject(10, "vendor too ambiguous", "reviewer")
            .expect("reject");
        assert_eq!(store.history().len(), 1);
        let rejected = store.candidates(Some(CandidateStatus::Rejected));
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].id, 10);

        let err = store
            .reject(10, "again", "reviewer")
            .expect_err("double reject must fail");
        assert!(matches!(err, EngineError::CandidateAlreadyDecided { .. }));
        // Both the applied and the refused attempt are audited.
        assert_eq!(store.audit_entries().len(), 2);
    }

    #[test]
    fn promote_decided_candidate_fails_and_audits() {
        let store = seeded_store();
        store.reject(10, "ambiguous", "reviewer").expect("reject");
        let err = store
            .promote(&[10], "reviewer")
            .expect_err("rejected candidate cannot promote");
        assert!(matches!(err, EngineError::CandidateAlreadyDecided { .. }));
        assert_eq!(store.history().len(), 1);
        assert_eq!(store.audit_entries().len(), 2);
    }

    #[test]
    fn unknown_rollback_target_fails_and_audits() {
        let store = seeded_store();
        let err = store.rollback(42, "ops").expect_err("unknown version");
        assert!(matches!(err, EngineError::UnknownVersion { version_id: 42 }));
        let audit = store.audit_entries();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].target_version_id, Some(42));
    }

    #[test]
    fn dry_run_computes_automation_delta() {
        let store = seeded_store();
        let sample = vec![
            outcome("starbucks", RouteAction::AutoPost),
            outcome("blue bottle", RouteAction::NeedsReview),
            outcome("blue bottle", RouteAction::HumanReview),
            outcome("philz", RouteAction::HumanReview),
        ];
        let report = store.dry_run(&[10], &sample, sample.len()).expect("dry run");
        assert!((report.automation_rate_before - 0.25).abs() < 1e-12);
        assert!((report.automation_rate_after - 0.75).abs() < 1e-12);
        assert!((report.delta - 0.5).abs() < 1e-12);
        assert_eq!(report.affected_count, 2);
        assert_eq!(report.reason_code_deltas.get("auto_post"), Some(&2));
        assert_eq!(report.reason_code_deltas.get("needs_review"), Some(&-1));
        assert_eq!(report.reason_code_deltas.get("human_review"), Some(&-1));
        assert!(!report.low_confidence);
    }

    #[test]
    fn dry_run_never_mutates_and_is_repeatable() {
        let store = seeded_store();
        let sample = vec![
            outcome("blue bottle", RouteAction::NeedsReview),
            outcome("github", RouteAction::AutoPost),
        ];
        let versions_before = store.history();
        let candidates_before = store.candidates(None);

        let first = store.dry_run(&[10, 11], &sample, 100).expect("dry run");
        let second = store.dry_run(&[10, 11], &sample, 100).expect("dry run");
        assert_eq!(first, second);

        assert_eq!(store.history(), versions_before);
        assert_eq!(store.candidates(None), candidates_before);
        assert!(store.audit_entries().is_empty(), "dry run is never audited");
    }

    #[test]
    fn dry_run_small_sample_sets_low_confidence() {
        let store = seeded_store();
        let sample = vec![outcome("blue bottle", RouteAction::NeedsReview)];
        let report = store.dry_run(&[10], &sample, 10).expect("dry run");
        assert!(report.low_confidence);
        assert_eq!(report.sample_size, 1);
    }

    #[test]
    fn dry_run_unknown_candidate_fails() {
        let store = seeded_store();
        let err = store
            .dry_run(&[404], &[], 10)
            .expect_err("unknown candidate id");
        assert!(matches!(
            err,
            EngineError::UnknownCandidate { candidate_id: 404 }
        ));
    }

    #[test]
    fn dry_run_respects_sample_size_cap() {
        let store = seeded_store();
        let sample: Vec<HistoricalOutcome> = (0..10)
            .map(|_| outcome("blue bottle", RouteAction::NeedsReview))
            .collect();
        let report = store.dry_run(&[10], &sample, 4).expect("dry run");
        assert_eq!(report.sample_size, 4);
        assert_eq!(report.affected_count, 4);
    }
}
