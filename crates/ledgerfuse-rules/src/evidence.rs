//! Evidence aggregation from human-approved postings.
//!
//! Every approval event `(vendor_key, account, confidence)` folds into
//! per-(vendor, account) running statistics via Welford's online algorithm:
//! O(1) time, O(1) space, no raw history retained. Pairs whose evidence
//! clears the promotion thresholds become pending [`RuleCandidate`]s,
//! exactly once per pair.
//!
//! # Conflict detection
//!
//! A vendor observed against several accounts is ambiguous. The ledger
//! models account agreement as a Bernoulli variable (dominant account vs.
//! rest); when its variance `p·(1−p)` exceeds the configured
//! `max_variance`, the vendor is flagged conflicting and excluded from
//! promotion until the dominant share recovers or a human disambiguates.
//!
//! # Thread Safety
//!
//! The vendor map sits behind an `RwLock` taken only to look up or insert
//! an entry; each vendor's statistics sit behind their own `Mutex`.
//! Updates for the same vendor serialize; updates for different vendors
//! proceed independently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use ledgerfuse_core::config::PromotionThresholds;
use ledgerfuse_core::error::{EngineError, EngineResult};
use ledgerfuse_core::types::{CandidateStatus, EvidenceStats, RuleCandidate, VendorKey};

/// Per-account running evidence plus the promotion latch.
#[derive(Debug, Clone)]
struct AccountEvidence {
    stats: EvidenceStats,
    /// Set once a candidate has been created for this pair; re-observing
    /// keeps updating `stats` but never creates a duplicate candidate.
    promoted: bool,
}

/// All evidence for one vendor.
#[derive(Debug, Default)]
struct VendorEvidence {
    accounts: HashMap<String, AccountEvidence>,
}

impl VendorEvidence {
    fn total_count(&self) -> u64 {
        self.accounts.values().map(|a| a.stats.count).sum()
    }

    /// Share of observations on the most-observed account.
    fn dominant_share(&self) -> f64 {
        let total = self.total_count();
        if total == 0 {
            return 1.0;
        }
        let dominant = self
            .accounts
            .values()
            .map(|a| a.stats.count)
            .max()
            .unwrap_or(0);
        #[allow(clippy::cast_precision_loss)]
        {
            dominant as f64 / total as f64
        }
    }

    /// Bernoulli variance of the account-agreement indicator.
    fn disagreement_variance(&self) -> f64 {
        let p = self.dominant_share();
        p * (1.0 - p)
    }
}

/// Aggregates approval evidence and mints rule candidates.
pub struct EvidenceLedger {
    promotion: PromotionThresholds,
    vendors: RwLock<HashMap<VendorKey, Arc<Mutex<VendorEvidence>>>>,
    next_candidate_id: AtomicU64,
}

impl EvidenceLedger {
    /// Create an empty ledger with the given promotion thresholds.
    #[must_use]
    pub fn new(promotion: PromotionThresholds) -> Self {
        Self {
            promotion,
            vendors: RwLock::new(HashMap::new()),
            next_candidate_id: AtomicU64::new(1),
        }
    }

    fn entry(&self, vendor: &VendorKey) -> Arc<Mutex<VendorEvidence>> {
        if let Some(existing) = self
            .vendors
            .read()
            .expect("vendor map lock poisoned")
            .get(vendor)
        {
            return Arc::clone(existing);
        }
        let mut map = self.vendors.write().expect("vendor map lock poisoned");
        Arc::clone(
            map.entry(vendor.clone())
                .or_insert_with(|| Arc::new(Mutex::new(VendorEvidence::default()))),
        )
    }

    /// Fold one approval observation into the ledger.
    ///
    /// Returns a newly minted pending candidate when this observation pushed
    /// the (vendor, account) pair over the promotion thresholds for the
    /// first time; `None` otherwise. Promotion is idempotent per pair.
    pub fn observe(
        &self,
        vendor: &VendorKey,
        account: &str,
        confidence: f64,
    ) -> EngineResult<Option<RuleCandidate>> {
        self.observe_at(vendor, account, confidence, Utc::now())
    }

    /// [`observe`](Self::observe) with an explicit timestamp, for replay and
    /// tests.
    pub fn observe_at(
        &self,
        vendor: &VendorKey,
        account: &str,
        confidence: f64,
        at: DateTime<Utc>,
    ) -> EngineResult<Option<RuleCandidate>> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(EngineError::InvalidConfig {
                field: "observation.confidence".into(),
                value: format!("{confidence}"),
                reason: "confidence must be a finite value in [0, 1]".into(),
            });
        }
        if vendor.is_empty() {
            // Normalization reduced the descriptor to nothing; there is no
            // key to aggregate under.
            return Ok(None);
        }

        let entry = self.entry(vendor);
        let mut evidence = entry.lock().expect("vendor evidence lock poisoned");

        match evidence.accounts.get_mut(account) {
            Some(existing) => existing.stats.observe(confidence, at),
            None => {
                evidence.accounts.insert(
                    account.to_owned(),
                    AccountEvidence {
                        stats: EvidenceStats::first(confidence, at),
                        promoted: false,
                    },
                );
            }
        }

        let disagreement = evidence.disagreement_variance();
        if disagreement > self.promotion.max_variance {
            warn!(
                target: "ledgerfuse",
                vendor_key = %vendor,
                disagreement_variance = disagreement,
                "vendor evidence conflicts across accounts; promotion suppressed"
            );
            return Ok(None);
        }

        let account_evidence = evidence
            .accounts
            .get_mut(account)
            .expect("account entry just inserted");
        if account_evidence.promoted {
            return Ok(None);
        }
        let stats = &account_evidence.stats;
        let meets = stats.count >= self.promotion.min_observations
            && stats.mean >= self.promotion.min_confidence
            && stats.variance() <= self.promotion.max_variance;
        if !meets {
            return Ok(None);
        }

        account_evidence.promoted = true;
        let id = self.next_candidate_id.fetch_add(1, Ordering::Relaxed);
        let candidate = RuleCandidate {
            id,
            vendor_key: vendor.clone(),
            suggested_account: account.to_owned(),
            evidence: account_evidence.stats.clone(),
            status: CandidateStatus::Pending,
            decided_by: None,
            decided_at: None,
        };
        debug!(
            target: "ledgerfuse",
            candidate_id = id,
            vendor_key = %vendor,
            account,
            count = candidate.evidence.count,
            mean = candidate.evidence.mean,
            variance = candidate.evidence.variance(),
            "evidence promoted to rule candidate"
        );
        Ok(Some(candidate))
    }

    /// Running statistics for one (vendor, account) pair.
    #[must_use]
    pub fn stats(&self, vendor: &VendorKey, account: &str) -> Option<EvidenceStats> {
        let map = self.vendors.read().expect("vendor map lock poisoned");
        let entry = map.get(vendor)?;
        let evidence = entry.lock().expect("vendor evidence lock poisoned");
        evidence.accounts.get(account).map(|a| a.stats.clone())
    }

    /// Vendors currently excluded from promotion by cross-account conflict.
    #[must_use]
    pub fn conflicting_vendors(&self) -> Vec<VendorKey> {
        let map = self.vendors.read().expect("vendor map lock poisoned");
        let mut out: Vec<VendorKey> = map
            .iter()
            .filter(|(_, entry)| {
                let evidence = entry.lock().expect("vendor evidence lock poisoned");
                evidence.disagreement_variance() > self.promotion.max_variance
            })
            .map(|(vendor, _)| vendor.clone())
            .collect();
        out.sort();
        out
    }

    /// The [`EngineError::ConflictingEvidence`] describing a vendor's
    /// conflict, for surfacing to the reviewer. `None` when the vendor is
    /// not conflicting.
    #[must_use]
    pub fn conflict_for(&self, vendor: &VendorKey) -> Option<EngineError> {
        let map = self.vendors.read().expect("vendor map lock poisoned");
        let entry = map.get(vendor)?;
        let evidence = entry.lock().expect("vendor evidence lock poisoned");
        let variance = evidence.disagreement_variance();
        (variance > self.promotion.max_variance).then(|| EngineError::ConflictingEvidence {
            vendor: vendor.as_str().to_owned(),
            variance,
            max_variance: self.promotion.max_variance,
            accounts: evidence.accounts.len(),
        })
    }
}
