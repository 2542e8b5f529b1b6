//! Shared data model for the ledgerfuse decision engine.
//!
//! These types cross crate boundaries: signals and decisions flow from the
//! blender to the decision log and explainability layer, evidence and rule
//! versions flow between the aggregator and the version store. Everything
//! persisted or exported derives serde so records survive process restarts
//! and render directly in the review UI.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{BlendWeights, RouteThresholds};

// ---------------------------------------------------------------------------
// Vendor key
// ---------------------------------------------------------------------------

/// A normalized vendor identifier, unique per tenant.
///
/// Produced only by a [`VendorNormalizer`](crate::vendor::VendorNormalizer);
/// two raw strings naming the same merchant must normalize to the same key.
/// This is the aggregation key for evidence and the match key for rule
/// patterns, so over- or under-merging here corrupts both learning and the
/// leakage guarantees of holdout evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorKey(String);

impl VendorKey {
    /// Wrap an already-normalized string.
    ///
    /// Callers outside the normalizer should prefer
    /// [`DefaultNormalizer::normalize`](crate::vendor::DefaultNormalizer).
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The normalized key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether normalization reduced the raw string to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VendorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Which source produced a signal score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Deterministic vendor rules from the active rule version.
    Rules,
    /// The statistical classifier (calibrated probability).
    Ml,
    /// The optional LLM validator.
    Llm,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rules => write!(f, "rules"),
            Self::Ml => write!(f, "ml"),
            Self::Llm => write!(f, "llm"),
        }
    }
}

/// A named classifier feature and its weight contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    /// Feature name (e.g. `"vendor_token:coffee"`, `"amount_bucket:10-50"`).
    pub name: String,
    /// Signed weight contribution toward the predicted account.
    pub weight: f64,
}

/// Structured rationale attached to a signal score.
///
/// Carried inside the persisted decision so explanations can be reconstructed
/// without recomputing anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalExplanation {
    /// A vendor rule matched.
    RuleMatch {
        /// Id of the matched rule.
        rule_id: u64,
        /// The vendor-key pattern that matched.
        pattern: String,
        /// Account the rule posts to.
        account: String,
    },
    /// The classifier produced a probability.
    Classifier {
        /// Probability before calibration.
        raw_probability: f64,
        /// Whether the score passed through a fitted calibration model.
        calibrated: bool,
        /// Top feature weights, highest magnitude first.
        top_features: Vec<FeatureWeight>,
    },
    /// The LLM validator produced a judgement.
    Llm {
        /// Free-text rationale returned by the LLM bridge.
        rationale: String,
    },
}

/// One signal source's contribution to a decision.
///
/// Created fresh per transaction evaluation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    /// Which source produced this score.
    pub source: SignalKind,
    /// Confidence in `[0.0, 1.0]`. Non-finite inputs are sanitized to 0.0.
    pub score: f64,
    /// Structured rationale for the explainability layer.
    pub explanation: SignalExplanation,
}

impl SignalScore {
    /// Create a signal score, clamping into `[0, 1]` and mapping non-finite
    /// values to `0.0` so a misbehaving source cannot poison the blend.
    #[must_use]
    pub fn new(source: SignalKind, score: f64, explanation: SignalExplanation) -> Self {
        let score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            source,
            score,
            explanation,
        }
    }
}

/// Inbound per-transaction context consumed by the engine.
///
/// The classifier probability and feature weights come from the external ML
/// classifier; the raw vendor string comes from the transaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSignals {
    /// Caller-assigned transaction identifier.
    pub txn_id: String,
    /// Raw vendor string as it appeared on the statement.
    pub raw_vendor: String,
    /// Account the classifier predicts.
    pub predicted_account: String,
    /// Raw (uncalibrated) classifier probability for the predicted account.
    pub classifier_probability: f64,
    /// Top classifier feature weights, highest magnitude first.
    #[serde(default)]
    pub top_features: Vec<FeatureWeight>,
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Where a blended decision routes the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    /// Post automatically without human involvement.
    AutoPost,
    /// Queue for human review with a suggested account.
    NeedsReview,
    /// Consult the LLM validator before deciding (triggers a second pass).
    LlmValidation,
    /// Send to a human with no automation credit.
    HumanReview,
}

impl fmt::Display for RouteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AutoPost => write!(f, "auto_post"),
            Self::NeedsReview => write!(f, "needs_review"),
            Self::LlmValidation => write!(f, "llm_validation"),
            Self::HumanReview => write!(f, "human_review"),
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// A single vendor rule inside a rule version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Stable rule id, carried across versions that contain this rule.
    pub id: u64,
    /// Normalized vendor key this rule matches.
    pub pattern: VendorKey,
    /// Account the rule posts to.
    pub account: String,
    /// Confidence inherited from the promoting evidence (mean observed
    /// confidence at promotion time).
    pub confidence: f64,
}

/// An immutable snapshot of the rule set.
///
/// "Editing" always creates a new version whose `parent_version_id` points at
/// the prior active version; exactly one version is active at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleVersion {
    /// Monotonically increasing version id.
    pub version_id: u64,
    /// Ordered rule list.
    pub rules: Vec<RuleSpec>,
    /// When this version was created.
    pub created_at: DateTime<Utc>,
    /// Who created it (promotion author or rollback initiator).
    pub author: String,
    /// The version this one was derived from (`None` for the root).
    pub parent_version_id: Option<u64>,
    /// Whether this version currently serves decisions.
    pub active: bool,
}

impl RuleVersion {
    /// Look up the rule matching a normalized vendor key, if any.
    #[must_use]
    pub fn rule_for(&self, vendor: &VendorKey) -> Option<&RuleSpec> {
        self.rules.iter().find(|rule| &rule.pattern == vendor)
    }
}

/// Lifecycle status of a rule candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    /// Awaiting reviewer action.
    Pending,
    /// Accepted into a rule version.
    Accepted,
    /// Rejected by a reviewer.
    Rejected,
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A vendor→account pair whose evidence cleared the promotion thresholds.
///
/// Created by the evidence aggregator; transitioned by a reviewer via the
/// version store. Accepted candidates become rules in a new version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCandidate {
    /// Stable candidate id.
    pub id: u64,
    /// Normalized vendor key.
    pub vendor_key: VendorKey,
    /// Account the evidence supports.
    pub suggested_account: String,
    /// Snapshot of the supporting evidence at promotion time.
    pub evidence: EvidenceStats,
    /// Lifecycle status.
    pub status: CandidateStatus,
    /// Reviewer who decided this candidate, once decided.
    pub decided_by: Option<String>,
    /// When the candidate was decided.
    pub decided_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// Incremental statistics for one (vendor, account) pair.
///
/// Updated in O(1) via Welford's algorithm; no raw observation history is
/// retained. `m2` is the running sum of squared deviations from the mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceStats {
    /// Number of observations.
    pub count: u64,
    /// Running mean confidence.
    pub mean: f64,
    /// Running sum of squared deviations (Welford's M2).
    pub m2: f64,
    /// When the first observation arrived.
    pub first_seen: DateTime<Utc>,
    /// When the most recent observation arrived.
    pub last_seen: DateTime<Utc>,
}

impl EvidenceStats {
    /// Start a fresh accumulator from a first observation.
    #[must_use]
    pub fn first(confidence: f64, at: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            mean: confidence,
            m2: 0.0,
            first_seen: at,
            last_seen: at,
        }
    }

    /// Fold one observation into the running statistics (Welford update).
    pub fn observe(&mut self, confidence: f64, at: DateTime<Utc>) {
        self.count += 1;
        let delta = confidence - self.mean;
        #[allow(clippy::cast_precision_loss)]
        {
            self.mean += delta / self.count as f64;
        }
        let delta2 = confidence - self.mean;
        self.m2 += delta * delta2;
        self.last_seen = at;
    }

    /// Population variance. Zero until a second observation arrives.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.count > 1 {
            #[allow(clippy::cast_precision_loss)]
            {
                self.m2 / self.count as f64
            }
        } else {
            0.0
        }
    }

    /// Combine two accumulators (Chan et al. pairwise merge).
    ///
    /// Used when importing evidence gathered in parallel batches. Equivalent
    /// to having observed both streams sequentially, within floating-point
    /// tolerance.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        if other.count == 0 {
            return self.clone();
        }
        if self.count == 0 {
            return other.clone();
        }
        let n = self.count + other.count;
        #[allow(clippy::cast_precision_loss)]
        let (n_a, n_b, n_f) = (self.count as f64, other.count as f64, n as f64);
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * (n_b / n_f);
        let m2 = self.m2 + other.m2 + delta * delta * (n_a * n_b / n_f);
        Self {
            count: n,
            mean,
            m2,
            first_seen: self.first_seen.min(other.first_seen),
            last_seen: self.last_seen.max(other.last_seen),
        }
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// One literal term of the blend arithmetic, kept for explanations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendTerm {
    /// Signal source this term belongs to.
    pub source: SignalKind,
    /// Weight applied to the signal.
    pub weight: f64,
    /// Signal score (0.0 when the signal was missing).
    pub score: f64,
    /// `weight * score`, precomputed so the trace shows the exact arithmetic.
    pub weighted: f64,
    /// Whether the signal was actually present. A missing signal still
    /// contributes a zero term; its weight is not redistributed.
    pub present: bool,
}

/// The persisted, immutable record of one transaction evaluation.
///
/// Never updated: a re-evaluation (e.g. after a rollback) appends a new
/// record with a new timestamp and `rule_version_id`. The weights and
/// thresholds in force are snapshotted here so the explainability layer
/// never consults live configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendedDecision {
    /// Transaction this decision applies to.
    pub txn_id: String,
    /// Normalized vendor key of the transaction.
    pub vendor_key: VendorKey,
    /// Account the decision posts to, when one was selected.
    pub final_account: Option<String>,
    /// Weighted blend score in `[0, 1]`.
    pub blend_score: f64,
    /// Routing outcome.
    pub route: RouteAction,
    /// Rule version active at evaluation time. Later rollbacks do not
    /// retroactively alter this tag.
    pub rule_version_id: u64,
    /// Every signal consulted, with rationale.
    pub signal_breakdown: Vec<SignalScore>,
    /// Literal blend arithmetic.
    pub terms: Vec<BlendTerm>,
    /// Weights in force at evaluation time.
    pub weights: BlendWeights,
    /// Thresholds in force at evaluation time.
    pub thresholds: RouteThresholds,
    /// Whether the LLM signal had been consulted when this record was made.
    pub llm_consulted: bool,
    /// When the evaluation happened.
    pub timestamp: DateTime<Utc>,
}

/// A compact view of a past decision used for dry-run replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalOutcome {
    /// Normalized vendor key of the transaction.
    pub vendor_key: VendorKey,
    /// How the transaction was routed.
    pub route: RouteAction,
}

// ---------------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------------

/// Alert level attached to a drift snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Distribution stable.
    None,
    /// Moderate shift; monitor.
    Warn,
    /// Significant shift; retraining warranted (subject to guard conditions).
    Alert,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Warn => write!(f, "warn"),
            Self::Alert => write!(f, "alert"),
        }
    }
}

/// Per-feature drift measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    /// Feature name.
    pub feature: String,
    /// Population Stability Index against the baseline.
    pub psi: f64,
    /// Two-sample Kolmogorov-Smirnov statistic against the baseline.
    pub ks: f64,
    /// Number of new-window samples for this feature.
    pub sample_count: usize,
}

/// One append-only drift evaluation. Snapshots are independent; trend
/// analysis reads the series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftSnapshot {
    /// Features evaluated, in report order.
    pub feature_set: Vec<String>,
    /// Per-feature measurements keyed by feature name.
    pub psi_per_feature: BTreeMap<String, FeatureDrift>,
    /// Sample-count-weighted aggregate PSI.
    pub overall_psi: f64,
    /// Accuracy drop versus the training baseline, when labeled outcomes
    /// accompanied the window.
    pub accuracy_drop_pct: Option<f64>,
    /// When the evaluation ran.
    pub evaluated_at: DateTime<Utc>,
    /// Classification of the overall shift.
    pub alert_level: AlertLevel,
    /// Whether the guard conditions for a retrain trigger were satisfied.
    pub retrain_recommended: bool,
    /// Set when the new window was smaller than the configured minimum.
    pub low_confidence: bool,
    /// Total new-window sample count across features.
    pub sample_count: usize,
}
