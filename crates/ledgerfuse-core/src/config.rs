//! Configuration types for the decision engine.
//!
//! [`EngineConfig`] aggregates the tuning knobs for every subsystem. It is an
//! explicit, immutable value passed into `blend()`, promotion logic, and the
//! drift monitor at call time -- never ambient global state -- so historical
//! decisions can always be replayed against the configuration that produced
//! them.
//!
//! # Environment Variable Overrides
//!
//! | Variable                        | Field                            | Default |
//! |---------------------------------|----------------------------------|---------|
//! | `LEDGERFUSE_RULE_WEIGHT`        | `weights.rules`                  | `0.55`  |
//! | `LEDGERFUSE_ML_WEIGHT`          | `weights.ml`                     | `0.35`  |
//! | `LEDGERFUSE_LLM_WEIGHT`         | `weights.llm`                    | `0.10`  |
//! | `LEDGERFUSE_AUTO_POST_MIN`      | `thresholds.auto_post_min`       | `0.90`  |
//! | `LEDGERFUSE_REVIEW_MIN`         | `thresholds.review_min`          | `0.75`  |
//! | `LEDGERFUSE_LLM_MIN`            | `thresholds.llm_min`             | `0.70`  |
//! | `LEDGERFUSE_MIN_OBSERVATIONS`   | `promotion.min_observations`     | `3`     |
//! | `LEDGERFUSE_MIN_CONFIDENCE`     | `promotion.min_confidence`       | `0.85`  |
//! | `LEDGERFUSE_MAX_VARIANCE`       | `promotion.max_variance`         | `0.08`  |
//! | `LEDGERFUSE_PSI_ALERT`          | `drift.psi_alert`                | `0.25`  |
//! | `LEDGERFUSE_LLM_TIMEOUT_MS`     | `llm.timeout_ms`                 | `2000`  |

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Tolerance used when checking that blend weights sum to 1.0.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Fixed weights for the three signal sources.
///
/// Weights must sum to 1.0. A missing signal contributes 0 to its term and
/// its weight is **not** redistributed to the remaining sources; this
/// deliberately penalizes under-evidenced decisions rather than inflating
/// confidence from fewer sources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendWeights {
    /// Weight for the deterministic rules signal. Default: 0.55.
    pub rules: f64,
    /// Weight for the calibrated classifier signal. Default: 0.35.
    pub ml: f64,
    /// Weight for the optional LLM signal. Default: 0.10.
    pub llm: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            rules: 0.55,
            ml: 0.35,
            llm: 0.10,
        }
    }
}

impl BlendWeights {
    /// Validate that weights are non-negative and sum to 1.0.
    pub fn validate(&self) -> EngineResult<()> {
        for (name, value) in [("rules", self.rules), ("ml", self.ml), ("llm", self.llm)] {
            if !value.is_finite() || value < 0.0 || value > 1.0 {
                return Err(EngineError::InvalidConfig {
                    field: format!("weights.{name}"),
                    value: format!("{value}"),
                    reason: "each weight must be a finite value in [0, 1]".into(),
                });
            }
        }
        let sum = self.rules + self.ml + self.llm;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::InvalidConfig {
                field: "weights".into(),
                value: format!("{sum}"),
                reason: "weights must sum to 1.0".into(),
            });
        }
        Ok(())
    }
}

/// Ordered routing thresholds. First match wins, evaluated top-down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteThresholds {
    /// Blend scores at or above this auto-post. Default: 0.90.
    pub auto_post_min: f64,
    /// Scores in `[review_min, auto_post_min)` go to review. Default: 0.75.
    pub review_min: f64,
    /// Scores in `[llm_min, review_min)` trigger LLM validation (when the
    /// LLM has not yet been consulted). Default: 0.70.
    pub llm_min: f64,
}

impl Default for RouteThresholds {
    fn default() -> Self {
        Self {
            auto_post_min: 0.90,
            review_min: 0.75,
            llm_min: 0.70,
        }
    }
}

impl RouteThresholds {
    /// Validate that thresholds are in `[0, 1]` and strictly descending.
    pub fn validate(&self) -> EngineResult<()> {
        for (name, value) in [
            ("auto_post_min", self.auto_post_min),
            ("review_min", self.review_min),
            ("llm_min", self.llm_min),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidConfig {
                    field: format!("thresholds.{name}"),
                    value: format!("{value}"),
                    reason: "thresholds must be finite values in [0, 1]".into(),
                });
            }
        }
        if self.auto_post_min <= self.review_min || self.review_min <= self.llm_min {
            return Err(EngineError::InvalidConfig {
                field: "thresholds".into(),
                value: format!(
                    "auto_post_min={}, review_min={}, llm_min={}",
                    self.auto_post_min, self.review_min, self.llm_min
                ),
                reason: "thresholds must be strictly descending: auto_post_min > review_min > llm_min".into(),
            });
        }
        Ok(())
    }
}

/// Thresholds for promoting evidence into a rule candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionThresholds {
    /// Minimum observations before promotion. Default: 3.
    pub min_observations: u64,
    /// Minimum mean confidence. Default: 0.85.
    pub min_confidence: f64,
    /// Maximum confidence variance. Default: 0.08.
    pub max_variance: f64,
}

impl Default for PromotionThresholds {
    fn default() -> Self {
        Self {
            min_observations: 3,
            min_confidence: 0.85,
            max_variance: 0.08,
        }
    }
}

/// Drift monitor thresholds and retrain guard conditions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// PSI below this is stable. Default: 0.10.
    pub psi_warn: f64,
    /// PSI at or above this is an alert. Configurable in the 0.20-0.25
    /// band. Default: 0.25.
    pub psi_alert: f64,
    /// Number of histogram bins for distribution comparison. Default: 10.
    pub histogram_bins: usize,
    /// Minimum new-window records before an alert may recommend retraining.
    /// Default: 1000.
    pub min_new_records: usize,
    /// Minimum days since the last training before an alert may recommend
    /// retraining. Default: 7.
    pub min_days_since_training: i64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            psi_warn: 0.10,
            psi_alert: 0.25,
            histogram_bins: 10,
            min_new_records: 1000,
            min_days_since_training: 7,
        }
    }
}

impl DriftConfig {
    /// Validate band ordering and the configurable alert range.
    pub fn validate(&self) -> EngineResult<()> {
        if self.psi_warn <= 0.0 || self.psi_alert <= self.psi_warn {
            return Err(EngineError::InvalidConfig {
                field: "drift".into(),
                value: format!("psi_warn={}, psi_alert={}", self.psi_warn, self.psi_alert),
                reason: "0 < psi_warn < psi_alert required".into(),
            });
        }
        if !(0.20..=0.25).contains(&self.psi_alert) {
            return Err(EngineError::InvalidConfig {
                field: "drift.psi_alert".into(),
                value: format!("{}", self.psi_alert),
                reason: "psi_alert is configurable within [0.20, 0.25]".into(),
            });
        }
        if self.histogram_bins < 2 {
            return Err(EngineError::InvalidConfig {
                field: "drift.histogram_bins".into(),
                value: format!("{}", self.histogram_bins),
                reason: "at least 2 bins are required".into(),
            });
        }
        Ok(())
    }
}

/// Calibration fit and ECE reporting settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Fixed-width ECE bins. Default: 10.
    pub ece_bins: usize,
    /// Bins with fewer samples than this are merged into a neighbor.
    /// Default: 100.
    pub min_bin_count: usize,
    /// Acceptance bound on `|avg_predicted - avg_observed|` per reported
    /// bin. Default: 0.05.
    pub max_bin_gap: f64,
    /// Minimum `(score, outcome)` pairs required to attempt a fit.
    /// Default: 50.
    pub min_fit_samples: usize,
    /// Fraction of the fit data held out for method selection by ECE.
    /// Default: 0.2.
    pub holdout_fraction: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            ece_bins: 10,
            min_bin_count: 100,
            max_bin_gap: 0.05,
            min_fit_samples: 50,
            holdout_fraction: 0.2,
        }
    }
}

/// Budget for the optional LLM signal source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmBudget {
    /// Maximum milliseconds to wait for the LLM signal. On timeout the
    /// signal is treated as missing, never fatal. Default: 2000.
    pub timeout_ms: u64,
}

impl Default for LlmBudget {
    fn default() -> Self {
        Self { timeout_ms: 2000 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Signal blend weights.
    pub weights: BlendWeights,
    /// Routing thresholds.
    pub thresholds: RouteThresholds,
    /// Candidate promotion thresholds.
    pub promotion: PromotionThresholds,
    /// Drift monitor settings.
    pub drift: DriftConfig,
    /// Calibration settings.
    pub calibration: CalibrationConfig,
    /// LLM signal budget.
    pub llm: LlmBudget,
}

impl EngineConfig {
    /// Validate every section.
    pub fn validate(&self) -> EngineResult<()> {
        self.weights.validate()?;
        self.thresholds.validate()?;
        self.drift.validate()?;
        Ok(())
    }

    /// Load a config from a TOML file, falling back to defaults when the
    /// file is missing or unparseable. Partial files merge with defaults.
    #[must_use]
    pub fn from_toml_file(path: &std::path::Path) -> Self {
        std::fs::read_to_string(path).map_or_else(
            |_| Self::default(),
            |contents| match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to parse engine config, using defaults"
                    );
                    Self::default()
                }
            },
        )
    }

    /// Load overrides from environment variables.
    ///
    /// Only overrides fields for which environment variables are set.
    /// Invalid values are silently ignored (current values are kept).
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_f64("LEDGERFUSE_RULE_WEIGHT", 0.0..=1.0) {
            self.weights.rules = v;
        }
        if let Some(v) = env_f64("LEDGERFUSE_ML_WEIGHT", 0.0..=1.0) {
            self.weights.ml = v;
        }
        if let Some(v) = env_f64("LEDGERFUSE_LLM_WEIGHT", 0.0..=1.0) {
            self.weights.llm = v;
        }
        if let Some(v) = env_f64("LEDGERFUSE_AUTO_POST_MIN", 0.0..=1.0) {
            self.thresholds.auto_post_min = v;
        }
        if let Some(v) = env_f64("LEDGERFUSE_REVIEW_MIN", 0.0..=1.0) {
            self.thresholds.review_min = v;
        }
        if let Some(v) = env_f64("LEDGERFUSE_LLM_MIN", 0.0..=1.0) {
            self.thresholds.llm_min = v;
        }
        if let Ok(val) = std::env::var("LEDGERFUSE_MIN_OBSERVATIONS")
            && let Ok(n) = val.parse::<u64>()
            && n > 0
        {
            self.promotion.min_observations = n;
        }
        if let Some(v) = env_f64("LEDGERFUSE_MIN_CONFIDENCE", 0.0..=1.0) {
            self.promotion.min_confidence = v;
        }
        if let Some(v) = env_f64("LEDGERFUSE_MAX_VARIANCE", 0.0..=1.0) {
            self.promotion.max_variance = v;
        }
        if let Some(v) = env_f64("LEDGERFUSE_PSI_ALERT", 0.20..=0.25) {
            self.drift.psi_alert = v;
        }
        if let Ok(val) = std::env::var("LEDGERFUSE_LLM_TIMEOUT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            self.llm.timeout_ms = ms;
        }
        self
    }
}

fn env_f64(name: &str, range: std::ops::RangeInclusive<f64>) -> Option<f64> {
    let val = std::env::var(name).ok()?;
    let parsed = val.parse::<f64>().ok()?;
    range.contains(&parsed).then_some(parsed)
}
