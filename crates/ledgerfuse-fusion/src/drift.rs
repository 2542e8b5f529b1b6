//! Distributional drift monitoring against the training baseline.
//!
//! Runs out-of-band as a periodic batch job: it compares the feature
//! distribution of a new transaction window against the distribution the
//! classifier was trained on, computing a per-feature Population Stability
//! Index over matched histogram bins:
//!
//! ```text
//! PSI = Σ (actual_i − expected_i) · ln(actual_i / expected_i)
//! ```
//!
//! plus a two-sample Kolmogorov-Smirnov statistic as a secondary check.
//! The overall PSI is the sample-count-weighted aggregate across features.
//!
//! An alert-level snapshot only recommends retraining when both guard
//! conditions hold -- enough new records and enough days since the last
//! training -- which keeps noisy small-sample alerts from churning the
//! training pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use ledgerfuse_core::config::DriftConfig;
use ledgerfuse_core::types::{AlertLevel, DriftSnapshot, FeatureDrift};

/// Floor applied to bin proportions so `ln(actual/expected)` stays finite
/// when a bin is empty on one side.
const PROPORTION_FLOOR: f64 = 1e-4;

/// Named feature samples for one window (training baseline or new data).
#[derive(Debug, Clone, Default)]
pub struct FeatureDistribution {
    features: BTreeMap<String, Vec<f64>>,
}

impl FeatureDistribution {
    /// An empty distribution.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add samples for one feature, appending to any existing samples.
    pub fn add_feature(&mut self, name: impl Into<String>, mut values: Vec<f64>) {
        values.retain(|v| v.is_finite());
        self.features.entry(name.into()).or_default().extend(values);
    }

    /// Feature names in deterministic order.
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        self.features.keys().cloned().collect()
    }

    /// Samples for one feature.
    #[must_use]
    pub fn samples(&self, name: &str) -> Option<&[f64]> {
        self.features.get(name).map(Vec::as_slice)
    }

    /// Total sample count across features.
    #[must_use]
    pub fn total_samples(&self) -> usize {
        self.features.values().map(Vec::len).sum()
    }
}

/// Context about the last training run, used by the retrain guards.
#[derive(Debug, Clone, Copy)]
pub struct TrainingContext {
    /// When the classifier was last trained.
    pub trained_at: DateTime<Utc>,
    /// Accuracy on the training holdout, when known.
    pub baseline_accuracy: Option<f64>,
    /// Accuracy over the new window, when labeled outcomes exist.
    pub window_accuracy: Option<f64>,
}

/// Histogram proportions of `values` over `bins` equal-width bins spanning
/// the baseline's `[min, max]` range, floored so no proportion is zero.
fn binned_proportions(values: &[f64], min: f64, max: f64, bins: usize) -> Vec<f64> {
    let mut counts = vec![0_usize; bins];
    let range = max - min;
    for &v in values {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let idx = if range <= f64::EPSILON {
            0
        } else {
            (((v - min) / range * bins as f64) as usize).min(bins - 1)
        };
        counts[idx] += 1;
    }
    let total: usize = counts.len().max(1);
    let n: usize = values.len();
    #[allow(clippy::cast_precision_loss)]
    counts
        .iter()
        .map(|&c| {
            if n == 0 {
                1.0 / total as f64
            } else {
                (c as f64 / n as f64).max(PROPORTION_FLOOR)
            }
        })
        .collect()
}

/// Population Stability Index between two proportion vectors over matched
/// bins. Both inputs must be floored away from zero.
fn psi(actual: &[f64], expected: &[f64]) -> f64 {
    actual
        .iter()
        .zip(expected.iter())
        .map(|(&a, &e)| (a - e) * (a / e).ln())
        .sum()
}

/// Two-sample Kolmogorov-Smirnov statistic: the maximum gap between the
/// empirical CDFs.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ks_statistic(sample_a: &[f64], sample_b: &[f64]) -> f64 {
    if sample_a.is_empty() || sample_b.is_empty() {
        return 0.0;
    }
    let mut a: Vec<f64> = sample_a.to_vec();
    let mut b: Vec<f64> = sample_b.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (mut i, mut j) = (0_usize, 0_usize);
    let mut max_gap = 0.0_f64;
    while i < a.len() && j < b.len() {
        // Ties advance both sides so equal samples never open a false gap.
        if a[i] < b[j] {
            i += 1;
        } else if b[j] < a[i] {
            j += 1;
        } else {
            i += 1;
            j += 1;
        }
        let cdf_a = i as f64 / a.len() as f64;
        let cdf_b = j as f64 / b.len() as f64;
        max_gap = max_gap.max((cdf_a - cdf_b).abs());
    }
    max_gap
}

/// The drift monitor. Holds only configuration; each evaluation is
/// independent and produces one append-only [`DriftSnapshot`].
#[derive(Debug, Clone)]
pub struct DriftMonitor {
    config: DriftConfig,
}

impl DriftMonitor {
    /// Create a monitor with the given thresholds and guards.
    #[must_use]
    pub fn new(config: DriftConfig) -> Self {
        Self { config }
    }

    /// Compare a new window against the training baseline.
    pub fn evaluate(
        &self,
        new: &FeatureDistribution,
        baseline: &FeatureDistribution,
        training: &TrainingContext,
    ) -> DriftSnapshot {
        self.evaluate_at(new, baseline, training, Utc::now())
    }

    /// [`evaluate`](Self::evaluate) with an explicit clock, for tests.
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate_at(
        &self,
        new: &FeatureDistribution,
        baseline: &FeatureDistribution,
        training: &TrainingContext,
        now: DateTime<Utc>,
    ) -> DriftSnapshot {
        let mut per_feature = BTreeMap::new();
        let mut feature_set = Vec::new();
        let mut weighted_psi = 0.0_f64;
        let mut weight_total = 0.0_f64;
        let mut sample_count = 0_usize;

        for name in baseline.feature_names() {
            let Some(expected) = baseline.samples(&name) else {
                continue;
            };
            let Some(actual) = new.samples(&name) else {
                warn!(
                    target: "ledgerfuse",
                    feature = %name,
                    "feature present in baseline but absent from new window; skipped"
                );
                continue;
            };
            if expected.is_empty() || actual.is_empty() {
                continue;
            }

            let min = expected.iter().copied().fold(f64::INFINITY, f64::min);
            let max = expected.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let expected_bins =
                binned_proportions(expected, min, max, self.config.histogram_bins);
            let actual_bins = binned_proportions(actual, min, max, self.config.histogram_bins);

            let feature_psi = psi(&actual_bins, &expected_bins);
            let feature_ks = ks_statistic(actual, expected);
            let count = actual.len();

            weighted_psi += feature_psi * count as f64;
            weight_total += count as f64;
            sample_count += count;
            feature_set.push(name.clone());
            per_feature.insert(
                name.clone(),
                FeatureDrift {
                    feature: name,
                    psi: feature_psi,
                    ks: feature_ks,
                    sample_count: count,
                },
            );
        }

        let overall_psi = if weight_total > 0.0 {
            weighted_psi / weight_total
        } else {
            0.0
        };

        let alert_level = if overall_psi >= self.config.psi_alert {
            AlertLevel::Alert
        } else if overall_psi >= self.config.psi_warn {
            AlertLevel::Warn
        } else {
            AlertLevel::None
        };

        let low_confidence = sample_count < self.config.min_new_records;
        let days_since_training = (now - training.trained_at).num_days();
        let guards_satisfied = sample_count >= self.config.min_new_records
            && days_since_training >= self.config.min_days_since_training;
        let retrain_recommended = alert_level == AlertLevel::Alert && guards_satisfied;
        if alert_level == AlertLevel::Alert && !guards_satisfied {
            info!(
                target: "ledgerfuse",
                overall_psi,
                sample_count,
                days_since_training,
                "alert-level drift detected but retrain guards unmet; trigger suppressed"
            );
        }

        let accuracy_drop_pct = match (training.baseline_accuracy, training.window_accuracy) {
            (Some(base), Some(window)) if base > 0.0 => {
                Some(((base - window) / base * 100.0).max(0.0))
            }
            _ => None,
        };

        info!(
            target: "ledgerfuse",
            overall_psi,
            alert_level = %alert_level,
            retrain_recommended,
            features = feature_set.len(),
            sample_count,
            "drift snapshot evaluated"
        );

        DriftSnapshot {
            feature_set,
            psi_per_feature: per_feature,
            overall_psi,
            accuracy_drop_pct,
            evaluated_at: now,
            alert_level,
            retrain_recommended,
            low_confidence,
            sample_count,
        }
    }
}

/// Append-only series of drift snapshots.
///
/// Each snapshot is independent; trend analysis reads the series. The
/// external retrain-trigger job consumes the newest entries.
#[derive(Debug, Clone, Default)]
pub struct DriftSeries {
    snapshots: Vec<DriftSnapshot>,
}

impl DriftSeries {
    /// An empty series.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one snapshot.
    pub fn push(&mut self, snapshot: DriftSnapshot) {
        self.snapshots.push(snapshot);
    }

    /// The most recent snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<&DriftSnapshot> {
        self.snapshots.last()
    }

    /// All snapshots, oldest first.
    #[must_use]
    pub fn all(&self) -> &[DriftSnapshot] {
        &self.snapshots
    }

    /// How many consecutive trailing snapshots sit at or above `level`.
    ///
    /// A sustained streak distinguishes real drift from a single noisy
    /// window.
    #[must_use]
    pub fn streak_at_or_above(&self, level: AlertLevel) -> usize {
        let rank = |l: AlertLevel| match l {
            AlertLevel::None => 0_u8,
            AlertLevel::Warn => 1,
            AlertLevel::Alert => 2,
        };
        self.snapshots
            .iter()
            .rev()
            .take_while(|s| rank(s.alert_level) >= rank(level))
            .count()
    }
}
