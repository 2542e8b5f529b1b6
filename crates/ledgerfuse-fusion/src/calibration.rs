//! Probability calibration for raw classifier scores.
//!
//! Raw classifier probabilities are optimistic or pessimistic in ways that
//! vary across model versions; blending them against rule confidences is
//! only meaningful once they are calibrated. This module provides:
//!
//! | Calibrator             | Complexity | Best For                          |
//! |------------------------|------------|-----------------------------------|
//! | [`IsotonicRegression`] | O(log n)   | Enough data, arbitrary miscalibration |
//! | [`TemperatureScaling`] | O(1)       | Small samples, smooth miscalibration  |
//!
//! [`Calibrator::fit`] fits both on a training split, compares Expected
//! Calibration Error on a holdout split, and keeps the winner. Models are
//! replaced wholesale on refit; the full history is retained and a failed
//! fit keeps the previous model in force -- uncalibrated scores are never
//! silently served as calibrated.
//!
//! # References
//!
//! - Zadrozny & Elkan (2002) "Transforming classifier scores"
//! - Guo et al. (2017) "On Calibration of Modern Neural Networks"

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ledgerfuse_core::config::CalibrationConfig;
use ledgerfuse_core::error::{EngineError, EngineResult};

/// Clamp for probabilities before logit transforms.
const PROB_EPSILON: f64 = 1e-6;

// ─── ScoreCalibrator trait ───────────────────────────────────────────────────

/// Trait for calibrating raw probabilities.
///
/// All implementations must:
/// - Map raw scores to `[0.0, 1.0]`.
/// - Be monotonic: higher raw score → higher calibrated score.
/// - Be deterministic: same input always produces same output.
/// - Handle non-finite inputs gracefully (NaN/Inf → 0.0).
pub trait ScoreCalibrator: Send + Sync {
    /// Calibrate a single raw probability.
    fn calibrate(&self, raw: f64) -> f64;

    /// Calibrate a batch in place.
    fn calibrate_batch(&self, scores: &mut [f64]) {
        for score in scores.iter_mut() {
            *score = self.calibrate(*score);
        }
    }

    /// Human-readable name of this calibrator.
    fn name(&self) -> &'static str;
}

// ─── Isotonic regression ─────────────────────────────────────────────────────

/// Isotonic regression calibrator: a monotone step function fitted with the
/// pool-adjacent-violators algorithm (PAVA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicRegression {
    /// Sorted raw-score breakpoints.
    pub breakpoints: Vec<f64>,
    /// Non-decreasing calibrated values, one per breakpoint.
    pub values: Vec<f64>,
}

impl IsotonicRegression {
    /// Fit from raw probabilities and binary outcomes via PAVA:
    /// 1. Sort pairs by raw score ascending.
    /// 2. Merge adjacent blocks that violate monotonicity.
    /// 3. Emit the resulting step function.
    pub fn fit(scores: &[f64], outcomes: &[f64]) -> EngineResult<Self> {
        if scores.is_empty() || scores.len() != outcomes.len() {
            return Err(EngineError::CalibrationFitFailure {
                reason: format!(
                    "isotonic fit needs matched non-empty inputs, got {} scores and {} outcomes",
                    scores.len(),
                    outcomes.len()
                ),
            });
        }

        let mut pairs: Vec<(f64, f64)> = scores
            .iter()
            .copied()
            .zip(outcomes.iter().copied())
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Each block is (sum_of_outcomes, count, representative_score).
        let mut blocks: Vec<(f64, usize, f64)> = pairs
            .iter()
            .map(|&(score, outcome)| (outcome, 1, score))
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let block_mean = |block: &(f64, usize, f64)| block.0 / block.1 as f64;

        let mut i = 0;
        while i < blocks.len().saturating_sub(1) {
            if block_mean(&blocks[i]) > block_mean(&blocks[i + 1]) {
                // Merge blocks[i] and blocks[i+1].
                blocks[i].0 += blocks[i + 1].0;
                blocks[i].1 += blocks[i + 1].1;
                blocks[i].2 = f64::midpoint(blocks[i].2, blocks[i + 1].2);
                blocks.remove(i + 1);
                // Step back: the merge may have created a new violation.
                i = i.saturating_sub(1);
            } else {
                i += 1;
            }
        }

        let breakpoints: Vec<f64> = blocks.iter().map(|b| b.2).collect();
        let values: Vec<f64> = blocks
            .iter()
            .map(|b| block_mean(b).clamp(0.0, 1.0))
            .collect();

        Ok(Self {
            breakpoints,
            values,
        })
    }
}

impl ScoreCalibrator for IsotonicRegression {
    fn calibrate(&self, raw: f64) -> f64 {
        if !raw.is_finite() {
            return 0.0;
        }
        // Binary search for the rightmost breakpoint <= raw.
        match self.breakpoints.binary_search_by(|bp| bp.total_cmp(&raw)) {
            Ok(idx) => self.values[idx],
            Err(0) => self.values.first().copied().unwrap_or(0.0),
            Err(idx) if idx >= self.breakpoints.len() => {
                self.values.last().copied().unwrap_or(0.0)
            }
            Err(idx) => self.values[idx - 1],
        }
    }

    fn name(&self) -> &'static str {
        "isotonic_regression"
    }
}

// ─── Temperature scaling ─────────────────────────────────────────────────────

/// Single-parameter temperature scaling on the logit of the probability:
/// `calibrated = sigmoid(logit(raw) / T)`.
///
/// `T > 1` softens overconfident probabilities toward 0.5; `T < 1` sharpens.
/// `T = 1` is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureScaling {
    /// Temperature parameter (always > 0).
    pub temperature: f64,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn logit(p: f64) -> f64 {
    let p = p.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
    (p / (1.0 - p)).ln()
}

impl TemperatureScaling {
    /// Candidate temperatures for the coarse NLL grid search.
    const GRID: [f64; 13] = [
        0.25, 0.4, 0.55, 0.7, 0.85, 1.0, 1.25, 1.5, 1.8, 2.2, 2.7, 3.3, 4.0,
    ];

    /// Fit by minimizing negative log-likelihood over a fixed temperature
    /// grid. Coarse but monotone-safe and free of iterative solvers.
    pub fn fit(scores: &[f64], outcomes: &[f64]) -> EngineResult<Self> {
        if scores.is_empty() || scores.len() != outcomes.len() {
            return Err(EngineError::CalibrationFitFailure {
                reason: format!(
                    "temperature fit needs matched non-empty inputs, got {} scores and {} outcomes",
                    scores.len(),
                    outcomes.len()
                ),
            });
        }
        let nll = |t: f64| -> f64 {
            scores
                .iter()
                .zip(outcomes.iter())
                .map(|(&s, &y)| {
                    let p = sigmoid(logit(s) / t).clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
                    -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
                })
                .sum()
        };
        let temperature = Self::GRID
            .into_iter()
            .min_by(|a, b| nll(*a).total_cmp(&nll(*b)))
            .unwrap_or(1.0);
        Ok(Self { temperature })
    }
}

impl ScoreCalibrator for TemperatureScaling {
    fn calibrate(&self, raw: f64) -> f64 {
        if !raw.is_finite() {
            return 0.0;
        }
        sigmoid(logit(raw.clamp(0.0, 1.0)) / self.temperature).clamp(0.0, 1.0)
    }

    fn name(&self) -> &'static str {
        "temperature_scaling"
    }
}

// ─── ECE ─────────────────────────────────────────────────────────────────────

/// Expected Calibration Error over `num_bins` equal-width bins: the
/// count-weighted average of `|avg_predicted - avg_observed|` per bin.
///
/// Lower is better; a well-calibrated model sits below 0.05. Returns `0.0`
/// for empty inputs.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_ece(predictions: &[f64], outcomes: &[f64], num_bins: usize) -> f64 {
    if predictions.is_empty() || outcomes.is_empty() || num_bins == 0 {
        return 0.0;
    }
    let n = predictions.len().min(outcomes.len());

    let mut bin_sums = vec![0.0_f64; num_bins];
    let mut bin_observed = vec![0.0_f64; num_bins];
    let mut bin_counts = vec![0_usize; num_bins];

    for i in 0..n {
        let p = predictions[i].clamp(0.0, 1.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bin = ((p * num_bins as f64) as usize).min(num_bins - 1);
        bin_sums[bin] += p;
        bin_observed[bin] += outcomes[i];
        bin_counts[bin] += 1;
    }

    let mut ece = 0.0_f64;
    for bin in 0..num_bins {
        if bin_counts[bin] > 0 {
            let avg_predicted = bin_sums[bin] / bin_counts[bin] as f64;
            let avg_observed = bin_observed[bin] / bin_counts[bin] as f64;
            ece += (bin_counts[bin] as f64 / n as f64) * (avg_predicted - avg_observed).abs();
        }
    }
    ece
}

/// Brier score: mean squared error of probabilities against outcomes.
///
/// Diagnostic companion to ECE; lower is better. Returns `0.0` for empty
/// inputs.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_brier_score(predictions: &[f64], outcomes: &[f64]) -> f64 {
    if predictions.is_empty() || outcomes.is_empty() {
        return 0.0;
    }
    let n = predictions.len().min(outcomes.len());
    let sum_sq: f64 = predictions
        .iter()
        .zip(outcomes.iter())
        .take(n)
        .map(|(&p, &y)| (p - y).powi(2))
        .sum();
    sum_sq / n as f64
}

/// One reported calibration bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EceBin {
    /// Inclusive lower edge of the predicted-probability range.
    pub lower: f64,
    /// Exclusive upper edge (inclusive for the last bin).
    pub upper: f64,
    /// Mean predicted probability inside the bin.
    pub pred_avg: f64,
    /// Mean observed outcome inside the bin.
    pub obs_avg: f64,
    /// Samples inside the bin.
    pub count: usize,
}

/// Build fixed-width ECE bins, merging a bin into its right neighbor while
/// its sample count sits below `min_bin_count` (the last bin merges left).
/// Each merge is logged so audits can reconstruct the binning.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn build_ece_bins(
    predictions: &[f64],
    outcomes: &[f64],
    num_bins: usize,
    min_bin_count: usize,
) -> Vec<EceBin> {
    if predictions.is_empty() || num_bins == 0 {
        return Vec::new();
    }
    let n = predictions.len().min(outcomes.len());
    let width = 1.0 / num_bins as f64;

    let mut bins: Vec<EceBin> = (0..num_bins)
        .map(|i| EceBin {
            lower: i as f64 * width,
            upper: (i + 1) as f64 * width,
            pred_avg: 0.0,
            obs_avg: 0.0,
            count: 0,
        })
        .collect();

    // Accumulate sums first; convert to averages after merging.
    for i in 0..n {
        let p = predictions[i].clamp(0.0, 1.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = ((p * num_bins as f64) as usize).min(num_bins - 1);
        bins[idx].pred_avg += p;
        bins[idx].obs_avg += outcomes[i];
        bins[idx].count += 1;
    }

    // Merge understuffed bins into their right neighbor.
    let mut i = 0;
    while bins.len() > 1 && i < bins.len() {
        if bins[i].count >= min_bin_count {
            i += 1;
            continue;
        }
        let removed = bins.remove(i);
        let target = if i < bins.len() { i } else { i - 1 };
        info!(
            target: "ledgerfuse",
            merged_lower = removed.lower,
            merged_upper = removed.upper,
            merged_count = removed.count,
            into_lower = bins[target].lower,
            "ece bin below minimum count merged into neighbor"
        );
        bins[target].pred_avg += removed.pred_avg;
        bins[target].obs_avg += removed.obs_avg;
        bins[target].count += removed.count;
        bins[target].lower = bins[target].lower.min(removed.lower);
        bins[target].upper = bins[target].upper.max(removed.upper);
        // Do not advance: the merged target may still be understuffed.
    }

    for bin in &mut bins {
        if bin.count > 0 {
            bin.pred_avg /= bin.count as f64;
            bin.obs_avg /= bin.count as f64;
        }
    }
    bins.retain(|bin| bin.count > 0);
    bins
}

// ─── Calibration model ───────────────────────────────────────────────────────

/// Which method won model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    /// Isotonic regression (PAVA step function).
    Isotonic,
    /// Temperature scaling.
    Temperature,
}

/// Fitted parameters for either method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CalibratorParams {
    /// Isotonic step function.
    Isotonic(IsotonicRegression),
    /// Temperature parameter.
    Temperature(TemperatureScaling),
}

impl CalibratorParams {
    fn as_calibrator(&self) -> &dyn ScoreCalibrator {
        match self {
            Self::Isotonic(c) => c,
            Self::Temperature(c) => c,
        }
    }
}

/// A fitted calibration model, replaced wholesale on refit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationModel {
    /// Winning method.
    pub method: CalibrationMethod,
    /// Fitted parameters.
    pub params: CalibratorParams,
    /// Reported bins from the fit data (post-merge).
    pub ece_bins: Vec<EceBin>,
    /// Holdout ECE of the winning method.
    pub ece: f64,
    /// Brier score of the winning method on the fit data.
    pub brier: f64,
    /// Monotonic model version.
    pub model_version_id: u64,
    /// When the model was fitted.
    pub fitted_at: DateTime<Utc>,
}

impl CalibrationModel {
    /// Calibrate one raw probability with this model.
    #[must_use]
    pub fn transform(&self, raw: f64) -> f64 {
        self.params.as_calibrator().calibrate(raw)
    }
}

/// Owns the current calibration model and its history.
///
/// Runs as a periodic batch job, never in the request path. Lookups against
/// the current model are lock-free reads for the owner; the engine clones
/// the model snapshot it decides with.
#[derive(Debug)]
pub struct Calibrator {
    config: CalibrationConfig,
    models: Vec<CalibrationModel>,
    next_version: u64,
}

impl Calibrator {
    /// A calibrator with no fitted model: `transform` is the identity and
    /// reports `calibrated = false` until the first successful fit.
    #[must_use]
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            models: Vec::new(),
            next_version: 1,
        }
    }

    /// The model currently in force, if any.
    #[must_use]
    pub fn current(&self) -> Option<&CalibrationModel> {
        self.models.last()
    }

    /// Full model history, oldest first.
    #[must_use]
    pub fn history(&self) -> &[CalibrationModel] {
        &self.models
    }

    /// Calibrate a raw probability.
    ///
    /// Returns the calibrated value and whether a fitted model produced it;
    /// with no model the raw value passes through flagged uncalibrated.
    #[must_use]
    pub fn transform(&self, raw: f64) -> (f64, bool) {
        let sanitized = if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        };
        match self.current() {
            Some(model) => (model.transform(sanitized), true),
            None => (sanitized, false),
        }
    }

    /// Fit a new model from raw probabilities and observed outcomes
    /// (1.0 = the predicted account was correct).
    ///
    /// Splits a deterministic holdout, fits both methods on the remainder,
    /// and keeps whichever has the lower holdout ECE. On failure the
    /// previous model stays in force and the error is returned.
    pub fn fit(&mut self, raw_probs: &[f64], outcomes: &[f64]) -> EngineResult<&CalibrationModel> {
        match self.try_fit(raw_probs, outcomes) {
            Ok(model) => {
                info!(
                    target: "ledgerfuse",
                    model_version = model.model_version_id,
                    method = ?model.method,
                    ece = model.ece,
                    bins = model.ece_bins.len(),
                    "calibration model fitted"
                );
                self.models.push(model);
                self.next_version += 1;
                Ok(self.models.last().expect("model just pushed"))
            }
            Err(err) => {
                warn!(
                    target: "ledgerfuse",
                    error = %err,
                    has_previous = !self.models.is_empty(),
                    "calibration fit failed; previous model remains in force"
                );
                Err(err)
            }
        }
    }

    fn try_fit(&self, raw_probs: &[f64], outcomes: &[f64]) -> EngineResult<CalibrationModel> {
        let n = raw_probs.len().min(outcomes.len());
        if n < self.config.min_fit_samples {
            return Err(EngineError::InsufficientSample {
                needed: self.config.min_fit_samples,
                actual: n,
            });
        }
        let positives = outcomes.iter().take(n).filter(|&&y| y > 0.5).count();
        if positives == 0 || positives == n {
            return Err(EngineError::CalibrationFitFailure {
                reason: format!(
                    "labels lack diversity ({positives}/{n} positive); both classes are required"
                ),
            });
        }

        // Deterministic holdout: every k-th sample, k from holdout_fraction.
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let stride = ((1.0 / self.config.holdout_fraction.clamp(0.05, 0.5)).round() as usize).max(2);
        let mut train_scores = Vec::with_capacity(n);
        let mut train_outcomes = Vec::with_capacity(n);
        let mut holdout_scores = Vec::new();
        let mut holdout_outcomes = Vec::new();
        for i in 0..n {
            if i % stride == 0 {
                holdout_scores.push(raw_probs[i]);
                holdout_outcomes.push(outcomes[i]);
            } else {
                train_scores.push(raw_probs[i]);
                train_outcomes.push(outcomes[i]);
            }
        }
        if train_scores.is_empty() || holdout_scores.is_empty() {
            return Err(EngineError::CalibrationFitFailure {
                reason: "holdout split left an empty partition".into(),
            });
        }

        let isotonic = IsotonicRegression::fit(&train_scores, &train_outcomes)?;
        let temperature = TemperatureScaling::fit(&train_scores, &train_outcomes)?;

        let holdout_ece = |calibrator: &dyn ScoreCalibrator| -> f64 {
            let calibrated: Vec<f64> = holdout_scores
                .iter()
                .map(|&s| calibrator.calibrate(s))
                .collect();
            compute_ece(&calibrated, &holdout_outcomes, self.config.ece_bins)
        };
        let iso_ece = holdout_ece(&isotonic);
        let temp_ece = holdout_ece(&temperature);

        let (method, params, ece): (CalibrationMethod, CalibratorParams, f64) =
            if iso_ece <= temp_ece {
                (
                    CalibrationMethod::Isotonic,
                    CalibratorParams::Isotonic(isotonic),
                    iso_ece,
                )
            } else {
                (
                    CalibrationMethod::Temperature,
                    CalibratorParams::Temperature(temperature),
                    temp_ece,
                )
            };

        let calibrated_all: Vec<f64> = raw_probs
            .iter()
            .take(n)
            .map(|&s| params.as_calibrator().calibrate(s))
            .collect();
        let ece_bins = build_ece_bins(
            &calibrated_all,
            &outcomes[..n],
            self.config.ece_bins,
            self.config.min_bin_count,
        );
        let brier = compute_brier_score(&calibrated_all, &outcomes[..n]);

        Ok(CalibrationModel {
            method,
            params,
            ece_bins,
            ece,
            brier,
            model_version_id: self.next_version,
            fitted_at: Utc::now(),
        })
    }
}
