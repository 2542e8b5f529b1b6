//! Signal fusion, calibration, and drift monitoring for ledgerfuse.
//!
//! This crate provides:
//! - **Blending**: weighted three-signal fusion (rules 0.55 / ML 0.35 /
//!   LLM 0.10) with deliberate no-redistribution of missing-signal weight,
//!   and ordered threshold routing.
//! - **Calibration**: isotonic regression and temperature scaling selected
//!   by holdout ECE, with merge-aware ECE bin reporting.
//! - **Drift**: per-feature PSI over matched histogram bins plus a KS
//!   secondary statistic, with guarded retrain recommendations.

pub mod blend;
pub mod calibration;
pub mod drift;

pub use blend::{BlendInputs, BlendOutcome, blend, route_for};
pub use calibration::{
    CalibrationMethod, CalibrationModel, Calibrator, CalibratorParams, EceBin, IsotonicRegression,
    ScoreCalibrator, TemperatureScaling, build_ece_bins, compute_brier_score, compute_ece,
};
pub use drift::{DriftMonitor, DriftSeries, FeatureDistribution, TrainingContext, ks_statistic};
