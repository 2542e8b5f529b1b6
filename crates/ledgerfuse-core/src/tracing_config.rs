//! Optional tracing subscriber setup for ledgerfuse.
//!
//! Provides a convenience initializer for consumers who want structured
//! logging without configuring `tracing-subscriber` themselves. Entirely
//! optional: consumers may bring their own subscriber.

use tracing::Level;

/// Target prefix used by all ledgerfuse tracing spans and events.
///
/// Consumers can use this to filter engine logs:
/// ```text
/// RUST_LOG=ledgerfuse=debug
/// ```
pub const TARGET_PREFIX: &str = "ledgerfuse";

/// Standard tracing span names used across the engine.
///
/// These constants keep span naming consistent so consumers can match on
/// them in subscribers, dashboards, and tests.
pub mod span_names {
    /// Root span for one transaction evaluation.
    pub const EVALUATE: &str = "ledgerfuse::evaluate";
    /// Signal blending and routing.
    pub const BLEND: &str = "ledgerfuse::blend";
    /// Evidence observation.
    pub const OBSERVE: &str = "ledgerfuse::observe";
    /// Candidate promotion into a new rule version.
    pub const PROMOTE: &str = "ledgerfuse::promote";
    /// Rule version rollback.
    pub const ROLLBACK: &str = "ledgerfuse::rollback";
    /// Read-only impact simulation.
    pub const DRY_RUN: &str = "ledgerfuse::dry_run";
    /// Calibration model fitting.
    pub const CALIBRATION_FIT: &str = "ledgerfuse::calibration_fit";
    /// Drift evaluation.
    pub const DRIFT_EVALUATE: &str = "ledgerfuse::drift_evaluate";
}

/// Standard structured field names used in tracing events.
pub mod field_names {
    /// Transaction identifier.
    pub const TXN_ID: &str = "txn_id";
    /// Normalized vendor key.
    pub const VENDOR_KEY: &str = "vendor_key";
    /// Rule version id.
    pub const RULE_VERSION: &str = "rule_version";
    /// Blended score.
    pub const BLEND_SCORE: &str = "blend_score";
    /// Routing outcome.
    pub const ROUTE: &str = "route";
    /// Candidate id.
    pub const CANDIDATE_ID: &str = "candidate_id";
    /// Overall PSI.
    pub const OVERALL_PSI: &str = "overall_psi";
    /// Expected calibration error.
    pub const ECE: &str = "ece";
}

/// Parse a log level string (case-insensitive).
///
/// Recognized values: `trace`, `debug`, `info`, `warn`, `error`.
/// Returns `None` for unrecognized strings.
#[must_use]
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Returns the recommended `tracing::Level` for the given environment.
///
/// Checks `LEDGERFUSE_LOG_LEVEL` first, then falls back to the provided
/// default.
#[must_use]
pub fn level_from_env(default: Level) -> Level {
    std::env::var("LEDGERFUSE_LOG_LEVEL")
        .ok()
        .and_then(|s| parse_level(&s))
        .unwrap_or(default)
}

/// Install a global fmt subscriber at the given level.
///
/// Returns `false` when a global subscriber was already installed (the
/// existing one is left in place).
pub fn init_tracing(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .is_ok()
}
