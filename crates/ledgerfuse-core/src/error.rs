/// Unified error type covering all failure modes across the ledgerfuse decision engine.
///
/// Every variant includes an actionable error message guiding the consumer toward
/// resolution. The `DecisionEngine` catches transient errors and degrades gracefully:
/// `SignalTimeout` falls back to a missing-signal blend, `CalibrationFitFailure`
/// keeps serving the previous calibration model. Only `InvalidConfig` prevents the
/// engine from being constructed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // === Evidence errors ===
    /// A vendor's observations disagree beyond the variance threshold.
    /// Not fatal: the vendor is excluded from promotion until variance subsides
    /// or a reviewer disambiguates.
    #[error(
        "Conflicting evidence for vendor \"{vendor}\": variance {variance:.4} exceeds {max_variance:.4} across {accounts} accounts. Excluded from promotion; resolve in the rules review UI."
    )]
    ConflictingEvidence {
        /// Normalized vendor key.
        vendor: String,
        /// Observed confidence variance.
        variance: f64,
        /// Configured maximum variance for promotion.
        max_variance: f64,
        /// Number of distinct accounts observed for this vendor.
        accounts: usize,
    },

    // === Version store errors ===
    /// A promote or rollback was attempted against a version that is no longer
    /// active. The caller must re-read the active version and retry.
    #[error(
        "Stale rule version: expected v{expected} to be active but v{actual} is. Re-read the active version and retry."
    )]
    StaleRuleVersion {
        /// Version the caller believed was active.
        expected: u64,
        /// Version that is actually active.
        actual: u64,
    },

    /// The referenced rule version does not exist in the store.
    #[error("Unknown rule version v{version_id}. Use history() to list valid versions.")]
    UnknownVersion {
        /// The missing version id.
        version_id: u64,
    },

    /// The referenced rule candidate does not exist.
    #[error("Unknown rule candidate #{candidate_id}. Use candidates() to list valid ids.")]
    UnknownCandidate {
        /// The missing candidate id.
        candidate_id: u64,
    },

    /// The candidate has already been accepted or rejected.
    #[error(
        "Candidate #{candidate_id} was already decided ({status}) by {decided_by}. Candidate decisions are final."
    )]
    CandidateAlreadyDecided {
        /// The candidate id.
        candidate_id: u64,
        /// Its terminal status.
        status: String,
        /// Who decided it.
        decided_by: String,
    },

    // === Sampling errors ===
    /// A computation had fewer records than required for a confident result.
    /// Most callers return a `low_confidence` result instead of surfacing this.
    #[error(
        "Insufficient sample: {actual} records, {needed} required. Collect more history or lower the minimum."
    )]
    InsufficientSample {
        /// Minimum records required.
        needed: usize,
        /// Records actually available.
        actual: usize,
    },

    // === Signal errors ===
    /// An external signal source did not respond within its budget.
    /// The blender treats the signal as missing (score 0, weight not
    /// redistributed) rather than blocking the decision.
    #[error(
        "Signal source \"{signal_source}\" timed out after {elapsed_ms}ms (budget: {budget_ms}ms). Decision proceeds without this signal."
    )]
    SignalTimeout {
        /// Identifier of the signal source.
        signal_source: String,
        /// How long the call ran.
        elapsed_ms: u64,
        /// The configured budget.
        budget_ms: u64,
    },

    // === Calibration errors ===
    /// Calibration could not be fitted (single-class labels, too few samples).
    /// The calibrator keeps serving the previous model and logs a warning;
    /// raw scores are never silently served as calibrated.
    #[error(
        "Calibration fit failed: {reason}. Previous model remains in force; collect more labeled outcomes."
    )]
    CalibrationFitFailure {
        /// Why the fit failed.
        reason: String,
    },

    // === Explanation errors ===
    /// No persisted decision exists for the requested transaction.
    #[error(
        "No decision recorded for transaction \"{txn_id}\". Evaluate the transaction before requesting an explanation."
    )]
    DecisionNotFound {
        /// The transaction id.
        txn_id: String,
    },

    // === Configuration errors ===
    /// A configuration value is invalid.
    #[error("Invalid config: {field} = \"{value}\" -- {reason}")]
    InvalidConfig {
        /// Which config field.
        field: String,
        /// The invalid value.
        value: String,
        /// Why it is invalid.
        reason: String,
    },

    // === I/O errors ===
    /// Wraps `std::io::Error` for config file operations.
    #[error("I/O error: {0}. Check file permissions and paths.")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the ledgerfuse crate hierarchy.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineError>();
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn display_messages_are_actionable() {
        let err = EngineError::StaleRuleVersion {
            expected: 4,
            actual: 6,
        };
        let msg = err.to_string();
        assert!(msg.contains("v4"));
        assert!(msg.contains("v6"));
        assert!(msg.contains("retry"), "should suggest recovery");

        let err = EngineError::DecisionNotFound {
            txn_id: "txn-19".into(),
        };
        assert!(err.to_string().contains("txn-19"));
        assert!(err.to_string().contains("Evaluate"));
    }

    #[test]
    fn conflicting_evidence_display() {
        let err = EngineError::ConflictingEvidence {
            vendor: "acme hardware".into(),
            variance: 0.1912,
            max_variance: 0.08,
            accounts: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("acme hardware"));
        assert!(msg.contains("0.1912"));
        assert!(msg.contains("review"));
    }

    #[test]
    fn signal_timeout_display_has_budget() {
        let err = EngineError::SignalTimeout {
            signal_source: "llm-bridge".into(),
            elapsed_ms: 2300,
            budget_ms: 2000,
        };
        let msg = err.to_string();
        assert!(msg.contains("llm-bridge"));
        assert!(msg.contains("2300"));
        assert!(msg.contains("2000"));
        assert!(msg.contains("without this signal"));
    }

    #[test]
    fn insufficient_sample_display() {
        let err = EngineError::InsufficientSample {
            needed: 100,
            actual: 17,
        };
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("17"));
    }

    #[test]
    fn candidate_already_decided_display() {
        let err = EngineError::CandidateAlreadyDecided {
            candidate_id: 12,
            status: "rejected".into(),
            decided_by: "ops@example".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("#12"));
        assert!(msg.contains("rejected"));
        assert!(msg.contains("ops@example"));
    }

    #[test]
    fn calibration_fit_failure_display() {
        let err = EngineError::CalibrationFitFailure {
            reason: "all labels identical".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("all labels identical"));
        assert!(msg.contains("Previous model"));
    }

    #[test]
    fn invalid_config_display() {
        let err = EngineError::InvalidConfig {
            field: "weights.rules".into(),
            value: "1.4".into(),
            reason: "weights must sum to 1.0".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("weights.rules"));
        assert!(msg.contains("1.4"));
        assert!(msg.contains("sum to 1.0"));
    }

    #[test]
    fn engine_result_alias_works() {
        let ok: EngineResult<u32> = Ok(7);
        assert!(ok.is_ok());
        let err: EngineResult<u32> = Err(EngineError::UnknownVersion { version_id: 99 });
        assert!(err.is_err());
    }
}
