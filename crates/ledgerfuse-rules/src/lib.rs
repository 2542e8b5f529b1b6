//! Evidence aggregation and versioned rule management for ledgerfuse.
//!
//! This crate provides:
//! - **`EvidenceLedger`**: Welford-based incremental statistics per
//!   (vendor, account) pair, with idempotent promotion into rule candidates
//!   and cross-account conflict detection.
//! - **`RuleVersionStore`**: immutable, append-only rule-set snapshots with
//!   read-only dry-run simulation, optimistic promotion, copy-forward
//!   rollback, and a full audit trail.

pub mod audit;
pub mod evidence;
pub mod version_store;

pub use audit::{AuditAction, AuditEntry, AuditLog, AuditOutcome};
pub use evidence::EvidenceLedger;
pub use version_store::{DEFAULT_MIN_DRY_RUN_SAMPLE, ImpactReport, RuleVersionStore};
