//! Append-only audit trail for rule-set mutations.
//!
//! Every mutating operation on the version store -- promote, reject,
//! rollback -- records an entry here, on success *and* on failure, so the
//! trail is never silent about attempted changes. Entries are immutable
//! once recorded and strictly ordered by sequence number.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which store operation an audit entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Candidates promoted into a new rule version.
    Promote,
    /// A candidate rejected by a reviewer.
    Reject,
    /// The rule set rolled back to an earlier version (by copy).
    Rollback,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Promote => write!(f, "promote"),
            Self::Reject => write!(f, "reject"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Whether the attempted action was applied or refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The mutation was applied.
    Applied,
    /// The mutation was refused; the store is unchanged.
    Refused {
        /// Why the mutation was refused.
        reason: String,
    },
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Strictly increasing sequence number.
    pub seq: u64,
    /// The attempted operation.
    pub action: AuditAction,
    /// Whether it was applied.
    pub outcome: AuditOutcome,
    /// Version created by the operation, when one was.
    pub version_id: Option<u64>,
    /// Version the operation referenced (rollback target, promotion base).
    pub target_version_id: Option<u64>,
    /// Candidates the operation referenced.
    pub candidate_ids: Vec<u64>,
    /// Who initiated the operation.
    pub author: String,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit log.
///
/// Not internally synchronized: the version store records entries while
/// holding its own state lock, which also serializes the log.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one entry, assigning the next sequence number.
    pub fn record(
        &mut self,
        action: AuditAction,
        outcome: AuditOutcome,
        version_id: Option<u64>,
        target_version_id: Option<u64>,
        candidate_ids: Vec<u64>,
        author: &str,
        at: DateTime<Utc>,
    ) {
        let seq = self.entries.len() as u64 + 1;
        let entry = AuditEntry {
            seq,
            action,
            outcome,
            version_id,
            target_version_id,
            candidate_ids,
            author: author.to_owned(),
            timestamp: at,
        };
        tracing::info!(
            target: "ledgerfuse",
            seq,
            action = %entry.action,
            applied = matches!(entry.outcome, AuditOutcome::Applied),
            author = %entry.author,
            "audit entry recorded"
        );
        self.entries.push(entry);
    }

    /// All entries in recording order.
    #[must_use]
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
