//! Cross-ledger consistency validation.
//!
//! The applied-migration ledger and the version ledger are maintained by
//! different mechanisms. Before a database is upgraded or downgraded both
//! must describe the same state: every applied revision is implied by some
//! component's recorded version, and every recorded version has its revision
//! applied. Root revisions of trees whose component has no recorded version
//! yet are tolerated.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::ledger::VersionRecord;
use crate::revision::RevisionId;

/// Disagreement between the two ledgers.
///
/// Never repaired automatically; fixing it takes an explicit administrative
/// action such as a stamp.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    /// Versions are recorded but nothing is applied.
    #[error("applied-migration ledger missing or empty")]
    AppliedLedgerMissing,

    /// Revisions are applied but no versions are recorded.
    #[error("component-version ledger is empty")]
    VersionLedgerEmpty,

    /// The ledgers disagree.
    #[error("ledgers are inconsistent --{}", describe(.applied_only, .version_only))]
    Diverged {
        /// Applied revisions not implied by any recorded version.
        applied_only: Vec<RevisionId>,
        /// Recorded versions whose revision is not applied.
        version_only: Vec<VersionRecord>,
    },
}

fn describe(applied_only: &[RevisionId], version_only: &[VersionRecord]) -> String {
    let mut msg = String::new();
    if !applied_only.is_empty() {
        let ids: Vec<&str> = applied_only.iter().map(RevisionId::as_str).collect();
        msg.push_str(" applied-only: ");
        msg.push_str(&ids.join(","));
    }
    if !version_only.is_empty() {
        if !msg.is_empty() {
            msg.push(';');
        }
        msg.push_str(" version-only:");
        for record in version_only {
            msg.push_str(&format!(
                " {}=({}, {}, {})",
                record.revision, record.component, record.class_name, record.version
            ));
        }
    }
    msg
}

impl ConsistencyError {
    /// Applied revisions not implied by any recorded version.
    pub fn applied_only(&self) -> &[RevisionId] {
        match self {
            Self::Diverged { applied_only, .. } => applied_only,
            _ => &[],
        }
    }

    /// Recorded versions whose revision is not applied.
    pub fn version_only(&self) -> &[VersionRecord] {
        match self {
            Self::Diverged { version_only, .. } => version_only,
            _ => &[],
        }
    }

    /// Report this error through `tracing`.
    pub fn log(&self) {
        match self {
            Self::Diverged {
                applied_only,
                version_only,
            } => {
                for id in applied_only {
                    tracing::error!(revision = %id, "Revision applied but not reflected by any component version");
                }
                for record in version_only {
                    tracing::error!(
                        revision = %record.revision,
                        component = %record.component,
                        class_name = %record.class_name,
                        version = %record.version,
                        "Component version has no applied revision"
                    );
                }
            }
            other => tracing::error!(error = %other, "Ledger consistency check failed"),
        }
    }
}

/// Check that the version records and the applied revisions agree.
///
/// Ids in `allowed_base_ids` are discounted on both sides.
pub fn validate(
    records: &BTreeMap<String, VersionRecord>,
    applied: &BTreeSet<RevisionId>,
    allowed_base_ids: &BTreeSet<RevisionId>,
) -> Result<(), ConsistencyError> {
    if !records.is_empty() && applied.is_empty() {
        return Err(ConsistencyError::AppliedLedgerMissing);
    }
    if records.is_empty() && !applied.is_empty() {
        return Err(ConsistencyError::VersionLedgerEmpty);
    }

    let implied: BTreeMap<&RevisionId, &VersionRecord> =
        records.values().map(|record| (&record.revision, record)).collect();

    let applied_only: Vec<RevisionId> = applied
        .iter()
        .filter(|id| !implied.contains_key(id) && !allowed_base_ids.contains(*id))
        .cloned()
        .collect();
    let version_only: Vec<VersionRecord> = implied
        .iter()
        .filter(|(id, _)| !applied.contains(**id) && !allowed_base_ids.contains(**id))
        .map(|(_, record)| (*record).clone())
        .collect();

    if applied_only.is_empty() && version_only.is_empty() {
        tracing::debug!(
            applied = applied.len(),
            versions = records.len(),
            "Ledgers are consistent"
        );
        return Ok(());
    }
    Err(ConsistencyError::Diverged {
        applied_only,
        version_only,
    })
}
