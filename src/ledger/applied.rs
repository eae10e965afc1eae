//! Applied-migration ledger.

use std::collections::BTreeSet;

use super::LedgerError;
use crate::revision::RevisionId;
use crate::store::AppliedRevisionStore;

/// Reader for the set of revisions recorded as applied.
#[derive(Debug)]
pub struct AppliedLedger<'a, R> {
    store: &'a R,
}

impl<'a, R: AppliedRevisionStore> AppliedLedger<'a, R> {
    /// Create a reader over an applied-revision store.
    pub fn new(store: &'a R) -> Self {
        Self { store }
    }

    /// Currently applied revisions; empty if the ledger does not exist yet.
    pub async fn applied_revisions(&self) -> Result<BTreeSet<RevisionId>, LedgerError> {
        let revisions: BTreeSet<RevisionId> = self
            .store
            .applied_revisions()
            .await
            .map_err(LedgerError::store)?
            .into_iter()
            .collect();
        tracing::debug!(count = revisions.len(), "Read applied revisions");
        Ok(revisions)
    }

    /// Record `revisions` as applied, clearing the ledger first if `purge`.
    pub async fn stamp(&self, revisions: &[RevisionId], purge: bool) -> Result<(), LedgerError> {
        self.store
            .stamp(revisions, purge)
            .await
            .map_err(LedgerError::store)
    }
}
