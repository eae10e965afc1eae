//! In-memory ledger stores for testing.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{AppliedRevisionStore, AttributeStore};
use crate::revision::RevisionId;

/// Error type for in-memory stores.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// Updating an attribute in a table that does not exist.
    #[error("ledger table does not exist")]
    TableMissing,
}

/// In-memory attribute table.
///
/// `None` models a table that has not been created.
#[derive(Debug, Default)]
pub struct InMemoryAttributeStore {
    rows: RwLock<Option<BTreeMap<String, String>>>,
}

impl InMemoryAttributeStore {
    /// Create an existing, empty attribute table.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Some(BTreeMap::new())),
        }
    }

    /// Create a store whose table does not exist.
    pub fn missing() -> Self {
        Self::default()
    }

    /// Create a table holding `rows`.
    pub fn with_rows<I, K, V>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let rows = rows.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self {
            rows: RwLock::new(Some(rows)),
        }
    }

    /// Insert or replace an attribute, creating the table if needed.
    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        self.rows
            .write()
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
    }

    /// Delete an attribute, returning its value.
    pub fn remove(&self, name: &str) -> Option<String> {
        self.rows.write().as_mut().and_then(|rows| rows.remove(name))
    }
}

#[async_trait]
impl AttributeStore for InMemoryAttributeStore {
    type Error = InMemoryError;

    async fn attributes(&self) -> Result<Option<Vec<(String, String)>>, Self::Error> {
        Ok(self.rows.read().as_ref().map(|rows| {
            rows.iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect()
        }))
    }

    async fn get(&self, name: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.rows.read().as_ref().and_then(|rows| rows.get(name).cloned()))
    }

    async fn update(&self, name: &str, value: &str) -> Result<u64, Self::Error> {
        let mut guard = self.rows.write();
        let rows = guard.as_mut().ok_or(InMemoryError::TableMissing)?;
        match rows.get_mut(name) {
            Some(existing) => {
                *existing = value.to_string();
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

/// In-memory applied-revision ledger.
#[derive(Debug, Default)]
pub struct InMemoryAppliedStore {
    revisions: RwLock<Option<BTreeSet<RevisionId>>>,
}

impl InMemoryAppliedStore {
    /// Create a ledger whose table does not exist yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger holding `revisions`.
    pub fn with_revisions<I: IntoIterator<Item = RevisionId>>(revisions: I) -> Self {
        Self {
            revisions: RwLock::new(Some(revisions.into_iter().collect())),
        }
    }

    /// Delete one revision, returning whether it was present.
    pub fn remove(&self, revision: &RevisionId) -> bool {
        self.revisions
            .write()
            .as_mut()
            .map(|set| set.remove(revision))
            .unwrap_or(false)
    }
}

#[async_trait]
impl AppliedRevisionStore for InMemoryAppliedStore {
    type Error = InMemoryError;

    async fn applied_revisions(&self) -> Result<Vec<RevisionId>, Self::Error> {
        Ok(self
            .revisions
            .read()
            .as_ref()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn stamp(&self, revisions: &[RevisionId], purge: bool) -> Result<(), Self::Error> {
        let mut guard = self.revisions.write();
        let set = guard.get_or_insert_with(BTreeSet::new);
        if purge {
            set.clear();
        }
        set.extend(revisions.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_attribute_table() {
        let store = InMemoryAttributeStore::missing();
        assert!(store.attributes().await.unwrap().is_none());
        assert!(matches!(store.update("a", "b").await, Err(InMemoryError::TableMissing)));
    }

    #[tokio::test]
    async fn test_update_counts_rows() {
        let store = InMemoryAttributeStore::with_rows([("version:Manager", "1.0.0")]);
        assert_eq!(store.update("version:Manager", "2.0.0").await.unwrap(), 1);
        assert_eq!(store.update("version:Other", "2.0.0").await.unwrap(), 0);
        assert_eq!(store.get("version:Manager").await.unwrap().as_deref(), Some("2.0.0"));
    }

    #[tokio::test]
    async fn test_applied_ledger_missing_is_empty() {
        let store = InMemoryAppliedStore::new();
        assert!(store.applied_revisions().await.unwrap().is_empty());

        let a = RevisionId::root("a");
        let b = RevisionId::root("b");
        store.stamp(&[a.clone()], false).await.unwrap();
        store.stamp(&[b.clone()], false).await.unwrap();
        assert_eq!(store.applied_revisions().await.unwrap().len(), 2);

        store.stamp(&[b.clone()], true).await.unwrap();
        assert_eq!(store.applied_revisions().await.unwrap(), vec![b.clone()]);
        assert!(store.remove(&b));
        assert!(!store.remove(&a));
    }
}
