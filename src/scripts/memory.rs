//! In-memory script store for testing.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use super::ScriptStore;
use crate::graph::RevisionNode;
use crate::revision::RevisionId;
use crate::trees::Location;

/// Error type for the in-memory store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryScriptError {
    /// A revision with this id is already stored in the folder.
    #[error("revision {id} already exists in {location}")]
    RevisionExists {
        /// Folder of the revision.
        location: Location,
        /// Conflicting id.
        id: RevisionId,
    },
}

#[derive(Debug, Default)]
struct Inner {
    /// Every existing folder.
    dirs: BTreeSet<Location>,
    /// Revisions by folder.
    revisions: BTreeMap<Location, BTreeMap<RevisionId, RevisionNode>>,
}

impl Inner {
    fn create_dir(&mut self, location: &Location) {
        let mut current = Some(location.clone());
        while let Some(location) = current {
            if location.is_root() {
                break;
            }
            current = location.parent();
            self.dirs.insert(location);
        }
    }
}

/// In-memory script store.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order.
#[derive(Debug, Default)]
pub struct InMemoryScriptStore {
    inner: RwLock<Inner>,
}

impl InMemoryScriptStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a folder (and its parents) without storing anything in it.
    pub fn create_dir(&self, location: &Location) {
        self.inner.write().create_dir(location);
    }

    /// Store a revision, replacing any revision with the same id.
    pub fn put(&self, location: &Location, node: RevisionNode) {
        let mut inner = self.inner.write();
        inner.create_dir(location);
        inner
            .revisions
            .entry(location.clone())
            .or_default()
            .insert(node.id.clone(), node);
    }

    /// Total number of stored revisions.
    pub fn num_revisions(&self) -> usize {
        self.inner.read().revisions.values().map(BTreeMap::len).sum()
    }
}

impl ScriptStore for InMemoryScriptStore {
    type Error = InMemoryScriptError;

    fn exists(&self, location: &Location) -> Result<bool, Self::Error> {
        Ok(location.is_root() || self.inner.read().dirs.contains(location))
    }

    fn list_dirs(&self, location: &Location) -> Result<Option<Vec<String>>, Self::Error> {
        if !self.exists(location)? {
            return Ok(None);
        }
        let inner = self.inner.read();
        let depth = location.segments().len();
        let names = inner
            .dirs
            .iter()
            .filter(|dir| dir.segments().len() == depth + 1 && dir.segments().starts_with(location.segments()))
            .filter_map(|dir| dir.segments().last().cloned())
            .collect();
        Ok(Some(names))
    }

    fn read_revisions(&self, location: &Location) -> Result<Vec<RevisionNode>, Self::Error> {
        Ok(self
            .inner
            .read()
            .revisions
            .get(location)
            .map(|nodes| nodes.values().cloned().collect())
            .unwrap_or_default())
    }

    fn write_revision(&self, location: &Location, node: &RevisionNode) -> Result<(), Self::Error> {
        let mut inner = self.inner.write();
        inner.create_dir(location);
        let nodes = inner.revisions.entry(location.clone()).or_default();
        if nodes.contains_key(&node.id) {
            return Err(InMemoryScriptError::RevisionExists {
                location: location.clone(),
                id: node.id.clone(),
            });
        }
        nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    fn initialize(&self, engine: &Location) -> Result<(), Self::Error> {
        self.create_dir(engine);
        Ok(())
    }
}
