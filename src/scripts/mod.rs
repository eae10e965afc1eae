//! Migration script storage backends.
//!
//! The graph builder and the tree registry only see [`ScriptStore`]; where the
//! revision documents physically live is up to the backend.

pub mod fs;
pub mod memory;

use crate::graph::RevisionNode;
use crate::trees::Location;

/// Trait for migration script storage backends.
///
/// Implementations must return folder names and revisions in a deterministic
/// (sorted) order.
pub trait ScriptStore {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether a folder exists.
    fn exists(&self, location: &Location) -> Result<bool, Self::Error>;

    /// Names of the sub-folders of a folder, `None` if the folder is missing.
    fn list_dirs(&self, location: &Location) -> Result<Option<Vec<String>>, Self::Error>;

    /// All revisions stored directly in a folder. A missing folder holds none.
    fn read_revisions(&self, location: &Location) -> Result<Vec<RevisionNode>, Self::Error>;

    /// Store a new revision in a folder, creating the folder if needed.
    ///
    /// Must fail rather than overwrite an existing revision with the same id.
    fn write_revision(&self, location: &Location, node: &RevisionNode) -> Result<(), Self::Error>;

    /// One-time initialization of the internal state folder.
    fn initialize(&self, engine: &Location) -> Result<(), Self::Error>;
}

pub use fs::{FsScriptStore, FsStoreError};
pub use memory::{InMemoryScriptError, InMemoryScriptStore};
