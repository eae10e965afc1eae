//! Filesystem script store.
//!
//! Each location maps to a directory below the top-level migrations folder
//! and each revision to a JSON document named `<revision>.json`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::ScriptStore;
use crate::graph::RevisionNode;
use crate::trees::Location;

/// File extension of revision documents.
const REVISION_EXTENSION: &str = "json";

/// Name of the document written by [`ScriptStore::initialize`].
const ENVIRONMENT_FILE: &str = "environment.json";

/// Format version of the stored documents.
pub const SCRIPT_FORMAT_VERSION: u32 = 1;

/// Error type for the filesystem store.
#[derive(Debug, thiserror::Error)]
pub enum FsStoreError {
    /// Filesystem access failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A document could not be decoded or encoded.
    #[error("invalid revision document {path}: {source}")]
    Document {
        /// Path of the document.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl FsStoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }

    fn document(path: &Path, source: serde_json::Error) -> Self {
        Self::Document { path: path.to_path_buf(), source }
    }
}

/// Contents of the environment document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Environment {
    format_version: u32,
    created_at: chrono::DateTime<Utc>,
}

/// Script store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsScriptStore {
    root: PathBuf,
}

impl FsScriptStore {
    /// Create a store over the top-level migrations folder.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Top-level migrations folder.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of a location.
    pub fn path_of(&self, location: &Location) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(location.segments());
        path
    }

    fn revision_path(&self, location: &Location, node: &RevisionNode) -> PathBuf {
        self.path_of(location)
            .join(format!("{}.{}", node.id, REVISION_EXTENSION))
    }
}

impl ScriptStore for FsScriptStore {
    type Error = FsStoreError;

    fn exists(&self, location: &Location) -> Result<bool, Self::Error> {
        let path = self.path_of(location);
        path.try_exists().map_err(|e| FsStoreError::io(&path, e))
    }

    fn list_dirs(&self, location: &Location) -> Result<Option<Vec<String>>, Self::Error> {
        let path = self.path_of(location);
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FsStoreError::io(&path, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsStoreError::io(&path, e))?;
            let file_type = entry.file_type().map_err(|e| FsStoreError::io(&entry.path(), e))?;
            if !file_type.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(Some(names))
    }

    fn read_revisions(&self, location: &Location) -> Result<Vec<RevisionNode>, Self::Error> {
        let path = self.path_of(location);
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FsStoreError::io(&path, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsStoreError::io(&path, e))?;
            let file_path = entry.path();
            let is_document = file_path.extension().and_then(|ext| ext.to_str()) == Some(REVISION_EXTENSION);
            if is_document && file_path.is_file() {
                files.push(file_path);
            }
        }
        files.sort();

        let mut nodes = Vec::with_capacity(files.len());
        for file in files {
            let bytes = fs::read(&file).map_err(|e| FsStoreError::io(&file, e))?;
            let node: RevisionNode =
                serde_json::from_slice(&bytes).map_err(|e| FsStoreError::document(&file, e))?;
            nodes.push(node);
        }
        tracing::trace!(location = %location, count = nodes.len(), "Read revision documents");
        Ok(nodes)
    }

    fn write_revision(&self, location: &Location, node: &RevisionNode) -> Result<(), Self::Error> {
        let dir = self.path_of(location);
        fs::create_dir_all(&dir).map_err(|e| FsStoreError::io(&dir, e))?;

        let path = self.revision_path(location, node);
        let bytes = serde_json::to_vec_pretty(node).map_err(|e| FsStoreError::document(&path, e))?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| FsStoreError::io(&path, e))?;
        file.write_all(&bytes).map_err(|e| FsStoreError::io(&path, e))?;
        file.write_all(b"\n").map_err(|e| FsStoreError::io(&path, e))?;
        Ok(())
    }

    fn initialize(&self, engine: &Location) -> Result<(), Self::Error> {
        let dir = self.path_of(engine);
        fs::create_dir_all(&dir).map_err(|e| FsStoreError::io(&dir, e))?;

        let path = dir.join(ENVIRONMENT_FILE);
        let environment = Environment {
            format_version: SCRIPT_FORMAT_VERSION,
            created_at: Utc::now(),
        };
        let bytes =
            serde_json::to_vec_pretty(&environment).map_err(|e| FsStoreError::document(&path, e))?;
        fs::write(&path, bytes).map_err(|e| FsStoreError::io(&path, e))?;
        Ok(())
    }
}
