//! Migration step implementations.
//!
//! The execution engine owns the context type `C` (a connection, a
//! transaction, a recording fake in tests) and drives the steps; the kernel
//! only keys them by revision id and distinguishes a downgrade that does not
//! exist by design from one that failed.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::error::LookupError;
use crate::graph::RevisionGraph;
use crate::revision::RevisionId;

/// Outcome of a step that did not complete.
#[derive(Debug, Error)]
pub enum StepError {
    /// The operation does not exist for this step, e.g. a downgrade that
    /// cannot restore deleted rows.
    #[error("operation not supported: {reason}")]
    Unsupported {
        /// What makes the operation impossible.
        reason: String,
    },

    /// The operation was attempted and failed.
    #[error("migration step failed: {source}")]
    Failed {
        /// Underlying failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StepError {
    /// An operation that is unsupported by design.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }

    /// Wrap an unexpected failure.
    pub fn failed<E: std::error::Error + Send + Sync + 'static>(source: E) -> Self {
        Self::Failed {
            source: Box::new(source),
        }
    }

    /// Whether the operation is unsupported rather than failed.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

/// One migration step.
pub trait MigrationStep<C>: Send + Sync {
    /// Apply the step.
    fn upgrade(&self, ctx: &mut C) -> Result<(), StepError>;

    /// Revert the step. Unsupported unless overridden.
    fn downgrade(&self, _ctx: &mut C) -> Result<(), StepError> {
        Err(StepError::unsupported("downgrade is not implemented"))
    }
}

/// Step implementations keyed by revision id.
pub struct StepRegistry<C> {
    steps: BTreeMap<RevisionId, Box<dyn MigrationStep<C>>>,
}

impl<C> Default for StepRegistry<C> {
    fn default() -> Self {
        Self {
            steps: BTreeMap::new(),
        }
    }
}

impl<C> fmt::Debug for StepRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("revisions", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<C> StepRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the implementation of `revision`, replacing any previous one.
    pub fn register<S>(&mut self, revision: RevisionId, step: S) -> &mut Self
    where
        S: MigrationStep<C> + 'static,
    {
        self.steps.insert(revision, Box::new(step));
        self
    }

    /// Number of registered steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no step is registered.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Implementation of `revision`.
    pub fn get(&self, revision: &RevisionId) -> Result<&dyn MigrationStep<C>, LookupError> {
        self.steps
            .get(revision)
            .map(|step| step.as_ref())
            .ok_or_else(|| LookupError::StepNotRegistered(revision.clone()))
    }

    /// Non-root revisions of `graph` without a registered implementation.
    pub fn missing(&self, graph: &RevisionGraph) -> Vec<RevisionId> {
        graph
            .history()
            .into_iter()
            .filter(|node| !node.is_root() && !self.steps.contains_key(&node.id))
            .map(|node| node.id.clone())
            .collect()
    }

    /// Run the upgrade of `revision`.
    pub fn upgrade(&self, revision: &RevisionId, ctx: &mut C) -> crate::Result<()> {
        let step = self.get(revision)?;
        tracing::info!(revision = %revision, "Running upgrade");
        step.upgrade(ctx).map_err(|e| {
            tracing::error!(revision = %revision, error = %e, "Upgrade failed");
            e.into()
        })
    }

    /// Run the downgrade of `revision`.
    pub fn downgrade(&self, revision: &RevisionId, ctx: &mut C) -> crate::Result<()> {
        let step = self.get(revision)?;
        tracing::info!(revision = %revision, "Running downgrade");
        step.downgrade(ctx).map_err(|e| {
            if e.is_unsupported() {
                tracing::warn!(revision = %revision, error = %e, "Downgrade not supported");
            } else {
                tracing::error!(revision = %revision, error = %e, "Downgrade failed");
            }
            e.into()
        })
    }
}
