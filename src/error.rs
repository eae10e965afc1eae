//! Error taxonomy shared across the kernel.
//!
//! - [`UsageError`]: malformed identifiers, rejected before anything is written.
//! - [`LookupError`]: references to trees, revisions, branches or classes that
//!   do not exist.
//! - Component-specific errors live next to their component and are
//!   aggregated by [`Error`].

use crate::config::ConfigError;
use crate::digest::DigestMismatch;
use crate::graph::GraphError;
use crate::ledger::LedgerError;
use crate::revision::RevisionId;
use crate::steps::StepError;
use crate::validate::ConsistencyError;

/// Malformed input. Raised immediately, never partially applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    /// One-shot tree name without the `component/tree` separator.
    #[error("one-shot tree name is missing slash: {0:?}")]
    MissingTreeSeparator(String),

    /// Regular tree names are plain component names.
    #[error("regular tree name cannot contain slash: {0:?}")]
    SeparatorInRegularTree(String),

    /// One-shot tree name with more than one separator.
    #[error("one-shot tree name must be exactly component/tree: {0:?}")]
    NestedTreeName(String),

    /// Component or tree name is empty.
    #[error("tree name must not be empty: {0:?}")]
    EmptyTreeName(String),

    /// Tree name collides with a reserved storage folder.
    #[error("tree name {0:?} is reserved")]
    ReservedTreeName(String),

    /// Tree name segment would escape or alias its storage folder.
    #[error("tree name {0:?} must not contain \".\" or \"..\" segments")]
    RelativeTreeName(String),

    /// Class name given with its module path.
    #[error("manager class name {0:?} must not include module name")]
    QualifiedClassName(String),

    /// Class name is empty.
    #[error("manager class name must not be empty")]
    EmptyClassName,

    /// Version is neither `X.Y.Z` nor a small integer.
    #[error("version {0:?} must be in X.Y.Z format or a small integer")]
    InvalidVersion(String),

    /// Dimensions namespace neither stored nor supplied.
    #[error("dimensions namespace is missing from stored configuration and was not supplied")]
    NamespaceRequired,

    /// Revision id is not 12 lowercase hex characters.
    #[error("malformed revision id: {0:?}")]
    MalformedRevisionId(String),

    /// No parts given for id derivation.
    #[error("revision id needs at least one part")]
    EmptyRevisionParts,

    /// One of the id parts is empty.
    #[error("revision id part {position} is empty")]
    EmptyRevisionPart {
        /// Index of the empty part.
        position: usize,
    },
}

/// Reference to something that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// No tree with this name.
    #[error("revision tree {0:?} does not exist")]
    TreeNotFound(String),

    /// No revision with this id.
    #[error("revision {0} does not exist")]
    RevisionNotFound(RevisionId),

    /// No revision carries this branch label.
    #[error("branch {0:?} does not exist")]
    BranchNotFound(String),

    /// Class name missing from a manager registry.
    #[error("manager class {0:?} is not registered")]
    ManagerNotRegistered(String),

    /// No step implementation registered for a revision.
    #[error("no migration step registered for revision {0}")]
    StepNotRegistered(RevisionId),
}

/// Any kernel error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// Missing tree, revision, branch or class.
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// Revision graph failure.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Ledger read failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Ledgers disagree.
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    /// Schema digest differs from the expected one.
    #[error(transparent)]
    Digest(#[from] DigestMismatch),

    /// Migration step failed or is unsupported.
    #[error(transparent)]
    Step(#[from] StepError),

    /// Environment configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias using the kernel [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
