//! # revision-kernel
//!
//! Revision graphs and ledger consistency for schema migrations.
//!
//! A long-lived database evolves through migration steps grouped into one
//! tree per independently versioned component. The kernel answers two
//! questions:
//!
//! > Which step comes next for a component, and what is its identity?
//!
//! > Do the applied-migration ledger and the component-version ledger agree?
//!
//! It never executes SQL; an external engine runs the steps.
//!
//! ## Architecture
//!
//! ```text
//! rev_id ─→ RevisionGraphBuilder ─→ ScriptStore (filesystem or memory)
//!                   ↓
//!            MigrationTrees (regular / one-shot)
//!
//! AttributeStore ─→ VersionLedger ─┐
//!                                  ├─→ validate ─→ ConsistencyError
//! AppliedRevisionStore ─→ AppliedLedger ─┘
//!
//! TableShape + Dialect ─→ schema_digest ─→ verify_digest
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same (component, class, version) → identical revision id
//! - A tree root's id depends on the component name alone
//! - Schema digests ignore declaration order of columns, constraints and tables

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod digest;
pub mod error;
pub mod graph;
pub mod ledger;
pub mod managers;
pub mod revision;
pub mod scripts;
pub mod steps;
pub mod store;
pub mod telemetry;
pub mod trees;
pub mod validate;

// Re-exports
pub use config::{ConfigError, MigrationsConfig};
pub use context::MigrationContext;
pub use digest::{
    schema_digest, table_repr, verify_digest, ColumnShape, ColumnType, Dialect, DigestCheck,
    DigestMismatch, DigestPolicy, ForeignKeyShape, PostgresDialect, SchemaDigest, SqliteDialect,
    TableShape,
};
pub use error::{Error, LookupError, Result, UsageError};
pub use graph::{GraphError, RevisionGraph, RevisionGraphBuilder, RevisionNode, StepSpec};
pub use ledger::{
    parse_manager_versions, stamp_plan, AppliedLedger, LedgerError, VersionLedger, VersionRecord,
};
pub use managers::{ManagerRegistry, ManagerSchema};
pub use revision::{rev_id, try_rev_id, RevisionId, REVISION_NAMESPACE};
pub use scripts::{FsScriptStore, InMemoryScriptStore, ScriptStore};
pub use steps::{MigrationStep, StepError, StepRegistry};
pub use store::{AppliedRevisionStore, AttributeStore, InMemoryAppliedStore, InMemoryAttributeStore};
#[cfg(feature = "postgres")]
pub use store::{PostgresConfig, PostgresLedgerStore};
pub use telemetry::{init_tracing, try_init_tracing};
pub use trees::{Location, MigrationTrees, OneShotTree, TreeName};
pub use validate::{validate, ConsistencyError};
