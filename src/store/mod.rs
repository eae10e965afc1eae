//! Ledger storage backends.
//!
//! Two independent ledgers live in the application database:
//!
//! - the attribute table, a flat `(name, value)` store holding component
//!   classes and versions ([`AttributeStore`]);
//! - the applied-revision table owned by the migration-execution engine
//!   ([`AppliedRevisionStore`]).

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::revision::RevisionId;

/// Trait for attribute-table backends.
///
/// Implementations must return rows in a deterministic order.
#[async_trait]
pub trait AttributeStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// All `(name, value)` rows, `None` if the table does not exist.
    async fn attributes(&self) -> Result<Option<Vec<(String, String)>>, Self::Error>;

    /// Value of a single attribute.
    async fn get(&self, name: &str) -> Result<Option<String>, Self::Error>;

    /// Update the value of an existing attribute.
    ///
    /// Returns the number of updated rows: 0 if no attribute matched, 1
    /// otherwise.
    async fn update(&self, name: &str, value: &str) -> Result<u64, Self::Error>;
}

/// Trait for applied-revision ledger backends.
#[async_trait]
pub trait AppliedRevisionStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Currently applied revisions, ordered by id.
    ///
    /// A ledger that does not exist yet yields an empty list.
    async fn applied_revisions(&self) -> Result<Vec<RevisionId>, Self::Error>;

    /// Record `revisions` as applied, optionally clearing the ledger first.
    async fn stamp(&self, revisions: &[RevisionId], purge: bool) -> Result<(), Self::Error>;
}

pub use memory::{InMemoryAppliedStore, InMemoryAttributeStore, InMemoryError};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresLedgerStore};
