//! Explicit migration context.
//!
//! Everything a ledger operation needs is carried by a [`MigrationContext`]
//! value passed in by the caller: the schema name, the SQL dialect and the two
//! ledger stores. There is no ambient "current context".

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::digest::{Dialect, DigestCheck, DigestPolicy, SchemaDigest, SqliteDialect};
use crate::error::{Result, UsageError};
use crate::ledger::{stamp_plan, AppliedLedger, VersionLedger, VersionRecord};
use crate::managers::ManagerRegistry;
use crate::revision::RevisionId;
use crate::store::{AppliedRevisionStore, AttributeStore};
use crate::validate::{self, ConsistencyError};

/// Handles for one migration run against one database.
pub struct MigrationContext<'a, A, R> {
    schema: Option<String>,
    dialect: Box<dyn Dialect>,
    attributes: &'a A,
    applied: &'a R,
}

impl<A, R> fmt::Debug for MigrationContext<'_, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationContext")
            .field("schema", &self.schema)
            .field("dialect", &self.dialect.name())
            .finish_non_exhaustive()
    }
}

impl<'a, A, R> MigrationContext<'a, A, R>
where
    A: AttributeStore,
    R: AppliedRevisionStore,
{
    /// Create a context over the two ledger stores, using the SQLite dialect
    /// and no schema.
    pub fn new(attributes: &'a A, applied: &'a R) -> Self {
        Self {
            schema: None,
            dialect: Box::new(SqliteDialect),
            attributes,
            applied,
        }
    }

    /// Set the schema (namespace) holding the ledgers.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Set the SQL dialect.
    pub fn with_dialect<D: Dialect + 'static>(mut self, dialect: D) -> Self {
        self.dialect = Box::new(dialect);
        self
    }

    /// Schema holding the ledgers.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// SQL dialect of the database.
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Whether the database is SQLite.
    pub fn is_sqlite(&self) -> bool {
        self.dialect.name() == "sqlite"
    }

    /// Version-ledger reader.
    pub fn versions(&self) -> VersionLedger<'a, A> {
        VersionLedger::new(self.attributes)
    }

    /// Applied-ledger reader.
    pub fn applied(&self) -> AppliedLedger<'a, R> {
        AppliedLedger::new(self.applied)
    }

    /// Current version records keyed by component.
    pub async fn manager_versions(&self, namespace: Option<&str>) -> Result<BTreeMap<String, VersionRecord>> {
        Ok(self.versions().manager_versions(namespace).await?)
    }

    /// Currently applied revisions.
    pub async fn applied_revisions(&self) -> Result<BTreeSet<RevisionId>> {
        Ok(self.applied().applied_revisions().await?)
    }

    /// Namespace stored in the dimensions blob, if any.
    pub async fn dimensions_namespace(&self) -> Result<Option<String>> {
        Ok(self.versions().dimensions_namespace().await?)
    }

    /// Check that both ledgers agree.
    ///
    /// `namespace` stands in for a dimensions namespace missing from storage;
    /// `base_revisions` are tree roots tolerated in the applied ledger.
    pub async fn validate_revisions(
        &self,
        namespace: Option<&str>,
        base_revisions: &BTreeSet<RevisionId>,
    ) -> Result<()> {
        let records = self.manager_versions(namespace).await?;
        let applied = self.applied_revisions().await?;
        validate::validate(&records, &applied, base_revisions).map_err(|e| {
            e.log();
            e.into()
        })
    }

    /// Write the revisions implied by the version ledger into the applied
    /// ledger.
    ///
    /// Returns the revisions per component. Nothing is written when
    /// `dry_run` is set.
    pub async fn stamp(
        &self,
        namespace: Option<&str>,
        purge: bool,
        dry_run: bool,
    ) -> Result<BTreeMap<String, RevisionId>> {
        let records = self.manager_versions(namespace).await?;
        let plan = stamp_plan(&records);
        for (component, revision) in &plan {
            tracing::debug!(component = %component, revision = %revision, "Stamp revision");
        }
        if dry_run {
            tracing::info!(count = plan.len(), "Dry run, applied ledger left unchanged");
            return Ok(plan);
        }
        let revisions: Vec<RevisionId> = plan.values().cloned().collect();
        self.applied().stamp(&revisions, purge).await?;
        Ok(plan)
    }

    /// Checks that must pass before an upgrade.
    pub async fn preflight_upgrade(
        &self,
        namespace: Option<&str>,
        base_revisions: &BTreeSet<RevisionId>,
    ) -> Result<()> {
        self.validate_revisions(namespace, base_revisions).await
    }

    /// Checks that must pass before a downgrade.
    ///
    /// A namespace is required when storage has none, and migrating down from
    /// an empty applied ledger is refused.
    pub async fn preflight_downgrade(
        &self,
        namespace: Option<&str>,
        base_revisions: &BTreeSet<RevisionId>,
    ) -> Result<()> {
        if namespace.is_none() && self.dimensions_namespace().await?.is_none() {
            return Err(UsageError::NamespaceRequired.into());
        }
        if self.applied_revisions().await?.is_empty() {
            let e = ConsistencyError::AppliedLedgerMissing;
            e.log();
            return Err(e.into());
        }
        self.validate_revisions(namespace, base_revisions).await
    }

    /// Compare a recorded digest with the registered implementation of
    /// `class_name`, rendered in this context's dialect.
    pub fn verify_digest(
        &self,
        registry: &ManagerRegistry,
        class_name: &str,
        expected: &SchemaDigest,
        policy: DigestPolicy,
    ) -> Result<DigestCheck> {
        registry.verify(class_name, expected, self.dialect(), policy)
    }
}
