//! Registry of component implementations.
//!
//! Implementations are looked up by class-name string through factories the
//! caller registers up front; nothing is loaded by name at runtime.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::digest::{schema_digest, verify_digest, Dialect, DigestCheck, DigestPolicy, SchemaDigest, TableShape};
use crate::error::{LookupError, Result};

/// Schema description of one component implementation at one version.
pub trait ManagerSchema: Send + Sync {
    /// Version of the schema this implementation creates.
    fn version(&self) -> &str;

    /// Tables owned by the implementation.
    fn tables(&self) -> Vec<TableShape>;

    /// Columns forced to nullable when digesting.
    fn nullable_columns(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Digest of [`ManagerSchema::tables`] for `dialect`.
    fn schema_digest(&self, dialect: &dyn Dialect) -> SchemaDigest {
        schema_digest(&self.tables(), dialect, &self.nullable_columns())
    }
}

type ManagerFactory = Box<dyn Fn() -> Box<dyn ManagerSchema> + Send + Sync>;

/// Factories for [`ManagerSchema`] implementations keyed by class name.
#[derive(Default)]
pub struct ManagerRegistry {
    factories: BTreeMap<String, ManagerFactory>,
}

impl fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("classes", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ManagerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `class_name`, replacing any previous one.
    pub fn register<F, M>(&mut self, class_name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: ManagerSchema + 'static,
    {
        self.factories
            .insert(class_name.into(), Box::new(move || Box::new(factory()) as Box<dyn ManagerSchema>));
        self
    }

    /// Whether `class_name` is registered.
    pub fn contains(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    /// Registered class names, sorted.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate the implementation registered under `class_name`.
    pub fn create(&self, class_name: &str) -> Result<Box<dyn ManagerSchema>, LookupError> {
        self.factories
            .get(class_name)
            .map(|factory| factory())
            .ok_or_else(|| LookupError::ManagerNotRegistered(class_name.to_string()))
    }

    /// Schema digest of the implementation registered under `class_name`.
    pub fn digest(&self, class_name: &str, dialect: &dyn Dialect) -> Result<SchemaDigest, LookupError> {
        Ok(self.create(class_name)?.schema_digest(dialect))
    }

    /// Compare a recorded digest with the registered implementation's.
    pub fn verify(
        &self,
        class_name: &str,
        expected: &SchemaDigest,
        dialect: &dyn Dialect,
        policy: DigestPolicy,
    ) -> Result<DigestCheck> {
        let actual = self.digest(class_name, dialect)?;
        tracing::debug!(class_name = class_name, dialect = dialect.name(), digest = %actual, "Computed schema digest");
        Ok(verify_digest(expected, &actual, policy)?)
    }
}
