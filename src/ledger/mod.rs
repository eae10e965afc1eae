//! Ledger readers.
//!
//! The version ledger is reconstructed from the flat attribute table; the
//! applied ledger is the set of revision ids the execution engine recorded.
//! Both are read through the async store traits in [`crate::store`].

mod applied;
mod versions;

pub use applied::AppliedLedger;
pub use versions::{parse_manager_versions, stamp_plan, VersionLedger, VersionRecord};

use thiserror::Error;

/// Attribute-key prefix mapping a component to its implementing class.
pub const MANAGER_KEY_PREFIX: &str = "config:registry.managers.";

/// Attribute-key prefix mapping a class (or namespace) to its version.
pub const VERSION_KEY_PREFIX: &str = "version:";

/// Attribute key of the dimensions-configuration blob.
pub const DIMENSIONS_JSON_KEY: &str = "config:dimensions.json";

/// Pseudo-component tracking the dimensions configuration.
pub const DIMENSIONS_CONFIG_MANAGER: &str = "dimensions-config";

/// Attribute key of the obscore-configuration blob.
pub const OBSCORE_JSON_KEY: &str = "config:obscore.json";

/// Pseudo-component tracking the obscore configuration.
pub const OBSCORE_CONFIG_MANAGER: &str = "obscore-config";

/// Errors raised while reading or updating the ledgers.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The attribute table has not been created.
    #[error("attribute table does not exist")]
    AttributesMissing,

    /// A JSON blob stored in the attribute table could not be decoded.
    #[error("attribute {key:?} is not valid JSON: {source}")]
    InvalidBlob {
        /// Attribute key.
        key: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// A JSON blob decodes to something other than an object.
    #[error("attribute {key:?} is not a JSON object")]
    NotAnObject {
        /// Attribute key.
        key: String,
    },

    /// A JSON blob lacks a mandatory field or holds it with the wrong type.
    #[error("attribute {key:?} has no usable {field:?} field")]
    InvalidField {
        /// Attribute key.
        key: String,
        /// Field name.
        field: &'static str,
    },

    /// The dimensions blob is absent, so it cannot be updated.
    #[error("attribute {DIMENSIONS_JSON_KEY:?} does not exist")]
    DimensionsConfigMissing,

    /// The dimensions namespace is already set and replacing it was not
    /// requested.
    #[error("dimensions namespace is already defined ({0})")]
    NamespaceDefined(String),

    /// Backend failure.
    #[error("ledger storage error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    pub(crate) fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
        Self::Store(Box::new(e))
    }
}
