//! Version ledger: component versions recorded in the attribute table.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    LedgerError, DIMENSIONS_CONFIG_MANAGER, DIMENSIONS_JSON_KEY, MANAGER_KEY_PREFIX,
    OBSCORE_CONFIG_MANAGER, OBSCORE_JSON_KEY, VERSION_KEY_PREFIX,
};
use crate::revision::RevisionId;
use crate::store::AttributeStore;

/// Current version of one component, as recorded in the attribute table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Component name, e.g. `datasets`.
    pub component: String,
    /// Implementing class name, possibly module-qualified.
    pub class_name: String,
    /// Version string.
    pub version: String,
    /// Revision id implied by this record.
    pub revision: RevisionId,
}

impl VersionRecord {
    /// Build a record, deriving its revision id from the bare class name.
    pub fn new(
        component: impl Into<String>,
        class_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let component = component.into();
        let class_name = class_name.into();
        let version = version.into();
        let revision = RevisionId::step(&component, bare_class_name(&class_name), &version);
        Self {
            component,
            class_name,
            version,
            revision,
        }
    }

    /// Class name without its module path.
    pub fn bare_class_name(&self) -> &str {
        bare_class_name(&self.class_name)
    }
}

impl fmt::Display for VersionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {} -> {}",
            self.component, self.class_name, self.version, self.revision
        )
    }
}

fn bare_class_name(class_name: &str) -> &str {
    class_name.rsplit('.').next().unwrap_or(class_name)
}

/// Drop the pseudo-class prefix used to keep obscore namespaces apart from
/// dimensions namespaces.
fn strip_pseudo_prefix(class_name: &str) -> &str {
    class_name.rsplit(':').next().unwrap_or(class_name)
}

/// Reconstruct per-component version records from attribute rows.
///
/// `fallback_namespace` stands in for the dimensions namespace when the
/// stored dimensions blob does not carry one; with neither, the
/// dimensions pseudo-component is left out. Components whose class has no
/// recorded version are omitted.
pub fn parse_manager_versions<I, K, V>(
    rows: I,
    fallback_namespace: Option<&str>,
) -> Result<BTreeMap<String, VersionRecord>, LedgerError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut managers: BTreeMap<String, String> = BTreeMap::new();
    let mut versions: BTreeMap<String, String> = BTreeMap::new();

    for (name, value) in rows {
        let (name, value) = (name.as_ref(), value.as_ref());
        if let Some(rest) = name.strip_prefix(MANAGER_KEY_PREFIX) {
            let component = rest.rsplit('.').next().unwrap_or(rest);
            managers.insert(component.to_string(), value.to_string());
        } else if let Some(class_name) = name.strip_prefix(VERSION_KEY_PREFIX) {
            versions.insert(class_name.to_string(), value.to_string());
        } else if name == DIMENSIONS_JSON_KEY {
            let blob = decode_blob(name, value)?;
            let namespace = blob_namespace(name, &blob)?
                .or_else(|| fallback_namespace.map(str::to_string));
            match namespace {
                Some(namespace) => {
                    let version = blob_version(name, &blob)?;
                    managers.insert(DIMENSIONS_CONFIG_MANAGER.to_string(), namespace.clone());
                    versions.insert(namespace, version);
                }
                None => {
                    tracing::warn!(
                        key = name,
                        "Dimensions configuration has no namespace, skipping pseudo-component"
                    );
                }
            }
        } else if name == OBSCORE_JSON_KEY {
            let blob = decode_blob(name, value)?;
            let namespace = blob_namespace(name, &blob)?.ok_or(LedgerError::InvalidField {
                key: name.to_string(),
                field: "namespace",
            })?;
            let pseudo_class = format!("{OBSCORE_CONFIG_MANAGER}:{namespace}");
            let version = blob_version(name, &blob)?;
            managers.insert(OBSCORE_CONFIG_MANAGER.to_string(), pseudo_class.clone());
            versions.insert(pseudo_class, version);
        }
    }

    let mut records = BTreeMap::new();
    for (component, class_name) in managers {
        match versions.get(&class_name).filter(|v| !v.is_empty()) {
            Some(version) => {
                let record = VersionRecord::new(
                    component.as_str(),
                    strip_pseudo_prefix(&class_name),
                    version.as_str(),
                );
                tracing::debug!(
                    component = %record.component,
                    class_name = %record.class_name,
                    version = %record.version,
                    revision = %record.revision,
                    "Found component version"
                );
                records.insert(component, record);
            }
            None => {
                tracing::debug!(component = %component, class_name = %class_name, "Component has no recorded version");
            }
        }
    }
    Ok(records)
}

/// Revision ids a stamp of the applied ledger would write, per component.
pub fn stamp_plan(records: &BTreeMap<String, VersionRecord>) -> BTreeMap<String, RevisionId> {
    records
        .iter()
        .map(|(component, record)| (component.clone(), record.revision.clone()))
        .collect()
}

fn decode_blob(key: &str, value: &str) -> Result<Map<String, Value>, LedgerError> {
    let value: Value = serde_json::from_str(value).map_err(|source| LedgerError::InvalidBlob {
        key: key.to_string(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(LedgerError::NotAnObject { key: key.to_string() }),
    }
}

fn blob_namespace(key: &str, blob: &Map<String, Value>) -> Result<Option<String>, LedgerError> {
    match blob.get("namespace") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(namespace)) => Ok(Some(namespace.clone())),
        Some(_) => Err(LedgerError::InvalidField {
            key: key.to_string(),
            field: "namespace",
        }),
    }
}

fn blob_version(key: &str, blob: &Map<String, Value>) -> Result<String, LedgerError> {
    match blob.get("version") {
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(LedgerError::InvalidField {
            key: key.to_string(),
            field: "version",
        }),
    }
}

/// Reader and updater for the version ledger.
#[derive(Debug)]
pub struct VersionLedger<'a, A> {
    store: &'a A,
}

impl<'a, A: AttributeStore> VersionLedger<'a, A> {
    /// Create a reader over an attribute store.
    pub fn new(store: &'a A) -> Self {
        Self { store }
    }

    /// Current version records keyed by component.
    ///
    /// Fails with [`LedgerError::AttributesMissing`] if the attribute table
    /// does not exist.
    pub async fn manager_versions(
        &self,
        fallback_namespace: Option<&str>,
    ) -> Result<BTreeMap<String, VersionRecord>, LedgerError> {
        let rows = self
            .store
            .attributes()
            .await
            .map_err(LedgerError::store)?
            .ok_or(LedgerError::AttributesMissing)?;
        tracing::debug!(rows = rows.len(), "Scanning attribute table");
        parse_manager_versions(rows, fallback_namespace)
    }

    /// Version records sorted by component, for reporting.
    pub async fn current_versions(
        &self,
        fallback_namespace: Option<&str>,
    ) -> Result<Vec<VersionRecord>, LedgerError> {
        Ok(self
            .manager_versions(fallback_namespace)
            .await?
            .into_values()
            .collect())
    }

    /// Namespace stored in the dimensions blob, if any.
    pub async fn dimensions_namespace(&self) -> Result<Option<String>, LedgerError> {
        let value = self
            .store
            .get(DIMENSIONS_JSON_KEY)
            .await
            .map_err(LedgerError::store)?;
        match value {
            Some(value) => blob_namespace(DIMENSIONS_JSON_KEY, &decode_blob(DIMENSIONS_JSON_KEY, &value)?),
            None => Ok(None),
        }
    }

    /// Store `namespace` in the dimensions blob.
    ///
    /// An existing namespace is only overwritten when `replace` is set.
    pub async fn set_dimensions_namespace(&self, namespace: &str, replace: bool) -> Result<(), LedgerError> {
        let value = self
            .store
            .get(DIMENSIONS_JSON_KEY)
            .await
            .map_err(LedgerError::store)?
            .ok_or(LedgerError::DimensionsConfigMissing)?;
        let mut blob = decode_blob(DIMENSIONS_JSON_KEY, &value)?;
        if let Some(existing) = blob_namespace(DIMENSIONS_JSON_KEY, &blob)? {
            if !replace {
                return Err(LedgerError::NamespaceDefined(existing));
            }
        }
        blob.insert("namespace".to_string(), Value::String(namespace.to_string()));
        let encoded = Value::Object(blob).to_string();
        let updated = self
            .store
            .update(DIMENSIONS_JSON_KEY, &encoded)
            .await
            .map_err(LedgerError::store)?;
        if updated == 0 {
            return Err(LedgerError::DimensionsConfigMissing);
        }
        tracing::info!(namespace = namespace, "Updated dimensions namespace");
        Ok(())
    }

    /// Record a new version for an implementing class.
    ///
    /// Returns the number of updated rows.
    pub async fn update_manager_version(&self, class_name: &str, version: &str) -> Result<u64, LedgerError> {
        let key = format!("{VERSION_KEY_PREFIX}{class_name}");
        let updated = self.store.update(&key, version).await.map_err(LedgerError::store)?;
        tracing::debug!(key = %key, version = version, updated = updated, "Updated component version");
        Ok(updated)
    }

    /// Record a new implementing class for a component.
    ///
    /// Returns the number of updated rows.
    pub async fn update_manager_class(&self, component: &str, class_name: &str) -> Result<u64, LedgerError> {
        let key = format!("{MANAGER_KEY_PREFIX}{component}");
        let updated = self
            .store
            .update(&key, class_name)
            .await
            .map_err(LedgerError::store)?;
        tracing::debug!(key = %key, class_name = class_name, updated = updated, "Updated component class");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAttributeStore;

    fn manager_rows() -> Vec<(&'static str, &'static str)> {
        vec![
            ("config:registry.managers.manager1", "pkg1.module1.Manager1"),
            ("config:registry.managers.manager2", "Manager2"),
            ("version:pkg1.module1.Manager1", "0.0.1"),
            ("version:Manager2", "1.0.0"),
        ]
    }

    #[test]
    fn test_manager_versions() {
        let records = parse_manager_versions(manager_rows(), None).unwrap();
        assert_eq!(records.len(), 2);

        let manager1 = &records["manager1"];
        assert_eq!(manager1.class_name, "pkg1.module1.Manager1");
        assert_eq!(manager1.version, "0.0.1");
        assert_eq!(manager1.revision.as_str(), "bd85e44c6aa0");
        assert_eq!(manager1.bare_class_name(), "Manager1");

        let manager2 = &records["manager2"];
        assert_eq!(manager2.revision.as_str(), "ba07609e034b");
        assert_eq!(
            manager2.to_string(),
            "manager2: Manager2 1.0.0 -> ba07609e034b"
        );
    }

    #[test]
    fn test_class_without_version_is_omitted() {
        let mut rows = manager_rows();
        rows.push(("config:registry.managers.datastores", "pkg.Datastore"));
        rows.push(("version:Unused", "3.0.0"));
        let records = parse_manager_versions(rows, None).unwrap();
        assert_eq!(records.keys().collect::<Vec<_>>(), vec!["manager1", "manager2"]);
    }

    #[test]
    fn test_dimensions_pseudo_component() {
        let rows = vec![(DIMENSIONS_JSON_KEY, r#"{"version": 2, "namespace": "daf_butler"}"#)];
        let records = parse_manager_versions(rows, None).unwrap();
        let record = &records[DIMENSIONS_CONFIG_MANAGER];
        assert_eq!(record.class_name, "daf_butler");
        assert_eq!(record.version, "2");
        assert_eq!(record.revision, RevisionId::step("dimensions-config", "daf_butler", "2"));
    }

    #[test]
    fn test_dimensions_namespace_fallback() {
        let rows = vec![(DIMENSIONS_JSON_KEY, r#"{"version": 1}"#)];
        assert!(parse_manager_versions(rows.clone(), None).unwrap().is_empty());

        let records = parse_manager_versions(rows, Some("daf_butler")).unwrap();
        assert_eq!(records[DIMENSIONS_CONFIG_MANAGER].class_name, "daf_butler");

        // a stored namespace wins over the fallback
        let rows = vec![(DIMENSIONS_JSON_KEY, r#"{"version": 1, "namespace": "stored"}"#)];
        let records = parse_manager_versions(rows, Some("fallback")).unwrap();
        assert_eq!(records[DIMENSIONS_CONFIG_MANAGER].class_name, "stored");
    }

    #[test]
    fn test_obscore_pseudo_component() {
        let rows = vec![
            (DIMENSIONS_JSON_KEY, r#"{"version": 1, "namespace": "daf_butler"}"#),
            (OBSCORE_JSON_KEY, r#"{"version": 1, "namespace": "daf_butler"}"#),
        ];
        let records = parse_manager_versions(rows, None).unwrap();
        // same namespace, no collision between the two pseudo-components
        assert_eq!(records.len(), 2);
        let obscore = &records[OBSCORE_CONFIG_MANAGER];
        assert_eq!(obscore.class_name, "daf_butler");
        assert_eq!(obscore.revision, RevisionId::step("obscore-config", "daf_butler", "1"));
    }

    #[test]
    fn test_obscore_requires_namespace() {
        let rows = vec![(OBSCORE_JSON_KEY, r#"{"version": 1}"#)];
        assert!(matches!(
            parse_manager_versions(rows, Some("ignored")),
            Err(LedgerError::InvalidField { field: "namespace", .. })
        ));

        let rows = vec![(OBSCORE_JSON_KEY, "not json")];
        assert!(matches!(
            parse_manager_versions(rows, None),
            Err(LedgerError::InvalidBlob { .. })
        ));

        let rows = vec![(DIMENSIONS_JSON_KEY, "[1, 2]")];
        assert!(matches!(
            parse_manager_versions(rows, None),
            Err(LedgerError::NotAnObject { key }) if key == DIMENSIONS_JSON_KEY
        ));
    }

    #[test]
    fn test_stamp_plan() {
        let records = parse_manager_versions(manager_rows(), None).unwrap();
        let plan = stamp_plan(&records);
        assert_eq!(plan["manager1"].as_str(), "bd85e44c6aa0");
        assert_eq!(plan["manager2"].as_str(), "ba07609e034b");
    }

    #[tokio::test]
    async fn test_reader_over_store() {
        let store = InMemoryAttributeStore::with_rows(manager_rows());
        let ledger = VersionLedger::new(&store);
        let current = ledger.current_versions(None).await.unwrap();
        assert_eq!(current[0].component, "manager1");

        assert_eq!(ledger.update_manager_version("Manager2", "2.0.0").await.unwrap(), 1);
        assert_eq!(ledger.update_manager_version("Missing", "2.0.0").await.unwrap(), 0);
        let records = ledger.manager_versions(None).await.unwrap();
        assert_eq!(records["manager2"].revision, RevisionId::step("manager2", "Manager2", "2.0.0"));

        let missing = InMemoryAttributeStore::missing();
        assert!(matches!(
            VersionLedger::new(&missing).manager_versions(None).await,
            Err(LedgerError::AttributesMissing)
        ));
    }

    #[tokio::test]
    async fn test_set_dimensions_namespace() {
        let store = InMemoryAttributeStore::with_rows([(DIMENSIONS_JSON_KEY, r#"{"version": 1}"#)]);
        let ledger = VersionLedger::new(&store);
        assert_eq!(ledger.dimensions_namespace().await.unwrap(), None);

        ledger.set_dimensions_namespace("daf_butler", false).await.unwrap();
        assert_eq!(ledger.dimensions_namespace().await.unwrap().as_deref(), Some("daf_butler"));

        assert!(matches!(
            ledger.set_dimensions_namespace("other", false).await,
            Err(LedgerError::NamespaceDefined(ns)) if ns == "daf_butler"
        ));
        ledger.set_dimensions_namespace("other", true).await.unwrap();
        assert_eq!(ledger.dimensions_namespace().await.unwrap().as_deref(), Some("other"));

        let empty = InMemoryAttributeStore::new();
        assert!(matches!(
            VersionLedger::new(&empty).set_dimensions_namespace("x", false).await,
            Err(LedgerError::DimensionsConfigMissing)
        ));
    }
}
