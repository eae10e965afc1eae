//! Migration tree registry.
//!
//! Knows where every migration tree lives inside the script storage:
//!
//! ```text
//! <root>/
//!   _engine/                 internal state of the graph storage
//!   _oneshot/<component>/<tree>/   one-shot trees
//!   <component>/             regular tree of a component
//! ```
//!
//! A regular tree is the default linear history of one component. A one-shot
//! tree is an alternate history, addressed as `"component/tree"`, that can be
//! swapped in place of the component's regular tree for a single run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::UsageError;
use crate::revision::RevisionId;
use crate::scripts::ScriptStore;

/// Reserved folder holding internal graph-storage state.
pub const ENGINE_FOLDER: &str = "_engine";

/// Reserved folder holding one-shot trees.
pub const ONE_SHOT_FOLDER: &str = "_oneshot";

/// Separator between component and tree name in a one-shot tree name.
pub const TREE_SEPARATOR: char = '/';

/// Storage-independent address of a folder of revisions.
///
/// A location is a path of segments relative to the top-level migrations
/// folder; the empty location is that folder itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location(Vec<String>);

impl Location {
    /// The top-level migrations folder.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a location from its segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Location of a child folder.
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Path segments, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether this is the top-level folder.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Parent location, `None` for the top-level folder.
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.0.split_last()?;
        Some(Self(init.to_vec()))
    }

    /// Recover the one-shot tree addressed by this location, if it is one.
    pub fn one_shot_tree(&self) -> Option<OneShotTree> {
        match self.0.as_slice() {
            [folder, component, name] if folder == ONE_SHOT_FOLDER => {
                OneShotTree::new(component.as_str(), name.as_str()).ok()
            }
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str(".");
        }
        f.write_str(&self.0.join("/"))
    }
}

/// Reject segments that would resolve outside their parent folder.
fn check_segment(segment: &str, full: &str) -> Result<(), UsageError> {
    if segment == "." || segment == ".." {
        return Err(UsageError::RelativeTreeName(full.to_string()));
    }
    Ok(())
}

/// Component names become top-level folders and must not shadow reserved ones.
fn check_component(component: &str, full: &str) -> Result<(), UsageError> {
    check_segment(component, full)?;
    if component == ENGINE_FOLDER || component == ONE_SHOT_FOLDER {
        return Err(UsageError::ReservedTreeName(full.to_string()));
    }
    Ok(())
}

/// Name of a one-shot tree: `component/tree`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OneShotTree {
    component: String,
    name: String,
}

impl OneShotTree {
    /// Create a one-shot tree name from its two halves.
    pub fn new(component: impl Into<String>, name: impl Into<String>) -> Result<Self, UsageError> {
        let component = component.into();
        let name = name.into();
        if component.is_empty() || name.is_empty() {
            return Err(UsageError::EmptyTreeName(format!("{component}{TREE_SEPARATOR}{name}")));
        }
        let full = format!("{component}{TREE_SEPARATOR}{name}");
        if component.contains(TREE_SEPARATOR) || name.contains(TREE_SEPARATOR) {
            return Err(UsageError::NestedTreeName(full));
        }
        check_component(&component, &full)?;
        check_segment(name.as_str(), &full)?;
        Ok(Self { component, name })
    }

    /// Component whose regular tree this one replaces.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Tree name within the component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage location of this tree.
    pub fn location(&self) -> Location {
        Location::new([ONE_SHOT_FOLDER, self.component.as_str(), self.name.as_str()])
    }
}

impl fmt::Display for OneShotTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.component, TREE_SEPARATOR, self.name)
    }
}

impl FromStr for OneShotTree {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(TREE_SEPARATOR) {
            Some((component, name)) => Self::new(component, name),
            None => Err(UsageError::MissingTreeSeparator(s.to_string())),
        }
    }
}

/// A tree selected by name, regular or one-shot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TreeName {
    /// Default history of a component.
    Regular(String),
    /// Alternate history of a component.
    OneShot(OneShotTree),
}

impl TreeName {
    /// Parse a tree name, `one_shot` selecting which form is expected.
    pub fn parse(name: &str, one_shot: bool) -> Result<Self, UsageError> {
        if one_shot {
            return Ok(Self::OneShot(name.parse()?));
        }
        if name.is_empty() {
            return Err(UsageError::EmptyTreeName(name.to_string()));
        }
        if name.contains(TREE_SEPARATOR) {
            return Err(UsageError::SeparatorInRegularTree(name.to_string()));
        }
        check_component(name, name)?;
        Ok(Self::Regular(name.to_string()))
    }

    /// Parse a tree name, treating any name with a slash as one-shot.
    pub fn infer(name: &str) -> Result<Self, UsageError> {
        Self::parse(name, name.contains(TREE_SEPARATOR))
    }

    /// Component the tree belongs to.
    pub fn component(&self) -> &str {
        match self {
            Self::Regular(component) => component,
            Self::OneShot(tree) => tree.component(),
        }
    }

    /// Storage location of the tree.
    pub fn location(&self) -> Location {
        match self {
            Self::Regular(component) => Location::new([component.as_str()]),
            Self::OneShot(tree) => tree.location(),
        }
    }

    /// Whether this is a one-shot tree.
    pub fn is_one_shot(&self) -> bool {
        matches!(self, Self::OneShot(_))
    }
}

impl fmt::Display for TreeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular(component) => f.write_str(component),
            Self::OneShot(tree) => tree.fmt(f),
        }
    }
}

/// Registry of migration trees kept in a script store.
#[derive(Debug)]
pub struct MigrationTrees<'a, S> {
    store: &'a S,
}

impl<'a, S: ScriptStore> MigrationTrees<'a, S> {
    /// Create a registry over a script store.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Location of the internal graph-storage state.
    pub fn engine_location(&self) -> Location {
        Location::new([ENGINE_FOLDER])
    }

    /// Location of a component's regular tree. The folder may not exist yet.
    pub fn regular_location(&self, component: &str) -> Location {
        Location::new([component])
    }

    /// Location of a one-shot tree. The folder may not exist yet.
    pub fn one_shot_location(&self, component: &str, tree_name: &str) -> Result<Location, UsageError> {
        Ok(OneShotTree::new(component, tree_name)?.location())
    }

    /// Location of a single tree; a name containing a slash selects a one-shot tree.
    pub fn single_tree_location(&self, name: &str) -> Result<Location, UsageError> {
        Ok(TreeName::infer(name)?.location())
    }

    /// All regular trees, keyed by component name.
    pub fn list_regular_trees(&self) -> Result<BTreeMap<String, Location>, S::Error> {
        let root = Location::root();
        let names = self.store.list_dirs(&root)?.unwrap_or_default();
        let locations: BTreeMap<String, Location> = names
            .into_iter()
            .filter(|name| name != ENGINE_FOLDER && name != ONE_SHOT_FOLDER)
            .map(|name| {
                let location = root.join(name.as_str());
                (name, location)
            })
            .collect();
        tracing::debug!(count = locations.len(), "Enumerated regular trees");
        Ok(locations)
    }

    /// One-shot trees keyed by `"component/tree"`, optionally for one component.
    ///
    /// Missing containers are treated as empty.
    pub fn list_one_shot_trees(
        &self,
        component: Option<&str>,
    ) -> Result<BTreeMap<String, Location>, S::Error> {
        let mut locations = BTreeMap::new();
        let one_shot_root = Location::new([ONE_SHOT_FOLDER]);

        let components = match component {
            Some(component) => vec![component.to_string()],
            None => match self.store.list_dirs(&one_shot_root)? {
                Some(names) => names,
                None => return Ok(locations),
            },
        };

        for component in components {
            let component_location = one_shot_root.join(component.as_str());
            let Some(names) = self.store.list_dirs(&component_location)? else {
                continue;
            };
            for name in names {
                let key = format!("{component}{TREE_SEPARATOR}{name}");
                locations.insert(key, component_location.join(name));
            }
        }
        Ok(locations)
    }

    /// Locations of every regular tree, with one component's tree swapped for
    /// a one-shot tree when an override is given.
    pub fn resolve_locations(
        &self,
        override_tree: Option<&OneShotTree>,
    ) -> Result<Vec<Location>, S::Error> {
        let mut locations = self.list_regular_trees()?;
        if let Some(tree) = override_tree {
            tracing::debug!(tree = %tree, "Substituting one-shot tree");
            locations.insert(tree.component().to_string(), tree.location());
        }
        Ok(locations.into_values().collect())
    }

    /// Root revision ids of every regular tree.
    ///
    /// These are legitimate entries in the applied-revision ledger for trees
    /// that have no recorded component version yet.
    pub fn base_revisions(&self) -> Result<BTreeSet<RevisionId>, S::Error> {
        Ok(self
            .list_regular_trees()?
            .keys()
            .map(|component| RevisionId::root(component))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RevisionNode;
    use crate::scripts::InMemoryScriptStore;

    fn store_with(locations: &[Location]) -> InMemoryScriptStore {
        let store = InMemoryScriptStore::new();
        for location in locations {
            store.create_dir(location);
        }
        store
    }

    #[test]
    fn test_one_shot_round_trip() {
        let tree = OneShotTree::new("datasets", "int_1.0.0_to_uuid_1.0.0").unwrap();
        let parsed: OneShotTree = tree.to_string().parse().unwrap();
        assert_eq!(parsed.component(), "datasets");
        assert_eq!(parsed.name(), "int_1.0.0_to_uuid_1.0.0");
        assert_eq!(tree.location().one_shot_tree(), Some(tree));
    }

    #[test]
    fn test_one_shot_name_errors() {
        assert!(matches!(
            "datasets".parse::<OneShotTree>(),
            Err(UsageError::MissingTreeSeparator(_))
        ));
        assert!(matches!(
            "datasets/".parse::<OneShotTree>(),
            Err(UsageError::EmptyTreeName(_))
        ));
        assert!(matches!(
            "datasets/a/b".parse::<OneShotTree>(),
            Err(UsageError::NestedTreeName(_))
        ));
    }

    #[test]
    fn test_tree_names_stay_inside_their_folder() {
        for name in ["../evil", "./x", "datasets/..", "datasets/."] {
            assert!(
                matches!(name.parse::<OneShotTree>(), Err(UsageError::RelativeTreeName(_))),
                "{name} accepted"
            );
        }
        for name in [".", ".."] {
            assert!(matches!(
                TreeName::parse(name, false),
                Err(UsageError::RelativeTreeName(_))
            ));
        }
        assert!(matches!(
            TreeName::parse(ENGINE_FOLDER, false),
            Err(UsageError::ReservedTreeName(_))
        ));
        assert!(matches!(
            TreeName::parse(ONE_SHOT_FOLDER, false),
            Err(UsageError::ReservedTreeName(_))
        ));
        assert!(matches!(
            "_oneshot/x".parse::<OneShotTree>(),
            Err(UsageError::ReservedTreeName(_))
        ));
        // dots inside a name are fine
        assert!("datasets/int_1.0.0_to_uuid_1.0.0".parse::<OneShotTree>().is_ok());
        assert!(TreeName::parse("..datasets", false).is_ok());
    }

    #[test]
    fn test_tree_name_parse() {
        assert_eq!(
            TreeName::parse("datasets", false).unwrap(),
            TreeName::Regular("datasets".into())
        );
        assert!(matches!(
            TreeName::parse("datasets/x", false),
            Err(UsageError::SeparatorInRegularTree(_))
        ));
        assert!(TreeName::parse("datasets/x", true).unwrap().is_one_shot());
        assert!(TreeName::infer("datasets/x").unwrap().is_one_shot());
        assert!(!TreeName::infer("datasets").unwrap().is_one_shot());
    }

    #[test]
    fn test_list_regular_skips_reserved() {
        let store = store_with(&[
            Location::new(["_engine"]),
            Location::new(["_oneshot", "datasets", "x"]),
            Location::new(["datasets"]),
            Location::new(["collections"]),
        ]);
        let trees = MigrationTrees::new(&store);
        let regular = trees.list_regular_trees().unwrap();
        assert_eq!(
            regular.keys().cloned().collect::<Vec<_>>(),
            vec!["collections".to_string(), "datasets".to_string()]
        );
    }

    #[test]
    fn test_list_one_shot_missing_containers() {
        let store = InMemoryScriptStore::new();
        let trees = MigrationTrees::new(&store);
        assert!(trees.list_one_shot_trees(None).unwrap().is_empty());
        assert!(trees.list_one_shot_trees(Some("datasets")).unwrap().is_empty());

        let store = store_with(&[
            Location::new(["_oneshot", "datasets", "int_to_uuid"]),
            Location::new(["_oneshot", "collections", "name_to_int"]),
        ]);
        let trees = MigrationTrees::new(&store);
        let all = trees.list_one_shot_trees(None).unwrap();
        assert_eq!(
            all.keys().cloned().collect::<Vec<_>>(),
            vec!["collections/name_to_int".to_string(), "datasets/int_to_uuid".to_string()]
        );
        let only = trees.list_one_shot_trees(Some("datasets")).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(
            only["datasets/int_to_uuid"],
            Location::new(["_oneshot", "datasets", "int_to_uuid"])
        );
    }

    #[test]
    fn test_resolve_locations_substitutes_override() {
        let store = store_with(&[
            Location::new(["datasets"]),
            Location::new(["collections"]),
            Location::new(["_oneshot", "datasets", "int_to_uuid"]),
        ]);
        let trees = MigrationTrees::new(&store);

        let plain = trees.resolve_locations(None).unwrap();
        assert_eq!(plain, vec![Location::new(["collections"]), Location::new(["datasets"])]);

        let tree: OneShotTree = "datasets/int_to_uuid".parse().unwrap();
        let swapped = trees.resolve_locations(Some(&tree)).unwrap();
        assert_eq!(
            swapped,
            vec![
                Location::new(["collections"]),
                Location::new(["_oneshot", "datasets", "int_to_uuid"]),
            ]
        );
    }

    #[test]
    fn test_base_revisions() {
        let store = InMemoryScriptStore::new();
        let root = RevisionNode::root("datasets");
        store.put(&Location::new(["datasets"]), root);
        let trees = MigrationTrees::new(&store);
        let bases = trees.base_revisions().unwrap();
        assert!(bases.contains(&RevisionId::root("datasets")));
        assert_eq!(bases.len(), 1);
    }

    #[test]
    fn test_one_shot_location() {
        let store = InMemoryScriptStore::new();
        let trees = MigrationTrees::new(&store);
        assert_eq!(
            trees.one_shot_location("datasets", "x").unwrap().to_string(),
            "_oneshot/datasets/x"
        );
        assert!(trees.one_shot_location("datasets", "").is_err());
        assert_eq!(trees.regular_location("datasets").to_string(), "datasets");
        assert_eq!(Location::root().to_string(), ".");
    }
}
