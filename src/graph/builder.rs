//! Creating and extending migration trees.

use std::sync::OnceLock;

use regex_lite::Regex;

use super::{GraphError, RevisionGraph, RevisionNode, StepSpec};
use crate::error::{LookupError, UsageError};
use crate::revision::RevisionId;
use crate::scripts::ScriptStore;
use crate::trees::{MigrationTrees, OneShotTree, TreeName};

/// Separator between a module path and a class name.
const MODULE_SEPARATOR: char = '.';

/// Accepted version strings: `X.Y.Z` or a small integer.
fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+\.\d+\.\d+|\d{1,6})$").expect("version pattern is valid"))
}

/// Builder for the step DAG kept in a script store.
#[derive(Debug)]
pub struct RevisionGraphBuilder<'a, S> {
    store: &'a S,
    trees: MigrationTrees<'a, S>,
}

impl<'a, S: ScriptStore> RevisionGraphBuilder<'a, S> {
    /// Create a builder over a script store.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            trees: MigrationTrees::new(store),
        }
    }

    /// Tree registry of the underlying store.
    pub fn trees(&self) -> &MigrationTrees<'a, S> {
        &self.trees
    }

    /// Create the root revision of a new tree.
    ///
    /// `tree_name` is a component name, or `component/tree` when `one_shot`
    /// is set. The root id is derived from the component alone, so a one-shot
    /// tree shares its root id with the component's regular tree; at most one
    /// of them is loaded in any run.
    pub fn create_tree(&self, tree_name: &str, one_shot: bool) -> Result<RevisionNode, GraphError> {
        let tree = TreeName::parse(tree_name, one_shot)?;
        let location = tree.location();
        if self.store.exists(&location).map_err(GraphError::storage)? {
            return Err(GraphError::TreeExists {
                tree: tree.to_string(),
                location,
            });
        }

        let engine = self.trees.engine_location();
        if !self.store.exists(&engine).map_err(GraphError::storage)? {
            tracing::info!(location = %engine, "Initializing graph storage");
            self.store.initialize(&engine).map_err(GraphError::storage)?;
        }

        let root = RevisionNode::root(tree.component());
        self.store
            .write_revision(&location, &root)
            .map_err(GraphError::storage)?;
        tracing::info!(tree = %tree, revision = %root.id, "Created revision tree");
        Ok(root)
    }

    /// Add a step introducing `version` of `class_name` to a tree.
    ///
    /// In a regular tree the step extends the `"{component}-{class_name}"`
    /// branch when it exists, and otherwise opens that branch off the tree
    /// root. In a one-shot tree the step extends the tree's single head.
    pub fn add_step(
        &self,
        tree_name: &str,
        class_name: &str,
        version: &str,
        one_shot: bool,
    ) -> Result<RevisionNode, GraphError> {
        validate_class_name(class_name)?;
        validate_version(version)?;

        let tree = TreeName::parse(tree_name, one_shot)?;
        let location = tree.location();
        let graph = RevisionGraph::load(self.store, std::slice::from_ref(&location))?;

        let node = match &tree {
            TreeName::Regular(component) => {
                let root = RevisionId::root(component);
                if !graph.contains(&root) {
                    return Err(LookupError::TreeNotFound(tree.to_string()).into());
                }
                let spec = StepSpec::new(component.as_str(), class_name, version);
                let branch = spec.branch_label();
                if graph.has_branch(&branch) {
                    let head = graph.branch_head(&branch)?.id.clone();
                    RevisionNode::step(spec, head, None)
                } else {
                    tracing::debug!(tree = %tree, branch = %branch, "Splicing new branch off tree root");
                    RevisionNode::step(spec, root, Some(branch))
                }
            }
            TreeName::OneShot(_) => {
                let bases = graph.bases();
                let root = match bases.as_slice() {
                    [root] => *root,
                    [] => return Err(LookupError::TreeNotFound(tree.to_string()).into()),
                    _ => {
                        return Err(GraphError::RootCount {
                            tree: tree.to_string(),
                            count: bases.len(),
                        })
                    }
                };
                let component = root.tree_name();
                let head = graph.branch_head(&component)?.id.clone();
                RevisionNode::step(StepSpec::new(component, class_name, version), head, None)
            }
        };

        if graph.contains(&node.id) {
            return Err(GraphError::RevisionExists(node.id));
        }
        self.store
            .write_revision(&location, &node)
            .map_err(GraphError::storage)?;
        tracing::info!(
            tree = %tree,
            revision = %node.id,
            class_name = class_name,
            version = version,
            "Added revision"
        );
        Ok(node)
    }

    /// Names of the known trees, sorted.
    ///
    /// Regular trees are named by their roots; one-shot trees by their
    /// `component/tree` address.
    pub fn list_trees(&self, one_shot: bool) -> Result<Vec<String>, GraphError> {
        if one_shot {
            let trees = self
                .trees
                .list_one_shot_trees(None)
                .map_err(GraphError::storage)?;
            return Ok(trees.into_keys().collect());
        }
        let graph = self.load_graph(None)?;
        Ok(graph.trees().into_keys().collect())
    }

    /// Load the graph for a multi-component run, optionally with one
    /// component's regular tree replaced by a one-shot tree.
    pub fn load_graph(&self, override_tree: Option<&OneShotTree>) -> Result<RevisionGraph, GraphError> {
        let locations = self
            .trees
            .resolve_locations(override_tree)
            .map_err(GraphError::storage)?;
        RevisionGraph::load(self.store, &locations)
    }

    /// Load a single tree; a name containing a slash selects a one-shot tree.
    pub fn load_tree(&self, tree_name: &str) -> Result<RevisionGraph, GraphError> {
        let location = self.trees.single_tree_location(tree_name)?;
        if !self.store.exists(&location).map_err(GraphError::storage)? {
            return Err(LookupError::TreeNotFound(tree_name.to_string()).into());
        }
        RevisionGraph::load(self.store, std::slice::from_ref(&location))
    }
}

fn validate_class_name(class_name: &str) -> Result<(), UsageError> {
    if class_name.is_empty() {
        return Err(UsageError::EmptyClassName);
    }
    if class_name.contains(MODULE_SEPARATOR) {
        return Err(UsageError::QualifiedClassName(class_name.to_string()));
    }
    Ok(())
}

fn validate_version(version: &str) -> Result<(), UsageError> {
    if !version_pattern().is_match(version) {
        return Err(UsageError::InvalidVersion(version.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripts::InMemoryScriptStore;
    use crate::trees::Location;

    #[test]
    fn test_create_tree_initializes_storage_once() {
        let store = InMemoryScriptStore::new();
        let builder = RevisionGraphBuilder::new(&store);

        let root = builder.create_tree("datasets", false).unwrap();
        assert_eq!(root.id, RevisionId::root("datasets"));
        assert!(store.exists(&Location::new(["_engine"])).unwrap());

        builder.create_tree("collections", false).unwrap();
        assert!(matches!(
            builder.create_tree("datasets", false),
            Err(GraphError::TreeExists { .. })
        ));
        assert_eq!(builder.list_trees(false).unwrap(), vec!["collections", "datasets"]);
    }

    #[test]
    fn test_create_tree_rejects_escaping_and_reserved_names() {
        let store = InMemoryScriptStore::new();
        let builder = RevisionGraphBuilder::new(&store);
        builder.create_tree("datasets", false).unwrap();

        assert!(matches!(
            builder.create_tree("../evil", true),
            Err(GraphError::Usage(UsageError::RelativeTreeName(_)))
        ));
        assert!(!store.exists(&Location::new(["evil"])).unwrap());
        for reserved in ["_oneshot", "_engine"] {
            assert!(matches!(
                builder.create_tree(reserved, false),
                Err(GraphError::Usage(UsageError::ReservedTreeName(_)))
            ));
        }

        assert_eq!(builder.list_trees(false).unwrap(), vec!["datasets"]);
        assert_eq!(
            builder.trees().base_revisions().unwrap(),
            std::collections::BTreeSet::from([RevisionId::root("datasets")])
        );
    }

    #[test]
    fn test_add_step_linear_per_class() {
        let store = InMemoryScriptStore::new();
        let builder = RevisionGraphBuilder::new(&store);
        builder.create_tree("datasets", false).unwrap();

        let first = builder.add_step("datasets", "ClassA", "1.0.0", false).unwrap();
        assert_eq!(first.parents, vec![RevisionId::root("datasets")]);
        assert!(first.branch_labels.contains("datasets-ClassA"));

        let second = builder.add_step("datasets", "ClassA", "2.0.0", false).unwrap();
        assert_eq!(second.parents, vec![first.id.clone()]);
        assert!(second.branch_labels.is_empty());

        let other = builder.add_step("datasets", "ClassB", "1.0.0", false).unwrap();
        assert_eq!(other.parents, vec![RevisionId::root("datasets")]);

        // a second implementation class keeps the tree name stable
        assert_eq!(builder.list_trees(false).unwrap(), vec!["datasets"]);
    }

    #[test]
    fn test_add_step_usage_errors() {
        let store = InMemoryScriptStore::new();
        let builder = RevisionGraphBuilder::new(&store);
        builder.create_tree("datasets", false).unwrap();

        assert!(matches!(
            builder.add_step("datasets", "pkg.module.ClassA", "1.0.0", false),
            Err(GraphError::Usage(UsageError::QualifiedClassName(_)))
        ));
        assert!(matches!(
            builder.add_step("datasets", "ClassA", "1.0", false),
            Err(GraphError::Usage(UsageError::InvalidVersion(_)))
        ));
        assert!(matches!(
            builder.add_step("missing", "ClassA", "1.0.0", false),
            Err(GraphError::Lookup(LookupError::TreeNotFound(_)))
        ));
        // nothing was written by the failed calls
        assert_eq!(store.num_revisions(), 1);

        builder.add_step("datasets", "ClassA", "1.0.0", false).unwrap();
        assert!(matches!(
            builder.add_step("datasets", "ClassA", "1.0.0", false),
            Err(GraphError::RevisionExists(_))
        ));
    }

    #[test]
    fn test_integer_versions_accepted() {
        let store = InMemoryScriptStore::new();
        let builder = RevisionGraphBuilder::new(&store);
        builder.create_tree("dimensions-config", false).unwrap();
        let node = builder.add_step("dimensions-config", "daf_butler", "2", false).unwrap();
        assert_eq!(node.id, RevisionId::step("dimensions-config", "daf_butler", "2"));
    }

    #[test]
    fn test_one_shot_tree() {
        let store = InMemoryScriptStore::new();
        let builder = RevisionGraphBuilder::new(&store);
        builder.create_tree("datasets", false).unwrap();

        assert!(matches!(
            builder.create_tree("datasets", true),
            Err(GraphError::Usage(UsageError::MissingTreeSeparator(_)))
        ));
        let root = builder.create_tree("datasets/int_1.0.0_to_uuid_1.0.0", true).unwrap();
        assert_eq!(root.id, RevisionId::root("datasets"));

        let step = builder
            .add_step(
                "datasets/int_1.0.0_to_uuid_1.0.0",
                "ByDimensionsDatasetRecordStorageManagerUUID",
                "1.0.0",
                true,
            )
            .unwrap();
        assert_eq!(step.id.as_str(), "2101fbf51ad3");
        assert_eq!(step.parents, vec![root.id.clone()]);

        let next = builder
            .add_step("datasets/int_1.0.0_to_uuid_1.0.0", "Other", "2.0.0", true)
            .unwrap();
        assert_eq!(next.parents, vec![step.id]);

        assert_eq!(
            builder.list_trees(true).unwrap(),
            vec!["datasets/int_1.0.0_to_uuid_1.0.0"]
        );
        let graph = builder.load_tree("datasets/int_1.0.0_to_uuid_1.0.0").unwrap();
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_load_graph_with_override() {
        let store = InMemoryScriptStore::new();
        let builder = RevisionGraphBuilder::new(&store);
        builder.create_tree("datasets", false).unwrap();
        builder.create_tree("collections", false).unwrap();
        builder.add_step("datasets", "ClassA", "1.0.0", false).unwrap();
        builder.create_tree("datasets/migrate", true).unwrap();
        builder.add_step("datasets/migrate", "ClassB", "1.0.0", true).unwrap();

        let regular = builder.load_graph(None).unwrap();
        assert!(regular.contains(&RevisionId::step("datasets", "ClassA", "1.0.0")));

        let tree: OneShotTree = "datasets/migrate".parse().unwrap();
        let swapped = builder.load_graph(Some(&tree)).unwrap();
        assert!(!swapped.contains(&RevisionId::step("datasets", "ClassA", "1.0.0")));
        assert!(swapped.contains(&RevisionId::step("datasets", "ClassB", "1.0.0")));
        assert!(swapped.contains(&RevisionId::root("collections")));
    }
}
