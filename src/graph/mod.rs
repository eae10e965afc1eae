//! Revision graph: the step DAG of one or more migration trees.
//!
//! ## Shape
//!
//! ```text
//!            root(component)                       label: component
//!            /             \
//!   step(c, ClassA, 1.0.0)  step(c, ClassB, 1.0.0)  labels: c-ClassA, c-ClassB
//!           |                      |
//!   step(c, ClassA, 2.0.0)  step(c, ClassB, 1.1.0)
//! ```
//!
//! Every implementation class of a component grows its own linear branch off
//! the shared tree root. A branch label marks the first revision of a branch;
//! `branch_head(label)` is the single head reachable from it.
//!
//! ## Determinism
//!
//! Nodes, children and heads are kept in BTreeMap/BTreeSet order, and the
//! topological order used by [`RevisionGraph::history`] breaks ties by id.

pub mod builder;
pub mod node;

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{LookupError, UsageError};
use crate::revision::RevisionId;
use crate::scripts::ScriptStore;
use crate::trees::Location;

pub use builder::RevisionGraphBuilder;
pub use node::{RevisionNode, StepSpec};

/// Error type for graph loading and building.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Malformed input.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// Missing tree, revision or branch.
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// The tree's folder already exists.
    #[error("version tree {tree:?} already exists in {location}")]
    TreeExists {
        /// Tree name.
        tree: String,
        /// Existing folder.
        location: Location,
    },

    /// A revision with this id is already part of the tree.
    #[error("revision {0} already exists")]
    RevisionExists(RevisionId),

    /// The same id was loaded from two folders.
    #[error("revision {id} found in both {first} and {second}")]
    DuplicateRevision {
        /// Duplicated id.
        id: RevisionId,
        /// First folder.
        first: Location,
        /// Second folder.
        second: Location,
    },

    /// A stored id does not match the tuple it records.
    #[error("revision {actual} does not match its derivation (expected {expected})")]
    IdMismatch {
        /// Id derived from the recorded tuple.
        expected: RevisionId,
        /// Id stored in the document.
        actual: RevisionId,
    },

    /// A parent reference points outside the loaded graph.
    #[error("revision {child} refers to unknown parent {parent}")]
    DanglingParent {
        /// Referring revision.
        child: RevisionId,
        /// Missing parent.
        parent: RevisionId,
    },

    /// Parent references form a cycle.
    #[error("revision graph contains a cycle through {0}")]
    Cycle(RevisionId),

    /// A branch forked, so its head is ambiguous.
    #[error("branch {label:?} has multiple heads: {heads:?}")]
    MultipleHeads {
        /// Branch label.
        label: String,
        /// Competing heads.
        heads: Vec<RevisionId>,
    },

    /// A one-shot tree must have exactly one root.
    #[error("tree {tree} must have exactly one root, found {count}")]
    RootCount {
        /// Tree name.
        tree: String,
        /// Number of roots found.
        count: usize,
    },

    /// Script storage failure.
    #[error("script storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl GraphError {
    pub(crate) fn storage<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage(Box::new(error))
    }
}

/// Step DAG loaded from a set of locations.
#[derive(Debug, Clone, Default)]
pub struct RevisionGraph {
    nodes: BTreeMap<RevisionId, RevisionNode>,
    locations: BTreeMap<RevisionId, Location>,
    children: BTreeMap<RevisionId, BTreeSet<RevisionId>>,
    /// Topological order, oldest first.
    order: Vec<RevisionId>,
}

impl RevisionGraph {
    /// Load every revision stored in `locations`.
    pub fn load<S: ScriptStore>(store: &S, locations: &[Location]) -> Result<Self, GraphError> {
        let mut entries = Vec::new();
        for location in locations {
            let nodes = store.read_revisions(location).map_err(GraphError::storage)?;
            tracing::debug!(location = %location, count = nodes.len(), "Loaded revisions");
            entries.extend(nodes.into_iter().map(|node| (location.clone(), node)));
        }
        Self::from_nodes(entries)
    }

    /// Build a graph from revisions and the folders they came from.
    ///
    /// Rejects duplicate ids, ids that do not match their recorded
    /// derivation, dangling parents and cycles.
    pub fn from_nodes<I>(entries: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (Location, RevisionNode)>,
    {
        let mut graph = Self::default();

        for (location, node) in entries {
            if let Some(expected) = node.expected_id() {
                if expected != node.id {
                    return Err(GraphError::IdMismatch { expected, actual: node.id });
                }
            }
            if let Some(first) = graph.locations.get(&node.id) {
                return Err(GraphError::DuplicateRevision {
                    id: node.id,
                    first: first.clone(),
                    second: location,
                });
            }
            graph.locations.insert(node.id.clone(), location);
            graph.nodes.insert(node.id.clone(), node);
        }

        for node in graph.nodes.values() {
            for parent in &node.parents {
                if !graph.nodes.contains_key(parent) {
                    return Err(GraphError::DanglingParent {
                        child: node.id.clone(),
                        parent: parent.clone(),
                    });
                }
                graph
                    .children
                    .entry(parent.clone())
                    .or_default()
                    .insert(node.id.clone());
            }
        }

        graph.order = graph.topological_order()?;
        Ok(graph)
    }

    /// Kahn's algorithm with an id-ordered ready set.
    fn topological_order(&self) -> Result<Vec<RevisionId>, GraphError> {
        let mut pending: BTreeMap<&RevisionId, usize> = self
            .nodes
            .values()
            .map(|node| (&node.id, node.parents.len()))
            .collect();
        let mut ready: BTreeSet<&RevisionId> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            for child in self.children.get(id).into_iter().flatten() {
                if let Some(count) = pending.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(child);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let emitted: BTreeSet<&RevisionId> = order.iter().collect();
            if let Some(stuck) = self.nodes.keys().find(|id| !emitted.contains(id)) {
                return Err(GraphError::Cycle(stuck.clone()));
            }
        }
        Ok(order)
    }

    /// Number of revisions.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no revisions.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fetch a revision by id.
    pub fn get(&self, id: &RevisionId) -> Option<&RevisionNode> {
        self.nodes.get(id)
    }

    /// Whether a revision is part of the graph.
    pub fn contains(&self, id: &RevisionId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Folder a revision was loaded from.
    pub fn location_of(&self, id: &RevisionId) -> Option<&Location> {
        self.locations.get(id)
    }

    /// Children of a revision, ordered by id.
    pub fn children(&self, id: &RevisionId) -> Vec<&RevisionId> {
        self.children
            .get(id)
            .map(|set| set.iter().collect())
            .unwrap_or_default()
    }

    /// Revisions without parents (tree roots), ordered by id.
    pub fn bases(&self) -> Vec<&RevisionNode> {
        self.nodes.values().filter(|node| node.is_root()).collect()
    }

    /// Revisions without children, ordered by id.
    pub fn heads(&self) -> Vec<&RevisionNode> {
        self.nodes
            .values()
            .filter(|node| !self.children.contains_key(&node.id))
            .collect()
    }

    /// Tree roots keyed by tree name.
    pub fn trees(&self) -> BTreeMap<String, &RevisionNode> {
        self.bases()
            .into_iter()
            .map(|root| (root.tree_name(), root))
            .collect()
    }

    /// Whether any revision carries `label`.
    pub fn has_branch(&self, label: &str) -> bool {
        self.nodes.values().any(|node| node.branch_labels.contains(label))
    }

    /// Head of the branch opened by the revision labelled `label`.
    pub fn branch_head(&self, label: &str) -> Result<&RevisionNode, GraphError> {
        let start = self
            .nodes
            .values()
            .find(|node| node.branch_labels.contains(label))
            .ok_or_else(|| LookupError::BranchNotFound(label.to_string()))?;

        let mut heads = BTreeSet::new();
        let mut stack = vec![&start.id];
        let mut seen = BTreeSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            match self.children.get(id) {
                Some(children) => stack.extend(children.iter()),
                None => {
                    heads.insert(id);
                }
            }
        }

        let mut heads = heads.into_iter();
        match (heads.next(), heads.next()) {
            (Some(head), None) => self
                .nodes
                .get(head)
                .ok_or_else(|| LookupError::RevisionNotFound(head.clone()).into()),
            (first, second) => Err(GraphError::MultipleHeads {
                label: label.to_string(),
                heads: first.into_iter().chain(second).chain(heads).cloned().collect(),
            }),
        }
    }

    /// All revisions, newest first.
    pub fn history(&self) -> Vec<&RevisionNode> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }
}
