//! Revision nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::revision::RevisionId;

/// The (component, class, version) tuple a step was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepSpec {
    /// Component (tree) the step belongs to.
    pub component: String,
    /// Bare implementing class name, without module path.
    pub class_name: String,
    /// Version introduced by the step.
    pub version: String,
}

impl StepSpec {
    /// Create a step description.
    pub fn new(
        component: impl Into<String>,
        class_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            class_name: class_name.into(),
            version: version.into(),
        }
    }

    /// Revision id derived from this tuple.
    pub fn revision_id(&self) -> RevisionId {
        RevisionId::step(&self.component, &self.class_name, &self.version)
    }

    /// Label of the per-class branch, `"{component}-{class_name}"`.
    pub fn branch_label(&self) -> String {
        format!("{}-{}", self.component, self.class_name)
    }
}

/// One revision in a migration tree.
///
/// Roots carry an explicit `tree` name and no `step`; every other node
/// carries the `step` it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionNode {
    /// Deterministic id.
    pub id: RevisionId,
    /// Parent revisions; empty for a tree root.
    #[serde(default)]
    pub parents: Vec<RevisionId>,
    /// Branch labels attached to this revision.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub branch_labels: BTreeSet<String>,
    /// Component name, set on tree roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<String>,
    /// Derivation tuple, set on steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepSpec>,
    /// Human-readable description.
    #[serde(default)]
    pub message: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl RevisionNode {
    /// Root revision of a component's tree.
    pub fn root(component: &str) -> Self {
        Self {
            id: RevisionId::root(component),
            parents: Vec::new(),
            branch_labels: BTreeSet::from([component.to_string()]),
            tree: Some(component.to_string()),
            step: None,
            message: format!("Initial pseudo-revision of the {component:?} tree."),
            created_at: Utc::now(),
        }
    }

    /// Step revision attached to `parent`, optionally opening a new branch.
    pub fn step(spec: StepSpec, parent: RevisionId, branch_label: Option<String>) -> Self {
        let message = format!("Migration script for {} {}.", spec.class_name, spec.version);
        Self {
            id: spec.revision_id(),
            parents: vec![parent],
            branch_labels: branch_label.into_iter().collect(),
            tree: None,
            step: Some(spec),
            message,
            created_at: Utc::now(),
        }
    }

    /// Whether this is a tree root.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Id this node should have given how it was derived.
    ///
    /// `None` for nodes that record neither a tree name nor a step.
    pub fn expected_id(&self) -> Option<RevisionId> {
        match (&self.step, &self.tree) {
            (Some(step), _) => Some(step.revision_id()),
            (None, Some(tree)) => Some(RevisionId::root(tree)),
            (None, None) => None,
        }
    }

    /// Name of the tree rooted at this node.
    ///
    /// Uses the explicit tree name when present. Older roots are named by
    /// their branch labels: when a class branch label leaked onto the root
    /// next to the component label, the shortest (then lexicographically
    /// smallest) label wins. Falls back to the id.
    pub fn tree_name(&self) -> String {
        if let Some(tree) = &self.tree {
            return tree.clone();
        }
        self.branch_labels
            .iter()
            .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
            .cloned()
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Multi-line description used for verbose listings.
    pub fn log_entry(&self) -> String {
        let mut entry = format!("Rev: {}", self.id);
        if self.parents.is_empty() {
            entry.push_str(" (base)");
        }
        entry.push('\n');
        let parents = if self.parents.is_empty() {
            "<base>".to_string()
        } else {
            let ids: Vec<&str> = self.parents.iter().map(RevisionId::as_str).collect();
            ids.join(", ")
        };
        entry.push_str(&format!("Parent: {parents}\n"));
        if !self.branch_labels.is_empty() {
            let labels: Vec<&str> = self.branch_labels.iter().map(String::as_str).collect();
            entry.push_str(&format!("Branch names: {}\n", labels.join(", ")));
        }
        entry.push_str(&format!("Create Date: {}\n\n    {}\n", self.created_at.to_rfc3339(), self.message));
        entry
    }
}
