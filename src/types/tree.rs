use std::cmp::Ordering;

use serde::Serialize;

use super::entry::EntryDescriptor;

/// Plain-data node of the browsable operation tree.
///
/// A node with a non-empty `invocation` is an entry (leaf) node. A node with
/// an empty `invocation` is a namespace and is only valid while it has
/// children; `hierarchy::prune_empty_namespaces` enforces that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub label: String,
    pub invocation: String,
    pub owner_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<TreeNode>,
}

/// Longest text per column within a subtree, in characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnWidths {
    pub label: usize,
    pub invocation: usize,
    pub owner_type: usize,
}

impl TreeNode {
    pub fn namespace(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn leaf(label: impl Into<String>, invocation: impl Into<String>, owner_type: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            invocation: invocation.into(),
            owner_type: owner_type.into(),
            children: Vec::new(),
        }
    }

    pub fn from_entry(entry: &EntryDescriptor) -> Self {
        Self::leaf(&entry.display_name, &entry.invocation, &entry.owner_type)
    }

    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<TreeNode> {
        &mut self.children
    }

    pub fn is_entry(&self) -> bool {
        !self.invocation.is_empty()
    }

    pub fn is_namespace(&self) -> bool {
        self.invocation.is_empty() && !self.children.is_empty()
    }

    /// Sibling order: label, then owner type.
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.label
            .cmp(&other.label)
            .then_with(|| self.owner_type.cmp(&other.owner_type))
    }

    /// Ordered insert. Equal nodes keep their insertion order. Returns the
    /// position the child landed at.
    pub fn add(&mut self, child: TreeNode) -> usize {
        let index = self
            .children
            .partition_point(|existing| existing.display_cmp(&child) != Ordering::Greater);
        self.children.insert(index, child);
        index
    }

    /// Append without reordering; used for ranked result lists.
    pub fn push(&mut self, child: TreeNode) {
        self.children.push(child);
    }

    /// Copy of this node's own fields with no children.
    pub fn detached(&self) -> Self {
        Self::leaf(&self.label, &self.invocation, &self.owner_type)
    }

    /// Number of nodes in the subtree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::node_count).sum::<usize>()
    }

    /// Entry nodes below this node, depth first, in display order.
    pub fn entries(&self) -> Vec<&TreeNode> {
        let mut found = Vec::new();
        for child in &self.children {
            child.collect_entries(&mut found);
        }
        found
    }

    fn collect_entries<'a>(&'a self, found: &mut Vec<&'a TreeNode>) {
        if self.is_entry() {
            found.push(self);
        }
        for child in &self.children {
            child.collect_entries(found);
        }
    }

    /// Visit every node with its depth (root is depth 0), pre-order.
    pub fn walk<F: FnMut(usize, &TreeNode)>(&self, mut visit: F) {
        self.walk_inner(0, &mut visit);
    }

    fn walk_inner<F: FnMut(usize, &TreeNode)>(&self, depth: usize, visit: &mut F) {
        visit(depth, self);
        for child in &self.children {
            child.walk_inner(depth + 1, visit);
        }
    }

    pub fn column_widths(&self) -> ColumnWidths {
        let mut widths = ColumnWidths::default();
        self.walk(|_, node| {
            widths.label = widths.label.max(node.label.chars().count());
            widths.invocation = widths.invocation.max(node.invocation.chars().count());
            widths.owner_type = widths.owner_type.max(node.owner_type.chars().count());
        });
        widths
    }
}
