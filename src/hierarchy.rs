//! Namespace/operation tree construction.

use std::collections::HashMap;

use crate::types::{EntryDescriptor, TreeNode};

/// Split a dotted path, dropping empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('.').map(str::trim).filter(|s| !s.is_empty()).collect()
}

struct Slot {
    node: TreeNode,
    children: Vec<usize>,
}

/// Builds a tree of namespace nodes and entry leaves under a fixed root.
///
/// Namespace nodes are created on first reference and reused for any later
/// path with the same lower-cased dotted prefix, so `Math.add` and
/// `math.sub` share one `Math` node.
pub struct HierarchyBuilder {
    slots: Vec<Slot>,
    namespaces: HashMap<String, usize>,
    entries: usize,
}

impl HierarchyBuilder {
    pub fn new(root: TreeNode) -> Self {
        Self {
            slots: vec![Slot {
                node: root.detached(),
                children: Vec::new(),
            }],
            namespaces: HashMap::new(),
            entries: 0,
        }
    }

    /// Ensure namespace nodes exist for every prefix of `path` and attach
    /// `entry` as a leaf of the deepest one. An empty path attaches to the
    /// root.
    pub fn insert<I, S>(&mut self, path: I, entry: &EntryDescriptor)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parent = self.ensure_namespace(path);
        self.attach(parent, TreeNode::from_entry(entry));
        self.entries += 1;
    }

    /// Create the namespace chain without attaching anything. Such chains are
    /// removed again by pruning unless an entry lands below them.
    pub fn ensure_namespace<I, S>(&mut self, path: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = String::new();
        let mut parent = 0;

        for segment in path {
            let segment = segment.as_ref();
            if !key.is_empty() {
                key.push('.');
            }
            key.push_str(&segment.to_lowercase());

            parent = match self.namespaces.get(&key) {
                Some(&slot) => slot,
                None => {
                    let slot = self.attach(parent, TreeNode::namespace(segment));
                    self.namespaces.insert(key.clone(), slot);
                    slot
                }
            };
        }

        parent
    }

    fn attach(&mut self, parent: usize, node: TreeNode) -> usize {
        let slot = self.slots.len();
        self.slots.push(Slot {
            node,
            children: Vec::new(),
        });
        self.slots[parent].children.push(slot);
        slot
    }

    pub fn entry_count(&self) -> usize {
        self.entries
    }

    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }

    /// Materialize the tree with sorted children and empty namespaces pruned.
    pub fn build(mut self) -> TreeNode {
        let mut root = self.materialize(0);
        prune_empty_namespaces(&mut root);
        root
    }

    fn materialize(&mut self, slot: usize) -> TreeNode {
        let mut node = std::mem::take(&mut self.slots[slot].node);
        let children = std::mem::take(&mut self.slots[slot].children);
        for child in children {
            let child = self.materialize(child);
            node.add(child);
        }
        node
    }
}

/// Post-order prune: drop every namespace node that ends up with no children.
/// Entry nodes are never removed. Returns true when `node` itself should be
/// removed by its parent.
pub fn prune_empty_namespaces(node: &mut TreeNode) -> bool {
    node.children_mut().retain_mut(|child| !prune_empty_namespaces(child));
    !node.is_entry() && node.children().is_empty()
}
