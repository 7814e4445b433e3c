//! The canonical scene: owner of the root layer collection
//!
//! Every view renders from one `SceneStore` and every edit goes through it,
//! so there is never more than one copy of the tree.

use std::collections::HashSet;

use super::layer::{LayerId, LayerNode};
use crate::media::MediaId;

/// Root layer collection, drawn back to front
#[derive(Debug, Default)]
pub struct SceneStore {
    roots: Vec<LayerNode>,
}

impl SceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node at root level (drawn on top)
    pub fn push_root(&mut self, mut node: LayerNode) -> LayerId {
        node.set_parent(None);
        let id = node.id();
        self.roots.push(node);
        id
    }

    pub fn roots(&self) -> &[LayerNode] {
        &self.roots
    }

    pub fn roots_mut(&mut self) -> &mut [LayerNode] {
        &mut self.roots
    }

    /// Number of root-level nodes
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of nodes in the whole tree
    pub fn node_count(&self) -> usize {
        self.roots.iter().map(|r| r.subtree_len()).sum()
    }

    pub fn find(&self, id: LayerId) -> Option<&LayerNode> {
        self.roots.iter().find_map(|r| r.find(id))
    }

    pub fn find_mut(&mut self, id: LayerId) -> Option<&mut LayerNode> {
        self.roots.iter_mut().find_map(|r| r.find_mut(id))
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.find(id).is_some()
    }

    /// Parent of a node, `None` for roots and unknown ids
    pub fn parent_of(&self, id: LayerId) -> Option<LayerId> {
        self.find(id).and_then(|n| n.parent())
    }

    /// Position of a node in the root collection
    pub fn root_index(&self, id: LayerId) -> Option<usize> {
        self.roots.iter().position(|r| r.id() == id)
    }

    /// Remove a node (and its subtree) from wherever it lives.
    ///
    /// The returned node has its parent handle cleared.
    pub fn detach(&mut self, id: LayerId) -> Option<LayerNode> {
        if let Some(index) = self.root_index(id) {
            return Some(self.roots.remove(index));
        }
        self.roots.iter_mut().find_map(|r| r.remove_descendant(id))
    }

    /// Attach a detached node as the last child of `parent`.
    ///
    /// Refused (node handed back) if `parent` is unknown or lies inside the
    /// node's own subtree.
    pub fn attach_child(&mut self, parent: LayerId, child: LayerNode) -> Result<(), LayerNode> {
        if child.contains(parent) {
            tracing::warn!(%parent, child = %child.id(), "Refusing to attach a node into its own subtree");
            return Err(child);
        }
        match self.find_mut(parent) {
            Some(node) => {
                node.add_child(child);
                Ok(())
            }
            None => Err(child),
        }
    }

    /// Move an attached node under another node. Returns `false` if the move
    /// would create a cycle or either id is unknown.
    pub fn reparent(&mut self, id: LayerId, new_parent: LayerId) -> bool {
        let Some(node) = self.find(id) else {
            return false;
        };
        if node.contains(new_parent) || !self.contains(new_parent) {
            return false;
        }
        match self.detach(id) {
            Some(node) => self.attach_child(new_parent, node).is_ok(),
            None => false,
        }
    }

    /// Wrap the given nodes into a new group appended at root level.
    ///
    /// Nodes keep their relative draw order. Ids nested inside another
    /// listed node move along with it. Returns the group id, or `None` if
    /// no listed node exists.
    pub fn group(&mut self, ids: &[LayerId], name: impl Into<String>) -> Option<LayerId> {
        let order = self.preorder_ids();
        let mut selected: Vec<LayerId> = order.iter().copied().filter(|id| ids.contains(id)).collect();
        let nested: Vec<LayerId> = selected
            .iter()
            .copied()
            .filter(|id| {
                selected
                    .iter()
                    .any(|other| other != id && self.find(*other).is_some_and(|n| n.contains(*id)))
            })
            .collect();
        selected.retain(|id| !nested.contains(id));

        if selected.is_empty() {
            return None;
        }

        let mut group = LayerNode::new(name);
        for id in selected {
            if let Some(node) = self.detach(id) {
                group.add_child(node);
            }
        }
        // Parents left without children become leaves again; that is fine.
        let group_id = self.push_root(group);
        tracing::debug!(%group_id, "Grouped layers");
        Some(group_id)
    }

    /// Delete a node and its subtree
    pub fn remove(&mut self, id: LayerId) -> Option<LayerNode> {
        let removed = self.detach(id);
        if removed.is_some() {
            tracing::debug!(%id, "Removed layer");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.roots.clear();
    }

    /// Visible leaves in draw order, skipping hidden subtrees
    pub fn visible_leaves(&self) -> Vec<&LayerNode> {
        let mut leaves = Vec::new();
        for root in &self.roots {
            root.collect_visible_leaves(&mut leaves);
        }
        leaves
    }

    /// Every media id referenced anywhere in the tree
    pub fn media_in_use(&self) -> HashSet<MediaId> {
        let mut media = Vec::new();
        for root in &self.roots {
            root.collect_media(&mut media);
        }
        media.into_iter().collect()
    }

    /// All node ids in depth-first pre-order
    pub fn preorder_ids(&self) -> Vec<LayerId> {
        fn walk(node: &LayerNode, out: &mut Vec<LayerId>) {
            out.push(node.id());
            for child in node.children() {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        for root in &self.roots {
            walk(root, &mut out);
        }
        out
    }

    /// Replace the whole tree (used when a project is loaded)
    pub fn replace(&mut self, roots: Vec<LayerNode>) {
        self.roots.clear();
        for root in roots {
            self.push_root(root);
        }
    }
}
