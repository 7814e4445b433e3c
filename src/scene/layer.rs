//! Layer tree nodes
//!
//! A `LayerNode` is either a drawable leaf (mesh + masks + media) or a group
//! that owns child nodes by value. Groups are never drawn themselves; their
//! media can be inherited by children or spanned across them.

use std::sync::atomic::{AtomicU64, Ordering};

use super::blend::BlendMode;
use super::geometry::Bounds;
use super::mask::MaskSet;
use super::mesh::MeshGrid;
use crate::media::MediaId;

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique layer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        Self(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// A node in the layer tree.
///
/// Children are owned by value; `parent` is only a navigation handle and is
/// maintained by `add_child` / `remove_child`. Not `Clone`: a copy would
/// share its ids with the original.
#[derive(Debug)]
pub struct LayerNode {
    id: LayerId,
    /// Human-readable name for the layer
    pub name: String,
    /// Hidden nodes are skipped together with their whole subtree
    pub visible: bool,
    opacity: f32,
    pub blend_mode: BlendMode,
    /// Warp mesh in destination pixel space (unused for groups)
    pub mesh: MeshGrid,
    /// Clip polygons (unused for groups)
    pub masks: MaskSet,
    /// Source of this node's pixels
    pub media: Option<MediaId>,
    /// Stretch this group's media across the bounds of its children
    pub span_group_media: bool,
    children: Vec<LayerNode>,
    parent: Option<LayerId>,
}

impl LayerNode {
    /// Create a leaf with a default mesh and no media
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: LayerId::next(),
            name: name.into(),
            visible: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            mesh: MeshGrid::default(),
            masks: MaskSet::new(),
            media: None,
            span_group_media: false,
            children: Vec::new(),
            parent: None,
        }
    }

    /// Create a leaf bound to a media source
    pub fn with_media(name: impl Into<String>, media: MediaId) -> Self {
        let mut node = Self::new(name);
        node.media = Some(media);
        node
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    /// A node with children is a group
    pub fn is_group(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Set opacity (clamped to 0.0-1.0)
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
    }

    pub fn toggle_visibility(&mut self) {
        self.visible = !self.visible;
    }

    pub fn parent(&self) -> Option<LayerId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<LayerId>) {
        self.parent = parent;
    }

    pub fn children(&self) -> &[LayerNode] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [LayerNode] {
        &mut self.children
    }

    /// Append a child, pointing its parent handle at this node
    pub fn add_child(&mut self, mut child: LayerNode) {
        child.parent = Some(self.id);
        self.children.push(child);
    }

    /// Detach a direct child, clearing its parent handle
    pub fn remove_child(&mut self, id: LayerId) -> Option<LayerNode> {
        let index = self.children.iter().position(|c| c.id == id)?;
        let mut child = self.children.remove(index);
        child.parent = None;
        Some(child)
    }

    /// Take every child out of this node
    pub fn take_children(&mut self) -> Vec<LayerNode> {
        let mut children = std::mem::take(&mut self.children);
        for child in &mut children {
            child.parent = None;
        }
        children
    }

    /// Whether `id` is this node or one of its descendants
    pub fn contains(&self, id: LayerId) -> bool {
        self.find(id).is_some()
    }

    /// Find a node in this subtree (self included)
    pub fn find(&self, id: LayerId) -> Option<&LayerNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: LayerId) -> Option<&mut LayerNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Remove a node anywhere below this one
    pub fn remove_descendant(&mut self, id: LayerId) -> Option<LayerNode> {
        if let Some(child) = self.remove_child(id) {
            return Some(child);
        }
        self.children.iter_mut().find_map(|c| c.remove_descendant(id))
    }

    /// Collect visible leaves of this subtree in draw order.
    ///
    /// Nothing is collected below a hidden node.
    pub fn collect_visible_leaves<'a>(&'a self, out: &mut Vec<&'a LayerNode>) {
        if !self.visible {
            return;
        }
        if self.is_group() {
            for child in &self.children {
                child.collect_visible_leaves(out);
            }
        } else {
            out.push(self);
        }
    }

    /// Bounds used for selection: the mesh of a leaf, or the union of the
    /// visible descendant leaves of a group.
    pub fn content_bounds(&self) -> Option<Bounds> {
        if !self.is_group() {
            return Some(self.mesh.bounding_box());
        }
        self.children_bounds()
    }

    /// Union of the meshes of visible leaves below this node
    pub fn children_bounds(&self) -> Option<Bounds> {
        let mut leaves = Vec::new();
        for child in &self.children {
            child.collect_visible_leaves(&mut leaves);
        }
        leaves
            .iter()
            .map(|leaf| leaf.mesh.bounding_box())
            .reduce(|a, b| a.union(&b))
    }

    /// Footprint a spanning group stretches its media over: the union of
    /// the meshes of its visible direct children. A nested group counts with
    /// its own mesh, not its leaves.
    pub fn span_bounds(&self) -> Option<Bounds> {
        self.children
            .iter()
            .filter(|child| child.visible)
            .map(|child| child.mesh.bounding_box())
            .reduce(|a, b| a.union(&b))
    }

    /// Every media id referenced in this subtree
    pub fn collect_media(&self, out: &mut Vec<MediaId>) {
        if let Some(media) = self.media {
            out.push(media);
        }
        for child in &self.children {
            child.collect_media(out);
        }
    }

    /// Number of nodes in this subtree (self included)
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(|c| c.subtree_len()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::geometry::Point2D;

    fn leaf_at(name: &str, x: f32, y: f32, size: f32) -> LayerNode {
        let mut node = LayerNode::new(name);
        node.mesh = MeshGrid::from_corners([
            Point2D::new(x, y),
            Point2D::new(x + size, y),
            Point2D::new(x + size, y + size),
            Point2D::new(x, y + size),
        ]);
        node
    }

    #[test]
    fn test_layer_new() {
        let node = LayerNode::new("Surface 1");
        assert_eq!(node.name, "Surface 1");
        assert!(node.visible);
        assert_eq!(node.opacity(), 1.0);
        assert_eq!(node.blend_mode, BlendMode::Normal);
        assert!(node.media.is_none());
        assert!(!node.is_group());
        assert!(node.parent().is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = LayerNode::new("a");
        let b = LayerNode::new("b");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_layer_opacity_clamping() {
        let mut node = LayerNode::new("test");
        node.set_opacity(1.5);
        assert_eq!(node.opacity(), 1.0);
        node.set_opacity(-0.5);
        assert_eq!(node.opacity(), 0.0);
        node.set_opacity(0.25);
        assert_eq!(node.opacity(), 0.25);
    }

    #[test]
    fn test_add_and_remove_child_maintains_parent() {
        let mut group = LayerNode::new("group");
        let child = LayerNode::new("child");
        let child_id = child.id();

        group.add_child(child);
        assert!(group.is_group());
        assert_eq!(group.children()[0].parent(), Some(group.id()));

        let detached = group.remove_child(child_id).unwrap();
        assert!(detached.parent().is_none());
        assert!(!group.is_group());
    }

    #[test]
    fn test_find_nested() {
        let mut outer = LayerNode::new("outer");
        let mut inner = LayerNode::new("inner");
        let leaf = LayerNode::new("leaf");
        let leaf_id = leaf.id();
        inner.add_child(leaf);
        outer.add_child(inner);

        assert_eq!(outer.find(leaf_id).unwrap().name, "leaf");
        assert!(outer.contains(leaf_id));
        outer.find_mut(leaf_id).unwrap().name = "renamed".into();
        assert_eq!(outer.remove_descendant(leaf_id).unwrap().name, "renamed");
        assert!(!outer.contains(leaf_id));
    }

    #[test]
    fn test_group_bounds_skip_hidden_leaves() {
        let mut group = LayerNode::new("group");
        group.add_child(leaf_at("a", 0.0, 0.0, 10.0));
        group.add_child(leaf_at("b", 20.0, 20.0, 10.0));
        let mut hidden = leaf_at("c", 500.0, 500.0, 10.0);
        hidden.visible = false;
        group.add_child(hidden);

        let bounds = group.content_bounds().unwrap();
        assert_eq!(bounds.min, Point2D::new(0.0, 0.0));
        assert_eq!(bounds.max, Point2D::new(30.0, 30.0));
    }

    #[test]
    fn test_span_bounds_use_direct_children_meshes() {
        let mut inner = LayerNode::new("inner");
        inner.mesh = MeshGrid::from_corners([
            Point2D::new(100.0, 100.0),
            Point2D::new(500.0, 100.0),
            Point2D::new(500.0, 500.0),
            Point2D::new(100.0, 500.0),
        ]);
        inner.add_child(leaf_at("leaf", 0.0, 0.0, 50.0));

        let mut outer = LayerNode::new("outer");
        outer.add_child(inner);
        let mut hidden = leaf_at("hidden", 900.0, 900.0, 10.0);
        hidden.visible = false;
        outer.add_child(hidden);

        let bounds = outer.span_bounds().unwrap();
        assert_eq!(bounds.min, Point2D::new(100.0, 100.0));
        assert_eq!(bounds.max, Point2D::new(500.0, 500.0));
        // Selection still covers the leaves
        assert_eq!(outer.content_bounds().unwrap().min, Point2D::new(0.0, 0.0));
    }

    #[test]
    fn test_group_without_visible_leaves_has_no_bounds() {
        let mut group = LayerNode::new("group");
        let mut hidden = leaf_at("a", 0.0, 0.0, 10.0);
        hidden.visible = false;
        group.add_child(hidden);
        assert!(group.content_bounds().is_none());
    }
}
