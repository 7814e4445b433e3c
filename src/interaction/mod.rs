//! Pointer interaction: selection, handle dragging and snapping
//!
//! The controller keeps only selection and drag state. The scene is passed
//! into every call, so edits always land in the canonical `SceneStore`.

use crate::scene::{LayerId, LayerNode, Point2D, SceneStore};

/// Default snap distance in pixels
pub const DEFAULT_SNAP_THRESHOLD: f32 = 15.0;
/// Default handle pick radius in pixels
pub const DEFAULT_HANDLE_RADIUS: f32 = 10.0;

/// What a drag is moving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    /// A mesh control point
    Corner { row: usize, col: usize },
    /// A mask polygon vertex
    MaskVertex { polygon: usize, vertex: usize },
}

/// An active drag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragState {
    /// Leaf whose geometry is being edited
    pub target: LayerId,
    pub mode: DragMode,
}

/// Result of a pointer press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// A handle of the selection was grabbed
    Drag(DragState),
    /// A layer body was hit and is now selected
    Selected(LayerId),
    /// Nothing was hit; the selection is cleared
    Cleared,
}

/// Selection and drag state driven by pointer events
#[derive(Debug, Clone)]
pub struct InteractionController {
    selection: Option<LayerId>,
    drag: Option<DragState>,
    snapping_enabled: bool,
    /// Snap only to points strictly closer than this
    pub snap_threshold: f32,
    /// Inclusive pick radius for handles
    pub handle_radius: f32,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self {
            selection: None,
            drag: None,
            snapping_enabled: true,
            snap_threshold: DEFAULT_SNAP_THRESHOLD,
            handle_radius: DEFAULT_HANDLE_RADIUS,
        }
    }
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> Option<LayerId> {
        self.selection
    }

    pub fn select(&mut self, id: LayerId) {
        self.selection = Some(id);
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
        self.drag = None;
    }

    pub fn snapping_enabled(&self) -> bool {
        self.snapping_enabled
    }

    pub fn set_snapping(&mut self, enabled: bool) {
        self.snapping_enabled = enabled;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn drag(&self) -> Option<DragState> {
        self.drag
    }

    /// Handle a pointer press at `(x, y)`.
    ///
    /// Handles of the current selection win over selecting a layer body.
    /// Within one node, mask vertices are tested before mesh points.
    pub fn press(&mut self, scene: &SceneStore, x: f32, y: f32) -> PressOutcome {
        self.drag = None;

        // A deleted selection is forgotten here
        let selected = self.selection.and_then(|id| scene.find(id));
        if selected.is_none() {
            self.selection = None;
        }

        if let Some(node) = selected {
            if let Some(drag) = self.hit_handles(node, x, y) {
                tracing::debug!(target_layer = %drag.target, mode = ?drag.mode, "Drag started");
                self.drag = Some(drag);
                return PressOutcome::Drag(drag);
            }
        }

        let hit = scene
            .roots()
            .iter()
            .rev()
            .filter(|node| node.visible)
            .find(|node| node.content_bounds().is_some_and(|b| b.contains(x, y)));

        match hit {
            Some(node) => {
                self.selection = Some(node.id());
                PressOutcome::Selected(node.id())
            }
            None => {
                self.selection = None;
                PressOutcome::Cleared
            }
        }
    }

    /// Test the handles of a selected node, or of every direct child if it
    /// is a group. Visibility does not matter here.
    fn hit_handles(&self, node: &LayerNode, x: f32, y: f32) -> Option<DragState> {
        let targets = if node.is_group() {
            node.children()
        } else {
            std::slice::from_ref(node)
        };

        targets.iter().find_map(|layer| {
            if let Some((polygon, vertex)) = layer.masks.hit_test_vertex(x, y, self.handle_radius) {
                return Some(DragState {
                    target: layer.id(),
                    mode: DragMode::MaskVertex { polygon, vertex },
                });
            }
            layer
                .mesh
                .hit_test_point(x, y, self.handle_radius)
                .map(|(row, col)| DragState {
                    target: layer.id(),
                    mode: DragMode::Corner { row, col },
                })
        })
    }

    /// Handle pointer motion. Returns `true` if a point was moved.
    ///
    /// Mesh point drags snap to the nearest mesh point of another visible
    /// leaf when snapping is on; mask vertex drags never snap.
    pub fn move_to(&mut self, scene: &mut SceneStore, x: f32, y: f32) -> bool {
        let Some(drag) = self.drag else {
            return false;
        };

        let mut position = Point2D::new(x, y);
        if let DragMode::Corner { .. } = drag.mode {
            if self.snapping_enabled {
                if let Some(snapped) = self.snap_target(scene, drag.target, x, y) {
                    position = snapped;
                }
            }
        }

        let Some(node) = scene.find_mut(drag.target) else {
            // The target vanished mid-drag
            self.drag = None;
            return false;
        };

        match drag.mode {
            DragMode::Corner { row, col } => node.mesh.set_point(row, col, position),
            DragMode::MaskVertex { polygon, vertex } => node.masks.set_vertex(polygon, vertex, position),
        }
    }

    /// End any drag
    pub fn release(&mut self) {
        if self.drag.take().is_some() {
            tracing::trace!("Drag released");
        }
    }

    /// Nearest mesh point of a visible leaf other than `exclude` that lies
    /// strictly within the snap threshold.
    pub fn snap_target(&self, scene: &SceneStore, exclude: LayerId, x: f32, y: f32) -> Option<Point2D> {
        let mut best: Option<(f32, Point2D)> = None;
        for leaf in scene.visible_leaves() {
            if leaf.id() == exclude {
                continue;
            }
            for &p in leaf.mesh.points() {
                let distance = p.distance(&Point2D::new(x, y));
                let closer = match best {
                    Some((best_distance, _)) => distance < best_distance,
                    None => distance < self.snap_threshold,
                };
                if closer {
                    best = Some((distance, p));
                }
            }
        }
        best.map(|(_, p)| p)
    }
}
