//! Frame planning
//!
//! Walks the layer tree once per view and produces a `FramePlan`: one
//! `LayerDraw` per drawable leaf (triangles, UVs, mask fans, blend state)
//! plus overlay geometry for the selection. Nothing here touches the GPU,
//! so the traversal rules are unit-tested directly.

use bytemuck::{Pod, Zeroable};

use crate::media::MediaId;
use crate::scene::{BlendMode, Bounds, LayerId, LayerNode, MeshGrid, Point2D, SceneStore};

/// Control-point handles and the surface outline
pub const HANDLE_COLOR: [f32; 4] = [1.0, 1.0, 0.0, 1.0];
/// Mask vertices and edges
pub const MASK_COLOR: [f32; 4] = [1.0, 0.0, 1.0, 1.0];
/// Interior mesh lines
pub const WIREFRAME_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 1.0];
/// Half the edge length of a square handle, in pixels
pub const HANDLE_HALF_SIZE: f32 = 4.0;

/// Vertex of a warped mesh triangle
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    /// Destination position in pixels
    pub position: [f32; 2],
    pub uv: [f32; 2],
    /// Layer opacity, multiplied into the sampled alpha
    pub opacity: f32,
}

/// Vertex of overlay lines and handles
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct OverlayVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

/// Span rectangle with a non-zero size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SpanRect {
    /// Width and height are clamped to at least 1 pixel
    pub fn from_bounds(bounds: &Bounds) -> Self {
        Self {
            x: bounds.min.x,
            y: bounds.min.y,
            width: bounds.width().max(1.0),
            height: bounds.height().max(1.0),
        }
    }

    /// Texture coordinate of a destination point
    pub fn uv(&self, p: Point2D) -> [f32; 2] {
        [(p.x - self.x) / self.width, (p.y - self.y) / self.height]
    }
}

/// Everything needed to draw one leaf
#[derive(Debug, Clone)]
pub struct LayerDraw {
    pub layer: LayerId,
    /// Effective media (own or inherited)
    pub media: MediaId,
    pub blend_mode: BlendMode,
    pub opacity: f32,
    /// Triangle list, two triangles per mesh cell
    pub vertices: Vec<MeshVertex>,
    /// One fan-triangulated triangle list per valid mask polygon
    pub mask_fans: Vec<Vec<[f32; 2]>>,
}

impl LayerDraw {
    pub fn is_masked(&self) -> bool {
        !self.mask_fans.is_empty()
    }
}

/// Selection overlay geometry, drawn after all layers
#[derive(Debug, Clone, Default)]
pub struct OverlayGeometry {
    /// Line list
    pub lines: Vec<OverlayVertex>,
    /// Triangle list (handles and markers)
    pub triangles: Vec<OverlayVertex>,
}

impl OverlayGeometry {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.triangles.is_empty()
    }

    pub fn add_line(&mut self, a: Point2D, b: Point2D, color: [f32; 4]) {
        self.lines.push(OverlayVertex { position: a.to_array(), color });
        self.lines.push(OverlayVertex { position: b.to_array(), color });
    }

    /// Closed loop through `points`. Two points give a single segment.
    pub fn add_loop(&mut self, points: &[Point2D], color: [f32; 4]) {
        match points.len() {
            0 | 1 => {}
            2 => self.add_line(points[0], points[1], color),
            n => {
                for i in 0..n {
                    self.add_line(points[i], points[(i + 1) % n], color);
                }
            }
        }
    }

    /// Filled square centered on `p`
    pub fn add_handle(&mut self, p: Point2D, color: [f32; 4]) {
        let h = HANDLE_HALF_SIZE;
        let corners = [
            [p.x - h, p.y - h],
            [p.x + h, p.y - h],
            [p.x + h, p.y + h],
            [p.x - h, p.y + h],
        ];
        for i in [0, 1, 2, 0, 2, 3] {
            self.triangles.push(OverlayVertex { position: corners[i], color });
        }
    }
}

/// Result of planning one view
#[derive(Debug, Clone, Default)]
pub struct FramePlan {
    /// Leaves to draw, back to front
    pub draws: Vec<LayerDraw>,
    pub overlay: OverlayGeometry,
    /// Visible leaves with no effective media
    pub skipped: Vec<LayerId>,
}

/// Context handed down the traversal; never stored on nodes
#[derive(Debug, Clone, Copy, Default)]
struct Inherited {
    media: Option<MediaId>,
    span: Option<SpanRect>,
    selected: bool,
}

/// Plan a frame of `scene`.
///
/// `selection` gets overlay geometry when `overlays` is set (editor views).
pub fn plan_frame(scene: &SceneStore, selection: Option<LayerId>, overlays: bool) -> FramePlan {
    let mut plan = FramePlan::default();
    let selection = if overlays { selection } else { None };
    for root in scene.roots() {
        visit(root, Inherited::default(), selection, &mut plan);
    }
    plan
}

fn visit(node: &LayerNode, inherited: Inherited, selection: Option<LayerId>, plan: &mut FramePlan) {
    if !node.visible {
        return;
    }

    let selected = inherited.selected || selection == Some(node.id());

    if node.is_group() {
        let span = if node.span_group_media && node.media.is_some() {
            node.span_bounds().map(|b| SpanRect::from_bounds(&b))
        } else {
            None
        };
        let context = Inherited {
            media: node.media.or(inherited.media),
            span: span.or(inherited.span),
            selected,
        };
        for child in node.children() {
            visit(child, context, selection, plan);
        }
        return;
    }

    if selected {
        emit_overlay(node, &mut plan.overlay);
    }

    let Some(media) = node.media.or(inherited.media) else {
        plan.skipped.push(node.id());
        return;
    };

    let mask_fans: Vec<Vec<[f32; 2]>> = node
        .masks
        .valid_polygons()
        .map(|polygon| {
            polygon
                .fan_triangles()
                .into_iter()
                .flatten()
                .map(Point2D::to_array)
                .collect::<Vec<_>>()
        })
        .collect();

    plan.draws.push(LayerDraw {
        layer: node.id(),
        media,
        blend_mode: node.blend_mode,
        opacity: node.opacity(),
        vertices: mesh_triangles(&node.mesh, inherited.span, node.opacity()),
        mask_fans,
    });
}

/// Split every mesh cell into two triangles with grid or span UVs
pub fn mesh_triangles(mesh: &MeshGrid, span: Option<SpanRect>, opacity: f32) -> Vec<MeshVertex> {
    let last_col = (mesh.cols() - 1) as f32;
    let last_row = (mesh.rows() - 1) as f32;
    let grid_uv = |r: usize, c: usize| [c as f32 / last_col, r as f32 / last_row];

    let mut vertices = Vec::with_capacity((mesh.rows() - 1) * (mesh.cols() - 1) * 6);
    for (r, c, [tl, tr, br, bl]) in mesh.cells() {
        let corners = [(tl, r, c), (tr, r, c + 1), (br, r + 1, c + 1), (bl, r + 1, c)];
        let vertex = |i: usize| {
            let (p, row, col) = corners[i];
            MeshVertex {
                position: p.to_array(),
                uv: match span {
                    Some(span) => span.uv(p),
                    None => grid_uv(row, col),
                },
                opacity,
            }
        };
        for i in [0, 1, 2, 0, 2, 3] {
            vertices.push(vertex(i));
        }
    }
    vertices
}

fn emit_overlay(node: &LayerNode, overlay: &mut OverlayGeometry) {
    let mesh = &node.mesh;

    for r in 0..mesh.rows() {
        for c in 0..mesh.cols() {
            if let (Some(a), Some(b)) = (mesh.point(r, c), mesh.point(r, c + 1)) {
                overlay.add_line(a, b, WIREFRAME_COLOR);
            }
            if let (Some(a), Some(b)) = (mesh.point(r, c), mesh.point(r + 1, c)) {
                overlay.add_line(a, b, WIREFRAME_COLOR);
            }
        }
    }
    overlay.add_loop(&mesh.outline(), HANDLE_COLOR);

    for polygon in node.masks.polygons() {
        overlay.add_loop(&polygon.points, MASK_COLOR);
        for &p in &polygon.points {
            overlay.add_handle(p, MASK_COLOR);
        }
    }

    for &p in mesh.points() {
        overlay.add_handle(p, HANDLE_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MaskPolygon;

    fn square(name: &str, x: f32, y: f32, size: f32, media: Option<MediaId>) -> LayerNode {
        let mut node = LayerNode::new(name);
        node.media = media;
        node.mesh = MeshGrid::from_corners([
            Point2D::new(x, y),
            Point2D::new(x + size, y),
            Point2D::new(x + size, y + size),
            Point2D::new(x, y + size),
        ]);
        node
    }

    fn approx(a: [f32; 2], b: [f32; 2]) -> bool {
        (a[0] - b[0]).abs() < 1e-5 && (a[1] - b[1]).abs() < 1e-5
    }

    #[test]
    fn test_leaf_grid_uvs() {
        let mut scene = SceneStore::new();
        scene.push_root(square("a", 10.0, 10.0, 100.0, Some(MediaId(1))));

        let plan = plan_frame(&scene, None, false);
        assert_eq!(plan.draws.len(), 1);
        let draw = &plan.draws[0];
        assert_eq!(draw.vertices.len(), 6);
        assert!(!draw.is_masked());

        // tl, tr, br
        assert_eq!(draw.vertices[0].uv, [0.0, 0.0]);
        assert_eq!(draw.vertices[1].uv, [1.0, 0.0]);
        assert_eq!(draw.vertices[2].uv, [1.0, 1.0]);
        assert_eq!(draw.vertices[5].uv, [0.0, 1.0]);
        assert_eq!(draw.vertices[2].position, [110.0, 110.0]);
    }

    #[test]
    fn test_denser_grid_uvs() {
        let mut mesh = MeshGrid::from_corners([
            Point2D::new(0.0, 0.0),
            Point2D::new(100.0, 0.0),
            Point2D::new(100.0, 100.0),
            Point2D::new(0.0, 100.0),
        ]);
        mesh.resize(3, 3);
        let vertices = mesh_triangles(&mesh, None, 0.5);
        assert_eq!(vertices.len(), 4 * 6);
        // Second cell on the first row starts at column 1
        assert_eq!(vertices[6].uv, [0.5, 0.0]);
        assert!(vertices.iter().all(|v| v.opacity == 0.5));
    }

    #[test]
    fn test_span_group_uv_law() {
        let mut group = LayerNode::with_media("wall", MediaId(7));
        group.span_group_media = true;
        group.add_child(square("left", 0.0, 0.0, 100.0, None));
        group.add_child(square("right", 300.0, 100.0, 100.0, None));

        let mut scene = SceneStore::new();
        scene.push_root(group);
        let plan = plan_frame(&scene, None, false);

        assert_eq!(plan.draws.len(), 2);
        let span = SpanRect { x: 0.0, y: 0.0, width: 400.0, height: 200.0 };
        for draw in &plan.draws {
            assert_eq!(draw.media, MediaId(7));
            for v in &draw.vertices {
                let expected = span.uv(Point2D::from(v.position));
                assert!(approx(v.uv, expected));
            }
        }
        // Top-right of the right-hand square
        let right = &plan.draws[1];
        assert!(approx(right.vertices[1].uv, [1.0, 0.5]));
    }

    #[test]
    fn test_nested_group_spans_over_its_own_mesh() {
        let mut inner = square("inner", 100.0, 100.0, 400.0, None);
        inner.add_child(square("leaf", 0.0, 0.0, 50.0, None));
        let mut outer = LayerNode::with_media("outer", MediaId(2));
        outer.span_group_media = true;
        outer.add_child(inner);

        let mut scene = SceneStore::new();
        scene.push_root(outer);
        let plan = plan_frame(&scene, None, false);

        assert_eq!(plan.draws.len(), 1);
        let leaf = &plan.draws[0];
        assert_eq!(leaf.media, MediaId(2));
        // Span is (100,100)-(500,500); the leaf lies outside it
        assert!(approx(leaf.vertices[0].uv, [-0.25, -0.25]));
        assert!(approx(leaf.vertices[2].uv, [-0.125, -0.125]));
    }

    #[test]
    fn test_span_bounds_clamped_to_one_pixel() {
        let bounds = Bounds::from_points(&[Point2D::new(5.0, 5.0)]).unwrap();
        let span = SpanRect::from_bounds(&bounds);
        assert_eq!((span.width, span.height), (1.0, 1.0));
        assert!(approx(span.uv(Point2D::new(6.0, 5.5)), [1.0, 0.5]));
    }

    #[test]
    fn test_group_media_inherited_without_span() {
        let mut group = LayerNode::with_media("group", MediaId(3));
        group.add_child(square("plain", 0.0, 0.0, 10.0, None));
        group.add_child(square("own", 20.0, 0.0, 10.0, Some(MediaId(4))));

        let mut scene = SceneStore::new();
        scene.push_root(group);
        let plan = plan_frame(&scene, None, false);

        assert_eq!(plan.draws[0].media, MediaId(3));
        assert_eq!(plan.draws[1].media, MediaId(4));
        // Without span the grid UVs apply
        assert_eq!(plan.draws[0].vertices[1].uv, [1.0, 0.0]);
    }

    #[test]
    fn test_leaf_without_media_is_skipped() {
        let mut scene = SceneStore::new();
        let id = scene.push_root(square("empty", 0.0, 0.0, 10.0, None));
        scene.push_root(square("full", 0.0, 0.0, 10.0, Some(MediaId(1))));

        let plan = plan_frame(&scene, None, false);
        assert_eq!(plan.skipped, vec![id]);
        assert_eq!(plan.draws.len(), 1);
    }

    #[test]
    fn test_hidden_subtree_is_skipped() {
        let mut group = LayerNode::with_media("group", MediaId(1));
        group.add_child(square("a", 0.0, 0.0, 10.0, None));
        group.visible = false;

        let mut scene = SceneStore::new();
        scene.push_root(group);
        let plan = plan_frame(&scene, None, false);
        assert!(plan.draws.is_empty());
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_two_point_mask_never_rasterizes() {
        let mut node = square("a", 0.0, 0.0, 100.0, Some(MediaId(1)));
        node.masks.append(vec![Point2D::new(0.0, 0.0), Point2D::new(50.0, 50.0)]);

        let mut scene = SceneStore::new();
        scene.push_root(node);
        let plan = plan_frame(&scene, None, false);
        assert!(!plan.draws[0].is_masked());
    }

    #[test]
    fn test_mask_fans_for_valid_polygons() {
        let mut node = square("a", 0.0, 0.0, 100.0, Some(MediaId(1)));
        node.masks.append(MaskPolygon::new(vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(50.0, 0.0),
            Point2D::new(50.0, 50.0),
            Point2D::new(0.0, 50.0),
        ]));
        node.masks.append(vec![Point2D::new(60.0, 60.0)]);
        node.masks.append(vec![
            Point2D::new(60.0, 60.0),
            Point2D::new(90.0, 60.0),
            Point2D::new(75.0, 90.0),
        ]);

        let mut scene = SceneStore::new();
        scene.push_root(node);
        let plan = plan_frame(&scene, None, false);
        // The quad fans into two triangles and the triangle into one; the
        // single point is inert
        let fans = &plan.draws[0].mask_fans;
        assert_eq!(fans.len(), 2);
        assert_eq!(fans[0].len(), 6);
        assert_eq!(fans[1].len(), 3);
    }

    #[test]
    fn test_overlays_only_for_selection() {
        let mut scene = SceneStore::new();
        let a = scene.push_root(square("a", 0.0, 0.0, 10.0, Some(MediaId(1))));
        scene.push_root(square("b", 50.0, 0.0, 10.0, Some(MediaId(1))));

        assert!(plan_frame(&scene, None, true).overlay.is_empty());
        // Projector views never show overlays
        assert!(plan_frame(&scene, Some(a), false).overlay.is_empty());

        let plan = plan_frame(&scene, Some(a), true);
        // 4 handles, 6 vertices each
        assert_eq!(plan.overlay.triangles.len(), 24);
        // 4 wireframe edges + 4 outline edges
        assert_eq!(plan.overlay.lines.len(), 16);
    }

    #[test]
    fn test_selected_group_overlays_its_leaves() {
        let mut group = LayerNode::new("group");
        group.add_child(square("a", 0.0, 0.0, 10.0, Some(MediaId(1))));
        group.add_child(square("b", 50.0, 0.0, 10.0, Some(MediaId(1))));
        let group_id = group.id();

        let mut scene = SceneStore::new();
        scene.push_root(group);
        let plan = plan_frame(&scene, Some(group_id), true);
        assert_eq!(plan.overlay.triangles.len(), 2 * 24);
        assert_eq!(plan.draws.len(), 2);
    }
}
