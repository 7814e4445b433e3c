//! Project documents
//!
//! A project is a JSON document holding the layer tree: every node's
//! compositing attributes, mesh, masks, media path and children. Media is
//! referenced by path and re-opened through the `MediaLibrary` on load.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::media::{MediaId, MediaLibrary};
use crate::scene::{BlendMode, LayerNode, MaskPolygon, MeshGrid, Point2D, SceneStore};

/// Root of a project file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    #[serde(default)]
    pub layers: Vec<LayerRecord>,
}

/// Serialized form of one `LayerNode` and its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub media_path: Option<PathBuf>,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "default_blend_mode")]
    pub blend_mode: String,
    #[serde(default = "default_grid_size")]
    pub grid_rows: usize,
    #[serde(default = "default_grid_size")]
    pub grid_cols: usize,
    #[serde(default)]
    pub mesh_points: Option<Vec<Vec<Point2D>>>,
    #[serde(default)]
    pub masks: Vec<Vec<Point2D>>,
    #[serde(default)]
    pub span_group_media: bool,
    #[serde(default)]
    pub children: Vec<LayerRecord>,
    /// Four corners written by older versions, read but never written
    #[serde(default, skip_serializing)]
    pub dest_corners: Option<Vec<Point2D>>,
}

fn default_name() -> String {
    "Layer".to_string()
}

fn default_opacity() -> f32 {
    1.0
}

fn default_visible() -> bool {
    true
}

fn default_blend_mode() -> String {
    BlendMode::Normal.name().to_string()
}

fn default_grid_size() -> usize {
    2
}

impl LayerRecord {
    /// Capture a node and its subtree
    pub fn from_node(node: &LayerNode, library: &MediaLibrary) -> Self {
        Self {
            name: node.name.clone(),
            media_path: node
                .media
                .and_then(|id| library.path(id))
                .map(Path::to_path_buf),
            opacity: node.opacity(),
            visible: node.visible,
            blend_mode: node.blend_mode.name().to_string(),
            grid_rows: node.mesh.rows(),
            grid_cols: node.mesh.cols(),
            mesh_points: Some(node.mesh.to_rows()),
            masks: node
                .masks
                .polygons()
                .iter()
                .map(|polygon| polygon.points.clone())
                .collect(),
            span_group_media: node.span_group_media,
            children: node
                .children()
                .iter()
                .map(|child| LayerRecord::from_node(child, library))
                .collect(),
            dest_corners: None,
        }
    }

    /// Build the mesh described by this record.
    ///
    /// `mesh_points` wins over legacy `dest_corners`; with neither, the
    /// default surface is resampled to `grid_rows × grid_cols`.
    fn mesh(&self) -> Result<MeshGrid, ProjectError> {
        if let Some(rows) = &self.mesh_points {
            let found_rows = rows.len();
            let found_cols = rows.first().map_or(0, Vec::len);
            let rectangular = rows.iter().all(|row| row.len() == found_cols);
            if !rectangular || found_rows != self.grid_rows || found_cols != self.grid_cols {
                return Err(ProjectError::MeshShape {
                    layer: self.name.clone(),
                    expected: (self.grid_rows, self.grid_cols),
                    found: (found_rows, found_cols),
                });
            }
            return MeshGrid::from_rows(rows.clone()).ok_or_else(|| ProjectError::MeshShape {
                layer: self.name.clone(),
                expected: (self.grid_rows, self.grid_cols),
                found: (found_rows, found_cols),
            });
        }

        if let Some(corners) = &self.dest_corners {
            let corners: [Point2D; 4] = corners.as_slice().try_into().map_err(|_| ProjectError::MeshShape {
                layer: self.name.clone(),
                expected: (2, 2),
                found: (corners.len(), 1),
            })?;
            return Ok(MeshGrid::from_corners(corners));
        }

        let mut mesh = MeshGrid::default();
        mesh.resize(self.grid_rows, self.grid_cols);
        Ok(mesh)
    }
}

/// Materializes records into nodes, opening each media path once.
struct Loader<'a> {
    library: &'a mut MediaLibrary,
    opened: HashMap<PathBuf, Option<MediaId>>,
}

impl Loader<'_> {
    fn media(&mut self, path: &Path) -> Option<MediaId> {
        if let Some(id) = self.opened.get(path) {
            return *id;
        }
        let id = match self.library.open(path) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Layer media {} unavailable: {}", path.display(), e);
                None
            }
        };
        self.opened.insert(path.to_path_buf(), id);
        id
    }

    fn node(&mut self, record: &LayerRecord) -> Result<LayerNode, ProjectError> {
        let mut node = LayerNode::new(record.name.clone());
        node.visible = record.visible;
        node.set_opacity(record.opacity);
        node.set_blend_mode(BlendMode::from_name(&record.blend_mode));
        node.mesh = record.mesh()?;
        for polygon in &record.masks {
            node.masks.append(MaskPolygon::new(polygon.clone()));
        }
        node.span_group_media = record.span_group_media;

        node.media = match &record.media_path {
            Some(path) => self.media(path),
            // Surfaces saved without media were showing the placeholder
            None if record.children.is_empty() => Some(self.library.placeholder()),
            None => None,
        };

        for child in &record.children {
            let child = self.node(child)?;
            node.add_child(child);
        }
        Ok(node)
    }
}

impl ProjectDocument {
    /// Capture the whole scene
    pub fn from_scene(scene: &SceneStore, library: &MediaLibrary) -> Self {
        Self {
            layers: scene
                .roots()
                .iter()
                .map(|node| LayerRecord::from_node(node, library))
                .collect(),
        }
    }

    /// Build root nodes from this document, opening media into `library`
    pub fn build_layers(&self, library: &mut MediaLibrary) -> Result<Vec<LayerNode>, ProjectError> {
        let mut loader = Loader {
            library,
            opened: HashMap::new(),
        };
        self.layers.iter().map(|record| loader.node(record)).collect()
    }

    pub fn to_json(&self) -> Result<String, ProjectError> {
        serde_json::to_string_pretty(self).map_err(ProjectError::Json)
    }

    pub fn from_json(json: &str) -> Result<Self, ProjectError> {
        serde_json::from_str(json).map_err(ProjectError::Json)
    }
}

/// Write the scene to `path` as pretty-printed JSON
pub fn save(path: &Path, scene: &SceneStore, library: &MediaLibrary) -> Result<(), ProjectError> {
    let json = ProjectDocument::from_scene(scene, library).to_json()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)?;
    tracing::info!(path = %path.display(), layers = scene.len(), "Saved project");
    Ok(())
}

/// Read a project file and materialize its root nodes.
///
/// Nothing is attached to a scene here; the caller swaps the result in only
/// when the whole document loaded.
pub fn load(path: &Path, library: &mut MediaLibrary) -> Result<Vec<LayerNode>, ProjectError> {
    let json = fs::read_to_string(path)?;
    let layers = ProjectDocument::from_json(&json)?.build_layers(library)?;
    tracing::info!(path = %path.display(), layers = layers.len(), "Loaded project");
    Ok(layers)
}

/// Project load/save errors
#[derive(Debug)]
pub enum ProjectError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Stored mesh points disagree with the stored grid size
    MeshShape {
        layer: String,
        expected: (usize, usize),
        found: (usize, usize),
    },
}

impl std::fmt::Display for ProjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectError::Io(e) => write!(f, "IO error: {}", e),
            ProjectError::Json(e) => write!(f, "JSON error: {}", e),
            ProjectError::MeshShape { layer, expected, found } => write!(
                f,
                "Layer '{}' has a {}x{} mesh but declares {}x{}",
                layer, found.0, found.1, expected.0, expected.1
            ),
        }
    }
}

impl std::error::Error for ProjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProjectError::Io(e) => Some(e),
            ProjectError::Json(e) => Some(e),
            ProjectError::MeshShape { .. } => None,
        }
    }
}

impl From<std::io::Error> for ProjectError {
    fn from(e: std::io::Error) -> Self {
        ProjectError::Io(e)
    }
}

impl From<serde_json::Error> for ProjectError {
    fn from(e: serde_json::Error) -> Self {
        ProjectError::Json(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::from_pixel(8, 4, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_round_trip_preserves_tree() {
        let dir = tempfile::tempdir().unwrap();
        let png = write_png(dir.path(), "wall.png");

        let mut library = MediaLibrary::new();
        let media = library.open(&png).unwrap();

        let mut scene = SceneStore::new();
        let mut group = LayerNode::with_media("Facade", media);
        group.span_group_media = true;
        group.set_blend_mode(BlendMode::Screen);

        let mut left = LayerNode::new("Left");
        left.mesh.resize(3, 4);
        left.mesh.set_point(1, 2, Point2D::new(12.5, 99.0));
        left.masks.append(vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(10.0, 0.0),
            Point2D::new(10.0, 10.0),
        ]);
        left.masks.append(vec![Point2D::new(1.0, 1.0), Point2D::new(2.0, 2.0)]);
        left.set_opacity(0.25);
        group.add_child(left);

        let mut right = LayerNode::new("Right");
        right.visible = false;
        group.add_child(right);
        scene.push_root(group);

        let path = dir.path().join("show.json");
        save(&path, &scene, &library).unwrap();

        let mut reloaded_library = MediaLibrary::new();
        let roots = load(&path, &mut reloaded_library).unwrap();
        assert_eq!(roots.len(), 1);

        let group = &roots[0];
        assert_eq!(group.name, "Facade");
        assert!(group.span_group_media);
        assert_eq!(group.blend_mode, BlendMode::Screen);
        let group_media = group.media.unwrap();
        assert_eq!(reloaded_library.path(group_media), Some(png.as_path()));

        let left = &group.children()[0];
        assert_eq!(left.parent(), Some(group.id()));
        assert_eq!((left.mesh.rows(), left.mesh.cols()), (3, 4));
        assert_eq!(left.mesh.point(1, 2), Some(Point2D::new(12.5, 99.0)));
        assert_eq!(left.masks.len(), 2);
        assert_eq!(left.masks.polygons()[1].points.len(), 2);
        assert!((left.opacity() - 0.25).abs() < 1e-6);

        let right = &group.children()[1];
        assert!(!right.visible);

        // Re-saving the reloaded tree yields the same document
        let before = ProjectDocument::from_scene(&scene, &library);
        let mut reloaded = SceneStore::new();
        reloaded.replace(roots);
        let after = ProjectDocument::from_scene(&reloaded, &reloaded_library);
        assert_eq!(before.layers[0].children, after.layers[0].children);
    }

    #[test]
    fn test_round_trip_nested_groups() {
        let dir = tempfile::tempdir().unwrap();
        let png = write_png(dir.path(), "stage.png");

        let mut library = MediaLibrary::new();
        let media = library.open(&png).unwrap();

        let mut inner = LayerNode::with_media("Inner", media);
        inner.span_group_media = true;
        inner.add_child(LayerNode::new("Deep A"));
        inner.add_child(LayerNode::new("Deep B"));

        let mut outer = LayerNode::new("Outer");
        outer.add_child(LayerNode::new("Shallow"));
        outer.add_child(inner);

        let mut scene = SceneStore::new();
        scene.push_root(outer);
        scene.push_root(LayerNode::new("Loose"));

        let path = dir.path().join("nested.json");
        save(&path, &scene, &library).unwrap();
        let mut reloaded_library = MediaLibrary::new();
        let roots = load(&path, &mut reloaded_library).unwrap();

        assert_eq!(roots.len(), 2);
        let outer = &roots[0];
        assert!(outer.media.is_none());
        let names: Vec<&str> = outer.children().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Shallow", "Inner"]);

        let inner = &outer.children()[1];
        assert!(inner.is_group());
        assert!(inner.span_group_media);
        assert_eq!(inner.parent(), Some(outer.id()));
        assert_eq!(reloaded_library.path(inner.media.unwrap()), Some(png.as_path()));
        let deep: Vec<&str> = inner.children().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(deep, vec!["Deep A", "Deep B"]);
        assert!(inner.children().iter().all(|c| c.parent() == Some(inner.id())));
        assert!(!roots[1].is_group());
    }

    #[test]
    fn test_building_twice_allocates_fresh_ids() {
        let json = r#"{ "layers": [ { "name": "G", "children": [ { "name": "A" }, { "name": "B" } ] } ] }"#;
        let doc = ProjectDocument::from_json(json).unwrap();
        let mut library = MediaLibrary::new();

        let mut scene = SceneStore::new();
        for root in doc.build_layers(&mut library).unwrap() {
            scene.push_root(root);
        }
        for root in doc.build_layers(&mut library).unwrap() {
            scene.push_root(root);
        }

        let mut ids = scene.preorder_ids();
        assert_eq!(ids.len(), 6);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let doc = ProjectDocument::from_json(r#"{ "layers": [ { "name": "Bare" } ] }"#).unwrap();
        let record = &doc.layers[0];
        assert_eq!(record.opacity, 1.0);
        assert!(record.visible);
        assert_eq!(record.blend_mode, "Normal");
        assert_eq!((record.grid_rows, record.grid_cols), (2, 2));

        let mut library = MediaLibrary::new();
        let layers = doc.build_layers(&mut library).unwrap();
        assert_eq!((layers[0].mesh.rows(), layers[0].mesh.cols()), (2, 2));
        // A leaf saved without media comes back as a placeholder surface
        let media = layers[0].media.unwrap();
        assert_eq!(library.get(media).unwrap().kind(), MediaKind::Placeholder);
    }

    #[test]
    fn test_legacy_dest_corners() {
        let json = r#"{ "layers": [ {
            "name": "Old",
            "dest_corners": [[10, 20], [110, 20], [110, 220], [10, 220]]
        } ] }"#;
        let mut library = MediaLibrary::new();
        let layers = ProjectDocument::from_json(json).unwrap().build_layers(&mut library).unwrap();
        let mesh = &layers[0].mesh;
        assert_eq!(mesh.point(0, 0), Some(Point2D::new(10.0, 20.0)));
        assert_eq!(mesh.point(0, 1), Some(Point2D::new(110.0, 20.0)));
        assert_eq!(mesh.point(1, 1), Some(Point2D::new(110.0, 220.0)));
        assert_eq!(mesh.point(1, 0), Some(Point2D::new(10.0, 220.0)));

        // Legacy corners are never written back
        let written = ProjectDocument {
            layers: vec![LayerRecord::from_node(&layers[0], &library)],
        }
        .to_json()
        .unwrap();
        assert!(!written.contains("dest_corners"));
        assert!(written.contains("mesh_points"));
    }

    #[test]
    fn test_mesh_shape_mismatch_is_error() {
        let json = r#"{ "layers": [ {
            "name": "Broken",
            "grid_rows": 3,
            "grid_cols": 2,
            "mesh_points": [[[0, 0], [1, 0]], [[0, 1], [1, 1]]]
        } ] }"#;
        let mut library = MediaLibrary::new();
        let err = ProjectDocument::from_json(json)
            .unwrap()
            .build_layers(&mut library)
            .unwrap_err();
        match err {
            ProjectError::MeshShape { layer, expected, found } => {
                assert_eq!(layer, "Broken");
                assert_eq!(expected, (3, 2));
                assert_eq!(found, (2, 2));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unresolvable_media_is_dropped() {
        let json = r#"{ "layers": [
            { "name": "A", "media_path": "/nowhere/missing.png" },
            { "name": "B", "media_path": "/nowhere/missing.png" }
        ] }"#;
        let mut library = MediaLibrary::new();
        let layers = ProjectDocument::from_json(json).unwrap().build_layers(&mut library).unwrap();
        assert_eq!(layers.len(), 2);
        assert!(layers.iter().all(|l| l.media.is_none()));
        assert!(library.is_empty());
    }

    #[test]
    fn test_shared_media_opened_once() {
        let dir = tempfile::tempdir().unwrap();
        let png = write_png(dir.path(), "shared.png");
        let path = serde_json::to_string(&png).unwrap();
        let json = format!(
            r#"{{ "layers": [ {{ "name": "A", "media_path": {0} }}, {{ "name": "B", "media_path": {0} }} ] }}"#,
            path
        );
        let doc = ProjectDocument::from_json(&json).unwrap();
        let mut library = MediaLibrary::new();
        let layers = doc.build_layers(&mut library).unwrap();
        assert_eq!(library.len(), 1);
        assert_eq!(layers[0].media, layers[1].media);
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(matches!(ProjectDocument::from_json("{ \"layers\": ["), Err(ProjectError::Json(_))));
    }
}
