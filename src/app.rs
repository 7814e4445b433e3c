//! Application state and the tick driver
//!
//! `App` owns the one `SceneStore`, the `MediaLibrary` and the
//! `InteractionController`. Each tick advances media once, then every view
//! renders a `FramePlan` built from the same scene. GPU objects live with the
//! windowing driver in `main.rs`; nothing here touches the device.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::compositor::{plan_frame, FramePlan};
use crate::interaction::{InteractionController, PressOutcome};
use crate::media::{MediaError, MediaId, MediaLibrary};
use crate::project::{self, ProjectError};
use crate::scene::{BlendMode, LayerId, LayerNode, MeshGrid, Point2D, SceneStore};
use crate::settings::AppPreferences;

/// Name given to layers created without media
pub const EMPTY_SURFACE_NAME: &str = "Empty Surface";

/// Update FPS display every 1 second
const FPS_UPDATE_INTERVAL_SECS: f64 = 1.0;

/// Largest grid density reachable through `adjust_grid_density`
pub const MAX_GRID_SIZE: usize = 32;

/// Side of the square mask added by `add_mask_to_selection`
pub const NEW_MASK_SIZE: f32 = 100.0;
/// Offset of a new mask from the mesh's first control point
const NEW_MASK_OFFSET: f32 = 50.0;

/// Opacity change per `step_selected_opacity` step
pub const OPACITY_STEP: f32 = 0.1;

/// Main application state
pub struct App {
    scene: SceneStore,
    library: MediaLibrary,
    controller: InteractionController,
    pub settings: AppPreferences,
    /// Project file the scene was loaded from or last saved to
    pub current_file: Option<PathBuf>,
    /// Media dropped from the library whose textures are still cached
    released_media: Vec<MediaId>,

    /// Index of the current tick, used to advance media once per tick
    tick: u64,
    frame_count: u64,
    last_fps_update: Instant,
    frames_since_update: u64,
    fps: f64,
}

impl App {
    pub fn new(settings: AppPreferences) -> Self {
        let mut controller = InteractionController::new();
        controller.set_snapping(settings.snapping_enabled);
        controller.snap_threshold = settings.snap_threshold;
        controller.handle_radius = settings.handle_radius;

        Self {
            scene: SceneStore::new(),
            library: MediaLibrary::new(),
            controller,
            settings,
            current_file: None,
            released_media: Vec::new(),
            tick: 0,
            frame_count: 0,
            last_fps_update: Instant::now(),
            frames_since_update: 0,
            fps: 0.0,
        }
    }

    pub fn scene(&self) -> &SceneStore {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneStore {
        &mut self.scene
    }

    pub fn library(&self) -> &MediaLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut MediaLibrary {
        &mut self.library
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn selection(&self) -> Option<LayerId> {
        self.controller.selection()
    }

    pub fn select(&mut self, id: LayerId) {
        if self.scene.contains(id) {
            self.controller.select(id);
        }
    }

    /// Canvas size used to place new layers
    pub fn canvas_size(&self) -> (u32, u32) {
        (self.settings.canvas_width, self.settings.canvas_height)
    }

    pub fn set_canvas_size(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.settings.canvas_width = width;
            self.settings.canvas_height = height;
        }
    }

    // Ticking

    /// Advance media playback by one tick. Returns the sources whose frame
    /// changed.
    pub fn tick(&mut self, elapsed: Duration) -> Vec<MediaId> {
        self.tick += 1;
        self.library.advance(self.tick, elapsed)
    }

    pub fn tick_index(&self) -> u64 {
        self.tick
    }

    /// Build the draw list for one view
    pub fn plan(&self, overlays: bool) -> FramePlan {
        plan_frame(&self.scene, self.controller.selection(), overlays)
    }

    /// Record that a frame was presented
    pub fn end_frame(&mut self) {
        self.frame_count += 1;
        self.frames_since_update += 1;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f64();
        if elapsed >= FPS_UPDATE_INTERVAL_SECS {
            self.fps = self.frames_since_update as f64 / elapsed;
            self.last_fps_update = now;
            self.frames_since_update = 0;
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_time_ms(&self) -> f64 {
        if self.fps > 0.0 { 1000.0 / self.fps } else { 0.0 }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn target_fps(&self) -> u32 {
        self.settings.target_fps
    }

    // Layers

    /// Insert a new root layer showing `media`, or a fresh placeholder when
    /// `None`. Its mesh is a 2×2 rectangle centered on the canvas with the
    /// media's aspect ratio.
    pub fn add_layer(&mut self, media: Option<MediaId>) -> LayerId {
        let media = media
            .filter(|id| self.library.contains(*id))
            .unwrap_or_else(|| self.library.placeholder());

        let (name, aspect) = match self.library.get(media) {
            Some(source) => (source.name().to_string(), source.aspect_ratio()),
            None => (EMPTY_SURFACE_NAME.to_string(), 1.0),
        };

        let (width, height) = self.canvas_size();
        let mut node = LayerNode::with_media(name, media);
        node.mesh = MeshGrid::centered(width as f32, height as f32, aspect);

        let id = self.scene.push_root(node);
        tracing::info!(%id, %media, "Added layer");
        id
    }

    /// Add a placeholder surface named after its position in the root list
    pub fn add_quad_surface(&mut self) -> LayerId {
        let name = format!("Surface {}", self.scene.len() + 1);
        let id = self.add_layer(None);
        if let Some(node) = self.scene.find_mut(id) {
            node.name = name;
        }
        id
    }

    /// Open a media file and show it on a new layer
    pub fn import_media(&mut self, path: &Path) -> Result<LayerId, MediaError> {
        let media = self.library.open(path)?;
        Ok(self.add_layer(Some(media)))
    }

    /// Point a layer at another media source.
    ///
    /// A layer still carrying the placeholder name takes the media's name.
    pub fn set_media(&mut self, layer: LayerId, media: MediaId) -> bool {
        let Some(name) = self.library.get(media).map(|s| s.name().to_string()) else {
            return false;
        };
        let Some(node) = self.scene.find_mut(layer) else {
            return false;
        };
        node.media = Some(media);
        if node.name == EMPTY_SURFACE_NAME {
            node.name = name;
        }
        self.collect_unused_media();
        true
    }

    /// Open a media file and assign it to the selected layer or group
    pub fn assign_media_to_selection(&mut self, path: &Path) -> Result<bool, MediaError> {
        let Some(selected) = self.selection() else {
            return Ok(false);
        };
        let media = self.library.open(path)?;
        Ok(self.set_media(selected, media))
    }

    /// Wrap the given layers into a new root group
    pub fn group_layers(&mut self, ids: &[LayerId]) -> Option<LayerId> {
        if self.controller.is_dragging() {
            return None;
        }
        let name = format!("Group {}", self.scene.len());
        let group = self.scene.group(ids, name)?;
        self.controller.select(group);
        Some(group)
    }

    /// Group the selected root layer with the root layer drawn after it
    pub fn group_selected_with_next(&mut self) -> Option<LayerId> {
        let selected = self.selection()?;
        let index = self.scene.root_index(selected)?;
        let next = self.scene.roots().get(index + 1)?.id();
        self.group_layers(&[selected, next])
    }

    /// Delete the selected layer and its subtree
    pub fn delete_selected(&mut self) -> Option<LayerNode> {
        if self.controller.is_dragging() {
            return None;
        }
        let selected = self.selection()?;
        self.controller.clear_selection();
        let removed = self.scene.remove(selected)?;
        self.collect_unused_media();
        Some(removed)
    }

    /// Toggle the selected layer's visibility
    pub fn toggle_selected_visibility(&mut self) -> bool {
        let Some(node) = self.selection().and_then(|id| self.scene.find_mut(id)) else {
            return false;
        };
        node.toggle_visibility();
        true
    }

    /// The selected node, unless a drag is in progress
    fn editable_selection(&mut self) -> Option<&mut LayerNode> {
        if self.controller.is_dragging() {
            return None;
        }
        let selected = self.selection()?;
        self.scene.find_mut(selected)
    }

    /// Add a square mask just inside the selected layer's first control
    /// point. Returns the polygon index.
    pub fn add_mask_to_selection(&mut self) -> Option<usize> {
        let node = self.editable_selection().filter(|n| !n.is_group())?;
        let origin = node.mesh.point(0, 0)?;
        let x = origin.x + NEW_MASK_OFFSET;
        let y = origin.y + NEW_MASK_OFFSET;
        let index = node.masks.append(vec![
            Point2D::new(x, y),
            Point2D::new(x + NEW_MASK_SIZE, y),
            Point2D::new(x + NEW_MASK_SIZE, y + NEW_MASK_SIZE),
            Point2D::new(x, y + NEW_MASK_SIZE),
        ]);
        tracing::debug!(layer = %node.id(), index, "Mask added");
        Some(index)
    }

    /// Remove every mask of the selected layer
    pub fn clear_selected_masks(&mut self) -> bool {
        let Some(node) = self.editable_selection() else {
            return false;
        };
        if node.masks.is_empty() {
            return false;
        }
        node.masks.clear();
        true
    }

    /// Flip media spanning on the selected group. Returns the new state.
    ///
    /// Spanning only shows once the group has media of its own.
    pub fn toggle_selected_span(&mut self) -> Option<bool> {
        let node = self.editable_selection().filter(|n| n.is_group())?;
        node.span_group_media = !node.span_group_media;
        if node.span_group_media && node.media.is_none() {
            tracing::info!(layer = %node.id(), "Span enabled; drop media on the group to show it");
        }
        Some(node.span_group_media)
    }

    /// Move the selected layer to the next blend mode
    pub fn cycle_selected_blend_mode(&mut self) -> Option<BlendMode> {
        let node = self.editable_selection()?;
        node.set_blend_mode(node.blend_mode.next());
        tracing::debug!(layer = %node.id(), blend_mode = %node.blend_mode, "Blend mode changed");
        Some(node.blend_mode)
    }

    /// Raise or lower the selected layer's opacity by `steps` increments
    pub fn step_selected_opacity(&mut self, steps: i32) -> Option<f32> {
        let node = self.editable_selection()?;
        node.set_opacity(node.opacity() + steps as f32 * OPACITY_STEP);
        Some(node.opacity())
    }

    /// Change the selected layer's mesh density.
    ///
    /// Refused while a point is being dragged, for groups, and for sizes
    /// below 2.
    pub fn set_grid_size(&mut self, rows: usize, cols: usize) -> bool {
        if self.controller.is_dragging() || rows < 2 || cols < 2 {
            return false;
        }
        let Some(node) = self.selection().and_then(|id| self.scene.find_mut(id)) else {
            return false;
        };
        if node.is_group() {
            return false;
        }
        node.mesh.resize(rows, cols);
        tracing::debug!(layer = %node.id(), rows, cols, "Mesh resized");
        true
    }

    /// Grow or shrink the selected mesh by `delta` rows and columns
    pub fn adjust_grid_density(&mut self, delta: isize) -> bool {
        let Some(node) = self.selection().and_then(|id| self.scene.find(id)) else {
            return false;
        };
        let rows = node.mesh.rows().saturating_add_signed(delta).clamp(2, MAX_GRID_SIZE);
        let cols = node.mesh.cols().saturating_add_signed(delta).clamp(2, MAX_GRID_SIZE);
        if (rows, cols) == (node.mesh.rows(), node.mesh.cols()) {
            return false;
        }
        self.set_grid_size(rows, cols)
    }

    /// Flip snapping and remember the choice in the preferences
    pub fn toggle_snapping(&mut self) -> bool {
        let enabled = !self.controller.snapping_enabled();
        self.controller.set_snapping(enabled);
        self.settings.snapping_enabled = enabled;
        tracing::info!("Snapping {}", if enabled { "enabled" } else { "disabled" });
        enabled
    }

    // Pointer input

    pub fn pointer_pressed(&mut self, x: f32, y: f32) -> PressOutcome {
        self.controller.press(&self.scene, x, y)
    }

    pub fn pointer_moved(&mut self, x: f32, y: f32) -> bool {
        self.controller.move_to(&mut self.scene, x, y)
    }

    pub fn pointer_released(&mut self) {
        self.controller.release();
    }

    // Media housekeeping

    /// Drop media no layer refers to anymore. Returns the released ids,
    /// which are also queued for `take_released_media`.
    pub fn collect_unused_media(&mut self) -> Vec<MediaId> {
        let used = self.scene.media_in_use();
        let released = self.library.retain(&used);
        self.released_media.extend_from_slice(&released);
        released
    }

    /// Drain the ids whose GPU textures should be freed
    pub fn take_released_media(&mut self) -> Vec<MediaId> {
        std::mem::take(&mut self.released_media)
    }

    // Projects

    /// Start over with an empty scene
    pub fn new_project(&mut self) -> Vec<MediaId> {
        self.controller.release();
        self.controller.clear_selection();
        self.scene.clear();
        self.current_file = None;
        self.collect_unused_media()
    }

    /// Write the scene to `path` and remember it as the current file
    pub fn save_project(&mut self, path: &Path) -> Result<(), ProjectError> {
        project::save(path, &self.scene, &self.library)?;
        self.current_file = Some(path.to_path_buf());
        self.settings.set_last_opened(path);
        Ok(())
    }

    /// Replace the scene with the project at `path`.
    ///
    /// On error the current scene is left untouched.
    pub fn open_project(&mut self, path: &Path) -> Result<Vec<MediaId>, ProjectError> {
        let layers = match project::load(path, &mut self.library) {
            Ok(layers) => layers,
            Err(e) => {
                // Media opened before the failure is unreferenced
                self.collect_unused_media();
                return Err(e);
            }
        };

        self.controller.release();
        self.controller.clear_selection();
        self.scene.replace(layers);
        self.current_file = Some(path.to_path_buf());
        self.settings.set_last_opened(path);

        // Sources shared with the previous scene stay as they were; new
        // textures for everything else are created on first render.
        self.library.request_upload_all();
        Ok(self.collect_unused_media())
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(AppPreferences::default())
    }
}
