//! Mesh Mapper Library
//!
//! Mesh-warp projection mapping: a layer tree of deformable grids with
//! polygon masks and blend modes, composited with wgpu to one or more
//! displays in real time.

pub mod app;
pub mod compositor;
pub mod gpu_context;
pub mod interaction;
pub mod media;
pub mod output;
pub mod project;
pub mod scene;
pub mod settings;
pub mod shaders;
pub mod telemetry;

pub use app::App;
pub use compositor::{FramePlan, FrameReport, MeshRenderer, RenderError};
pub use interaction::{InteractionController, PressOutcome};
pub use media::{MediaError, MediaId, MediaLibrary, MediaSource};
pub use project::{ProjectDocument, ProjectError};
pub use scene::{BlendMode, LayerId, LayerNode, MaskSet, MeshGrid, Point2D, SceneStore};
pub use settings::AppPreferences;
