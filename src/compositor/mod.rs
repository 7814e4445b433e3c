//! Compositor
//!
//! Turns the layer tree into pixels for one or more views.
//!
//! # Architecture
//!
//! - `plan`: GPU-independent traversal producing a `FramePlan`
//! - `renderer`: wgpu pipelines, stencil masking and the media texture cache
//! - `target`: per-view depth/stencil texture and viewport uniform
//! - `texture`: RGB8 frame upload into shared media textures

pub mod plan;
pub mod renderer;
pub mod target;
pub mod texture;

pub use plan::{plan_frame, FramePlan, LayerDraw, MeshVertex, OverlayGeometry, OverlayVertex};
pub use renderer::MeshRenderer;
pub use target::RenderTarget;

use crate::media::MediaId;
use crate::scene::LayerId;

/// Why a layer could not be drawn this frame
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// The frame has a zero width or height
    EmptyFrame { media: MediaId },
    /// Pixel data length disagrees with `width * height * 3`
    FrameSizeMismatch { media: MediaId, expected: usize, actual: usize },
    /// The frame exceeds the device texture size limit
    TooLarge { media: MediaId, width: u32, height: u32, limit: u32 },
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::EmptyFrame { media } => write!(f, "{} has an empty frame", media),
            RenderError::FrameSizeMismatch { media, expected, actual } => write!(
                f,
                "{} frame has {} bytes, expected {}",
                media, actual, expected
            ),
            RenderError::TooLarge {
                media,
                width,
                height,
                limit,
            } => write!(
                f,
                "{} frame {}x{} exceeds the texture limit of {}",
                media, width, height, limit
            ),
        }
    }
}

impl std::error::Error for RenderError {}

/// Outcome of rendering one view
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    /// Layers that reached the GPU
    pub drawn: usize,
    /// Visible leaves with no media to show
    pub skipped: usize,
    /// Layers whose media could not be uploaded
    pub errors: Vec<(LayerId, RenderError)>,
}

impl FrameReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
