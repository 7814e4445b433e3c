//! Per-window output surface
//!
//! An `OutputSurface` is a winit window presenting through its own wgpu
//! surface, configured on the shared device. It owns the view's
//! depth/stencil texture and viewport uniform; media textures stay in the
//! shared `MeshRenderer`.

use std::sync::Arc;

use winit::window::{Window, WindowId};

use crate::compositor::{FramePlan, FrameReport, MeshRenderer, RenderTarget};
use crate::gpu_context::GpuContext;
use crate::media::MediaLibrary;

/// Background behind all layers
pub const CLEAR_COLOR: wgpu::Color = wgpu::Color::BLACK;

/// What a view is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewRole {
    /// The operator's window, with handles and wireframes
    Editor,
    /// A projector output, content only
    Projector,
}

impl ViewRole {
    pub fn draws_overlays(self) -> bool {
        matches!(self, ViewRole::Editor)
    }
}

/// Prefer a tear-free mode that does not block, then plain vsync
pub fn choose_present_mode(modes: &[wgpu::PresentMode]) -> wgpu::PresentMode {
    if modes.contains(&wgpu::PresentMode::Mailbox) {
        wgpu::PresentMode::Mailbox
    } else {
        wgpu::PresentMode::Fifo
    }
}

/// A window plus everything needed to present the composited scene into it
pub struct OutputSurface {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    target: RenderTarget,
    role: ViewRole,
}

impl OutputSurface {
    /// Create a surface for `window` on the shared device
    pub fn new(
        gpu: &GpuContext,
        renderer: &MeshRenderer,
        window: Arc<Window>,
        role: ViewRole,
    ) -> Result<Self, OutputError> {
        let surface = gpu
            .instance
            .create_surface(window.clone())
            .map_err(OutputError::CreateSurface)?;
        Self::with_surface(gpu, renderer, window, surface, role)
    }

    /// Wrap a surface that was already created for `window`
    pub fn with_surface(
        gpu: &GpuContext,
        renderer: &MeshRenderer,
        window: Arc<Window>,
        surface: wgpu::Surface<'static>,
        role: ViewRole,
    ) -> Result<Self, OutputError> {
        let caps = surface.get_capabilities(&gpu.adapter);
        let format = renderer.color_format();
        if !caps.formats.contains(&format) {
            return Err(OutputError::UnsupportedFormat(format));
        }

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: choose_present_mode(&caps.present_modes),
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };
        surface.configure(&gpu.device, &config);

        let target = renderer.create_target(&gpu.device, width, height);
        tracing::info!(?role, width, height, present_mode = ?config.present_mode, "Output surface ready");

        Ok(Self {
            window,
            surface,
            config,
            target,
            role,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn role(&self) -> ViewRole {
        self.role
    }

    /// Get the current surface size.
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Resize the surface and the depth/stencil target. Zero sizes are
    /// ignored (minimized windows).
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == self.size() {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&gpu.device, &self.config);
        self.target.resize(&gpu.device, &gpu.queue, width, height);
        log::debug!("Output resized to {}x{}", width, height);
    }

    /// Composite `plan` into the window and present it.
    ///
    /// A lost or outdated surface is reconfigured and reported as an error so
    /// the caller can try again next frame.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        renderer: &mut MeshRenderer,
        plan: &FramePlan,
        library: &mut MediaLibrary,
    ) -> Result<FrameReport, wgpu::SurfaceError> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(e @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                self.surface.configure(&gpu.device, &self.config);
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Output Encoder"),
        });
        let report = renderer.render(
            &gpu.device,
            &gpu.queue,
            &mut encoder,
            &view,
            &self.target,
            plan,
            library,
            CLEAR_COLOR,
        );

        gpu.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        output.present();

        for (layer, error) in &report.errors {
            tracing::warn!(%layer, "Layer not drawn: {}", error);
        }
        Ok(report)
    }
}

/// Output window setup errors
#[derive(Debug)]
pub enum OutputError {
    CreateSurface(wgpu::CreateSurfaceError),
    /// The surface cannot present the renderer's color format
    UnsupportedFormat(wgpu::TextureFormat),
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputError::CreateSurface(e) => write!(f, "Failed to create surface: {}", e),
            OutputError::UnsupportedFormat(format) => {
                write!(f, "Surface cannot present {:?}", format)
            }
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::CreateSurface(e) => Some(e),
            OutputError::UnsupportedFormat(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_editor_draws_overlays() {
        assert!(ViewRole::Editor.draws_overlays());
        assert!(!ViewRole::Projector.draws_overlays());
    }

    #[test]
    fn test_present_mode_choice() {
        assert_eq!(
            choose_present_mode(&[wgpu::PresentMode::Fifo, wgpu::PresentMode::Mailbox]),
            wgpu::PresentMode::Mailbox
        );
        assert_eq!(
            choose_present_mode(&[wgpu::PresentMode::Immediate, wgpu::PresentMode::Fifo]),
            wgpu::PresentMode::Fifo
        );
    }
}
