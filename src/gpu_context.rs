//! Shared GPU context for multi-window rendering
//!
//! One `GpuContext` (instance, adapter, device, queue) serves every view.
//! Each window then owns its own surface through `output::OutputSurface`.

use std::sync::Arc;
use winit::window::Window;

use crate::compositor::target::DEPTH_STENCIL_FORMAT;

/// Shared GPU resources used by every output window
pub struct GpuContext {
    /// The wgpu instance
    pub instance: wgpu::Instance,
    /// The selected GPU adapter
    pub adapter: wgpu::Adapter,
    /// The GPU device for creating resources
    pub device: wgpu::Device,
    /// The command queue for submitting GPU work
    pub queue: wgpu::Queue,
    /// The preferred surface format (typically sRGB)
    pub surface_format: wgpu::TextureFormat,
}

impl GpuContext {
    /// Create the context for `window`, returning the surface used to pick
    /// the adapter so the caller can keep presenting to it.
    pub async fn new(window: Arc<Window>) -> Result<(Self, wgpu::Surface<'static>), GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window).map_err(GpuError::CreateSurface)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        tracing::info!("Using GPU: {}", adapter.get_info().name);
        tracing::info!("Backend: {:?}", adapter.get_info().backend);

        let stencil_usage = adapter.get_texture_format_features(DEPTH_STENCIL_FORMAT).allowed_usages;
        if !stencil_usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
            return Err(GpuError::NoStencil);
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Mesh Mapper Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(GpuError::RequestDevice)?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = preferred_format(&surface_caps.formats).ok_or(GpuError::NoSurfaceFormat)?;

        tracing::info!("Surface format: {:?}", surface_format);

        Ok((
            Self {
                instance,
                adapter,
                device,
                queue,
                surface_format,
            },
            surface,
        ))
    }

    /// Largest texture side the device accepts
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

/// First sRGB format, else the first format offered
pub fn preferred_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .find(|f| f.is_srgb())
        .or_else(|| formats.first())
        .copied()
}

/// GPU initialization errors
#[derive(Debug)]
pub enum GpuError {
    CreateSurface(wgpu::CreateSurfaceError),
    NoAdapter,
    NoStencil,
    NoSurfaceFormat,
    RequestDevice(wgpu::RequestDeviceError),
}

impl std::fmt::Display for GpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuError::CreateSurface(e) => write!(f, "Failed to create surface: {}", e),
            GpuError::NoAdapter => write!(f, "No suitable GPU adapter"),
            GpuError::NoStencil => write!(f, "Adapter cannot render to a depth/stencil target"),
            GpuError::NoSurfaceFormat => write!(f, "Surface reports no supported formats"),
            GpuError::RequestDevice(e) => write!(f, "Failed to create device: {}", e),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::CreateSurface(e) => Some(e),
            GpuError::RequestDevice(e) => Some(e),
            _ => None,
        }
    }
}
