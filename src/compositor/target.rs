//! Per-view render target state
//!
//! Each view (editor window, projector window) owns a depth/stencil texture
//! of its own size and a viewport uniform; the pipelines and media textures
//! are shared through the `MeshRenderer`.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

/// Stencil holds the mask bits; depth is unused
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Viewport uniform shared by every shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ViewportUniform {
    /// View size in pixels
    pub size: [f32; 2],
    pub _padding: [f32; 2],
}

impl ViewportUniform {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: [width.max(1) as f32, height.max(1) as f32],
            _padding: [0.0; 2],
        }
    }

    /// Pixel position to normalized device coordinates (y down to y up)
    pub fn to_ndc(&self, x: f32, y: f32) -> [f32; 2] {
        [x / self.size[0] * 2.0 - 1.0, 1.0 - y / self.size[1] * 2.0]
    }
}

/// Depth/stencil attachment and viewport binding for one view
pub struct RenderTarget {
    depth_stencil_view: wgpu::TextureView,
    viewport_buffer: wgpu::Buffer,
    viewport_bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

impl RenderTarget {
    pub fn new(device: &wgpu::Device, viewport_layout: &wgpu::BindGroupLayout, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let depth_stencil_view = Self::create_depth_stencil(device, width, height);

        let viewport_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Viewport Uniform Buffer"),
            contents: bytemuck::bytes_of(&ViewportUniform::new(width, height)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let viewport_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Viewport Bind Group"),
            layout: viewport_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: viewport_buffer.as_entire_binding(),
            }],
        });

        Self {
            depth_stencil_view,
            viewport_buffer,
            viewport_bind_group,
            width,
            height,
        }
    }

    /// The view keeps its texture alive
    fn create_depth_stencil(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Mask Stencil Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_STENCIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// Match a new view size; does nothing if unchanged
    pub fn resize(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        if self.width == width && self.height == height {
            return;
        }

        self.depth_stencil_view = Self::create_depth_stencil(device, width, height);
        self.width = width;
        self.height = height;
        queue.write_buffer(
            &self.viewport_buffer,
            0,
            bytemuck::bytes_of(&ViewportUniform::new(width, height)),
        );
        tracing::debug!(width, height, "Resized render target");
    }

    pub fn depth_stencil_view(&self) -> &wgpu::TextureView {
        &self.depth_stencil_view
    }

    pub fn viewport_bind_group(&self) -> &wgpu::BindGroup {
        &self.viewport_bind_group
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_ndc_mapping() {
        let viewport = ViewportUniform::new(1280, 800);
        assert_eq!(viewport.to_ndc(0.0, 0.0), [-1.0, 1.0]);
        assert_eq!(viewport.to_ndc(1280.0, 800.0), [1.0, -1.0]);
        assert_eq!(viewport.to_ndc(640.0, 400.0), [0.0, 0.0]);
    }

    #[test]
    fn test_viewport_never_zero() {
        assert_eq!(ViewportUniform::new(0, 0).size, [1.0, 1.0]);
    }
}
