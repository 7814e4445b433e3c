//! GPU textures for media frames
//!
//! One `MediaTexture` exists per `MediaId` and is shared by every view.
//! Frames arrive as tightly packed RGB8 and are expanded to RGBA8 on upload.

use crate::media::{MediaFrame, MediaId};

use super::RenderError;

/// Texture format for all media textures (gamma-correct sampling)
pub const MEDIA_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Check that a frame can be uploaded into a texture of at most
/// `max_dimension` pixels per side.
pub fn validate_frame(media: MediaId, frame: &MediaFrame, max_dimension: u32) -> Result<(), RenderError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(RenderError::EmptyFrame { media });
    }
    let expected = MediaFrame::expected_size(frame.width, frame.height);
    if frame.data.len() != expected {
        return Err(RenderError::FrameSizeMismatch {
            media,
            expected,
            actual: frame.data.len(),
        });
    }
    if frame.width > max_dimension || frame.height > max_dimension {
        return Err(RenderError::TooLarge {
            media,
            width: frame.width,
            height: frame.height,
            limit: max_dimension,
        });
    }
    Ok(())
}

/// A sampled texture plus the bind group that exposes it to the mesh shader
pub struct MediaTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

impl MediaTexture {
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        width: u32,
        height: u32,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Media Texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: MEDIA_TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Media Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        log::debug!("Created media texture {}x{}", width, height);

        Self {
            texture,
            bind_group,
            width,
            height,
        }
    }

    /// Whether this texture can hold a frame of the given size
    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Write a validated frame. The frame must match the texture size.
    pub fn upload(&self, queue: &wgpu::Queue, frame: &MediaFrame) {
        let rgba = frame.to_rgba();
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}
