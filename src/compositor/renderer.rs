//! wgpu executor for frame plans
//!
//! Draws a `FramePlan` into one view in a single render pass. Masks use the
//! stencil buffer:
//!
//! - bit 0 counts fan coverage parity for the polygon being rasterized, so
//!   concave polygons come out exact
//! - bit 1 accumulates the union of all polygons of the layer
//!
//! Content of a masked layer is then drawn where bit 1 is set. Every blend
//! mode has its own pipeline, so one layer's blend never leaks into the
//! next draw.

use std::collections::HashMap;
use std::ops::Range;

use wgpu::util::DeviceExt;

use super::plan::{FramePlan, MeshVertex, OverlayVertex};
use super::target::{RenderTarget, DEPTH_STENCIL_FORMAT};
use super::texture::{validate_frame, MediaTexture};
use super::{FrameReport, RenderError};
use crate::media::{MediaId, MediaLibrary};
use crate::scene::BlendMode;
use crate::shaders;

const PARITY_BIT: u32 = 0x01;
const UNION_BIT: u32 = 0x02;

/// Vertex layout of `MeshVertex`
fn mesh_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

/// Vertex layout of `OverlayVertex`
fn overlay_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x4];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<OverlayVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

/// Vertex layout of bare mask positions
fn mask_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

fn stencil_face(compare: wgpu::CompareFunction, pass_op: wgpu::StencilOperation) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare,
        fail_op: wgpu::StencilOperation::Keep,
        depth_fail_op: wgpu::StencilOperation::Keep,
        pass_op,
    }
}

/// Depth is never tested or written; only the stencil state varies.
fn depth_stencil_state(
    compare: wgpu::CompareFunction,
    pass_op: wgpu::StencilOperation,
    read_mask: u32,
    write_mask: u32,
) -> wgpu::DepthStencilState {
    let face = stencil_face(compare, pass_op);
    wgpu::DepthStencilState {
        format: DEPTH_STENCIL_FORMAT,
        depth_write_enabled: false,
        depth_compare: wgpu::CompareFunction::Always,
        stencil: wgpu::StencilState {
            front: face,
            back: face,
            read_mask,
            write_mask,
        },
        bias: wgpu::DepthBiasState::default(),
    }
}

/// Stencil state for layers without masks: always pass, never write
fn stencil_disabled() -> wgpu::DepthStencilState {
    depth_stencil_state(wgpu::CompareFunction::Always, wgpu::StencilOperation::Keep, 0xFF, 0)
}

fn primitive(topology: wgpu::PrimitiveTopology) -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: None,
        unclipped_depth: false,
        polygon_mode: wgpu::PolygonMode::Fill,
        conservative: false,
    }
}

/// Content pipelines for one blend mode
struct BlendPipelines {
    unmasked: wgpu::RenderPipeline,
    masked: wgpu::RenderPipeline,
}

/// Stencil pipelines for the mask passes
struct StencilPipelines {
    /// Fullscreen: zero every bit
    reset: wgpu::RenderPipeline,
    /// Polygon fans: invert the parity bit
    parity: wgpu::RenderPipeline,
    /// Fullscreen: copy parity into the union bit
    resolve: wgpu::RenderPipeline,
    /// Fullscreen: zero the parity bit
    clear_parity: wgpu::RenderPipeline,
}

/// Vertex ranges of one draw inside the frame buffers
struct PreparedDraw {
    media: MediaId,
    blend_mode: BlendMode,
    mesh: Range<u32>,
    masks: Vec<Range<u32>>,
}

/// Shared renderer: pipelines, sampler and the media texture cache.
///
/// Render targets are per view; see `RenderTarget`.
pub struct MeshRenderer {
    viewport_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    content: HashMap<BlendMode, BlendPipelines>,
    stencil: StencilPipelines,
    overlay_lines: wgpu::RenderPipeline,
    overlay_triangles: wgpu::RenderPipeline,
    textures: HashMap<MediaId, MediaTexture>,
    max_texture_dimension: u32,
    color_format: wgpu::TextureFormat,
}

impl MeshRenderer {
    /// Build every pipeline for views of `color_format`
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let viewport_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Viewport Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Media Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Media Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let mesh_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::MESH_SHADER.into()),
        });
        let stencil_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Stencil Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::STENCIL_SHADER.into()),
        });
        let overlay_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Overlay Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::OVERLAY_SHADER.into()),
        });

        let content_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&viewport_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let viewport_only_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Viewport Pipeline Layout"),
            bind_group_layouts: &[&viewport_layout],
            push_constant_ranges: &[],
        });

        let content_pipeline = |label: &str, mode: BlendMode, depth_stencil: wgpu::DepthStencilState| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&content_layout),
                vertex: wgpu::VertexState {
                    module: &mesh_shader,
                    entry_point: Some("vs_main"),
                    buffers: &[mesh_vertex_layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &mesh_shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: color_format,
                        blend: Some(mode.to_blend_state()),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: primitive(wgpu::PrimitiveTopology::TriangleList),
                depth_stencil: Some(depth_stencil),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let content = BlendMode::all()
            .iter()
            .map(|&mode| {
                let pipelines = BlendPipelines {
                    unmasked: content_pipeline(&format!("Mesh {} Pipeline", mode), mode, stencil_disabled()),
                    masked: content_pipeline(
                        &format!("Mesh {} Masked Pipeline", mode),
                        mode,
                        depth_stencil_state(
                            wgpu::CompareFunction::Equal,
                            wgpu::StencilOperation::Keep,
                            UNION_BIT,
                            0,
                        ),
                    ),
                };
                (mode, pipelines)
            })
            .collect();

        // Stencil passes never touch color
        let stencil_pipeline =
            |label: &str, fullscreen: bool, depth_stencil: wgpu::DepthStencilState| {
                let polygon_buffers = [mask_vertex_layout()];
                let (entry_point, buffers): (&str, &[wgpu::VertexBufferLayout]) = if fullscreen {
                    ("vs_fullscreen", &[])
                } else {
                    ("vs_polygon", &polygon_buffers)
                };
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(label),
                    layout: Some(&viewport_only_layout),
                    vertex: wgpu::VertexState {
                        module: &stencil_shader,
                        entry_point: Some(entry_point),
                        buffers,
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &stencil_shader,
                        entry_point: Some("fs_main"),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: color_format,
                            blend: None,
                            write_mask: wgpu::ColorWrites::empty(),
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: primitive(wgpu::PrimitiveTopology::TriangleList),
                    depth_stencil: Some(depth_stencil),
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                })
            };

        let stencil = StencilPipelines {
            reset: stencil_pipeline(
                "Stencil Reset Pipeline",
                true,
                depth_stencil_state(wgpu::CompareFunction::Always, wgpu::StencilOperation::Replace, 0xFF, 0xFF),
            ),
            parity: stencil_pipeline(
                "Stencil Parity Pipeline",
                false,
                depth_stencil_state(
                    wgpu::CompareFunction::Always,
                    wgpu::StencilOperation::Invert,
                    0xFF,
                    PARITY_BIT,
                ),
            ),
            resolve: stencil_pipeline(
                "Stencil Resolve Pipeline",
                true,
                depth_stencil_state(
                    wgpu::CompareFunction::Equal,
                    wgpu::StencilOperation::Replace,
                    PARITY_BIT,
                    UNION_BIT,
                ),
            ),
            clear_parity: stencil_pipeline(
                "Stencil Clear Parity Pipeline",
                true,
                depth_stencil_state(
                    wgpu::CompareFunction::Always,
                    wgpu::StencilOperation::Replace,
                    0xFF,
                    PARITY_BIT,
                ),
            ),
        };

        let overlay_pipeline = |label: &str, topology: wgpu::PrimitiveTopology| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&viewport_only_layout),
                vertex: wgpu::VertexState {
                    module: &overlay_shader,
                    entry_point: Some("vs_main"),
                    buffers: &[overlay_vertex_layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &overlay_shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: color_format,
                        blend: Some(BlendMode::Normal.to_blend_state()),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: primitive(topology),
                depth_stencil: Some(stencil_disabled()),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let overlay_lines = overlay_pipeline("Overlay Line Pipeline", wgpu::PrimitiveTopology::LineList);
        let overlay_triangles = overlay_pipeline("Overlay Handle Pipeline", wgpu::PrimitiveTopology::TriangleList);

        let max_texture_dimension = device.limits().max_texture_dimension_2d;
        tracing::info!(?color_format, max_texture_dimension, "Mesh renderer ready");

        Self {
            viewport_layout,
            texture_layout,
            sampler,
            content,
            stencil,
            overlay_lines,
            overlay_triangles,
            textures: HashMap::new(),
            max_texture_dimension,
            color_format,
        }
    }

    /// Create the per-view state for a view of the given size
    pub fn create_target(&self, device: &wgpu::Device, width: u32, height: u32) -> RenderTarget {
        RenderTarget::new(device, &self.viewport_layout, width, height)
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    /// Number of cached media textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Drop the texture of a media source that no longer exists
    pub fn release_media(&mut self, media: MediaId) {
        if self.textures.remove(&media).is_some() {
            tracing::debug!(%media, "Released media texture");
        }
    }

    /// Make sure the texture for `media` exists and holds the current frame.
    ///
    /// Uploads only when the source asks for it, then clears its flag, so
    /// several views in the same tick share one upload.
    fn sync_texture(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        media: MediaId,
        library: &mut MediaLibrary,
    ) -> Result<bool, RenderError> {
        let Some(source) = library.get_mut(media) else {
            return Ok(false);
        };

        let cached = self.textures.contains_key(&media);
        if cached && !source.needs_upload() {
            return Ok(true);
        }

        let Some(frame) = source.current_frame() else {
            return Ok(cached);
        };
        validate_frame(media, frame, self.max_texture_dimension)?;

        let reuse = self
            .textures
            .get(&media)
            .is_some_and(|t| t.matches(frame.width, frame.height));
        if !reuse {
            let texture = MediaTexture::new(device, &self.texture_layout, &self.sampler, frame.width, frame.height);
            self.textures.insert(media, texture);
        }
        if let Some(texture) = self.textures.get(&media) {
            texture.upload(queue, frame);
        }
        source.mark_uploaded();
        Ok(true)
    }

    /// Draw `plan` into `color_view` using the target's stencil and viewport.
    ///
    /// Upload failures are reported per layer and the rest of the frame is
    /// still drawn.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        target: &RenderTarget,
        plan: &FramePlan,
        library: &mut MediaLibrary,
        clear_color: wgpu::Color,
    ) -> FrameReport {
        let mut report = FrameReport {
            skipped: plan.skipped.len(),
            ..Default::default()
        };

        // Upload once per media, remember the outcome for every layer using it
        let mut synced: HashMap<MediaId, Result<bool, RenderError>> = HashMap::new();
        let mut mesh_vertices: Vec<MeshVertex> = Vec::new();
        let mut mask_vertices: Vec<[f32; 2]> = Vec::new();
        let mut draws: Vec<PreparedDraw> = Vec::new();

        for draw in &plan.draws {
            let outcome = match synced.get(&draw.media) {
                Some(outcome) => outcome.clone(),
                None => {
                    let outcome = self.sync_texture(device, queue, draw.media, library);
                    synced.insert(draw.media, outcome.clone());
                    outcome
                }
            };

            match outcome {
                Ok(true) => {}
                Ok(false) => {
                    report.skipped += 1;
                    continue;
                }
                Err(error) => {
                    tracing::warn!(layer = %draw.layer, %error, "Layer not drawn");
                    report.errors.push((draw.layer, error));
                    continue;
                }
            }

            let mesh_start = mesh_vertices.len() as u32;
            mesh_vertices.extend_from_slice(&draw.vertices);
            let masks = draw
                .mask_fans
                .iter()
                .map(|fan| {
                    let start = mask_vertices.len() as u32;
                    mask_vertices.extend_from_slice(fan);
                    start..mask_vertices.len() as u32
                })
                .collect();

            draws.push(PreparedDraw {
                media: draw.media,
                blend_mode: draw.blend_mode,
                mesh: mesh_start..mesh_vertices.len() as u32,
                masks,
            });
        }

        let mesh_buffer = vertex_buffer(device, "Mesh Vertex Buffer", &mesh_vertices);
        let mask_buffer = vertex_buffer(device, "Mask Vertex Buffer", &mask_vertices);
        let line_buffer = vertex_buffer(device, "Overlay Line Buffer", &plan.overlay.lines);
        let handle_buffer = vertex_buffer(device, "Overlay Handle Buffer", &plan.overlay.triangles);

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Mesh Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: target.depth_stencil_view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0),
                    store: wgpu::StoreOp::Discard,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_bind_group(0, target.viewport_bind_group(), &[]);

        for draw in &draws {
            let (Some(texture), Some(pipelines)) = (self.textures.get(&draw.media), self.content.get(&draw.blend_mode))
            else {
                continue;
            };

            if draw.masks.is_empty() {
                pass.set_pipeline(&pipelines.unmasked);
            } else {
                if let Some(buffer) = &mask_buffer {
                    self.rasterize_masks(&mut pass, buffer, &draw.masks);
                }
                pass.set_pipeline(&pipelines.masked);
                pass.set_stencil_reference(UNION_BIT);
            }

            if let Some(buffer) = &mesh_buffer {
                pass.set_bind_group(1, texture.bind_group(), &[]);
                pass.set_vertex_buffer(0, buffer.slice(..));
                pass.draw(draw.mesh.clone(), 0..1);
                report.drawn += 1;
            }
        }

        // Overlays last so they sit above every layer
        if let Some(buffer) = &line_buffer {
            pass.set_pipeline(&self.overlay_lines);
            pass.set_vertex_buffer(0, buffer.slice(..));
            pass.draw(0..plan.overlay.lines.len() as u32, 0..1);
        }
        if let Some(buffer) = &handle_buffer {
            pass.set_pipeline(&self.overlay_triangles);
            pass.set_vertex_buffer(0, buffer.slice(..));
            pass.draw(0..plan.overlay.triangles.len() as u32, 0..1);
        }

        report
    }

    /// Leave the union bit set exactly inside the layer's mask polygons
    fn rasterize_masks(&self, pass: &mut wgpu::RenderPass<'_>, buffer: &wgpu::Buffer, fans: &[Range<u32>]) {
        pass.set_pipeline(&self.stencil.reset);
        pass.set_stencil_reference(0);
        pass.draw(0..3, 0..1);

        for fan in fans {
            pass.set_pipeline(&self.stencil.parity);
            pass.set_vertex_buffer(0, buffer.slice(..));
            pass.draw(fan.clone(), 0..1);

            pass.set_pipeline(&self.stencil.resolve);
            pass.set_stencil_reference(PARITY_BIT | UNION_BIT);
            pass.draw(0..3, 0..1);

            pass.set_pipeline(&self.stencil.clear_parity);
            pass.set_stencil_reference(0);
            pass.draw(0..3, 0..1);
        }
    }
}

/// Upload a vertex slice, or `None` when there is nothing to draw
fn vertex_buffer<T: bytemuck::Pod>(device: &wgpu::Device, label: &str, vertices: &[T]) -> Option<wgpu::Buffer> {
    if vertices.is_empty() {
        return None;
    }
    Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(vertices),
        usage: wgpu::BufferUsages::VERTEX,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_strides() {
        assert_eq!(mesh_vertex_layout().array_stride, 20);
        assert_eq!(overlay_vertex_layout().array_stride, 24);
        assert_eq!(mask_vertex_layout().array_stride, 8);
    }

    #[test]
    fn test_masked_content_reads_only_union_bit() {
        let state = depth_stencil_state(wgpu::CompareFunction::Equal, wgpu::StencilOperation::Keep, UNION_BIT, 0);
        assert_eq!(state.stencil.read_mask, UNION_BIT);
        assert_eq!(state.stencil.write_mask, 0);
        assert!(!state.depth_write_enabled);
    }

    #[test]
    fn test_unmasked_content_never_writes_stencil() {
        let state = stencil_disabled();
        assert_eq!(state.stencil.write_mask, 0);
        assert_eq!(state.stencil.front.compare, wgpu::CompareFunction::Always);
    }
}
