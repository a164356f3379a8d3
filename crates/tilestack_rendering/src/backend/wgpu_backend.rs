//! Offscreen wgpu backend.
//!
//! ```text
//! begin_frame ──> draw_instanced (queued) ... ──> end_frame ──> read_pixels
//!                                                  │
//!                                                  └─ one render pass,
//!                                                     draws in call order
//! ```
//!
//! The atlas is uploaded once with [`WgpuBackend::install_atlas`]. Single
//! resource mode binds every tile texture as one binding array; fixed
//! capacity mode binds one texture array per atlas resource.

use std::cell::Cell;
use std::num::{NonZeroU32, NonZeroU64};
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use wgpu::util::DeviceExt;

use super::{DrawCall, GpuBackend};
use crate::atlas::{AtlasMode, AtlasRegistry, Capabilities, TextureImage};
use crate::error::{BackendError, BackendResult};
use crate::instancing::{QuadVertex, TileInstance, QUAD_INDICES, QUAD_VERTICES};

/// Draws accepted between `begin_frame` and `end_frame`.
pub const MAX_DRAWS_PER_FRAME: usize = 1024;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const CLEAR_COLOR: wgpu::Color = wgpu::Color { r: 0.05, g: 0.05, b: 0.08, a: 1.0 };

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];
const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![2 => Float32x2, 3 => Float32, 4 => Float32];

/// Per-draw uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DrawUniform {
    view_proj: [[f32; 4]; 4],
    /// x: tile size, y: draw position.
    params: [f32; 4],
}

/// GPU instance storage. Dropping it releases the buffer once no queued
/// draw still refers to it.
#[derive(Debug)]
pub struct WgpuInstanceBuffer {
    buffer: Rc<wgpu::Buffer>,
    capacity: usize,
    live: Rc<Cell<usize>>,
}

impl WgpuInstanceBuffer {
    /// Instance capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for WgpuInstanceBuffer {
    fn drop(&mut self) {
        self.live.set(self.live.get().saturating_sub(1));
    }
}

/// Array textures are never created with a single layer: GL binds those
/// as plain 2D textures, and sampling them as an array returns black.
const MIN_ARRAY_LAYERS: usize = 2;

/// Layers of one fixed capacity array, padded with `placeholder`.
fn array_layers<'a>(
    images: impl IntoIterator<Item = &'a TextureImage>,
    placeholder: &'a TextureImage,
) -> Vec<&'a TextureImage> {
    let mut layers: Vec<&TextureImage> = images.into_iter().collect();
    while layers.len() < MIN_ARRAY_LAYERS {
        layers.push(placeholder);
    }
    layers
}

/// Atlas textures as bound for drawing.
enum AtlasTexture {
    SingleResource {
        bind_group: wgpu::BindGroup,
        textures: Vec<wgpu::Texture>,
    },
    FixedArray {
        bind_groups: Vec<wgpu::BindGroup>,
        textures: Vec<wgpu::Texture>,
    },
}

impl AtlasTexture {
    fn bind_group(&self, resource: u32) -> Option<&wgpu::BindGroup> {
        match self {
            Self::SingleResource { bind_group, .. } => (resource == 0).then_some(bind_group),
            Self::FixedArray { bind_groups, .. } => bind_groups.get(resource as usize),
        }
    }

    fn texture_count(&self) -> usize {
        match self {
            Self::SingleResource { textures, .. } | Self::FixedArray { textures, .. } => textures.len(),
        }
    }
}

struct InstalledAtlas {
    textures: AtlasTexture,
    pipeline: wgpu::RenderPipeline,
}

struct PendingDraw {
    instances: Rc<wgpu::Buffer>,
    atlas_resource: u32,
    position_z: f32,
    instance_count: u32,
}

/// Renders into an offscreen colour target.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: Capabilities,
    width: u32,
    height: u32,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    quad_vertices: wgpu::Buffer,
    quad_indices: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    uniform_stride: u64,
    uniform_layout: wgpu::BindGroupLayout,
    uniform_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    atlas: Option<InstalledAtlas>,
    view_proj: [[f32; 4]; 4],
    tile_size: f32,
    pending: Vec<PendingDraw>,
    live_buffers: Rc<Cell<usize>>,
}

impl WgpuBackend {
    /// Opens a device and a `width x height` offscreen target.
    ///
    /// Binding arrays are enabled when the adapter supports them.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::AdapterUnavailable`] without a usable GPU
    /// and [`BackendError::RequestDevice`] if device creation fails.
    pub fn new(width: u32, height: u32) -> BackendResult<Self> {
        let (width, height) = (width.max(1), height.max(1));
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(BackendError::AdapterUnavailable)?;

        let bindless = wgpu::Features::TEXTURE_BINDING_ARRAY
            | wgpu::Features::SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING;
        let resident_texture_handles = adapter.features().contains(bindless);
        let limits = adapter.limits();
        let capabilities = Capabilities {
            resident_texture_handles,
            max_array_layers: limits.max_texture_array_layers,
        };

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("TILESTACK"),
                required_features: if resident_texture_handles { bindless } else { wgpu::Features::empty() },
                required_limits: limits.clone(),
            },
            None,
        ))
        .map_err(|err| BackendError::RequestDevice(err.to_string()))?;

        tracing::info!(
            adapter = %adapter.get_info().name,
            resident_texture_handles,
            max_array_layers = capabilities.max_array_layers,
            "GPU device ready"
        );

        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Color Target"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        let quad_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let uniform_size = std::mem::size_of::<DrawUniform>() as u64;
        let uniform_stride = u64::from(limits.min_uniform_buffer_offset_alignment).max(uniform_size);
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniforms"),
            size: uniform_stride * MAX_DRAWS_PER_FRAME as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(uniform_size),
                },
                count: None,
            }],
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Uniform Bind Group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: NonZeroU64::new(uniform_size),
                }),
            }],
        });

        // Pixel-art tiles: no filtering
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Tile Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            device,
            queue,
            capabilities,
            width,
            height,
            color,
            color_view,
            depth_view,
            quad_vertices,
            quad_indices,
            uniform_buffer,
            uniform_stride,
            uniform_layout,
            uniform_bind_group,
            sampler,
            atlas: None,
            view_proj: crate::camera::Camera::default().view_proj(1.0),
            tile_size: 1.0,
            pending: Vec::new(),
            live_buffers: Rc::new(Cell::new(0)),
        })
    }

    /// Uploads the atlas textures and builds the matching pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unsupported`] if single resource mode needs
    /// more textures than one binding array can hold.
    pub fn install_atlas(&mut self, atlas: &AtlasRegistry) -> BackendResult<()> {
        let (width, height) = atlas.texture_size().unwrap_or((1, 1));
        let placeholder = TextureImage::solid("placeholder", width, height, [0, 0, 0, 0]);

        let installed = match atlas.mode() {
            AtlasMode::SingleResource => {
                let mut images: Vec<&TextureImage> = atlas
                    .resources()
                    .iter()
                    .flat_map(|resource| resource.entries.iter().map(|entry| &entry.image))
                    .collect();
                if images.is_empty() {
                    images.push(&placeholder);
                }
                let max = self.device.limits().max_sampled_textures_per_shader_stage as usize;
                if images.len() > max {
                    return Err(BackendError::Unsupported(format!(
                        "{} textures exceed the binding array limit of {max}",
                        images.len()
                    )));
                }

                let textures: Vec<wgpu::Texture> = images
                    .iter()
                    .map(|image| self.upload_texture("Tile Texture", width, height, &[*image]))
                    .collect();
                let views: Vec<wgpu::TextureView> = textures
                    .iter()
                    .map(|texture| texture.create_view(&wgpu::TextureViewDescriptor::default()))
                    .collect();
                let view_refs: Vec<&wgpu::TextureView> = views.iter().collect();

                #[allow(clippy::cast_possible_truncation)]
                let layout = self.atlas_layout(wgpu::TextureViewDimension::D2, NonZeroU32::new(views.len() as u32));
                let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Atlas Binding Array"),
                    layout: &layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureViewArray(&view_refs),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                    ],
                });
                InstalledAtlas {
                    pipeline: self.build_pipeline(include_str!("../../shaders/tile_bindless.wgsl"), &layout),
                    textures: AtlasTexture::SingleResource { bind_group, textures },
                }
            }
            AtlasMode::FixedCapacity { .. } => {
                let layout = self.atlas_layout(wgpu::TextureViewDimension::D2Array, None);
                let mut textures = Vec::with_capacity(atlas.resource_count());
                let mut bind_groups = Vec::with_capacity(atlas.resource_count());
                for resource in atlas.resources() {
                    let layers = array_layers(resource.entries.iter().map(|entry| &entry.image), &placeholder);
                    let texture = self.upload_texture("Tile Texture Array", width, height, &layers);
                    let view = texture.create_view(&wgpu::TextureViewDescriptor {
                        dimension: Some(wgpu::TextureViewDimension::D2Array),
                        ..Default::default()
                    });
                    bind_groups.push(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("Atlas Texture Array"),
                        layout: &layout,
                        entries: &[
                            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) },
                            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&self.sampler) },
                        ],
                    }));
                    textures.push(texture);
                }
                InstalledAtlas {
                    pipeline: self.build_pipeline(include_str!("../../shaders/tile_array.wgsl"), &layout),
                    textures: AtlasTexture::FixedArray { bind_groups, textures },
                }
            }
        };

        tracing::info!(
            mode = ?atlas.mode(),
            textures = installed.textures.texture_count(),
            "Atlas installed on GPU"
        );
        self.atlas = Some(installed);
        Ok(())
    }

    /// Starts a frame. Draws queued until [`Self::end_frame`] use this
    /// camera matrix and tile size.
    pub fn begin_frame(&mut self, view_proj: [[f32; 4]; 4], tile_size: f32) {
        self.view_proj = view_proj;
        self.tile_size = tile_size;
        self.pending.clear();
    }

    /// Encodes every queued draw into one render pass and submits it.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::AtlasNotInstalled`] if draws were queued
    /// without an atlas.
    pub fn end_frame(&mut self) -> BackendResult<()> {
        let draws = std::mem::take(&mut self.pending);
        if !draws.is_empty() && self.atlas.is_none() {
            return Err(BackendError::AtlasNotInstalled);
        }

        let stride = self.uniform_stride as usize;
        let mut uniforms = vec![0u8; stride * draws.len()];
        for (chunk, draw) in uniforms.chunks_exact_mut(stride).zip(&draws) {
            let uniform = DrawUniform {
                view_proj: self.view_proj,
                params: [self.tile_size, draw.position_z, 0.0, 0.0],
            };
            chunk[..std::mem::size_of::<DrawUniform>()].copy_from_slice(bytemuck::bytes_of(&uniform));
        }
        if !uniforms.is_empty() {
            self.queue.write_buffer(&self.uniform_buffer, 0, &uniforms);
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Tile Frame"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Tile Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            if let Some(atlas) = &self.atlas {
                pass.set_pipeline(&atlas.pipeline);
                pass.set_vertex_buffer(0, self.quad_vertices.slice(..));
                pass.set_index_buffer(self.quad_indices.slice(..), wgpu::IndexFormat::Uint16);

                for (index, draw) in draws.iter().enumerate() {
                    let Some(bind_group) = atlas.textures.bind_group(draw.atlas_resource) else {
                        continue;
                    };
                    #[allow(clippy::cast_possible_truncation)]
                    let offset = (index as u64 * self.uniform_stride) as u32;
                    pass.set_bind_group(0, &self.uniform_bind_group, &[offset]);
                    pass.set_bind_group(1, bind_group, &[]);
                    pass.set_vertex_buffer(1, draw.instances.slice(..));
                    #[allow(clippy::cast_possible_truncation)]
                    pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..draw.instance_count);
                }
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        tracing::trace!(draws = draws.len(), "Frame submitted");
        Ok(())
    }

    /// Copies the colour target back to the CPU.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Readback`] if mapping the staging buffer
    /// fails.
    pub fn read_pixels(&self) -> BackendResult<RgbaImage> {
        let unpadded = self.width * 4;
        let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback"),
            size: u64::from(padded) * u64::from(self.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|err| BackendError::Readback(err.to_string()))?
            .map_err(|err| BackendError::Readback(err.to_string()))?;

        let mut pixels = Vec::with_capacity((unpadded * self.height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        staging.unmap();

        RgbaImage::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| BackendError::Readback("pixel buffer size mismatch".into()))
    }

    /// Target size in pixels.
    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Instance buffers created and not yet disposed.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.get()
    }

    fn atlas_layout(&self, dimension: wgpu::TextureViewDimension, count: Option<NonZeroU32>) -> wgpu::BindGroupLayout {
        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Atlas Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: dimension,
                        multisampled: false,
                    },
                    count,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        })
    }

    /// A texture with one layer per image, all `width x height`.
    fn upload_texture(&self, label: &str, width: u32, height: u32, layers: &[&TextureImage]) -> wgpu::Texture {
        #[allow(clippy::cast_possible_truncation)]
        let size = wgpu::Extent3d { width, height, depth_or_array_layers: layers.len() as u32 };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for (layer, image) in (0u32..).zip(layers) {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                    aspect: wgpu::TextureAspect::All,
                },
                &image.rgba,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(width * 4),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            );
        }
        texture
    }

    fn build_pipeline(&self, source: &str, atlas_layout: &wgpu::BindGroupLayout) -> wgpu::RenderPipeline {
        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Tile Shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Tile Pipeline Layout"),
            bind_group_layouts: &[&self.uniform_layout, atlas_layout],
            push_constant_ranges: &[],
        });

        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Tile Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<QuadVertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &QUAD_ATTRIBUTES,
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: TileInstance::SIZE as u64,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &INSTANCE_ATTRIBUTES,
                    },
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        })
    }
}

impl GpuBackend for WgpuBackend {
    type InstanceBuffer = WgpuInstanceBuffer;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_instance_buffer(&mut self, capacity: usize) -> BackendResult<WgpuInstanceBuffer> {
        let requested = (capacity.max(1) * TileInstance::SIZE) as u64;
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Tile Instances"),
            size: requested,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            tracing::warn!(requested, error = %err, "Instance buffer allocation failed");
            return Err(BackendError::OutOfMemory { requested, live: self.live_buffers() });
        }
        self.live_buffers.set(self.live_buffers.get() + 1);
        Ok(WgpuInstanceBuffer {
            buffer: Rc::new(buffer),
            capacity,
            live: Rc::clone(&self.live_buffers),
        })
    }

    fn upload(&mut self, buffer: &WgpuInstanceBuffer, instances: &[TileInstance]) -> BackendResult<()> {
        if instances.len() > buffer.capacity {
            return Err(BackendError::CapacityOverflow { capacity: buffer.capacity, len: instances.len() });
        }
        if !instances.is_empty() {
            self.queue.write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(instances));
        }
        Ok(())
    }

    fn draw_instanced(&mut self, buffer: &WgpuInstanceBuffer, call: DrawCall) -> BackendResult<()> {
        let atlas = self.atlas.as_ref().ok_or(BackendError::AtlasNotInstalled)?;
        if atlas.textures.bind_group(call.atlas_resource).is_none() {
            return Err(BackendError::UnknownAtlasResource(call.atlas_resource));
        }
        if call.instance_count as usize > buffer.capacity {
            return Err(BackendError::CapacityOverflow {
                capacity: buffer.capacity,
                len: call.instance_count as usize,
            });
        }
        if self.pending.len() >= MAX_DRAWS_PER_FRAME {
            return Err(BackendError::TooManyDraws(MAX_DRAWS_PER_FRAME));
        }
        self.pending.push(PendingDraw {
            instances: Rc::clone(&buffer.buffer),
            atlas_resource: call.atlas_resource,
            position_z: call.position_z,
            instance_count: call.instance_count,
        });
        Ok(())
    }

    fn dispose(&mut self, buffer: WgpuInstanceBuffer) {
        drop(buffer);
    }
}
