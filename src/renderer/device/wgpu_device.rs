//! `wgpu` implementation of [`RenderDevice`].
//!
//! Buffer and texture writes go to the queue immediately. Binds and draws
//! are turned into render pass commands and held until [`WgpuDevice::encode`]
//! replays them into a pass owned by the caller, which keeps the render
//! model free of pass lifetimes.

use std::collections::HashMap;
use std::num::NonZeroU64;

use crate::error::DeviceError;
use crate::renderer::device::{BufferId, BufferKind, GpuTexture, RenderDevice};
use crate::renderer::geometry::DrawMode;
use crate::renderer::material::TextureUnit;
use crate::renderer::pipeline_builder::PipelineBuilder;
use crate::renderer::shader::{ShaderId, ShaderStore, VertexFormat};
use crate::renderer::uniforms::{GLOBAL_UNIFORM_BINDING, LOCAL_UNIFORM_BINDING};
use crate::renderer::vertex::AttributeType;
use crate::settings::{BackendSettings, BufferUsage};

const GLOBALS_GROUP: u32 = 0;
const LOCALS_GROUP: u32 = 1;
const TEXTURES_GROUP: u32 = 2;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Vertex attributes of an interleaved buffer laid out per `format`.
pub fn vertex_attributes(format: VertexFormat) -> Vec<wgpu::VertexAttribute> {
    AttributeType::ALL
        .iter()
        .filter_map(|att| {
            let format_for = match format.components(*att) {
                0 => return None,
                1 => wgpu::VertexFormat::Float32,
                2 => wgpu::VertexFormat::Float32x2,
                3 => wgpu::VertexFormat::Float32x3,
                _ => wgpu::VertexFormat::Float32x4,
            };
            Some(wgpu::VertexAttribute {
                format: format_for,
                offset: (format.offset_of(*att) * std::mem::size_of::<f32>()) as u64,
                shader_location: att.shader_location(),
            })
        })
        .collect()
}

fn topology(mode: DrawMode) -> wgpu::PrimitiveTopology {
    match mode {
        DrawMode::Triangles => wgpu::PrimitiveTopology::TriangleList,
        DrawMode::Lines => wgpu::PrimitiveTopology::LineList,
        DrawMode::Points => wgpu::PrimitiveTopology::PointList,
    }
}

enum PassCommand {
    SetPipeline(wgpu::RenderPipeline),
    SetBindGroup(u32, wgpu::BindGroup),
    SetVertexBuffer(wgpu::Buffer),
    SetIndexBuffer(wgpu::Buffer),
    DrawIndexed(std::ops::Range<u32>),
}

struct BufferSlot {
    kind: BufferKind,
    label: String,
    buffer: Option<wgpu::Buffer>,
    capacity: u64,
}

impl BufferSlot {
    fn usages(&self) -> wgpu::BufferUsages {
        let kind = match self.kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
            BufferKind::Uniform => wgpu::BufferUsages::UNIFORM,
        };
        kind | wgpu::BufferUsages::COPY_DST
    }
}

struct Program {
    module: wgpu::ShaderModule,
    vertex_format: VertexFormat,
}

type TextureSet = [Option<GpuTexture>; 2];

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
    sample_count: u32,

    globals_layout: wgpu::BindGroupLayout,
    locals_layout: wgpu::BindGroupLayout,
    textures_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    fallback_view: wgpu::TextureView,

    programs: HashMap<ShaderId, Program>,
    pipelines: HashMap<(ShaderId, DrawMode), wgpu::RenderPipeline>,
    buffers: HashMap<BufferId, BufferSlot>,
    textures: HashMap<GpuTexture, wgpu::TextureView>,
    uniform_bind_groups: HashMap<(u32, BufferId, u64, u64), wgpu::BindGroup>,
    texture_bind_groups: HashMap<TextureSet, wgpu::BindGroup>,

    current_program: Option<ShaderId>,
    current_pipeline: Option<(ShaderId, DrawMode)>,
    bound_textures: TextureSet,
    textures_dirty: bool,
    line_width_logged: bool,
    commands: Vec<PassCommand>,
    next_buffer: u32,
    next_texture: u32,
}

impl WgpuDevice {
    /// Wraps an existing device. `depth_format` is the format of the depth
    /// attachment the caller's pass will use, if any.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        color_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
        settings: &BackendSettings,
    ) -> Self {
        let uniform_entry = wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GlobalUniformsLayout"),
            entries: &[uniform_entry],
        });
        let locals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LocalUniformsLayout"),
            entries: &[uniform_entry],
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };
        let textures_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("TextureUnitsLayout"),
            entries: &[
                texture_entry(0),
                sampler_entry(1),
                texture_entry(2),
                sampler_entry(3),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("BatchPipelineLayout"),
            bind_group_layouts: &[&globals_layout, &locals_layout, &textures_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("TextureUnitSampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let fallback_view = upload_rgba(&device, &queue, "FallbackWhite", 1, 1, &[255; 4]);

        Self {
            device,
            queue,
            color_format,
            depth_format: depth_format.filter(|_| settings.depth_testing),
            sample_count: settings.sample_count.max(1),
            globals_layout,
            locals_layout,
            textures_layout,
            pipeline_layout,
            sampler,
            fallback_view,
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            uniform_bind_groups: HashMap::new(),
            texture_bind_groups: HashMap::new(),
            current_program: None,
            current_pipeline: None,
            bound_textures: [None; 2],
            textures_dirty: true,
            line_width_logged: false,
            commands: Vec::new(),
            next_buffer: 0,
            next_texture: 0,
        }
    }

    /// Creates its own adapter and device, for offscreen rendering and tools.
    pub fn new_headless(
        color_format: wgpu::TextureFormat,
        settings: &BackendSettings,
    ) -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let (device, queue) = pollster::block_on(async {
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|err| DeviceError::AdapterUnavailable(err.to_string()))?;

            log::info!("Using adapter: {:?}", adapter.get_info());

            adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    experimental_features: wgpu::ExperimentalFeatures::disabled(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    trace: wgpu::Trace::Off,
                })
                .await
                .map_err(|err| DeviceError::DeviceRequest(err.to_string()))
        })?;

        Ok(Self::new(
            device,
            queue,
            color_format,
            Some(DEPTH_FORMAT),
            settings,
        ))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.depth_format
    }

    pub fn register_program(&mut self, shader: ShaderId, name: &str, vertex_format: VertexFormat, source: &str) {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        self.programs.insert(
            shader,
            Program {
                module,
                vertex_format,
            },
        );
        self.pipelines.retain(|(id, _), _| *id != shader);
        log::info!("Registered program {} as {:?}", name, shader);
    }

    pub fn register_programs(&mut self, store: &ShaderStore) {
        for program in store.programs() {
            self.register_program(
                program.spec.id,
                &program.name,
                program.spec.vertex_format,
                &program.source,
            );
        }
    }

    /// Replays everything bound and drawn since the last call.
    pub fn encode(&mut self, rpass: &mut wgpu::RenderPass<'_>) {
        for command in self.commands.drain(..) {
            match command {
                PassCommand::SetPipeline(pipeline) => rpass.set_pipeline(&pipeline),
                PassCommand::SetBindGroup(index, group) => rpass.set_bind_group(index, &group, &[]),
                PassCommand::SetVertexBuffer(buffer) => rpass.set_vertex_buffer(0, buffer.slice(..)),
                PassCommand::SetIndexBuffer(buffer) => {
                    rpass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint32)
                }
                PassCommand::DrawIndexed(indices) => rpass.draw_indexed(indices, 0, 0..1),
            }
        }
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    fn live_buffer(&self, buffer: BufferId) -> &wgpu::Buffer {
        match self.buffers.get(&buffer).and_then(|slot| slot.buffer.as_ref()) {
            Some(buffer) => buffer,
            None => panic!("{:?} bound before it was created and uploaded", buffer),
        }
    }

    fn pipeline(&mut self, shader: ShaderId, mode: DrawMode) -> wgpu::RenderPipeline {
        if let Some(pipeline) = self.pipelines.get(&(shader, mode)) {
            return pipeline.clone();
        }

        let program = match self.programs.get(&shader) {
            Some(program) => program,
            None => panic!("{:?} was never registered with the device", shader),
        };

        let attributes = vertex_attributes(program.vertex_format);
        let label = format!("BatchPipeline{:?}{:?}", shader, mode);
        let mut builder = PipelineBuilder::new(&self.device, &self.pipeline_layout, &program.module)
            .with_label(&label)
            .with_vertex_buffer(wgpu::VertexBufferLayout {
                array_stride: program.vertex_format.stride_bytes() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            })
            .with_color_target(self.color_format, Some(wgpu::BlendState::ALPHA_BLENDING))
            .with_multisample(self.sample_count)
            .with_topology(topology(mode));
        if let Some(depth_format) = self.depth_format {
            builder = builder.with_depth_stencil(depth_format, true, wgpu::CompareFunction::Less);
        }

        let pipeline = builder.build();
        log::debug!("Built {}", label);
        self.pipelines.insert((shader, mode), pipeline.clone());
        pipeline
    }

    fn texture_bind_group(&mut self, set: TextureSet) -> wgpu::BindGroup {
        if let Some(group) = self.texture_bind_groups.get(&set) {
            return group.clone();
        }

        let view = |texture: Option<GpuTexture>| {
            texture
                .and_then(|t| self.textures.get(&t))
                .unwrap_or(&self.fallback_view)
        };
        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("TextureUnitsBindGroup"),
            layout: &self.textures_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view(set[0])),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(view(set[1])),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        self.texture_bind_groups.insert(set, group.clone());
        group
    }

    fn forget_bind_groups_for(&mut self, buffer: BufferId) {
        self.uniform_bind_groups.retain(|(_, id, _, _), _| *id != buffer);
    }
}

fn upload_rgba(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );

    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

impl RenderDevice for WgpuDevice {
    fn create_buffer(&mut self, kind: BufferKind, _usage: BufferUsage, label: &str) -> BufferId {
        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(
            id,
            BufferSlot {
                kind,
                label: label.to_string(),
                buffer: None,
                capacity: 0,
            },
        );
        id
    }

    fn upload_buffer(&mut self, buffer: BufferId, data: &[u8]) {
        let slot = match self.buffers.get_mut(&buffer) {
            Some(slot) => slot,
            None => panic!("{:?} uploaded after destruction or before creation", buffer),
        };

        let required = (data.len() as u64).max(wgpu::COPY_BUFFER_ALIGNMENT);
        let mut recreated = false;
        if slot.buffer.is_none() || slot.capacity < required {
            let new_capacity = required.max(slot.capacity * 2);
            if slot.buffer.is_some() {
                log::debug!(
                    "Growing {} buffer: {} -> {}",
                    slot.label,
                    slot.capacity,
                    new_capacity
                );
            }
            slot.buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&slot.label),
                size: new_capacity,
                usage: slot.usages(),
                mapped_at_creation: false,
            }));
            slot.capacity = new_capacity;
            recreated = true;
        }

        if let Some(target) = &slot.buffer {
            if !data.is_empty() {
                self.queue.write_buffer(target, 0, data);
            }
        }

        if recreated {
            self.forget_bind_groups_for(buffer);
        }
    }

    // Pending pass commands may still hold clones, so the slot is only
    // dropped and wgpu frees the buffer once the last reference goes.
    fn destroy_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_none() {
            panic!("{:?} destroyed twice", buffer);
        }
        self.forget_bind_groups_for(buffer);
    }

    fn create_texture(&mut self, label: &str, width: u32, height: u32, rgba: &[u8]) -> GpuTexture {
        let view = upload_rgba(&self.device, &self.queue, label, width, height, rgba);
        let texture = GpuTexture(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(texture, view);
        texture
    }

    fn bind_vertex_array(&mut self) {
        self.current_pipeline = None;
        self.textures_dirty = true;
    }

    fn release_vertex_array(&mut self) {
        self.current_program = None;
        self.current_pipeline = None;
    }

    fn bind_program(&mut self, shader: ShaderId) {
        self.current_program = Some(shader);
    }

    fn release_program(&mut self, shader: ShaderId) {
        if self.current_program == Some(shader) {
            self.current_program = None;
        }
    }

    fn bind_texture(&mut self, unit: TextureUnit, texture: GpuTexture) {
        self.bound_textures[unit.index() as usize] = Some(texture);
        self.textures_dirty = true;
    }

    fn release_texture(&mut self, unit: TextureUnit, texture: GpuTexture) {
        let slot = &mut self.bound_textures[unit.index() as usize];
        if *slot == Some(texture) {
            *slot = None;
            self.textures_dirty = true;
        }
    }

    fn bind_uniform_range(&mut self, binding: u32, buffer: BufferId, offset: u64, size: u64) {
        let (group_index, layout) = match binding {
            GLOBAL_UNIFORM_BINDING => (GLOBALS_GROUP, &self.globals_layout),
            LOCAL_UNIFORM_BINDING => (LOCALS_GROUP, &self.locals_layout),
            other => panic!("no uniform block is bound at binding point {}", other),
        };

        let key = (binding, buffer, offset, size);
        let group = match self.uniform_bind_groups.get(&key) {
            Some(group) => group.clone(),
            None => {
                let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("UniformBlockBindGroup"),
                    layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: self.live_buffer(buffer),
                            offset,
                            size: NonZeroU64::new(size),
                        }),
                    }],
                });
                self.uniform_bind_groups.insert(key, group.clone());
                group
            }
        };
        self.commands.push(PassCommand::SetBindGroup(group_index, group));
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferId, format: VertexFormat) {
        debug_assert!(
            self.current_program
                .and_then(|id| self.programs.get(&id))
                .map_or(true, |program| program.vertex_format == format),
            "vertex buffer layout does not match the bound program"
        );
        let gpu = self.live_buffer(buffer).clone();
        self.commands.push(PassCommand::SetVertexBuffer(gpu));
    }

    fn bind_index_buffer(&mut self, buffer: BufferId) {
        let gpu = self.live_buffer(buffer).clone();
        self.commands.push(PassCommand::SetIndexBuffer(gpu));
    }

    fn draw_indexed(&mut self, mode: DrawMode, width: f32, first_index: u32, index_count: u32) {
        let shader = match self.current_program {
            Some(shader) => shader,
            None => panic!("draw issued with no program bound"),
        };

        if width != 1.0 && !self.line_width_logged {
            log::debug!("Draw width {} is not supported by wgpu and is ignored", width);
            self.line_width_logged = true;
        }

        if self.current_pipeline != Some((shader, mode)) {
            let pipeline = self.pipeline(shader, mode);
            self.commands.push(PassCommand::SetPipeline(pipeline));
            self.current_pipeline = Some((shader, mode));
        }

        if self.textures_dirty {
            let group = self.texture_bind_group(self.bound_textures);
            self.commands
                .push(PassCommand::SetBindGroup(TEXTURES_GROUP, group));
            self.textures_dirty = false;
        }

        self.commands
            .push(PassCommand::DrawIndexed(first_index..first_index + index_count));
    }
}
