//! [`BindingContext`] on wgpu.
//!
//! GL-style binding state is kept on the CPU side and turned into wgpu objects
//! at draw time:
//! - uniforms live in a shadow copy of each program's uniform blocks and are
//!   written to the block's buffer right before the draw that uses them
//! - attribute bindings and divisors select a cached pipeline variant
//! - every clear and draw is its own submission, so buffers rewritten several
//!   times per frame are read in call order
//!
//! wgpu has no programmable point size. `Primitive::Points` draws one
//! six-vertex sprite per point and steps every bound attribute per sprite;
//! shaders drawn as points build the corner from `@builtin(vertex_index)`.

mod pipeline;

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use winit::window::Window;

use crate::coords::{Color, Viewport};
use crate::device::{Gpu, GpuFrame, GpuInit, SurfaceErrorAction};

use super::reflect::{self, ProgramInterface, StageInterface};
use super::{
    AttributeInfo, AttributeLocation, BackendError, BindingContext, BufferId, BufferKind,
    Capabilities, DrawCall, Primitive, ProgramId, ShaderId, ShaderStage, UniformLocation,
    UniformValue,
};
use pipeline::{PipelineKey, VertexSlot};

/// Vertices per point sprite.
const SPRITE_VERTICES: u32 = 6;

/// Smallest allocation for a vertex or index buffer, in bytes.
const MIN_BUFFER_CAPACITY: u64 = 256;

struct CompiledStage {
    interface: StageInterface,
    module: wgpu::ShaderModule,
}

struct UniformBlock {
    binding: u32,
    shadow: Vec<u8>,
    buffer: wgpu::Buffer,
}

pub(super) struct LinkedProgram {
    label: String,
    interface: ProgramInterface,
    vertex: wgpu::ShaderModule,
    vertex_entry: String,
    fragment: wgpu::ShaderModule,
    fragment_entry: String,
    layout: wgpu::PipelineLayout,
    blocks: Vec<UniformBlock>,
    bind_group: wgpu::BindGroup,
}

struct GpuBuffer {
    kind: BufferKind,
    buffer: Option<wgpu::Buffer>,
    capacity: u64,
    /// Bytes written by the last upload.
    len: u64,
}

#[derive(Debug, Copy, Clone)]
struct AttributeBinding {
    buffer: Option<BufferId>,
    components: u8,
    divisor: u32,
}

impl Default for AttributeBinding {
    fn default() -> Self {
        Self {
            buffer: None,
            components: 4,
            divisor: 0,
        }
    }
}

/// Binding context backed by a wgpu device and a winit window surface.
pub struct WgpuContext<'w> {
    gpu: Gpu<'w>,
    label: String,
    frame: Option<GpuFrame>,
    viewport: Viewport,

    shaders: Vec<Option<CompiledStage>>,
    programs: Vec<Option<LinkedProgram>>,
    buffers: Vec<GpuBuffer>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    program: Option<ProgramId>,
    attributes: BTreeMap<AttributeLocation, AttributeBinding>,
    index_buffer: Option<BufferId>,
}

impl<'w> WgpuContext<'w> {
    /// Acquires a device for `window` and configures a `size` surface.
    pub async fn new(
        window: &'w Window,
        label: &str,
        size: Viewport,
        init: GpuInit,
    ) -> Result<Self> {
        let gpu = Gpu::new(window, label, size, init).await?;
        Ok(Self {
            gpu,
            label: label.to_string(),
            frame: None,
            viewport: size,
            shaders: Vec::new(),
            programs: Vec::new(),
            buffers: Vec::new(),
            pipelines: HashMap::new(),
            program: None,
            attributes: BTreeMap::new(),
            index_buffer: None,
        })
    }

    fn ensure_frame(&mut self) -> Result<(), BackendError> {
        if self.frame.is_some() {
            return Ok(());
        }
        match self.gpu.begin_frame() {
            Ok(frame) => {
                self.frame = Some(frame);
                Ok(())
            }
            Err(err) => {
                let msg = err.to_string();
                match self.gpu.handle_surface_error(&err) {
                    SurfaceErrorAction::Fatal => Err(BackendError::OutOfMemory(msg)),
                    action => {
                        log::warn!("surface `{}`: {msg} ({action:?})", self.label);
                        Err(BackendError::SurfaceUnavailable(msg))
                    }
                }
            }
        }
    }

    fn linked(&self, program: ProgramId) -> Result<&LinkedProgram, BackendError> {
        self.programs
            .get(program.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(BackendError::InvalidHandle("program"))
    }

    /// Full-surface viewport clamped to the backing size, or `None` when empty.
    fn pass_viewport(&self) -> Option<(f32, f32)> {
        let surface = self.gpu.size();
        let w = self.viewport.width.min(surface.width);
        let h = self.viewport.height.min(surface.height);
        (w > 0 && h > 0).then_some((w as f32, h as f32))
    }

    fn pipeline_key(
        &self,
        program: ProgramId,
        call: DrawCall,
    ) -> Result<(PipelineKey, Vec<BufferId>), BackendError> {
        let linked = self.linked(program)?;

        let mut slots = Vec::with_capacity(linked.interface.attributes.len());
        let mut buffers = Vec::with_capacity(linked.interface.attributes.len());
        for input in &linked.interface.attributes {
            let binding = self
                .attributes
                .get(&AttributeLocation(input.location))
                .copied()
                .unwrap_or_default();
            let buffer = binding.buffer.ok_or_else(|| {
                let msg = format!("attribute `{}` has no buffer bound", input.name);
                BackendError::InvalidState(msg)
            })?;
            slots.push(VertexSlot {
                location: input.location,
                components: binding.components,
                per_instance: call.primitive == Primitive::Points || binding.divisor > 0,
            });
            buffers.push(buffer);
        }

        Ok((
            PipelineKey {
                program,
                primitive: call.primitive,
                slots,
            },
            buffers,
        ))
    }

    fn bound_slice(&self, id: BufferId) -> Result<wgpu::BufferSlice<'_>, BackendError> {
        let slot = self
            .buffers
            .get(id.0 as usize)
            .ok_or(BackendError::InvalidHandle("buffer"))?;
        match &slot.buffer {
            Some(buffer) if slot.len > 0 => Ok(buffer.slice(..slot.len)),
            _ => Err(BackendError::InvalidState(format!("buffer {} is empty", id.0))),
        }
    }
}

impl BindingContext for WgpuContext<'_> {
    /// wgpu's floor is GLES 3.0 / WebGL2, where both are core.
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn surface_size(&self) -> Viewport {
        self.gpu.size()
    }

    fn display_size(&self) -> Viewport {
        self.gpu.display_size()
    }

    fn resize_surface(&mut self, size: Viewport) {
        log::debug!("surface `{}` resized to {}x{}", self.label, size.width, size.height);
        // An acquired image has the old size; drop it unpresented.
        self.frame = None;
        self.gpu.resize(size);
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn clear(&mut self, color: Color) -> Result<(), BackendError> {
        self.ensure_frame()?;
        let Some(frame) = self.frame.as_ref() else {
            return Err(BackendError::InvalidState("no frame in progress".into()));
        };

        let mut encoder = self.gpu.encoder("dotbox clear encoder");
        {
            let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("dotbox clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color.into()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.gpu.submit(encoder);
        Ok(())
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String> {
        let interface = reflect::reflect_stage(stage, source)?;
        let label = format!("{} {stage} shader {}", self.label, self.shaders.len());
        let module = self
            .gpu
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        self.shaders.push(Some(CompiledStage { interface, module }));
        Ok(ShaderId(self.shaders.len() as u32 - 1))
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        if let Some(slot) = self.shaders.get_mut(shader.0 as usize) {
            *slot = None;
        }
    }

    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId, String> {
        let stage = |id: ShaderId| {
            self.shaders
                .get(id.0 as usize)
                .and_then(Option::as_ref)
                .ok_or_else(|| format!("shader {} is not compiled", id.0))
        };
        let (vs, fs) = (stage(vertex)?, stage(fragment)?);
        let interface = reflect::link(&vs.interface, &fs.interface)?;

        let id = ProgramId(self.programs.len() as u32);
        let label = format!("{} program {}", self.label, id.0);
        let device = self.gpu.device();

        let blocks: Vec<UniformBlock> = interface
            .blocks()
            .into_iter()
            .map(|(binding, size)| UniformBlock {
                binding,
                shadow: vec![0; size as usize],
                buffer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&label),
                    size: (size as u64).next_multiple_of(16),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
            })
            .collect();

        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = blocks
            .iter()
            .map(|b| wgpu::BindGroupLayoutEntry {
                binding: b.binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZeroU64::new(b.shadow.len() as u64),
                },
                count: None,
            })
            .collect();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&label),
            entries: &layout_entries,
        });

        let group_entries: Vec<wgpu::BindGroupEntry<'_>> = blocks
            .iter()
            .map(|b| wgpu::BindGroupEntry {
                binding: b.binding,
                resource: b.buffer.as_entire_binding(),
            })
            .collect();

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&label),
            layout: &bind_group_layout,
            entries: &group_entries,
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&label),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let linked = LinkedProgram {
            label,
            vertex: vs.module.clone(),
            vertex_entry: vs.interface.entry_point.clone(),
            fragment: fs.module.clone(),
            fragment_entry: fs.interface.entry_point.clone(),
            interface,
            layout,
            blocks,
            bind_group,
        };
        self.programs.push(Some(linked));
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(slot) = self.programs.get_mut(program.0 as usize) {
            *slot = None;
        }
        self.pipelines.retain(|key, _| key.program != program);
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeInfo> {
        let linked = self.linked(program).ok()?;
        linked.interface.attribute(name).map(|a| AttributeInfo {
            location: AttributeLocation(a.location),
            components: a.components,
        })
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let linked = self.linked(program).ok()?;
        linked.interface.uniform(name).map(|u| UniformLocation {
            binding: u.binding,
            offset: u.offset,
            size: u.size,
        })
    }

    fn create_buffer(&mut self, kind: BufferKind) -> Result<BufferId, BackendError> {
        self.buffers.push(GpuBuffer {
            kind,
            buffer: None,
            capacity: 0,
            len: 0,
        });
        Ok(BufferId(self.buffers.len() as u32 - 1))
    }

    fn upload_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), BackendError> {
        let max = self.gpu.device().limits().max_buffer_size;
        let slot = self
            .buffers
            .get_mut(buffer.0 as usize)
            .ok_or(BackendError::InvalidHandle("buffer"))?;

        slot.len = 0;
        if data.is_empty() {
            return Ok(());
        }

        let padded = (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        if padded > max {
            return Err(BackendError::OutOfMemory(format!(
                "{padded} byte upload exceeds the {max} byte buffer limit"
            )));
        }

        if slot.buffer.is_none() || slot.capacity < padded {
            let capacity = padded.next_power_of_two().clamp(MIN_BUFFER_CAPACITY, max.max(padded));
            let usage = match slot.kind {
                BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
                BufferKind::Index => wgpu::BufferUsages::INDEX,
            } | wgpu::BufferUsages::COPY_DST;
            let allocated = self
                .gpu
                .try_create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&self.label),
                    size: capacity,
                    usage,
                    mapped_at_creation: false,
                })
                .map_err(|e| BackendError::OutOfMemory(format!("{capacity} byte buffer: {e}")))?;
            slot.buffer = Some(allocated);
            slot.capacity = capacity;
        }

        let Some(gpu_buffer) = slot.buffer.as_ref() else {
            return Err(BackendError::InvalidState("buffer allocation vanished".into()));
        };
        if padded == data.len() as u64 {
            self.gpu.queue().write_buffer(gpu_buffer, 0, data);
        } else {
            let mut bytes = data.to_vec();
            bytes.resize(padded as usize, 0);
            self.gpu.queue().write_buffer(gpu_buffer, 0, &bytes);
        }
        slot.len = data.len() as u64;
        Ok(())
    }

    fn use_program(&mut self, program: ProgramId) {
        self.program = Some(program);
    }

    fn bind_attribute(&mut self, location: AttributeLocation, buffer: BufferId, components: u8) {
        let binding = self.attributes.entry(location).or_default();
        binding.buffer = Some(buffer);
        binding.components = components;
    }

    fn set_divisor(&mut self, location: AttributeLocation, divisor: u32) {
        self.attributes.entry(location).or_default().divisor = divisor;
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let bound = self.program.and_then(|p| self.programs.get_mut(p.0 as usize));
        let Some(program) = bound.and_then(Option::as_mut) else {
            log::warn!("set_uniform without a bound program; ignored");
            return;
        };
        let Some(block) = program.blocks.iter_mut().find(|b| b.binding == location.binding) else {
            return;
        };
        let bytes = value.to_bytes();
        let start = location.offset as usize;
        let len = bytes.len().min(location.size as usize);
        if let Some(dst) = block.shadow.get_mut(start..start + len) {
            dst.copy_from_slice(&bytes[..len]);
        }
    }

    fn bind_index_buffer(&mut self, buffer: Option<BufferId>) {
        self.index_buffer = buffer;
    }

    fn draw(&mut self, call: DrawCall) -> Result<(), BackendError> {
        let program = self
            .program
            .ok_or_else(|| BackendError::InvalidState("no program bound".into()))?;
        let (key, vertex_buffers) = self.pipeline_key(program, call)?;

        if call.is_empty() {
            log::trace!("empty draw skipped ({call:?})");
            return Ok(());
        }
        let Some((vw, vh)) = self.pass_viewport() else {
            return Ok(());
        };

        self.ensure_frame()?;

        if !self.pipelines.contains_key(&key) {
            let linked = self.linked(program)?;
            let built = pipeline::build(self.gpu.device(), self.gpu.surface_format(), linked, &key);
            self.pipelines.insert(key.clone(), built);
        }

        let linked = self.linked(program)?;
        for block in &linked.blocks {
            self.gpu.queue().write_buffer(&block.buffer, 0, &block.shadow);
        }

        let slices = vertex_buffers
            .iter()
            .map(|id| self.bound_slice(*id))
            .collect::<Result<Vec<_>, _>>()?;
        let index_slice = match (call.indexed, self.index_buffer) {
            (true, Some(id)) => Some(self.bound_slice(id)?),
            (true, None) => return Err(BackendError::InvalidState("no index buffer bound".into())),
            (false, _) => None,
        };

        let pipeline = self
            .pipelines
            .get(&key)
            .ok_or_else(|| BackendError::InvalidState("pipeline cache miss".into()))?;
        let Some(frame) = self.frame.as_ref() else {
            return Err(BackendError::InvalidState("no frame in progress".into()));
        };

        let mut encoder = self.gpu.encoder("dotbox draw encoder");
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&linked.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &linked.bind_group, &[]);
            rpass.set_viewport(0.0, 0.0, vw, vh, 0.0, 1.0);
            for (slot, slice) in slices.into_iter().enumerate() {
                rpass.set_vertex_buffer(slot as u32, slice);
            }

            let instances = call.instances.unwrap_or(1);
            match (call.primitive, index_slice) {
                (Primitive::Points, _) => rpass.draw(0..SPRITE_VERTICES, 0..call.count),
                (Primitive::Triangles, Some(indices)) => {
                    rpass.set_index_buffer(indices, wgpu::IndexFormat::Uint16);
                    rpass.draw_indexed(0..call.count, 0, 0..instances);
                }
                (Primitive::Triangles, None) => rpass.draw(0..call.count, 0..instances),
            }
        }
        self.gpu.submit(encoder);

        log::trace!("{}: {call:?}", linked.label);
        Ok(())
    }

    fn present(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.gpu.present(frame);
        }
    }

    fn discard_frame(&mut self) {
        if self.frame.take().is_some() {
            log::debug!("surface `{}`: frame discarded", self.label);
        }
    }
}
