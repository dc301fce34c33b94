use std::collections::{BTreeMap, HashMap, HashSet};

use crate::coords::{Color, Viewport};

use super::reflect::{self, ProgramInterface, StageInterface};
use super::{
    AttributeInfo, AttributeLocation, BackendError, BindingContext, BufferId, BufferKind,
    Capabilities, DrawCall, ProgramId, ShaderId, ShaderStage, UniformLocation, UniformValue,
};

/// One-shot failure armed with [`RecordingContext::inject`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Fault {
    /// The next `create_buffer` fails with `OutOfMemory`.
    BufferCreation,
    /// The next `upload_buffer` fails with `OutOfMemory`.
    Upload,
    /// The next `draw` fails with `InvalidState`.
    Draw,
}

/// Binding state of one attribute as seen by a draw.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AttributeSnapshot {
    pub location: AttributeLocation,
    pub buffer: BufferId,
    pub components: u8,
    pub divisor: u32,
    /// Whole `components`-tuples in the bound buffer.
    pub elements: usize,
}

/// A recorded draw submission with the state it consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramId,
    pub call: DrawCall,
    pub viewport: Viewport,
    /// Program attributes by name.
    pub attributes: BTreeMap<String, AttributeSnapshot>,
    /// Program uniforms by name; unset uniforms are absent.
    pub uniforms: BTreeMap<String, UniformValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Resize(Viewport),
    Viewport(Viewport),
    Clear(Color),
    Upload { buffer: BufferId, bytes: usize },
    Divisor { location: AttributeLocation, divisor: u32 },
    Draw(DrawRecord),
    Present,
    Discard,
}

#[derive(Debug, Copy, Clone)]
struct AttributeState {
    buffer: Option<BufferId>,
    components: u8,
    divisor: u32,
}

impl Default for AttributeState {
    fn default() -> Self {
        Self {
            buffer: None,
            components: 4,
            divisor: 0,
        }
    }
}

#[derive(Debug)]
struct RecordedBuffer {
    kind: BufferKind,
    data: Vec<u8>,
    uploads: u32,
}

/// Headless [`BindingContext`] that records every command.
///
/// Shaders go through the same naga reflection as the wgpu backend, so compile
/// and link diagnostics are real. Draws are validated the way a native driver
/// would (bound program, bound buffers, enough elements) and logged together
/// with a snapshot of the attribute and uniform state they consumed.
#[derive(Debug)]
pub struct RecordingContext {
    capabilities: Capabilities,
    surface: Viewport,
    display: Viewport,
    viewport: Viewport,

    shaders: Vec<Option<StageInterface>>,
    programs: Vec<Option<ProgramInterface>>,
    hidden_attributes: HashSet<String>,
    buffers: Vec<RecordedBuffer>,

    program: Option<ProgramId>,
    attributes: BTreeMap<AttributeLocation, AttributeState>,
    index_buffer: Option<BufferId>,
    uniforms: HashMap<(ProgramId, UniformLocation), UniformValue>,

    faults: Vec<Fault>,
    commands: Vec<RecordedCommand>,
}

impl RecordingContext {
    /// Creates a context with every capability and a surface of `size`.
    pub fn new(size: Viewport) -> Self {
        Self::with_capabilities(size, Capabilities::ALL)
    }

    pub fn with_capabilities(size: Viewport, capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            surface: size,
            display: size,
            viewport: size,
            shaders: Vec::new(),
            programs: Vec::new(),
            hidden_attributes: HashSet::new(),
            buffers: Vec::new(),
            program: None,
            attributes: BTreeMap::new(),
            index_buffer: None,
            uniforms: HashMap::new(),
            faults: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Simulates the platform resizing the displayed surface.
    pub fn set_display_size(&mut self, size: Viewport) {
        self.display = size;
    }

    /// Reports attribute `name` as absent from every program, the way a
    /// driver does once it has optimized an unused input away.
    pub fn hide_attribute(&mut self, name: &str) {
        self.hidden_attributes.insert(name.to_string());
    }

    /// Arms a one-shot fault.
    pub fn inject(&mut self, fault: Fault) {
        self.faults.push(fault);
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<RecordedCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.commands.iter().filter_map(|c| match c {
            RecordedCommand::Draw(d) => Some(d),
            _ => None,
        })
    }

    pub fn clears(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::Clear(_)))
            .count()
    }

    /// Locations whose divisor is not 0.
    pub fn instanced_locations(&self) -> Vec<AttributeLocation> {
        self.attributes
            .iter()
            .filter(|(_, a)| a.divisor != 0)
            .map(|(l, _)| *l)
            .collect()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.iter().filter(|s| s.is_some()).count()
    }

    /// Programs linked and not yet deleted.
    pub fn linked_programs(&self) -> usize {
        self.programs.iter().filter(|p| p.is_some()).count()
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(buffer.0 as usize).map(|b| b.data.as_slice())
    }

    pub fn upload_count(&self, buffer: BufferId) -> u32 {
        self.buffers.get(buffer.0 as usize).map_or(0, |b| b.uploads)
    }

    fn take_fault(&mut self, fault: Fault) -> bool {
        match self.faults.iter().position(|f| *f == fault) {
            Some(i) => {
                self.faults.remove(i);
                true
            }
            None => false,
        }
    }

    fn interface(&self, program: ProgramId) -> Option<&ProgramInterface> {
        self.programs.get(program.0 as usize)?.as_ref()
    }

    fn elements(&self, buffer: BufferId, components: u8) -> usize {
        let stride = components.max(1) as usize * std::mem::size_of::<f32>();
        self.buffers
            .get(buffer.0 as usize)
            .map_or(0, |b| b.data.len() / stride)
    }

    fn snapshot(&self, program: ProgramId, call: DrawCall) -> Result<DrawRecord, BackendError> {
        let interface = self
            .interface(program)
            .ok_or(BackendError::InvalidHandle("program"))?;

        let mut attributes = BTreeMap::new();
        for input in &interface.attributes {
            let location = AttributeLocation(input.location);
            let state = self.attributes.get(&location).copied().unwrap_or_default();
            let buffer = state.buffer.ok_or_else(|| {
                let msg = format!("attribute `{}` has no buffer bound", input.name);
                BackendError::InvalidState(msg)
            })?;
            attributes.insert(
                input.name.clone(),
                AttributeSnapshot {
                    location,
                    buffer,
                    components: state.components,
                    divisor: state.divisor,
                    elements: self.elements(buffer, state.components),
                },
            );
        }

        let uniforms = interface
            .uniforms
            .iter()
            .filter_map(|u| {
                let location = UniformLocation {
                    binding: u.binding,
                    offset: u.offset,
                    size: u.size,
                };
                self.uniforms
                    .get(&(program, location))
                    .map(|v| (u.name.clone(), *v))
            })
            .collect();

        Ok(DrawRecord {
            program,
            call,
            viewport: self.viewport,
            attributes,
            uniforms,
        })
    }

    fn check_ranges(&self, record: &DrawRecord) -> Result<(), BackendError> {
        let call = record.call;
        if call.is_empty() {
            return Ok(());
        }
        if call.indexed {
            let ibo = self
                .index_buffer
                .ok_or_else(|| BackendError::InvalidState("no index buffer bound".into()))?;
            let indices = self
                .buffers
                .get(ibo.0 as usize)
                .map_or(0, |b| b.data.len() / std::mem::size_of::<u16>());
            if indices < call.count as usize {
                return Err(BackendError::InvalidState(format!(
                    "index buffer holds {indices} indices, draw needs {}",
                    call.count
                )));
            }
        }
        for (name, a) in &record.attributes {
            let needed = match (a.divisor, call.instances) {
                (0, _) if call.indexed => continue,
                (0, _) => call.count as usize,
                (d, Some(n)) => (n as usize).div_ceil(d as usize),
                (_, None) => 1,
            };
            if a.elements < needed {
                return Err(BackendError::InvalidState(format!(
                    "attribute `{name}` holds {} elements, draw needs {needed}",
                    a.elements
                )));
            }
        }
        Ok(())
    }
}

impl BindingContext for RecordingContext {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn surface_size(&self) -> Viewport {
        self.surface
    }

    fn display_size(&self) -> Viewport {
        self.display
    }

    fn resize_surface(&mut self, size: Viewport) {
        self.surface = size;
        self.display = size;
        self.commands.push(RecordedCommand::Resize(size));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.commands.push(RecordedCommand::Viewport(viewport));
    }

    fn clear(&mut self, color: Color) -> Result<(), BackendError> {
        self.commands.push(RecordedCommand::Clear(color));
        Ok(())
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String> {
        let interface = reflect::reflect_stage(stage, source)?;
        self.shaders.push(Some(interface));
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
        let interface = reflect::link(stage(vertex)?, stage(fragment)?)?;
        self.programs.push(Some(interface));
        Ok(ProgramId(self.programs.len() as u32 - 1))
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(slot) = self.programs.get_mut(program.0 as usize) {
            *slot = None;
        }
        self.uniforms.retain(|(p, _), _| *p != program);
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeInfo> {
        if self.hidden_attributes.contains(name) {
            return None;
        }
        self.interface(program)?.attribute(name).map(|a| AttributeInfo {
            location: AttributeLocation(a.location),
            components: a.components,
        })
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.interface(program)?.uniform(name).map(|u| UniformLocation {
            binding: u.binding,
            offset: u.offset,
            size: u.size,
        })
    }

    fn create_buffer(&mut self, kind: BufferKind) -> Result<BufferId, BackendError> {
        if self.take_fault(Fault::BufferCreation) {
            return Err(BackendError::OutOfMemory("injected buffer creation fault".into()));
        }
        self.buffers.push(RecordedBuffer {
            kind,
            data: Vec::new(),
            uploads: 0,
        });
        Ok(BufferId(self.buffers.len() as u32 - 1))
    }

    fn upload_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), BackendError> {
        if self.take_fault(Fault::Upload) {
            return Err(BackendError::OutOfMemory("injected upload fault".into()));
        }
        let slot = self
            .buffers
            .get_mut(buffer.0 as usize)
            .ok_or(BackendError::InvalidHandle("buffer"))?;
        if slot.kind == BufferKind::Index && data.len() % std::mem::size_of::<u16>() != 0 {
            return Err(BackendError::InvalidState("index data is not u16-aligned".into()));
        }
        slot.data.clear();
        slot.data.extend_from_slice(data);
        slot.uploads += 1;
        self.commands.push(RecordedCommand::Upload {
            buffer,
            bytes: data.len(),
        });
        Ok(())
    }

    fn use_program(&mut self, program: ProgramId) {
        self.program = Some(program);
    }

    fn bind_attribute(&mut self, location: AttributeLocation, buffer: BufferId, components: u8) {
        let state = self.attributes.entry(location).or_default();
        state.buffer = Some(buffer);
        state.components = components;
    }

    fn set_divisor(&mut self, location: AttributeLocation, divisor: u32) {
        self.attributes.entry(location).or_default().divisor = divisor;
        self.commands.push(RecordedCommand::Divisor { location, divisor });
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(program) = self.program else {
            log::warn!("set_uniform without a bound program; ignored");
            return;
        };
        self.uniforms.insert((program, location), value);
    }

    fn bind_index_buffer(&mut self, buffer: Option<BufferId>) {
        self.index_buffer = buffer;
    }

    fn draw(&mut self, call: DrawCall) -> Result<(), BackendError> {
        if self.take_fault(Fault::Draw) {
            return Err(BackendError::InvalidState("injected draw fault".into()));
        }
        let program = self
            .program
            .ok_or_else(|| BackendError::InvalidState("no program bound".into()))?;
        let record = self.snapshot(program, call)?;
        self.check_ranges(&record)?;
        self.commands.push(RecordedCommand::Draw(record));
        Ok(())
    }

    fn present(&mut self) {
        self.commands.push(RecordedCommand::Present);
    }

    fn discard_frame(&mut self) {
        self.commands.push(RecordedCommand::Discard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Primitive;

    const VS: &str = "@vertex fn vs_main(@location(0) a_position: vec2<f32>) -> @builtin(position) vec4<f32> { return vec4<f32>(a_position, 0.0, 1.0); }";
    const FS: &str = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";

    fn linked(ctx: &mut RecordingContext) -> ProgramId {
        let vs = ctx.compile_shader(ShaderStage::Vertex, VS).unwrap();
        let fs = ctx.compile_shader(ShaderStage::Fragment, FS).unwrap();
        ctx.link_program(vs, fs).unwrap()
    }

    #[test]
    fn draw_without_program_is_rejected() {
        let mut ctx = RecordingContext::new(Viewport::new(4, 4));
        let err = ctx.draw(DrawCall::arrays(Primitive::Points, 1)).unwrap_err();
        assert!(matches!(err, BackendError::InvalidState(_)));
    }

    #[test]
    fn draw_past_buffer_end_is_rejected() {
        let mut ctx = RecordingContext::new(Viewport::new(4, 4));
        let program = linked(&mut ctx);
        let buf = ctx.create_buffer(BufferKind::Vertex).unwrap();
        ctx.upload_buffer(buf, bytemuck::cast_slice(&[0.0f32, 0.0])).unwrap();
        ctx.use_program(program);
        ctx.bind_attribute(AttributeLocation(0), buf, 2);

        assert!(ctx.draw(DrawCall::arrays(Primitive::Points, 1)).is_ok());
        assert!(ctx.draw(DrawCall::arrays(Primitive::Points, 2)).is_err());
    }

    #[test]
    fn upload_replaces_contents() {
        let mut ctx = RecordingContext::new(Viewport::new(4, 4));
        let buf = ctx.create_buffer(BufferKind::Vertex).unwrap();
        ctx.upload_buffer(buf, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        ctx.upload_buffer(buf, &[9, 9, 9, 9]).unwrap();
        assert_eq!(ctx.buffer_contents(buf), Some(&[9u8, 9, 9, 9][..]));
        assert_eq!(ctx.upload_count(buf), 2);
    }

    #[test]
    fn faults_fire_once() {
        let mut ctx = RecordingContext::new(Viewport::new(4, 4));
        let buf = ctx.create_buffer(BufferKind::Vertex).unwrap();
        ctx.inject(Fault::Upload);
        assert!(matches!(ctx.upload_buffer(buf, &[0; 4]), Err(BackendError::OutOfMemory(_))));
        assert!(ctx.upload_buffer(buf, &[0; 4]).is_ok());
    }

    #[test]
    fn deleted_program_cannot_draw() {
        let mut ctx = RecordingContext::new(Viewport::new(4, 4));
        let program = linked(&mut ctx);
        ctx.use_program(program);
        ctx.delete_program(program);

        assert_eq!(ctx.linked_programs(), 0);
        assert!(ctx.attribute_location(program, "a_position").is_none());
        assert!(ctx.draw(DrawCall::arrays(Primitive::Points, 0)).is_err());
    }

    #[test]
    fn divisor_state_is_tracked() {
        let mut ctx = RecordingContext::new(Viewport::new(4, 4));
        ctx.set_divisor(AttributeLocation(2), 1);
        assert_eq!(ctx.instanced_locations(), vec![AttributeLocation(2)]);
        ctx.set_divisor(AttributeLocation(2), 0);
        assert!(ctx.instanced_locations().is_empty());
    }
}
