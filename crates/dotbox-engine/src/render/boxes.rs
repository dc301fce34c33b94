use crate::backend::{
    AttributeLocation, BackendError, BindingContext, BufferId, BufferKind, DrawCall, Primitive,
    UniformLocation, UniformValue,
};
use crate::coords::{Vec2, Viewport};

use super::error::draw_count;
use super::{AttributeDescriptor, InstanceScope, ProgramSource, RenderError, ShaderProgram};

const SOURCE: ProgramSource = ProgramSource {
    vertex: include_str!("shaders/boxes.vert.wgsl"),
    fragment: include_str!("shaders/boxes.frag.wgsl"),
};

const ATTRIBUTES: [AttributeDescriptor; 3] = [
    AttributeDescriptor::per_vertex("a_position", 2),
    AttributeDescriptor::per_vertex("a_color", 3),
    AttributeDescriptor::per_instance("a_translation", 2),
];
const UNIFORMS: [&str; 2] = ["u_resolution", "u_size"];

/// Unit quad, two triangles sharing the (-,+)/(+,-) diagonal.
const QUAD_POSITIONS: [Vec2; 4] = [
    Vec2::new(-0.5, -0.5),
    Vec2::new(-0.5, 0.5),
    Vec2::new(0.5, -0.5),
    Vec2::new(0.5, 0.5),
];

/// Per-corner RGB: blue, red, green, cyan.
const QUAD_COLORS: [[f32; 3]; 4] = [
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 1.0, 1.0],
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 1, 2, 3];

/// Static quad mesh, uploaded once.
#[derive(Debug, Copy, Clone)]
struct Mesh {
    positions: BufferId,
    colors: BufferId,
    indices: BufferId,
    index_count: u32,
}

impl Mesh {
    fn upload<C: BindingContext + ?Sized>(ctx: &mut C) -> Result<Self, BackendError> {
        let positions = ctx.create_buffer(BufferKind::Vertex)?;
        ctx.upload_buffer(positions, bytemuck::cast_slice(&QUAD_POSITIONS))?;

        let colors = ctx.create_buffer(BufferKind::Vertex)?;
        ctx.upload_buffer(colors, bytemuck::cast_slice(&QUAD_COLORS))?;

        let indices = ctx.create_buffer(BufferKind::Index)?;
        ctx.upload_buffer(indices, bytemuck::cast_slice(&QUAD_INDICES))?;

        Ok(Self {
            positions,
            colors,
            indices,
            index_count: QUAD_INDICES.len() as u32,
        })
    }
}

/// Draws one colored quad per offset in a single instanced draw.
///
/// Offsets are clip-space translations. `a_translation` is the only
/// per-instance attribute; its divisor is set for the duration of the draw
/// and reset to 0 before `render` returns, on success or failure.
#[derive(Debug)]
pub struct InstancedBoxRenderer {
    program: ShaderProgram,
    mesh: Mesh,
    a_position: AttributeLocation,
    a_color: AttributeLocation,
    a_translation: AttributeLocation,
    u_resolution: UniformLocation,
    u_size: UniformLocation,
    instances: BufferId,
}

impl InstancedBoxRenderer {
    pub const NAME: &'static str = "instanced boxes";

    /// Compiles the program and uploads the quad mesh.
    ///
    /// Every failure is reported as `RendererInit` naming this renderer.
    pub fn new<C: BindingContext + ?Sized>(ctx: &mut C) -> Result<Self, RenderError> {
        Self::build(ctx).map_err(|e| RenderError::renderer_init(Self::NAME, e))
    }

    fn build<C: BindingContext + ?Sized>(ctx: &mut C) -> Result<Self, RenderError> {
        let program = ShaderProgram::compile(ctx, Self::NAME, SOURCE, &ATTRIBUTES, &UNIFORMS)?;

        let buffers = Mesh::upload(ctx).and_then(|mesh| {
            let instances = ctx.create_buffer(BufferKind::Vertex)?;
            Ok((mesh, instances))
        });
        let (mesh, instances) = match buffers {
            Ok(buffers) => buffers,
            Err(err) => {
                ctx.delete_program(program.id());
                return Err(err.into());
            }
        };

        log::debug!("{}: mesh uploaded ({} indices)", Self::NAME, mesh.index_count);

        Ok(Self {
            a_position: program.require_attribute("a_position")?,
            a_color: program.require_attribute("a_color")?,
            a_translation: program.require_attribute("a_translation")?,
            u_resolution: program.require_uniform("u_resolution")?,
            u_size: program.require_uniform("u_size")?,
            program,
            mesh,
            instances,
        })
    }

    /// Draws the quad at every offset with a `size`-pixel extent.
    ///
    /// Always issues exactly one draw, also for an empty `offsets`.
    pub fn render<C: BindingContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        viewport: Viewport,
        offsets: &[Vec2],
        size: Vec2,
    ) -> Result<(), RenderError> {
        ctx.use_program(self.program.id());

        let mut scope = InstanceScope::enter(ctx, &self.program);
        scope.upload_buffer(self.instances, bytemuck::cast_slice(offsets))?;
        scope.bind_attribute(self.a_translation, self.instances, 2);

        scope.bind_attribute(self.a_position, self.mesh.positions, 2);
        scope.bind_attribute(self.a_color, self.mesh.colors, 3);
        scope.bind_index_buffer(Some(self.mesh.indices));

        scope.set_uniform(self.u_resolution, UniformValue::Vec2(viewport.resolution()));
        scope.set_uniform(self.u_size, UniformValue::Vec2(size.to_array()));

        let instances = draw_count(offsets.len(), "instances")?;
        let call =
            DrawCall::indexed(Primitive::Triangles, self.mesh.index_count).instanced(instances);
        scope.draw(call)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Fault, RecordedCommand, RecordingContext};

    const VIEWPORT: Viewport = Viewport::new(1280, 720);

    fn setup() -> (RecordingContext, InstancedBoxRenderer) {
        let mut ctx = RecordingContext::new(VIEWPORT);
        let boxes = InstancedBoxRenderer::new(&mut ctx).unwrap();
        ctx.take_commands();
        (ctx, boxes)
    }

    fn grid(n: usize) -> Vec<Vec2> {
        (0..n).map(|i| Vec2::new(i as f32 * 0.01, 0.0)).collect()
    }

    #[test]
    fn mesh_is_uploaded_once() {
        let (mut ctx, mut boxes) = setup();
        for _ in 0..3 {
            boxes.render(&mut ctx, VIEWPORT, &grid(4), Vec2::splat(64.0)).unwrap();
        }
        assert_eq!(ctx.upload_count(boxes.mesh.positions), 1);
        assert_eq!(ctx.upload_count(boxes.mesh.colors), 1);
        assert_eq!(ctx.upload_count(boxes.mesh.indices), 1);
        assert_eq!(ctx.upload_count(boxes.instances), 3);
    }

    #[test]
    fn single_instanced_draw() {
        let (mut ctx, mut boxes) = setup();
        boxes.render(&mut ctx, VIEWPORT, &grid(7), Vec2::splat(64.0)).unwrap();

        let draws: Vec<_> = ctx.draws().collect();
        assert_eq!(draws.len(), 1);
        let draw = draws[0];
        assert_eq!(draw.call, DrawCall::indexed(Primitive::Triangles, 6).instanced(7));
        assert_eq!(draw.attributes["a_translation"].divisor, 1);
        assert_eq!(draw.attributes["a_translation"].elements, 7);
        assert_eq!(draw.attributes["a_position"].divisor, 0);
        assert_eq!(draw.attributes["a_color"].divisor, 0);
        assert_eq!(draw.uniforms["u_size"], UniformValue::Vec2([64.0, 64.0]));
        assert!(ctx.instanced_locations().is_empty());
    }

    #[test]
    fn zero_instances_still_submits_and_resets() {
        let (mut ctx, mut boxes) = setup();
        boxes.render(&mut ctx, VIEWPORT, &[], Vec2::splat(64.0)).unwrap();

        let draws: Vec<_> = ctx.draws().collect();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].call.instances, Some(0));
        assert!(ctx.instanced_locations().is_empty());
    }

    #[test]
    fn divisor_brackets_the_draw() {
        let (mut ctx, mut boxes) = setup();
        boxes.render(&mut ctx, VIEWPORT, &grid(2), Vec2::splat(8.0)).unwrap();

        let a_translation = boxes.a_translation;
        let order: Vec<&str> = ctx
            .commands()
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::Divisor { location, divisor } if *location == a_translation => {
                    Some(if *divisor == 0 { "reset" } else { "set" })
                }
                RecordedCommand::Draw(_) => Some("draw"),
                _ => None,
            })
            .collect();
        assert_eq!(order, ["set", "draw", "reset"]);
    }

    #[test]
    fn upload_failure_resets_divisor() {
        let (mut ctx, mut boxes) = setup();
        ctx.inject(Fault::Upload);

        let err = boxes.render(&mut ctx, VIEWPORT, &grid(3), Vec2::splat(8.0)).unwrap_err();
        assert!(matches!(err, RenderError::ResourceExhausted(_)));
        assert_eq!(ctx.draws().count(), 0);
        assert!(ctx.instanced_locations().is_empty());
    }

    #[test]
    fn draw_failure_resets_divisor() {
        let (mut ctx, mut boxes) = setup();
        ctx.inject(Fault::Draw);

        let err = boxes.render(&mut ctx, VIEWPORT, &grid(3), Vec2::splat(8.0)).unwrap_err();
        assert!(matches!(err, RenderError::Backend(_)));
        assert!(ctx.instanced_locations().is_empty());

        boxes.render(&mut ctx, VIEWPORT, &grid(3), Vec2::splat(8.0)).unwrap();
        assert_eq!(ctx.draws().count(), 1);
    }

    #[test]
    fn instance_count_comes_from_current_call() {
        let (mut ctx, mut boxes) = setup();
        boxes.render(&mut ctx, VIEWPORT, &grid(10), Vec2::splat(8.0)).unwrap();
        boxes.render(&mut ctx, VIEWPORT, &grid(3), Vec2::splat(8.0)).unwrap();

        let counts: Vec<_> = ctx.draws().map(|d| d.call.instances).collect();
        assert_eq!(counts, [Some(10), Some(3)]);
    }

    #[test]
    fn missing_attribute_is_renderer_init_and_releases_program() {
        let mut ctx = RecordingContext::new(VIEWPORT);
        ctx.hide_attribute("a_translation");

        let err = InstancedBoxRenderer::new(&mut ctx).unwrap_err();
        match err {
            RenderError::RendererInit { renderer, source } => {
                assert_eq!(renderer, "instanced boxes");
                assert!(matches!(*source, RenderError::Configuration(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ctx.linked_programs(), 0);
        assert_eq!(ctx.live_shaders(), 0);
    }

    #[test]
    fn mesh_failure_is_renderer_init() {
        let mut ctx = RecordingContext::new(VIEWPORT);
        ctx.inject(Fault::Upload);

        let err = InstancedBoxRenderer::new(&mut ctx).unwrap_err();
        match err {
            RenderError::RendererInit { renderer, source } => {
                assert_eq!(renderer, "instanced boxes");
                assert!(matches!(*source, RenderError::ResourceExhausted(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ctx.linked_programs(), 0);
    }
}
