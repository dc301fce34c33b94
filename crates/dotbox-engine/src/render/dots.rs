use crate::backend::{
    AttributeLocation, BindingContext, BufferId, BufferKind, DrawCall, Primitive,
    UniformLocation, UniformValue,
};
use crate::coords::{Color, Vec2, Viewport};

use super::error::draw_count;
use super::{AttributeDescriptor, ProgramSource, RenderError, ShaderProgram};

const SOURCE: ProgramSource = ProgramSource {
    vertex: include_str!("shaders/dots.vert.wgsl"),
    fragment: include_str!("shaders/dots.frag.wgsl"),
};

const ATTRIBUTES: [AttributeDescriptor; 1] = [AttributeDescriptor::per_vertex("a_position", 2)];
const UNIFORMS: [&str; 3] = ["u_resolution", "u_size", "u_color"];

/// Square point sprites with one size and one color per call.
///
/// Positions are pixels with a top-left origin. The renderer never touches
/// divisors; it relies on every attribute being per-vertex when it runs.
#[derive(Debug)]
pub struct DotRenderer {
    program: ShaderProgram,
    a_position: AttributeLocation,
    u_resolution: UniformLocation,
    u_size: UniformLocation,
    u_color: UniformLocation,
    positions: BufferId,

    warned_invalid: bool,
}

impl DotRenderer {
    pub const NAME: &'static str = "dots";

    /// Fails with `RendererInit` naming this renderer.
    pub fn new<C: BindingContext + ?Sized>(ctx: &mut C) -> Result<Self, RenderError> {
        Self::build(ctx).map_err(|e| RenderError::renderer_init(Self::NAME, e))
    }

    fn build<C: BindingContext + ?Sized>(ctx: &mut C) -> Result<Self, RenderError> {
        let program = ShaderProgram::compile(ctx, Self::NAME, SOURCE, &ATTRIBUTES, &UNIFORMS)?;
        let positions = match ctx.create_buffer(BufferKind::Vertex) {
            Ok(positions) => positions,
            Err(err) => {
                ctx.delete_program(program.id());
                return Err(err.into());
            }
        };

        Ok(Self {
            a_position: program.require_attribute("a_position")?,
            u_resolution: program.require_uniform("u_resolution")?,
            u_size: program.require_uniform("u_size")?,
            u_color: program.require_uniform("u_color")?,
            program,
            positions,
            warned_invalid: false,
        })
    }

    /// Draws one `size`-pixel square per position, filled with `color`.
    ///
    /// Empty `positions`, a non-positive or non-finite `size` and a color
    /// with a non-finite channel draw nothing.
    pub fn render<C: BindingContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        viewport: Viewport,
        positions: &[Vec2],
        size: f32,
        color: Color,
    ) -> Result<(), RenderError> {
        if positions.is_empty() {
            return Ok(());
        }
        if !(size.is_finite() && size > 0.0 && color.is_finite()) {
            if !self.warned_invalid {
                log::debug!("{}: ignoring draw with size {size}, color {color:?}", Self::NAME);
                self.warned_invalid = true;
            }
            return Ok(());
        }
        let count = draw_count(positions.len(), "dots")?;

        ctx.use_program(self.program.id());
        ctx.upload_buffer(self.positions, bytemuck::cast_slice(positions))?;
        ctx.bind_attribute(self.a_position, self.positions, 2);

        ctx.set_uniform(self.u_resolution, UniformValue::Vec2(viewport.resolution()));
        ctx.set_uniform(self.u_size, UniformValue::F32(size));
        ctx.set_uniform(self.u_color, UniformValue::Vec4(color.to_array()));

        ctx.draw(DrawCall::arrays(Primitive::Points, count))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Fault, RecordingContext};

    fn setup() -> (RecordingContext, DotRenderer) {
        let mut ctx = RecordingContext::new(Viewport::new(1280, 720));
        let dots = DotRenderer::new(&mut ctx).unwrap();
        ctx.take_commands();
        (ctx, dots)
    }

    const VIEWPORT: Viewport = Viewport::new(1280, 720);

    #[test]
    fn one_point_draw_per_call() {
        let (mut ctx, mut dots) = setup();
        let positions = [Vec2::new(50.0, 50.0), Vec2::new(100.0, 100.0)];
        dots.render(&mut ctx, VIEWPORT, &positions, 10.0, Color::BLACK).unwrap();

        let draws: Vec<_> = ctx.draws().collect();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].call, DrawCall::arrays(Primitive::Points, 2));
        assert_eq!(draws[0].attributes["a_position"].elements, 2);
        assert_eq!(draws[0].attributes["a_position"].divisor, 0);
    }

    #[test]
    fn uniforms_reach_the_draw_verbatim() {
        let (mut ctx, mut dots) = setup();
        let color = Color::new(0.2, 0.4, 0.6, 1.0);
        dots.render(&mut ctx, VIEWPORT, &[Vec2::new(1.0, 2.0)], 10.0, color).unwrap();

        let draw = ctx.draws().next().unwrap();
        assert_eq!(draw.uniforms["u_color"], UniformValue::Vec4([0.2, 0.4, 0.6, 1.0]));
        assert_eq!(draw.uniforms["u_size"], UniformValue::F32(10.0));
        assert_eq!(draw.uniforms["u_resolution"], UniformValue::Vec2([1280.0, 720.0]));
    }

    #[test]
    fn positions_are_uploaded_as_floats() {
        let (mut ctx, mut dots) = setup();
        let positions = [Vec2::new(55.0, 56.0), Vec2::new(105.0, 105.0)];
        dots.render(&mut ctx, VIEWPORT, &positions, 10.0, Color::BLACK).unwrap();

        let expected = [55.0f32, 56.0, 105.0, 105.0];
        assert_eq!(
            ctx.buffer_contents(dots.positions),
            Some(bytemuck::cast_slice::<f32, u8>(&expected))
        );
    }

    #[test]
    fn empty_positions_draw_nothing() {
        let (mut ctx, mut dots) = setup();
        dots.render(&mut ctx, VIEWPORT, &[], 10.0, Color::BLACK).unwrap();
        assert!(ctx.commands().is_empty());
    }

    #[test]
    fn invalid_size_draws_nothing() {
        let (mut ctx, mut dots) = setup();
        let p = [Vec2::new(1.0, 1.0)];
        for size in [0.0, -3.0, f32::NAN, f32::INFINITY] {
            dots.render(&mut ctx, VIEWPORT, &p, size, Color::BLACK).unwrap();
        }
        assert_eq!(ctx.draws().count(), 0);
        assert!(dots.warned_invalid);
    }

    #[test]
    fn non_finite_color_draws_nothing() {
        let (mut ctx, mut dots) = setup();
        let p = [Vec2::new(1.0, 1.0)];
        let color = Color::new(0.0, f32::NAN, 0.0, 1.0);
        dots.render(&mut ctx, VIEWPORT, &p, 10.0, color).unwrap();
        assert_eq!(ctx.draws().count(), 0);
    }

    #[test]
    fn upload_failure_is_recoverable() {
        let (mut ctx, mut dots) = setup();
        let p = [Vec2::new(1.0, 1.0)];
        ctx.inject(Fault::Upload);

        let err = dots.render(&mut ctx, VIEWPORT, &p, 4.0, Color::WHITE).unwrap_err();
        assert!(matches!(err, RenderError::ResourceExhausted(_)));
        assert!(err.is_recoverable());

        dots.render(&mut ctx, VIEWPORT, &p, 4.0, Color::WHITE).unwrap();
        assert_eq!(ctx.draws().count(), 1);
    }

    #[test]
    fn buffer_creation_failure_fails_construction() {
        let mut ctx = RecordingContext::new(VIEWPORT);
        ctx.inject(Fault::BufferCreation);
        let err = DotRenderer::new(&mut ctx).unwrap_err();
        assert!(matches!(err, RenderError::RendererInit { renderer: "dots", .. }));
        assert_eq!(ctx.linked_programs(), 0);
    }

    #[test]
    fn missing_attribute_is_renderer_init() {
        let mut ctx = RecordingContext::new(VIEWPORT);
        ctx.hide_attribute("a_position");

        let err = DotRenderer::new(&mut ctx).unwrap_err();
        match err {
            RenderError::RendererInit { renderer: "dots", source } => {
                assert!(matches!(*source, RenderError::Configuration(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ctx.linked_programs(), 0);
    }
}
