use winit::window::Window;

use crate::backend::{BindingContext, WgpuContext};
use crate::coords::{Color, Vec2, Viewport};
use crate::device::GpuInit;

use super::{DotRenderer, InstancedBoxRenderer, RenderError};

/// Surface parameters for [`FrameRenderer::for_window`].
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    /// Labels the device and the log lines of this surface.
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub gpu: GpuInit,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            id: "game-canvas".to_string(),
            width: 1280,
            height: 720,
            gpu: GpuInit::default(),
        }
    }
}

/// Per-frame drawing facade over one binding context.
///
/// Frame shape: `start_next_frame`, any number of `draw_*` calls in any
/// order, then `present`. Draws use the viewport captured by the last
/// `start_next_frame`; a resize in between is picked up by the next frame.
pub struct FrameRenderer<C: BindingContext> {
    context: C,
    viewport: Viewport,
    dots: DotRenderer,
    boxes: InstancedBoxRenderer,
}

impl<C: BindingContext> FrameRenderer<C> {
    /// Checks the context, sizes its surface to `width`x`height` and builds
    /// both renderers.
    pub fn create(mut context: C, width: u32, height: u32) -> Result<Self, RenderError> {
        if let Some(missing) = context.capabilities().first_missing() {
            return Err(RenderError::UnsupportedBackend(missing));
        }

        let viewport = Viewport::new(width, height);
        if !viewport.is_valid() {
            return Err(RenderError::Init(format!("surface size {width}x{height} is empty")));
        }
        context.resize_surface(viewport);
        context.set_viewport(viewport);

        let dots = DotRenderer::new(&mut context)?;
        let boxes = InstancedBoxRenderer::new(&mut context)?;

        log::info!("frame renderer ready at {width}x{height}");

        Ok(Self {
            context,
            viewport,
            dots,
            boxes,
        })
    }

    /// Matches the surface to the displayed size, resets the viewport and
    /// clears to transparent black.
    pub fn start_next_frame(&mut self) -> Result<(), RenderError> {
        let displayed = self.context.display_size();
        if displayed.is_valid() && displayed != self.context.surface_size() {
            log::debug!(
                "surface resized {}x{} -> {}x{}",
                self.viewport.width,
                self.viewport.height,
                displayed.width,
                displayed.height
            );
            self.context.resize_surface(displayed);
        }

        self.viewport = self.context.surface_size();
        self.context.set_viewport(self.viewport);
        self.context.clear(Color::TRANSPARENT)?;
        Ok(())
    }

    /// `size`-pixel squares at pixel `positions` (top-left origin).
    pub fn draw_dots(
        &mut self,
        positions: &[Vec2],
        size: f32,
        color: Color,
    ) -> Result<(), RenderError> {
        self.dots.render(&mut self.context, self.viewport, positions, size, color)
    }

    /// One quad per clip-space offset, `size` pixels across.
    pub fn draw_instanced_boxes(
        &mut self,
        offsets: &[Vec2],
        size: Vec2,
    ) -> Result<(), RenderError> {
        self.boxes.render(&mut self.context, self.viewport, offsets, size)
    }

    pub fn present(&mut self) {
        self.context.present();
    }

    /// Drops the frame in progress; the screen keeps the last presented one.
    pub fn discard_frame(&mut self) {
        self.context.discard_frame();
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }
}

impl<'w> FrameRenderer<WgpuContext<'w>> {
    /// Acquires a wgpu context for `window` and builds the renderer on it.
    pub fn for_window(window: &'w Window, config: SurfaceConfig) -> Result<Self, RenderError> {
        let SurfaceConfig {
            id,
            width,
            height,
            gpu,
        } = config;

        let context = pollster::block_on(WgpuContext::new(
            window,
            &id,
            Viewport::new(width, height),
            gpu,
        ))
        .map_err(|e| RenderError::Init(format!("{e:#}")))?;

        Self::create(context, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        Capabilities, Capability, DrawCall, Fault, Primitive, RecordedCommand, RecordingContext,
        UniformValue,
    };

    fn renderer() -> FrameRenderer<RecordingContext> {
        let ctx = RecordingContext::new(Viewport::new(640, 480));
        let mut renderer = FrameRenderer::create(ctx, 1280, 720).unwrap();
        renderer.context_mut().take_commands();
        renderer
    }

    fn offsets(n: usize) -> Vec<Vec2> {
        (0..n).map(|i| Vec2::new(i as f32 * 0.1, 0.0)).collect()
    }

    #[test]
    fn create_sets_surface_size() {
        let renderer = renderer();
        assert_eq!(renderer.viewport(), Viewport::new(1280, 720));
        assert_eq!(renderer.context().surface_size(), Viewport::new(1280, 720));
    }

    #[test]
    fn missing_capability_is_unsupported_backend() {
        let caps = Capabilities {
            instanced_draw: false,
            vertex_array_object: true,
        };
        let ctx = RecordingContext::with_capabilities(Viewport::new(8, 8), caps);
        let err = FrameRenderer::create(ctx, 1280, 720).err().unwrap();
        assert!(matches!(err, RenderError::UnsupportedBackend(Capability::InstancedDraw)));

        let caps = Capabilities {
            instanced_draw: true,
            vertex_array_object: false,
        };
        let ctx = RecordingContext::with_capabilities(Viewport::new(8, 8), caps);
        let err = FrameRenderer::create(ctx, 1280, 720).err().unwrap();
        assert!(matches!(err, RenderError::UnsupportedBackend(Capability::VertexArrayObject)));
    }

    #[test]
    fn zero_size_is_init_error() {
        let ctx = RecordingContext::new(Viewport::new(8, 8));
        let err = FrameRenderer::create(ctx, 0, 720).err().unwrap();
        assert!(matches!(err, RenderError::Init(_)));
    }

    #[test]
    fn each_frame_clears_once() {
        let mut renderer = renderer();
        renderer.start_next_frame().unwrap();
        renderer.start_next_frame().unwrap();

        let clears: Vec<_> = renderer
            .context()
            .commands()
            .iter()
            .filter(|c| matches!(c, RecordedCommand::Clear(_)))
            .collect();
        assert_eq!(clears, [&RecordedCommand::Clear(Color::TRANSPARENT); 2]);
    }

    #[test]
    fn frame_resets_viewport_to_full_surface() {
        let mut renderer = renderer();
        renderer.context_mut().set_viewport(Viewport::new(10, 10));
        renderer.start_next_frame().unwrap();
        assert_eq!(renderer.context().viewport(), Viewport::new(1280, 720));
    }

    #[test]
    fn resize_is_picked_up_by_next_frame() {
        let mut renderer = renderer();
        renderer.start_next_frame().unwrap();
        renderer.context_mut().set_display_size(Viewport::new(800, 600));

        renderer.draw_dots(&[Vec2::new(1.0, 1.0)], 4.0, Color::BLACK).unwrap();
        renderer.start_next_frame().unwrap();
        renderer.draw_dots(&[Vec2::new(1.0, 1.0)], 4.0, Color::BLACK).unwrap();

        let resolutions: Vec<_> = renderer
            .context()
            .draws()
            .map(|d| d.uniforms["u_resolution"])
            .collect();
        assert_eq!(
            resolutions,
            [UniformValue::Vec2([1280.0, 720.0]), UniformValue::Vec2([800.0, 600.0])]
        );
        assert_eq!(renderer.viewport(), Viewport::new(800, 600));
    }

    #[test]
    fn minimized_display_keeps_surface() {
        let mut renderer = renderer();
        renderer.context_mut().set_display_size(Viewport::new(0, 0));
        renderer.start_next_frame().unwrap();
        assert_eq!(renderer.viewport(), Viewport::new(1280, 720));
    }

    #[test]
    fn grid_scenario() {
        let mut renderer = renderer();
        renderer.start_next_frame().unwrap();
        renderer
            .draw_instanced_boxes(&offsets(100), Vec2::splat(64.0))
            .unwrap();

        let draws: Vec<_> = renderer.context().draws().collect();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].call, DrawCall::indexed(Primitive::Triangles, 6).instanced(100));
        assert_eq!(draws[0].uniforms["u_resolution"], UniformValue::Vec2([1280.0, 720.0]));
        assert!(renderer.context().instanced_locations().is_empty());
    }

    #[test]
    fn dots_after_boxes_see_per_vertex_attributes() {
        let mut renderer = renderer();
        renderer.start_next_frame().unwrap();
        renderer
            .draw_instanced_boxes(&offsets(100), Vec2::splat(64.0))
            .unwrap();
        renderer
            .draw_dots(&[Vec2::new(50.0, 50.0), Vec2::new(100.0, 100.0)], 10.0, Color::BLACK)
            .unwrap();
        renderer
            .draw_dots(&[Vec2::new(55.0, 56.0), Vec2::new(105.0, 105.0)], 10.0, Color::BLACK)
            .unwrap();

        let draws: Vec<_> = renderer.context().draws().collect();
        assert_eq!(draws.len(), 3);
        for dots in &draws[1..] {
            assert_eq!(dots.call, DrawCall::arrays(Primitive::Points, 2));
            assert!(dots.attributes.values().all(|a| a.divisor == 0));
        }
    }

    #[test]
    fn failed_box_draw_leaves_next_draws_working() {
        let mut renderer = renderer();
        renderer.start_next_frame().unwrap();

        renderer.context_mut().inject(Fault::Upload);
        let err = renderer
            .draw_instanced_boxes(&offsets(4), Vec2::splat(64.0))
            .unwrap_err();
        assert!(err.is_recoverable());

        renderer.draw_dots(&[Vec2::new(1.0, 1.0)], 4.0, Color::BLACK).unwrap();
        renderer
            .draw_instanced_boxes(&offsets(4), Vec2::splat(64.0))
            .unwrap();
        assert_eq!(renderer.context().draws().count(), 2);
        assert!(renderer.context().instanced_locations().is_empty());
    }

    #[test]
    fn empty_draws_are_noops() {
        let mut renderer = renderer();
        renderer.start_next_frame().unwrap();
        renderer.draw_dots(&[], 10.0, Color::BLACK).unwrap();
        renderer.draw_instanced_boxes(&[], Vec2::splat(64.0)).unwrap();

        let draws: Vec<_> = renderer.context().draws().collect();
        assert_eq!(draws.len(), 1);
        assert!(draws[0].call.is_empty());
    }

    #[test]
    fn discarded_frame_is_not_presented() {
        let mut renderer = renderer();
        renderer.start_next_frame().unwrap();
        renderer.discard_frame();

        let commands = renderer.context().commands();
        assert_eq!(commands.last(), Some(&RecordedCommand::Discard));
        assert!(!commands.contains(&RecordedCommand::Present));
    }

    #[test]
    fn present_reaches_backend() {
        let mut renderer = renderer();
        renderer.start_next_frame().unwrap();
        renderer.present();
        assert_eq!(renderer.context().commands().last(), Some(&RecordedCommand::Present));
    }
}
