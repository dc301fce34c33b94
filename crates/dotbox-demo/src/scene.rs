use dotbox_engine::backend::BindingContext;
use dotbox_engine::coords::{Color, Vec2};
use dotbox_engine::core::{App, AppControl, FrameCtx};
use dotbox_engine::render::RenderError;
use dotbox_engine::time::FpsCounter;

use crate::motion::compute_instance_offsets;

const GRID_SIZE: usize = 10;
const GRID_SPACING: f32 = 0.2;
const BOX_SIZE: Vec2 = Vec2::new(64.0, 64.0);

const DOT_SIZE: f32 = 10.0;
const DOTS_A: [Vec2; 2] = [Vec2::new(50.0, 50.0), Vec2::new(100.0, 100.0)];
const DOTS_B: [Vec2; 2] = [Vec2::new(55.0, 56.0), Vec2::new(105.0, 105.0)];

/// Frames between FPS log lines.
const FPS_LOG_INTERVAL: u64 = 100;

/// The demo frame: a circling grid of boxes with two dot pairs on top.
#[derive(Debug, Default)]
pub struct DemoScene {
    fps: FpsCounter,
}

impl App for DemoScene {
    fn on_frame<C: BindingContext>(
        &mut self,
        ctx: &mut FrameCtx<'_, C>,
    ) -> Result<AppControl, RenderError> {
        self.fps.record(ctx.time.dt);
        if ctx.time.frame_index > 0 && ctx.time.frame_index % FPS_LOG_INTERVAL == 0 {
            if let Some(stats) = self.fps.stats() {
                log::info!("\n{stats}");
            }
        }

        let offsets = compute_instance_offsets(ctx.time.elapsed_ms, GRID_SIZE, GRID_SPACING);

        let renderer = &mut *ctx.renderer;
        renderer.start_next_frame()?;
        renderer.draw_instanced_boxes(&offsets, BOX_SIZE)?;
        renderer.draw_dots(&DOTS_A, DOT_SIZE, Color::BLACK)?;
        renderer.draw_dots(&DOTS_B, DOT_SIZE, Color::BLACK)?;

        Ok(AppControl::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use dotbox_engine::backend::{DrawCall, Fault, Primitive, RecordingContext};
    use dotbox_engine::coords::Viewport;
    use dotbox_engine::render::FrameRenderer;
    use dotbox_engine::time::FrameTime;

    use super::*;

    fn frame_time(frame_index: u64) -> FrameTime {
        FrameTime {
            dt: 1.0 / 60.0,
            now: Instant::now(),
            frame_index,
            elapsed_ms: frame_index as f64 * 16.0,
        }
    }

    fn renderer() -> FrameRenderer<RecordingContext> {
        let ctx = RecordingContext::new(Viewport::new(1280, 720));
        FrameRenderer::create(ctx, 1280, 720).unwrap()
    }

    #[test]
    fn frame_draws_boxes_then_dots() {
        let mut renderer = renderer();
        renderer.context_mut().take_commands();
        let mut scene = DemoScene::default();

        let mut ctx = FrameCtx {
            renderer: &mut renderer,
            time: frame_time(1),
        };
        assert_eq!(scene.on_frame(&mut ctx).unwrap(), AppControl::Continue);

        let recorder = renderer.context();
        assert_eq!(recorder.clears(), 1);
        let calls: Vec<_> = recorder.draws().map(|d| d.call).collect();
        assert_eq!(
            calls,
            [
                DrawCall::indexed(Primitive::Triangles, 6).instanced(100),
                DrawCall::arrays(Primitive::Points, 2),
                DrawCall::arrays(Primitive::Points, 2),
            ]
        );
        assert!(recorder.instanced_locations().is_empty());
    }

    #[test]
    fn upload_fault_surfaces_as_recoverable() {
        let mut renderer = renderer();
        renderer.context_mut().inject(Fault::Upload);
        let mut scene = DemoScene::default();

        let mut ctx = FrameCtx {
            renderer: &mut renderer,
            time: frame_time(1),
        };
        let err = scene.on_frame(&mut ctx).unwrap_err();
        assert!(err.is_recoverable());

        let mut ctx = FrameCtx {
            renderer: &mut renderer,
            time: frame_time(2),
        };
        assert!(scene.on_frame(&mut ctx).is_ok());
    }
}
