use crate::backend::BindingContext;
use crate::render::FrameRenderer;
use crate::time::FrameTime;

/// Per-frame context passed to `core::App::on_frame`.
///
/// `'a` is the duration of the callback invocation.
pub struct FrameCtx<'a, C: BindingContext> {
    pub renderer: &'a mut FrameRenderer<C>,
    pub time: FrameTime,
}
