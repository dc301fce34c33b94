use crate::backend::BindingContext;
use crate::render::RenderError;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by the driver.
///
/// The runtime ticks the clock, calls `on_frame`, then presents. Recoverable
/// errors drop the frame and the loop keeps going; any other error stops it.
pub trait App {
    /// Called once per redraw.
    fn on_frame<C: BindingContext>(
        &mut self,
        ctx: &mut FrameCtx<'_, C>,
    ) -> Result<AppControl, RenderError>;
}
