//! Contract between the runtime loop and the driver.
//!
//! The driver only sees a [`FrameRenderer`](crate::render::FrameRenderer) and
//! the frame time; window and device handling stay in the runtime.

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::FrameCtx;
