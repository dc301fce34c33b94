//! Time subsystem.
//!
//! Provides stable, testable frame timing utilities without coupling to the runtime.
//! Intended usage:
//! - one `FrameClock` per render loop; call `tick()` once per presented frame
//! - feed `FrameTime::dt` into an `FpsCounter` for on-screen or logged statistics

mod fps;
mod frame_clock;

pub use fps::{FpsCounter, FpsStats};
pub use frame_clock::{FrameClock, FrameTime};
