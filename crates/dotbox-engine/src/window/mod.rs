//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and the window, and wires them to a
//! [`FrameRenderer`](crate::render::FrameRenderer).

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
