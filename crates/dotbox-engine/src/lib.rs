//! dotbox engine crate.
//!
//! A minimal 2D rendering harness: point sprites and instanced quads drawn
//! through an explicit binding context, plus the platform pieces (device,
//! window loop, timing, logging) needed to run it.

pub mod backend;
pub mod coords;
pub mod core;
pub mod device;
pub mod logging;
pub mod render;
pub mod time;
pub mod window;
