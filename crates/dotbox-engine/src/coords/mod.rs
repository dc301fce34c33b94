//! Value types shared by renderers, backends and drivers.
//!
//! Canonical spaces:
//! - dot positions: pixels, origin top-left, +Y down
//! - box offsets: normalized device coordinates
//! - surface sizes: physical pixels

mod color;
mod vec2;
mod viewport;

pub use color::Color;
pub use vec2::Vec2;
pub use viewport::Viewport;
