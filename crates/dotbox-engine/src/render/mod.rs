//! Rendering core.
//!
//! Two fixed renderers behind one per-frame facade:
//! - [`DotRenderer`]: square point sprites, pixel coordinates
//! - [`InstancedBoxRenderer`]: a unit quad instanced across clip-space offsets
//!
//! Renderers talk to the GPU only through a [`BindingContext`](crate::backend::BindingContext).
//! On entry every attribute advances per vertex; a renderer that changes an
//! attribute's rate restores it before returning.

mod boxes;
mod dots;
mod error;
mod frame;
mod instancing;
mod program;

pub use boxes::InstancedBoxRenderer;
pub use dots::DotRenderer;
pub use error::RenderError;
pub use frame::{FrameRenderer, SurfaceConfig};
pub use instancing::InstanceScope;
pub use program::{AttributeDescriptor, BoundAttribute, ProgramSource, ShaderProgram};
