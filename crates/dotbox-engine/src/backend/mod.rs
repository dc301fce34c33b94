//! GPU binding-state abstraction.
//!
//! Native graphics APIs keep the bound program, attribute bindings, divisors and
//! uniforms as global mutable state. Here that state is an explicit
//! [`BindingContext`] threaded through every renderer call, so each renderer
//! can state what it expects on entry and what it leaves behind.
//!
//! Implementations:
//! - [`WgpuContext`]: wgpu device + window surface (production)
//! - [`RecordingContext`]: headless double recording every command and the
//!   binding state, with fault injection for tests

mod error;
mod recording;
mod reflect;
mod wgpu_context;

pub use error::BackendError;
pub use recording::{AttributeSnapshot, DrawRecord, Fault, RecordedCommand, RecordingContext};
pub use reflect::{StageInterface, UniformMember, VertexInput};
pub use wgpu_context::WgpuContext;

use std::fmt;

use crate::coords::{Color, Viewport};

/// Pipeline stage of a shader source.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Optional backend features the renderers depend on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Capability {
    InstancedDraw,
    VertexArrayObject,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::InstancedDraw => f.write_str("instanced draw"),
            Capability::VertexArrayObject => f.write_str("vertex array objects"),
        }
    }
}

/// Capability report of a backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Capabilities {
    pub instanced_draw: bool,
    pub vertex_array_object: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        instanced_draw: true,
        vertex_array_object: true,
    };

    /// Returns the first required capability that is absent.
    pub fn first_missing(self) -> Option<Capability> {
        if !self.instanced_draw {
            Some(Capability::InstancedDraw)
        } else if !self.vertex_array_object {
            Some(Capability::VertexArrayObject)
        } else {
            None
        }
    }
}

/// Compiled shader stage.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ShaderId(pub(crate) u32);

/// Linked program.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProgramId(pub(crate) u32);

/// GPU buffer slot. Its contents are replaced wholesale by each upload.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BufferId(pub(crate) u32);

/// Vertex attribute slot, shared by all programs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct AttributeLocation(pub u32);

/// Resolved attribute: its slot and the component count the shader declares.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AttributeInfo {
    pub location: AttributeLocation,
    pub components: u8,
}

/// Resolved uniform: a byte range inside a uniform block of the program.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformLocation {
    pub binding: u32,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    F32(f32),
    Vec2([f32; 2]),
    Vec4([f32; 4]),
}

impl UniformValue {
    /// Native-endian bytes as laid out in a uniform block.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::F32(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec2(v) => bytemuck::cast_slice(v).to_vec(),
            UniformValue::Vec4(v) => bytemuck::cast_slice(v).to_vec(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Primitive {
    Points,
    Triangles,
}

/// One draw submission.
///
/// `count` is vertices for array draws and indices for indexed draws.
/// `instances: None` is a plain draw; `Some(n)` is an instanced draw of `n` copies.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DrawCall {
    pub primitive: Primitive,
    pub count: u32,
    pub indexed: bool,
    pub instances: Option<u32>,
}

impl DrawCall {
    pub const fn arrays(primitive: Primitive, count: u32) -> Self {
        Self {
            primitive,
            count,
            indexed: false,
            instances: None,
        }
    }

    pub const fn indexed(primitive: Primitive, count: u32) -> Self {
        Self {
            primitive,
            count,
            indexed: true,
            instances: None,
        }
    }

    pub const fn instanced(self, instances: u32) -> Self {
        Self {
            instances: Some(instances),
            ..self
        }
    }

    /// True when the submission produces no primitives.
    pub fn is_empty(&self) -> bool {
        self.count == 0 || self.instances == Some(0)
    }
}

/// Explicit GPU binding state.
///
/// Every mutating method acts on the state the previous call left behind, the
/// way a native context does. Renderers must leave attribute divisors at 0
/// when they return.
pub trait BindingContext {
    fn capabilities(&self) -> Capabilities;

    /// Size of the backing surface.
    fn surface_size(&self) -> Viewport;

    /// Size the surface is currently displayed at. Differs from
    /// [`surface_size`](Self::surface_size) after the platform resized it.
    fn display_size(&self) -> Viewport;

    fn resize_surface(&mut self, size: Viewport);

    fn set_viewport(&mut self, viewport: Viewport);

    fn clear(&mut self, color: Color) -> Result<(), BackendError>;

    /// Compiles one stage. `Err` carries the backend diagnostic text.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String>;

    fn delete_shader(&mut self, shader: ShaderId);

    /// Links a vertex and a fragment stage. `Err` carries the diagnostic text.
    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId, String>;

    /// Releases a linked program. Unbinds it when it is the bound one.
    fn delete_program(&mut self, program: ProgramId);

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeInfo>;

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    fn create_buffer(&mut self, kind: BufferKind) -> Result<BufferId, BackendError>;

    /// Replaces the buffer's contents.
    fn upload_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), BackendError>;

    fn use_program(&mut self, program: ProgramId);

    /// Points `location` at `buffer`, read as tightly packed `f32` tuples.
    fn bind_attribute(&mut self, location: AttributeLocation, buffer: BufferId, components: u8);

    /// 0 advances the attribute per vertex, N per N instances.
    fn set_divisor(&mut self, location: AttributeLocation, divisor: u32);

    /// Sets a uniform of the bound program.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    fn bind_index_buffer(&mut self, buffer: Option<BufferId>);

    fn draw(&mut self, call: DrawCall) -> Result<(), BackendError>;

    /// Hands the finished frame to the platform swap chain.
    fn present(&mut self) {}

    /// Drops the frame in progress without showing it; the previous image
    /// stays on screen.
    fn discard_frame(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_missing_reports_instancing_before_vao() {
        let none = Capabilities {
            instanced_draw: false,
            vertex_array_object: false,
        };
        assert_eq!(none.first_missing(), Some(Capability::InstancedDraw));

        let no_vao = Capabilities {
            instanced_draw: true,
            vertex_array_object: false,
        };
        assert_eq!(no_vao.first_missing(), Some(Capability::VertexArrayObject));
        assert_eq!(Capabilities::ALL.first_missing(), None);
    }

    #[test]
    fn empty_draw_calls() {
        assert!(DrawCall::arrays(Primitive::Points, 0).is_empty());
        assert!(DrawCall::indexed(Primitive::Triangles, 6).instanced(0).is_empty());
        assert!(!DrawCall::indexed(Primitive::Triangles, 6).instanced(3).is_empty());
    }

    #[test]
    fn uniform_bytes_are_packed_floats() {
        let bytes = UniformValue::Vec2([1.0, 2.0]).to_bytes();
        assert_eq!(bytes.as_slice(), bytemuck::cast_slice::<f32, u8>(&[1.0, 2.0]));
    }
}
