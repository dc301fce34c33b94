use crate::backend::{
    AttributeLocation, BindingContext, ProgramId, ShaderStage, UniformLocation,
};

use super::RenderError;

/// A vertex attribute a renderer feeds to its program.
///
/// `divisor` is the rate the attribute advances at during the renderer's
/// draws: 0 per vertex, N once per N instances.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AttributeDescriptor {
    pub name: &'static str,
    pub components: u8,
    pub divisor: u32,
}

impl AttributeDescriptor {
    pub const fn per_vertex(name: &'static str, components: u8) -> Self {
        Self {
            name,
            components,
            divisor: 0,
        }
    }

    pub const fn per_instance(name: &'static str, components: u8) -> Self {
        Self {
            name,
            components,
            divisor: 1,
        }
    }
}

/// Vertex + fragment source pair.
#[derive(Debug, Copy, Clone)]
pub struct ProgramSource {
    pub vertex: &'static str,
    pub fragment: &'static str,
}

/// A descriptor with the location it resolved to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BoundAttribute {
    pub descriptor: AttributeDescriptor,
    pub location: AttributeLocation,
}

/// Linked program and its location table.
///
/// Every attribute and uniform the owner declares is resolved once in
/// [`compile`](Self::compile) and served from the cache afterwards.
#[derive(Debug)]
pub struct ShaderProgram {
    label: &'static str,
    id: ProgramId,
    attributes: Vec<BoundAttribute>,
    uniforms: Vec<(&'static str, UniformLocation)>,
}

impl ShaderProgram {
    /// Compiles both stages, links them and resolves the declared names.
    ///
    /// Fails with `ShaderCompile`, `ShaderLink` or `Configuration`. Stage
    /// objects are released on every path, and a program whose names do not
    /// resolve is deleted before the error is returned.
    pub fn compile<C: BindingContext + ?Sized>(
        ctx: &mut C,
        label: &'static str,
        source: ProgramSource,
        attributes: &[AttributeDescriptor],
        uniforms: &[&'static str],
    ) -> Result<Self, RenderError> {
        let vertex = ctx
            .compile_shader(ShaderStage::Vertex, source.vertex)
            .map_err(|log| RenderError::ShaderCompile {
                stage: ShaderStage::Vertex,
                log,
            })?;

        let fragment = match ctx.compile_shader(ShaderStage::Fragment, source.fragment) {
            Ok(fragment) => fragment,
            Err(log) => {
                ctx.delete_shader(vertex);
                return Err(RenderError::ShaderCompile {
                    stage: ShaderStage::Fragment,
                    log,
                });
            }
        };

        let linked = ctx.link_program(vertex, fragment);
        ctx.delete_shader(vertex);
        ctx.delete_shader(fragment);
        let id = linked.map_err(|log| RenderError::ShaderLink { log })?;

        let (attributes, uniforms) = match resolve(&*ctx, id, label, attributes, uniforms) {
            Ok(resolved) => resolved,
            Err(err) => {
                ctx.delete_program(id);
                return Err(err);
            }
        };

        log::debug!(
            "{label}: program {} linked ({} attributes, {} uniforms)",
            id.0,
            attributes.len(),
            uniforms.len()
        );

        Ok(Self {
            label,
            id,
            attributes,
            uniforms,
        })
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn attributes(&self) -> &[BoundAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<AttributeLocation> {
        self.attributes
            .iter()
            .find(|a| a.descriptor.name == name)
            .map(|a| a.location)
    }

    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, loc)| *loc)
    }

    /// Cached attribute location, as an error for names that were not declared.
    pub(crate) fn require_attribute(&self, name: &str) -> Result<AttributeLocation, RenderError> {
        self.attribute(name).ok_or_else(|| {
            let msg = format!("{}: attribute `{name}` was not declared", self.label);
            RenderError::Configuration(msg)
        })
    }

    /// Cached uniform location, as an error for names that were not declared.
    pub(crate) fn require_uniform(&self, name: &str) -> Result<UniformLocation, RenderError> {
        self.uniform(name).ok_or_else(|| {
            RenderError::Configuration(format!("{}: uniform `{name}` was not declared", self.label))
        })
    }
}

type Resolved = (Vec<BoundAttribute>, Vec<(&'static str, UniformLocation)>);

fn resolve<C: BindingContext + ?Sized>(
    ctx: &C,
    id: ProgramId,
    label: &str,
    attributes: &[AttributeDescriptor],
    uniforms: &[&'static str],
) -> Result<Resolved, RenderError> {
    let attributes = attributes
        .iter()
        .map(|d| {
            let info = ctx.attribute_location(id, d.name).ok_or_else(|| {
                RenderError::Configuration(format!(
                    "{label}: vertex stage declares no attribute `{}`",
                    d.name
                ))
            })?;
            if info.components != d.components {
                return Err(RenderError::Configuration(format!(
                    "{label}: attribute `{}` has {} components in the shader, {} declared",
                    d.name, info.components, d.components
                )));
            }
            Ok(BoundAttribute {
                descriptor: *d,
                location: info.location,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let uniforms = uniforms
        .iter()
        .map(|name| {
            ctx.uniform_location(id, name)
                .map(|loc| (*name, loc))
                .ok_or_else(|| {
                    RenderError::Configuration(format!("{label}: program has no uniform `{name}`"))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((attributes, uniforms))
}
