//! WGSL reflection via naga.
//!
//! Compiling a stage parses and validates it, then extracts the parts of its
//! interface the binding layer needs: vertex inputs, user-defined outputs and
//! uniform block members. Linking checks two stage interfaces against each
//! other and merges their uniforms into one program table.

use naga::valid::{Capabilities, ValidationFlags, Validator};

use super::ShaderStage;

/// A user-defined stage input (`@location(n)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInput {
    pub name: String,
    pub location: u32,
    pub components: u8,
}

/// A member of a `var<uniform>` struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformMember {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub offset: u32,
    pub size: u32,
    /// Byte size of the enclosing block.
    pub block_size: u32,
}

/// Reflected interface of one compiled stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInterface {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub inputs: Vec<VertexInput>,
    pub outputs: Vec<u32>,
    pub uniforms: Vec<UniformMember>,
}

/// Merged interface of a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProgramInterface {
    pub attributes: Vec<VertexInput>,
    pub uniforms: Vec<UniformMember>,
}

impl ProgramInterface {
    pub fn attribute(&self, name: &str) -> Option<&VertexInput> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformMember> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    /// Distinct uniform blocks as `(binding, size)`, ordered by binding.
    pub fn blocks(&self) -> Vec<(u32, u32)> {
        let mut blocks: Vec<(u32, u32)> = Vec::new();
        for u in &self.uniforms {
            if !blocks.iter().any(|(b, _)| *b == u.binding) {
                blocks.push((u.binding, u.block_size));
            }
        }
        blocks.sort_unstable();
        blocks
    }
}

/// Parses, validates and reflects one WGSL stage.
///
/// The source must declare exactly one entry point for `stage`. `Err` carries
/// naga's rendered diagnostic.
pub(crate) fn reflect_stage(stage: ShaderStage, source: &str) -> Result<StageInterface, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let wanted = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };

    let mut entry_points = module.entry_points.iter().filter(|ep| ep.stage == wanted);
    let entry = entry_points
        .next()
        .ok_or_else(|| format!("no {stage} entry point"))?;
    if entry_points.next().is_some() {
        return Err(format!("more than one {stage} entry point"));
    }

    let mut inputs = Vec::new();
    for arg in &entry.function.arguments {
        match &arg.binding {
            Some(naga::Binding::Location { location, .. }) => {
                let name = arg.name.clone().unwrap_or_default();
                inputs.push(located(&module, name, *location, arg.ty)?);
            }
            Some(naga::Binding::BuiltIn(_)) => {}
            None => {
                if let naga::TypeInner::Struct { members, .. } = &module.types[arg.ty].inner {
                    for m in members {
                        if let Some(naga::Binding::Location { location, .. }) = &m.binding {
                            let name = m.name.clone().unwrap_or_default();
                            inputs.push(located(&module, name, *location, m.ty)?);
                        }
                    }
                }
            }
        }
    }
    inputs.sort_by_key(|i| i.location);

    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        match &result.binding {
            Some(naga::Binding::Location { location, .. }) => outputs.push(*location),
            Some(naga::Binding::BuiltIn(_)) => {}
            None => {
                if let naga::TypeInner::Struct { members, .. } = &module.types[result.ty].inner {
                    outputs.extend(members.iter().filter_map(|m| match &m.binding {
                        Some(naga::Binding::Location { location, .. }) => Some(*location),
                        _ => None,
                    }));
                }
            }
        }
    }
    outputs.sort_unstable();

    let mut uniforms = Vec::new();
    for (_, var) in module.global_variables.iter() {
        if var.space != naga::AddressSpace::Uniform {
            continue;
        }
        let Some(binding) = &var.binding else { continue };
        let naga::TypeInner::Struct { members, span } = &module.types[var.ty].inner else {
            return Err(format!(
                "uniform `{}` must be a struct",
                var.name.as_deref().unwrap_or("?")
            ));
        };
        for m in members {
            uniforms.push(UniformMember {
                name: m.name.clone().unwrap_or_default(),
                group: binding.group,
                binding: binding.binding,
                offset: m.offset,
                size: module.types[m.ty].inner.size(module.to_ctx()),
                block_size: *span,
            });
        }
    }

    Ok(StageInterface {
        stage,
        entry_point: entry.name.clone(),
        inputs,
        outputs,
        uniforms,
    })
}

fn located(
    module: &naga::Module,
    name: String,
    location: u32,
    ty: naga::Handle<naga::Type>,
) -> Result<VertexInput, String> {
    let components = match &module.types[ty].inner {
        naga::TypeInner::Scalar(_) => 1,
        naga::TypeInner::Vector { size, .. } => match size {
            naga::VectorSize::Bi => 2,
            naga::VectorSize::Tri => 3,
            naga::VectorSize::Quad => 4,
        },
        _ => return Err(format!("input `{name}` must be a scalar or vector")),
    };
    Ok(VertexInput {
        name,
        location,
        components,
    })
}

/// Checks a vertex/fragment pair and merges their uniform tables.
///
/// Rules:
/// - every fragment input location is written by the vertex stage
/// - uniform blocks live in bind group 0
/// - a member declared by both stages has the same binding, offset and size
pub(crate) fn link(
    vertex: &StageInterface,
    fragment: &StageInterface,
) -> Result<ProgramInterface, String> {
    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err("expected a vertex stage followed by a fragment stage".to_string());
    }

    for input in &fragment.inputs {
        if !vertex.outputs.contains(&input.location) {
            return Err(format!(
                "fragment input `{}` at location {} is not written by the vertex stage",
                input.name, input.location
            ));
        }
    }

    let mut uniforms: Vec<UniformMember> = Vec::new();
    for u in vertex.uniforms.iter().chain(&fragment.uniforms) {
        if u.group != 0 {
            return Err(format!(
                "uniform `{}` is in bind group {}; only group 0 is supported",
                u.name, u.group
            ));
        }
        match uniforms.iter().find(|seen| seen.name == u.name) {
            Some(seen) if seen == u => {}
            Some(_) => {
                return Err(format!("uniform `{}` has different layouts per stage", u.name));
            }
            None => uniforms.push(u.clone()),
        }
    }

    Ok(ProgramInterface {
        attributes: vertex.inputs.clone(),
        uniforms,
    })
}
