//! Pipeline variants.
//!
//! A GL program has mutable vertex-fetch state (buffer bindings, component
//! counts, divisors); a wgpu pipeline bakes it in. Each distinct fetch
//! configuration seen at draw time gets its own pipeline, cached by
//! [`PipelineKey`]. A stale divisor therefore selects the wrong variant, the
//! same way it corrupts fetch on a native driver.

use crate::backend::{Primitive, ProgramId};

use super::LinkedProgram;

/// Vertex fetch configuration of one attribute slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(super) struct VertexSlot {
    pub location: u32,
    pub components: u8,
    pub per_instance: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub(super) struct PipelineKey {
    pub program: ProgramId,
    pub primitive: Primitive,
    pub slots: Vec<VertexSlot>,
}

fn float_format(components: u8) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

/// One vertex buffer per slot, tightly packed `f32` tuples.
pub(super) fn build(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    program: &LinkedProgram,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    let attributes: Vec<[wgpu::VertexAttribute; 1]> = key
        .slots
        .iter()
        .map(|s| {
            [wgpu::VertexAttribute {
                format: float_format(s.components),
                offset: 0,
                shader_location: s.location,
            }]
        })
        .collect();

    let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
        .slots
        .iter()
        .zip(&attributes)
        .map(|(s, attrs)| wgpu::VertexBufferLayout {
            array_stride: (s.components.max(1) as usize * std::mem::size_of::<f32>()) as u64,
            step_mode: if s.per_instance {
                wgpu::VertexStepMode::Instance
            } else {
                wgpu::VertexStepMode::Vertex
            },
            attributes: attrs,
        })
        .collect();

    log::debug!(
        "building pipeline for program {} ({:?}, {} slots)",
        key.program.0,
        key.primitive,
        key.slots.len()
    );

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&program.label),
        layout: Some(&program.layout),

        vertex: wgpu::VertexState {
            module: &program.vertex,
            entry_point: Some(&program.vertex_entry),
            compilation_options: Default::default(),
            buffers: &buffers,
        },

        fragment: Some(wgpu::FragmentState {
            module: &program.fragment,
            entry_point: Some(&program.fragment_entry),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),

        // Points are expanded to sprite quads, so every variant draws triangles.
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },

        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_counts_map_to_float_formats() {
        assert_eq!(float_format(1), wgpu::VertexFormat::Float32);
        assert_eq!(float_format(2), wgpu::VertexFormat::Float32x2);
        assert_eq!(float_format(3), wgpu::VertexFormat::Float32x3);
        assert_eq!(float_format(4), wgpu::VertexFormat::Float32x4);
    }

    #[test]
    fn divisor_changes_select_distinct_variants() {
        let slot = VertexSlot { location: 2, components: 2, per_instance: true };
        let a = PipelineKey {
            program: ProgramId(0),
            primitive: Primitive::Triangles,
            slots: vec![slot],
        };
        let b = PipelineKey {
            slots: vec![VertexSlot { per_instance: false, ..slot }],
            ..a.clone()
        };
        assert_ne!(a, b);
    }
}
