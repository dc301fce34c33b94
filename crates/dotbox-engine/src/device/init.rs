use wgpu::{CompositeAlphaMode, Limits, PowerPreference, PresentMode};

/// Device and swap-chain settings of one rendering surface.
#[derive(Debug, Clone)]
pub struct GpuInit {
    pub power_preference: PowerPreference,

    /// FIFO is the only mode every platform offers.
    pub present_mode: PresentMode,

    /// Mode tried first when compositing the window. Frames start from a
    /// transparent clear, so an alpha-aware mode keeps the background visible
    /// where nothing was drawn. Falls back to the surface's first mode.
    pub alpha_mode: CompositeAlphaMode,

    /// Base device limits. Both renderers fit the WebGL2 set.
    pub limits: Limits,
}

impl GpuInit {
    /// Limits to request from an adapter reporting `supported`.
    ///
    /// The WebGL2 set caps 2D textures at 2048 pixels, below the width of
    /// common displays, so the surface dimensions follow the adapter.
    pub(crate) fn device_limits(&self, supported: Limits) -> Limits {
        self.limits.clone().using_resolution(supported)
    }
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            power_preference: PowerPreference::HighPerformance,
            present_mode: PresentMode::Fifo,
            alpha_mode: CompositeAlphaMode::PreMultiplied,
            limits: Limits::downlevel_webgl2_defaults(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_dimensions_follow_the_adapter() {
        let init = GpuInit::default();
        let adapter = Limits {
            max_texture_dimension_2d: 16384,
            ..Limits::default()
        };

        let limits = init.device_limits(adapter);
        assert_eq!(limits.max_texture_dimension_2d, 16384);
        assert_eq!(
            limits.max_uniform_buffers_per_shader_stage,
            Limits::downlevel_webgl2_defaults().max_uniform_buffers_per_shader_stage
        );
    }
}
