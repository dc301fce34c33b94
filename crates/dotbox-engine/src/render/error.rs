use thiserror::Error;

use crate::backend::{BackendError, Capability, ShaderStage};

/// Errors surfaced by the rendering core.
///
/// Construction-time variants are fatal: no partially built renderer is ever
/// returned. `ResourceExhausted`, `FrameSkipped` and `Backend` are per-frame
/// and leave the renderer usable for the next frame.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Graphics context acquisition failed.
    #[error("failed to initialize graphics context: {0}")]
    Init(String),

    #[error("{stage} shader failed to compile:\n{log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("program failed to link:\n{log}")]
    ShaderLink { log: String },

    /// A declared attribute or uniform is absent from, or disagrees with, the
    /// compiled program.
    #[error("program configuration error: {0}")]
    Configuration(String),

    #[error("graphics backend lacks required capability: {0}")]
    UnsupportedBackend(Capability),

    #[error("GPU resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("{renderer} renderer failed to initialize")]
    RendererInit {
        renderer: &'static str,
        #[source]
        source: Box<RenderError>,
    },

    /// The surface could not be acquired; this frame is dropped.
    #[error("frame skipped: {0}")]
    FrameSkipped(String),

    /// A draw-time binding failure reported by the backend.
    #[error(transparent)]
    Backend(BackendError),
}

impl RenderError {
    pub(crate) fn renderer_init(renderer: &'static str, source: RenderError) -> Self {
        RenderError::RendererInit {
            renderer,
            source: Box::new(source),
        }
    }

    /// True for per-frame failures after which rendering may continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RenderError::ResourceExhausted(_)
                | RenderError::FrameSkipped(_)
                | RenderError::Backend(_)
        )
    }
}

/// Element count of one draw, refusing counts the backend cannot address.
pub(crate) fn draw_count(len: usize, what: &str) -> Result<u32, RenderError> {
    u32::try_from(len)
        .map_err(|_| RenderError::ResourceExhausted(format!("{len} {what} exceed a single draw")))
}

impl From<BackendError> for RenderError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::OutOfMemory(msg) => RenderError::ResourceExhausted(msg),
            BackendError::SurfaceUnavailable(msg) => RenderError::FrameSkipped(msg),
            other => RenderError::Backend(other),
        }
    }
}
