use thiserror::Error;

/// Failure reported by a [`BindingContext`](super::BindingContext) call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Buffer allocation or upload did not fit in device memory or limits.
    #[error("out of GPU memory: {0}")]
    OutOfMemory(String),

    /// A handle that this context never issued, or already released.
    #[error("invalid {0} handle")]
    InvalidHandle(&'static str),

    /// The call requires state that is not bound.
    #[error("invalid binding state: {0}")]
    InvalidState(String),

    /// No surface texture could be acquired for this frame.
    #[error("surface unavailable: {0}")]
    SurfaceUnavailable(String),
}
