//! Renderer error types.

use thiserror::Error;

use ember_resources::ResourceError;
use ember_rhi::RhiError;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Window or surface setup failed
    #[error("Window error: {0}")]
    Window(String),

    /// More point lights than the global UBO can hold
    #[error("Too many point lights (maximum is {max})")]
    LightOverflow { max: usize },

    #[error("begin_frame called while a frame is already in progress")]
    FrameAlreadyStarted,

    #[error("No frame in progress")]
    FrameNotStarted,
}

impl From<ember_core::Error> for RendererError {
    fn from(e: ember_core::Error) -> Self {
        RendererError::Window(e.to_string())
    }
}

pub type RendererResult<T> = std::result::Result<T, RendererError>;
