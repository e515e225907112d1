//! Error types for the renderer crate.

use renderer_resources::ResourceError;
use renderer_rhi::{LayoutTransitionError, RhiError};
use thiserror::Error;

/// Error type for frame recording and renderer setup.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Core(#[from] renderer_core::Error),

    /// An image was asked to move between layouts the table does not cover.
    #[error(transparent)]
    Transition(#[from] LayoutTransitionError),

    /// A pass lookup by name missed.
    #[error("Render pass '{0}' not found")]
    PassNotFound(String),

    /// Rejected shadow map resolution.
    #[error("Invalid shadow map resolution {width}x{height}")]
    InvalidShadowResolution { width: u32, height: u32 },

    #[error("Internal renderer error: {0}")]
    Internal(String),
}

pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use ash::vk;

    use super::*;

    #[test]
    fn test_transition_error_is_transparent() {
        let err: RenderError = LayoutTransitionError::Unsupported {
            old: vk::ImageLayout::GENERAL,
            new: vk::ImageLayout::PRESENT_SRC_KHR,
        }
        .into();
        assert!(matches!(err, RenderError::Transition(_)));
        assert!(err.to_string().contains("Unsupported layout transition"));
    }

    #[test]
    fn test_pass_not_found_names_pass() {
        let err = RenderError::PassNotFound("Bloom".to_string());
        assert_eq!(err.to_string(), "Render pass 'Bloom' not found");
    }
}
