//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// Why device bring-up failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceInitErrorKind {
    /// The window surface could not be created.
    NoSurface,
    /// No GPU passed the suitability checks.
    NoSuitableGpu,
    /// A required device feature or extension is not available.
    FeatureMissing,
    /// Graphics or present queue could not be found or retrieved.
    QueueMissing,
    /// The memory allocator could not be created.
    AllocatorFailed,
}

/// Error raised while creating the instance, device, queues or allocator.
#[derive(Error, Debug)]
#[error("Device initialization failed ({kind:?}): {cause}")]
pub struct DeviceInitError {
    pub kind: DeviceInitErrorKind,
    pub cause: String,
}

impl DeviceInitError {
    pub fn new(kind: DeviceInitErrorKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }
}

/// Failure while reflecting a SPIR-V module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShaderReflectError {
    /// The blob is not valid SPIR-V.
    #[error("Failed to parse SPIR-V: {0}")]
    Parse(String),

    /// A reflected type has no Vulkan format or descriptor mapping.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A resource lacks a location, set or binding decoration.
    #[error("Missing decoration: {0}")]
    MissingDecoration(String),
}

/// Failure while building a graphics pipeline.
#[derive(Error, Debug)]
pub enum PipelineBuildError {
    #[error("Pipeline builder is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Failed to create pipeline layout: {0}")]
    LayoutCreation(vk::Result),

    #[error("Failed to create graphics pipeline: {0}")]
    PipelineCreation(vk::Result),
}

/// Image layout transition with no entry in the transition table.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutTransitionError {
    #[error("Unsupported layout transition {old:?} -> {new:?}")]
    Unsupported {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },
}

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The allocator mutex was poisoned by a panic on another thread
    #[error("Allocator lock poisoned")]
    AllocatorPoisoned,

    #[error(transparent)]
    DeviceInit(#[from] DeviceInitError),

    #[error(transparent)]
    ShaderReflect(#[from] ShaderReflectError),

    #[error(transparent)]
    PipelineBuild(#[from] PipelineBuildError),

    #[error(transparent)]
    LayoutTransition(#[from] LayoutTransitionError),

    /// Shader file or module error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid argument or handle
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Resource creation error, carrying the object name
    #[error("Failed to create {0}")]
    ResourceCreation(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_init_error_reports_kind_and_cause() {
        let err = DeviceInitError::new(DeviceInitErrorKind::QueueMissing, "no present family");
        let text = err.to_string();
        assert!(text.contains("QueueMissing"));
        assert!(text.contains("no present family"));

        let rhi: RhiError = err.into();
        assert!(matches!(
            rhi,
            RhiError::DeviceInit(DeviceInitError {
                kind: DeviceInitErrorKind::QueueMissing,
                ..
            })
        ));
    }

    #[test]
    fn layout_error_names_both_layouts() {
        let err = LayoutTransitionError::Unsupported {
            old: vk::ImageLayout::GENERAL,
            new: vk::ImageLayout::PREINITIALIZED,
        };
        let text = err.to_string();
        assert!(text.contains("GENERAL"));
        assert!(text.contains("PREINITIALIZED"));
    }
}
