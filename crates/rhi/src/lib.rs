//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Safe wrappers over `ash` for everything the renderer touches:
//! - Instance, physical device selection and logical device with allocator
//! - Swapchain, sync primitives and command recording
//! - Buffers, images, samplers, textures and the layout transition table
//! - SPIR-V reflection, the descriptor set layout cache and the pipeline builder
//! - Debug labels and object names

mod error;

pub mod buffer;
pub mod command;
pub mod debug;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod layout_cache;
pub mod physical_device;
pub mod pipeline;
pub mod reflect;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{
    DeviceInitError, DeviceInitErrorKind, LayoutTransitionError, PipelineBuildError, RhiError,
    RhiResult, ShaderReflectError,
};

pub use ash::vk;
