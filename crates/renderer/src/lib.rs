//! Frame orchestration for the Vulkan renderer.
//!
//! This crate turns a scene [`Registry`](renderer_scene::Registry) into
//! presented frames:
//! - Device context, depth buffer and frame scheduling
//! - Shadow maps for every light
//! - The pass graph: Shadow, Main, Grid and UI
//! - The per-entity descriptor set cache

pub mod context;
pub mod depth_buffer;
pub mod descriptor_cache;
pub mod error;
pub mod frame_manager;
pub mod graph;
pub mod passes;
pub mod renderer;
pub mod shadow;
pub mod ubo;
pub mod uniforms;

pub use context::DeviceContext;
pub use depth_buffer::{DEPTH_FORMAT, DepthBuffer};
pub use descriptor_cache::{DescriptorLru, RetiredSets, entity_descriptor_key};
pub use error::{RenderError, RenderResult};
pub use frame_manager::{FrameScheduler, FrameSlots};
pub use graph::{FrameContext, FrameStats, RenderGraph, RenderPass};
pub use passes::{NoUi, UiRenderer};
pub use renderer::{FrameOutcome, Renderer};
pub use shadow::{LightId, LightKind, LightSource, ShadowSettings, ShadowSystem};

/// Default number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
