//! Ordered render passes.
//!
//! Passes are added once at startup and executed in insertion order every
//! frame. The graph opens a debug label around each pass and, when the pass
//! describes its attachments through [`RenderPass::rendering`], wraps its
//! `execute` in a dynamic rendering scope. Passes that record their own
//! scopes (the shadow pass renders one per light) return `None`.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use renderer_rhi::command::CommandBuffer;
use renderer_rhi::debug::DebugUtils;
use renderer_rhi::device::Device;
use renderer_rhi::rendering::RenderingConfig;
use renderer_rhi::shader::ShaderManager;
use renderer_resources::{MaterialManager, MeshManager};
use renderer_scene::{Camera, Registry};

use crate::error::{RenderError, RenderResult};
use crate::shadow::{LightId, LightSource, ShadowSystem};
use crate::uniforms::FrameUniforms;

/// What a pass needs to build its pipelines.
pub struct PassSetup<'a> {
    pub device: &'a Arc<Device>,
    pub shaders: &'a mut ShaderManager,
    pub debug_utils: &'a DebugUtils,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub frames_in_flight: usize,
}

/// Attachments of the current frame.
#[derive(Clone, Copy, Debug)]
pub struct RenderTarget {
    pub color_view: vk::ImageView,
    pub depth_view: vk::ImageView,
    pub extent: vk::Extent2D,
}

/// Counters gathered while recording one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Indexed draws recorded by the main pass.
    pub draw_calls: u32,
    pub shadow_draw_calls: u32,
    /// Drawables skipped because their mesh is not loaded.
    pub skipped_draws: u32,
    pub descriptor_hits: u32,
    pub descriptor_misses: u32,
    pub failed_passes: u32,
}

/// Scene and resources a frame is recorded from.
pub struct FrameContext<'a> {
    pub registry: &'a Registry,
    pub camera: &'a Camera,
    /// Every light, primary light first.
    pub lights: &'a [(LightId, LightSource)],
    pub meshes: &'a MeshManager,
    pub materials: &'a mut MaterialManager,
    pub shadows: &'a mut ShadowSystem,
    pub uniforms: &'a mut FrameUniforms,
    pub debug_utils: &'a DebugUtils,
    pub frame_index: usize,
    pub extent: vk::Extent2D,
    /// Set by the shadow pass when the sampled shadow map changed; the main
    /// pass drops every cached descriptor set in response.
    pub descriptors_invalidated: bool,
    pub stats: FrameStats,
}

pub trait RenderPass {
    fn name(&self) -> &'static str;

    /// Builds pipelines. Called once before the first frame.
    fn setup(&mut self, setup: &mut PassSetup<'_>) -> RenderResult<()>;

    /// Attachments the graph begins rendering with, or `None` when the pass
    /// manages its own rendering scopes.
    fn rendering(&self, target: &RenderTarget) -> Option<RenderingConfig>;

    fn execute(&mut self, cmd: &CommandBuffer, ctx: &mut FrameContext<'_>) -> RenderResult<()>;

    fn on_swapchain_recreated(&mut self, _extent: vk::Extent2D) {}

    fn debug_color(&self) -> [f32; 4] {
        [1.0, 1.0, 1.0, 1.0]
    }

    fn as_any(&self) -> &dyn std::any::Any;

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

#[derive(Default)]
pub struct RenderGraph {
    passes: Vec<Box<dyn RenderPass>>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass(&mut self, pass: Box<dyn RenderPass>) {
        debug!("Added render pass '{}'", pass.name());
        self.passes.push(pass);
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Looks up a pass by name.
    pub fn pass(&self, name: &str) -> RenderResult<&dyn RenderPass> {
        match self.passes.iter().find(|pass| pass.name() == name) {
            Some(pass) => Ok(pass.as_ref()),
            None => {
                error!("Render pass '{}' not found", name);
                Err(RenderError::PassNotFound(name.to_string()))
            }
        }
    }

    /// Typed lookup by name.
    pub fn pass_mut<T: RenderPass + 'static>(&mut self, name: &str) -> RenderResult<&mut T> {
        let Some(pass) = self.passes.iter_mut().find(|pass| pass.name() == name) else {
            error!("Render pass '{}' not found", name);
            return Err(RenderError::PassNotFound(name.to_string()));
        };
        pass.as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| RenderError::PassNotFound(name.to_string()))
    }

    pub fn setup(&mut self, setup: &mut PassSetup<'_>) -> RenderResult<()> {
        for pass in &mut self.passes {
            pass.setup(setup)?;
            info!("Render pass '{}' ready", pass.name());
        }
        Ok(())
    }

    /// Records every pass in order. A failing pass is logged and counted;
    /// the remaining passes still record so the frame can be submitted.
    pub fn execute(
        &mut self,
        cmd: &CommandBuffer,
        target: &RenderTarget,
        ctx: &mut FrameContext<'_>,
    ) {
        for pass in &mut self.passes {
            ctx.debug_utils
                .begin_label(cmd.handle(), pass.name(), pass.debug_color());

            let bundle = pass.rendering(target).map(|config| config.build());
            if let Some(bundle) = &bundle {
                cmd.begin_rendering(&bundle.info());
            }
            let result = pass.execute(cmd, ctx);
            if bundle.is_some() {
                cmd.end_rendering();
            }

            ctx.debug_utils.end_label(cmd.handle());

            if let Err(e) = result {
                error!("Render pass '{}' failed: {}", pass.name(), e);
                ctx.stats.failed_passes += 1;
            }
        }
    }

    pub fn on_swapchain_recreated(&mut self, extent: vk::Extent2D) {
        for pass in &mut self.passes {
            pass.on_swapchain_recreated(extent);
        }
    }
}
