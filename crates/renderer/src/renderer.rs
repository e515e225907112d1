//! The renderer façade.
//!
//! [`Renderer`] owns the device context, the swapchain with its depth
//! buffer, the resource managers, the shadow system, the frame scheduler
//! and the pass graph (Shadow → Main → Grid → UI). The application owns the
//! [`Registry`] and hands it to [`Renderer::render`] once per frame.
//!
//! # Teardown
//!
//! `Drop` waits for the device to go idle, then fields drop in declaration
//! order: passes and per-frame uniforms first, the device context last.

use std::time::Duration;

use ash::vk;
use tracing::{debug, info, warn};

use renderer_core::{EngineConfig, ResourcePaths};
use renderer_platform::Window;
use renderer_resources::{MaterialManager, MeshManager};
use renderer_rhi::debug::colors;
use renderer_rhi::image::record_transition;
use renderer_rhi::shader::ShaderManager;
use renderer_rhi::swapchain::Swapchain;
use renderer_scene::Registry;

use crate::context::DeviceContext;
use crate::depth_buffer::{DEPTH_FORMAT, DepthBuffer};
use crate::error::{RenderError, RenderResult};
use crate::frame_manager::FrameScheduler;
use crate::graph::{FrameContext, FrameStats, PassSetup, RenderGraph, RenderTarget};
use crate::passes::{GRID_PASS, GridPass, MAIN_PASS, MainPass, ShadowPass, UiPass, UiRenderer};
use crate::shadow::{MAX_DEPTH, ShadowSettings, ShadowSystem, scene_lights};
use crate::ubo::CameraUbo;
use crate::uniforms::FrameUniforms;

/// How long [`Renderer::render`] sleeps while the window is suspended.
const SUSPENDED_SLEEP: Duration = Duration::from_millis(100);

/// Result of one [`Renderer::render`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A command buffer was submitted and presented.
    Rendered,
    /// Nothing was submitted: the window is suspended, the swapchain was
    /// out of date or the scene has no camera.
    Skipped,
}

pub struct Renderer {
    graph: RenderGraph,
    uniforms: FrameUniforms,
    scheduler: FrameScheduler,
    shadows: ShadowSystem,
    materials: MaterialManager,
    meshes: MeshManager,
    shaders: ShaderManager,
    depth: DepthBuffer,
    swapchain: Swapchain,
    context: DeviceContext,

    extent: vk::Extent2D,
    resize_requested: bool,
    warned_no_camera: bool,
    last_stats: FrameStats,
}

impl Renderer {
    /// Brings up the device and every subsystem, then builds the pass
    /// pipelines.
    ///
    /// # Errors
    ///
    /// Device selection failures, missing shaders and pipeline creation
    /// errors are fatal and returned as is.
    pub fn new(
        window: &Window,
        config: &EngineConfig,
        paths: ResourcePaths,
        ui: Box<dyn UiRenderer>,
    ) -> RenderResult<Self> {
        let context = DeviceContext::new(window, config)?;
        let device = context.device().clone();
        let frames_in_flight = config.max_frames_in_flight.max(1);

        let swapchain = Swapchain::new(
            context.instance(),
            device.clone(),
            context.debug_utils(),
            context.surface().handle(),
            config.present_mode,
            window.width(),
            window.height(),
        )?;
        let extent = swapchain.extent();
        let depth = DepthBuffer::new(device.clone(), extent)?;

        let mut shaders = ShaderManager::new(device.clone(), paths.clone());
        let meshes = MeshManager::new(device.clone(), paths.clone());
        let materials = MaterialManager::new(
            device.clone(),
            context.command_pool().clone(),
            context.debug_utils().clone(),
            paths,
        )?;
        let shadows = ShadowSystem::new(
            device.clone(),
            context.command_pool().clone(),
            context.debug_utils().clone(),
            ShadowSettings::from_config(config),
        );
        let scheduler = FrameScheduler::new(
            device.clone(),
            context.command_pool().clone(),
            frames_in_flight,
            swapchain.image_count(),
        )?;
        let uniforms = FrameUniforms::new(device.clone(), frames_in_flight)?;

        let mut graph = RenderGraph::new();
        graph.add_pass(Box::new(ShadowPass::new()));
        graph.add_pass(Box::new(MainPass::new()));
        graph.add_pass(Box::new(GridPass::new()));
        graph.add_pass(Box::new(UiPass::new(ui)));
        graph.setup(&mut PassSetup {
            device: &device,
            shaders: &mut shaders,
            debug_utils: context.debug_utils(),
            color_format: swapchain.format(),
            depth_format: DEPTH_FORMAT,
            frames_in_flight,
        })?;

        info!(
            "Renderer ready: {}x{}, passes {:?}",
            extent.width,
            extent.height,
            graph.pass_names()
        );

        Ok(Self {
            graph,
            uniforms,
            scheduler,
            shadows,
            materials,
            meshes,
            shaders,
            depth,
            swapchain,
            context,
            extent,
            resize_requested: false,
            warned_no_camera: false,
            last_stats: FrameStats::default(),
        })
    }

    /// Records, submits and presents one frame of `registry`.
    ///
    /// While `suspended` (minimised or occluded) the call sleeps briefly and
    /// returns [`FrameOutcome::Skipped`]. A swapchain that went out of date
    /// during acquire is rebuilt and the frame skipped; one reported during
    /// present is rebuilt after the frame.
    pub fn render(&mut self, registry: &Registry, suspended: bool) -> RenderResult<FrameOutcome> {
        if suspended || self.extent.width == 0 || self.extent.height == 0 {
            std::thread::sleep(SUSPENDED_SLEEP);
            return Ok(FrameOutcome::Skipped);
        }

        if self.resize_requested {
            self.recreate_swapchain()?;
            return Ok(FrameOutcome::Skipped);
        }

        let Some((_, camera)) = registry.camera() else {
            if !self.warned_no_camera {
                warn!("Scene has no camera, skipping frames");
                self.warned_no_camera = true;
            }
            return Ok(FrameOutcome::Skipped);
        };
        self.warned_no_camera = false;

        let Some(frame) = self.scheduler.begin_frame(&self.swapchain)? else {
            self.recreate_swapchain()?;
            return Ok(FrameOutcome::Skipped);
        };

        self.uniforms
            .write_camera(frame.frame_index, &CameraUbo::from_camera(camera))?;

        let image_index = frame.image_index as usize;
        let (color_image, color_view) = self
            .swapchain
            .image(image_index)
            .zip(self.swapchain.image_view(image_index))
            .ok_or_else(|| {
                RenderError::Internal(format!("swapchain image {} out of range", image_index))
            })?;
        let extent = self.swapchain.extent();

        let cmd = self.scheduler.begin_recording(&frame)?;
        let debug_utils = self.context.debug_utils();
        debug_utils.begin_label(cmd.handle(), "Frame", colors::FRAME);

        record_transition(
            &cmd,
            color_image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )?;
        self.depth.begin_frame(&cmd)?;

        let lights = scene_lights(registry);
        let target = RenderTarget {
            color_view,
            depth_view: self.depth.view(),
            extent,
        };
        let mut ctx = FrameContext {
            registry,
            camera,
            lights: &lights,
            meshes: &self.meshes,
            materials: &mut self.materials,
            shadows: &mut self.shadows,
            uniforms: &mut self.uniforms,
            debug_utils,
            frame_index: frame.frame_index,
            extent,
            descriptors_invalidated: false,
            stats: FrameStats::default(),
        };
        self.graph.execute(&cmd, &target, &mut ctx);
        self.last_stats = ctx.stats;

        record_transition(
            &cmd,
            color_image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )?;
        debug_utils.end_label(cmd.handle());
        cmd.end()?;

        let needs_recreate = self
            .scheduler
            .submit_and_present(&self.swapchain, &frame, &cmd)?;
        if needs_recreate || self.resize_requested {
            self.recreate_swapchain()?;
        }
        Ok(FrameOutcome::Rendered)
    }

    /// Records a new framebuffer size. The swapchain is rebuilt at the start
    /// of the next frame; a zero size pauses rendering until it grows again.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        debug!("Resize requested: {}x{}", width, height);
        self.extent = vk::Extent2D { width, height };
        self.resize_requested = true;
    }

    fn recreate_swapchain(&mut self) -> RenderResult<()> {
        if self.extent.width == 0 || self.extent.height == 0 {
            return Ok(());
        }
        self.swapchain.recreate(
            self.context.debug_utils(),
            self.extent.width,
            self.extent.height,
        )?;
        let extent = self.swapchain.extent();
        self.depth.resize(extent)?;
        self.scheduler
            .on_swapchain_recreated(self.swapchain.image_count())?;
        self.graph.on_swapchain_recreated(extent);
        self.resize_requested = false;
        Ok(())
    }

    /// Changes the shadow map size of every light. See
    /// [`ShadowSystem::set_shadow_map_resolution`].
    pub fn set_shadow_map_resolution(
        &mut self,
        width: u32,
        height: u32,
        immediate: bool,
    ) -> RenderResult<()> {
        self.shadows
            .set_shadow_map_resolution(width, height, immediate)?;
        if immediate {
            // Maps were rebuilt with the device idle; drop every set that
            // sampled the old ones.
            self.materials.invalidate_descriptor_sets();
            self.graph
                .pass_mut::<MainPass>(MAIN_PASS)?
                .request_descriptor_invalidate();
        }
        Ok(())
    }

    pub fn set_shadow_near(&mut self, near: f32) {
        self.shadows.set_shadow_near(near);
    }

    pub fn set_shadow_far(&mut self, far: f32) {
        self.shadows.set_shadow_far(far);
    }

    pub fn set_directional_light_distance(&mut self, distance: f32) {
        self.shadows.set_directional_light_distance(distance);
    }

    /// Depth stored at texel `(x, y)` of the primary light's shadow map, or
    /// [`MAX_DEPTH`] when the scene has no light.
    pub fn shadow_map_pixel_value(&self, registry: &Registry, x: i32, y: i32) -> RenderResult<f32> {
        let lights = scene_lights(registry);
        match lights.first() {
            Some((id, _)) => self.shadows.get_shadow_map_pixel_value(*id, x, y),
            None => Ok(MAX_DEPTH),
        }
    }

    /// Releases materials and textures nothing references anymore.
    pub fn cleanup_unused_materials(&mut self) -> RenderResult<usize> {
        self.scheduler.wait_all()?;
        Ok(self.materials.cleanup_unused_materials())
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) -> RenderResult<()> {
        self.graph
            .pass_mut::<MainPass>(MAIN_PASS)?
            .set_clear_color(color);
        Ok(())
    }

    pub fn set_grid_enabled(&mut self, enabled: bool) -> RenderResult<()> {
        self.graph.pass_mut::<GridPass>(GRID_PASS)?.set_enabled(enabled);
        Ok(())
    }

    pub fn meshes(&self) -> &MeshManager {
        &self.meshes
    }

    pub fn meshes_mut(&mut self) -> &mut MeshManager {
        &mut self.meshes
    }

    pub fn materials(&self) -> &MaterialManager {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> &mut MaterialManager {
        &mut self.materials
    }

    pub fn shaders(&self) -> &ShaderManager {
        &self.shaders
    }

    pub fn shadows(&self) -> &ShadowSystem {
        &self.shadows
    }

    /// Counters of the last recorded frame.
    pub fn stats(&self) -> FrameStats {
        self.last_stats
    }

    pub fn main_pass(&mut self) -> RenderResult<&mut MainPass> {
        self.graph.pass_mut::<MainPass>(MAIN_PASS)
    }

    /// Number of frames presented so far.
    pub fn frame_number(&self) -> u64 {
        self.scheduler.frame_number()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn wait_idle(&self) -> RenderResult<()> {
        self.context.device().wait_idle()?;
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.device().wait_idle() {
            tracing::error!("Failed to wait for device idle: {}", e);
        }
        info!(
            "Renderer shutting down after {} frames",
            self.scheduler.frame_number()
        );
    }
}
