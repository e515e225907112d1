use std::any::Any;

use ash::vk;
use tracing::debug;

use renderer_rhi::command::CommandBuffer;
use renderer_rhi::debug::colors;
use renderer_rhi::pipeline::{ColorBlendAttachment, CullMode, GraphicsPipelineBuilder, PipelineConfig};
use renderer_rhi::rendering::{ColorAttachment, RenderingConfig};
use renderer_rhi::shader::ShaderStage;

use crate::error::{RenderError, RenderResult};
use crate::graph::{FrameContext, PassSetup, RenderPass, RenderTarget};

use super::GRID_PASS;

pub const GRID_PIPELINE: &str = "Grid";

/// Vertices of the two triangles the grid shader expands into a plane.
const GRID_VERTEX_COUNT: u32 = 6;

/// Infinite ground grid blended over the main pass output.
pub struct GridPass {
    pipeline: Option<PipelineConfig>,
    enabled: bool,
}

impl GridPass {
    pub fn new() -> Self {
        Self {
            pipeline: None,
            enabled: true,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for GridPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for GridPass {
    fn name(&self) -> &'static str {
        GRID_PASS
    }

    fn setup(&mut self, setup: &mut PassSetup<'_>) -> RenderResult<()> {
        let vertex = setup.shaders.load("grid.vert", ShaderStage::Vertex)?;
        let fragment = setup.shaders.load("grid.frag", ShaderStage::Fragment)?;

        let pipeline = GraphicsPipelineBuilder::new(GRID_PIPELINE)
            .shader(vertex)
            .shader(fragment)
            .rendering_formats(&[setup.color_format], None)
            .reflect_layout(setup.shaders)?
            .cull_mode(CullMode::None)
            .depth_test(false)
            .depth_write(false)
            .color_blend_attachment(ColorBlendAttachment::alpha_blend())
            .build(setup.device.clone())?;

        setup
            .debug_utils
            .set_object_name(pipeline.pipeline(), GRID_PIPELINE);
        debug!("Created pipeline: {}", GRID_PIPELINE);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn rendering(&self, target: &RenderTarget) -> Option<RenderingConfig> {
        Some(
            RenderingConfig::new(target.extent)
                .with_color_attachment(ColorAttachment::new(target.color_view).load()),
        )
    }

    fn execute(&mut self, cmd: &CommandBuffer, ctx: &mut FrameContext<'_>) -> RenderResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| RenderError::Internal("grid pass used before setup".into()))?;
        let layout = pipeline.set_layout(0).ok_or_else(|| {
            RenderError::Internal("grid pipeline declares no frame set".into())
        })?;

        cmd.bind_graphics_pipeline(pipeline.pipeline());
        cmd.set_viewport_and_scissor(ctx.extent);
        cmd.set_depth_state(false, false, vk::CompareOp::ALWAYS);
        cmd.set_line_width(1.0);

        let frame_set = ctx.uniforms.frame_set(ctx.frame_index, layout)?;
        cmd.bind_descriptor_sets(pipeline.layout(), 0, &[frame_set]);
        cmd.draw(GRID_VERTEX_COUNT, 1);
        Ok(())
    }

    fn debug_color(&self) -> [f32; 4] {
        colors::GRID
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_starts_enabled_without_pipeline() {
        let mut pass = GridPass::default();
        assert!(pass.is_enabled());
        assert!(pass.pipeline.is_none());
        assert_eq!(pass.name(), "GridPass");

        pass.set_enabled(false);
        assert!(!pass.is_enabled());
    }

    #[test]
    fn test_grid_loads_color_without_depth() {
        let pass = GridPass::new();
        let target = RenderTarget {
            color_view: vk::ImageView::null(),
            depth_view: vk::ImageView::null(),
            extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
        };
        let config = pass.rendering(&target).expect("grid renders to the swapchain");
        assert_eq!(config.extent(), target.extent);
    }
}
