use std::any::Any;

use ash::vk;
use tracing::debug;

use renderer_resources::MeshTopology;
use renderer_rhi::command::CommandBuffer;
use renderer_rhi::debug::colors;
use renderer_rhi::pipeline::{CompareOp, CullMode, GraphicsPipelineBuilder, PipelineConfig};
use renderer_rhi::rendering::RenderingConfig;
use renderer_rhi::shader::ShaderStage;

use crate::error::{RenderError, RenderResult};
use crate::graph::{FrameContext, PassSetup, RenderPass, RenderTarget};
use crate::shadow::SHADOW_MAP_FORMAT;
use crate::ubo::ShadowPushConstants;

use super::SHADOW_PASS;

pub const SHADOW_PIPELINE: &str = "ShadowMap";

/// Renders every shadow caster into the shadow map of each light.
///
/// Owns no rendering scope of its own in the graph: the shadow system opens
/// one per light because each light has its own depth attachment.
#[derive(Default)]
pub struct ShadowPass {
    pipeline: Option<PipelineConfig>,
}

impl ShadowPass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderPass for ShadowPass {
    fn name(&self) -> &'static str {
        SHADOW_PASS
    }

    fn setup(&mut self, setup: &mut PassSetup<'_>) -> RenderResult<()> {
        let vertex = setup.shaders.load("shadowmap.vert", ShaderStage::Vertex)?;
        let fragment = setup.shaders.load("shadowmap.frag", ShaderStage::Fragment)?;

        let pipeline = GraphicsPipelineBuilder::new(SHADOW_PIPELINE)
            .shader(vertex)
            .shader(fragment)
            .rendering_formats(&[], Some(SHADOW_MAP_FORMAT))
            .reflect_layout(setup.shaders)?
            .cull_mode(CullMode::Front)
            .depth_compare_op(CompareOp::Less)
            .build(setup.device.clone())?;

        setup
            .debug_utils
            .set_object_name(pipeline.pipeline(), SHADOW_PIPELINE);
        debug!("Created pipeline: {}", SHADOW_PIPELINE);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn rendering(&self, _target: &RenderTarget) -> Option<RenderingConfig> {
        None
    }

    fn execute(&mut self, cmd: &CommandBuffer, ctx: &mut FrameContext<'_>) -> RenderResult<()> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| RenderError::Internal("shadow pass used before setup".into()))?;

        let registry = ctx.registry;
        let meshes = ctx.meshes;
        let mut draws = 0;

        let result =
            ctx.shadows
                .update_shadow_maps(cmd, ctx.lights, ctx.camera, |cmd, light_space| {
                    cmd.bind_graphics_pipeline(pipeline.pipeline());
                    cmd.set_depth_state(true, true, vk::CompareOp::LESS);
                    cmd.set_line_width(1.0);

                    for (_, transform, mesh_ref, _) in registry.view_drawables() {
                        let Some(mesh) = meshes.get(mesh_ref.name()) else {
                            continue;
                        };
                        if mesh.topology() != MeshTopology::TriangleList {
                            continue;
                        }

                        let constants = ShadowPushConstants {
                            light_space,
                            model: transform.model_matrix(),
                        };
                        cmd.push_constants(
                            pipeline.layout(),
                            pipeline.push_constant_stages(),
                            0,
                            &constants,
                        );
                        cmd.bind_vertex_buffer(mesh.vertex_buffer().handle());
                        cmd.bind_index_buffer(mesh.index_buffer().handle());
                        cmd.draw_indexed(mesh.index_count(), 1);
                        draws += 1;
                    }
                    Ok(())
                });

        // Raised before any map is destroyed, so it holds even on failure.
        ctx.descriptors_invalidated |= ctx.shadows.take_descriptor_invalidation();
        result?;
        ctx.stats.shadow_draw_calls += draws;
        Ok(())
    }

    fn debug_color(&self) -> [f32; 4] {
        colors::SHADOW
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
