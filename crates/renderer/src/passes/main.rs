use std::any::Any;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use renderer_resources::{Material, MaterialKind, MaterialManager, WIRE_PIPELINE};
use renderer_rhi::command::CommandBuffer;
use renderer_rhi::debug::colors;
use renderer_rhi::descriptor::DescriptorPool;
use renderer_rhi::device::Device;
use renderer_rhi::pipeline::{
    ColorBlendAttachment, CompareOp, CullMode, FrontFace, GraphicsPipelineBuilder, PipelineConfig,
    PolygonMode, PrimitiveTopology,
};
use renderer_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
use renderer_rhi::shader::{ShaderManager, ShaderStage};
use renderer_scene::Entity;

use crate::descriptor_cache::{
    CacheStats, DEFAULT_CAPACITY, DescriptorFreer, DescriptorLru, Lookup, RetiredSets,
    entity_descriptor_key,
};
use crate::error::{RenderError, RenderResult};
use crate::graph::{FrameContext, PassSetup, RenderPass, RenderTarget};
use crate::ubo::MeshPushConstants;

use super::MAIN_PASS;

pub const CLEAR_COLOR: [f32; 4] = [0.05, 0.05, 0.08, 1.0];

const FRAME_SET: u32 = 0;
const MATERIAL_SET: u32 = 1;
const ENTITY_SET: u32 = 2;
const TEXTURES_PER_ENTITY_SET: u32 = 5;

/// The pipelines the main pass records with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MainPipeline {
    Pbr,
    Basic,
    DebugWire,
}

impl MainPipeline {
    pub fn name(self) -> &'static str {
        match self {
            MainPipeline::Pbr => "pbr",
            MainPipeline::Basic => "basic",
            MainPipeline::DebugWire => WIRE_PIPELINE,
        }
    }
}

/// Picks the pipeline for a mesh drawn with a material of `kind`.
///
/// Wire meshes only take basic materials; the second value is `true` when
/// the material has to be swapped for the magenta fallback.
pub fn select_pipeline(mesh_pipeline: &str, kind: MaterialKind) -> (MainPipeline, bool) {
    if mesh_pipeline == WIRE_PIPELINE {
        return (MainPipeline::DebugWire, kind != MaterialKind::Basic);
    }
    match kind {
        MaterialKind::Pbr => (MainPipeline::Pbr, false),
        MaterialKind::Basic => (MainPipeline::Basic, false),
    }
}

struct Pipelines {
    pbr: PipelineConfig,
    basic: PipelineConfig,
    debug_wire: PipelineConfig,
}

impl Pipelines {
    fn get(&self, which: MainPipeline) -> &PipelineConfig {
        match which {
            MainPipeline::Pbr => &self.pbr,
            MainPipeline::Basic => &self.basic,
            MainPipeline::DebugWire => &self.debug_wire,
        }
    }
}

/// Per-entity set state. Sets still cached when the pool is destroyed go
/// with it.
struct EntitySets {
    device: Arc<Device>,
    lru: DescriptorLru,
    retired: RetiredSets,
    pool: DescriptorPool,
}

/// Draws every drawable into the swapchain image.
///
/// Set 0 holds the frame uniforms, set 1 the material, and set 2 (PBR
/// only) the five textures of the drawable, cached in an LRU keyed by
/// material, pipeline and texture views.
pub struct MainPass {
    clear_color: [f32; 4],
    pipelines: Option<Pipelines>,
    sets: Option<EntitySets>,
    missing_meshes: HashSet<Entity>,
}

impl Default for MainPass {
    fn default() -> Self {
        Self::new()
    }
}

impl MainPass {
    pub fn new() -> Self {
        Self {
            clear_color: CLEAR_COLOR,
            pipelines: None,
            sets: None,
            missing_meshes: HashSet::new(),
        }
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Hit, miss and eviction counts of the per-entity set cache.
    pub fn descriptor_stats(&self) -> CacheStats {
        self.sets
            .as_ref()
            .map(|sets| sets.lru.stats())
            .unwrap_or_default()
    }

    pub fn cached_descriptor_sets(&self) -> usize {
        self.sets.as_ref().map_or(0, |sets| sets.lru.len())
    }

    /// Drops every per-entity set at the start of the next frame.
    pub fn request_descriptor_invalidate(&mut self) {
        if let Some(sets) = &mut self.sets {
            sets.lru.request_invalidate();
        }
    }

    fn build_pipeline(
        setup: &mut PassSetup<'_>,
        which: MainPipeline,
        vertex: &str,
        fragment: &str,
    ) -> RenderResult<PipelineConfig> {
        let shaders: &mut ShaderManager = setup.shaders;
        let vertex = shaders.load(vertex, ShaderStage::Vertex)?;
        let fragment = shaders.load(fragment, ShaderStage::Fragment)?;

        let mut builder = GraphicsPipelineBuilder::new(which.name())
            .shader(vertex)
            .shader(fragment)
            .rendering_formats(&[setup.color_format], Some(setup.depth_format))
            .reflect_layout(shaders)?
            .front_face(FrontFace::CounterClockwise)
            .depth_compare_op(CompareOp::GreaterOrEqual)
            .color_blend_attachment(ColorBlendAttachment::alpha_blend());

        builder = match which {
            MainPipeline::DebugWire => builder
                .topology(PrimitiveTopology::LineList)
                .polygon_mode(PolygonMode::Line)
                .cull_mode(CullMode::None),
            MainPipeline::Pbr | MainPipeline::Basic => builder.cull_mode(CullMode::Back),
        };

        let pipeline = builder.build(setup.device.clone())?;
        setup
            .debug_utils
            .set_object_name(pipeline.pipeline(), which.name());
        debug!("Created pipeline: {}", which.name());
        Ok(pipeline)
    }

    /// Pipeline and material a drawable is recorded with.
    fn resolve(
        mesh_pipeline: &str,
        material: &Rc<Material>,
        materials: &mut MaterialManager,
    ) -> RenderResult<(MainPipeline, Rc<Material>)> {
        let (pipeline, fallback) = select_pipeline(mesh_pipeline, material.kind());
        if fallback {
            return Ok((pipeline, materials.magenta()?));
        }
        Ok((pipeline, Rc::clone(material)))
    }
}

fn set_layout(pipeline: &PipelineConfig, set: u32) -> RenderResult<vk::DescriptorSetLayout> {
    pipeline.set_layout(set).ok_or_else(|| {
        RenderError::Internal(format!(
            "pipeline '{}' declares no set {}",
            pipeline.name(),
            set
        ))
    })
}

impl RenderPass for MainPass {
    fn name(&self) -> &'static str {
        MAIN_PASS
    }

    fn setup(&mut self, setup: &mut PassSetup<'_>) -> RenderResult<()> {
        let pipelines = Pipelines {
            pbr: Self::build_pipeline(setup, MainPipeline::Pbr, "pbr.vert", "pbr.frag")?,
            basic: Self::build_pipeline(setup, MainPipeline::Basic, "basic.vert", "basic.frag")?,
            debug_wire: Self::build_pipeline(
                setup,
                MainPipeline::DebugWire,
                "basic.vert",
                "basic.frag",
            )?,
        };

        // Evicted sets wait up to one round of frames before returning.
        let max_sets = (DEFAULT_CAPACITY * (setup.frames_in_flight + 1)) as u32;
        let pool = DescriptorPool::new(
            setup.device.clone(),
            max_sets,
            1,
            max_sets * TEXTURES_PER_ENTITY_SET,
        )?;

        self.sets = Some(EntitySets {
            device: setup.device.clone(),
            lru: DescriptorLru::new(DEFAULT_CAPACITY),
            retired: RetiredSets::new(setup.frames_in_flight),
            pool,
        });
        self.pipelines = Some(pipelines);
        Ok(())
    }

    fn rendering(&self, target: &RenderTarget) -> Option<RenderingConfig> {
        Some(
            RenderingConfig::new(target.extent)
                .with_color_attachment(
                    ColorAttachment::new(target.color_view).with_clear_color(self.clear_color),
                )
                .with_depth_attachment(DepthAttachment::new(target.depth_view).with_clear_depth(1.0)),
        )
    }

    fn execute(&mut self, cmd: &CommandBuffer, ctx: &mut FrameContext<'_>) -> RenderResult<()> {
        let (Some(pipelines), Some(sets)) = (&self.pipelines, &mut self.sets) else {
            return Err(RenderError::Internal("main pass used before setup".into()));
        };

        // This slot's fence has been waited on, so its retired sets are free.
        let released = sets.retired.begin_frame(ctx.frame_index);
        if !released.is_empty() {
            sets.pool.free_sets(&released);
        }
        if ctx.descriptors_invalidated {
            // The shadow system idled the device before reporting this.
            sets.lru.request_invalidate();
            ctx.materials.invalidate_descriptor_sets();
        }
        sets.lru.begin_frame(&mut sets.retired);

        let light = match ctx.lights.first() {
            Some((id, light)) => light.ubo(ctx.shadows.light_space_matrix(*id)),
            None => Default::default(),
        };
        ctx.uniforms.write_light(ctx.frame_index, &light)?;

        let shadow_info = match ctx.shadows.primary_shadow_map(ctx.lights) {
            Some(map) => map.descriptor_info(),
            None => ctx.materials.textures_mut().fallback()?.descriptor_info(),
        };

        cmd.set_viewport_and_scissor(ctx.extent);
        cmd.set_depth_state(true, true, vk::CompareOp::LESS_OR_EQUAL);
        cmd.set_line_width(1.0);

        let registry = ctx.registry;
        let meshes = ctx.meshes;
        let mut bound: Option<MainPipeline> = None;
        for (entity, transform, mesh_ref, material_ref) in registry.view_drawables() {
            let Some(mesh) = meshes.get(mesh_ref.name()) else {
                if self.missing_meshes.insert(entity) {
                    warn!(
                        "Entity {} references unknown mesh '{}', skipping",
                        entity,
                        mesh_ref.name()
                    );
                }
                ctx.stats.skipped_draws += 1;
                continue;
            };

            let (which, material) =
                Self::resolve(mesh.pipeline_name(), material_ref.material(), ctx.materials)?;
            let pipeline = pipelines.get(which);

            if bound != Some(which) {
                cmd.bind_graphics_pipeline(pipeline.pipeline());
                let frame_set = ctx
                    .uniforms
                    .frame_set(ctx.frame_index, set_layout(pipeline, FRAME_SET)?)?;
                cmd.bind_descriptor_sets(pipeline.layout(), FRAME_SET, &[frame_set]);
                bound = Some(which);
            }

            ctx.materials.update_material_buffer(&material)?;
            let material_set = ctx.materials.get_or_create_descriptor_set(
                &material,
                set_layout(pipeline, MATERIAL_SET)?,
                Some(shadow_info),
            )?;
            cmd.bind_descriptor_sets(pipeline.layout(), MATERIAL_SET, &[material_set]);

            if which == MainPipeline::Pbr {
                let textures = ctx.materials.resolved_textures(&material)?;
                let views: Vec<vk::ImageView> = textures.iter().map(|t| t.view()).collect();
                let key = entity_descriptor_key(material.id(), pipeline.name(), &views);
                let layout = set_layout(pipeline, ENTITY_SET)?;

                let materials = &mut *ctx.materials;
                let (pool, device) = (&sets.pool, &sets.device);
                let (entity_set, lookup) =
                    sets.lru
                        .get_or_insert_with(key, &mut sets.retired, || -> RenderResult<_> {
                            let set = pool.allocate_one(layout)?;
                            materials.texture_writes(&material, 0)?.write(device, set);
                            Ok(set)
                        })?;
                match lookup {
                    Lookup::Hit => ctx.stats.descriptor_hits += 1,
                    Lookup::Miss => ctx.stats.descriptor_misses += 1,
                }
                cmd.bind_descriptor_sets(pipeline.layout(), ENTITY_SET, &[entity_set]);
            }

            let constants = MeshPushConstants {
                model: transform.model_matrix(),
                normal: transform.normal_matrix(),
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
            ctx.stats.draw_calls += 1;
        }

        Ok(())
    }

    fn debug_color(&self) -> [f32; 4] {
        colors::MAIN
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
    fn test_pbr_and_basic_follow_material() {
        assert_eq!(
            select_pipeline("pbr", MaterialKind::Pbr),
            (MainPipeline::Pbr, false)
        );
        assert_eq!(
            select_pipeline("pbr", MaterialKind::Basic),
            (MainPipeline::Basic, false)
        );
    }

    #[test]
    fn test_wire_mesh_rejects_pbr_material() {
        assert_eq!(
            select_pipeline(WIRE_PIPELINE, MaterialKind::Basic),
            (MainPipeline::DebugWire, false)
        );
        assert_eq!(
            select_pipeline(WIRE_PIPELINE, MaterialKind::Pbr),
            (MainPipeline::DebugWire, true)
        );
    }

    #[test]
    fn test_unknown_mesh_pipeline_uses_material() {
        assert_eq!(
            select_pipeline("custom", MaterialKind::Pbr),
            (MainPipeline::Pbr, false)
        );
    }

    #[test]
    fn test_pipeline_names() {
        assert_eq!(MainPipeline::Pbr.name(), "pbr");
        assert_eq!(MainPipeline::Basic.name(), "basic");
        assert_eq!(MainPipeline::DebugWire.name(), "debug_wire");
    }
}
