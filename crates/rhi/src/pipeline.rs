//! Graphics pipeline construction for dynamic rendering.
//!
//! - [`PipelineLayout`] wraps VkPipelineLayout
//! - [`Pipeline`] wraps VkPipeline
//! - [`GraphicsPipelineBuilder`] declares the pipeline state and produces a
//!   [`PipelineConfig`] holding the pipeline, its layout and the set layouts
//!   resolved through the layout cache
//!
//! Viewport, scissor, depth test, depth write, depth compare op and line
//! width are always dynamic. Passes set them explicitly when they begin
//! recording.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::pipeline::{CompareOp, CullMode, GraphicsPipelineBuilder};
//! use renderer_rhi::shader::{ShaderManager, ShaderStage};
//!
//! # fn example(device: Arc<Device>, shaders: &mut ShaderManager) -> Result<(), renderer_rhi::RhiError> {
//! let vert = shaders.load("pbr.vert", ShaderStage::Vertex)?;
//! let frag = shaders.load("pbr.frag", ShaderStage::Fragment)?;
//!
//! let pbr = GraphicsPipelineBuilder::new("pbr")
//!     .shader(vert)
//!     .shader(frag)
//!     .rendering_formats(&[vk::Format::B8G8R8A8_UNORM], Some(vk::Format::D32_SFLOAT))
//!     .cull_mode(CullMode::Back)
//!     .depth_compare_op(CompareOp::GreaterOrEqual)
//!     .reflect_layout(shaders)?
//!     .build(device)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{PipelineBuildError, RhiResult};
use crate::reflect::{self, PushConstantRange, ShaderResources};
use crate::shader::{Shader, ShaderManager, ShaderStage};

/// Dynamic states every pipeline carries.
pub const REQUIRED_DYNAMIC_STATES: [vk::DynamicState; 6] = [
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::SCISSOR,
    vk::DynamicState::DEPTH_TEST_ENABLE,
    vk::DynamicState::DEPTH_WRITE_ENABLE,
    vk::DynamicState::DEPTH_COMPARE_OP,
    vk::DynamicState::LINE_WIDTH,
];

/// Vulkan pipeline layout wrapper.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a pipeline layout from set layouts and push-constant ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineBuildError::LayoutCreation`] if the driver rejects
    /// the layout.
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe {
            device
                .handle()
                .create_pipeline_layout(&create_info, None)
                .map_err(PipelineBuildError::LayoutCreation)?
        };

        debug!(
            "Created pipeline layout with {} set layout(s) and {} push constant range(s)",
            set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Destroyed pipeline layout");
    }
}

/// Vulkan graphics pipeline wrapper.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Destroyed graphics pipeline");
    }
}

/// A built pipeline with everything needed to bind it.
///
/// Set layouts are borrowed handles owned by the layout cache. The
/// pipeline is dropped before its layout.
pub struct PipelineConfig {
    name: String,
    pipeline: Pipeline,
    layout: PipelineLayout,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    push_constant_ranges: Vec<PushConstantRange>,
}

impl PipelineConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }

    /// Set layouts indexed by set number.
    pub fn set_layouts(&self) -> &[vk::DescriptorSetLayout] {
        &self.set_layouts
    }

    /// Layout for `set`, if the pipeline declares it.
    pub fn set_layout(&self, set: u32) -> Option<vk::DescriptorSetLayout> {
        self.set_layouts.get(set as usize).copied()
    }

    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }

    /// Union of stage flags over all push-constant ranges.
    pub fn push_constant_stages(&self) -> vk::ShaderStageFlags {
        self.push_constant_ranges
            .iter()
            .fold(vk::ShaderStageFlags::empty(), |acc, r| acc | r.stages)
    }
}

/// Polygon rasterization mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
}

impl PolygonMode {
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
        }
    }
}

/// Primitive topology.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    LineList,
    #[default]
    TriangleList,
}

impl PrimitiveTopology {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        }
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Front face winding order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Depth compare operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    Equal,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::Equal => vk::CompareOp::EQUAL,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Color blend attachment state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color: vk::BlendFactor,
    pub dst_color: vk::BlendFactor,
    pub src_alpha: vk::BlendFactor,
    pub dst_alpha: vk::BlendFactor,
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color: vk::BlendFactor::ONE,
            dst_color: vk::BlendFactor::ZERO,
            src_alpha: vk::BlendFactor::ONE,
            dst_alpha: vk::BlendFactor::ZERO,
        }
    }
}

impl ColorBlendAttachment {
    /// `src * src_alpha + dst * (1 - src_alpha)`.
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_color: vk::BlendFactor::SRC_ALPHA,
            dst_color: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            src_alpha: vk::BlendFactor::ONE,
            dst_alpha: vk::BlendFactor::ZERO,
        }
    }

    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.blend_enable.into(),
            src_color_blend_factor: self.src_color,
            dst_color_blend_factor: self.dst_color,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: self.src_alpha,
            dst_alpha_blend_factor: self.dst_alpha,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct RenderingFormats {
    color: Vec<vk::Format>,
    depth: Option<vk::Format>,
}

/// Declarative graphics pipeline builder.
///
/// Required: rendering formats, at least one shader stage, set layouts and
/// push-constant ranges (the last two usually via [`reflect_layout`]).
/// Everything else has a default:
///
/// - triangle list, fill, back-face culling, counter-clockwise front face
/// - depth test and write on, compare LESS
/// - one sample, blending off
///
/// [`reflect_layout`]: GraphicsPipelineBuilder::reflect_layout
pub struct GraphicsPipelineBuilder {
    name: String,
    shaders: Vec<Arc<Shader>>,
    rendering: Option<RenderingFormats>,
    set_layouts: Option<Vec<vk::DescriptorSetLayout>>,
    push_constant_ranges: Option<Vec<PushConstantRange>>,

    topology: PrimitiveTopology,
    polygon_mode: PolygonMode,
    cull_mode: CullMode,
    front_face: FrontFace,

    depth_test_enable: bool,
    depth_write_enable: bool,
    depth_compare_op: CompareOp,

    blend_attachments: Vec<ColorBlendAttachment>,
    samples: vk::SampleCountFlags,
    extra_dynamic_states: Vec<vk::DynamicState>,
}

impl GraphicsPipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shaders: Vec::new(),
            rendering: None,
            set_layouts: None,
            push_constant_ranges: None,
            topology: PrimitiveTopology::TriangleList,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::Less,
            blend_attachments: Vec::new(),
            samples: vk::SampleCountFlags::TYPE_1,
            extra_dynamic_states: Vec::new(),
        }
    }

    /// Adds a shader stage.
    pub fn shader(mut self, shader: Arc<Shader>) -> Self {
        self.shaders.push(shader);
        self
    }

    /// Color attachment formats and optional depth format. An empty color
    /// list makes a depth-only pipeline.
    pub fn rendering_formats(mut self, color: &[vk::Format], depth: Option<vk::Format>) -> Self {
        self.rendering = Some(RenderingFormats {
            color: color.to_vec(),
            depth,
        });
        self
    }

    pub fn set_layouts(mut self, layouts: Vec<vk::DescriptorSetLayout>) -> Self {
        self.set_layouts = Some(layouts);
        self
    }

    pub fn push_constant_ranges(mut self, ranges: Vec<PushConstantRange>) -> Self {
        self.push_constant_ranges = Some(ranges);
        self
    }

    /// Fills set layouts and push-constant ranges from the combined
    /// reflection of the stages added so far.
    pub fn reflect_layout(self, shaders: &mut ShaderManager) -> RhiResult<Self> {
        let resources = self.combined_resources();
        let set_layouts = shaders.create_descriptor_set_layouts(&resources)?;
        let ranges = reflect::merge_push_constant_ranges(resources.push_constant_ranges);
        Ok(self.set_layouts(set_layouts).push_constant_ranges(ranges))
    }

    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn polygon_mode(mut self, mode: PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn front_face(mut self, face: FrontFace) -> Self {
        self.front_face = face;
        self
    }

    pub fn depth_test(mut self, enable: bool) -> Self {
        self.depth_test_enable = enable;
        self
    }

    pub fn depth_write(mut self, enable: bool) -> Self {
        self.depth_write_enable = enable;
        self
    }

    pub fn depth_compare_op(mut self, op: CompareOp) -> Self {
        self.depth_compare_op = op;
        self
    }

    /// Blend state for the next color attachment. Attachments without an
    /// explicit state get [`ColorBlendAttachment::default`].
    pub fn color_blend_attachment(mut self, attachment: ColorBlendAttachment) -> Self {
        self.blend_attachments.push(attachment);
        self
    }

    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    /// Adds a dynamic state on top of [`REQUIRED_DYNAMIC_STATES`].
    pub fn dynamic_state(mut self, state: vk::DynamicState) -> Self {
        if !self.extra_dynamic_states.contains(&state) {
            self.extra_dynamic_states.push(state);
        }
        self
    }

    fn combined_resources(&self) -> ShaderResources {
        ShaderResources::combine(self.shaders.iter().map(|s| s.resources()))
    }

    fn dynamic_states(&self) -> Vec<vk::DynamicState> {
        let mut states = REQUIRED_DYNAMIC_STATES.to_vec();
        for state in &self.extra_dynamic_states {
            if !states.contains(state) {
                states.push(*state);
            }
        }
        states
    }

    fn blend_states(&self, color_count: usize) -> Vec<vk::PipelineColorBlendAttachmentState> {
        (0..color_count)
            .map(|i| {
                self.blend_attachments
                    .get(i)
                    .copied()
                    .unwrap_or_default()
                    .to_vk()
            })
            .collect()
    }

    fn check_required(&self) -> Result<(), PipelineBuildError> {
        if self.rendering.is_none() {
            return Err(PipelineBuildError::MissingField("rendering_formats"));
        }
        if self.shaders.is_empty() {
            return Err(PipelineBuildError::MissingField("shader_stages"));
        }
        if self.set_layouts.is_none() {
            return Err(PipelineBuildError::MissingField("set_layouts"));
        }
        if self.push_constant_ranges.is_none() {
            return Err(PipelineBuildError::MissingField("push_constant_ranges"));
        }
        Ok(())
    }

    /// Creates the layout and the pipeline.
    ///
    /// # Errors
    ///
    /// - [`PipelineBuildError::MissingField`] when a required field is unset
    /// - [`PipelineBuildError::LayoutCreation`] / [`PipelineBuildError::PipelineCreation`]
    ///   when the driver rejects the objects
    pub fn build(self, device: Arc<Device>) -> RhiResult<PipelineConfig> {
        self.check_required()?;
        let (Some(rendering), Some(set_layouts), Some(push_ranges)) = (
            self.rendering.clone(),
            self.set_layouts.clone(),
            self.push_constant_ranges.clone(),
        ) else {
            return Err(PipelineBuildError::MissingField("rendering_formats").into());
        };

        let vk_ranges: Vec<vk::PushConstantRange> =
            push_ranges.iter().map(PushConstantRange::to_vk).collect();
        let layout = PipelineLayout::new(device.clone(), &set_layouts, &vk_ranges)?;

        let stages: Vec<vk::PipelineShaderStageCreateInfo> = self
            .shaders
            .iter()
            .map(|s| s.stage_create_info())
            .collect();

        // Vertex input comes from reflection of the vertex stage only.
        let resources = self.combined_resources();
        let has_vertex_stage = self
            .shaders
            .iter()
            .any(|s| s.stage() == ShaderStage::Vertex);
        let (vertex_bindings, vertex_attributes) = if has_vertex_stage {
            (
                resources.bindings.iter().map(|b| b.to_vk()).collect(),
                resources.attributes.iter().map(|a| a.to_vk()).collect(),
            )
        } else {
            (Vec::new(), Vec::new())
        };
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology.to_vk())
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(self.polygon_mode.to_vk())
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk())
            .line_width(1.0);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(self.samples)
            .min_sample_shading(1.0);

        let has_depth = rendering.depth.is_some();
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth && self.depth_test_enable)
            .depth_write_enable(has_depth && self.depth_write_enable)
            .depth_compare_op(self.depth_compare_op.to_vk())
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let blend_attachments = self.blend_states(rendering.color.len());
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states = self.dynamic_states();
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&rendering.color);
        if let Some(depth) = rendering.depth {
            rendering_info = rendering_info.depth_attachment_format(depth);
        }

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, err)| PipelineBuildError::PipelineCreation(err))?
        };
        let handle = pipelines
            .into_iter()
            .next()
            .ok_or(PipelineBuildError::PipelineCreation(vk::Result::ERROR_UNKNOWN))?;

        info!(
            "Created pipeline '{}' ({} stage(s), {} set layout(s), {} color attachment(s), depth: {})",
            self.name,
            stages.len(),
            set_layouts.len(),
            rendering.color.len(),
            has_depth
        );

        Ok(PipelineConfig {
            name: self.name,
            pipeline: Pipeline {
                device,
                pipeline: handle,
            },
            layout,
            set_layouts,
            push_constant_ranges: push_ranges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Front.to_vk(), vk::CullModeFlags::FRONT);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
    }

    #[test]
    fn test_compare_op_to_vk() {
        assert_eq!(CompareOp::Less.to_vk(), vk::CompareOp::LESS);
        assert_eq!(
            CompareOp::GreaterOrEqual.to_vk(),
            vk::CompareOp::GREATER_OR_EQUAL
        );
        assert_eq!(CompareOp::Always.to_vk(), vk::CompareOp::ALWAYS);
    }

    #[test]
    fn test_topology_and_polygon_mode_to_vk() {
        assert_eq!(
            PrimitiveTopology::LineList.to_vk(),
            vk::PrimitiveTopology::LINE_LIST
        );
        assert_eq!(PolygonMode::Line.to_vk(), vk::PolygonMode::LINE);
        assert_eq!(FrontFace::Clockwise.to_vk(), vk::FrontFace::CLOCKWISE);
    }

    #[test]
    fn test_alpha_blend_attachment() {
        let state = ColorBlendAttachment::alpha_blend().to_vk();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_builder_defaults() {
        let builder = GraphicsPipelineBuilder::new("pbr");
        assert_eq!(builder.cull_mode, CullMode::Back);
        assert_eq!(builder.front_face, FrontFace::CounterClockwise);
        assert_eq!(builder.depth_compare_op, CompareOp::Less);
        assert!(builder.depth_test_enable);
        assert!(builder.depth_write_enable);
    }

    #[test]
    fn test_dynamic_states_always_include_depth_triple() {
        let builder = GraphicsPipelineBuilder::new("grid")
            .dynamic_state(vk::DynamicState::DEPTH_BIAS)
            .dynamic_state(vk::DynamicState::VIEWPORT);
        let states = builder.dynamic_states();
        for required in REQUIRED_DYNAMIC_STATES {
            assert_eq!(states.iter().filter(|s| **s == required).count(), 1);
        }
        assert!(states.contains(&vk::DynamicState::DEPTH_BIAS));
        assert_eq!(states.len(), REQUIRED_DYNAMIC_STATES.len() + 1);
    }

    #[test]
    fn test_missing_fields_reported_in_order() {
        let builder = GraphicsPipelineBuilder::new("shadow");
        assert!(matches!(
            builder.check_required(),
            Err(PipelineBuildError::MissingField("rendering_formats"))
        ));

        let builder = builder.rendering_formats(&[], Some(vk::Format::D32_SFLOAT));
        assert!(matches!(
            builder.check_required(),
            Err(PipelineBuildError::MissingField("shader_stages"))
        ));
    }

    #[test]
    fn test_blend_states_fill_missing_attachments() {
        let builder = GraphicsPipelineBuilder::new("pbr")
            .color_blend_attachment(ColorBlendAttachment::alpha_blend());
        let states = builder.blend_states(2);
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].blend_enable, vk::TRUE);
        assert_eq!(states[1].blend_enable, vk::FALSE);

        // Depth-only pipelines have no blend state.
        assert!(builder.blend_states(0).is_empty());
    }
}
