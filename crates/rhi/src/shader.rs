//! Shader modules and the shader manager.
//!
//! - [`ShaderStage`] is the stage a module is compiled for
//! - [`Shader`] wraps a VkShaderModule together with its reflected
//!   [`ShaderResources`]
//! - [`ShaderManager`] loads `<root>/shaders/<name>.spv`, caches modules by
//!   path, merges resources across stages and resolves set layouts through
//!   the [`LayoutCache`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_core::ResourcePaths;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::shader::{ShaderManager, ShaderStage};
//!
//! # fn example(device: Arc<Device>, paths: ResourcePaths) -> Result<(), renderer_rhi::RhiError> {
//! let mut shaders = ShaderManager::new(device, paths);
//! let vert = shaders.load("pbr.vert", ShaderStage::Vertex)?;
//! let frag = shaders.load("pbr.frag", ShaderStage::Fragment)?;
//!
//! let resources = ShaderManager::combine_resources(&[&vert, &frag]);
//! let set_layouts = shaders.create_descriptor_set_layouts(&resources)?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use renderer_core::ResourcePaths;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::layout_cache::LayoutCache;
use crate::reflect::{self, ShaderResources};

/// Graphics stages the renderer compiles shaders for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A compiled shader module and what reflection found in it.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    resources: ShaderResources,
}

impl Shader {
    pub fn from_spirv_file(device: Arc<Device>, path: &Path, stage: ShaderStage) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;
        let words = reflect::words_from_bytes(&bytes)?;

        Self::from_spirv_words(device, &words, stage)
    }

    /// Reflects `words` and creates the module. Reflection runs first so a
    /// malformed blob never reaches the driver.
    pub fn from_spirv_words(
        device: Arc<Device>,
        words: &[u32],
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let resources = reflect::reflect(words, stage.to_vk_stage())?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(words);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        info!(
            "Created {} shader module ({} attribute(s), {} descriptor binding(s), {} push range(s))",
            stage,
            resources.attributes.len(),
            resources.descriptor_bindings.len(),
            resources.push_constant_ranges.len()
        );

        Ok(Self {
            device,
            module,
            stage,
            resources,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    #[inline]
    pub fn resources(&self) -> &ShaderResources {
        &self.resources
    }

    /// Stage info with entry point `main`.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(c"main")
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

/// Loads and caches shader modules; owns the descriptor set layout cache.
pub struct ShaderManager {
    device: Arc<Device>,
    paths: ResourcePaths,
    modules: HashMap<PathBuf, Arc<Shader>>,
    layout_cache: LayoutCache,
}

impl ShaderManager {
    pub fn new(device: Arc<Device>, paths: ResourcePaths) -> Self {
        Self {
            layout_cache: LayoutCache::new(device.clone()),
            device,
            paths,
            modules: HashMap::new(),
        }
    }

    /// Loads `<root>/shaders/<name>.spv`, returning the cached module on
    /// repeat calls.
    pub fn load(&mut self, name: &str, stage: ShaderStage) -> RhiResult<Arc<Shader>> {
        let path = self.paths.shader(name);
        if let Some(shader) = self.modules.get(&path) {
            return Ok(shader.clone());
        }

        let shader = Arc::new(Shader::from_spirv_file(self.device.clone(), &path, stage)?);
        self.modules.insert(path, shader.clone());
        Ok(shader)
    }

    pub fn combine_resources(shaders: &[&Shader]) -> ShaderResources {
        ShaderResources::combine(shaders.iter().map(|s| s.resources()))
    }

    pub fn create_descriptor_set_layouts(
        &mut self,
        resources: &ShaderResources,
    ) -> RhiResult<Vec<vk::DescriptorSetLayout>> {
        self.layout_cache.create_descriptor_set_layouts(resources)
    }

    pub fn layout_cache(&self) -> &LayoutCache {
        &self.layout_cache
    }

    /// Drops cached modules. Pipelines keep no reference to them after
    /// creation, so this is safe once every pipeline is built.
    pub fn release_modules(&mut self) {
        self.modules.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_flags() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(ShaderStage::Vertex.to_string(), "vertex");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_shader_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Shader>();
    }
}
