//! Descriptor set layout cache.
//!
//! Pipelines never own their set layouts. Each layout is created once per
//! distinct binding list and shared by every pipeline that asks for the same
//! bindings. The cache destroys them when it is dropped, after the pipelines.

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::descriptor::DescriptorSetLayout;
use crate::device::Device;
use crate::error::RhiResult;
use crate::reflect::{DescriptorBinding, ShaderResources};

/// Cache key for a binding list: the prefix `descriptor_set_layout` followed
/// by binding, type, count and stage flags for each binding in order.
pub fn hash_bindings(bindings: &[DescriptorBinding]) -> String {
    let mut key = String::from("descriptor_set_layout");
    for b in bindings {
        key.push_str(&format!(
            "_{}_{}_{}_{}",
            b.binding,
            b.descriptor_type.as_raw(),
            b.count,
            b.stages.as_raw()
        ));
    }
    key
}

pub struct LayoutCache {
    device: Arc<Device>,
    layouts: HashMap<String, DescriptorSetLayout>,
}

impl LayoutCache {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            layouts: HashMap::new(),
        }
    }

    /// Returns the layout for `bindings`, creating it on first use.
    pub fn get_or_create(
        &mut self,
        bindings: &[DescriptorBinding],
    ) -> RhiResult<vk::DescriptorSetLayout> {
        let key = hash_bindings(bindings);
        if let Some(layout) = self.layouts.get(&key) {
            return Ok(layout.handle());
        }

        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> =
            bindings.iter().map(DescriptorBinding::to_vk).collect();
        let layout = DescriptorSetLayout::new(self.device.clone(), &vk_bindings)?;
        let handle = layout.handle();

        info!("Created descriptor set layout {}", key);
        for b in bindings {
            debug!(
                "  set {} binding {}: {:?} x{} {:?}",
                b.set, b.binding, b.descriptor_type, b.count, b.stages
            );
        }

        self.layouts.insert(key, layout);
        Ok(handle)
    }

    /// One layout per set index present in `resources`, ascending by set.
    ///
    /// Set indices must be contiguous from zero for the result to line up
    /// with `firstSet` numbering at bind time.
    pub fn create_descriptor_set_layouts(
        &mut self,
        resources: &ShaderResources,
    ) -> RhiResult<Vec<vk::DescriptorSetLayout>> {
        resources
            .bindings_by_set()
            .values()
            .map(|bindings| self.get_or_create(bindings))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ubo(binding: u32, stages: vk::ShaderStageFlags) -> DescriptorBinding {
        DescriptorBinding {
            set: 0,
            binding,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            count: 1,
            stages,
        }
    }

    #[test]
    fn test_identical_bindings_hash_equal() {
        let a = [ubo(0, vk::ShaderStageFlags::VERTEX), ubo(1, vk::ShaderStageFlags::FRAGMENT)];
        let mut b = a;
        // The set index is not part of the layout's identity.
        b[0].set = 3;
        b[1].set = 3;
        assert_eq!(hash_bindings(&a), hash_bindings(&b));
        assert!(hash_bindings(&a).starts_with("descriptor_set_layout"));
    }

    #[test]
    fn test_stage_flags_change_hash() {
        let a = [ubo(0, vk::ShaderStageFlags::VERTEX)];
        let b = [ubo(0, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)];
        assert_ne!(hash_bindings(&a), hash_bindings(&b));
    }

    #[test]
    fn test_separators_prevent_collisions() {
        let a = [ubo(1, vk::ShaderStageFlags::from_raw(11))];
        let b = [ubo(11, vk::ShaderStageFlags::from_raw(1))];
        assert_ne!(hash_bindings(&a), hash_bindings(&b));
    }
}
