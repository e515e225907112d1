//! Descriptor set layouts, pools and writes.
//!
//! - [`DescriptorSetLayout`] owns a VkDescriptorSetLayout; the layout cache
//!   keeps one per distinct binding list
//! - [`DescriptorPool`] is created with `FREE_DESCRIPTOR_SET` so material and
//!   per-entity sets can be returned individually
//! - [`GrowingDescriptorPool`] chains pools and adds one whenever every
//!   existing pool is exhausted
//! - [`DescriptorWriter`] collects buffer and image infos and flushes them in
//!   one `vkUpdateDescriptorSets`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::descriptor::{DescriptorPool, DescriptorWriter};
//!
//! # fn example(device: Arc<Device>, layout: vk::DescriptorSetLayout, ubo: vk::Buffer) -> Result<(), renderer_rhi::RhiError> {
//! let pool = DescriptorPool::new(device.clone(), 100, 100, 100)?;
//! let set = pool.allocate_one(layout)?;
//! DescriptorWriter::new()
//!     .buffer(0, ubo, 64)
//!     .write(&device, set);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Pool of uniform-buffer and combined-image-sampler descriptors.
///
/// Not thread-safe; owned by the render thread.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        uniform_buffers: u32,
        image_samplers: u32,
    ) -> RhiResult<Self> {
        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(uniform_buffers),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(image_samplers),
        ];
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, ubo={}, samplers={}",
            max_sets, uniform_buffers, image_samplers
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    pub fn allocate_one(&self, layout: vk::DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        sets.into_iter()
            .next()
            .ok_or_else(|| RhiError::ResourceCreation("descriptor set".to_string()))
    }

    pub fn free(&self, sets: &[vk::DescriptorSet]) -> RhiResult<()> {
        if sets.is_empty() {
            return Ok(());
        }
        unsafe {
            self.device.handle().free_descriptor_sets(self.pool, sets)?;
        }
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// A pool sets can be allocated from and returned to individually.
pub trait SetPool {
    fn allocate_one(&self, layout: vk::DescriptorSetLayout) -> RhiResult<vk::DescriptorSet>;
    fn free(&self, sets: &[vk::DescriptorSet]) -> RhiResult<()>;
}

impl SetPool for DescriptorPool {
    fn allocate_one(&self, layout: vk::DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        DescriptorPool::allocate_one(self, layout)
    }

    fn free(&self, sets: &[vk::DescriptorSet]) -> RhiResult<()> {
        DescriptorPool::free(self, sets)
    }
}

/// True when an allocation failed because the pool has no room left.
pub fn is_pool_exhausted(error: &RhiError) -> bool {
    matches!(
        error,
        RhiError::VulkanError(
            vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL
        )
    )
}

type PoolFactory<P> = Box<dyn FnMut() -> RhiResult<P>>;

/// Descriptor pools that grow on demand.
///
/// Allocation tries the newest pool first, then older ones that may have
/// room after frees, and creates a new pool only when all are exhausted.
/// Each set remembers its pool so `free` returns it to the right one.
pub struct GrowingDescriptorPool<P: SetPool = DescriptorPool> {
    pools: Vec<P>,
    owners: HashMap<vk::DescriptorSet, usize>,
    create: PoolFactory<P>,
}

impl GrowingDescriptorPool<DescriptorPool> {
    /// Chain of pools each holding `sets_per_pool` sets, with as many
    /// uniform buffer and image sampler descriptors.
    pub fn new(device: Arc<Device>, sets_per_pool: u32) -> RhiResult<Self> {
        Self::with_factory(move || {
            DescriptorPool::new(device.clone(), sets_per_pool, sets_per_pool, sets_per_pool)
        })
    }
}

impl<P: SetPool> GrowingDescriptorPool<P> {
    /// Creates the first pool eagerly so misconfiguration fails at startup.
    pub fn with_factory(create: impl FnMut() -> RhiResult<P> + 'static) -> RhiResult<Self> {
        let mut create: PoolFactory<P> = Box::new(create);
        let first = create()?;
        Ok(Self {
            pools: vec![first],
            owners: HashMap::new(),
            create,
        })
    }

    pub fn allocate_one(&mut self, layout: vk::DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        for index in (0..self.pools.len()).rev() {
            match self.pools[index].allocate_one(layout) {
                Ok(set) => {
                    self.owners.insert(set, index);
                    return Ok(set);
                }
                Err(e) if is_pool_exhausted(&e) => continue,
                Err(e) => return Err(e),
            }
        }

        let pool = (self.create)()?;
        let set = pool.allocate_one(layout)?;
        self.pools.push(pool);
        let index = self.pools.len() - 1;
        self.owners.insert(set, index);
        info!("Descriptor pool exhausted, grew to {} pools", self.pools.len());
        Ok(set)
    }

    /// Returns `sets` to the pools they came from. Unknown sets are skipped.
    pub fn free(&mut self, sets: &[vk::DescriptorSet]) -> RhiResult<()> {
        let mut by_pool: HashMap<usize, Vec<vk::DescriptorSet>> = HashMap::new();
        for set in sets {
            if let Some(index) = self.owners.remove(set) {
                by_pool.entry(index).or_default().push(*set);
            }
        }
        for (index, sets) in by_pool {
            self.pools[index].free(&sets)?;
        }
        Ok(())
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Sets currently allocated across all pools.
    pub fn live_sets(&self) -> usize {
        self.owners.len()
    }
}

/// Accumulates descriptor writes for a single set.
#[derive(Default)]
pub struct DescriptorWriter {
    buffers: Vec<(u32, vk::DescriptorBufferInfo)>,
    images: Vec<(u32, vk::DescriptorImageInfo)>,
}

impl DescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `range` bytes of a uniform buffer at offset zero.
    pub fn buffer(mut self, binding: u32, buffer: vk::Buffer, range: vk::DeviceSize) -> Self {
        self.buffers.push((
            binding,
            vk::DescriptorBufferInfo::default()
                .buffer(buffer)
                .offset(0)
                .range(range),
        ));
        self
    }

    /// Binds a combined image sampler.
    pub fn image(mut self, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        self.images.push((binding, info));
        self
    }

    pub fn len(&self) -> usize {
        self.buffers.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bindings in the order they were added, buffers first.
    pub fn bindings(&self) -> Vec<u32> {
        self.buffers
            .iter()
            .map(|(b, _)| *b)
            .chain(self.images.iter().map(|(b, _)| *b))
            .collect()
    }

    pub fn write(&self, device: &Device, set: vk::DescriptorSet) {
        if self.is_empty() {
            return;
        }

        let buffer_writes = self.buffers.iter().map(|(binding, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(std::slice::from_ref(info))
        });
        let image_writes = self.images.iter().map(|(binding, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(std::slice::from_ref(info))
        });
        let writes: Vec<vk::WriteDescriptorSet> = buffer_writes.chain(image_writes).collect();

        unsafe {
            device.handle().update_descriptor_sets(&writes, &[]);
        }
    }
}
