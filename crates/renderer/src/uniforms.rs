//! Per-frame uniform buffers and their set 0 descriptor sets.
//!
//! Every mesh and grid shader declares the same set 0 (camera at binding 0,
//! light at binding 1), so the layout cache resolves it to one handle.
//! Sets are still keyed by layout so a pipeline with a different set 0
//! gets its own.

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use renderer_rhi::RhiResult;
use renderer_rhi::buffer::{Buffer, BufferUsage};
use renderer_rhi::descriptor::{DescriptorPool, DescriptorWriter};
use renderer_rhi::device::Device;

use crate::ubo::{CameraUbo, LightUbo};

pub const CAMERA_BINDING: u32 = 0;
pub const LIGHT_BINDING: u32 = 1;

/// Distinct set 0 layouts supported per frame slot.
const LAYOUTS_PER_FRAME: u32 = 4;

struct FrameBuffers {
    camera: Buffer,
    light: Buffer,
}

pub struct FrameUniforms {
    device: Arc<Device>,
    frames: Vec<FrameBuffers>,
    sets: HashMap<(usize, vk::DescriptorSetLayout), vk::DescriptorSet>,
    // Declared last: sets are released with the pool.
    pool: DescriptorPool,
}

impl FrameUniforms {
    pub fn new(device: Arc<Device>, frames_in_flight: usize) -> RhiResult<Self> {
        let frames = (0..frames_in_flight.max(1))
            .map(|_| {
                Ok(FrameBuffers {
                    camera: Buffer::new(
                        device.clone(),
                        BufferUsage::Uniform,
                        CameraUbo::SIZE as vk::DeviceSize,
                    )?,
                    light: Buffer::new(
                        device.clone(),
                        BufferUsage::Uniform,
                        LightUbo::SIZE as vk::DeviceSize,
                    )?,
                })
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let max_sets = frames.len() as u32 * LAYOUTS_PER_FRAME;
        let pool = DescriptorPool::new(device.clone(), max_sets, max_sets * 2, 1)?;

        for frame in &frames {
            frame.light.write(&LightUbo::default())?;
        }

        debug!("Created uniform buffers for {} frames", frames.len());
        Ok(Self {
            device,
            frames,
            sets: HashMap::new(),
            pool,
        })
    }

    pub fn write_camera(&self, frame_index: usize, ubo: &CameraUbo) -> RhiResult<()> {
        self.frame(frame_index).camera.write(ubo)
    }

    pub fn write_light(&self, frame_index: usize, ubo: &LightUbo) -> RhiResult<()> {
        self.frame(frame_index).light.write(ubo)
    }

    /// Set 0 of `frame_index` for `layout`, allocated and written on first
    /// use. The buffers never change, so the set stays valid.
    pub fn frame_set(
        &mut self,
        frame_index: usize,
        layout: vk::DescriptorSetLayout,
    ) -> RhiResult<vk::DescriptorSet> {
        let slot = frame_index % self.frames.len();
        if let Some(set) = self.sets.get(&(slot, layout)) {
            return Ok(*set);
        }

        let set = self.pool.allocate_one(layout)?;
        let frame = &self.frames[slot];
        DescriptorWriter::new()
            .buffer(CAMERA_BINDING, frame.camera.handle(), frame.camera.size())
            .buffer(LIGHT_BINDING, frame.light.handle(), frame.light.size())
            .write(&self.device, set);
        self.sets.insert((slot, layout), set);
        debug!("Allocated frame set for slot {}", slot);
        Ok(set)
    }

    fn frame(&self, frame_index: usize) -> &FrameBuffers {
        &self.frames[frame_index % self.frames.len()]
    }
}
