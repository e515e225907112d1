//! Texture samplers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Addressing used by the renderer's two sampler flavours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerAddress {
    /// Material textures.
    Repeat,
    /// Shadow maps.
    ClampToEdge,
}

impl SamplerAddress {
    fn to_vk(self) -> vk::SamplerAddressMode {
        match self {
            SamplerAddress::Repeat => vk::SamplerAddressMode::REPEAT,
            SamplerAddress::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        }
    }
}

/// Linear-filtered sampler.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    pub fn new(device: Arc<Device>, address: SamplerAddress) -> RhiResult<Self> {
        let mode = address.to_vk();
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(mode)
            .address_mode_v(mode)
            .address_mode_w(mode)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(1.0);

        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        debug!("Created {:?} sampler", address);

        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
    }
}
