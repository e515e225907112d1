//! Sampled textures uploaded from RGBA8 pixels.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandPool;
use crate::debug::DebugUtils;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc};
use crate::sampler::{Sampler, SamplerAddress};

/// Texture colour format.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Image, view and sampler ready for `SHADER_READ_ONLY_OPTIMAL` sampling.
pub struct Texture {
    image: Image,
    sampler: Sampler,
    name: String,
}

impl Texture {
    /// Uploads tightly packed RGBA8 `pixels` of `width × height`.
    ///
    /// The copy runs in a single-time command buffer:
    /// UNDEFINED → TRANSFER_DST, buffer-to-image copy, TRANSFER_DST →
    /// SHADER_READ_ONLY.
    pub fn from_rgba8(
        device: Arc<Device>,
        pool: &CommandPool,
        debug_utils: &DebugUtils,
        name: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RhiError::ResourceCreation(format!(
                "texture '{}': expected {} bytes, got {}",
                name,
                expected,
                pixels.len()
            )));
        }

        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;
        let image = Image::new(
            device.clone(),
            &ImageDesc {
                name: "texture",
                extent: vk::Extent2D { width, height },
                format: TEXTURE_FORMAT,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            },
        )?;

        pool.submit_single_time(|cmd| {
            image.transition(
                cmd,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            let region = vk::BufferImageCopy::default()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                });
            cmd.copy_buffer_to_image(
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
            image.transition(
                cmd,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )?;
            Ok(())
        })?;

        let sampler = Sampler::new(device, SamplerAddress::Repeat)?;
        debug_utils.set_object_name(image.handle(), name);

        info!("Texture '{}' uploaded ({}x{})", name, width, height);

        Ok(Self {
            image,
            sampler,
            name: name.to_string(),
        })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.extent().width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.extent().height
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptor info for a combined image sampler binding.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler(),
            image_view: self.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}
