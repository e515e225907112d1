//! Depth buffer sized to the swapchain.
//!
//! The depth image is D32_SFLOAT with SAMPLED and DEPTH_STENCIL_ATTACHMENT
//! usage. It is rebuilt whenever the swapchain is; the old image is only
//! dropped once the device is idle.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use renderer_rhi::device::Device;
//! use renderer_renderer::depth_buffer::DepthBuffer;
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let mut depth = DepthBuffer::new(device, vk::Extent2D { width: 1280, height: 720 })?;
//! depth.resize(vk::Extent2D { width: 1920, height: 1080 })?;
//! assert_eq!(depth.extent().width, 1920);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use renderer_rhi::RhiResult;
use renderer_rhi::command::CommandBuffer;
use renderer_rhi::device::Device;
use renderer_rhi::image::{Image, ImageDesc};

/// Depth format of the main pass.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

pub struct DepthBuffer {
    device: Arc<Device>,
    image: Image,
}

impl DepthBuffer {
    pub fn new(device: Arc<Device>, extent: vk::Extent2D) -> RhiResult<Self> {
        let image = Self::create_image(device.clone(), extent)?;
        Ok(Self { device, image })
    }

    fn create_image(device: Arc<Device>, extent: vk::Extent2D) -> RhiResult<Image> {
        let image = Image::new(
            device,
            &ImageDesc {
                name: "DepthBuffer",
                extent,
                format: DEPTH_FORMAT,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED,
            },
        )?;
        debug!("Created depth buffer: {}x{}", extent.width, extent.height);
        Ok(image)
    }

    /// Replaces the image with one of `extent`. Waits for the device to go
    /// idle before the old image is destroyed.
    pub fn resize(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        if extent == self.image.extent() {
            return Ok(());
        }
        let image = Self::create_image(self.device.clone(), extent)?;
        self.device.wait_idle()?;
        self.image = image;
        Ok(())
    }

    /// Discards the previous contents and makes the image writable as a
    /// depth attachment.
    pub fn begin_frame(&self, cmd: &CommandBuffer) -> RhiResult<()> {
        self.image.transition(
            cmd,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        )?;
        Ok(())
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }
}

#[cfg(test)]
mod tests {
    use renderer_rhi::image::aspect_for_format;

    use super::*;

    #[test]
    fn test_depth_format_has_depth_aspect() {
        assert_eq!(
            aspect_for_format(DEPTH_FORMAT),
            vk::ImageAspectFlags::DEPTH
        );
    }
}
