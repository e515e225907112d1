//! GPU images and table-driven layout transitions.
//!
//! [`Image`] owns a VkImage, its gpu-allocator allocation and a default view.
//! Depth buffers, shadow maps and textures are all built from it.
//!
//! Layout transitions go through [`transition_info`], a fixed table mapping
//! `(old, new)` to the stage and access masks of a synchronization-2 barrier.
//! Pairs outside the table fail with [`LayoutTransitionError::Unsupported`].

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{LayoutTransitionError, RhiError, RhiResult};

/// Parameters for a single-mip, single-layer 2D image.
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub name: &'static str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}

impl ImageDesc {
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_for_format(self.format)
    }
}

/// Device-local 2D image with a view over its whole subresource.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    extent: vk::Extent2D,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    name: &'static str,
}

impl Image {
    pub fn new(device: Arc<Device>, desc: &ImageDesc) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::ResourceCreation(format!(
                "{}: zero-sized image",
                desc.name
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocated = device.lock_allocator().and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: desc.name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(RhiError::from)
        });
        let allocation = match allocated {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let aspect = desc.aspect();
        let view = unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .and_then(|_| {
                    let view_info = vk::ImageViewCreateInfo::default()
                        .image(image)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .format(desc.format)
                        .subresource_range(full_range(aspect));
                    device.handle().create_image_view(&view_info, None)
                })
        };
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                if let Ok(mut allocator) = device.lock_allocator() {
                    let _ = allocator.free(allocation);
                }
                unsafe { device.handle().destroy_image(image, None) };
                return Err(RhiError::ResourceCreation(format!("{}: {}", desc.name, e)));
            }
        };

        debug!(
            "Created image '{}' {}x{} {:?}",
            desc.name, desc.extent.width, desc.extent.height, desc.format
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            extent: desc.extent,
            format: desc.format,
            aspect,
            name: desc.name,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    /// Records a layout transition using this image's own aspect.
    pub fn transition(
        &self,
        cmd: &CommandBuffer,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> Result<(), LayoutTransitionError> {
        record_transition(cmd, self.image, self.aspect, old, new)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free image '{}': {:?}", self.name, e);
                    }
                }
                Err(e) => error!("Leaking image '{}': {}", self.name, e),
            }
        }
        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }
        debug!("Destroyed image '{}'", self.name);
    }
}

/// Barrier parameters for one row of the transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub aspect: vk::ImageAspectFlags,
}

/// Looks up the barrier for `old → new`.
pub fn transition_info(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Result<LayoutTransition, LayoutTransitionError> {
    use vk::AccessFlags2 as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags2 as S;

    let depth_rw = A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE;
    let color_rw = A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE;

    let (src_stage, src_access, dst_stage, dst_access) = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => {
            (S::TOP_OF_PIPE, A::NONE, S::TRANSFER, A::TRANSFER_WRITE)
        }
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            S::TRANSFER,
            A::TRANSFER_WRITE,
            S::FRAGMENT_SHADER,
            A::SHADER_READ,
        ),
        (L::UNDEFINED, L::PRESENT_SRC_KHR) => {
            (S::TOP_OF_PIPE, A::NONE, S::BOTTOM_OF_PIPE, A::MEMORY_READ)
        }
        // The depth image is shared by every frame in flight: the clear must
        // wait for depth writes still pending from the previous frame.
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        | (L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL) => (
            S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
            A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
            depth_rw,
        ),
        // Chains with the image-available semaphore, waited on at
        // COLOR_ATTACHMENT_OUTPUT.
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::NONE,
            S::COLOR_ATTACHMENT_OUTPUT,
            color_rw,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
            S::BOTTOM_OF_PIPE,
            A::MEMORY_READ,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
            S::TRANSFER,
            A::TRANSFER_READ,
        ),
        (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => {
            (S::TRANSFER, A::TRANSFER_WRITE, S::TRANSFER, A::TRANSFER_READ)
        }
        (L::TRANSFER_SRC_OPTIMAL, L::TRANSFER_DST_OPTIMAL) => {
            (S::TRANSFER, A::TRANSFER_READ, S::TRANSFER, A::TRANSFER_WRITE)
        }
        (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL) => (
            S::FRAGMENT_SHADER,
            A::SHADER_READ,
            S::TRANSFER,
            A::TRANSFER_WRITE,
        ),
        (L::DEPTH_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
            depth_rw,
            S::FRAGMENT_SHADER,
            A::SHADER_READ,
        ),
        (L::SHADER_READ_ONLY_OPTIMAL, L::DEPTH_ATTACHMENT_OPTIMAL) => (
            S::FRAGMENT_SHADER,
            A::SHADER_READ,
            S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
            depth_rw,
        ),
        (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => (
            S::FRAGMENT_SHADER,
            A::SHADER_READ,
            S::TRANSFER,
            A::TRANSFER_READ,
        ),
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            S::TRANSFER,
            A::TRANSFER_READ,
            S::FRAGMENT_SHADER,
            A::SHADER_READ,
        ),
        _ => return Err(LayoutTransitionError::Unsupported { old, new }),
    };

    let aspect = if is_depth_layout(old) || is_depth_layout(new) {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };

    Ok(LayoutTransition {
        src_stage,
        src_access,
        dst_stage,
        dst_access,
        aspect,
    })
}

/// Records `old → new` on `image` with an explicit aspect.
///
/// Depth images moving between non-depth layouts (shadow readback) need the
/// caller's aspect; the table alone would pick COLOR.
pub fn record_transition(
    cmd: &CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Result<(), LayoutTransitionError> {
    let info = transition_info(old, new)?;
    let barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(info.src_stage)
        .src_access_mask(info.src_access)
        .dst_stage_mask(info.dst_stage)
        .dst_access_mask(info.dst_access)
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(full_range(aspect));

    cmd.image_barrier(&barrier);
    Ok(())
}

/// Subresource range covering mip 0, layer 0.
pub fn full_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT | vk::Format::D16_UNORM => vk::ImageAspectFlags::DEPTH,
        vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

fn is_depth_layout(layout: vk::ImageLayout) -> bool {
    matches!(
        layout,
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
            | vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use vk::ImageLayout as L;

    #[test]
    fn test_upload_chain_is_supported() {
        let to_dst = transition_info(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(to_dst.src_stage, vk::PipelineStageFlags2::TOP_OF_PIPE);
        assert_eq!(to_dst.dst_access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(to_dst.aspect, vk::ImageAspectFlags::COLOR);

        let to_read = transition_info(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(to_read.src_access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(to_read.dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(to_read.dst_access, vk::AccessFlags2::SHADER_READ);
    }

    #[test]
    fn test_frame_transitions_are_supported() {
        let color = transition_info(L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(
            color.dst_stage,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
        );

        let depth = transition_info(L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(depth.aspect, vk::ImageAspectFlags::DEPTH);
        assert!(depth
            .dst_stage
            .contains(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS));

        let present = transition_info(L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR).unwrap();
        assert_eq!(present.src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(present.dst_access, vk::AccessFlags2::MEMORY_READ);
    }

    #[test]
    fn test_attachment_clears_wait_for_previous_frame() {
        let fragment_tests = vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;

        // Frame N+1 clears the shared depth image while frame N may still write it.
        let depth = transition_info(L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(depth.src_stage, fragment_tests);
        assert_eq!(
            depth.src_access,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert_ne!(depth.src_stage, vk::PipelineStageFlags2::TOP_OF_PIPE);

        // The swapchain image is released by the semaphore waited at color output.
        let color = transition_info(L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(
            color.src_stage,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(color.src_access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn test_shadow_map_transitions() {
        let sample = transition_info(L::DEPTH_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(sample.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(sample.dst_access, vk::AccessFlags2::SHADER_READ);

        let rerender = transition_info(L::SHADER_READ_ONLY_OPTIMAL, L::DEPTH_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(rerender.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(rerender.src_access, vk::AccessFlags2::SHADER_READ);
        assert!(rerender
            .dst_stage
            .contains(vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS));

        let readback = transition_info(L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_SRC_OPTIMAL).unwrap();
        assert_eq!(readback.dst_access, vk::AccessFlags2::TRANSFER_READ);

        let restore = transition_info(L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(restore.src_access, vk::AccessFlags2::TRANSFER_READ);
    }

    #[test]
    fn test_unlisted_transition_fails() {
        let err = transition_info(L::PRESENT_SRC_KHR, L::SHADER_READ_ONLY_OPTIMAL).unwrap_err();
        assert_eq!(
            err,
            LayoutTransitionError::Unsupported {
                old: L::PRESENT_SRC_KHR,
                new: L::SHADER_READ_ONLY_OPTIMAL,
            }
        );
        assert!(transition_info(L::GENERAL, L::GENERAL).is_err());
    }

    #[test]
    fn test_aspect_for_format() {
        assert_eq!(
            aspect_for_format(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_format(vk::Format::R8G8B8A8_SRGB),
            vk::ImageAspectFlags::COLOR
        );
    }
}
