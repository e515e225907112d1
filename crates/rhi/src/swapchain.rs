//! Swapchain management.
//!
//! The [`Swapchain`] owns the VkSwapchainKHR and one view per image. It is
//! created once at startup and recreated in place when the surface goes
//! out of date or the window is resized. The depth image sized to the
//! swapchain lives in the renderer and is rebuilt alongside it.

use std::sync::Arc;

use ash::vk;
use renderer_core::config::PresentModeConfig;
use tracing::{debug, info, warn};

use crate::debug::DebugUtils;
use crate::device::Device;
use crate::error::{DeviceInitError, DeviceInitErrorKind, RhiError, RhiResult};
use crate::image::full_range;
use crate::instance::Instance;

/// Surface capabilities, formats and present modes for one GPU.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count {}..{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Parameters that survive recreation.
#[derive(Clone, Copy, Debug)]
struct SwapchainParams {
    surface: vk::SurfaceKHR,
    present_mode: PresentModeConfig,
}

/// Vulkan swapchain wrapper.
///
/// Images are owned by the swapchain. Views are owned here and destroyed
/// before the swapchain they belong to.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    params: SwapchainParams,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates the first swapchain for `surface`.
    ///
    /// The color format prefers B8G8R8A8_UNORM / SRGB_NONLINEAR. The present
    /// mode is `present_mode` when the surface supports it, FIFO otherwise.
    /// Images carry COLOR_ATTACHMENT and TRANSFER_DST usage.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        debug_utils: &DebugUtils,
        surface: vk::SurfaceKHR,
        present_mode: PresentModeConfig,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let mut swapchain = Self {
            swapchain_loader: ash::khr::swapchain::Device::new(instance.handle(), device.handle()),
            surface_loader: ash::khr::surface::Instance::new(instance.entry(), instance.handle()),
            device,
            params: SwapchainParams {
                surface,
                present_mode,
            },
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: vk::Format::UNDEFINED,
            extent: vk::Extent2D::default(),
            present_mode: vk::PresentModeKHR::FIFO,
        };
        swapchain.build(debug_utils, width, height)?;

        info!(
            "Swapchain created: {}x{}, {:?}, {:?}, {} images",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.format,
            swapchain.present_mode,
            swapchain.images.len()
        );
        Ok(swapchain)
    }

    /// Rebuilds the swapchain for a new framebuffer size.
    ///
    /// Waits for the device to go idle, destroys the old views, creates the
    /// new swapchain with the old one as `old_swapchain` and then destroys
    /// the old handle.
    pub fn recreate(&mut self, debug_utils: &DebugUtils, width: u32, height: u32) -> RhiResult<()> {
        self.device.wait_idle()?;
        self.destroy_image_views();

        let old = self.swapchain;
        let result = self.build(debug_utils, width, height);
        if old != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_loader.destroy_swapchain(old, None) };
        }
        if result.is_err() {
            self.swapchain = vk::SwapchainKHR::null();
        }
        result?;

        info!(
            "Swapchain recreated: {}x{}, {} images",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
        Ok(())
    }

    fn build(&mut self, debug_utils: &DebugUtils, width: u32, height: u32) -> RhiResult<()> {
        let support = SwapchainSupportDetails::query(
            self.device.physical_device(),
            self.params.surface,
            &self.surface_loader,
        )?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "surface reports no formats or present modes".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats)
            .ok_or_else(|| RhiError::SwapchainError("no surface format".to_string()))?;
        let present_mode =
            choose_present_mode(&support.present_modes, requested_mode(self.params.present_mode));
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);

        let families = self.device.queue_families();
        let (Some(graphics_family), Some(present_family)) =
            (families.graphics_family, families.present_family)
        else {
            return Err(
                DeviceInitError::new(DeviceInitErrorKind::QueueMissing, "swapchain queues").into(),
            );
        };
        let family_indices = [graphics_family, present_family];
        let (sharing_mode, shared_families) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, &family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.params.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };
        let images = match unsafe { self.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };

        self.swapchain = swapchain;
        self.images = images;
        self.format = surface_format.format;
        self.extent = extent;
        self.present_mode = present_mode;
        self.image_views = create_image_views(&self.device, &self.images, self.format)?;

        for (i, (&image, &view)) in self.images.iter().zip(&self.image_views).enumerate() {
            debug_utils.set_object_name(image, &format!("SwapchainImage_{}", i));
            debug_utils.set_object_name(view, &format!("SwapchainImageView_{}", i));
        }
        Ok(())
    }

    /// Acquires the next image, signalling `semaphore` when it is ready.
    ///
    /// Returns `(index, suboptimal)`. `ERROR_OUT_OF_DATE_KHR` is passed
    /// through for the scheduler to handle.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Presents `image_index` after `wait_semaphore`. Returns `true` when
    /// the swapchain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn image(&self, index: usize) -> Option<vk::Image> {
        self.images.get(index).copied()
    }

    pub fn image_view(&self, index: usize) -> Option<vk::ImageView> {
        self.image_views.get(index).copied()
    }

    fn destroy_image_views(&mut self) {
        for &view in &self.image_views {
            unsafe { self.device.handle().destroy_image_view(view, None) };
        }
        self.image_views.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
            debug!(
                "Swapchain destroyed ({}x{}, {} images)",
                self.extent.width,
                self.extent.height,
                self.images.len()
            );
        }
    }
}

fn requested_mode(mode: PresentModeConfig) -> vk::PresentModeKHR {
    match mode {
        PresentModeConfig::Fifo => vk::PresentModeKHR::FIFO,
        PresentModeConfig::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        PresentModeConfig::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModeConfig::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

/// B8G8R8A8_UNORM with SRGB_NONLINEAR if offered, else the first format.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });
    if let Some(&format) = preferred {
        return Some(format);
    }

    let first = formats.first().copied();
    if let Some(format) = first {
        warn!("B8G8R8A8_UNORM unavailable, using {:?}", format.format);
    }
    first
}

/// The requested mode when available. FIFO is always supported.
fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    requested: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&requested) {
        return requested;
    }
    warn!("Present mode {:?} unsupported, falling back to FIFO", requested);
    vk::PresentModeKHR::FIFO
}

/// Uses the surface's current extent when it is defined, otherwise clamps
/// the window size to the surface limits.
fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum when there is one.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(full_range(vk::ImageAspectFlags::COLOR));

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => views.push(view),
            Err(e) => {
                for view in views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::ResourceCreation(format!(
                    "SwapchainImageView_{} ({})",
                    i, e
                )));
            }
        }
    }

    debug!("Created {} swapchain image views", views.len());
    Ok(views)
}
