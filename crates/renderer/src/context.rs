//! Device context: instance, surface, device, labeler and command pool.
//!
//! Fields are declared in teardown order. `Drop` waits for the device to
//! go idle first; everything built on top of the context (swapchain,
//! managers, passes) must already be gone by then.

use std::sync::Arc;

use tracing::info;

use renderer_core::EngineConfig;
use renderer_platform::{Surface, Window};
use renderer_rhi::command::CommandPool;
use renderer_rhi::debug::DebugUtils;
use renderer_rhi::device::Device;
use renderer_rhi::instance::Instance;
use renderer_rhi::physical_device::select_physical_device;
use renderer_rhi::{DeviceInitError, DeviceInitErrorKind};

use crate::error::RenderResult;

pub struct DeviceContext {
    command_pool: Arc<CommandPool>,
    debug_utils: Arc<DebugUtils>,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
}

impl DeviceContext {
    /// Brings up Vulkan for `window`.
    ///
    /// # Errors
    ///
    /// [`DeviceInitError`] with kind `NoSurface` when the window cannot
    /// provide a surface; the other kinds come from device selection and
    /// creation.
    pub fn new(window: &Window, config: &EngineConfig) -> RenderResult<Self> {
        let extensions = window.required_extensions().map_err(|e| {
            DeviceInitError::new(DeviceInitErrorKind::NoSurface, e.to_string())
        })?;
        let instance = Instance::new(config.validation, &extensions)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| DeviceInitError::new(DeviceInitErrorKind::NoSurface, e.to_string()))?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let debug_utils = Arc::new(DebugUtils::new(&instance, &device));
        let command_pool = Arc::new(CommandPool::new(device.clone(), device.graphics_family())?);

        info!(
            "Device context ready (validation: {})",
            instance.has_validation()
        );

        Ok(Self {
            command_pool,
            debug_utils,
            device,
            surface,
            instance,
        })
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    #[inline]
    pub fn debug_utils(&self) -> &Arc<DebugUtils> {
        &self.debug_utils
    }

    #[inline]
    pub fn command_pool(&self) -> &Arc<CommandPool> {
        &self.command_pool
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle during teardown: {}", e);
        }
        info!("Tearing down device context");
    }
}
