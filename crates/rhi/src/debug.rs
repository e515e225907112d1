//! Debug labels and object names through `VK_EXT_debug_utils`.
//!
//! When validation is disabled the extension is not loaded and every method
//! becomes a no-op, so callers never branch on it.

use std::ffi::CString;

use ash::vk;
use tracing::warn;

use crate::device::Device;
use crate::instance::Instance;

/// Label colours used at pass boundaries.
pub mod colors {
    pub const SHADOW: [f32; 4] = [0.3, 0.3, 0.3, 1.0];
    pub const MAIN: [f32; 4] = [0.2, 0.6, 1.0, 1.0];
    pub const GRID: [f32; 4] = [0.4, 0.9, 0.4, 1.0];
    pub const UI: [f32; 4] = [1.0, 0.7, 0.2, 1.0];
    pub const TRANSITION: [f32; 4] = [0.8, 0.2, 0.8, 1.0];
    pub const FRAME: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
}

pub struct DebugUtils {
    loader: Option<ash::ext::debug_utils::Device>,
}

impl DebugUtils {
    pub fn new(instance: &Instance, device: &Device) -> Self {
        let loader = instance
            .has_validation()
            .then(|| ash::ext::debug_utils::Device::new(instance.handle(), device.handle()));
        Self { loader }
    }

    /// A labeler that records nothing.
    pub fn disabled() -> Self {
        Self { loader: None }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.loader.is_some()
    }

    pub fn begin_label(&self, cmd: vk::CommandBuffer, name: &str, color: [f32; 4]) {
        let Some(loader) = &self.loader else { return };
        let Some(name) = c_name(name) else { return };
        let label = vk::DebugUtilsLabelEXT::default()
            .label_name(&name)
            .color(color);
        unsafe { loader.cmd_begin_debug_utils_label(cmd, &label) };
    }

    pub fn end_label(&self, cmd: vk::CommandBuffer) {
        if let Some(loader) = &self.loader {
            unsafe { loader.cmd_end_debug_utils_label(cmd) };
        }
    }

    pub fn insert_label(&self, cmd: vk::CommandBuffer, name: &str, color: [f32; 4]) {
        let Some(loader) = &self.loader else { return };
        let Some(name) = c_name(name) else { return };
        let label = vk::DebugUtilsLabelEXT::default()
            .label_name(&name)
            .color(color);
        unsafe { loader.cmd_insert_debug_utils_label(cmd, &label) };
    }

    pub fn begin_queue_label(&self, queue: vk::Queue, name: &str, color: [f32; 4]) {
        let Some(loader) = &self.loader else { return };
        let Some(name) = c_name(name) else { return };
        let label = vk::DebugUtilsLabelEXT::default()
            .label_name(&name)
            .color(color);
        unsafe { loader.queue_begin_debug_utils_label(queue, &label) };
    }

    pub fn end_queue_label(&self, queue: vk::Queue) {
        if let Some(loader) = &self.loader {
            unsafe { loader.queue_end_debug_utils_label(queue) };
        }
    }

    /// Attaches `name` to any Vulkan handle for validation messages and
    /// capture tools.
    pub fn set_object_name<H: vk::Handle>(&self, handle: H, name: &str) {
        let Some(loader) = &self.loader else { return };
        let Some(name) = c_name(name) else { return };
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        if let Err(e) = unsafe { loader.set_debug_utils_object_name(&info) } {
            warn!("Failed to name object {:?}: {}", name, e);
        }
    }
}

fn c_name(name: &str) -> Option<CString> {
    CString::new(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_labeler_is_noop() {
        let debug = DebugUtils::disabled();
        assert!(!debug.is_enabled());
        debug.begin_label(vk::CommandBuffer::null(), "Render Pass: Main", colors::MAIN);
        debug.end_label(vk::CommandBuffer::null());
        debug.set_object_name(vk::Image::null(), "SwapchainImage_0");
    }

    #[test]
    fn test_label_names_reject_interior_nul() {
        assert!(c_name("ShadowMap").is_some());
        assert!(c_name("bad\0name").is_none());
    }

    #[test]
    fn test_pass_colors_are_distinct() {
        let all = [colors::SHADOW, colors::MAIN, colors::GRID, colors::UI];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
