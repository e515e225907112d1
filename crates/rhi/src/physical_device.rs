//! Physical device (GPU) selection.
//!
//! A GPU is suitable when it:
//! 1. Exposes Vulkan 1.3
//! 2. Has graphics and present queue families
//! 3. Supports swapchains
//! 4. Supports every feature in [`RequiredFeatures`]
//!
//! Among suitable GPUs, discrete devices are preferred.

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{DeviceInitError, DeviceInitErrorKind, RhiError};

/// Queue family indices for graphics and presentation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks if both graphics and present families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the unique queue family indices. Graphics and present may share
    /// a family, in which case only one queue is created.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }
}

/// Feature bits the renderer cannot run without.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequiredFeatures {
    pub dynamic_rendering: bool,
    pub synchronization2: bool,
    pub buffer_device_address: bool,
    pub descriptor_indexing: bool,
    pub fill_mode_non_solid: bool,
    pub wide_lines: bool,
}

impl RequiredFeatures {
    /// Query the supported subset from a device.
    pub fn query(instance: &ash::Instance, device: vk::PhysicalDevice) -> Self {
        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);

        unsafe { instance.get_physical_device_features2(device, &mut features2) };
        let base = features2.features;

        Self {
            dynamic_rendering: features_1_3.dynamic_rendering == vk::TRUE,
            synchronization2: features_1_3.synchronization2 == vk::TRUE,
            buffer_device_address: features_1_2.buffer_device_address == vk::TRUE,
            descriptor_indexing: features_1_2.descriptor_indexing == vk::TRUE,
            fill_mode_non_solid: base.fill_mode_non_solid == vk::TRUE,
            wide_lines: base.wide_lines == vk::TRUE,
        }
    }

    /// Names of required features this device lacks.
    pub fn missing(&self) -> Vec<&'static str> {
        let checks = [
            (self.dynamic_rendering, "dynamicRendering"),
            (self.synchronization2, "synchronization2"),
            (self.buffer_device_address, "bufferDeviceAddress"),
            (self.descriptor_indexing, "descriptorIndexing"),
            (self.fill_mode_non_solid, "fillModeNonSolid"),
            (self.wide_lines, "wideLines"),
        ];
        checks
            .into_iter()
            .filter(|(supported, _)| !supported)
            .map(|(_, name)| name)
            .collect()
    }
}

/// Information about the selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Why a candidate GPU was rejected. The most specific reason across all
/// candidates becomes the [`DeviceInitErrorKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Rejection {
    ApiVersion,
    Queues,
    Features(Vec<&'static str>),
}

/// Selects the most suitable physical device for rendering.
///
/// # Errors
///
/// Returns a [`DeviceInitError`] of kind `NoSuitableGpu` when no GPU exists
/// or none is Vulkan 1.3 capable, `QueueMissing` when the best candidate
/// lacks graphics or present support, and `FeatureMissing` when it lacks a
/// required feature.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(
            DeviceInitError::new(DeviceInitErrorKind::NoSuitableGpu, "no Vulkan devices").into(),
        );
    }

    info!("Found {} GPU(s)", devices.len());

    let mut suitable_devices: Vec<(PhysicalDeviceInfo, u32)> = Vec::new();
    let mut rejections = Vec::new();

    for device in devices {
        match check_device_suitability(instance, device, surface, surface_loader) {
            Ok(info) => {
                let score = rate_device(&info);
                debug!(
                    "GPU '{}' ({}) - Score: {}",
                    info.device_name(),
                    info.device_type_name(),
                    score
                );
                suitable_devices.push((info, score));
            }
            Err(rejection) => rejections.push(rejection),
        }
    }

    suitable_devices.sort_by(|a, b| b.1.cmp(&a.1));
    let Some((selected_device, score)) = suitable_devices.into_iter().next() else {
        warn!("No suitable GPU found with required capabilities");
        return Err(rejection_error(&rejections).into());
    };

    let (major, minor, patch) = selected_device.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}",
        selected_device.device_name(),
        selected_device.device_type_name(),
        major,
        minor,
        patch,
        score
    );

    Ok(selected_device)
}

fn rejection_error(rejections: &[Rejection]) -> DeviceInitError {
    if let Some(Rejection::Features(missing)) = rejections
        .iter()
        .find(|r| matches!(r, Rejection::Features(_)))
    {
        return DeviceInitError::new(
            DeviceInitErrorKind::FeatureMissing,
            format!("missing features: {}", missing.join(", ")),
        );
    }
    if rejections.contains(&Rejection::Queues) {
        return DeviceInitError::new(
            DeviceInitErrorKind::QueueMissing,
            "no device exposes both graphics and present queues",
        );
    }
    DeviceInitError::new(
        DeviceInitErrorKind::NoSuitableGpu,
        "no device supports Vulkan 1.3",
    )
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, Rejection> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let device_name = properties
        .device_name_as_c_str()
        .ok()
        .and_then(|name| name.to_str().ok())
        .unwrap_or("Unknown");

    let major = vk::api_version_major(properties.api_version);
    let minor = vk::api_version_minor(properties.api_version);
    if major < 1 || (major == 1 && minor < 3) {
        debug!(
            "GPU '{}' skipped: Vulkan 1.3 not supported (version: {}.{})",
            device_name, major, minor
        );
        return Err(Rejection::ApiVersion);
    }

    let queue_families = find_queue_families(instance, device, surface, surface_loader);
    if !queue_families.is_complete() || !supports_swapchain(instance, device) {
        debug!(
            "GPU '{}' skipped: missing required queue families (graphics={}, present={})",
            device_name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return Err(Rejection::Queues);
    }

    let missing = RequiredFeatures::query(instance, device).missing();
    if !missing.is_empty() {
        debug!("GPU '{}' skipped: missing features {:?}", device_name, missing);
        return Err(Rejection::Features(missing));
    }

    Ok(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_families,
    })
}

fn supports_swapchain(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let Ok(extensions) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
        return false;
    };
    extensions.iter().any(|ext| {
        ext.extension_name_as_c_str()
            .is_ok_and(|name| name == ash::khr::swapchain::NAME)
    })
}

/// Finds graphics and present queue families, preferring one family that
/// does both.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();

    for (i, family) in queue_families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        let has_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let present_support = unsafe {
            surface_loader
                .get_physical_device_surface_support(device, i, surface)
                .unwrap_or(false)
        };

        if has_graphics && present_support {
            return QueueFamilyIndices {
                graphics_family: Some(i),
                present_family: Some(i),
            };
        }
        if has_graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }
        if present_support && indices.present_family.is_none() {
            indices.present_family = Some(i);
        }
    }

    indices
}

/// Rates a physical device; higher is better.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    score += info.properties.limits.max_image_dimension2_d;

    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16000);

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_features() -> RequiredFeatures {
        RequiredFeatures {
            dynamic_rendering: true,
            synchronization2: true,
            buffer_device_address: true,
            descriptor_indexing: true,
            fill_mode_non_solid: true,
            wide_lines: true,
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        assert!(indices.unique_families().is_empty());
    }

    #[test]
    fn shared_family_is_created_once() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert!(indices.is_complete());
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn separate_families_are_both_listed() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(indices.unique_families(), vec![0, 2]);
    }

    #[test]
    fn complete_feature_set_has_nothing_missing() {
        assert!(all_features().missing().is_empty());
    }

    #[test]
    fn missing_features_are_named() {
        let features = RequiredFeatures {
            wide_lines: false,
            synchronization2: false,
            ..all_features()
        };
        assert_eq!(features.missing(), vec!["synchronization2", "wideLines"]);
    }

    #[test]
    fn feature_rejection_wins_over_queue_rejection() {
        let err = rejection_error(&[Rejection::Queues, Rejection::Features(vec!["wideLines"])]);
        assert_eq!(err.kind, DeviceInitErrorKind::FeatureMissing);
        assert!(err.cause.contains("wideLines"));

        let err = rejection_error(&[Rejection::ApiVersion, Rejection::Queues]);
        assert_eq!(err.kind, DeviceInitErrorKind::QueueMissing);

        let err = rejection_error(&[Rejection::ApiVersion]);
        assert_eq!(err.kind, DeviceInitErrorKind::NoSuitableGpu);
    }
}
