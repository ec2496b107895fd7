//! Physical device (GPU) selection and memory type lookup.
//!
//! Selection rejects any GPU that lacks:
//! 1. A graphics queue family and a family that can present to the surface
//! 2. The device extensions in [`REQUIRED_DEVICE_EXTENSIONS`]
//! 3. Sampler anisotropy and Vulkan 1.3
//! 4. At least one surface format and present mode
//!
//! Remaining candidates are scored and the highest wins, so discrete GPUs are
//! preferred over integrated ones.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::swapchain::SwapchainSupportDetails;

/// Device extensions every selected GPU must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 2] =
    [ash::khr::swapchain::NAME, ash::khr::dynamic_rendering::NAME];

/// Queue family indices for graphics and presentation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both graphics and present families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns `(graphics, present)` or an error when either is missing.
    pub fn require(&self) -> RhiResult<(u32, u32)> {
        match (self.graphics_family, self.present_family) {
            (Some(graphics), Some(present)) => Ok((graphics, present)),
            _ => Err(RhiError::NoSuitableGpu),
        }
    }

    /// Distinct family indices, graphics first.
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

/// Information about the selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name.
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

    /// Total device-local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    /// See [`find_memory_type`].
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<u32> {
        find_memory_type(&self.memory_properties, type_filter, properties)
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Finds a memory type index allowed by `type_filter` that has every flag in `properties`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableMemoryType`] when no type qualifies.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> RhiResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            type_filter & (1 << i) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(RhiError::NoSuitableMemoryType {
            type_filter,
            properties,
        })
}

/// Selects the most suitable physical device for rendering to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU meets the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let selected = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .map(|info| {
            let score = rate_device(&info);
            debug!("GPU '{}' ({}) scored {}", info.device_name(), info.device_type_name(), score);
            (info, score)
        })
        .max_by_key(|(_, score)| *score);

    match selected {
        Some((info, score)) => {
            info!(
                "Selected GPU: '{}' ({}), score {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            Ok(info)
        }
        None => {
            warn!("No GPU satisfies the queue, extension and feature requirements");
            Err(RhiError::NoSuitableGpu)
        }
    }
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let name = properties
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let queue_families = find_queue_families(instance, device, surface, surface_loader);
    if !queue_families.is_complete() {
        debug!("GPU '{}' skipped: missing graphics or present queue", name);
        return None;
    }

    let available = unsafe {
        instance
            .enumerate_device_extension_properties(device)
            .unwrap_or_default()
    };
    let available: Vec<&CStr> = available
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .collect();
    if let Some(missing) = missing_extension(&available) {
        debug!("GPU '{}' skipped: missing extension {:?}", name, missing);
        return None;
    }

    if features.sampler_anisotropy == vk::FALSE {
        debug!("GPU '{}' skipped: sampler anisotropy not supported", name);
        return None;
    }

    if !supports_vulkan_1_3(properties.api_version) {
        debug!("GPU '{}' skipped: Vulkan 1.3 not supported", name);
        return None;
    }

    let adequate = SwapchainSupportDetails::query(device, surface, surface_loader)
        .map(|details| details.is_adequate())
        .unwrap_or(false);
    if !adequate {
        debug!("GPU '{}' skipped: no surface formats or present modes", name);
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
    })
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(i);
        }

        if indices.present_family.is_none() {
            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, i, surface)
                    .unwrap_or(false)
            };
            if present_support {
                indices.present_family = Some(i);
            }
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// First required extension absent from `available`.
fn missing_extension(available: &[&CStr]) -> Option<&'static CStr> {
    REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .copied()
        .find(|required| !available.contains(required))
}

fn supports_vulkan_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

fn rate_device(info: &PhysicalDeviceInfo) -> u64 {
    let type_score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    let vram_mb = (info.device_local_memory() / (1024 * 1024)).min(16_000);
    type_score + u64::from(info.properties.limits.max_image_dimension2_d) + vram_mb
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &f) in flags.iter().enumerate() {
            props.memory_types[i].property_flags = f;
        }
        props
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        assert!(matches!(indices.require(), Err(RhiError::NoSuitableGpu)));
    }

    #[test]
    fn test_queue_family_require() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(indices.require().unwrap(), (0, 2));
        assert_eq!(indices.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_unique_families_shared() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(1),
            present_family: Some(1),
        };
        assert_eq!(indices.unique_families(), vec![1]);
    }

    #[test]
    fn test_find_memory_type_respects_filter() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, host]);

        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap(),
            1
        );
        assert_eq!(
            find_memory_type(&props, 0b100, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap(),
            2
        );
    }

    #[test]
    fn test_find_memory_type_fails_fast() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let result = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(
            result,
            Err(RhiError::NoSuitableMemoryType { type_filter: 1, .. })
        ));
    }

    #[test]
    fn test_missing_extension() {
        assert_eq!(missing_extension(&REQUIRED_DEVICE_EXTENSIONS), None);
        assert_eq!(
            missing_extension(&[ash::khr::swapchain::NAME]),
            Some(ash::khr::dynamic_rendering::NAME)
        );
    }

    #[test]
    fn test_vulkan_version_gate() {
        assert!(supports_vulkan_1_3(vk::make_api_version(0, 1, 3, 0)));
        assert!(supports_vulkan_1_3(vk::make_api_version(0, 1, 4, 0)));
        assert!(!supports_vulkan_1_3(vk::make_api_version(0, 1, 2, 198)));
    }
}
