// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (first enumerated, no scoring)
// - Graphics + present queue family selection
// - Logical device + queue creation

use anyhow::{bail, Context, Result};
use ash::vk;
use std::collections::BTreeSet;
use std::ffi::CStr;
use std::sync::Arc;

use super::{Surface, VulkanInstance};

/// Queue family indices the renderer submits and presents on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, one queue is created per entry
    pub fn unique(&self) -> Vec<u32> {
        BTreeSet::from([self.graphics, self.present]).into_iter().collect()
    }
}

/// What queue family selection needs to know about one family
#[derive(Debug, Clone, Copy)]
pub struct QueueFamilyCandidate {
    pub queue_count: u32,
    pub flags: vk::QueueFlags,
    pub present_supported: bool,
}

/// First family with graphics support and first family that can present.
pub fn select_queue_families(families: &[QueueFamilyCandidate]) -> Option<QueueFamilies> {
    let usable = |family: &QueueFamilyCandidate| family.queue_count > 0;

    let graphics = families
        .iter()
        .position(|family| usable(family) && family.flags.contains(vk::QueueFlags::GRAPHICS))?;
    let present = families
        .iter()
        .position(|family| usable(family) && family.present_supported)?;

    Some(QueueFamilies {
        graphics: graphics as u32,
        present: present as u32,
    })
}

/// Index of the first memory type allowed by `type_filter` that has all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        let has_type = (type_filter & (1 << i)) != 0;
        let has_properties = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);
        has_type && has_properties
    })
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    // Cached for memory type lookups
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,

    pub instance: Arc<VulkanInstance>,
}

impl VulkanDevice {
    pub fn new(instance: Arc<VulkanInstance>, surface: &Surface) -> Result<Arc<Self>> {
        let physical_device = Self::select_physical_device(&instance.instance)?;

        let properties = unsafe { instance.instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.instance.get_physical_device_memory_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let queue_families = Self::select_queue_families(&instance, physical_device, surface)?;
        log::info!(
            "Queue families: graphics {}, present {}",
            queue_families.graphics,
            queue_families.present
        );

        let device = Self::create_logical_device(&instance, physical_device, queue_families)?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        Ok(Arc::new(Self {
            device,
            physical_device,
            queue_families,
            graphics_queue,
            present_queue,
            memory_properties,
            instance,
        }))
    }

    fn select_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        match devices.first() {
            Some(&device) => Ok(device),
            None => bail!("Failed to select a physical device!"),
        }
    }

    fn select_queue_families(
        instance: &VulkanInstance,
        physical_device: vk::PhysicalDevice,
        surface: &Surface,
    ) -> Result<QueueFamilies> {
        let properties = unsafe {
            instance
                .instance
                .get_physical_device_queue_family_properties(physical_device)
        };

        let candidates = properties
            .iter()
            .enumerate()
            .map(|(i, family)| {
                Ok(QueueFamilyCandidate {
                    queue_count: family.queue_count,
                    flags: family.queue_flags,
                    present_supported: surface.supports_present(physical_device, i as u32)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        select_queue_families(&candidates)
            .context("No queue family supports both graphics and presentation to this surface")
    }

    fn create_logical_device(
        instance: &VulkanInstance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilies,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions = [ash::extensions::khr::Swapchain::name().as_ptr()];
        let layers = instance.enabled_layers();
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers)
            .enabled_features(&features);

        let device = unsafe { instance.instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create device!")?;

        Ok(device)
    }

    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> Result<u32> {
        find_memory_type(&self.memory_properties, type_filter, properties)
            .context("Failed to find suitable memory type!")
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        unsafe {
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(queue_count: u32, flags: vk::QueueFlags, present_supported: bool) -> QueueFamilyCandidate {
        QueueFamilyCandidate {
            queue_count,
            flags,
            present_supported,
        }
    }

    #[test]
    fn single_family_serves_both_roles() {
        let families = [family(16, vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true)];
        let selected = select_queue_families(&families).unwrap();
        assert_eq!(selected, QueueFamilies { graphics: 0, present: 0 });
        assert!(selected.is_shared());
        assert_eq!(selected.unique(), vec![0]);
    }

    #[test]
    fn graphics_and_present_may_differ() {
        let families = [
            family(1, vk::QueueFlags::TRANSFER, false),
            family(4, vk::QueueFlags::GRAPHICS, false),
            family(2, vk::QueueFlags::COMPUTE, true),
        ];
        let selected = select_queue_families(&families).unwrap();
        assert_eq!(selected, QueueFamilies { graphics: 1, present: 2 });
        assert!(!selected.is_shared());
        assert_eq!(selected.unique(), vec![1, 2]);
    }

    #[test]
    fn first_matching_family_wins() {
        let families = [
            family(1, vk::QueueFlags::GRAPHICS, true),
            family(8, vk::QueueFlags::GRAPHICS, true),
        ];
        assert_eq!(
            select_queue_families(&families),
            Some(QueueFamilies { graphics: 0, present: 0 })
        );
    }

    #[test]
    fn empty_families_are_skipped() {
        let families = [
            family(0, vk::QueueFlags::GRAPHICS, true),
            family(1, vk::QueueFlags::GRAPHICS, true),
        ];
        assert_eq!(
            select_queue_families(&families),
            Some(QueueFamilies { graphics: 1, present: 1 })
        );
    }

    #[test]
    fn no_presenting_family_is_none() {
        let families = [family(4, vk::QueueFlags::GRAPHICS, false)];
        assert_eq!(select_queue_families(&families), None);
    }

    #[test]
    fn no_graphics_family_is_none() {
        let families = [family(4, vk::QueueFlags::COMPUTE, true)];
        assert_eq!(select_queue_families(&families), None);
    }

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = types.len() as u32;
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        props
    }

    #[test]
    fn memory_type_respects_filter_and_flags() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(1)
        );
        // Type 1 filtered out by the resource
        assert_eq!(
            find_memory_type(&props, 0b101, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(2)
        );
        assert_eq!(
            find_memory_type(&props, 0b001, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            None
        );
    }

    #[test]
    fn memory_type_ignores_entries_past_count() {
        let mut props = memory_properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        assert_eq!(
            find_memory_type(&props, u32::MAX, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            None
        );
    }
}
