// Surface - the window as seen by Vulkan

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanInstance;
use crate::platform::PresentTarget;

pub struct Surface {
    pub handle: vk::SurfaceKHR,
    instance: Arc<VulkanInstance>,
}

impl Surface {
    pub fn new(instance: Arc<VulkanInstance>, target: &dyn PresentTarget) -> Result<Self> {
        let handle = target
            .create_surface(&instance.entry, &instance.instance)
            .context("Failed to create window surface!")?;

        Ok(Self { handle, instance })
    }

    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, family: u32) -> Result<bool> {
        let supported = unsafe {
            self.instance.surface_loader.get_physical_device_surface_support(
                physical_device,
                family,
                self.handle,
            )
        }?;
        Ok(supported)
    }

    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> Result<vk::SurfaceCapabilitiesKHR> {
        let caps = unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.handle)
        }?;
        Ok(caps)
    }

    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<vk::SurfaceFormatKHR>> {
        let formats = unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_formats(physical_device, self.handle)
        }?;
        Ok(formats)
    }

    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<vk::PresentModeKHR>> {
        let modes = unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.handle)
        }?;
        Ok(modes)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.instance.surface_loader.destroy_surface(self.handle, None);
        }
    }
}
