// Synchronization primitives
//
// One frame in flight: a single pair of semaphores for acquire/present, and
// one fence per swapchain image guarding its command buffer.

use anyhow::{Context, Result};
use ash::vk;

/// Semaphores shared by every frame. The default holds null handles,
/// which `destroy` accepts.
#[derive(Debug, Default)]
pub struct FrameSemaphores {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

impl FrameSemaphores {
    pub fn new(device: &ash::Device) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();

        unsafe {
            let image_available = device
                .create_semaphore(&semaphore_info, None)
                .context("Failed to create semaphore!")?;
            let render_finished = match device.create_semaphore(&semaphore_info, None) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    device.destroy_semaphore(image_available, None);
                    return Err(e).context("Failed to create semaphore!");
                }
            };

            Ok(Self {
                image_available,
                render_finished,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
        }
    }
}

/// `count` fences, created signaled so the first wait on each returns at once
pub fn create_fences(device: &ash::Device, count: usize) -> Result<Vec<vk::Fence>> {
    let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

    let mut fences = Vec::with_capacity(count);
    for _ in 0..count {
        match unsafe { device.create_fence(&fence_info, None) } {
            Ok(fence) => fences.push(fence),
            Err(e) => {
                destroy_fences(device, &fences);
                return Err(e).context("Failed to create fence!");
            }
        }
    }

    Ok(fences)
}

pub fn destroy_fences(device: &ash::Device, fences: &[vk::Fence]) {
    unsafe {
        for &fence in fences {
            device.destroy_fence(fence, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_semaphores_are_null() {
        let semaphores = FrameSemaphores::default();
        assert_eq!(semaphores.image_available, vk::Semaphore::null());
        assert_eq!(semaphores.render_finished, vk::Semaphore::null());
    }
}
