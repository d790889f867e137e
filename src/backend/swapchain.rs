// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Format is the first one the surface reports; present mode is the
// configured one when available, FIFO otherwise.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::{Surface, VulkanDevice};

/// Outcome of asking the swapchain for an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Ready { index: u32, suboptimal: bool },
    /// Surface changed underneath us; recreate before rendering again
    OutOfDate,
}

/// Extent to create the swapchain with.
///
/// When the surface dictates its size (`current_extent` defined) that wins,
/// otherwise the window's drawable size is clamped to what the surface allows.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 means no cap)
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        caps.max_image_count
    } else {
        image_count
    }
}

/// The preferred mode if the surface offers it. FIFO is always supported.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    /// Surface format the swapchain will use on this device
    pub fn surface_format(device: &VulkanDevice, surface: &Surface) -> Result<vk::SurfaceFormatKHR> {
        surface
            .formats(device.physical_device)?
            .first()
            .copied()
            .context("Surface reports no formats")
    }

    pub fn new(
        device: Arc<VulkanDevice>,
        surface: &Surface,
        format: vk::SurfaceFormatKHR,
        preferred_present_mode: vk::PresentModeKHR,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let surface_caps = surface.capabilities(device.physical_device)?;
        let present_modes = surface.present_modes(device.physical_device)?;

        let present_mode = choose_present_mode(&present_modes, preferred_present_mode);
        if present_mode != preferred_present_mode {
            log::warn!(
                "Present mode {:?} not supported, falling back to {:?}",
                preferred_present_mode,
                present_mode
            );
        }

        let extent = choose_extent(&surface_caps, width, height);
        let image_count = choose_image_count(&surface_caps);

        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            image_count,
            format.format,
            present_mode
        );

        let swapchain_loader =
            ash::extensions::khr::Swapchain::new(&device.instance.instance, &device.device);

        let families = device.queue_families;
        let family_indices = [families.graphics, families.present];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        // Images are touched by two queue families when they differ
        create_info = if families.is_shared() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }?;

        log::info!("Created swapchain with {} images", images.len());

        let mut swapchain = Self {
            swapchain,
            swapchain_loader,
            images,
            image_views: Vec::new(),
            extent,
            device,
        };

        // Pushed one at a time so Drop releases whatever was created
        for i in 0..swapchain.images.len() {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(swapchain.images[i])
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { swapchain.device.device.create_image_view(&create_info, None) }
                .context("Failed to create image views!")?;
            swapchain.image_views.push(view);
        }

        Ok(swapchain)
    }

    /// Acquire next image for rendering
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<Acquire> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(Acquire::Ready { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::OutOfDate),
            Err(e) => Err(e).context("Failed to acquire swapchain image"),
        }
    }

    /// Present rendered image to screen. `Ok(true)` means recreate the swapchain.
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphores: &[vk::Semaphore]) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e).context("Failed to present swapchain image"),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn surface_extent_wins_when_defined() {
        let caps = caps((800, 600), (1, 1), (4096, 4096));
        assert_eq!(choose_extent(&caps, 1280, 720), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn drawable_size_used_when_surface_defers() {
        let caps = caps((u32::MAX, u32::MAX), (1, 1), (4096, 4096));
        assert_eq!(choose_extent(&caps, 1280, 720), vk::Extent2D { width: 1280, height: 720 });
    }

    #[test]
    fn drawable_size_clamped_to_limits() {
        let caps = caps((u32::MAX, u32::MAX), (64, 64), (1024, 512));
        assert_eq!(choose_extent(&caps, 2000, 10), vk::Extent2D { width: 1024, height: 64 });
    }

    #[test]
    fn image_count_is_min_plus_one_without_cap() {
        let caps = caps((1, 1), (1, 1), (1, 1));
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_respects_max() {
        let mut caps = caps((1, 1), (1, 1), (1, 1));
        caps.min_image_count = 3;
        caps.max_image_count = 3;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }
}
