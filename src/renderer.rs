// =============================================================================
// RENDERER - Everything one window needs to draw with Vulkan
// =============================================================================
//
// INIT ORDER:
// instance + debug -> surface -> physical device + queue families -> device
// -> render pass -> graphics pipeline -> command pool -> semaphores
// -> [swapchain + image views -> depth stencil -> framebuffers
//     -> command buffers -> fences]
//
// The bracketed part depends on the window size and is rebuilt as a unit
// when the swapchain goes out of date. Everything else lives as long as the
// renderer.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use crate::backend::{
    commands, depth,
    depth::DepthBuffer,
    pipeline::{self, GraphicsPipeline},
    shader,
    swapchain::Acquire,
    sync::{self, FrameSemaphores},
    Surface, Swapchain, VulkanDevice, VulkanInstance,
};
use crate::config::Config;
use crate::platform::PresentTarget;

/// Handles used to record and submit one swapchain image's frame
#[derive(Debug, Clone, Copy)]
pub struct FrameTarget {
    pub framebuffer: vk::Framebuffer,
    pub command_buffer: vk::CommandBuffer,
    pub fence: vk::Fence,
}

/// Resources sized to the swapchain, rebuilt together
struct SwapchainTargets {
    fences: Vec<vk::Fence>,
    command_buffers: Vec<vk::CommandBuffer>,
    framebuffers: Vec<vk::Framebuffer>,
    depth: DepthBuffer,
    swapchain: Swapchain,
    command_pool: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

impl SwapchainTargets {
    #[allow(clippy::too_many_arguments)]
    fn new(
        device: &Arc<VulkanDevice>,
        surface: &Surface,
        surface_format: vk::SurfaceFormatKHR,
        depth_format: vk::Format,
        present_mode: vk::PresentModeKHR,
        render_pass: vk::RenderPass,
        command_pool: vk::CommandPool,
        (width, height): (u32, u32),
    ) -> Result<Self> {
        let swapchain = Swapchain::new(device.clone(), surface, surface_format, present_mode, width, height)?;
        let depth = DepthBuffer::new(device.clone(), depth_format, swapchain.extent)?;
        let image_count = swapchain.images.len();

        let mut targets = Self {
            fences: Vec::new(),
            command_buffers: Vec::new(),
            framebuffers: Vec::new(),
            depth,
            swapchain,
            command_pool,
            device: device.clone(),
        };

        targets.framebuffers = pipeline::create_framebuffers(
            device,
            &targets.swapchain.image_views,
            targets.depth.view,
            render_pass,
            targets.swapchain.extent,
        )?;
        targets.command_buffers = commands::allocate_command_buffers(device, command_pool, image_count)?;
        targets.fences = sync::create_fences(&device.device, image_count)?;

        Ok(targets)
    }
}

impl Drop for SwapchainTargets {
    fn drop(&mut self) {
        let device = &self.device.device;

        sync::destroy_fences(device, &self.fences);

        unsafe {
            if !self.command_buffers.is_empty() {
                device.free_command_buffers(self.command_pool, &self.command_buffers);
            }
            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
        }
        // depth buffer and swapchain drop after this
    }
}

/// Owns the whole Vulkan stack for one window.
///
/// IMPORTANT: Field order matters for Drop! The surface goes before the
/// device so the last reference to the instance is released last.
pub struct Renderer {
    targets: Option<SwapchainTargets>,
    semaphores: FrameSemaphores,
    pipeline: GraphicsPipeline,
    render_pass: vk::RenderPass,
    command_pool: vk::CommandPool,
    surface_format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    present_mode: vk::PresentModeKHR,
    surface: Surface,
    device: Arc<VulkanDevice>,
}

impl Renderer {
    pub fn new(target: &dyn PresentTarget, config: &Config) -> Result<Self> {
        log::info!("Initializing Vulkan for '{}'...", target.title());

        let extensions = target.required_instance_extensions()?;
        let instance = VulkanInstance::new(target.title(), &extensions, config.validation_enabled())?;
        let surface = Surface::new(instance.clone(), target)?;
        let device = VulkanDevice::new(instance, &surface)?;

        let surface_format = Swapchain::surface_format(&device, &surface)?;
        let depth_format = depth::pick_depth_format(&device)?;
        log::info!(
            "Surface format {:?}/{:?}, depth format {:?}",
            surface_format.format,
            surface_format.color_space,
            depth_format
        );

        // Null until created; destroying a null handle is a no-op, so Drop
        // cleans up whatever a failed step left behind
        let mut renderer = Self {
            targets: None,
            semaphores: FrameSemaphores::default(),
            pipeline: GraphicsPipeline::default(),
            render_pass: vk::RenderPass::null(),
            command_pool: vk::CommandPool::null(),
            surface_format,
            depth_format,
            present_mode: config.present_mode(),
            surface,
            device,
        };

        renderer.render_pass = pipeline::create_render_pass(&renderer.device, surface_format.format, depth_format)?;
        renderer.pipeline = Self::build_pipeline(&renderer.device, renderer.render_pass, config)?;
        renderer.command_pool = commands::create_command_pool(&renderer.device)?;
        renderer.semaphores = FrameSemaphores::new(&renderer.device.device)?;

        renderer.build_targets(target.drawable_size())?;

        log::info!("Vulkan initialized successfully!");
        Ok(renderer)
    }

    fn build_pipeline(
        device: &VulkanDevice,
        render_pass: vk::RenderPass,
        config: &Config,
    ) -> Result<GraphicsPipeline> {
        let vert = shader::load_shader_module(device, &config.graphics.vertex_shader)?;
        let frag = match shader::load_shader_module(device, &config.graphics.fragment_shader) {
            Ok(frag) => frag,
            Err(e) => {
                unsafe { device.device.destroy_shader_module(vert, None) };
                return Err(e);
            }
        };

        let pipeline = pipeline::create_graphics_pipeline(device, render_pass, vert, frag);

        // Modules are compiled into the pipeline and no longer needed
        unsafe {
            device.device.destroy_shader_module(frag, None);
            device.device.destroy_shader_module(vert, None);
        }

        pipeline
    }

    /// Build swapchain-sized resources. A zero-area window gets none.
    fn build_targets(&mut self, drawable: (u32, u32)) -> Result<bool> {
        self.targets = None;

        if drawable.0 == 0 || drawable.1 == 0 {
            log::debug!("Window has no area, deferring swapchain creation");
            return Ok(false);
        }

        let caps = self.surface.capabilities(self.device.physical_device)?;
        if caps.current_extent.width == 0 || caps.current_extent.height == 0 {
            log::debug!("Surface has no area, deferring swapchain creation");
            return Ok(false);
        }

        self.targets = Some(SwapchainTargets::new(
            &self.device,
            &self.surface,
            self.surface_format,
            self.depth_format,
            self.present_mode,
            self.render_pass,
            self.command_pool,
            drawable,
        )?);

        Ok(true)
    }

    /// Throw away and rebuild everything sized to the swapchain.
    /// Returns false if the window currently has no area.
    pub fn recreate_swapchain(&mut self, drawable: (u32, u32)) -> Result<bool> {
        self.device.wait_idle()?;
        self.build_targets(drawable)
    }

    pub fn has_swapchain(&self) -> bool {
        self.targets.is_some()
    }

    fn targets(&self) -> Result<&SwapchainTargets> {
        self.targets.as_ref().context("Swapchain not initialized")
    }

    pub fn device(&self) -> &VulkanDevice {
        &self.device
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.pipeline
    }

    pub fn semaphores(&self) -> &FrameSemaphores {
        &self.semaphores
    }

    pub fn extent(&self) -> Result<vk::Extent2D> {
        Ok(self.targets()?.swapchain.extent)
    }

    pub fn acquire_next_image(&self) -> Result<Acquire> {
        self.targets()?
            .swapchain
            .acquire_next_image(u64::MAX, self.semaphores.image_available)
    }

    pub fn frame(&self, image_index: u32) -> Result<FrameTarget> {
        let targets = self.targets()?;
        let i = image_index as usize;

        match (
            targets.framebuffers.get(i),
            targets.command_buffers.get(i),
            targets.fences.get(i),
        ) {
            (Some(&framebuffer), Some(&command_buffer), Some(&fence)) => Ok(FrameTarget {
                framebuffer,
                command_buffer,
                fence,
            }),
            _ => anyhow::bail!("Swapchain image index {} out of range", image_index),
        }
    }

    /// Present `image_index` once rendering finishes. `Ok(true)` means recreate.
    pub fn present(&self, image_index: u32) -> Result<bool> {
        self.targets()?.swapchain.present(
            self.device.present_queue,
            image_index,
            &[self.semaphores.render_finished],
        )
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        let _ = self.device.wait_idle();

        self.targets = None;

        let device = &self.device.device;
        self.semaphores.destroy(device);
        self.pipeline.destroy(device);
        unsafe {
            device.destroy_render_pass(self.render_pass, None);
            device.destroy_command_pool(self.command_pool, None);
        }

        // Surface, then device, then (through the last Arc) the instance
    }
}
