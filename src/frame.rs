// =============================================================================
// FRAME DRAWER - One frame, start to finish
// =============================================================================
//
// FRAME TIMELINE:
// ┌────────────────────────────────────────────────────────────────────────┐
// │ acquire -> wait fence -> reset + record -> submit -> present -> idle   │
// │                                                                        │
// │ record = begin pass (clear) -> bind pipeline -> viewport/scissor       │
// │          -> draw 3 vertices -> end pass                                │
// └────────────────────────────────────────────────────────────────────────┘
//
// Only one frame is ever in flight: present is followed by a wait for the
// present queue to go idle.

use anyhow::{Context, Result};
use ash::vk;
use std::time::{Duration, Instant};

use crate::backend::swapchain::Acquire;
use crate::config::{ClearColor, Config};
use crate::platform::PresentTarget;
use crate::renderer::{FrameTarget, Renderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// Nothing drawn (minimized, or the swapchain had to be rebuilt)
    Skipped,
}

/// Command buffers are re-recorded every frame after their fence signals
pub const RECORD_FLAGS: vk::CommandBufferUsageFlags = vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;

/// Map 0-255 components to the 0.0-1.0 floats Vulkan expects
pub fn clear_color_rgba8(r: u8, g: u8, b: u8, a: u8) -> vk::ClearColorValue {
    vk::ClearColorValue {
        float32: [r, g, b, a].map(|c| f32::from(c) / 255.0),
    }
}

/// Viewport covering `scale` of the extent from the top-left, and a scissor
/// over the whole pixels inside it
pub fn viewport_and_scissor(extent: vk::Extent2D, scale: [f32; 2]) -> (vk::Viewport, vk::Rect2D) {
    let [sx, sy] = scale.map(|s| s.clamp(0.0, 1.0));
    let width = extent.width as f32 * sx;
    let height = extent.height as f32 * sy;

    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width,
        height,
        min_depth: 0.0,
        max_depth: 1.0,
    };

    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: vk::Extent2D {
            width: width as u32,
            height: height as u32,
        },
    };

    (viewport, scissor)
}

/// Vulkan rejects viewports with a zero dimension
pub fn is_drawable(viewport: &vk::Viewport) -> bool {
    viewport.width > 0.0 && viewport.height > 0.0
}

pub struct FrameDrawer {
    renderer: Renderer,
    clear_color: vk::ClearColorValue,
    clear_depth_stencil: vk::ClearDepthStencilValue,
    viewport_scale: [f32; 2],
    needs_recreate: bool,
    wait_stages: [vk::PipelineStageFlags; 1],
}

impl FrameDrawer {
    pub fn new(target: &dyn PresentTarget, config: &Config) -> Result<Self> {
        let renderer = Renderer::new(target, config)?;

        let mut drawer = Self {
            renderer,
            clear_color: clear_color_rgba8(0, 0, 0, 255),
            clear_depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
            viewport_scale: config.graphics.viewport_scale,
            needs_recreate: false,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
        };

        match config.graphics.clear_color {
            ClearColor::Rgba([r, g, b, a]) => drawer.set_clear_color(r, g, b, a),
            ClearColor::Rgb([r, g, b]) => drawer.set_clear_color_rgb(r, g, b),
        }

        Ok(drawer)
    }

    pub fn set_clear_color(&mut self, r: u8, g: u8, b: u8, a: u8) {
        self.clear_color = clear_color_rgba8(r, g, b, a);
    }

    pub fn set_clear_color_rgb(&mut self, r: u8, g: u8, b: u8) {
        self.set_clear_color(r, g, b, 255);
    }

    /// The window changed size; rebuild the swapchain before the next frame
    pub fn request_recreate(&mut self) {
        self.needs_recreate = true;
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.renderer.wait_idle()
    }

    /// Draw and present one frame for a window whose framebuffer is `drawable`.
    pub fn next_frame(&mut self, drawable: (u32, u32)) -> Result<FrameStatus> {
        if drawable.0 == 0 || drawable.1 == 0 {
            return Ok(FrameStatus::Skipped);
        }

        if self.needs_recreate || !self.renderer.has_swapchain() {
            if !self.renderer.recreate_swapchain(drawable)? {
                return Ok(FrameStatus::Skipped);
            }
            self.needs_recreate = false;
        }

        let image_index = match self.renderer.acquire_next_image()? {
            Acquire::Ready { index, suboptimal } => {
                if suboptimal {
                    self.needs_recreate = true;
                }
                index
            }
            Acquire::OutOfDate => {
                self.needs_recreate = true;
                return Ok(FrameStatus::Skipped);
            }
        };

        let frame = self.renderer.frame(image_index)?;

        self.wait_for_frame(&frame)?;
        self.record(&frame)?;
        self.submit(&frame)?;

        if self.renderer.present(image_index)? {
            self.needs_recreate = true;
        }

        let device = self.renderer.device();
        unsafe { device.device.queue_wait_idle(device.present_queue) }.context("Failed to wait for present queue")?;

        Ok(FrameStatus::Presented)
    }

    fn wait_for_frame(&self, frame: &FrameTarget) -> Result<()> {
        let device = &self.renderer.device().device;
        unsafe {
            device
                .wait_for_fences(&[frame.fence], true, u64::MAX)
                .context("Failed to wait for fences")?;
            device
                .reset_fences(&[frame.fence])
                .context("Failed to reset fences!")?;
        }
        Ok(())
    }

    fn record(&self, frame: &FrameTarget) -> Result<()> {
        let device = &self.renderer.device().device;
        let cmd = frame.command_buffer;
        let extent = self.renderer.extent()?;

        let clear_values = [
            vk::ClearValue {
                color: self.clear_color,
            },
            vk::ClearValue {
                depth_stencil: self.clear_depth_stencil,
            },
        ];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.renderer.render_pass())
            .framebuffer(frame.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let (viewport, scissor) = viewport_and_scissor(extent, self.viewport_scale);

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer!")?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(RECORD_FLAGS);
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer!")?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            // Too small to hold a viewport: the pass still clears
            if is_drawable(&viewport) {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.renderer.pipeline());
                device.cmd_set_viewport(cmd, 0, &[viewport]);
                device.cmd_set_scissor(cmd, 0, &[scissor]);
                device.cmd_draw(cmd, 3, 1, 0, 0);
            }
            device.cmd_end_render_pass(cmd);

            device
                .end_command_buffer(cmd)
                .context("Failed to end command buffer!")?;
        }

        Ok(())
    }

    fn submit(&self, frame: &FrameTarget) -> Result<()> {
        let device = self.renderer.device();
        let semaphores = self.renderer.semaphores();

        let wait_semaphores = [semaphores.image_available];
        let signal_semaphores = [semaphores.render_finished];
        let command_buffers = [frame.command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info.build()], frame.fence)
                .context("Failed to submit draw command buffer!")
        }
    }
}

/// Frame rate over the last second or so
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub fps: f32,
    pub frame_time: Duration,
}

impl FrameStats {
    /// `"<title> - 60 FPS (16.67ms)"`
    pub fn decorate(&self, title: &str) -> String {
        format!(
            "{} - {:.0} FPS ({:.2}ms)",
            title,
            self.fps,
            self.frame_time.as_secs_f32() * 1000.0
        )
    }
}

/// Counts presented frames and reports once per second
#[derive(Debug)]
pub struct FrameCounter {
    frame_count: u32,
    last_report: Instant,
    last_frame: Instant,
}

impl FrameCounter {
    const REPORT_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(now: Instant) -> Self {
        Self {
            frame_count: 0,
            last_report: now,
            last_frame: now,
        }
    }

    /// Record a frame presented at `now`
    pub fn tick(&mut self, now: Instant) -> Option<FrameStats> {
        let frame_time = now.duration_since(self.last_frame);
        self.last_frame = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_report);
        if elapsed < Self::REPORT_INTERVAL {
            return None;
        }

        let stats = FrameStats {
            fps: self.frame_count as f32 / elapsed.as_secs_f32(),
            frame_time,
        };
        self.frame_count = 0;
        self.last_report = now;
        Some(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn clear_color_components_scale_to_unit_range() {
        let color = clear_color_rgba8(0, 255, 51, 255);
        let [r, g, b, a] = unsafe { color.float32 };
        assert_relative_eq!(r, 0.0);
        assert_relative_eq!(g, 1.0);
        assert_relative_eq!(b, 0.2);
        assert_relative_eq!(a, 1.0);
    }

    #[test]
    fn default_scale_covers_left_half() {
        let extent = vk::Extent2D { width: 1280, height: 720 };
        let (viewport, scissor) = viewport_and_scissor(extent, [0.5, 1.0]);

        assert_relative_eq!(viewport.x, 0.0);
        assert_relative_eq!(viewport.y, 0.0);
        assert_relative_eq!(viewport.width, 640.0);
        assert_relative_eq!(viewport.height, 720.0);
        assert_relative_eq!(viewport.min_depth, 0.0);
        assert_relative_eq!(viewport.max_depth, 1.0);

        assert_eq!(scissor.offset.x, 0);
        assert_eq!(scissor.offset.y, 0);
        assert_eq!(scissor.extent, vk::Extent2D { width: 640, height: 720 });
    }

    #[test]
    fn odd_widths_keep_the_half_pixel_in_the_viewport() {
        let extent = vk::Extent2D { width: 1001, height: 3 };
        let (viewport, scissor) = viewport_and_scissor(extent, [0.5, 0.5]);
        assert_relative_eq!(viewport.width, 500.5);
        assert_relative_eq!(viewport.height, 1.5);
        assert_eq!(scissor.extent, vk::Extent2D { width: 500, height: 1 });
    }

    #[test]
    fn one_pixel_window_still_gets_a_valid_viewport() {
        let extent = vk::Extent2D { width: 1, height: 1 };
        let (viewport, scissor) = viewport_and_scissor(extent, [0.5, 1.0]);
        assert_relative_eq!(viewport.width, 0.5);
        assert!(is_drawable(&viewport));
        assert_eq!(scissor.extent, vk::Extent2D { width: 0, height: 1 });
    }

    #[test]
    fn command_buffers_are_recorded_for_a_single_submit() {
        assert!(RECORD_FLAGS.contains(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT));
        assert!(!RECORD_FLAGS.contains(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE));
    }

    #[test]
    fn zero_scale_is_not_drawable() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        let (viewport, _) = viewport_and_scissor(extent, [0.0, 1.0]);
        assert!(!is_drawable(&viewport));
    }

    #[test]
    fn scale_is_clamped_to_the_extent() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        let (viewport, scissor) = viewport_and_scissor(extent, [2.0, -1.0]);
        assert_relative_eq!(viewport.width, 800.0);
        assert_relative_eq!(viewport.height, 0.0);
        assert_eq!(scissor.extent, vk::Extent2D { width: 800, height: 0 });
    }

    #[test]
    fn counter_reports_after_one_second() {
        let start = Instant::now();
        let mut counter = FrameCounter::new(start);

        for i in 1..60 {
            assert!(counter.tick(start + Duration::from_millis(i * 16)).is_none());
        }

        let stats = counter.tick(start + Duration::from_secs(1)).unwrap();
        assert_relative_eq!(stats.fps, 60.0);
        assert_eq!(stats.frame_time, Duration::from_millis(1000 - 59 * 16));
    }

    #[test]
    fn counter_restarts_after_report() {
        let start = Instant::now();
        let mut counter = FrameCounter::new(start);
        assert!(counter.tick(start + Duration::from_secs(2)).is_some());
        assert!(counter.tick(start + Duration::from_millis(2500)).is_none());

        let stats = counter.tick(start + Duration::from_secs(3)).unwrap();
        assert_relative_eq!(stats.fps, 2.0);
    }

    #[test]
    fn stats_decorate_title() {
        let stats = FrameStats {
            fps: 59.6,
            frame_time: Duration::from_micros(16_667),
        };
        assert_eq!(stats.decorate("Vulkan Demo (GLFW)"), "Vulkan Demo (GLFW) - 60 FPS (16.67ms)");
    }
}
