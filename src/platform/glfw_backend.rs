//! GLFW backend: a plain poll/render loop on the calling thread.

use anyhow::Result;
use ash::vk;
use glfw::{Action, ClientApiHint, Key, WindowEvent, WindowHint, WindowMode};
use std::ffi::CString;
use std::time::Instant;

use super::{window_title, PlatformError, PresentTarget};
use crate::config::Config;
use crate::frame::{FrameCounter, FrameDrawer, FrameStatus};

const TOOLKIT: &str = "GLFW";

struct GlfwTarget<'a> {
    glfw: &'a glfw::Glfw,
    window: &'a glfw::Window,
    title: &'a str,
}

impl PresentTarget for GlfwTarget<'_> {
    fn title(&self) -> &str {
        self.title
    }

    fn required_instance_extensions(&self) -> Result<Vec<CString>> {
        let names = self
            .glfw
            .get_required_instance_extensions()
            .ok_or(PlatformError::MissingExtensions(TOOLKIT))?;

        Ok(names.into_iter().map(CString::new).collect::<Result<_, _>>()?)
    }

    fn create_surface(&self, _entry: &ash::Entry, instance: &ash::Instance) -> Result<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance.handle(), std::ptr::null(), &mut surface);

        if result != vk::Result::SUCCESS {
            return Err(PlatformError::SurfaceCreation(result).into());
        }
        Ok(surface)
    }

    fn drawable_size(&self) -> (u32, u32) {
        framebuffer_size(self.window)
    }
}

fn framebuffer_size(window: &glfw::Window) -> (u32, u32) {
    let (width, height) = window.get_framebuffer_size();
    (width.max(0) as u32, height.max(0) as u32)
}

/// Open the GLFW window and render until it is closed.
pub fn run(config: Config) -> Result<()> {
    let mut glfw = glfw::init(glfw::fail_on_errors)
        .map_err(|e| PlatformError::InitializationFailed(TOOLKIT, format!("{:?}", e)))?;

    if !glfw.vulkan_supported() {
        return Err(PlatformError::VulkanUnsupported(TOOLKIT).into());
    }

    // Configure for Vulkan (no OpenGL context)
    glfw.window_hint(WindowHint::ClientApi(ClientApiHint::NoApi));
    glfw.window_hint(WindowHint::Resizable(true));

    let title = window_title(&config.window.title, TOOLKIT);
    let (mut window, events) = glfw
        .create_window(config.window.width, config.window.height, &title, WindowMode::Windowed)
        .ok_or(PlatformError::CreationFailed(TOOLKIT))?;

    window.set_key_polling(true);
    window.set_close_polling(true);
    window.set_framebuffer_size_polling(true);

    let mut drawer = FrameDrawer::new(
        &GlfwTarget {
            glfw: &glfw,
            window: &window,
            title: &title,
        },
        &config,
    )?;
    let mut counter = FrameCounter::new(Instant::now());

    while !window.should_close() {
        glfw.poll_events();

        for (_, event) in glfw::flush_messages(&events) {
            match event {
                WindowEvent::Key(Key::Escape, _, Action::Press, _) => {
                    log::info!("[{}] ESC pressed, exiting", TOOLKIT);
                    window.set_should_close(true);
                }
                WindowEvent::Close => {
                    log::info!("[{}] close requested", TOOLKIT);
                    window.set_should_close(true);
                }
                WindowEvent::FramebufferSize(width, height) => {
                    log::debug!("[{}] resized to {}x{}", TOOLKIT, width, height);
                    drawer.request_recreate();
                }
                _ => {}
            }
        }

        if window.should_close() {
            break;
        }

        match drawer.next_frame(framebuffer_size(&window))? {
            FrameStatus::Presented => {
                if config.debug.show_fps {
                    if let Some(stats) = counter.tick(Instant::now()) {
                        window.set_title(&stats.decorate(&title));
                    }
                }
            }
            // Minimized: block instead of spinning
            FrameStatus::Skipped if window.is_iconified() => glfw.wait_events(),
            FrameStatus::Skipped => {}
        }
    }

    drawer.wait_idle()?;

    // Surface before window
    drop(drawer);
    drop(window);
    Ok(())
}
