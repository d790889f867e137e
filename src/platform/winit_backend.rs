// winit backend
//
// Drives the frame drawer from winit's ApplicationHandler callbacks. Errors
// can't cross the event loop, so the first fatal one is parked on the app,
// the loop exits, and `run` hands it back.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{CStr, CString};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

use super::{window_title, PlatformError, PresentTarget};
use crate::config::Config;
use crate::frame::{FrameCounter, FrameDrawer, FrameStatus};

const TOOLKIT: &str = "winit";

/// A winit window seen as a Vulkan presentation target
struct WinitTarget<'a> {
    window: &'a Window,
    title: &'a str,
}

impl PresentTarget for WinitTarget<'_> {
    fn title(&self) -> &str {
        self.title
    }

    fn required_instance_extensions(&self) -> Result<Vec<CString>> {
        let names = ash_window::enumerate_required_extensions(self.window.raw_display_handle())
            .map_err(|_| PlatformError::MissingExtensions(TOOLKIT))?;

        // Safety: ash-window hands out pointers to static, NUL-terminated names
        Ok(names
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) }.to_owned())
            .collect())
    }

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<vk::SurfaceKHR> {
        let surface = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                self.window.raw_display_handle(),
                self.window.raw_window_handle(),
                None,
            )
        }
        .map_err(PlatformError::SurfaceCreation)?;

        Ok(surface)
    }

    fn drawable_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}

/// Application state for one winit window.
///
/// Field order matters for Drop: the drawer owns the Vulkan surface and must
/// go before the window it was created from.
struct DemoApp {
    config: Config,
    title: String,
    drawer: Option<FrameDrawer>,
    window: Option<Arc<Window>>,
    counter: FrameCounter,
    error: Option<anyhow::Error>,
}

impl DemoApp {
    fn new(config: Config) -> Self {
        let title = window_title(&config.window.title, TOOLKIT);
        Self {
            config,
            title,
            drawer: None,
            window: None,
            counter: FrameCounter::new(Instant::now()),
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("[{}] fatal: {:#}", TOOLKIT, error);
        self.error.get_or_insert(error);
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = WindowAttributes::default()
            .with_title(&self.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|_| PlatformError::CreationFailed(TOOLKIT))?,
        );

        let target = WinitTarget {
            window: &window,
            title: &self.title,
        };
        let drawer = FrameDrawer::new(&target, &self.config)?;

        self.drawer = Some(drawer);
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(drawer), Some(window)) = (self.drawer.as_mut(), self.window.as_ref()) else {
            return Ok(());
        };

        let size = window.inner_size();
        if drawer.next_frame((size.width, size.height))? == FrameStatus::Presented
            && self.config.debug.show_fps
        {
            if let Some(stats) = self.counter.tick(Instant::now()) {
                window.set_title(&stats.decorate(&self.title));
            }
        }

        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(drawer) = &self.drawer {
            if let Err(e) = drawer.wait_idle() {
                log::warn!("[{}] wait idle on shutdown failed: {:#}", TOOLKIT, e);
            }
        }
    }
}

impl ApplicationHandler for DemoApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        event_loop.set_control_flow(ControlFlow::Poll);

        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("[{}] close requested", TOOLKIT);
                self.shutdown();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("[{}] resized to {}x{}", TOOLKIT, size.width, size.height);
                if let Some(drawer) = self.drawer.as_mut() {
                    drawer.request_recreate();
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("[{}] ESC pressed, exiting", TOOLKIT);
                    self.shutdown();
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Keep redrawing as fast as presentation allows
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn run_loop(event_loop: EventLoop<()>, config: Config) -> Result<()> {
    let mut app = DemoApp::new(config);
    event_loop
        .run_app(&mut app)
        .context("winit event loop failed")?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Run the winit window on the calling thread, which must be the main thread.
/// Only `--backend winit` takes this path, straight from `main`; use
/// `run_on_any_thread` anywhere else.
pub fn run(config: Config) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    run_loop(event_loop, config)
}

/// Run the winit window from a thread other than main.
pub fn run_on_any_thread(config: Config) -> Result<()> {
    let mut builder = EventLoop::builder();

    #[cfg(target_os = "linux")]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        builder.with_any_thread(true);
    }

    #[cfg(target_os = "windows")]
    {
        use winit::platform::windows::EventLoopBuilderExtWindows;
        builder.with_any_thread(true);
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        let _ = (builder, config);
        return Err(PlatformError::UnsupportedThreading.into());
    }

    #[cfg(any(target_os = "linux", target_os = "windows"))]
    {
        let event_loop = builder.build().context("Failed to create winit event loop")?;
        run_loop(event_loop, config)
    }
}
