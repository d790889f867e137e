// Platform module - native windows and the loops that drive them
//
// Two interchangeable toolkits, winit and GLFW, sit behind `PresentTarget`.
// The Vulkan layer only ever sees that trait.

pub mod glfw_backend;
pub mod winit_backend;

use anyhow::{anyhow, Result};
use ash::vk;
use serde::Deserialize;
use std::ffi::CString;
use std::thread;
use thiserror::Error;

use crate::config::Config;

/// Which windowing toolkit(s) to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WindowingBackend {
    Winit,
    Glfw,
    /// One window per toolkit, each on its own thread
    Both,
}

/// Windowing errors
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("{0} initialization failed: {1}")]
    InitializationFailed(&'static str, String),

    #[error("{0} window creation failed")]
    CreationFailed(&'static str),

    #[error("{0} reports that Vulkan is not supported")]
    VulkanUnsupported(&'static str),

    #[error("{0} could not report required instance extensions")]
    MissingExtensions(&'static str),

    #[error("Failed to create window surface: {0}")]
    SurfaceCreation(vk::Result),

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    #[error("Running both backends at once is not supported on this platform")]
    UnsupportedThreading,
}

/// A native window Vulkan can present to.
pub trait PresentTarget {
    fn title(&self) -> &str;

    /// Instance extensions the toolkit needs to create a surface.
    fn required_instance_extensions(&self) -> Result<Vec<CString>>;

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<vk::SurfaceKHR>;

    /// Framebuffer size in pixels; zero while minimized.
    fn drawable_size(&self) -> (u32, u32);
}

/// Window title for one backend instance, e.g. "Vulkan Demo (GLFW)".
pub fn window_title(base: &str, toolkit: &str) -> String {
    format!("{} ({})", base, toolkit)
}

/// Run the configured backend(s) until every window is closed.
pub fn run(config: Config) -> Result<()> {
    match config.window.backend {
        WindowingBackend::Winit => winit_backend::run(config),
        WindowingBackend::Glfw => glfw_backend::run(config),
        WindowingBackend::Both => run_both(config),
    }
}

/// Report a fatal error from a loop off the main thread and end the process
/// through `exit`. Returning alone would only end that thread.
fn exit_on_error(toolkit: &str, result: Result<()>, exit: impl FnOnce(i32)) -> Result<()> {
    if let Err(e) = &result {
        log::error!("[{}] fatal: {:#}", toolkit, e);
        exit(1);
    }
    result
}

/// GLFW keeps the main thread; winit gets a thread of its own. The two loops
/// share nothing but a copy of the config. A fatal error in either ends the
/// process.
fn run_both(config: Config) -> Result<()> {
    let winit_config = config.clone();
    let winit_thread = thread::Builder::new()
        .name("winit".to_string())
        .spawn(move || {
            exit_on_error(
                "winit",
                winit_backend::run_on_any_thread(winit_config),
                |code| {
                    std::process::exit(code);
                },
            )
        })?;

    // Fatal: returning ends the process, winit thread included
    glfw_backend::run(config)?;

    winit_thread
        .join()
        .map_err(|_| anyhow!("winit render thread panicked"))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_are_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            backend: WindowingBackend,
        }

        for (text, backend) in [
            ("winit", WindowingBackend::Winit),
            ("glfw", WindowingBackend::Glfw),
            ("both", WindowingBackend::Both),
        ] {
            let parsed: Wrapper = toml::from_str(&format!("backend = \"{text}\"")).unwrap();
            assert_eq!(parsed.backend, backend);
        }
    }

    #[test]
    fn error_messages_name_the_toolkit() {
        assert_eq!(
            PlatformError::CreationFailed("GLFW").to_string(),
            "GLFW window creation failed"
        );
        assert_eq!(
            PlatformError::InitializationFailed("winit", "no display".into()).to_string(),
            "winit initialization failed: no display"
        );
        assert!(PlatformError::SurfaceCreation(vk::Result::ERROR_INITIALIZATION_FAILED)
            .to_string()
            .starts_with("Failed to create window surface"));
    }

    #[test]
    fn thread_error_triggers_exit() {
        let mut exit_code = None;
        let result = exit_on_error("winit", Err(anyhow!("no display")), |code| exit_code = Some(code));
        assert_eq!(exit_code, Some(1));
        assert!(result.is_err());
    }

    #[test]
    fn clean_thread_exit_does_not_exit_process() {
        let mut called = false;
        assert!(exit_on_error("winit", Ok(()), |_| called = true).is_ok());
        assert!(!called);
    }

    #[test]
    fn titles_carry_the_toolkit_name() {
        assert_eq!(window_title("Vulkan Demo", "GLFW"), "Vulkan Demo (GLFW)");
    }
}
