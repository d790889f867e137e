// =============================================================================
// TWIN VULKAN DEMO - One triangle, two windowing toolkits
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  main (CLI, config, logging)                                    │
// │    └── platform::run  (winit thread + GLFW on main thread)      │
// │          └── FrameDrawer (acquire, record, submit, present)     │
// │                └── Renderer (instance .. swapchain .. fences)   │
// │                      └── backend (thin RAII wrappers over ash)  │
// └─────────────────────────────────────────────────────────────────┘
//
// Each window owns a completely independent Vulkan stack. Any error during
// setup or rendering ends the program with a non-zero exit code.
//
// =============================================================================

mod backend;
mod config;
mod frame;
mod platform;
mod renderer;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use platform::WindowingBackend;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the configured windowing backend
    #[arg(long, value_enum)]
    backend: Option<WindowingBackend>,
}

impl Args {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(backend) = self.backend {
            config.window.backend = backend;
        }
        config
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (config, load_error) = load_config(&args.config);
    let config = args.apply(config);

    init_logging(&config)?;
    if let Some(e) = load_error {
        log::warn!("Failed to load {:?}: {:#}. Using defaults.", args.config, e);
    }
    log::info!("Starting Vulkan demo");
    log::debug!("Config: {:?}", config);
    log::info!(
        "Window: {}x{} ({:?})",
        config.window.width,
        config.window.height,
        config.window.backend
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    if let Err(e) = platform::run(config) {
        log::error!("Fatal: {:#}", e);
        return Err(e);
    }

    log::info!("Clean exit");
    Ok(())
}

/// Config from `path`, or the defaults plus the reason it could not be used.
/// The error is reported by the caller once logging is up.
fn load_config(path: &Path) -> (Config, Option<anyhow::Error>) {
    match Config::load_from_path(path) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    }
}

/// Initialize logging, optionally redirected to the configured log file
fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{} {:<5} {}] {}",
            buf.timestamp_millis(),
            record.level(),
            std::thread::current().name().unwrap_or("?"),
            record.args()
        )
    });

    if config.debug.log_to_file {
        let mut file = File::create(&config.debug.log_file)
            .with_context(|| format!("Failed to create log file {}", config.debug.log_file))?;
        writeln!(file, "=== Vulkan Demo Log ===")?;
        writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
        writeln!(file)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("Failed to initialize logger")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_flag_overrides_config() {
        let args = Args::try_parse_from(["twin-vulkan-demo", "--backend", "glfw"]).unwrap();
        let config = args.apply(Config::default());
        assert_eq!(config.window.backend, WindowingBackend::Glfw);
    }

    #[test]
    fn config_backend_kept_without_flag() {
        let args = Args::try_parse_from(["twin-vulkan-demo"]).unwrap();
        assert_eq!(args.config, PathBuf::from("config.toml"));

        let mut config = Config::default();
        config.window.backend = WindowingBackend::Winit;
        let config = args.apply(config);
        assert_eq!(config.window.backend, WindowingBackend::Winit);
    }

    #[test]
    fn unknown_backend_rejected() {
        assert!(Args::try_parse_from(["twin-vulkan-demo", "--backend", "sdl"]).is_err());
    }

    #[test]
    fn malformed_config_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("vulkan_demo_main_{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\nwidth = \"wide\"\n").unwrap();

        let (config, error) = load_config(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config, Config::default());
        assert!(format!("{:#}", error.unwrap()).contains("vulkan_demo_main_"));
    }

    #[test]
    fn valid_config_loads_without_error() {
        let path = std::env::temp_dir().join(format!("vulkan_demo_ok_{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\nbackend = \"glfw\"\n").unwrap();

        let (config, error) = load_config(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(error.is_none());
        assert_eq!(config.window.backend, WindowingBackend::Glfw);
    }
}
