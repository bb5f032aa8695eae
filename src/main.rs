// =============================================================================
// HELLO TRIANGLE - Vulkan context bootstrap
// =============================================================================
//
// Opens a window and brings Vulkan up to the point where a triangle could be
// drawn: instance, surface, GPU, logical device, swapchain with image views,
// and the triangle's pipeline description. Nothing is rendered; the window
// stays open until it is closed.
//
// INITIALIZATION FLOW:
// 1. Load config.toml, start logging
// 2. Window is created when the event loop resumes
// 3. RenderContext runs every Vulkan stage, failing fast on the first error
// 4. On close (or error) everything is destroyed in reverse order
//
// =============================================================================

mod backend;
mod config;

use anyhow::{Context, Result};
use backend::{RenderContext, ShaderDirectory};
use config::Config;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml; reported once logging is up
    let (config, origin) = Config::load();

    // Initialize logging
    init_logging(&config);
    origin.log();
    log::debug!("Config: {:?}", config);
    log::info!("Starting Vulkan triangle");
    log::info!("Window: {}x{}", config.window.width, config.window.height);

    let event_loop = EventLoop::new()?;
    // No frame loop: only wake up for window events
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    app.finish()
}

/// Initialize logging; RUST_LOG overrides the configured level
fn init_logging(config: &Config) {
    env_logger::Builder::new()
        .filter_level(config.get_log_level())
        .parse_default_env()
        .init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: Field order matters for Drop! The Vulkan context presents to
/// the window, so it has to be destroyed first.
struct App {
    config: Config,
    shaders: ShaderDirectory,

    context: Option<RenderContext>,
    window: Option<Window>,

    /// First initialization failure, reported when the event loop returns
    init_error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        let shaders = ShaderDirectory::new(&config.shaders.directory);
        Self {
            config,
            shaders,
            context: None,
            window: None,
            init_error: None,
        }
    }

    fn init_vulkan(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = event_loop
            .create_window(window_attributes)
            .context("Failed to create window")?;

        let settings = self.config.context_settings();
        log::info!(
            "Validation layers: {}",
            if settings.validation.enabled() { "enabled" } else { "disabled" }
        );

        // SAFETY: the window is stored next to the context and outlives it
        // (see field order on App)
        let context = unsafe { RenderContext::new(&settings, &window, &self.shaders) }
            .context("Failed to initialize Vulkan")?;

        let swapchain = context.swapchain();
        log::info!(
            "Ready: {} swapchain images at {}x{}, {} shader stages on {}",
            swapchain.images.len(),
            swapchain.config.extent.width,
            swapchain.config.extent.height,
            context.pipeline().stages.len(),
            context.device().name,
        );

        self.window = Some(window);
        self.context = Some(context);
        Ok(())
    }

    /// Tear the context down and report how initialization went
    fn finish(mut self) -> Result<()> {
        self.context = None;
        match self.init_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.init_error.is_some() {
            return;
        }

        if let Err(e) = self.init_vulkan(event_loop) {
            log::error!("{:#}", e);
            self.init_error = Some(e);
            event_loop.exit();
            return;
        }

        if self.config.application.exit_after_init {
            log::info!("exit_after_init set, shutting down");
            event_loop.exit();
        }
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        // Context before window, whatever state we're in
        self.context = None;
        self.window = None;
        log::info!("Cleanup complete");
    }
}
