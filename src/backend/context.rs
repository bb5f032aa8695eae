// Render context - runs every initialization stage in order
//
// instance -> surface -> debug messenger -> physical device ->
// logical device -> swapchain + image views -> pipeline description
//
// Teardown is the reverse and needs no bookkeeping: on an error the
// stages already built are locals and drop in reverse order, and on
// success the fields below are declared in destruction order. Each
// resource also holds an Arc of its parent, so no parent can go first.

use ash::vk;
use std::sync::Arc;

use super::error::InitResult;
use super::pipeline::{build_pipeline_template, PipelineTemplate};
use super::selector::{
    required_device_extensions, DeviceQuery, DeviceSelector, SurfaceDeviceQuery,
};
use super::shader::ShaderSource;
use super::surface::PresentationWindow;
use super::swapchain::{Swapchain, SwapchainConfig};
use super::{DebugMessenger, Instance, LogicalDevice, Surface, ValidationSettings};

/// Everything the context needs from configuration
#[derive(Debug, Clone)]
pub struct ContextSettings {
    pub application_name: String,
    pub engine_name: String,
    pub validation: ValidationSettings,
    pub message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    pub vertex_shader: String,
    pub fragment_shader: String,
}

pub struct RenderContext {
    // Order matters for drop!
    _debug_messenger: Option<DebugMessenger>,
    swapchain: Swapchain,
    device: Arc<LogicalDevice>,
    _surface: Arc<Surface>,
    _instance: Arc<Instance>,

    pipeline: PipelineTemplate,
}

impl RenderContext {
    /// Build the whole context for `window`.
    ///
    /// # Safety
    /// `window` must outlive the returned context.
    pub unsafe fn new<W: PresentationWindow + ?Sized>(
        settings: &ContextSettings,
        window: &W,
        shaders: &dyn ShaderSource,
    ) -> InitResult<Self> {
        log::info!("Initializing Vulkan...");

        // ─────────────────────────────────────────────────────────────────
        // STEP 1: Instance
        // ─────────────────────────────────────────────────────────────────
        let required_extensions = window.required_extensions()?;
        let instance = Instance::new(
            &settings.application_name,
            &settings.engine_name,
            &required_extensions,
            &settings.validation,
            settings.message_severity,
        )?;

        // ─────────────────────────────────────────────────────────────────
        // STEP 2: Surface (platform-specific window connection), then the
        // debug messenger when validating
        // ─────────────────────────────────────────────────────────────────
        let surface = Surface::new(&instance, window)?;

        // Declared after the surface so an early return drops it first,
        // same as the field order below
        let debug_messenger = if settings.validation.enabled() {
            Some(DebugMessenger::new(&instance, settings.message_severity)?)
        } else {
            None
        };

        // ─────────────────────────────────────────────────────────────────
        // STEP 3: Physical device
        // ─────────────────────────────────────────────────────────────────
        let device_extensions = required_device_extensions();
        let query = SurfaceDeviceQuery::new(instance.handle(), &surface);
        let selected = DeviceSelector::with_required_extensions(device_extensions.clone())
            .select(&query)?;

        // ─────────────────────────────────────────────────────────────────
        // STEP 4: Logical device + queues
        // ─────────────────────────────────────────────────────────────────
        let device = LogicalDevice::new(
            &instance,
            &selected,
            &device_extensions,
            &settings.validation,
        )?;

        // ─────────────────────────────────────────────────────────────────
        // STEP 5: Swapchain and image views
        // ─────────────────────────────────────────────────────────────────
        let support = query.swapchain_support(device.physical_device)?;
        let config = SwapchainConfig::negotiate(&support, &device.families, || {
            window.drawable_size()
        })?;
        let swapchain = Swapchain::new(&device, &surface, config)?;

        // ─────────────────────────────────────────────────────────────────
        // STEP 6: Pipeline description
        // ─────────────────────────────────────────────────────────────────
        let pipeline = build_pipeline_template(
            &device,
            shaders,
            &settings.vertex_shader,
            &settings.fragment_shader,
        )?;

        log::info!("Vulkan initialized successfully!");

        Ok(Self {
            _debug_messenger: debug_messenger,
            swapchain,
            device,
            _surface: surface,
            _instance: instance,
            pipeline,
        })
    }

    pub fn device(&self) -> &LogicalDevice {
        &self.device
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn pipeline(&self) -> &PipelineTemplate {
        &self.pipeline
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
    }
}
