// Initialization errors
//
// Every stage of context creation fails fast with one of these. Nothing is
// retried; the caller reports the error and exits.

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    /// Requested validation layers are missing, or a configured name is unusable
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Could not load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// Instance, surface or debug messenger creation failed
    #[error("Failed to create {stage}: {result}")]
    Initialization {
        stage: &'static str,
        result: vk::Result,
    },

    #[error("No suitable GPU found: {0}")]
    NoSuitableDevice(String),

    #[error("Physical device query '{query}' failed: {result}")]
    DeviceQuery {
        query: &'static str,
        result: vk::Result,
    },

    #[error("Failed to create logical device: {0}")]
    DeviceCreation(vk::Result),

    #[error("Failed to create swapchain: {0}")]
    SwapchainCreation(vk::Result),

    /// Image view or shader module creation failed at `index`
    #[error("Failed to create {resource} #{index}: {result}")]
    ResourceCreation {
        resource: &'static str,
        index: usize,
        result: vk::Result,
    },

    #[error("Could not read shader bytecode '{name}': {source}")]
    ShaderBytecode {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl InitError {
    pub(crate) fn init(stage: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Initialization { stage, result }
    }

    pub(crate) fn query(query: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::DeviceQuery { query, result }
    }
}

pub type InitResult<T> = Result<T, InitError>;
