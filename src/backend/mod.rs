// Backend module - Vulkan initialization pipeline
//
// Design: Thin wrapper around ash, one module per stage
// Every Vulkan handle is owned by exactly one RAII type

pub mod context;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod selector;
pub mod shader;
pub mod surface;
pub mod swapchain;

pub use context::{ContextSettings, RenderContext};
pub use device::LogicalDevice;
pub use error::{InitError, InitResult};
pub use instance::{DebugMessenger, Instance, ValidationSettings};
pub use shader::ShaderDirectory;
pub use surface::Surface;
pub use swapchain::Swapchain;
