// Shader bytecode and modules
//
// Vulkan consumes SPIR-V words. Where the bytes come from is up to a
// `ShaderSource`; the bytes are not inspected here, so bad bytecode only
// shows up when the driver rejects the module.

use ash::vk;
use std::io::Cursor;
use std::path::PathBuf;

use super::error::{InitError, InitResult};

/// Supplies compiled shader bytecode by name
pub trait ShaderSource {
    fn bytecode(&self, name: &str) -> InitResult<Vec<u8>>;
}

/// Reads `<root>/<name>` from disk
#[derive(Debug, Clone)]
pub struct ShaderDirectory {
    root: PathBuf,
}

impl ShaderDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ShaderSource for ShaderDirectory {
    fn bytecode(&self, name: &str) -> InitResult<Vec<u8>> {
        let path = self.root.join(name);
        log::debug!("Loading shader bytecode from {:?}", path);

        std::fs::read(&path).map_err(|source| InitError::ShaderBytecode {
            name: path.display().to_string(),
            source,
        })
    }
}

/// Re-pack bytes as aligned SPIR-V words
pub fn spirv_words(name: &str, bytes: &[u8]) -> InitResult<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|source| InitError::ShaderBytecode {
        name: name.to_string(),
        source,
    })
}

/// Shader module destroyed when it goes out of scope
pub struct ShaderModule<'a> {
    device: &'a ash::Device,
    pub handle: vk::ShaderModule,
    pub stage: vk::ShaderStageFlags,
}

impl<'a> ShaderModule<'a> {
    /// `index` identifies the module in errors
    pub fn new(
        device: &'a ash::Device,
        stage: vk::ShaderStageFlags,
        index: usize,
        code: &[u32],
    ) -> InitResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

        let handle = unsafe { device.create_shader_module(&create_info, None) }
            .map_err(|result| InitError::ResourceCreation {
                resource: "shader module",
                index,
                result,
            })?;

        Ok(Self {
            device,
            handle,
            stage,
        })
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        log::trace!("Destroying {:?} shader module", self.stage);
        unsafe { self.device.destroy_shader_module(self.handle, None) };
    }
}
