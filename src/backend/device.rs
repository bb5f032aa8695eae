// Logical device and queues
//
// Responsibilities:
// - One queue request per distinct queue family (graphics ∪ present)
// - Logical device creation with the swapchain extension
// - Graphics and present queue handles (may be the same queue)

use ash::prelude::VkResult;
use ash::vk;
use std::ffi::{c_char, CStr};
use std::sync::Arc;

use super::error::{InitError, InitResult};
use super::selector::{QueueFamilies, SelectedDevice};
use super::{Instance, ValidationSettings};

static QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// Logical device wrapper with automatic cleanup
pub struct LogicalDevice {
    device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub name: String,

    // Queue handles
    pub families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    instance: Arc<Instance>,
}

impl LogicalDevice {
    /// Create the logical device on the selected GPU
    ///
    /// # Arguments
    /// * `extensions` - Device extensions to enable (the swapchain)
    /// * `validation` - Same layers as the instance, for older loaders
    pub fn new(
        instance: &Arc<Instance>,
        selected: &SelectedDevice,
        extensions: &[&CStr],
        validation: &ValidationSettings,
    ) -> InitResult<Arc<Self>> {
        let families = selected.families;
        let queue_create_infos = queue_create_infos(&families);

        let extension_ptrs: Vec<*const c_char> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();
        let layer_names = validation.layer_names()?;
        let layer_ptrs: Vec<*const c_char> =
            layer_names.iter().map(|layer| layer.as_ptr()).collect();

        // Nothing beyond core is needed for a triangle
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(selected.handle, &create_info, None)
        }
        .map_err(InitError::DeviceCreation)?;

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };

        let properties = unsafe {
            instance
                .handle()
                .get_physical_device_properties(selected.handle)
        };

        log::info!("Created logical device on {}", selected.name);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::debug!(
            "{} queue request(s), graphics family {}, present family {}",
            queue_create_infos.len(),
            families.graphics,
            families.present
        );

        Ok(Arc::new(Self {
            device,
            physical_device: selected.handle,
            name: selected.name.clone(),
            families,
            graphics_queue,
            present_queue,
            instance: instance.clone(),
        }))
    }

    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        log::debug!("Destroying logical device");

        if let Err(e) = self.wait_idle() {
            log::warn!("Device did not go idle before destruction: {}", e);
        }

        unsafe { self.device.destroy_device(None) };
    }
}

/// One single-queue request per distinct family
fn queue_create_infos(families: &QueueFamilies) -> Vec<vk::DeviceQueueCreateInfo> {
    families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITIES)
                .build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_family_gets_one_request() {
        let infos = queue_create_infos(&QueueFamilies { graphics: 0, present: 0 });

        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].queue_family_index, 0);
        assert_eq!(infos[0].queue_count, 1);
    }

    #[test]
    fn split_families_get_one_request_each() {
        let infos = queue_create_infos(&QueueFamilies { graphics: 0, present: 2 });

        let indices: Vec<u32> = infos.iter().map(|info| info.queue_family_index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert!(infos.iter().all(|info| info.queue_count == 1));
    }

    #[test]
    fn every_queue_has_full_priority() {
        let infos = queue_create_infos(&QueueFamilies { graphics: 3, present: 1 });

        for info in &infos {
            let priorities = unsafe {
                std::slice::from_raw_parts(info.p_queue_priorities, info.queue_count as usize)
            };
            assert_eq!(priorities, &[1.0]);
        }
    }
}
