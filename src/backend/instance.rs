// Vulkan instance and validation
//
// Responsibilities:
// - Loading the Vulkan library
// - Checking requested validation layers before asking for them
// - Instance creation, with the debug messenger descriptor chained in so
//   errors during vkCreateInstance are reported too
// - The persistent debug messenger that forwards validation output to `log`

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use super::error::{InitError, InitResult};

/// Whether validation is on, and which layers it needs.
///
/// Built once from configuration and handed to both the instance and the
/// logical device, so the two always agree.
#[derive(Debug, Clone)]
pub struct ValidationSettings {
    enabled: bool,
    layers: Vec<String>,
}

impl ValidationSettings {
    pub fn new(enabled: bool, layers: Vec<String>) -> Self {
        Self { enabled, layers }
    }

    pub fn disabled() -> Self {
        Self::new(false, Vec::new())
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Layer names to enable; empty when validation is off
    pub fn layer_names(&self) -> InitResult<Vec<CString>> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        self.layers
            .iter()
            .map(|name| {
                CString::new(name.as_str()).map_err(|_| {
                    InitError::Configuration(format!("layer name {:?} contains a NUL byte", name))
                })
            })
            .collect()
    }
}

/// Owns the loader and the instance handle.
///
/// Everything created from the instance holds an `Arc<Instance>`, so the
/// instance is always the last thing destroyed.
pub struct Instance {
    handle: ash::Instance,
    entry: Entry,
}

impl Instance {
    /// Create the instance
    ///
    /// # Arguments
    /// * `app_name` / `engine_name` - Reported to the driver
    /// * `required_extensions` - Platform surface extensions from the window
    /// * `validation` - Layers to verify and enable
    /// * `message_severity` - Severity filter for creation-time debug messages
    pub fn new(
        app_name: &str,
        engine_name: &str,
        required_extensions: &[&'static CStr],
        validation: &ValidationSettings,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ) -> InitResult<Arc<Self>> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }?;

        let layer_names = validation.layer_names()?;
        if validation.enabled() {
            check_layer_support(&entry, &layer_names)?;
        }

        let app_name_cstr = to_cstring("application name", app_name)?;
        let engine_name_cstr = to_cstring("engine name", engine_name)?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let extensions = instance_extensions(required_extensions, validation.enabled());
        for extension in &extensions {
            log::debug!("Instance extension: {}", extension.to_string_lossy());
        }
        let extension_ptrs: Vec<*const c_char> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> =
            layer_names.iter().map(|layer| layer.as_ptr()).collect();

        let mut debug_info = debug_messenger_info(message_severity);

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        if validation.enabled() {
            create_info = create_info.push_next(&mut debug_info);
        }

        let handle = unsafe { entry.create_instance(&create_info, None) }
            .map_err(InitError::init("instance"))?;

        Ok(Arc::new(Self { handle, entry }))
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn handle(&self) -> &ash::Instance {
        &self.handle
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::debug!("Destroying Vulkan instance");
        unsafe { self.handle.destroy_instance(None) };
    }
}

/// Debug messenger living for the rest of the context
pub struct DebugMessenger {
    loader: DebugUtils,
    handle: vk::DebugUtilsMessengerEXT,
    _instance: Arc<Instance>,
}

impl DebugMessenger {
    pub fn new(
        instance: &Arc<Instance>,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ) -> InitResult<Self> {
        let loader = DebugUtils::new(instance.entry(), instance.handle());
        let create_info = debug_messenger_info(message_severity);

        let handle = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .map_err(InitError::init("debug messenger"))?;

        log::debug!("Debug messenger installed");

        Ok(Self {
            loader,
            handle,
            _instance: instance.clone(),
        })
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        log::debug!("Destroying debug messenger");
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.handle, None);
        }
    }
}

fn to_cstring(what: &str, value: &str) -> InitResult<CString> {
    CString::new(value).map_err(|_| {
        InitError::Configuration(format!("{} {:?} contains a NUL byte", what, value))
    })
}

fn check_layer_support(entry: &Entry, requested: &[CString]) -> InitResult<()> {
    let available = unsafe { entry.enumerate_instance_layer_properties() }
        .map_err(InitError::init("instance"))?;

    let available: Vec<CString> = available
        .iter()
        .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }.to_owned())
        .collect();

    let missing = missing_names(requested.iter().map(CString::as_c_str), &available);
    if !missing.is_empty() {
        return Err(InitError::Configuration(format!(
            "validation layers requested, but not available: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}

/// Names in `required` that `available` does not list, in request order
pub(crate) fn missing_names<'a>(
    required: impl IntoIterator<Item = &'a CStr>,
    available: &[CString],
) -> Vec<String> {
    required
        .into_iter()
        .filter(|name| !available.iter().any(|have| have.as_c_str() == *name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Platform extensions plus debug utils when validating
fn instance_extensions(required: &[&'static CStr], validation: bool) -> Vec<&'static CStr> {
    let mut extensions = required.to_vec();
    if validation && !extensions.contains(&DebugUtils::name()) {
        extensions.push(DebugUtils::name());
    }
    extensions
}

fn debug_messenger_info(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
) -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(message_severity)
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

fn message_category(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }

    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();
    let category = message_category(message_type);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan {}] {}", category, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan {}] {}", category, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Vulkan {}] {}", category, message);
        }
        _ => {
            log::debug!("[Vulkan {}] {}", category, message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<CString> {
        list.iter().map(|name| CString::new(*name).unwrap()).collect()
    }

    #[test]
    fn missing_layers_are_reported_by_name() {
        let requested = names(&["VK_LAYER_KHRONOS_validation", "VK_LAYER_LUNARG_monitor"]);
        let available = names(&["VK_LAYER_LUNARG_monitor"]);

        let missing = missing_names(requested.iter().map(CString::as_c_str), &available);
        assert_eq!(missing, vec!["VK_LAYER_KHRONOS_validation".to_string()]);
    }

    #[test]
    fn nothing_missing_when_all_layers_present() {
        let requested = names(&["VK_LAYER_KHRONOS_validation"]);
        let available = names(&["VK_LAYER_MESA_device_select", "VK_LAYER_KHRONOS_validation"]);

        assert!(missing_names(requested.iter().map(CString::as_c_str), &available).is_empty());
    }

    #[test]
    fn debug_utils_appended_only_when_validating() {
        let surface = ash::extensions::khr::Surface::name();

        let plain = instance_extensions(&[surface], false);
        assert_eq!(plain, vec![surface]);

        let validating = instance_extensions(&[surface], true);
        assert_eq!(validating, vec![surface, DebugUtils::name()]);
    }

    #[test]
    fn debug_utils_not_duplicated() {
        let extensions = instance_extensions(&[DebugUtils::name()], true);
        assert_eq!(extensions.len(), 1);
    }

    #[test]
    fn disabled_validation_enables_no_layers() {
        let settings = ValidationSettings::new(false, vec!["VK_LAYER_KHRONOS_validation".into()]);
        assert!(settings.layer_names().unwrap().is_empty());
    }

    #[test]
    fn layer_name_with_nul_is_a_configuration_error() {
        let settings = ValidationSettings::new(true, vec!["bad\0layer".into()]);
        assert!(matches!(
            settings.layer_names(),
            Err(InitError::Configuration(_))
        ));
    }

    #[test]
    fn messenger_listens_to_every_category() {
        let info = debug_messenger_info(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR);
        assert_eq!(info.message_severity, vk::DebugUtilsMessageSeverityFlagsEXT::ERROR);
        assert!(info.message_type.contains(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
        ));
        assert!(info.pfn_user_callback.is_some());
    }
}
