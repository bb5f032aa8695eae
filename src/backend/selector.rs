// Physical device selection
//
// A device is suitable when every check in the selector's list passes.
// Checks run in order and stop at the first rejection, so later checks can
// rely on what earlier ones established (the swapchain check only runs once
// the swapchain extension is known to exist). The first suitable device in
// enumeration order wins; there is no scoring.

use ash::extensions::khr;
use ash::vk;
use std::collections::BTreeSet;
use std::ffi::{CStr, CString};

use super::error::{InitError, InitResult};
use super::instance::missing_names;
use super::swapchain::SwapchainSupportDetails;
use super::Surface;

/// Device extensions every candidate must expose
pub fn required_device_extensions() -> Vec<&'static CStr> {
    vec![khr::Swapchain::name()]
}

/// Everything the selector asks about a physical device.
///
/// Implemented over a live instance and surface by [`SurfaceDeviceQuery`].
pub trait DeviceQuery {
    fn physical_devices(&self) -> InitResult<Vec<vk::PhysicalDevice>>;
    fn device_name(&self, device: vk::PhysicalDevice) -> String;
    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;
    fn supports_present(&self, device: vk::PhysicalDevice, family: u32) -> InitResult<bool>;
    fn device_extensions(&self, device: vk::PhysicalDevice) -> InitResult<Vec<CString>>;
    fn swapchain_support(
        &self,
        device: vk::PhysicalDevice,
    ) -> InitResult<SwapchainSupportDetails>;
}

pub struct SurfaceDeviceQuery<'a> {
    instance: &'a ash::Instance,
    surface: &'a Surface,
}

impl<'a> SurfaceDeviceQuery<'a> {
    pub fn new(instance: &'a ash::Instance, surface: &'a Surface) -> Self {
        Self { instance, surface }
    }
}

impl DeviceQuery for SurfaceDeviceQuery<'_> {
    fn physical_devices(&self) -> InitResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }
            .map_err(InitError::query("enumerate physical devices"))
    }

    fn device_name(&self, device: vk::PhysicalDevice) -> String {
        let properties = unsafe { self.instance.get_physical_device_properties(device) };
        unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe { self.instance.get_physical_device_queue_family_properties(device) }
    }

    fn supports_present(&self, device: vk::PhysicalDevice, family: u32) -> InitResult<bool> {
        unsafe {
            self.surface.loader().get_physical_device_surface_support(
                device,
                family,
                self.surface.handle(),
            )
        }
        .map_err(InitError::query("surface support"))
    }

    fn device_extensions(&self, device: vk::PhysicalDevice) -> InitResult<Vec<CString>> {
        let extensions = unsafe { self.instance.enumerate_device_extension_properties(device) }
            .map_err(InitError::query("device extensions"))?;

        Ok(extensions
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_owned())
            .collect())
    }

    fn swapchain_support(
        &self,
        device: vk::PhysicalDevice,
    ) -> InitResult<SwapchainSupportDetails> {
        let loader = self.surface.loader();
        let surface = self.surface.handle();

        unsafe {
            Ok(SwapchainSupportDetails {
                capabilities: loader
                    .get_physical_device_surface_capabilities(device, surface)
                    .map_err(InitError::query("surface capabilities"))?,
                formats: loader
                    .get_physical_device_surface_formats(device, surface)
                    .map_err(InitError::query("surface formats"))?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(device, surface)
                    .map_err(InitError::query("surface present modes"))?,
            })
        }
    }
}

/// Queue family roles as discovered; either may be missing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan every family until both roles are found.
    ///
    /// Records the first GRAPHICS family and, independently, the first family
    /// that can present. `supports_present` is only asked while the present
    /// role is still open.
    pub fn discover<E>(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> Result<bool, E>,
    ) -> Result<Self, E> {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }

            if indices.present.is_none() && supports_present(index)? {
                indices.present = Some(index);
            }

            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn complete(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Resolved queue families of the chosen device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct families, ascending. One entry when a family serves both roles.
    pub fn unique(&self) -> Vec<u32> {
        BTreeSet::from([self.graphics, self.present]).into_iter().collect()
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// A physical device under evaluation, with whatever the checks have learned
#[derive(Debug, Clone)]
pub struct PhysicalDeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub queue_families: QueueFamilyIndices,
    pub extensions_supported: bool,
    pub swapchain_support: Option<SwapchainSupportDetails>,
}

impl PhysicalDeviceCandidate {
    pub fn new(handle: vk::PhysicalDevice, name: String) -> Self {
        Self {
            handle,
            name,
            queue_families: QueueFamilyIndices::default(),
            extensions_supported: false,
            swapchain_support: None,
        }
    }
}

/// The device the context is built on
#[derive(Debug, Clone)]
pub struct SelectedDevice {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub families: QueueFamilies,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Reject(String),
}

/// One requirement a device has to meet
pub trait SuitabilityCheck {
    fn name(&self) -> &'static str;

    fn evaluate(
        &self,
        query: &dyn DeviceQuery,
        candidate: &mut PhysicalDeviceCandidate,
    ) -> InitResult<Verdict>;
}

/// Some family can do graphics and some family can present to the surface
pub struct QueueFamilyCheck;

impl SuitabilityCheck for QueueFamilyCheck {
    fn name(&self) -> &'static str {
        "queue families"
    }

    fn evaluate(
        &self,
        query: &dyn DeviceQuery,
        candidate: &mut PhysicalDeviceCandidate,
    ) -> InitResult<Verdict> {
        let device = candidate.handle;
        let families = query.queue_families(device);
        let indices = QueueFamilyIndices::discover(&families, |family| {
            query.supports_present(device, family)
        })?;
        candidate.queue_families = indices;

        Ok(match (indices.graphics, indices.present) {
            (Some(_), Some(_)) => Verdict::Pass,
            (None, Some(_)) => Verdict::Reject("no graphics queue family".into()),
            (Some(_), None) => Verdict::Reject("no queue family can present to the surface".into()),
            (None, None) => Verdict::Reject("no graphics or present queue family".into()),
        })
    }
}

/// Every required device extension is reported by the device
pub struct DeviceExtensionCheck {
    required: Vec<&'static CStr>,
}

impl DeviceExtensionCheck {
    pub fn new(required: Vec<&'static CStr>) -> Self {
        Self { required }
    }
}

impl SuitabilityCheck for DeviceExtensionCheck {
    fn name(&self) -> &'static str {
        "device extensions"
    }

    fn evaluate(
        &self,
        query: &dyn DeviceQuery,
        candidate: &mut PhysicalDeviceCandidate,
    ) -> InitResult<Verdict> {
        let available = query.device_extensions(candidate.handle)?;
        let missing = missing_names(self.required.iter().copied(), &available);
        candidate.extensions_supported = missing.is_empty();

        if missing.is_empty() {
            Ok(Verdict::Pass)
        } else {
            Ok(Verdict::Reject(format!("missing {}", missing.join(", "))))
        }
    }
}

/// The surface offers at least one format and one present mode
pub struct SwapchainAdequacyCheck;

impl SuitabilityCheck for SwapchainAdequacyCheck {
    fn name(&self) -> &'static str {
        "swapchain support"
    }

    fn evaluate(
        &self,
        query: &dyn DeviceQuery,
        candidate: &mut PhysicalDeviceCandidate,
    ) -> InitResult<Verdict> {
        let support = query.swapchain_support(candidate.handle)?;

        let verdict = if support.formats.is_empty() {
            Verdict::Reject("no surface formats".into())
        } else if support.present_modes.is_empty() {
            Verdict::Reject("no present modes".into())
        } else {
            Verdict::Pass
        };

        candidate.swapchain_support = Some(support);
        Ok(verdict)
    }
}

pub struct DeviceSelector {
    checks: Vec<Box<dyn SuitabilityCheck>>,
}

impl DeviceSelector {
    pub fn new(checks: Vec<Box<dyn SuitabilityCheck>>) -> Self {
        Self { checks }
    }

    /// Queue families, then extensions, then swapchain support
    pub fn with_required_extensions(required: Vec<&'static CStr>) -> Self {
        Self::new(vec![
            Box::new(QueueFamilyCheck),
            Box::new(DeviceExtensionCheck::new(required)),
            Box::new(SwapchainAdequacyCheck),
        ])
    }

    /// Append a requirement evaluated after the existing ones
    pub fn with_check(mut self, check: impl SuitabilityCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    /// Pick the first device that passes every check
    pub fn select(&self, query: &dyn DeviceQuery) -> InitResult<SelectedDevice> {
        let devices = query.physical_devices()?;

        if devices.is_empty() {
            return Err(InitError::NoSuitableDevice("no Vulkan-capable GPU found".into()));
        }

        log::info!("Found {} physical device(s)", devices.len());

        let mut rejections = Vec::new();

        for device in devices {
            let mut candidate = PhysicalDeviceCandidate::new(device, query.device_name(device));

            match self.evaluate(query, &mut candidate)? {
                Verdict::Pass => {
                    let families = candidate.queue_families.complete().ok_or_else(|| {
                        InitError::NoSuitableDevice(format!(
                            "{}: passed every check but its queue families are unknown",
                            candidate.name
                        ))
                    })?;

                    log::info!(
                        "Selected GPU: {} (graphics family {}, present family {})",
                        candidate.name,
                        families.graphics,
                        families.present
                    );

                    return Ok(SelectedDevice {
                        handle: candidate.handle,
                        name: candidate.name,
                        families,
                    });
                }
                Verdict::Reject(reason) => {
                    log::info!("Skipping GPU '{}': {}", candidate.name, reason);
                    rejections.push(format!("{}: {}", candidate.name, reason));
                }
            }
        }

        Err(InitError::NoSuitableDevice(rejections.join("; ")))
    }

    fn evaluate(
        &self,
        query: &dyn DeviceQuery,
        candidate: &mut PhysicalDeviceCandidate,
    ) -> InitResult<Verdict> {
        for check in &self.checks {
            if let Verdict::Reject(reason) = check.evaluate(query, candidate)? {
                return Ok(Verdict::Reject(format!("{} check failed, {}", check.name(), reason)));
            }
        }
        Ok(Verdict::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::RefCell;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn adequate_support() -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    #[derive(Clone)]
    struct FakeDevice {
        name: &'static str,
        families: Vec<vk::QueueFamilyProperties>,
        present_families: Vec<u32>,
        extensions: Vec<&'static CStr>,
        support: SwapchainSupportDetails,
    }

    impl FakeDevice {
        fn capable(name: &'static str) -> Self {
            Self {
                name,
                families: vec![family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)],
                present_families: vec![0],
                extensions: vec![khr::Swapchain::name()],
                support: adequate_support(),
            }
        }
    }

    #[derive(Default)]
    struct FakeQuery {
        devices: Vec<FakeDevice>,
        evaluated: RefCell<Vec<&'static str>>,
        swapchain_queries: RefCell<Vec<&'static str>>,
    }

    impl FakeQuery {
        fn new(devices: Vec<FakeDevice>) -> Self {
            Self {
                devices,
                ..Default::default()
            }
        }

        fn get(&self, device: vk::PhysicalDevice) -> &FakeDevice {
            &self.devices[device.as_raw() as usize - 1]
        }
    }

    impl DeviceQuery for FakeQuery {
        fn physical_devices(&self) -> InitResult<Vec<vk::PhysicalDevice>> {
            Ok((1..=self.devices.len() as u64)
                .map(vk::PhysicalDevice::from_raw)
                .collect())
        }

        fn device_name(&self, device: vk::PhysicalDevice) -> String {
            self.get(device).name.to_string()
        }

        fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
            let fake = self.get(device);
            self.evaluated.borrow_mut().push(fake.name);
            fake.families.clone()
        }

        fn supports_present(&self, device: vk::PhysicalDevice, family: u32) -> InitResult<bool> {
            Ok(self.get(device).present_families.contains(&family))
        }

        fn device_extensions(&self, device: vk::PhysicalDevice) -> InitResult<Vec<CString>> {
            Ok(self
                .get(device)
                .extensions
                .iter()
                .map(|&ext| ext.to_owned())
                .collect())
        }

        fn swapchain_support(
            &self,
            device: vk::PhysicalDevice,
        ) -> InitResult<SwapchainSupportDetails> {
            let fake = self.get(device);
            self.swapchain_queries.borrow_mut().push(fake.name);
            Ok(fake.support.clone())
        }
    }

    fn selector() -> DeviceSelector {
        DeviceSelector::with_required_extensions(required_device_extensions())
    }

    #[test]
    fn discovery_finds_present_family_after_graphics_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
        ];

        let indices =
            QueueFamilyIndices::discover(&families, |index| Ok::<_, ()>(index == 2)).unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(2));
        assert!(indices.is_complete());
    }

    #[test]
    fn discovery_stops_once_both_roles_are_found() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut asked = Vec::new();

        let indices = QueueFamilyIndices::discover(&families, |index| {
            asked.push(index);
            Ok::<_, ()>(true)
        })
        .unwrap();

        assert_eq!(indices.complete(), Some(QueueFamilies { graphics: 0, present: 0 }));
        assert_eq!(asked, vec![0]);
    }

    #[test]
    fn discovery_keeps_first_graphics_family() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];

        let indices =
            QueueFamilyIndices::discover(&families, |index| Ok::<_, ()>(index == 2)).unwrap();

        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(2));
    }

    #[test]
    fn discovery_without_present_support_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::discover(&families, |_| Ok::<_, ()>(false)).unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, None);
        assert!(indices.complete().is_none());
    }

    #[test]
    fn unique_families_collapse_shared_family() {
        let shared = QueueFamilies { graphics: 0, present: 0 };
        assert_eq!(shared.unique(), vec![0]);
        assert!(shared.is_shared());

        let split = QueueFamilies { graphics: 0, present: 2 };
        assert_eq!(split.unique(), vec![0, 2]);
        assert!(!split.is_shared());
    }

    #[test]
    fn empty_enumeration_is_no_suitable_device() {
        let query = FakeQuery::new(Vec::new());
        assert!(matches!(
            selector().select(&query),
            Err(InitError::NoSuitableDevice(_))
        ));
    }

    #[test]
    fn device_without_swapchain_extension_is_rejected() {
        let mut device = FakeDevice::capable("no swapchain");
        device.extensions = vec![];
        let query = FakeQuery::new(vec![device]);

        let err = selector().select(&query).unwrap_err();
        match err {
            InitError::NoSuitableDevice(reason) => {
                assert!(reason.contains("VK_KHR_swapchain"), "{}", reason);
            }
            other => panic!("unexpected error: {}", other),
        }
        // Swapchain support is never queried without the extension
        assert!(query.swapchain_queries.borrow().is_empty());
    }

    #[test]
    fn device_without_present_modes_is_rejected() {
        let mut device = FakeDevice::capable("no modes");
        device.support.present_modes.clear();
        let query = FakeQuery::new(vec![device]);

        assert!(matches!(
            selector().select(&query),
            Err(InitError::NoSuitableDevice(_))
        ));
    }

    #[test]
    fn first_suitable_device_wins_and_later_ones_are_not_evaluated() {
        let mut first = FakeDevice::capable("headless");
        first.present_families.clear();
        let second = FakeDevice::capable("second");
        let third = FakeDevice::capable("third");
        let query = FakeQuery::new(vec![first, second, third]);

        let selected = selector().select(&query).unwrap();

        assert_eq!(selected.name, "second");
        assert_eq!(selected.handle, vk::PhysicalDevice::from_raw(2));
        assert_eq!(selected.families, QueueFamilies { graphics: 0, present: 0 });
        assert_eq!(*query.evaluated.borrow(), vec!["headless", "second"]);
    }

    #[test]
    fn split_graphics_and_present_families_are_selected() {
        let mut device = FakeDevice::capable("split");
        device.families = vec![
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        device.present_families = vec![1];
        let query = FakeQuery::new(vec![device]);

        let selected = selector().select(&query).unwrap();
        assert_eq!(selected.families, QueueFamilies { graphics: 0, present: 1 });
    }

    struct RejectNamed(&'static str);

    impl SuitabilityCheck for RejectNamed {
        fn name(&self) -> &'static str {
            "blocklist"
        }

        fn evaluate(
            &self,
            _query: &dyn DeviceQuery,
            candidate: &mut PhysicalDeviceCandidate,
        ) -> InitResult<Verdict> {
            if candidate.name == self.0 {
                Ok(Verdict::Reject("blocked".into()))
            } else {
                Ok(Verdict::Pass)
            }
        }
    }

    #[test]
    fn extra_checks_extend_the_requirements() {
        let query = FakeQuery::new(vec![
            FakeDevice::capable("blocked"),
            FakeDevice::capable("allowed"),
        ]);

        let selected = selector()
            .with_check(RejectNamed("blocked"))
            .select(&query)
            .unwrap();

        assert_eq!(selected.name, "allowed");
    }
}
