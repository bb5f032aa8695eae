// Swapchain - Window presentation
//
// Negotiation is pure: given what the surface supports, pick format,
// present mode, extent, image count and sharing. Creation then builds the
// swapchain and one color view per image.

use ash::extensions::khr;
use ash::vk;
use std::sync::Arc;

use super::error::{InitError, InitResult};
use super::selector::QueueFamilies;
use super::{LogicalDevice, Surface};

/// What a surface offers on a given physical device
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// How swapchain images are shared between queue families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSharing {
    Exclusive,
    Concurrent([u32; 2]),
}

impl ImageSharing {
    pub fn for_families(families: &QueueFamilies) -> Self {
        if families.is_shared() {
            Self::Exclusive
        } else {
            Self::Concurrent([families.graphics, families.present])
        }
    }

    pub fn mode(&self) -> vk::SharingMode {
        match self {
            Self::Exclusive => vk::SharingMode::EXCLUSIVE,
            Self::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    pub fn family_indices(&self) -> &[u32] {
        match self {
            Self::Exclusive => &[],
            Self::Concurrent(families) => families,
        }
    }
}

/// Negotiated swapchain parameters
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub sharing: ImageSharing,
}

impl SwapchainConfig {
    /// Pick every swapchain parameter from the surface's offer.
    ///
    /// `drawable_size` is only called when the surface leaves the extent to us.
    pub fn negotiate(
        support: &SwapchainSupportDetails,
        families: &QueueFamilies,
        drawable_size: impl FnOnce() -> (u32, u32),
    ) -> InitResult<Self> {
        let surface_format = choose_surface_format(&support.formats)
            .ok_or(InitError::SwapchainCreation(vk::Result::ERROR_FORMAT_NOT_SUPPORTED))?;

        Ok(Self {
            image_count: choose_image_count(&support.capabilities),
            surface_format,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, drawable_size),
            pre_transform: support.capabilities.current_transform,
            sharing: ImageSharing::for_families(families),
        })
    }
}

/// BGRA8 sRGB with the sRGB nonlinear color space, else whatever comes first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

// MAILBOX: No vsync, no tearing, triple buffered
// FIFO: Vsync enabled, guaranteed available
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// A current width of u32::MAX means the surface size follows the swapchain
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable_size: impl FnOnce() -> (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = drawable_size();
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum (0 means no maximum)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }
    image_count
}

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub config: SwapchainConfig,
    device: Arc<LogicalDevice>,
    _surface: Arc<Surface>,
}

impl Swapchain {
    pub fn new(
        device: &Arc<LogicalDevice>,
        surface: &Arc<Surface>,
        config: SwapchainConfig,
    ) -> InitResult<Self> {
        log::info!(
            "Creating swapchain: {}x{}, {:?}/{:?}, {:?}, {} images requested, {:?} sharing",
            config.extent.width,
            config.extent.height,
            config.surface_format.format,
            config.surface_format.color_space,
            config.present_mode,
            config.image_count,
            config.sharing.mode(),
        );

        let loader = khr::Swapchain::new(device.instance().handle(), device.handle());

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(config.sharing.mode())
            .queue_family_indices(config.sharing.family_indices())
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let handle = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(InitError::SwapchainCreation)?;

        // From here on, dropping `swapchain` releases whatever was created
        let mut swapchain = Self {
            handle,
            loader,
            images: Vec::new(),
            image_views: Vec::new(),
            config,
            device: device.clone(),
            _surface: surface.clone(),
        };

        swapchain.images = unsafe { swapchain.loader.get_swapchain_images(handle) }
            .map_err(InitError::SwapchainCreation)?;

        log::info!("Created swapchain with {} images", swapchain.images.len());

        swapchain.create_image_views()?;

        Ok(swapchain)
    }

    fn create_image_views(&mut self) -> InitResult<()> {
        let format = self.config.surface_format.format;

        for (index, &image) in self.images.iter().enumerate() {
            let create_info = image_view_info(image, format);

            let view = unsafe { self.device.handle().create_image_view(&create_info, None) }
                .map_err(|result| InitError::ResourceCreation {
                    resource: "image view",
                    index,
                    result,
                })?;

            self.image_views.push(view);
        }

        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        log::debug!(
            "Destroying {} image views and the swapchain",
            self.image_views.len()
        );
        unsafe {
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

/// 2D color view over the whole of a single-level, single-layer image
fn image_view_info(image: vk::Image, format: vk::Format) -> vk::ImageViewCreateInfo {
    vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build()
}
