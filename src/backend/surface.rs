// Surface - the window's presentable target
//
// The windowing layer is a collaborator: it tells us which instance
// extensions it needs, creates the platform surface, and reports its
// drawable size when the surface leaves the extent up to us.

use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::CStr;
use std::sync::Arc;

use super::error::{InitError, InitResult};
use super::Instance;

/// What the context needs from a window
pub trait PresentationWindow {
    /// Instance extensions the platform surface requires
    fn required_extensions(&self) -> InitResult<Vec<&'static CStr>>;

    /// Create a surface bound to `instance`.
    ///
    /// # Safety
    /// The returned surface must be destroyed before the window is.
    unsafe fn create_surface(&self, instance: &Instance) -> InitResult<vk::SurfaceKHR>;

    /// Current drawable size in pixels
    fn drawable_size(&self) -> (u32, u32);
}

impl PresentationWindow for winit::window::Window {
    fn required_extensions(&self) -> InitResult<Vec<&'static CStr>> {
        let names = ash_window::enumerate_required_extensions(self.raw_display_handle())
            .map_err(InitError::init("surface"))?;

        // ash-window hands out static NUL-terminated extension names
        Ok(names.iter().map(|&name| unsafe { CStr::from_ptr(name) }).collect())
    }

    unsafe fn create_surface(&self, instance: &Instance) -> InitResult<vk::SurfaceKHR> {
        ash_window::create_surface(
            instance.entry(),
            instance.handle(),
            self.raw_display_handle(),
            self.raw_window_handle(),
            None,
        )
        .map_err(InitError::init("surface"))
    }

    fn drawable_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }
}

/// Owned surface. Keeps the instance alive until it is destroyed.
pub struct Surface {
    loader: khr::Surface,
    handle: vk::SurfaceKHR,
    _instance: Arc<Instance>,
}

impl Surface {
    /// # Safety
    /// `window` must outlive the returned surface.
    pub unsafe fn new<W: PresentationWindow + ?Sized>(
        instance: &Arc<Instance>,
        window: &W,
    ) -> InitResult<Arc<Self>> {
        let handle = window.create_surface(instance)?;
        let loader = khr::Surface::new(instance.entry(), instance.handle());

        log::debug!("Created window surface");

        Ok(Arc::new(Self {
            loader,
            handle,
            _instance: instance.clone(),
        }))
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    pub fn loader(&self) -> &khr::Surface {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        log::debug!("Destroying window surface");
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}
