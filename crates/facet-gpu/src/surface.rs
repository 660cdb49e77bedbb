//! Surface creation and capability queries.

use crate::error::{GpuError, Result};
use crate::swapchain::{select_present_mode, select_surface_format};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Create a Vulkan surface from a window.
///
/// # Safety
/// The instance must be valid and the window must have valid handles.
pub unsafe fn create_surface<W>(
    entry: &ash::Entry,
    instance: &ash::Instance,
    window: &W,
) -> Result<vk::SurfaceKHR>
where
    W: HasDisplayHandle + HasWindowHandle,
{
    let display = window
        .display_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
    let window_handle = window
        .window_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

    ash_window::create_surface(
        entry,
        instance,
        display.as_raw(),
        window_handle.as_raw(),
        None,
    )
    .map_err(|e| GpuError::SurfaceCreation(e.to_string()))
}

/// Surface capabilities query result.
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceCapabilities {
    /// Query the surface capabilities of a physical device.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn query(
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        let capabilities =
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?;
        let formats =
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?;
        let present_modes =
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?;

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Get the recommended surface format.
    pub fn recommended_format(&self) -> vk::SurfaceFormatKHR {
        select_surface_format(&self.formats)
    }

    /// Get the recommended present mode.
    pub fn recommended_present_mode(&self, vsync: bool) -> vk::PresentModeKHR {
        select_present_mode(&self.present_modes, vsync)
    }
}
