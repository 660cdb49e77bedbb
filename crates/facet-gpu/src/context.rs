//! GPU context management.

use crate::error::{GpuError, Result};
use crate::instance::{create_instance, device_supports_extensions, score_physical_device};
use crate::surface::{create_surface, SurfaceCapabilities};
use crate::swapchain::{calculate_extent, Swapchain};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CStr;
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) surface_loader: ash::khr::surface::Instance,
    pub(crate) swapchain_loader: ash::khr::swapchain::Device,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,

    // Queue families and queues
    pub(crate) graphics_queue_family: u32,
    pub(crate) present_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get a shared handle to the device, for use from another thread.
    pub fn shared_device(&self) -> Arc<ash::Device> {
        Arc::clone(&self.device)
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the surface handle.
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the swapchain extension loader.
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get the present queue family index.
    pub fn present_queue_family(&self) -> u32 {
        self.present_queue_family
    }

    /// Wait for the device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }

    /// Create a swapchain for the context's surface.
    ///
    /// # Safety
    /// The context must be valid and the surface must not already have a
    /// swapchain attached.
    pub unsafe fn create_swapchain(&self, width: u32, height: u32, vsync: bool) -> Result<Swapchain> {
        let caps = SurfaceCapabilities::query(&self.surface_loader, self.physical_device, self.surface)?;

        let surface_format = caps.recommended_format();
        let present_mode = caps.recommended_present_mode(vsync);
        let extent = calculate_extent(&caps.capabilities, width, height);

        Swapchain::new(
            &self.device,
            &self.swapchain_loader,
            self.surface,
            &caps.capabilities,
            surface_format,
            present_mode,
            extent,
        )
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Facet".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context for the given window.
    pub fn build<W>(self, window: &W) -> Result<GpuContext>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        // Load Vulkan entry point
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        // Create Vulkan instance
        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation) }?;

        // Create the presentation surface before device selection: present
        // support is queried per queue family against this surface.
        let surface = unsafe { create_surface(&entry, &instance, window) }?;
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        // Select best physical device
        let (physical_device, queue_families) =
            unsafe { select_physical_device(&instance, &surface_loader, surface) }?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        tracing::info!("Selected GPU: {}", device_name.to_string_lossy());

        // Create logical device
        let (device, graphics_queue, present_queue) =
            unsafe { create_device(&instance, physical_device, &queue_families)? };

        let device = Arc::new(device);
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

        Ok(GpuContext {
            entry,
            instance,
            surface,
            surface_loader,
            swapchain_loader,
            physical_device,
            device,
            graphics_queue_family: queue_families.graphics,
            present_queue_family: queue_families.present,
            graphics_queue,
            present_queue,
        })
    }
}

/// Queue family indices.
struct QueueFamilyIndices {
    graphics: u32,
    present: u32,
}

/// Required device extensions.
fn required_device_extensions() -> Vec<&'static CStr> {
    vec![ash::khr::swapchain::NAME]
}

/// Select the best physical device that can render and present.
///
/// # Safety
/// The instance, surface loader, and surface must be valid.
unsafe fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
    let devices = instance.enumerate_physical_devices()?;

    if devices.is_empty() {
        return Err(GpuError::NoSuitableDevice);
    }

    let mut best: Option<(vk::PhysicalDevice, QueueFamilyIndices)> = None;
    let mut best_score = -1i32;

    for device in devices {
        if !device_supports_extensions(instance, device, &required_device_extensions()) {
            continue;
        }

        let Some(families) = find_queue_families(instance, device, surface_loader, surface) else {
            continue;
        };

        let score = score_physical_device(instance, device);
        if score > best_score {
            best_score = score;
            best = Some((device, families));
        }
    }

    best.ok_or(GpuError::NoSuitableDevice)
}

/// Find queue families supporting graphics and presentation to the surface.
///
/// # Safety
/// All handles must be valid.
unsafe fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Option<QueueFamilyIndices> {
    let queue_families = instance.get_physical_device_queue_family_properties(physical_device);

    let mut graphics_family = None;
    let mut present_family = None;

    for (i, family) in queue_families.iter().enumerate() {
        let i = i as u32;

        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
            graphics_family = Some(i);
        }

        let present_supported = surface_loader
            .get_physical_device_surface_support(physical_device, i, surface)
            .unwrap_or(false);
        if present_supported && present_family.is_none() {
            present_family = Some(i);
        }

        if graphics_family.is_some() && present_family.is_some() {
            break;
        }
    }

    Some(QueueFamilyIndices {
        graphics: graphics_family?,
        present: present_family?,
    })
}

/// Create the logical device and retrieve queues.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: &QueueFamilyIndices,
) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
    // Collect unique queue families
    let mut unique_families = std::collections::HashSet::new();
    unique_families.insert(queue_families.graphics);
    unique_families.insert(queue_families.present);

    // Create queue create infos
    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    // Get required extensions
    let extensions = required_device_extensions();
    let extension_names: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let features = vk::PhysicalDeviceFeatures::default();

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .map_err(GpuError::from)?;

    // Get queue handles
    let graphics_queue = device.get_device_queue(queue_families.graphics, 0);
    let present_queue = device.get_device_queue(queue_families.present, 0);

    Ok((device, graphics_queue, present_queue))
}
