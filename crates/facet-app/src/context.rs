//! Application context.

use std::sync::Arc;

use ash::vk;
use facet_gpu::command::CommandPool;
use facet_gpu::pass::{create_framebuffers, create_render_pass};
use facet_gpu::swapchain::Swapchain;
use facet_gpu::sync::FrameSyncManager;
use facet_gpu::GpuContext;
use winit::window::Window;

/// Number of frames that may be in flight at once.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Rendering resources shared across the application's lifetime.
///
/// The window is fixed-size and non-resizable, so the swapchain and
/// framebuffers created here are never recreated.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// GPU context with device and queues.
    pub gpu: GpuContext,
    /// The swapchain.
    pub swapchain: Swapchain,
    /// Render pass drawing into the swapchain images.
    pub render_pass: vk::RenderPass,
    /// One framebuffer per swapchain image view.
    pub framebuffers: Vec<vk::Framebuffer>,
    /// Command pool for the per-frame command buffers.
    pub command_pool: CommandPool,
    /// One primary command buffer per frame slot.
    pub(crate) command_buffers: Vec<vk::CommandBuffer>,
    /// Per-frame synchronization ring.
    pub(crate) frame_sync: FrameSyncManager,
    /// Total frames rendered.
    pub frame_count: u64,
}

impl AppContext {
    /// Create a new application context.
    ///
    /// # Safety
    /// The window must have valid handles.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        gpu: GpuContext,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        // SAFETY: GPU context is valid
        let swapchain = unsafe { gpu.create_swapchain(width, height, vsync)? };

        tracing::info!(
            "Swapchain created: {}x{} ({} images)",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len()
        );

        // SAFETY: Device is valid
        let render_pass = unsafe { create_render_pass(gpu.device(), swapchain.format)? };
        // SAFETY: Device, render pass, and image views are valid
        let framebuffers = unsafe {
            create_framebuffers(
                gpu.device(),
                render_pass,
                &swapchain.image_views,
                swapchain.extent,
            )?
        };

        // SAFETY: Device is valid and the queue family exists
        let command_pool = unsafe {
            CommandPool::new(
                gpu.device(),
                gpu.graphics_queue_family(),
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };
        // SAFETY: Device and command pool are valid
        let command_buffers =
            unsafe { command_pool.allocate_command_buffers(gpu.device(), FRAMES_IN_FLIGHT as u32)? };

        // SAFETY: Device is valid
        let frame_sync = unsafe { FrameSyncManager::new(gpu.device(), FRAMES_IN_FLIGHT)? };

        Ok(Self {
            window,
            gpu,
            swapchain,
            render_pass,
            framebuffers,
            command_pool,
            command_buffers,
            frame_sync,
            frame_count: 0,
        })
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Wait for all frame fences (all in-flight submissions) to complete.
    pub fn wait_for_all_in_flight_frames(&self) -> anyhow::Result<()> {
        unsafe {
            self.frame_sync.wait_all(self.gpu.device(), u64::MAX)?;
        }
        Ok(())
    }

    /// Cleanup all resources.
    ///
    /// # Safety
    /// The GPU must be idle and all resources must not be in use.
    pub(crate) unsafe fn cleanup(&mut self) {
        let device = self.gpu.device();

        // SAFETY: Caller guarantees GPU is idle and resources are not in use
        unsafe {
            self.frame_sync.destroy(device);
            self.command_pool.destroy(device);

            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            self.framebuffers.clear();

            device.destroy_render_pass(self.render_pass, None);
            self.swapchain.destroy(device, self.gpu.swapchain_loader());
        }
    }
}
