//! Vulkan abstraction layer for the Facet renderer.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - Surface and swapchain handling
//! - Render pass, framebuffer, and graphics pipeline creation
//! - Command buffer management
//! - Frame synchronization primitives

pub mod command;
pub mod context;
pub mod error;
pub mod instance;
pub mod pass;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use surface::SurfaceCapabilities;
pub use swapchain::Swapchain;
pub use sync::{create_fence, create_semaphore, FrameSync, FrameSyncManager};
