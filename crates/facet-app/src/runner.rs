//! Application runner and render loop.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use facet_gpu::command::submit_command_buffers;
use facet_gpu::pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
use facet_gpu::GpuContextBuilder;
use facet_reload::watcher::DEFAULT_POLL_INTERVAL;
use facet_reload::{FileWatcher, SwapSlot};
use facet_shaders::{CompiledShaders, ShaderSet};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::context::AppContext;

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Window width (the window is not resizable).
    pub width: u32,
    /// Window height (the window is not resizable).
    pub height: u32,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// The watched shader sources.
    pub shaders: ShaderSet,
    /// Interval between shader file polls.
    pub poll_interval: Duration,
}

impl AppConfig {
    /// Create a new config with the given title and shader sources.
    pub fn new(title: impl Into<String>, shaders: ShaderSet) -> Self {
        Self {
            title: title.into(),
            width: 640,
            height: 480,
            vsync: false,
            validation: cfg!(debug_assertions),
            shaders,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the shader poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Run the renderer with the given configuration.
///
/// This function initializes logging, creates the window and GPU context,
/// starts the shader watcher, and runs the event loop until the window is
/// closed or a frame fails.
pub fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner {
        config,
        state: None,
    };

    if let Err(e) = event_loop.run_app(&mut runner) {
        error!("Event loop error: {e}");
    }

    Ok(())
}

/// Internal application runner that implements winit's ApplicationHandler.
struct AppRunner {
    config: AppConfig,
    state: Option<AppState>,
}

/// Internal application state.
///
/// Field order matters for the abnormal-exit path: the watcher must stop
/// (joining its thread) before the GPU context is dropped, because the
/// watcher callback holds a shared device handle.
struct AppState {
    watcher: FileWatcher,
    pending: Arc<SwapSlot<GraphicsPipeline>>,
    pipeline: GraphicsPipeline,
    ctx: AppContext,
}

impl ApplicationHandler for AppRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };

                match state.render_frame() {
                    Ok(()) => state.ctx.window.request_redraw(),
                    // Native-API failures are fatal: no retry, drain and exit.
                    Err(e) => {
                        error!("Render error: {e:#}");
                        if let Some(mut state) = self.state.take() {
                            state.cleanup();
                        }
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl AppRunner {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState> {
        // Create window
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        // Create GPU context
        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build(window.as_ref())?;

        // Create app context
        let ctx = unsafe { AppContext::new(window, gpu, self.config.vsync)? };

        // Build the initial pipeline
        let compiled = self.config.shaders.compile()?;
        let pipeline = unsafe {
            GraphicsPipeline::new(ctx.gpu.device(), &pipeline_config(compiled), ctx.render_pass)?
        };

        // Start watching the shader sources. Rebuilt pipelines are parked in
        // the swap slot; the render loop installs them at its safe point.
        let pending = Arc::new(SwapSlot::new());
        let watcher = spawn_watcher(&self.config, &ctx, Arc::clone(&pending))?;

        Ok(AppState {
            watcher,
            pending,
            pipeline,
            ctx,
        })
    }
}

/// Build a watcher whose callback recompiles the shaders and publishes the
/// resulting pipeline.
///
/// The callback runs on the watcher thread. It never touches the render
/// loop's resources: a successful rebuild goes into the swap slot, a failed
/// one is logged and dropped so the previous pipeline stays active.
fn spawn_watcher(
    config: &AppConfig,
    ctx: &AppContext,
    pending: Arc<SwapSlot<GraphicsPipeline>>,
) -> anyhow::Result<FileWatcher> {
    let device = ctx.gpu.shared_device();
    let render_pass = ctx.render_pass;
    let shaders = config.shaders.clone();

    let mut watcher = FileWatcher::with_interval(
        shaders.watch_paths(),
        config.poll_interval,
        move |path| {
            info!("shader changed: {}", path.display());

            let rebuilt = shaders
                .compile()
                .map_err(anyhow::Error::from)
                .and_then(|compiled| {
                    unsafe { GraphicsPipeline::new(&device, &pipeline_config(compiled), render_pass) }
                        .map_err(anyhow::Error::from)
                });

            match rebuilt {
                Ok(pipeline) => {
                    if let Some(stale) = pending.publish(pipeline) {
                        // Displaced before it was ever installed; destroying
                        // it needs no fence wait.
                        unsafe { stale.destroy(&device) };
                    }
                }
                Err(e) => {
                    warn!("shader rebuild failed, keeping current pipeline: {e:#}");
                }
            }
        },
    )?;

    watcher.start();
    Ok(watcher)
}

fn pipeline_config(compiled: CompiledShaders) -> GraphicsPipelineConfig {
    GraphicsPipelineConfig {
        vertex_shader: compiled.vertex,
        fragment_shader: compiled.fragment,
        ..Default::default()
    }
}

impl AppState {
    /// Render one frame.
    fn render_frame(&mut self) -> anyhow::Result<()> {
        // The one safe point per frame for swapping in a rebuilt pipeline.
        self.install_pending_pipeline()?;

        let device = self.ctx.gpu.device();
        let frame = self.ctx.frame_sync.current();
        let command_buffer = self.ctx.command_buffers[self.ctx.frame_sync.current_frame()];

        unsafe {
            // Wait for this frame slot's fence
            frame.wait(device)?;

            // Acquire swapchain image
            let (image_index, _suboptimal) = self.ctx.swapchain.acquire_next_image(
                self.ctx.gpu.swapchain_loader(),
                frame.image_available,
                u64::MAX,
            )?;

            // Reset fence after successful acquire
            frame.reset(device)?;

            // Record the draw
            device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(command_buffer, &begin_info)?;

            self.record_draw(command_buffer, image_index);

            device.end_command_buffer(command_buffer)?;

            // Submit
            let wait_semaphores = [frame.image_available];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let signal_semaphores = [frame.render_finished];
            let command_buffers = [command_buffer];

            submit_command_buffers(
                device,
                self.ctx.gpu.graphics_queue(),
                &command_buffers,
                &wait_semaphores,
                &wait_stages,
                &signal_semaphores,
                frame.in_flight,
            )?;

            // Present
            self.ctx.swapchain.present(
                self.ctx.gpu.swapchain_loader(),
                self.ctx.gpu.present_queue(),
                image_index,
                &signal_semaphores,
            )?;
        }

        self.ctx.frame_sync.advance();
        self.ctx.frame_count += 1;

        Ok(())
    }

    /// Install a rebuilt pipeline if one is pending.
    ///
    /// Quiescing waits on every slot's fence, so no in-flight command buffer
    /// can still reference the pipeline being destroyed.
    fn install_pending_pipeline(&mut self) -> anyhow::Result<()> {
        let device = self.ctx.gpu.shared_device();
        let frame_sync = &self.ctx.frame_sync;
        let pipeline = &mut self.pipeline;

        let installed = self.pending.drain_with(
            || unsafe { frame_sync.wait_all(&device, u64::MAX) },
            |new| {
                let old = std::mem::replace(pipeline, new);
                unsafe { old.destroy(&device) };
            },
        )?;

        if installed {
            info!("installed rebuilt pipeline");
        }

        Ok(())
    }

    /// Record the render pass drawing the triangle.
    ///
    /// # Safety
    /// The command buffer must be in the recording state.
    unsafe fn record_draw(&self, command_buffer: vk::CommandBuffer, image_index: u32) {
        let device = self.ctx.gpu.device();
        let extent = self.ctx.swapchain.extent;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.01, 0.01, 0.02, 1.0],
            },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.ctx.render_pass)
            .framebuffer(self.ctx.framebuffers[image_index as usize])
            .render_area(render_area)
            .clear_values(&clear_values);

        let viewport = vk::Viewport::default()
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);

        // SAFETY: Caller guarantees the command buffer is recording
        unsafe {
            device.cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.pipeline,
            );

            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[render_area]);

            device.cmd_draw(command_buffer, 3, 1, 0, 0);
            device.cmd_end_render_pass(command_buffer);
        }
    }

    fn cleanup(&mut self) {
        info!("Starting cleanup...");

        // Stop the watcher first: its callback uses the device.
        self.watcher.stop();

        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        unsafe {
            let device = self.ctx.gpu.shared_device();

            // A rebuild published after the last frame was never installed.
            if let Some(pending) = self.pending.take() {
                pending.destroy(&device);
            }
            self.pipeline.destroy(&device);

            self.ctx.cleanup();
        }

        info!("Cleanup complete ({} frames rendered)", self.ctx.frame_count);
    }
}
