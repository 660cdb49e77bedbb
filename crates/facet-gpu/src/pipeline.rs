//! Graphics pipeline creation and management.

use crate::error::{GpuError, Result};
use ash::vk;

/// Graphics pipeline configuration.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            vertex_shader: Vec::new(),
            fragment_shader: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Graphics pipeline wrapper.
///
/// Holds the pipeline and its layout as one unit so a hot swap replaces and
/// destroys them together.
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create a graphics pipeline against the given render pass.
    ///
    /// Viewport and scissor are dynamic state, so a pipeline built here is
    /// independent of the swapchain extent.
    ///
    /// # Safety
    /// The device and render pass must be valid and the shader code must be
    /// valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        config: &GraphicsPipelineConfig,
        render_pass: vk::RenderPass,
    ) -> Result<Self> {
        // Create shader modules
        let vert_shader_info = vk::ShaderModuleCreateInfo::default().code(&config.vertex_shader);
        let vert_module = device
            .create_shader_module(&vert_shader_info, None)
            .map_err(|e| GpuError::ShaderModule(format!("Vertex: {e}")))?;

        let frag_shader_info = vk::ShaderModuleCreateInfo::default().code(&config.fragment_shader);
        let frag_module = match device.create_shader_module(&frag_shader_info, None) {
            Ok(module) => module,
            Err(e) => {
                device.destroy_shader_module(vert_module, None);
                return Err(GpuError::ShaderModule(format!("Fragment: {e}")));
            }
        };

        // Shader stages
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(c"main"),
        ];

        // No vertex buffers; vertices come from gl_VertexIndex in the shader
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();

        // Input assembly
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        // Viewport (dynamic)
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        // Rasterization
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false)
            .line_width(1.0);

        // Multisampling
        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        // Color blending
        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];

        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        // Dynamic state
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        // Pipeline layout: no descriptor sets, no push constants
        let layout_info = vk::PipelineLayoutCreateInfo::default();

        let layout = match device.create_pipeline_layout(&layout_info, None) {
            Ok(layout) => layout,
            Err(e) => {
                device.destroy_shader_module(vert_module, None);
                device.destroy_shader_module(frag_module, None);
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };

        // Create pipeline
        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let result =
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None);

        // Clean up shader modules (no longer needed either way)
        device.destroy_shader_module(vert_module, None);
        device.destroy_shader_module(frag_module, None);

        match result {
            Ok(pipelines) => Ok(Self {
                pipeline: pipelines[0],
                layout,
            }),
            Err((_pipelines, e)) => {
                // The hot-reload path retries on the next file change; don't
                // leak the layout in the meantime.
                device.destroy_pipeline_layout(layout, None);
                Err(GpuError::PipelineCreation(e.to_string()))
            }
        }
    }

    /// Destroy the pipeline.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}
