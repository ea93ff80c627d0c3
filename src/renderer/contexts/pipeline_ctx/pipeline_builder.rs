use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::resources::vertex::VertexFormat;

/// Blending is only worth enabling when the factors do something other than overwrite
pub fn blend_enabled(src: vk::BlendFactor, dst: vk::BlendFactor) -> bool {
    (src, dst) != (vk::BlendFactor::ONE, vk::BlendFactor::ZERO)
}

pub fn cull_mode(invert_faces: bool) -> vk::CullModeFlags {
    if invert_faces {
        vk::CullModeFlags::FRONT
    } else {
        vk::CullModeFlags::BACK
    }
}

/// Depth-only passes skip the fragment stage
pub fn stage_used(stage: vk::ShaderStageFlags, pass_has_color: bool) -> bool {
    pass_has_color || stage != vk::ShaderStageFlags::FRAGMENT
}

pub fn color_blend_attachment(
    src: vk::BlendFactor,
    dst: vk::BlendFactor,
) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(blend_enabled(src, dst))
        .src_color_blend_factor(src)
        .dst_color_blend_factor(dst)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(src)
        .dst_alpha_blend_factor(dst)
        .alpha_blend_op(vk::BlendOp::ADD)
}

/// Graphics pipeline for one subpass of a classic render pass, viewport and scissor left dynamic
pub struct GraphicsPipelineBuilder<'a> {
    vertex_format: Option<&'a VertexFormat>,
    stages: Vec<vk::PipelineShaderStageCreateInfo<'static>>,
    input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'static>,
    rasterization: vk::PipelineRasterizationStateCreateInfo<'static>,
    color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    multisample: vk::PipelineMultisampleStateCreateInfo<'static>,
    depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'static>,
    render_pass: Option<vk::RenderPass>,
    pipeline_layout: Option<vk::PipelineLayout>,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self {
            vertex_format: None,
            stages: Vec::new(),
            input_assembly: Self::default_input_assembly_info(),
            rasterization: Self::default_rasterization_info(),
            color_blend_attachments: Vec::new(),
            multisample: Self::default_multisample_info(),
            depth_stencil: Self::default_depth_stencil_info(),
            render_pass: None,
            pipeline_layout: None,
        }
    }

    pub fn with_vertex_format(mut self, format: &'a VertexFormat) -> Self {
        self.vertex_format = Some(format);
        self
    }

    pub fn with_stage(mut self, stage: vk::PipelineShaderStageCreateInfo<'static>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_render_pass(mut self, render_pass: vk::RenderPass) -> Self {
        self.render_pass = Some(render_pass);
        self
    }

    pub fn with_pipeline_layout(mut self, layout: vk::PipelineLayout) -> Self {
        self.pipeline_layout = Some(layout);
        self
    }

    pub fn with_face_culling(mut self, invert_faces: bool) -> Self {
        self.rasterization.cull_mode = cull_mode(invert_faces);
        self.rasterization.front_face = vk::FrontFace::COUNTER_CLOCKWISE;
        self
    }

    pub fn with_depth(mut self, test: bool, write: bool) -> Self {
        self.depth_stencil.depth_test_enable = test.into();
        self.depth_stencil.depth_write_enable = write.into();
        self.depth_stencil.depth_compare_op = vk::CompareOp::LESS;
        self
    }

    /// Same blend state for each of the pass's `attachment_count` color attachments
    pub fn with_blending(
        mut self,
        attachment_count: usize,
        src: vk::BlendFactor,
        dst: vk::BlendFactor,
    ) -> Self {
        self.color_blend_attachments = vec![color_blend_attachment(src, dst); attachment_count];
        self
    }

    pub fn build(self, device: &ash::Device) -> Result<vk::Pipeline> {
        let render_pass = self.render_pass
            .ok_or_eyre("No render pass provided for GraphicsPipelineBuilder")?;
        let pipeline_layout = self.pipeline_layout
            .ok_or_eyre("No pipeline layout provided for GraphicsPipelineBuilder")?;
        if self.stages.is_empty() {
            return Err(eyre!("No shader stages provided for GraphicsPipelineBuilder"));
        }

        let empty_format = VertexFormat::default();
        let vertex_input = self.vertex_format.unwrap_or(&empty_format).input_state();

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&self.color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_info = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&self.stages)
            .layout(pipeline_layout)
            .render_pass(render_pass)
            .subpass(0)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&self.input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&self.rasterization)
            .multisample_state(&self.multisample)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&self.depth_stencil)
            .dynamic_state(&dynamic_info);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| eyre!("Failed to create graphics pipeline: {}", e))?
        };
        pipelines.first().copied().ok_or_eyre("Driver returned no pipeline")
    }

    fn default_input_assembly_info() -> vk::PipelineInputAssemblyStateCreateInfo<'static> {
        vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false)
    }

    fn default_rasterization_info() -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(cull_mode(false))
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false)
    }

    fn default_multisample_info() -> vk::PipelineMultisampleStateCreateInfo<'static> {
        vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            // 1 sample per pixel means no multisampling
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0)
    }

    fn default_depth_stencil_info() -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false)
    }
}
