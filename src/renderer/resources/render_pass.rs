use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::DeviceContext;

/// Single-subpass render pass. Color attachments come first, then the optional depth attachment.
pub struct RenderPass {
    pub render_pass: vk::RenderPass,
    color_attachment_count: usize,
    has_depth_attachment: bool,
    invert_faces: bool,
    ctx: Arc<DeviceContext>,
}

impl RenderPass {
    pub fn new(
        ctx: Arc<DeviceContext>,
        color_attachments: &[vk::AttachmentDescription],
        depth_attachment: Option<vk::AttachmentDescription>,
        invert_faces: bool,
    ) -> Result<Self> {
        let mut attachments = color_attachments.to_vec();
        let color_refs: Vec<vk::AttachmentReference> = (0..color_attachments.len())
            .map(|attachment| vk::AttachmentReference {
                attachment: attachment as u32,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect();
        let depth_ref = depth_attachment.map(|depth| {
            attachments.push(depth);
            vk::AttachmentReference {
                attachment: color_attachments.len() as u32,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }
        });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass];

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses);
        let render_pass = unsafe { ctx.device().create_render_pass(&info, None)? };

        log::debug!(
            "Created render pass with {} color attachments{}",
            color_attachments.len(),
            if depth_attachment.is_some() { " and depth" } else { "" },
        );

        Ok(Self {
            render_pass,
            color_attachment_count: color_attachments.len(),
            has_depth_attachment: depth_attachment.is_some(),
            invert_faces,
            ctx,
        })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn color_attachment_count(&self) -> usize {
        self.color_attachment_count
    }

    pub fn has_color_attachments(&self) -> bool {
        self.color_attachment_count > 0
    }

    pub fn has_depth_attachment(&self) -> bool {
        self.has_depth_attachment
    }

    pub fn should_invert_faces(&self) -> bool {
        self.invert_faces
    }

    /// Begin the pass inline and point the dynamic viewport and scissor at `render_area`
    pub fn begin(
        &self,
        cmd: vk::CommandBuffer,
        framebuffer: &Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        let device = self.ctx.device();
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer.framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);
        let viewport = vk::Viewport {
            x: render_area.offset.x as f32,
            y: render_area.offset.y as f32,
            width: render_area.extent.width as f32,
            height: render_area.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            device.cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);
        }
    }

    pub fn end(&self, cmd: vk::CommandBuffer) {
        unsafe {
            self.ctx.device().cmd_end_render_pass(cmd);
        }
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_render_pass(self.render_pass, None);
        }
    }
}

pub struct Framebuffer {
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    render_pass: Arc<RenderPass>,
}

impl Framebuffer {
    pub fn new(
        ctx: Arc<DeviceContext>,
        render_pass: Arc<RenderPass>,
        attachments: &[vk::ImageView],
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let expected = render_pass.color_attachment_count()
            + usize::from(render_pass.has_depth_attachment());
        if attachments.len() != expected {
            return Err(eyre!(
                "Framebuffer has {} attachments but its render pass expects {}",
                attachments.len(),
                expected,
            ));
        }

        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.render_pass)
            .attachments(attachments)
            .width(width)
            .height(height)
            .layers(1);
        let framebuffer = unsafe { ctx.device().create_framebuffer(&info, None)? };

        Ok(Self {
            framebuffer,
            extent: vk::Extent2D { width, height },
            render_pass,
        })
    }

    pub fn render_pass(&self) -> &Arc<RenderPass> {
        &self.render_pass
    }

    /// Area covering the whole framebuffer
    pub fn full_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.extent,
        }
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.render_pass.ctx.device().destroy_framebuffer(self.framebuffer, None);
        }
    }
}
