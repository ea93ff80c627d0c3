pub mod config;
pub mod contexts;
pub mod error;
pub mod resources;
pub mod util;

use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use gpu_descriptor::DescriptorTotalCount;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::debug::DebugCallback;
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::draw_ctx::DrawList;
use crate::renderer::contexts::frame_ctx::TransientResourcePool;
use crate::renderer::contexts::pipeline_ctx::{MaterialState, SceneContract, SceneMaterial, ShaderInfo};
use crate::renderer::resources::buffer::StaticBuffer;
use crate::renderer::resources::image::Texture;
use crate::renderer::resources::mesh::{GfxMesh, Mesh};
use crate::renderer::resources::pixels::{validate_cube_faces, PixelImage};
use crate::renderer::resources::render_pass::{Framebuffer, RenderPass};
use crate::renderer::resources::render_target::RenderTarget;
use crate::renderer::resources::sampler::Sampler;
use crate::renderer::resources::shader::Shader;
use crate::renderer::resources::vertex::VertexFormat;

/// Entry point for creating every scene resource against one device
pub struct Renderer {
    ctx: Arc<DeviceContext>,
}

impl Renderer {
    /// See `DeviceContext::new`
    pub fn new(
        entry: Option<&ash::Entry>,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family_index: u32,
        config: RenderConfig,
        debug_callback: Option<DebugCallback>,
    ) -> Result<Self> {
        let ctx = DeviceContext::new(
            entry,
            instance,
            physical_device,
            device,
            queue_family_index,
            config,
            debug_callback,
        )?;
        Ok(Self::from_context(Arc::new(ctx)))
    }

    pub fn from_context(ctx: Arc<DeviceContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }

    pub fn wait_until_device_idle(&self) -> Result<()> {
        self.ctx.wait_idle()
    }

    pub fn create_texture_2d(
        &self,
        width: u32,
        height: u32,
        format: vk::Format,
        pixels: &[u8],
    ) -> Result<Arc<Texture>> {
        let extent = vk::Extent3D { width, height, depth: 1 };
        let texture = Texture::new(self.ctx.clone(), format, extent, &[pixels], vk::ImageViewType::TYPE_2D)?;
        Ok(Arc::new(texture))
    }

    pub fn create_texture_2d_from_image(&self, image: &PixelImage) -> Result<Arc<Texture>> {
        self.create_texture_2d(image.width(), image.height(), image.format(), image.pixels())
    }

    /// Faces in the order +x, -x, +y, -y, +z, -z
    pub fn create_texture_cube(&self, faces: [&PixelImage; 6]) -> Result<Arc<Texture>> {
        let (format, side) = validate_cube_faces(&faces)?;
        let extent = vk::Extent3D { width: side, height: side, depth: 1 };
        let layers = faces.map(|face| face.pixels());
        let texture = Texture::new(self.ctx.clone(), format, extent, &layers, vk::ImageViewType::CUBE)?;
        Ok(Arc::new(texture))
    }

    /// Offscreen attachment, `aspect` picks what its view exposes (`COLOR` or `DEPTH`)
    pub fn create_render_target(
        &self,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Arc<RenderTarget>> {
        let extent = vk::Extent2D { width, height };
        let target = RenderTarget::new(self.ctx.clone(), extent, format, usage, aspect)?;
        Ok(Arc::new(target))
    }

    pub fn create_static_buffer(
        &self,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        data: &[u8],
    ) -> Result<Arc<StaticBuffer>> {
        Ok(Arc::new(StaticBuffer::new(self.ctx.clone(), usage, properties, data)?))
    }

    pub fn create_sampler(&self, info: &vk::SamplerCreateInfo) -> Result<Arc<Sampler>> {
        Ok(Arc::new(Sampler::new(self.ctx.clone(), info)?))
    }

    pub fn create_shader(&self, words: &[u32], info: ShaderInfo) -> Result<Arc<Shader>> {
        Ok(Arc::new(Shader::new(self.ctx.clone(), words, info)?))
    }

    pub fn create_shader_from_bytes(&self, code: &[u8], info: ShaderInfo) -> Result<Arc<Shader>> {
        Ok(Arc::new(Shader::from_bytes(self.ctx.clone(), code, info)?))
    }

    pub fn create_render_pass(
        &self,
        color_attachments: &[vk::AttachmentDescription],
        depth_attachment: Option<vk::AttachmentDescription>,
        invert_faces: bool,
    ) -> Result<Arc<RenderPass>> {
        let pass = RenderPass::new(self.ctx.clone(), color_attachments, depth_attachment, invert_faces)?;
        Ok(Arc::new(pass))
    }

    pub fn create_framebuffer(
        &self,
        render_pass: Arc<RenderPass>,
        attachments: &[vk::ImageView],
        width: u32,
        height: u32,
    ) -> Result<Arc<Framebuffer>> {
        let framebuffer = Framebuffer::new(self.ctx.clone(), render_pass, attachments, width, height)?;
        Ok(Arc::new(framebuffer))
    }

    pub fn create_vertex_format(
        &self,
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Arc<VertexFormat> {
        Arc::new(VertexFormat::new(bindings, attributes))
    }

    pub fn create_contract(
        &self,
        render_passes: &[Arc<RenderPass>],
        shared_sets: &[&[vk::DescriptorSetLayoutBinding]],
    ) -> Result<Arc<SceneContract>> {
        Ok(Arc::new(SceneContract::new(self.ctx.clone(), render_passes, shared_sets)?))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_material(
        &self,
        contract: &Arc<SceneContract>,
        vertex_format: &VertexFormat,
        stages: &[Arc<Shader>],
        depth_write: bool,
        depth_test: bool,
        src_blend: vk::BlendFactor,
        dst_blend: vk::BlendFactor,
    ) -> Result<Arc<SceneMaterial>> {
        let state = MaterialState { depth_write, depth_test, src_blend, dst_blend };
        Ok(Arc::new(SceneMaterial::new(contract.clone(), vertex_format, stages, state)?))
    }

    pub fn create_transient_pool(
        &self,
        descriptor_counts: &DescriptorTotalCount,
        max_descriptor_sets: u32,
    ) -> Result<TransientResourcePool> {
        TransientResourcePool::new(self.ctx.clone(), descriptor_counts, max_descriptor_sets)
    }

    pub fn create_draw_list(&self, contract: &Arc<SceneContract>) -> DrawList {
        DrawList::new(contract.clone())
    }

    pub fn create_gfx_mesh(&self, mesh: Mesh) -> Result<Arc<GfxMesh>> {
        Ok(Arc::new(GfxMesh::new(self.ctx.clone(), mesh)?))
    }
}
