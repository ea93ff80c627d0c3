use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::pipeline_ctx::contract::{ContractId, SceneContract};
use crate::renderer::contexts::pipeline_ctx::pipeline_builder::{stage_used, GraphicsPipelineBuilder};
use crate::renderer::contexts::pipeline_ctx::reflection::merge_bindings;
use crate::renderer::resources::shader::Shader;
use crate::renderer::resources::vertex::VertexFormat;

static MATERIAL_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(u32);

/// Fixed-function choices for a material's pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialState {
    pub depth_write: bool,
    pub depth_test: bool,
    pub src_blend: vk::BlendFactor,
    pub dst_blend: vk::BlendFactor,
}

impl Default for MaterialState {
    fn default() -> Self {
        Self {
            depth_write: true,
            depth_test: true,
            src_blend: vk::BlendFactor::ONE,
            dst_blend: vk::BlendFactor::ZERO,
        }
    }
}

/// A set of shaders bound to one contract: the per-object descriptor set layout merged
/// from their reflection, and one pipeline per render pass of the contract.
pub struct SceneMaterial {
    id: MaterialId,
    per_object_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    pipelines: Vec<vk::Pipeline>,
    contract: Arc<SceneContract>,
    _shaders: Vec<Arc<Shader>>,
    ctx: Arc<DeviceContext>,
}

impl SceneMaterial {
    pub fn new(
        contract: Arc<SceneContract>,
        vertex_format: &VertexFormat,
        shaders: &[Arc<Shader>],
        state: MaterialState,
    ) -> Result<Self> {
        let ctx = contract.context().clone();
        let per_object_set = contract.per_object_set();
        let bindings = merge_bindings(shaders.iter().map(|s| s.info()), per_object_set)?;

        let mut material = Self {
            id: MaterialId(MATERIAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)),
            per_object_layout: vk::DescriptorSetLayout::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            pipelines: Vec::with_capacity(contract.render_passes().len()),
            contract,
            _shaders: shaders.to_vec(),
            ctx,
        };

        // Partially built materials are cleaned up by Drop
        material.per_object_layout = material.ctx.create_descriptor_set_layout(&bindings)?;
        let mut set_layouts = material.contract.shared_layouts().to_vec();
        set_layouts.push(material.per_object_layout);
        material.pipeline_layout = material.ctx.create_pipeline_layout(&set_layouts)?;

        for pass in material.contract.render_passes() {
            let mut builder = GraphicsPipelineBuilder::new()
                .with_vertex_format(vertex_format)
                .with_render_pass(pass.handle())
                .with_pipeline_layout(material.pipeline_layout)
                .with_face_culling(pass.should_invert_faces())
                .with_depth(state.depth_test, state.depth_write);
            if pass.has_color_attachments() {
                builder = builder.with_blending(
                    pass.color_attachment_count(),
                    state.src_blend,
                    state.dst_blend,
                );
            }
            for shader in shaders.iter().filter(|s| stage_used(s.stage(), pass.has_color_attachments())) {
                builder = builder.with_stage(shader.stage_info());
            }
            let pipeline = builder.build(material.ctx.device())?;
            material.pipelines.push(pipeline);
        }

        log::debug!(
            "Created material {:?}: {} per-object bindings at set {}, {} pipelines",
            material.id,
            bindings.len(),
            per_object_set,
            material.pipelines.len(),
        );

        Ok(material)
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn contract(&self) -> &Arc<SceneContract> {
        &self.contract
    }

    pub fn contract_id(&self) -> ContractId {
        self.contract.id()
    }

    pub fn pipeline(&self, pass_index: usize) -> Result<vk::Pipeline> {
        self.pipelines
            .get(pass_index)
            .copied()
            .ok_or_eyre("Material has no pipeline for this render pass")
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    pub fn per_object_layout(&self) -> vk::DescriptorSetLayout {
        self.per_object_layout
    }
}

impl Drop for SceneMaterial {
    fn drop(&mut self) {
        let device = self.ctx.device();
        unsafe {
            for &pipeline in &self.pipelines {
                device.destroy_pipeline(pipeline, None);
            }
            if self.pipeline_layout != vk::PipelineLayout::null() {
                device.destroy_pipeline_layout(self.pipeline_layout, None);
            }
            if self.per_object_layout != vk::DescriptorSetLayout::null() {
                device.destroy_descriptor_set_layout(self.per_object_layout, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_opaque() {
        let state = MaterialState::default();
        assert!(state.depth_test && state.depth_write);
        assert_eq!((state.src_blend, state.dst_blend), (vk::BlendFactor::ONE, vk::BlendFactor::ZERO));
    }
}
