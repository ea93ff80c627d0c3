use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::error::SceneError;
use crate::renderer::resources::render_pass::RenderPass;

static CONTRACT_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContractId(u32);

impl ContractId {
    fn next() -> Self {
        Self(CONTRACT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(id: u32) -> Self {
        Self(id)
    }
}

/// Position of `pass` among the passes a contract was built for
pub fn find_render_pass(render_passes: &[vk::RenderPass], pass: vk::RenderPass) -> Result<usize> {
    render_passes
        .iter()
        .position(|&p| p == pass)
        .ok_or_else(|| SceneError::UnknownRenderPass.into())
}

/// Shared descriptor sets must match the contract's layouts one for one
pub fn validate_shared_layouts(
    expected: &[vk::DescriptorSetLayout],
    actual: &[vk::DescriptorSetLayout],
) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(SceneError::SharedSetCountMismatch {
            expected: expected.len(),
            actual: actual.len(),
        }.into());
    }
    if let Some(index) = expected.iter().zip(actual).position(|(e, a)| e != a) {
        return Err(SceneError::SharedSetLayoutMismatch { index }.into());
    }
    Ok(())
}

/// The render passes a scene is drawn into and the descriptor sets shared by all of its
/// materials (sets `0..k`). Materials built against a contract put their per-object set at `k`.
pub struct SceneContract {
    id: ContractId,
    render_passes: Vec<Arc<RenderPass>>,
    render_pass_handles: Vec<vk::RenderPass>,
    shared_layouts: Vec<vk::DescriptorSetLayout>,
    // Only used to bind the shared sets; every material layout starts with the same sets
    example_layout: vk::PipelineLayout,
    ctx: Arc<DeviceContext>,
}

impl SceneContract {
    pub fn new(
        ctx: Arc<DeviceContext>,
        render_passes: &[Arc<RenderPass>],
        shared_sets: &[&[vk::DescriptorSetLayoutBinding]],
    ) -> Result<Self> {
        let mut shared_layouts = Vec::with_capacity(shared_sets.len());
        for bindings in shared_sets {
            match ctx.create_descriptor_set_layout(bindings) {
                Ok(layout) => shared_layouts.push(layout),
                Err(e) => {
                    destroy_layouts(&ctx, &shared_layouts);
                    return Err(e);
                }
            }
        }
        let example_layout = match ctx.create_pipeline_layout(&shared_layouts) {
            Ok(layout) => layout,
            Err(e) => {
                destroy_layouts(&ctx, &shared_layouts);
                return Err(e);
            }
        };

        let id = ContractId::next();
        log::debug!(
            "Created scene contract {:?}: {} render passes, {} shared sets",
            id,
            render_passes.len(),
            shared_layouts.len(),
        );

        Ok(Self {
            id,
            render_passes: render_passes.to_vec(),
            render_pass_handles: render_passes.iter().map(|p| p.handle()).collect(),
            shared_layouts,
            example_layout,
            ctx,
        })
    }

    pub fn id(&self) -> ContractId {
        self.id
    }

    pub fn render_passes(&self) -> &[Arc<RenderPass>] {
        &self.render_passes
    }

    pub fn render_pass_index(&self, pass: &RenderPass) -> Result<usize> {
        find_render_pass(&self.render_pass_handles, pass.handle())
    }

    pub fn shared_layouts(&self) -> &[vk::DescriptorSetLayout] {
        &self.shared_layouts
    }

    /// Set index of the per-object set in every material of this contract
    pub fn per_object_set(&self) -> u32 {
        self.shared_layouts.len() as u32
    }

    pub fn example_layout(&self) -> vk::PipelineLayout {
        self.example_layout
    }

    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }
}

fn destroy_layouts(ctx: &DeviceContext, layouts: &[vk::DescriptorSetLayout]) {
    for &layout in layouts {
        unsafe { ctx.device().destroy_descriptor_set_layout(layout, None) };
    }
}

impl Drop for SceneContract {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_pipeline_layout(self.example_layout, None);
        }
        destroy_layouts(&self.ctx, &self.shared_layouts);
    }
}
