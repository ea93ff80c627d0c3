use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::frame_ctx::TransientResourcePool;
use crate::renderer::contexts::pipeline_ctx::material::SceneMaterial;
use crate::renderer::resources::buffer::BufferRegion;

/// A descriptor set allocated from a transient pool. Valid until that pool is reset.
///
/// Sets made with `for_material` carry their material and can be drawn; sets made with
/// `for_layout` are meant to be bound as the contract's shared sets.
pub struct SceneDescriptorSet {
    set: vk::DescriptorSet,
    layout: vk::DescriptorSetLayout,
    material: Option<Arc<SceneMaterial>>,
    ctx: Arc<DeviceContext>,
}

impl SceneDescriptorSet {
    pub fn for_material(
        pool: &mut TransientResourcePool,
        material: &Arc<SceneMaterial>,
    ) -> Result<Self> {
        let layout = material.per_object_layout();
        let set = pool.allocate_descriptor_set(layout)?;
        Ok(Self {
            set,
            layout,
            material: Some(material.clone()),
            ctx: pool.context().clone(),
        })
    }

    pub fn for_layout(
        pool: &mut TransientResourcePool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<Self> {
        let set = pool.allocate_descriptor_set(layout)?;
        Ok(Self {
            set,
            layout,
            material: None,
            ctx: pool.context().clone(),
        })
    }

    pub fn handle(&self) -> vk::DescriptorSet {
        self.set
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn material(&self) -> Option<&Arc<SceneMaterial>> {
        self.material.as_ref()
    }

    pub fn write_uniform_buffer(&self, binding: u32, array_element: u32, region: BufferRegion) {
        let buffer_info = [region.descriptor_info()];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(binding)
            .dst_array_element(array_element)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info);
        unsafe {
            self.ctx.device().update_descriptor_sets(&[write], &[]);
        }
    }

    pub fn write_combined_image_sampler(
        &self,
        binding: u32,
        array_element: u32,
        sampler: vk::Sampler,
        image_view: vk::ImageView,
        image_layout: vk::ImageLayout,
    ) {
        let image_info = [vk::DescriptorImageInfo {
            sampler,
            image_view,
            image_layout,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(binding)
            .dst_array_element(array_element)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);
        unsafe {
            self.ctx.device().update_descriptor_sets(&[write], &[]);
        }
    }
}
