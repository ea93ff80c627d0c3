use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::DeviceContext;

pub fn render_target_info(
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D { width: extent.width, height: extent.height, depth: 1 })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
}

/// Device-local single-level image used as a color or depth attachment of an offscreen pass.
/// Its contents are undefined until a render pass writes them.
pub struct RenderTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,

    allocation: Option<Allocation>,
    ctx: Arc<DeviceContext>,
}

impl RenderTarget {
    pub fn new(
        ctx: Arc<DeviceContext>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(eyre!("Render target must not be empty, got {}x{}", extent.width, extent.height));
        }

        let device = ctx.device().clone();
        let image = unsafe { device.create_image(&render_target_info(extent, format, usage), None)? };

        // Partially built targets are cleaned up by Drop
        let mut target = Self {
            image,
            view: vk::ImageView::null(),
            format,
            extent,
            allocation: None,
            ctx,
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        target.ctx.select_memory_type(&requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
        let allocation = target.ctx
            .memory_allocator()
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name: "Render target",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::DedicatedImage(image),
            })?;
        let allocation = target.allocation.insert(allocation);
        unsafe {
            device.bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        target.view = {
            let info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            unsafe { device.create_image_view(&info, None)? }
        };

        log::debug!(
            "Created {:?} render target {}x{} for {:?}",
            format, extent.width, extent.height, usage,
        );

        Ok(target)
    }

    /// Sampling a target after the pass that wrote it left it in `SHADER_READ_ONLY_OPTIMAL`
    pub fn descriptor_info(&self, sampler: vk::Sampler) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler,
            image_view: self.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    pub fn allocation(&self) -> Result<&Allocation> {
        self.allocation.as_ref().ok_or_eyre("Render target memory was already freed")
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        let device = self.ctx.device();
        unsafe {
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
            }
        }
        if let Some(allocation) = self.allocation.take() {
            match self.ctx.memory_allocator().lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free render target memory: {}", e);
                    }
                }
                Err(e) => log::error!("Memory allocator lock poisoned: {}", e),
            }
        }
        unsafe {
            device.destroy_image(self.image, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_target_is_a_single_2d_level() {
        let info = render_target_info(
            vk::Extent2D { width: 1024, height: 512 },
            vk::Format::D32_SFLOAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        );
        assert_eq!(info.image_type, vk::ImageType::TYPE_2D);
        assert_eq!(info.format, vk::Format::D32_SFLOAT);
        assert_eq!((info.extent.width, info.extent.height, info.extent.depth), (1024, 512, 1));
        assert_eq!((info.mip_levels, info.array_layers), (1, 1));
        assert_eq!(
            info.usage,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        );
        assert_eq!(info.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(info.tiling, vk::ImageTiling::OPTIMAL);
    }
}
