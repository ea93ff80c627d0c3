use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::error::SceneError;
use crate::renderer::resources::pixels::compute_image_size;

/// Length of a full mip chain: `1 + floor(log2(max(width, height, depth)))`
pub fn mip_level_count(extent: vk::Extent3D) -> u32 {
    let largest = extent.width.max(extent.height).max(extent.depth).max(1);
    1 + largest.ilog2()
}

pub fn image_type(extent: vk::Extent3D) -> vk::ImageType {
    if extent.depth > 1 {
        vk::ImageType::TYPE_3D
    } else if extent.height > 1 {
        vk::ImageType::TYPE_2D
    } else {
        vk::ImageType::TYPE_1D
    }
}

/// Access masks a layout transition has to wait on and make available
pub fn layout_transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<(vk::AccessFlags, vk::AccessFlags)> {
    let unsupported = || SceneError::UnsupportedLayoutTransition {
        old: old_layout,
        new: new_layout,
    };

    let src_access = match old_layout {
        // Contents can be discarded
        vk::ImageLayout::UNDEFINED => vk::AccessFlags::empty(),
        vk::ImageLayout::PREINITIALIZED => vk::AccessFlags::HOST_WRITE,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => vk::AccessFlags::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::AccessFlags::SHADER_READ,
        _ => return Err(unsupported().into()),
    };
    let dst_access = match new_layout {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => vk::AccessFlags::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::AccessFlags::SHADER_READ,
        vk::ImageLayout::PRESENT_SRC_KHR => vk::AccessFlags::MEMORY_READ,
        _ => return Err(unsupported().into()),
    };

    Ok((src_access, dst_access))
}

/// Pipeline stages a layout transition waits on and blocks
pub fn layout_transition_stages(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<(vk::PipelineStageFlags, vk::PipelineStageFlags)> {
    let unsupported = || SceneError::UnsupportedLayoutTransition {
        old: old_layout,
        new: new_layout,
    };

    let src_stage = match old_layout {
        vk::ImageLayout::UNDEFINED => vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::ImageLayout::PREINITIALIZED => vk::PipelineStageFlags::HOST,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL | vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            vk::PipelineStageFlags::TRANSFER
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::PipelineStageFlags::FRAGMENT_SHADER,
        _ => return Err(unsupported().into()),
    };
    let dst_stage = match new_layout {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL | vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            vk::PipelineStageFlags::TRANSFER
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::PipelineStageFlags::FRAGMENT_SHADER,
        vk::ImageLayout::PRESENT_SRC_KHR => vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        _ => return Err(unsupported().into()),
    };

    Ok((src_stage, dst_stage))
}

/// Record a barrier moving one mip level of one array layer between layouts
pub fn transition_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    mip_level: u32,
    array_layer: u32,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<()> {
    let (src_access_mask, dst_access_mask) = layout_transition_masks(old_layout, new_layout)?;
    let (src_stage, dst_stage) = layout_transition_stages(old_layout, new_layout)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: mip_level,
            level_count: 1,
            base_array_layer: array_layer,
            layer_count: 1,
        })
        .src_access_mask(src_access_mask)
        .dst_access_mask(dst_access_mask);

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }

    Ok(())
}

fn halve(extent: vk::Offset3D) -> vk::Offset3D {
    vk::Offset3D {
        x: (extent.x / 2).max(1),
        y: (extent.y / 2).max(1),
        z: (extent.z / 2).max(1),
    }
}

/// A sampled image with a full mip chain, filled once through the staging buffer
pub struct Texture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,

    allocation: Option<Allocation>, // GPU-only memory block
    ctx: Arc<DeviceContext>,
}

impl Texture {
    /// `layers` holds the level 0 pixels of each array layer, each
    /// `compute_image_size(width, height, format)` bytes long
    pub fn new(
        ctx: Arc<DeviceContext>,
        format: vk::Format,
        extent: vk::Extent3D,
        layers: &[&[u8]],
        view_type: vk::ImageViewType,
    ) -> Result<Self> {
        if layers.is_empty() {
            return Err(eyre!("Texture needs at least one layer of pixels"));
        }

        let layer_size = compute_image_size(extent.width, extent.height, format)?;
        if let Some(layer) = layers.iter().position(|layer| layer.len() < layer_size) {
            return Err(eyre!("Texture layer {} is smaller than {} bytes", layer, layer_size));
        }

        let mip_levels = mip_level_count(extent);
        let array_layers = layers.len() as u32;
        let device = ctx.device().clone();

        let image = {
            let mut info = vk::ImageCreateInfo::default()
                .image_type(image_type(extent))
                .format(format)
                .extent(extent)
                .mip_levels(mip_levels)
                .array_layers(array_layers)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(
                    vk::ImageUsageFlags::SAMPLED
                        | vk::ImageUsageFlags::TRANSFER_DST
                        | vk::ImageUsageFlags::TRANSFER_SRC,
                )
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            if view_type == vk::ImageViewType::CUBE || view_type == vk::ImageViewType::CUBE_ARRAY {
                info = info.flags(vk::ImageCreateFlags::CUBE_COMPATIBLE);
            }
            unsafe { device.create_image(&info, None)? }
        };

        let mut texture = Self {
            image,
            view: vk::ImageView::null(),
            format,
            extent,
            mip_levels,
            array_layers,
            allocation: None,
            ctx,
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        texture.ctx.select_memory_type(&requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
        let allocation = texture.ctx
            .memory_allocator()
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name: "Texture",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::DedicatedImage(image),
            })?;
        let allocation = texture.allocation.insert(allocation);
        unsafe {
            device.bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        for (layer, pixels) in layers.iter().enumerate() {
            texture.upload_layer(layer as u32, &pixels[..layer_size])?;
        }

        texture.view = {
            let info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(view_type)
                .format(format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: mip_levels,
                    base_array_layer: 0,
                    layer_count: array_layers,
                });
            unsafe { device.create_image_view(&info, None)? }
        };

        log::debug!(
            "Created {:?} texture {}x{}x{} with {} mip levels and {} layers",
            format, extent.width, extent.height, extent.depth, mip_levels, array_layers,
        );

        Ok(texture)
    }

    /// Copy one layer into mip level 0, then blit down the chain.
    /// Each layer is submitted and waited on before the next one starts.
    fn upload_layer(&self, layer: u32, pixels: &[u8]) -> Result<()> {
        let image = self.image;
        let extent = self.extent;
        let mip_levels = self.mip_levels;

        self.ctx.upload(pixels, |cmd, device, staging_buffer| {
            let layers = vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: layer,
                layer_count: 1,
            };

            transition_layout(
                device, cmd, image, 0, layer,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            let copy_region = vk::BufferImageCopy {
                image_subresource: layers,
                image_extent: extent,
                ..Default::default()
            };
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging_buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[copy_region],
                );
            }

            let mut dims = vk::Offset3D {
                x: extent.width as i32,
                y: extent.height as i32,
                z: extent.depth as i32,
            };
            for level in 1..mip_levels {
                let src_dims = dims;
                dims = halve(dims);
                let blit = vk::ImageBlit {
                    src_subresource: vk::ImageSubresourceLayers { mip_level: level - 1, ..layers },
                    src_offsets: [vk::Offset3D::default(), src_dims],
                    dst_subresource: vk::ImageSubresourceLayers { mip_level: level, ..layers },
                    dst_offsets: [vk::Offset3D::default(), dims],
                };

                transition_layout(
                    device, cmd, image, level - 1, layer,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                )?;
                transition_layout(
                    device, cmd, image, level, layer,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                )?;
                unsafe {
                    device.cmd_blit_image(
                        cmd,
                        image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[blit],
                        vk::Filter::LINEAR,
                    );
                }
                transition_layout(
                    device, cmd, image, level - 1, layer,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )?;
            }

            transition_layout(
                device, cmd, image, mip_levels - 1, layer,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })
    }

    pub fn descriptor_info(&self, sampler: vk::Sampler) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler,
            image_view: self.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    pub fn allocation(&self) -> Result<&Allocation> {
        self.allocation.as_ref().ok_or_eyre("Texture memory was already freed")
    }
}

impl Drop for Texture {
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
                        log::error!("Failed to free texture memory: {}", e);
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

    fn extent(width: u32, height: u32, depth: u32) -> vk::Extent3D {
        vk::Extent3D { width, height, depth }
    }

    #[test]
    fn mip_chain_uses_floor_of_log2() {
        assert_eq!(mip_level_count(extent(256, 256, 1)), 9);
        assert_eq!(mip_level_count(extent(300, 200, 1)), 9);
        assert_eq!(mip_level_count(extent(1, 1, 1)), 1);
        assert_eq!(mip_level_count(extent(2, 1, 1)), 2);
        assert_eq!(mip_level_count(extent(16, 16, 64)), 7);
    }

    #[test]
    fn image_type_follows_extent() {
        assert_eq!(image_type(extent(64, 1, 1)), vk::ImageType::TYPE_1D);
        assert_eq!(image_type(extent(64, 64, 1)), vk::ImageType::TYPE_2D);
        assert_eq!(image_type(extent(64, 64, 4)), vk::ImageType::TYPE_3D);
    }

    #[test]
    fn halving_never_drops_below_one() {
        let dims = halve(vk::Offset3D { x: 5, y: 1, z: 1 });
        assert_eq!((dims.x, dims.y, dims.z), (2, 1, 1));
    }

    #[test]
    fn mip_generation_transitions_are_supported() {
        let (src, dst) = layout_transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ).unwrap();
        assert_eq!(src, vk::AccessFlags::empty());
        assert_eq!(dst, vk::AccessFlags::TRANSFER_WRITE);

        let (src, dst) = layout_transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ).unwrap();
        assert_eq!(src, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst, vk::AccessFlags::TRANSFER_READ);

        let (src, dst) = layout_transition_masks(
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ).unwrap();
        assert_eq!(src, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(dst, vk::AccessFlags::SHADER_READ);

        let (src, dst) = layout_transition_masks(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        ).unwrap();
        assert_eq!(src, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(dst, vk::AccessFlags::MEMORY_READ);
    }

    #[test]
    fn mip_generation_waits_on_transfers() {
        let stages = |old, new| layout_transition_stages(old, new).unwrap();

        assert_eq!(
            stages(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            (vk::PipelineStageFlags::TOP_OF_PIPE, vk::PipelineStageFlags::TRANSFER),
        );
        assert_eq!(
            stages(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::TRANSFER),
        );
        assert_eq!(
            stages(vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        );
        assert_eq!(
            stages(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        );
        assert!(layout_transition_stages(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::UNDEFINED,
        ).is_err());
    }

    #[test]
    fn unknown_layouts_are_rejected() {
        let err = layout_transition_masks(
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SceneError>(),
            Some(SceneError::UnsupportedLayoutTransition { .. }),
        ));

        // Nothing may transition back to UNDEFINED or PREINITIALIZED
        assert!(layout_transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::UNDEFINED,
        ).is_err());
        assert!(layout_transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::PREINITIALIZED,
        ).is_err());
    }
}
