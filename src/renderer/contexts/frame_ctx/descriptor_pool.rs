use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gpu_descriptor::{DescriptorPoolCreateFlags, DescriptorTotalCount};
use smallvec::SmallVec;

pub type PoolSizes = SmallVec<[vk::DescriptorPoolSize; 13]>;

/// One `vk::DescriptorPoolSize` per non-zero kind in `count`
pub fn pool_sizes(count: &DescriptorTotalCount) -> Result<PoolSizes> {
    if count.inline_uniform_block_bytes != 0 || count.inline_uniform_block_bindings != 0 {
        return Err(eyre!("Inline uniform blocks are not supported"));
    }

    let kinds = [
        (vk::DescriptorType::SAMPLER, count.sampler),
        (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, count.combined_image_sampler),
        (vk::DescriptorType::SAMPLED_IMAGE, count.sampled_image),
        (vk::DescriptorType::STORAGE_IMAGE, count.storage_image),
        (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, count.uniform_texel_buffer),
        (vk::DescriptorType::STORAGE_TEXEL_BUFFER, count.storage_texel_buffer),
        (vk::DescriptorType::UNIFORM_BUFFER, count.uniform_buffer),
        (vk::DescriptorType::STORAGE_BUFFER, count.storage_buffer),
        (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, count.uniform_buffer_dynamic),
        (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, count.storage_buffer_dynamic),
        (vk::DescriptorType::INPUT_ATTACHMENT, count.input_attachment),
        (vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, count.acceleration_structure),
    ];

    Ok(kinds
        .into_iter()
        .filter(|(_, descriptor_count)| *descriptor_count != 0)
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize { ty, descriptor_count })
        .collect())
}

pub fn pool_flags(flags: DescriptorPoolCreateFlags) -> vk::DescriptorPoolCreateFlags {
    let mut ash_flags = vk::DescriptorPoolCreateFlags::empty();

    if flags.contains(DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET) {
        ash_flags |= vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
    }

    if flags.contains(DescriptorPoolCreateFlags::UPDATE_AFTER_BIND) {
        ash_flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
    }

    ash_flags
}

pub fn create_descriptor_pool(
    device: &ash::Device,
    count: &DescriptorTotalCount,
    max_sets: u32,
    flags: DescriptorPoolCreateFlags,
) -> Result<vk::DescriptorPool> {
    let sizes = pool_sizes(count)?;
    let info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(max_sets)
        .pool_sizes(&sizes)
        .flags(pool_flags(flags));
    Ok(unsafe { device.create_descriptor_pool(&info, None)? })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_non_zero_kinds_are_listed() {
        let count = DescriptorTotalCount {
            uniform_buffer: 64,
            combined_image_sampler: 32,
            ..Default::default()
        };

        let sizes = pool_sizes(&count).unwrap();
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[0].descriptor_count, 32);
        assert_eq!(sizes[1].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].descriptor_count, 64);
    }

    #[test]
    fn inline_uniform_blocks_are_rejected() {
        let count = DescriptorTotalCount {
            inline_uniform_block_bytes: 16,
            ..Default::default()
        };
        assert!(pool_sizes(&count).is_err());
    }

    #[test]
    fn free_descriptor_set_flag_is_forwarded() {
        let flags = pool_flags(DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);
        assert_eq!(flags, vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);
        assert!(pool_flags(DescriptorPoolCreateFlags::empty()).is_empty());
    }
}
