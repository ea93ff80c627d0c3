use ash::vk;
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::error::SceneError;

/// Index of the first memory type allowed by `requirements` that has every flag in `properties`
pub fn select_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: &vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let count = (memory_properties.memory_type_count as usize).min(vk::MAX_MEMORY_TYPES);
    memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .position(|(i, memory_type)| {
            requirements.memory_type_bits & (1 << i) != 0
                && memory_type.property_flags.contains(properties)
        })
        .map(|i| i as u32)
        .ok_or_else(|| {
            SceneError::NoSuitableMemoryType {
                type_bits: requirements.memory_type_bits,
                properties,
            }
            .into()
        })
}

/// Translate the property flags callers ask for into a gpu-allocator location
pub fn memory_location(properties: vk::MemoryPropertyFlags) -> MemoryLocation {
    if properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        MemoryLocation::CpuToGpu
    } else {
        MemoryLocation::GpuOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = types.len() as u32;
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = *flags;
        }
        props
    }

    fn requirements(type_bits: u32) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: 256,
            alignment: 16,
            memory_type_bits: type_bits,
        }
    }

    #[test]
    fn picks_first_matching_type() {
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        assert_eq!(select_memory_type(&props, &requirements(0b111), host).unwrap(), 1);
        assert_eq!(select_memory_type(&props, &requirements(0b100), host).unwrap(), 2);
        assert_eq!(
            select_memory_type(&props, &requirements(0b111), vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0,
        );
    }

    #[test]
    fn ignores_types_past_the_reported_count() {
        let mut props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;

        let err = select_memory_type(&props, &requirements(0b11), vk::MemoryPropertyFlags::HOST_VISIBLE)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SceneError>(),
            Some(SceneError::NoSuitableMemoryType { type_bits: 0b11, .. }),
        ));
    }

    #[test]
    fn host_visible_maps_to_cpu_to_gpu() {
        assert!(matches!(
            memory_location(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT),
            MemoryLocation::CpuToGpu,
        ));
        assert!(matches!(
            memory_location(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            MemoryLocation::GpuOnly,
        ));
    }
}
