use ash::vk;
use color_eyre::Result;
use crate::renderer::error::SceneError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Uint,
    Int,
    Float,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixLayout {
    pub stride: u32,
    pub row_major: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureMember {
    pub name: String,
    pub ty: ShaderType,
    pub offset: Option<u32>,
}

/// Type of a reflected shader resource
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderType {
    Sampler {
        channel: ScalarType,
        view_type: vk::ImageViewType,
        multisampled: bool,
        shadow: bool,
    },
    Numeric {
        scalar: ScalarType,
        row_count: u32,
        column_count: u32,
        matrix_layout: Option<MatrixLayout>,
    },
    Array {
        element: Box<ShaderType>,
        length: u32,
        stride: Option<u32>,
    },
    Structure {
        name: String,
        members: Vec<StructureMember>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub set: u32,
    pub binding: u32,
    pub name: String,
    pub ty: ShaderType,
}

/// Reflection of a single compiled shader stage
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderInfo {
    pub stage: vk::ShaderStageFlags,
    pub name: String,
    pub descriptors: Vec<Descriptor>,
}

/// Descriptor type and count a resource of type `ty` occupies
pub fn descriptor_kind(ty: &ShaderType) -> Result<(vk::DescriptorType, u32)> {
    match ty {
        ShaderType::Sampler { .. } => Ok((vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1)),
        ShaderType::Numeric { .. } | ShaderType::Structure { .. } => {
            Ok((vk::DescriptorType::UNIFORM_BUFFER, 1))
        }
        ShaderType::Array { element, length, .. } => {
            let (descriptor_type, element_count) = descriptor_kind(element)?;
            let count = element_count
                .checked_mul(*length)
                .ok_or(SceneError::DescriptorCountOverflow { length: *length, element_count })?;
            Ok((descriptor_type, count))
        }
    }
}

pub fn descriptor_binding(
    binding: u32,
    ty: &ShaderType,
    stages: vk::ShaderStageFlags,
) -> Result<vk::DescriptorSetLayoutBinding<'static>> {
    let (descriptor_type, descriptor_count) = descriptor_kind(ty)?;
    Ok(vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(descriptor_type)
        .descriptor_count(descriptor_count)
        .stage_flags(stages))
}

/// Merge the descriptors every stage declares in `set` into one list of layout bindings.
///
/// Declarations sharing a binding number must agree on type and count; their stage
/// flags are unioned. Bindings keep the order they were first seen in.
pub fn merge_bindings<'a>(
    shaders: impl IntoIterator<Item = &'a ShaderInfo>,
    set: u32,
) -> Result<Vec<vk::DescriptorSetLayoutBinding<'static>>> {
    let mut bindings: Vec<vk::DescriptorSetLayoutBinding<'static>> = Vec::new();

    for shader in shaders {
        for descriptor in shader.descriptors.iter().filter(|d| d.set == set) {
            let incoming = descriptor_binding(descriptor.binding, &descriptor.ty, shader.stage)?;

            match bindings.iter_mut().find(|b| b.binding == incoming.binding) {
                Some(existing) => {
                    if existing.descriptor_type != incoming.descriptor_type {
                        return Err(SceneError::DescriptorTypeMismatch {
                            binding: incoming.binding,
                            existing: existing.descriptor_type,
                            incoming: incoming.descriptor_type,
                        }.into());
                    }
                    if existing.descriptor_count != incoming.descriptor_count {
                        return Err(SceneError::DescriptorCountMismatch {
                            binding: incoming.binding,
                            existing: existing.descriptor_count,
                            incoming: incoming.descriptor_count,
                        }.into());
                    }
                    existing.stage_flags |= incoming.stage_flags;
                }
                None => bindings.push(incoming),
            }
        }
    }

    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat4() -> ShaderType {
        ShaderType::Numeric {
            scalar: ScalarType::Float,
            row_count: 4,
            column_count: 4,
            matrix_layout: Some(MatrixLayout { stride: 16, row_major: false }),
        }
    }

    fn sampler2d() -> ShaderType {
        ShaderType::Sampler {
            channel: ScalarType::Float,
            view_type: vk::ImageViewType::TYPE_2D,
            multisampled: false,
            shadow: false,
        }
    }

    fn uniforms() -> ShaderType {
        ShaderType::Structure {
            name: "PerObject".to_string(),
            members: vec![StructureMember { name: "model".to_string(), ty: mat4(), offset: Some(0) }],
        }
    }

    fn shader(stage: vk::ShaderStageFlags, descriptors: Vec<(u32, u32, ShaderType)>) -> ShaderInfo {
        ShaderInfo {
            stage,
            name: format!("{:?}", stage),
            descriptors: descriptors
                .into_iter()
                .map(|(set, binding, ty)| Descriptor { set, binding, name: format!("b{}", binding), ty })
                .collect(),
        }
    }

    #[test]
    fn kinds_follow_the_type() {
        assert_eq!(descriptor_kind(&sampler2d()).unwrap(), (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1));
        assert_eq!(descriptor_kind(&mat4()).unwrap(), (vk::DescriptorType::UNIFORM_BUFFER, 1));
        assert_eq!(descriptor_kind(&uniforms()).unwrap(), (vk::DescriptorType::UNIFORM_BUFFER, 1));
    }

    #[test]
    fn nested_arrays_multiply_counts() {
        let inner = ShaderType::Array { element: Box::new(sampler2d()), length: 3, stride: None };
        let outer = ShaderType::Array { element: Box::new(inner), length: 4, stride: None };
        assert_eq!(descriptor_kind(&outer).unwrap(), (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 12));
    }

    #[test]
    fn oversized_arrays_are_rejected() {
        let inner = ShaderType::Array { element: Box::new(sampler2d()), length: 65536, stride: None };
        let outer = ShaderType::Array { element: Box::new(inner), length: 65536, stride: None };

        let err = descriptor_kind(&outer).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SceneError>(),
            Some(&SceneError::DescriptorCountOverflow { length: 65536, element_count: 65536 }),
        );

        let frag = shader(vk::ShaderStageFlags::FRAGMENT, vec![(1, 0, outer)]);
        assert!(merge_bindings([&frag], 1).is_err());
    }

    #[test]
    fn shared_binding_unions_stages() {
        crate::init_test_logging();
        let vert = shader(vk::ShaderStageFlags::VERTEX, vec![(1, 3, uniforms())]);
        let frag = shader(vk::ShaderStageFlags::FRAGMENT, vec![(1, 3, uniforms()), (1, 0, sampler2d())]);

        let bindings = merge_bindings([&vert, &frag], 1).unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].binding, 3);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].descriptor_count, 1);
        assert_eq!(
            bindings[0].stage_flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        );
        assert_eq!(bindings[1].binding, 0);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn other_sets_are_ignored() {
        let vert = shader(vk::ShaderStageFlags::VERTEX, vec![(0, 0, uniforms()), (1, 2, uniforms())]);
        let bindings = merge_bindings([&vert], 1).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].binding, 2);
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let vert = shader(vk::ShaderStageFlags::VERTEX, vec![(1, 3, uniforms())]);
        let frag = shader(vk::ShaderStageFlags::FRAGMENT, vec![(1, 3, sampler2d())]);

        let err = merge_bindings([&vert, &frag], 1).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SceneError>(),
            Some(&SceneError::DescriptorTypeMismatch {
                binding: 3,
                existing: vk::DescriptorType::UNIFORM_BUFFER,
                incoming: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            }),
        );
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let array = ShaderType::Array { element: Box::new(sampler2d()), length: 2, stride: None };
        let vert = shader(vk::ShaderStageFlags::VERTEX, vec![(1, 0, sampler2d())]);
        let frag = shader(vk::ShaderStageFlags::FRAGMENT, vec![(1, 0, array)]);

        let err = merge_bindings([&vert, &frag], 1).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SceneError>(),
            Some(&SceneError::DescriptorCountMismatch { binding: 0, existing: 1, incoming: 2 }),
        );
    }
}
