use std::mem::{offset_of, size_of};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub normal: Vec3,
    pub texcoord: Vec2,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub bone_indices: [u32; 4],
    pub bone_weights: [f32; 4],
}

impl Vertex {
    /// Interleaved layout of `Vertex` in binding 0, one location per field in declaration order
    pub fn format() -> VertexFormat {
        let attribute = |location: u32, format: vk::Format, offset: usize| {
            vk::VertexInputAttributeDescription {
                location,
                binding: 0,
                format,
                offset: offset as u32,
            }
        };

        VertexFormat::new(
            vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride: size_of::<Vertex>() as u32,
                input_rate: vk::VertexInputRate::VERTEX,
            }],
            vec![
                attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
                attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
                attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
                attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, texcoord)),
                attribute(4, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, tangent)),
                attribute(5, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, bitangent)),
                attribute(6, vk::Format::R32G32B32A32_UINT, offset_of!(Vertex, bone_indices)),
                attribute(7, vk::Format::R32G32B32A32_SFLOAT, offset_of!(Vertex, bone_weights)),
            ],
        )
    }
}

/// Vertex input bindings and attributes a material's pipelines are built against
#[derive(Debug, Clone, Default)]
pub struct VertexFormat {
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexFormat {
    pub fn new(
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        Self { bindings, attributes }
    }

    pub fn bindings(&self) -> &[vk::VertexInputBindingDescription] {
        &self.bindings
    }

    pub fn attributes(&self) -> &[vk::VertexInputAttributeDescription] {
        &self.attributes
    }

    pub fn input_state(&self) -> vk::PipelineVertexInputStateCreateInfo<'_> {
        vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.bindings)
            .vertex_attribute_descriptions(&self.attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 100);
        assert_eq!(offset_of!(Vertex, texcoord), 36);
        assert_eq!(offset_of!(Vertex, bone_indices), 68);
    }

    #[test]
    fn format_covers_every_field() {
        let format = Vertex::format();
        assert_eq!(format.bindings().len(), 1);
        assert_eq!(format.bindings()[0].stride, 100);

        let attributes = format.attributes();
        assert_eq!(attributes.len(), 8);
        assert!(attributes.iter().enumerate().all(|(i, a)| a.location == i as u32 && a.binding == 0));
        assert_eq!(attributes[6].format, vk::Format::R32G32B32A32_UINT);
        assert_eq!(attributes[7].offset, 84);

        let state = format.input_state();
        assert_eq!(state.vertex_binding_description_count, 1);
        assert_eq!(state.vertex_attribute_description_count, 8);
    }
}
