use ash::vk;
use thiserror::Error;

/// Failures raised by the scene layer itself, as opposed to raw `vk::Result` codes
/// coming back from the driver. Both travel inside a `color_eyre::Report`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("no suitable memory type for bits {type_bits:#x} with properties {properties:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },
    #[error("staging upload of {requested} bytes exceeds staging capacity of {capacity} bytes")]
    StagingOverflow { requested: u64, capacity: u64 },
    #[error("linear allocator overflow: write ends at {end} but capacity is {capacity}")]
    LinearAllocatorOverflow { end: u64, capacity: u64 },
    #[error("descriptor type mismatch at binding {binding}: {existing:?} vs {incoming:?}")]
    DescriptorTypeMismatch {
        binding: u32,
        existing: vk::DescriptorType,
        incoming: vk::DescriptorType,
    },
    #[error("descriptor count mismatch at binding {binding}: {existing} vs {incoming}")]
    DescriptorCountMismatch {
        binding: u32,
        existing: u32,
        incoming: u32,
    },
    #[error("descriptor array of {length} x {element_count} descriptors overflows a u32 count")]
    DescriptorCountOverflow { length: u32, element_count: u32 },
    #[error("contract violation: expected {expected} shared descriptor sets, got {actual}")]
    SharedSetCountMismatch { expected: usize, actual: usize },
    #[error("contract violation: shared descriptor set {index} does not use the contract layout")]
    SharedSetLayoutMismatch { index: usize },
    #[error("material belongs to a different scene contract")]
    ForeignContract,
    #[error("descriptor set has no associated material")]
    MissingMaterial,
    #[error("render pass is not part of the scene contract")]
    UnknownRenderPass,
    #[error("mesh has no material at index {index} (material count {count})")]
    MeshMaterialOutOfRange { index: usize, count: usize },
    #[error("draw uses {count} vertex buffers, at most {max} are supported")]
    TooManyVertexBuffers { count: usize, max: usize },
    #[error("unsupported layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },
    #[error("unsupported pixel format {0:?}")]
    UnsupportedFormat(vk::Format),
    #[error("bad texture for cubemap: face {face}")]
    BadCubeFace { face: usize },
}
