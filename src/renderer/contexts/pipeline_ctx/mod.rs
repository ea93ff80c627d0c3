//! Responsibilities:
//! - Shared descriptor set layouts and the render passes a scene is drawn into
//! - Per-object layouts merged from shader reflection
//! - One graphics pipeline per material and render pass

pub mod contract;
pub mod descriptor_set;
pub mod material;
pub mod pipeline_builder;
pub mod reflection;

pub use contract::{ContractId, SceneContract};
pub use descriptor_set::SceneDescriptorSet;
pub use material::{MaterialId, MaterialState, SceneMaterial};
pub use reflection::{Descriptor, ShaderInfo, ShaderType};
