//! "Resources" are the long-lived GPU objects a scene is built from.
//! Each one holds the device context it was created with and frees itself on drop.

pub mod buffer;
pub mod image;
pub mod mesh;
pub mod pixels;
pub mod render_pass;
pub mod render_target;
pub mod sampler;
pub mod shader;
pub mod vertex;
