//! Frame-oriented Vulkan resource and draw-submission layer.
//!
//! A `Renderer` creates long-lived resources (textures, meshes, render passes, materials
//! bound to a `SceneContract`). Each frame resets a `TransientResourcePool`, fills per-object
//! descriptor sets from its linear allocators, records a `DrawList` and replays it into a
//! command buffer.

pub mod renderer;

pub use renderer::Renderer;
pub use renderer::config::RenderConfig;
pub use renderer::error::SceneError;

#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
