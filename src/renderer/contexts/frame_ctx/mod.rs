//! Responsibilities:
//! - Hand out per-frame command buffers and descriptor sets
//! - Sub-allocate per-frame uniform, vertex and index data from host-visible buffers
//! - Gate reuse of all of the above on the frame's completion fence

pub mod descriptor_pool;
pub mod linear_allocator;
pub mod transient_pool;

pub use linear_allocator::{LinearAllocator, LinearCursor};
pub use transient_pool::TransientResourcePool;
