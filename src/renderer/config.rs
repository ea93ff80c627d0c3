const MIB: u64 = 1024 * 1024;

/// Sizes of the fixed host-visible buffers the renderer creates up front
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Every host to device upload goes through a single buffer of this size
    pub staging_buffer_size: u64,
    pub uniform_buffer_size: u64,
    pub vertex_buffer_size: u64,
    pub index_buffer_size: u64,
    /// Forwarded to the gpu-allocator debug settings
    pub log_allocations: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            staging_buffer_size: 16 * MIB,
            uniform_buffer_size: MIB,
            vertex_buffer_size: MIB,
            index_buffer_size: MIB,
            log_allocations: false,
        }
    }
}
