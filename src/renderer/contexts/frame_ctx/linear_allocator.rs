use std::sync::Arc;
use ash::vk;
use bytemuck::Pod;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::error::SceneError;
use crate::renderer::resources::buffer::{Buffer, BufferRegion};

/// Bookkeeping half of a `LinearAllocator`.
///
/// `offset` only moves forward between resets and `offset + range` never exceeds `capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearCursor {
    offset: u64,
    range: u64,
    capacity: u64,
    alignment: u64,
}

impl LinearCursor {
    pub fn new(capacity: u64, alignment: u64) -> Self {
        Self {
            offset: 0,
            range: 0,
            capacity,
            alignment: alignment.max(1),
        }
    }

    pub fn reset(&mut self) {
        self.offset = 0;
        self.range = 0;
    }

    /// Skip past the previous region, rounded up to the alignment.
    /// Saturates at `capacity`, after which every non-empty write fails.
    pub fn begin(&mut self) {
        let advance = self.range.div_ceil(self.alignment) * self.alignment;
        self.offset = self.offset.saturating_add(advance).min(self.capacity);
        self.range = 0;
    }

    /// Grow the current region by `size` bytes, returning where those bytes start
    pub fn reserve(&mut self, size: u64) -> Result<u64> {
        let start = self.offset + self.range;
        let end = start
            .checked_add(size)
            .ok_or(SceneError::LinearAllocatorOverflow { end: u64::MAX, capacity: self.capacity })?;
        if end > self.capacity {
            return Err(SceneError::LinearAllocatorOverflow { end, capacity: self.capacity }.into());
        }
        self.range += size;
        Ok(start)
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn range(&self) -> u64 {
        self.range
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }
}

/// A persistently mapped host-visible buffer handed out in non-overlapping regions.
///
/// Regions are only recycled by `reset`, which the owning pool calls once its fence
/// confirms the GPU is no longer reading them.
pub struct LinearAllocator {
    buffer: Buffer,
    cursor: LinearCursor,
    _ctx: Arc<DeviceContext>,
}

impl LinearAllocator {
    pub fn new(
        ctx: Arc<DeviceContext>,
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<Self> {
        let buffer = ctx.create_buffer(
            size,
            usage,
            name,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let mut alignment = buffer.requirements.alignment;
        if usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER) {
            alignment = alignment.max(ctx.limits().min_uniform_buffer_offset_alignment);
        }
        let cursor = LinearCursor::new(size, alignment);

        Ok(Self {
            buffer,
            cursor,
            _ctx: ctx,
        })
    }

    pub fn reset(&mut self) {
        self.cursor.reset();
    }

    pub fn begin(&mut self) {
        self.cursor.begin();
    }

    pub fn write<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let start = self.cursor.reserve(bytes.len() as u64)?;
        self.buffer.write(bytes, start as usize)?;
        Ok(())
    }

    pub fn end(&self) -> BufferRegion {
        BufferRegion {
            buffer: self.buffer.buffer,
            offset: self.cursor.offset(),
            range: self.cursor.range(),
        }
    }

    pub fn upload<T: Pod>(&mut self, data: &[T]) -> Result<BufferRegion> {
        self.begin();
        self.write(data)?;
        Ok(self.end())
    }

    pub fn cursor(&self) -> &LinearCursor {
        &self.cursor
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(cursor: &LinearCursor) -> (u64, u64) {
        (cursor.offset(), cursor.range())
    }

    #[test]
    fn begin_rounds_previous_region_up_to_alignment() {
        let mut cursor = LinearCursor::new(1024, 256);

        cursor.begin();
        assert_eq!(cursor.reserve(10).unwrap(), 0);
        assert_eq!(cursor.reserve(6).unwrap(), 10);
        assert_eq!(region(&cursor), (0, 16));

        cursor.begin();
        assert_eq!(region(&cursor), (256, 0));
        cursor.reserve(256).unwrap();

        cursor.begin();
        assert_eq!(region(&cursor), (512, 0));
    }

    #[test]
    fn empty_region_does_not_advance() {
        let mut cursor = LinearCursor::new(1024, 64);
        cursor.begin();
        cursor.begin();
        assert_eq!(region(&cursor), (0, 0));
    }

    #[test]
    fn write_past_capacity_fails_without_growing() {
        let mut cursor = LinearCursor::new(128, 64);
        cursor.begin();
        cursor.reserve(100).unwrap();

        let err = cursor.reserve(29).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SceneError>(),
            Some(&SceneError::LinearAllocatorOverflow { end: 129, capacity: 128 }),
        );
        assert_eq!(region(&cursor), (0, 100));

        cursor.begin();
        assert_eq!(region(&cursor), (128, 0));
        assert!(cursor.reserve(1).is_err());
        assert!(cursor.reserve(0).is_ok());
    }

    #[test]
    fn reset_rewinds_to_zero() {
        let mut cursor = LinearCursor::new(4096, 16);
        cursor.begin();
        cursor.reserve(40).unwrap();
        cursor.begin();
        cursor.reserve(40).unwrap();

        cursor.reset();
        cursor.begin();
        assert_eq!(region(&cursor), (0, 0));
        assert_eq!(cursor.reserve(8).unwrap(), 0);
    }

    #[test]
    fn regions_never_overlap_and_stay_in_bounds() {
        crate::init_test_logging();
        let capacity = 64 * 1024;
        let mut cursor = LinearCursor::new(capacity, 256);
        let mut seed = 0x2545_f491_u64;
        let mut regions: Vec<(u64, u64)> = Vec::new();

        loop {
            // xorshift keeps the sizes varied without extra dependencies
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let writes = 1 + seed % 4;

            cursor.begin();
            let mut full = false;
            for i in 0..writes {
                let size = 1 + (seed >> (i * 8)) % 700;
                if cursor.reserve(size).is_err() {
                    full = true;
                    break;
                }
            }
            regions.push(region(&cursor));
            if full {
                break;
            }
        }

        for (offset, range) in &regions {
            assert!(offset + range <= capacity);
        }
        for pair in regions.windows(2) {
            let (a_offset, a_range) = pair[0];
            let (b_offset, _) = pair[1];
            assert!(a_offset + a_range <= b_offset);
            assert_eq!(b_offset % 256, 0);
        }
    }
}
