use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use crate::renderer::contexts::device_ctx::memory;
use crate::renderer::contexts::device_ctx::DeviceContext;

/// A bindable slice of a buffer: what descriptor writes and vertex/index bindings consume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferRegion {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub range: vk::DeviceSize,
}

impl BufferRegion {
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: self.offset,
            range: self.range,
        }
    }
}

/// A buffer with its own dedicated gpu-allocator allocation
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: u64,
    pub requirements: vk::MemoryRequirements,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Buffer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
        properties: vk::MemoryPropertyFlags,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        mem_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let buffer = {
            let buffer_info = vk::BufferCreateInfo {
                size,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };
            unsafe { device.create_buffer(&buffer_info, None)? }
        };

        let requirements = unsafe {
            device.get_buffer_memory_requirements(buffer)
        };
        let allocation = memory::select_memory_type(memory_properties, &requirements, properties)
            .and_then(|_| {
                Ok(mem_allocator
                    .lock()
                    .map_err(|e| eyre!(e.to_string()))?
                    .allocate(&AllocationCreateDesc {
                        name,
                        requirements,
                        location: memory::memory_location(properties),
                        linear: true,
                        allocation_scheme: AllocationScheme::DedicatedBuffer(buffer),
                    })?)
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        unsafe {
            device.bind_buffer_memory(
                buffer,
                allocation.memory(),
                allocation.offset(),
            )?;
        }

        log::debug!("Created buffer '{}' ({} bytes, {:?})", name, size, usage);

        Ok(Self {
            buffer,
            size,
            requirements,

            allocation: Some(allocation),
            memory_allocator: mem_allocator,
            device,
        })
    }

    /// Copy into a host-visible buffer; fails for device-local memory
    pub fn write<T>(
        &mut self,
        data: &[T],
        start_offset: usize,
    ) -> Result<presser::CopyRecord>
    where
        T: Copy,
    {
        let allocation = self.allocation
            .as_mut()
            .ok_or_eyre("Buffer allocation was already freed")?;
        Ok(presser::copy_from_slice_to_offset(
            data,
            allocation,
            start_offset,
        )?)
    }

    pub fn whole(&self) -> BufferRegion {
        BufferRegion {
            buffer: self.buffer,
            offset: 0,
            range: self.size,
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free buffer memory: {}", e);
                    }
                }
                Err(e) => log::error!("Memory allocator lock poisoned: {}", e),
            }
        }
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// Immutable buffer filled once through the staging path
pub struct StaticBuffer {
    buffer: Buffer,
    _ctx: Arc<DeviceContext>,
}

impl StaticBuffer {
    pub fn new(
        ctx: Arc<DeviceContext>,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        data: &[u8],
    ) -> Result<Self> {
        if data.is_empty() {
            return Err(eyre!("Static buffer requires initial data"));
        }

        let size = data.len() as u64;
        let buffer = ctx.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            "Static buffer",
            properties,
        )?;

        let dst = buffer.buffer;
        ctx.upload(data, |cmd, device, src| {
            let copy = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe {
                device.cmd_copy_buffer(cmd, src, dst, &[copy]);
            }
            Ok(())
        })?;

        Ok(Self { buffer, _ctx: ctx })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.buffer
    }

    pub fn size(&self) -> u64 {
        self.buffer.size
    }

    pub fn region(&self) -> BufferRegion {
        self.buffer.whole()
    }
}
