use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gpu_descriptor::{DescriptorPoolCreateFlags, DescriptorTotalCount};
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::frame_ctx::descriptor_pool;
use crate::renderer::contexts::frame_ctx::linear_allocator::LinearAllocator;

/// Everything needed to record and submit one frame: a command pool, a descriptor pool,
/// three linear allocators and the fence that says when the GPU is done with all of them.
///
/// Create one per frame slot that can be in flight at the same time.
pub struct TransientResourcePool {
    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,

    // Signals when all work submitted through this pool has finished execution.
    // Created signaled so the first reset does not block.
    fence: vk::Fence,

    command_buffers: Vec<vk::CommandBuffer>,
    descriptor_sets: Vec<vk::DescriptorSet>,

    uniform_buffer: LinearAllocator,
    vertex_buffer: LinearAllocator,
    index_buffer: LinearAllocator,

    ctx: Arc<DeviceContext>,
}

impl TransientResourcePool {
    pub fn new(
        ctx: Arc<DeviceContext>,
        descriptor_counts: &DescriptorTotalCount,
        max_descriptor_sets: u32,
    ) -> Result<Self> {
        let config = ctx.config().clone();
        let uniform_buffer = LinearAllocator::new(
            ctx.clone(),
            config.uniform_buffer_size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "Transient uniform buffer",
        )?;
        let vertex_buffer = LinearAllocator::new(
            ctx.clone(),
            config.vertex_buffer_size,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "Transient vertex buffer",
        )?;
        let index_buffer = LinearAllocator::new(
            ctx.clone(),
            config.index_buffer_size,
            vk::BufferUsageFlags::INDEX_BUFFER,
            "Transient index buffer",
        )?;

        let device = ctx.device();
        let command_pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(ctx.queue().family.index)
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT),
                None,
            )?
        };
        let descriptor_pool = descriptor_pool::create_descriptor_pool(
            device,
            descriptor_counts,
            max_descriptor_sets,
            DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
        )?;
        let fence = unsafe {
            device.create_fence(
                &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                None,
            )?
        };

        Ok(Self {
            command_pool,
            descriptor_pool,
            fence,
            command_buffers: Vec::new(),
            descriptor_sets: Vec::new(),
            uniform_buffer,
            vertex_buffer,
            index_buffer,
            ctx,
        })
    }

    /// Block until the last submission through this pool has finished, then recycle
    /// every command buffer, descriptor set and linear allocation handed out since.
    pub fn reset(&mut self) -> Result<()> {
        let device = self.ctx.device();
        unsafe {
            device.wait_for_fences(&[self.fence], true, u64::MAX)?;
            device.reset_fences(&[self.fence])?;

            if !self.command_buffers.is_empty() {
                device.free_command_buffers(self.command_pool, &self.command_buffers);
                self.command_buffers.clear();
            }
            device.reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())?;

            if !self.descriptor_sets.is_empty() {
                device.free_descriptor_sets(self.descriptor_pool, &self.descriptor_sets)?;
                self.descriptor_sets.clear();
            }
            device.reset_descriptor_pool(self.descriptor_pool, vk::DescriptorPoolResetFlags::empty())?;
        }

        self.uniform_buffer.reset();
        self.vertex_buffer.reset();
        self.index_buffer.reset();

        log::trace!("Transient resource pool reset");
        Ok(())
    }

    pub fn allocate_command_buffer(&mut self) -> Result<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { self.ctx.device().allocate_command_buffers(&info)? }
            .first()
            .copied()
            .ok_or_else(|| eyre!("Driver returned no command buffer"))?;
        self.command_buffers.push(command_buffer);
        Ok(command_buffer)
    }

    pub fn allocate_descriptor_set(
        &mut self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&layouts);
        let descriptor_set = unsafe { self.ctx.device().allocate_descriptor_sets(&info)? }
            .first()
            .copied()
            .ok_or_else(|| eyre!("Driver returned no descriptor set"))?;
        self.descriptor_sets.push(descriptor_set);
        Ok(descriptor_set)
    }

    /// Submit to the device queue, signaling this pool's fence on completion
    pub fn submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[vk::Semaphore],
    ) -> Result<()> {
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);
        unsafe {
            self.ctx.device().queue_submit(self.ctx.queue().handle, &[submit], self.fence)?;
        }
        Ok(())
    }

    pub fn fence(&self) -> vk::Fence {
        self.fence
    }

    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }

    pub fn uniform_buffer(&mut self) -> &mut LinearAllocator {
        &mut self.uniform_buffer
    }

    pub fn vertex_buffer(&mut self) -> &mut LinearAllocator {
        &mut self.vertex_buffer
    }

    pub fn index_buffer(&mut self) -> &mut LinearAllocator {
        &mut self.index_buffer
    }
}

impl Drop for TransientResourcePool {
    fn drop(&mut self) {
        let device = self.ctx.device();
        unsafe {
            device.destroy_fence(self.fence, None);
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            device.destroy_command_pool(self.command_pool, None);
        }
    }
}
