pub mod debug;
pub mod memory;
pub mod queue;
pub mod staging_ctx;

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::debug::{DebugCallback, DebugMessenger};
use crate::renderer::contexts::device_ctx::queue::{Queue, QueueFamily};
use crate::renderer::contexts::device_ctx::staging_ctx::StagingContext;
use crate::renderer::resources::buffer::Buffer;

/// Responsibilities:
/// - Own the logical device and the queue everything is submitted to
/// - Select memory types and allocate device memory
/// - Upload host data through the shared staging buffer
///
/// Every resource in the crate holds an `Arc<DeviceContext>`, so the device is only
/// destroyed once the last of them has been dropped.
pub struct DeviceContext {
    device: Arc<ash::Device>,
    physical_device: vk::PhysicalDevice,
    queue: Arc<Queue>,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    limits: vk::PhysicalDeviceLimits,
    config: RenderConfig,

    staging: ManuallyDrop<StagingContext>,
    memory_allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    // Dropped after `Drop::drop` has destroyed the device, unregistering before the callback goes
    debug_messenger: Option<DebugMessenger>,
    debug_callback: Arc<DebugCallback>,
}

impl DeviceContext {
    /// Takes ownership of `device`, destroying it again if construction fails. The instance
    /// stays owned by the caller and must outlive the context. A debug messenger is installed
    /// only when `entry` is given.
    pub fn new(
        entry: Option<&ash::Entry>,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family_index: u32,
        config: RenderConfig,
        debug_callback: Option<DebugCallback>,
    ) -> Result<Self> {
        let device = Arc::new(device);
        let context = Self::with_device(
            entry,
            instance,
            physical_device,
            device.clone(),
            queue_family_index,
            config,
            debug_callback,
        );
        // On failure every partial resource is already dropped, so this is the last handle
        if context.is_err() {
            destroy_unused_device(&device);
        }
        context
    }

    fn with_device(
        entry: Option<&ash::Entry>,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: Arc<ash::Device>,
        queue_family_index: u32,
        config: RenderConfig,
        debug_callback: Option<DebugCallback>,
    ) -> Result<Self> {
        let debug_callback: DebugCallback = match debug_callback {
            Some(callback) => callback,
            None => Box::new(debug::log_debug_message),
        };
        let debug_callback = Arc::new(debug_callback);
        let debug_messenger = match entry {
            Some(entry) => Some(DebugMessenger::new(entry, instance, debug_callback.clone())?),
            None => None,
        };

        let (memory_properties, limits) = unsafe {
            (
                instance.get_physical_device_memory_properties(physical_device),
                instance.get_physical_device_properties(physical_device).limits,
            )
        };

        let queue = unsafe {
            let handle = device.get_device_queue(queue_family_index, 0);
            Queue::new(QueueFamily::new(queue_family_index), handle)
        };

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: config.log_allocations,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: config.log_allocations,
                log_frees: config.log_allocations,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let queue = Arc::new(queue);
        let memory_allocator = Arc::new(Mutex::new(memory_allocator));

        let staging_buffer = Buffer::new(
            config.staging_buffer_size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            "Staging buffer",
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            &memory_properties,
            memory_allocator.clone(),
            device.clone(),
        )?;
        let staging = StagingContext::new(
            staging_buffer,
            queue.clone(),
            device.clone(),
        )?;

        log::debug!(
            "Device context ready: queue family {}, {} byte staging buffer",
            queue_family_index,
            config.staging_buffer_size,
        );

        Ok(Self {
            device,
            physical_device,
            queue,
            memory_properties,
            limits,
            config,

            staging: ManuallyDrop::new(staging),
            memory_allocator: ManuallyDrop::new(memory_allocator),

            debug_messenger,
            debug_callback,
        })
    }

    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn memory_allocator(&self) -> &Arc<Mutex<Allocator>> {
        &self.memory_allocator
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Report a message through the injected debug callback
    pub fn debug_message(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT, message: &str) {
        (**self.debug_callback)(severity, message);
    }

    pub fn select_memory_type(
        &self,
        requirements: &vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        memory::select_memory_type(&self.memory_properties, requirements, properties)
    }

    pub fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Buffer> {
        Buffer::new(
            size,
            usage,
            name,
            properties,
            &self.memory_properties,
            (*self.memory_allocator).clone(),
            self.device.clone(),
        )
    }

    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        self.staging.immediate_submit(func)
    }

    pub fn upload<F>(
        &self,
        data: &[u8],
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device, vk::Buffer) -> Result<()>,
    {
        self.staging.upload(data, func)
    }

    pub fn staging_capacity(&self) -> Result<u64> {
        self.staging.capacity()
    }

    pub fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> Result<vk::DescriptorSetLayout> {
        let info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(bindings);
        Ok(unsafe { self.device.create_descriptor_set_layout(&info, None)? })
    }

    pub fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts);
        Ok(unsafe { self.device.create_pipeline_layout(&info, None)? })
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("Failed to wait for device idle during shutdown: {}", e);
            }
            ManuallyDrop::drop(&mut self.staging);
            ManuallyDrop::drop(&mut self.memory_allocator);
            self.device.destroy_device(None);
        }
    }
}

fn destroy_unused_device(device: &ash::Device) {
    log::warn!("Device context construction failed, destroying the device");
    unsafe {
        if let Err(e) = device.device_wait_idle() {
            log::error!("Failed to wait for device idle: {}", e);
        }
        device.destroy_device(None);
    }
}
