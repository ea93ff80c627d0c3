use std::sync::{Arc, Mutex, MutexGuard};
use ash::vk;
use color_eyre::eyre::{eyre, Result};
use crate::renderer::contexts::device_ctx::queue::Queue;
use crate::renderer::error::SceneError;
use crate::renderer::resources::buffer::Buffer;

/// Everything a submission touches. Only reachable through the `StagingContext` lock.
struct StagingState {
    staging_fence: vk::Fence,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    staging_buffer: Buffer,
}

/// Take `lock` for the duration of `func`, turning poisoning into an error
fn with_exclusive<T, R>(lock: &Mutex<T>, func: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
    let mut guard: MutexGuard<T> = lock.lock().map_err(|e| eyre!(e.to_string()))?;
    func(&mut guard)
}

/// Owns the single staging buffer and the command pool used for every host to device upload.
/// Each submission blocks until the GPU has finished with it, so the staging buffer can be
/// overwritten as soon as a call returns. Concurrent callers wait on one another.
pub struct StagingContext {
    state: Mutex<StagingState>,

    queue: Arc<Queue>,
    device: Arc<ash::Device>,
}

impl StagingContext {
    pub fn new(
        staging_buffer: Buffer,
        queue: Arc<Queue>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let staging_fence_info = vk::FenceCreateInfo::default();
        let staging_fence =
            unsafe { device.create_fence(&staging_fence_info, None)? };

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue.family.index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool = match unsafe { device.create_command_pool(&command_pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_fence(staging_fence, None) };
                return Err(e.into());
            }
        };

        // From here on Drop cleans up
        let mut staging = Self {
            state: Mutex::new(StagingState {
                staging_fence,
                command_pool,
                command_buffer: vk::CommandBuffer::null(),
                staging_buffer,
            }),
            queue,
            device,
        };

        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffer = unsafe {
            staging.device
                .allocate_command_buffers(&command_buffer_info)?
                .first()
                .copied()
                .ok_or_else(|| eyre!("Driver returned no staging command buffer"))?
        };
        staging.state_mut().command_buffer = command_buffer;

        Ok(staging)
    }

    fn state_mut(&mut self) -> &mut StagingState {
        self.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> Result<u64> {
        with_exclusive(&self.state, |state| Ok(state.staging_buffer.size))
    }

    /// Record commands with `func`, submit them and wait for completion with no timeout
    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        with_exclusive(&self.state, |state| self.submit(state, func))
    }

    /// Copy `data` to the start of the staging buffer, then record and submit `func`,
    /// which receives the staging buffer as its copy source.
    /// The staging buffer stays locked until the GPU is done reading it.
    pub fn upload<F>(
        &self,
        data: &[u8],
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device, vk::Buffer) -> Result<()>,
    {
        with_exclusive(&self.state, |state| {
            let capacity = state.staging_buffer.size;
            if data.len() as u64 > capacity {
                return Err(SceneError::StagingOverflow {
                    requested: data.len() as u64,
                    capacity,
                }
                .into());
            }

            state.staging_buffer.write(data, 0)?;
            let src = state.staging_buffer.buffer;
            self.submit(state, |cmd, device| func(cmd, device, src))
        })
    }

    /// Caller must hold the state lock
    fn submit<F>(&self, state: &mut StagingState, func: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        let cmd = state.command_buffer;

        let cmd_begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.begin_command_buffer(cmd, &cmd_begin_info)?;
        }

        func(cmd, &self.device)?;

        unsafe {
            self.device.end_command_buffer(cmd)?;
        }

        let cmd = [cmd];
        let submit = vk::SubmitInfo::default()
            .command_buffers(&cmd);
        unsafe {
            self.device.queue_submit(
                self.queue.handle,
                &[submit],
                state.staging_fence,
            )?;
        }

        unsafe {
            self.device.wait_for_fences(&[state.staging_fence], true, u64::MAX)?;
            self.device.reset_fences(&[state.staging_fence])?;
            self.device.reset_command_pool(
                state.command_pool,
                vk::CommandPoolResetFlags::empty(),
            )?;
        }

        Ok(())
    }
}

impl Drop for StagingContext {
    fn drop(&mut self) {
        let device = self.device.clone();
        let state = self.state_mut();
        unsafe {
            device.destroy_command_pool(state.command_pool, None);
            device.destroy_fence(state.staging_fence, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn exclusive_sections_never_overlap() {
        crate::init_test_logging();
        let lock = Mutex::new(0u32);
        let inside = AtomicBool::new(false);
        let overlaps = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        with_exclusive(&lock, |count| {
                            if inside.swap(true, Ordering::SeqCst) {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            thread::sleep(Duration::from_micros(50));
                            *count += 1;
                            inside.store(false, Ordering::SeqCst);
                            Ok(())
                        }).unwrap();
                    }
                });
            }
        });

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(*lock.lock().unwrap(), 100);
    }

    #[test]
    fn poisoned_lock_is_an_error() {
        let lock = Mutex::new(());
        let _ = thread::scope(|scope| {
            scope.spawn(|| {
                let _guard = lock.lock().unwrap();
                panic!("poison the staging lock");
            }).join()
        });

        assert!(with_exclusive(&lock, |_| Ok(())).is_err());
    }
}
