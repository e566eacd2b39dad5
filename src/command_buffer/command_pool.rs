//! Command pools with a free list of command buffers.
//!
//! A [`CommandPool`] is owned by a single recording thread. Command buffers handed out by it are only
//! returned to the free list by [`CommandPool::reset()`], which must not be called before the GPU is done with them.

use anyhow::Result;
use ash::vk;

use crate::{Device, IncompleteCommandBuffer, QueueType};
use crate::sync::pool::PoolStats;

#[derive(Derivative)]
#[derivative(Debug)]
pub struct CommandPool {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::CommandPool,
    family: u32,
    free: Vec<vk::CommandBuffer>,
    in_use: Vec<vk::CommandBuffer>,
    stats: PoolStats,
}

impl CommandPool {
    /// Create a command pool for a queue family. Command buffers allocated from it are meant to be recorded once.
    pub fn new(device: Device, family: u32) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: vk::CommandPoolCreateFlags::TRANSIENT,
            queue_family_index: family,
        };
        let handle = unsafe { device.create_command_pool(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkCommandPool {handle:p} for family {family}");

        Ok(CommandPool {
            device,
            handle,
            family,
            free: vec![],
            in_use: vec![],
            stats: PoolStats::default(),
        })
    }

    fn next_handle(&mut self) -> Result<vk::CommandBuffer> {
        if let Some(handle) = self.free.pop() {
            self.stats.recycled += 1;
            return Ok(handle);
        }
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            p_next: std::ptr::null(),
            command_pool: self.handle,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
        };
        let handles = unsafe { self.device.allocate_command_buffers(&info)? };
        self.stats.overflow += 1;
        debug!(
            "Command pool for family {} grew to {} command buffers",
            self.family,
            self.stats.overflow
        );
        handles
            .into_iter()
            .next()
            .ok_or_else(|| crate::Error::Uncategorized("Driver returned no command buffer").into())
    }

    /// Get a command buffer in the recording state. The queue type must resolve to this pool's queue family.
    pub fn allocate(&mut self, queue: QueueType) -> Result<IncompleteCommandBuffer> {
        let handle = self.next_handle()?;
        self.in_use.push(handle);
        self.stats.available = self.free.len();
        IncompleteCommandBuffer::new(self.device.clone(), handle, queue, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
    }

    /// Reset the pool, moving every handed out command buffer back to the free list.
    /// # Safety
    /// None of the command buffers allocated since the last reset may still be pending execution.
    pub unsafe fn reset(&mut self) -> Result<()> {
        self.device
            .reset_command_pool(self.handle, vk::CommandPoolResetFlags::empty())?;
        self.free.append(&mut self.in_use);
        self.stats.available = self.free.len();
        Ok(())
    }

    pub fn family(&self) -> u32 {
        self.family
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkCommandPool {:p}", self.handle);
        unsafe {
            self.device.destroy_command_pool(self.handle, None);
        }
    }
}
