//! The native calls behind [`Fence`](crate::Fence) and [`Semaphore`](crate::Semaphore).
//!
//! [`Device`] implements [`SyncBackend`] by forwarding to the Vulkan API. Other implementations can be
//! used to drive the synchronization primitives without a GPU.

use anyhow::Result;
use ash::vk;

use crate::Device;

/// Kind of semaphore to create.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SemaphoreKind {
    /// Binary semaphore, signaled and waited on in pairs.
    Binary,
    /// Timeline semaphore with a monotonically increasing counter, starting at the given value.
    Timeline(u64),
}

/// Native fence and semaphore operations.
pub trait SyncBackend: Clone + Send + Sync + 'static {
    /// Create a fence, possibly in the signaled state.
    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;
    /// Destroy a fence. It must not be in use.
    fn destroy_fence(&self, fence: vk::Fence);
    /// Wait until the fence is signaled or the timeout (in nanoseconds) expires.
    /// Returns `false` on timeout.
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> Result<bool>;
    /// Query the fence status without blocking.
    fn fence_status(&self, fence: vk::Fence) -> Result<bool>;
    /// Reset the fence to the unsignaled state.
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;
    /// Create a semaphore.
    fn create_semaphore(&self, kind: SemaphoreKind) -> Result<vk::Semaphore>;
    /// Destroy a semaphore. No wait on it may be outstanding.
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    /// Wait until a timeline semaphore reaches `value`, or the timeout (in nanoseconds) expires.
    /// Returns `false` on timeout.
    fn wait_semaphore(&self, semaphore: vk::Semaphore, value: u64, timeout: u64) -> Result<bool>;
    /// Current counter value of a timeline semaphore.
    fn semaphore_value(&self, semaphore: vk::Semaphore) -> Result<u64>;
}

fn timeout_to_bool(result: ash::prelude::VkResult<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(vk::Result::TIMEOUT) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

impl SyncBackend for Device {
    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
        };
        let handle = unsafe { (**self).create_fence(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkFence {handle:p}");
        Ok(handle)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkFence {fence:p}");
        unsafe { (**self).destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> Result<bool> {
        timeout_to_bool(unsafe { self.wait_for_fences(std::slice::from_ref(&fence), true, timeout) })
    }

    fn fence_status(&self, fence: vk::Fence) -> Result<bool> {
        Ok(unsafe { self.get_fence_status(fence)? })
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { Ok(self.reset_fences(std::slice::from_ref(&fence))?) }
    }

    fn create_semaphore(&self, kind: SemaphoreKind) -> Result<vk::Semaphore> {
        let type_info = vk::SemaphoreTypeCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_TYPE_CREATE_INFO,
            p_next: std::ptr::null(),
            semaphore_type: match kind {
                SemaphoreKind::Binary => vk::SemaphoreType::BINARY,
                SemaphoreKind::Timeline(_) => vk::SemaphoreType::TIMELINE,
            },
            initial_value: match kind {
                SemaphoreKind::Binary => 0,
                SemaphoreKind::Timeline(value) => value,
            },
        };
        let info = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            p_next: match kind {
                SemaphoreKind::Binary => std::ptr::null(),
                SemaphoreKind::Timeline(_) => (&type_info as *const vk::SemaphoreTypeCreateInfo).cast(),
            },
            flags: Default::default(),
        };
        let handle = unsafe { (**self).create_semaphore(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkSemaphore {handle:p}");
        Ok(handle)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkSemaphore {semaphore:p}");
        unsafe { (**self).destroy_semaphore(semaphore, None) }
    }

    fn wait_semaphore(&self, semaphore: vk::Semaphore, value: u64, timeout: u64) -> Result<bool> {
        let info = vk::SemaphoreWaitInfo {
            s_type: vk::StructureType::SEMAPHORE_WAIT_INFO,
            p_next: std::ptr::null(),
            flags: vk::SemaphoreWaitFlags::empty(),
            semaphore_count: 1,
            p_semaphores: &semaphore,
            p_values: &value,
        };
        timeout_to_bool(unsafe { self.wait_semaphores(&info, timeout) })
    }

    fn semaphore_value(&self, semaphore: vk::Semaphore) -> Result<u64> {
        Ok(unsafe { self.get_semaphore_counter_value(semaphore)? })
    }
}
