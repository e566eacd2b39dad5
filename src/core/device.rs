//! Exposes the [`Device`] wrapper, the main entry point into the Vulkan API.

use std::ops::Deref;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

#[derive(Derivative)]
#[derivative(Debug)]
struct DeviceInner {
    #[derivative(Debug = "ignore")]
    handle: ash::Device,
    queue_families: Vec<u32>,
    properties: vk::PhysicalDeviceProperties,
    owned: bool,
}

/// Wrapper around a `VkDevice`. The device provides access to almost the entire
/// Vulkan API. Internal state is wrapped in an `Arc<DeviceInner>`, so this is safe
/// to clone.
///
/// Instance creation and physical device selection are left to the application. The
/// device must have been created with `synchronization2` and `dynamicRendering` enabled,
/// and `timelineSemaphore` if timeline semaphores are used.
#[derive(Debug, Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

static_assertions::assert_impl_all!(Device: Send, Sync);

impl Device {
    /// Wrap an existing `ash::Device`. The queue family list is the set of families queues were
    /// requested from, it is used to pick the sharing mode of new resources.
    /// If `owned` is true, the device is destroyed when the last copy of this wrapper is dropped.
    pub fn from_raw(
        handle: ash::Device,
        queue_families: Vec<u32>,
        properties: vk::PhysicalDeviceProperties,
        owned: bool,
    ) -> Self {
        info!(
            "Using device {:?} with queue families {:?}",
            // SAFETY: device_name is a null terminated string filled in by the driver.
            unsafe { std::ffi::CStr::from_ptr(properties.device_name.as_ptr()) },
            queue_families
        );
        Device {
            inner: Arc::new(DeviceInner {
                handle,
                queue_families,
                properties,
                owned,
            }),
        }
    }

    /// Wait for the device to be completely idle.
    /// This should not be used as a synchronization measure, except on exit.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { Ok(self.inner.handle.device_wait_idle()?) }
    }

    /// Get unsafe access to the underlying VkDevice handle
    /// # Safety
    /// * The caller should not call `vkDestroyDevice` on this.
    /// * This handle is valid as long as there is a copy of `self` alive.
    pub unsafe fn handle(&self) -> ash::Device {
        self.inner.handle.clone()
    }

    /// Get the queue families we requested on this device.
    pub fn queue_families(&self) -> &[u32] {
        self.inner.queue_families.as_slice()
    }

    /// Get the device properties
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.inner.properties
    }

    /// True if we only have a single queue family.
    pub fn is_single_queue(&self) -> bool {
        self.inner.queue_families.len() == 1
    }
}

impl Deref for Device {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.inner.handle
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                self.handle.destroy_device(None);
            }
        }
    }
}
