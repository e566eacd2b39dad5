//! Buffers backing the buffer resources of a render graph.
//!
//! A [`Buffer`] owns its `VkBuffer` and memory. Passes only ever see a [`BufferView`], which is `Copy` and stays valid
//! for as long as the graph that owns the buffer lives.

use anyhow::Result;
use ash::vk;

use crate::{Allocation, Allocator, DefaultAllocator, Device, MemoryType};

/// A `VkBuffer` with its own memory allocation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Buffer<A: Allocator = DefaultAllocator> {
    #[derivative(Debug = "ignore")]
    device: Device,
    #[derivative(Debug = "ignore")]
    #[allow(dead_code)]
    memory: A::Allocation,
    handle: vk::Buffer,
    size: vk::DeviceSize,
}

/// Range of a [`Buffer`] handed to passes and barriers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferView {
    handle: vk::Buffer,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
}

impl<A: Allocator> Buffer<A> {
    /// Create an exclusively owned buffer of `size` bytes for the resource `name`.
    /// # Errors
    /// * Fails if buffer creation fails.
    /// * Fails if no memory could be allocated in `location`. The buffer is destroyed again.
    pub fn new(
        device: Device,
        allocator: &mut A,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryType,
    ) -> Result<Self> {
        let info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: vk::BufferCreateFlags::empty(),
            size,
            usage,
            // Queue changes are done through ownership transfers.
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_index_count: 0,
            p_queue_family_indices: std::ptr::null(),
        };
        let handle = unsafe { device.create_buffer(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created VkBuffer {handle:p} for `{name}` ({size} bytes, {usage:?})");

        let requirements = unsafe { device.get_buffer_memory_requirements(handle) };
        let memory = match allocator.allocate(name, &requirements, location) {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_buffer(handle, None) };
                return Err(err);
            }
        };
        if let Err(err) = unsafe { device.bind_buffer_memory(handle, memory.memory(), memory.offset()) } {
            unsafe { device.destroy_buffer(handle, None) };
            return Err(err.into());
        }

        Ok(Self {
            device,
            memory,
            handle,
            size,
        })
    }

    /// View of the whole buffer.
    pub fn view(&self) -> BufferView {
        BufferView {
            handle: self.handle,
            offset: 0,
            size: self.size,
        }
    }
}

impl<A: Allocator> Drop for Buffer<A> {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkBuffer {:p}", self.handle);
        unsafe {
            self.device.destroy_buffer(self.handle, None);
        }
    }
}

impl BufferView {
    /// # Safety
    /// The handle must not be used after the owning buffer is dropped, and must not be destroyed.
    pub unsafe fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}
