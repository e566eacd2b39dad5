//! Traits that custom allocators must implement to be usable by the render graph.

use std::ffi::c_void;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

use crate::allocator::memory_type::MemoryType;

/// A GPU memory allocator. Allocators are cheap to clone and shared between all physical resources of a graph.
pub trait Allocator: Clone + Send + Sync {
    /// Allocation type returned by this allocator.
    type Allocation: Allocation;

    /// Allocate memory satisfying `requirements` in the given memory type. The name is used for debugging only.
    fn allocate(&mut self, name: &str, requirements: &vk::MemoryRequirements, ty: MemoryType) -> Result<Self::Allocation>;
    /// Free an allocation. Allocations are also freed on drop.
    fn free(&mut self, allocation: Self::Allocation) -> Result<()>;
}

/// A memory allocation made by an [`Allocator`].
pub trait Allocation: Default + Send + Sync {
    /// Get unsafe access to the underlying `VkDeviceMemory`.
    /// # Safety
    /// The caller must not free this memory, or access it outside of the range of this allocation.
    unsafe fn memory(&self) -> vk::DeviceMemory;
    /// Offset of this allocation into [`Allocation::memory()`].
    fn offset(&self) -> vk::DeviceSize;
    /// Pointer to the mapped memory, if this allocation is host visible.
    fn mapped_ptr(&self) -> Option<NonNull<c_void>>;
}
