//! Exposes different memory types that determine where memory allocations should live.

/// The memory type of an allocation indicates where it should live.
/// Give this to an [`Allocator`](crate::Allocator) to let it decide
/// where your allocation should live.
///
/// Physical resources created by the render graph always live in [`MemoryType::GpuOnly`] memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MemoryType {
    /// Store the allocation in GPU only accessible memory. Most allocations should live here.
    GpuOnly,
    /// Memory useful for uploading data to the GPU and potentially for constant buffers.
    CpuToGpu,
    /// Memory useful for CPU readback of data.
    GpuToCpu,
}

impl From<MemoryType> for gpu_allocator::MemoryLocation {
    fn from(value: MemoryType) -> Self {
        match value {
            MemoryType::GpuOnly => gpu_allocator::MemoryLocation::GpuOnly,
            MemoryType::CpuToGpu => gpu_allocator::MemoryLocation::CpuToGpu,
            MemoryType::GpuToCpu => gpu_allocator::MemoryLocation::GpuToCpu,
        }
    }
}
