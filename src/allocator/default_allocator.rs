//! Contains a default allocator type based on the [`gpu_allocator`] crate that is good for most needs.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;
use gpu_allocator::vulkan as vk_alloc;
use gpu_allocator::vulkan::AllocationScheme;

use crate::{Allocator, Device, Error};
use crate::allocator::memory_type::MemoryType;
use crate::allocator::traits;

/// The default allocator. This calls into the `gpu_allocator` crate.
/// It's important to note that this allocator is `Clone`, `Send` and `Sync`. All its internal state is safely
/// wrapped inside an `Arc<Mutex<T>>`, so the render graph can hand a copy to every physical resource it creates.
///
/// See also: [`Allocator`](traits::Allocator), [`Allocation`](traits::Allocation)
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct DefaultAllocator {
    #[derivative(Debug = "ignore")]
    alloc: Arc<Mutex<vk_alloc::Allocator>>,
}

/// Allocation returned from the default allocator.
/// This allocation is automatically freed when it is dropped, so it's not strictly necessary to call [`DefaultAllocator::free()`].
#[derive(Derivative)]
#[derivative(Default, Debug)]
pub struct Allocation {
    // These are wrapped in `Option`s so we can "move" out of them in `Drop`.
    allocator: Option<DefaultAllocator>,
    allocation: Option<vk_alloc::Allocation>,
}

impl DefaultAllocator {
    /// Create a new default allocator.
    /// # Errors
    /// * May fail if creating the internal `gpu_allocator` fails.
    pub fn new(instance: &ash::Instance, device: &Device, physical_device: vk::PhysicalDevice) -> Result<Self> {
        Ok(Self {
            alloc: Arc::new(Mutex::new(vk_alloc::Allocator::new(&vk_alloc::AllocatorCreateDesc {
                instance: instance.clone(),
                // SAFETY: The user passed in a valid Device reference.
                device: unsafe { device.handle() },
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
            })?)),
        })
    }

    fn free_impl(&mut self, allocation: &mut <Self as Allocator>::Allocation) -> Result<()> {
        let mut alloc = self.alloc.lock().map_err(|_| Error::PoisonError)?;
        if let Some(allocation) = allocation.allocation.take() {
            alloc.free(allocation)?;
        }
        Ok(())
    }
}

impl Allocator for DefaultAllocator {
    type Allocation = Allocation;

    /// Allocates raw memory of a specific memory type. The given name is used for internal tracking and
    /// debug logging.
    /// # Errors
    /// * May fail if the device is out of memory
    /// * May fail if invalid [`vk::MemoryRequirements`] were passed in.
    fn allocate(&mut self, name: &str, requirements: &vk::MemoryRequirements, ty: MemoryType) -> Result<Self::Allocation> {
        let mut alloc = self.alloc.lock().map_err(|_| Error::PoisonError)?;
        let allocation = alloc.allocate(&vk_alloc::AllocationCreateDesc {
            name,
            requirements: *requirements,
            location: gpu_allocator::MemoryLocation::from(ty),
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        Ok(Allocation {
            allocator: Some(self.clone()),
            allocation: Some(allocation),
        })
    }

    /// Explicitly free memory owned by this allocator. This is generally not needed,
    /// since the implementation of [`Drop`] for [`Allocation`] already handles this.
    fn free(&mut self, mut allocation: Self::Allocation) -> Result<()> {
        self.free_impl(&mut allocation)
    }
}

impl traits::Allocation for Allocation {
    /// # Safety
    /// The user must not free this memory or access a range outside of the allocation.
    unsafe fn memory(&self) -> vk::DeviceMemory {
        match &self.allocation {
            Some(allocation) => allocation.memory(),
            None => vk::DeviceMemory::null(),
        }
    }

    fn offset(&self) -> vk::DeviceSize {
        self.allocation.as_ref().map(|allocation| allocation.offset()).unwrap_or_default()
    }

    fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
        self.allocation.as_ref().and_then(|allocation| allocation.mapped_ptr())
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        let Some(mut allocator) = self.allocator.clone() else { return; };
        if let Err(err) = allocator.free_impl(self) {
            error!("Failed to free allocation: {err}");
        }
    }
}
