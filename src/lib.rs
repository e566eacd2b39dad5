//! Vulkan render graph with automatic synchronization and resource aliasing.
//!
//! Deimos describes the GPU work of a frame as a graph of passes with declared resource usages. From these
//! declarations it computes an execution order, aliases transient resources with disjoint lifetimes, inserts the
//! barriers, layout transitions and queue ownership transfers needed between passes, and submits the recorded work to
//! multiple queues with the semaphores between them.
//!
//! Deimos does not create the Vulkan instance or device. It works on top of an [`ash::Device`] created by the
//! application, wrapped in a [`Device`]:
//! ```ignore
//! use deimos::prelude::*;
//!
//! let device = Device::from_raw(ash_device, queue_families, properties, true);
//! let exec = ExecutionManager::new(device.clone(), &queues)?;
//! let mut allocator = DefaultAllocator::new(&ash_instance, &device, physical_device)?;
//! let settings = GraphSettingsBuilder::new()
//!     .swapchain(vk::Extent2D { width: 1920, height: 1080 }, vk::Format::B8G8R8A8_SRGB)
//!     .build();
//! ```
//! For further example code, check out the following modules
//! - [`graph`] for declaring passes and resources, baking and executing a render graph.
//! - [`sync`] for fences, semaphores, object pools and queue submission.
//! - [`command_buffer`] for different Vulkan commands available.
//! - [`allocator`] for GPU memory allocation.
//! - [`resource`] for managing [`VkImage`](vk::Image) and [`VkBuffer`](vk::Buffer) objects.
//! - [`pipeline`] for pipeline cache files.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod allocator;
pub mod command_buffer;
pub mod core;
pub mod graph;
pub mod pipeline;
pub mod resource;
pub mod sync;
