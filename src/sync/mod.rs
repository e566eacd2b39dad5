//! The sync module provides utilities dealing with Vulkan synchronization outside the scope of the
//! render graph.
//!
//! - The [`fence`] module provides a wrapper around `VkFence` objects, used for CPU-GPU sync,
//! as well as an implementation for [`Future`](std::future::Future) for them.
//! - The [`semaphore`] module provides a wrapper around binary and timeline `VkSemaphore` objects, used for GPU-GPU sync.
//! - The [`backend`] module defines the native calls both of these rely on.
//! - The [`pool`] module provides object pools, so fences and semaphores can be reused across frames.
//! - The [`execution_manager`] module abstracts away vulkan queues and synchronizes access to them.
//! Most of the time, submissions should go through here.
//! - [`submit_batch`] assembles the wait and signal semaphores of a single submission.

pub mod backend;
pub mod execution_manager;
pub mod fence;
pub mod pool;
pub mod semaphore;
pub mod submit_batch;
