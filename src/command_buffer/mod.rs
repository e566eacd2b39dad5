//! Most functions in this module are a relatively thin wrapper over Vulkan commands.
//!
//! # Queue types
//!
//! Every command buffer is allocated for a [`QueueType`](crate::QueueType), from a [`CommandPool`](command_pool::CommandPool)
//! created for the queue family that queue type resolves to. Command buffers do not hold on to their queue while recording,
//! so many of them can be recorded in parallel from different threads, each using its own pool.
//!
//! # Incomplete command buffers
//!
//! Vulkan command buffers need to call `vkEndCommandBuffer` before they can be submitted. After this call, no more commands should be
//! recorded to it. For this reason, we expose two command buffer types. The [`IncompleteCommandBuffer`] still accepts commands, and can only
//! be converted into a [`CommandBuffer`] by calling [`IncompleteCommandBuffer::finish()`]. This turns it into a complete command buffer, which can
//! be submitted through the [`ExecutionManager`](crate::ExecutionManager).
//!
//! # Commands
//! Commands are grouped by the kind of queue they need: [`graphics`], [`compute`] and [`transfer`]. Commands that apply to all queues,
//! such as pipeline barriers, live in [`incomplete`].

use ash::vk;

use crate::{Device, QueueType};

pub mod command_pool;
pub mod compute;
pub mod graphics;
pub mod incomplete;
pub mod transfer;

pub(crate) mod state;

/// This struct represents a finished command buffer. This command buffer can't be recorded to anymore.
/// It can only be obtained by calling [`IncompleteCommandBuffer::finish()`].
/// # Example
/// ```
/// # use deimos::prelude::*;
/// # use anyhow::Result;
/// fn finish_and_wait(exec: &ExecutionManager, device: Device, cmd: IncompleteCommandBuffer) -> Result<()> {
///     let cmd: CommandBuffer = cmd.finish()?;
///     let mut batch = CommandBatch::new(cmd.queue_type());
///     batch.push(&cmd)?;
///     let fence = Fence::new(device, false)?;
///     exec.submit(cmd.queue_type(), &[batch], Some(&fence))?;
///     fence.wait()
/// }
/// ```
#[derive(Debug)]
pub struct CommandBuffer {
    handle: vk::CommandBuffer,
    queue: QueueType,
}

/// This struct represents an incomplete command buffer.
/// This is a command buffer that has not been called [`IncompleteCommandBuffer::finish()`] on yet.
/// Calling this method will turn it into an immutable command buffer which can then be submitted
/// to the queue it was allocated for.
///
/// Commands consume and return the command buffer, so they can be chained:
/// ```ignore
/// # use deimos::prelude::*;
/// let cmd = pool.allocate(QueueType::Graphics)?
///     .viewport(viewport)
///     .scissor(scissor)
///     .draw(3, 1, 0, 0)
///     .finish()?;
/// ```
#[derive(Derivative)]
#[derivative(Debug)]
pub struct IncompleteCommandBuffer {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::CommandBuffer,
    queue: QueueType,
    current_pipeline_layout: vk::PipelineLayout,
    current_bindpoint: vk::PipelineBindPoint,
    current_render_area: vk::Rect2D,
}

impl CommandBuffer {
    /// Get unsafe access to the underlying command buffer
    /// # Safety
    /// Any vulkan calls that modify the command buffer state may lead to validation errors or put the
    /// system in an undefined state.
    pub unsafe fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    /// The queue type this command buffer was recorded for.
    pub fn queue_type(&self) -> QueueType {
        self.queue
    }
}
