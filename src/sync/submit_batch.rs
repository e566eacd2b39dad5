//! Assembles the `VkSubmitInfo2` structures for a single queue submission.

use anyhow::Result;
use ash::vk;

use crate::{CommandBuffer, PipelineStage, QueueType, Semaphore};

/// One queue submission: a list of command buffers together with the semaphores it waits on and signals.
/// The batch owns the submit structures, so the [`vk::SubmitInfo2`] returned by [`CommandBatch::info()`]
/// stays valid for as long as the batch is borrowed.
#[derive(Debug)]
pub struct CommandBatch {
    queue: QueueType,
    command_buffers: Vec<vk::CommandBufferSubmitInfo>,
    waits: Vec<vk::SemaphoreSubmitInfo>,
    signals: Vec<vk::SemaphoreSubmitInfo>,
}

fn semaphore_info(semaphore: vk::Semaphore, value: u64, stage: PipelineStage) -> vk::SemaphoreSubmitInfo {
    vk::SemaphoreSubmitInfo {
        s_type: vk::StructureType::SEMAPHORE_SUBMIT_INFO,
        p_next: std::ptr::null(),
        semaphore,
        value,
        stage_mask: stage,
        device_index: 0,
    }
}

impl CommandBatch {
    /// Start an empty batch for the given queue.
    pub fn new(queue: QueueType) -> Self {
        Self {
            queue,
            command_buffers: vec![],
            waits: vec![],
            signals: vec![],
        }
    }

    /// Append a command buffer to the batch.
    /// # Errors
    /// Fails if the command buffer was recorded for a different queue type.
    pub fn push(&mut self, cmd: &CommandBuffer) -> Result<&mut Self> {
        if cmd.queue_type() != self.queue {
            return Err(crate::Error::Uncategorized("Command buffer recorded for a different queue").into());
        }
        self.command_buffers.push(vk::CommandBufferSubmitInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_SUBMIT_INFO,
            p_next: std::ptr::null(),
            command_buffer: unsafe { cmd.handle() },
            device_mask: 0,
        });
        Ok(self)
    }

    /// Make the batch wait on the last signal of `semaphore` before executing `stage`.
    pub fn wait_on(&mut self, semaphore: &Semaphore, stage: PipelineStage) -> Result<&mut Self> {
        let value = semaphore.wait_submitted()?;
        self.waits.push(semaphore_info(unsafe { semaphore.handle() }, value, stage));
        Ok(self)
    }

    /// Wait on a semaphore that is not managed by this crate, such as a swapchain acquire semaphore.
    pub fn wait_on_raw(&mut self, semaphore: vk::Semaphore, stage: PipelineStage) -> &mut Self {
        self.waits.push(semaphore_info(semaphore, 0, stage));
        self
    }

    /// Signal `semaphore` once all work in the batch completes.
    pub fn signal(&mut self, semaphore: &Semaphore) -> Result<&mut Self> {
        let value = semaphore.signal_submitted()?;
        self.signals
            .push(semaphore_info(unsafe { semaphore.handle() }, value, PipelineStage::ALL_COMMANDS));
        Ok(self)
    }

    /// Signal a semaphore that is not managed by this crate, such as a present semaphore.
    pub fn signal_raw(&mut self, semaphore: vk::Semaphore) -> &mut Self {
        self.signals
            .push(semaphore_info(semaphore, 0, PipelineStage::ALL_COMMANDS));
        self
    }

    pub fn queue(&self) -> QueueType {
        self.queue
    }

    pub fn is_empty(&self) -> bool {
        self.command_buffers.is_empty() && self.waits.is_empty() && self.signals.is_empty()
    }

    /// The submit info for this batch. Pointers inside it borrow from `self`.
    pub fn info(&self) -> vk::SubmitInfo2 {
        vk::SubmitInfo2 {
            s_type: vk::StructureType::SUBMIT_INFO_2,
            p_next: std::ptr::null(),
            flags: vk::SubmitFlags::empty(),
            wait_semaphore_info_count: self.waits.len() as u32,
            p_wait_semaphore_infos: self.waits.as_ptr(),
            command_buffer_info_count: self.command_buffers.len() as u32,
            p_command_buffer_infos: self.command_buffers.as_ptr(),
            signal_semaphore_info_count: self.signals.len() as u32,
            p_signal_semaphore_infos: self.signals.as_ptr(),
        }
    }
}
