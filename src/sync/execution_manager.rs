//! Exposes the [`ExecutionManager`], used to look up and submit to queues.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;

use crate::{Device, Error, Fence, Queue, QueueInfo, QueueType};
use crate::sync::submit_batch::CommandBatch;

/// The execution manager owns the device queues and synchronizes access to them. Every [`QueueType`] resolves
/// to a queue when the manager is created: a queue of exactly that type if there is one, otherwise any queue whose
/// capabilities include the required flags. On a device with a single queue, all three types resolve to it.
///
/// # Example
/// ```ignore
/// use deimos::prelude::*;
/// let exec = ExecutionManager::new(device.clone(), &queues)?;
/// let mut batch = CommandBatch::new(QueueType::Graphics);
/// batch.push(&cmd)?;
/// let fence = Fence::new(device.clone(), false)?;
/// exec.submit(QueueType::Graphics, &[batch], Some(&fence))?;
/// fence.wait()?;
/// ```
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ExecutionManager {
    #[derivative(Debug = "ignore")]
    device: Device,
    queues: Arc<Vec<Mutex<Queue>>>,
    resolved: [Option<usize>; 3],
}

fn resolve(ty: QueueType, infos: &[QueueInfo]) -> Option<usize> {
    infos
        .iter()
        .position(|info| info.queue_type == ty)
        .or_else(|| {
            infos
                .iter()
                .position(|info| info.flags.contains(ty.required_flags()))
        })
}

impl ExecutionManager {
    /// Create a new execution manager from the queues that were requested at device creation.
    /// Queue infos that refer to the same `(family, index)` pair share one `VkQueue`.
    /// # Errors
    /// Fails if there is no queue capable of graphics work.
    pub fn new(device: Device, queues: &[QueueInfo]) -> Result<Self> {
        let mut unique: HashMap<(u32, u32), usize> = HashMap::new();
        let mut infos = Vec::new();
        for info in queues {
            unique.entry((info.family_index, info.queue_index)).or_insert_with(|| {
                infos.push(*info);
                infos.len() - 1
            });
        }

        let mut resolved = [None; 3];
        for ty in QueueType::ALL {
            resolved[ty.index()] = resolve(ty, &infos);
            match resolved[ty.index()] {
                Some(index) => {
                    let info = &infos[index];
                    info!(
                        "{ty:?} work goes to queue family {} (index {}, {:?}, dedicated: {})",
                        info.family_index, info.queue_index, info.flags, info.dedicated
                    );
                }
                None => warn!("No queue can execute {ty:?} work"),
            }
        }
        if resolved[QueueType::Graphics.index()].is_none() {
            return Err(Error::NoCapableQueue(QueueType::Graphics).into());
        }

        let queues = infos
            .into_iter()
            .map(|info| Mutex::new(Queue::new(device.clone(), info)))
            .collect();

        Ok(ExecutionManager {
            device,
            queues: Arc::new(queues),
            resolved,
        })
    }

    fn queue_index(&self, ty: QueueType) -> Result<usize> {
        self.resolved[ty.index()].ok_or_else(|| Error::NoCapableQueue(ty).into())
    }

    /// Obtain a locked queue for this queue type. Blocks if the queue is currently locked.
    pub fn get_queue(&self, ty: QueueType) -> Result<MutexGuard<Queue>> {
        let index = self.queue_index(ty)?;
        Ok(self.queues[index].lock().map_err(|_| Error::PoisonError)?)
    }

    /// Information on the queue that work of this type is submitted to.
    pub fn queue_info(&self, ty: QueueType) -> Result<QueueInfo> {
        Ok(*self.get_queue(ty)?.info())
    }

    /// Queue family index for this queue type.
    pub fn family_index(&self, ty: QueueType) -> Result<u32> {
        Ok(self.queue_info(ty)?.family_index)
    }

    /// Whether two queue types resolve to the same `VkQueue`.
    pub fn same_queue(&self, a: QueueType, b: QueueType) -> bool {
        self.resolved[a.index()].is_some() && self.resolved[a.index()] == self.resolved[b.index()]
    }

    /// Submit a list of batches to the queue for `ty`, optionally signaling `fence` once all of them complete.
    pub fn submit(&self, ty: QueueType, batches: &[CommandBatch], fence: Option<&Fence>) -> Result<()> {
        let infos = batches.iter().map(|batch| batch.info()).collect::<Vec<_>>();
        let queue = self.get_queue(ty)?;
        unsafe { queue.submit2(&infos, fence) }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}
