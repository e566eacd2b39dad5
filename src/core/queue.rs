use std::str::FromStr;

use anyhow::Result;
use ash::vk;

use crate::{Device, Error, Fence};

/// Abstraction over vulkan queue capabilities. Note that in raw Vulkan, there is no 'Graphics queue'. Deimos will expose one, but behind the scenes the exposed
/// e.g. graphics queue and transfer could point to the same hardware queue.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum QueueType {
    #[default]
    Graphics,
    Compute,
    Transfer,
}

impl QueueType {
    /// All queue types, in a fixed order. [`QueueType::index()`] indexes into this.
    pub const ALL: [QueueType; 3] = [QueueType::Graphics, QueueType::Compute, QueueType::Transfer];

    /// Dense index of this queue type, useful for per-queue arrays.
    pub fn index(self) -> usize {
        match self {
            QueueType::Graphics => 0,
            QueueType::Compute => 1,
            QueueType::Transfer => 2,
        }
    }

    /// Queue flags a queue needs to be able to execute work of this type.
    pub fn required_flags(self) -> vk::QueueFlags {
        match self {
            QueueType::Graphics => vk::QueueFlags::GRAPHICS,
            QueueType::Compute => vk::QueueFlags::COMPUTE,
            QueueType::Transfer => vk::QueueFlags::TRANSFER,
        }
    }
}

impl FromStr for QueueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graphics" | "Graphics" => Ok(QueueType::Graphics),
            "compute" | "Compute" => Ok(QueueType::Compute),
            "transfer" | "Transfer" => Ok(QueueType::Transfer),
            _ => Err(Error::UnknownToken {
                kind: "queue",
                token: s.to_owned(),
            }),
        }
    }
}

/// Stores all information of a queue that was found on the physical device.
#[derive(Default, Debug, Copy, Clone)]
pub struct QueueInfo {
    /// Functionality that this queue provides.
    pub queue_type: QueueType,
    /// Whether this is a dedicated queue or not.
    pub dedicated: bool,
    /// The queue family index.
    pub family_index: u32,
    /// Index of the queue inside its family.
    pub queue_index: u32,
    /// All supported operations on this queue, instead of its primary type.
    pub flags: vk::QueueFlags,
}

/// Exposes a logical command queue on the device. Note that the physical `VkQueue` object could be multiplexed
/// between different logical queues (e.g. on devices with only one queue).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Queue {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Queue,
    /// Information about this queue, such as supported operations, family index, etc. See also [`QueueInfo`]
    info: QueueInfo,
}

impl Queue {
    pub(crate) fn new(device: Device, info: QueueInfo) -> Self {
        let handle = unsafe { device.get_device_queue(info.family_index, info.queue_index) };
        Queue {
            device,
            handle,
            info,
        }
    }

    /// Submits a batch of submissions to the queue, and signals the given fence when the
    /// submission is done.
    /// # Safety
    /// Every handle referenced by `submits` must be valid, and the queue must be externally synchronized.
    /// The [`ExecutionManager`](crate::ExecutionManager) takes care of the latter by only handing out locked queues.
    pub unsafe fn submit2(&self, submits: &[vk::SubmitInfo2], fence: Option<&Fence>) -> Result<()> {
        let fence = match fence {
            None => vk::Fence::null(),
            Some(fence) => fence.handle(),
        };
        Ok(self.device.queue_submit2(self.handle, submits, fence)?)
    }

    /// Obtain the raw vulkan handle of a queue.
    /// # Safety
    /// The caller must not submit to this queue without holding the queue lock.
    pub unsafe fn handle(&self) -> vk::Queue {
        self.handle
    }

    pub fn info(&self) -> &QueueInfo {
        &self.info
    }
}
