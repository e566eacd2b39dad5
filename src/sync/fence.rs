//! Wrapper around `VkFence` objects, used for CPU-GPU sync.
//!
//! A [`Fence`] remembers whether it has already been observed in the signaled state. Once a wait has succeeded,
//! further waits return immediately without calling into the driver again, until the fence is [`reset`](Fence::reset).

use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::Result;
use ash::vk;

use crate::{Device, Error};
use crate::sync::backend::SyncBackend;
use crate::sync::pool::{Poolable, Pool, Pooled};

/// Wrapper around a [`VkFence`](vk::Fence) object. Fences are used for CPU-GPU sync.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Fence<B: SyncBackend = Device> {
    #[derivative(Debug = "ignore")]
    backend: B,
    handle: vk::Fence,
    observed: Mutex<bool>,
}

impl<B: SyncBackend> Fence<B> {
    /// Create a new fence, possibly in the signaled status.
    pub fn new(backend: B, signaled: bool) -> Result<Self> {
        let handle = backend.create_fence(signaled)?;
        Ok(Self {
            backend,
            handle,
            observed: Mutex::new(false),
        })
    }

    /// Waits for the fence to be signaled with no timeout. Note that this is a blocking call. For the nonblocking
    /// version, use the `Future` implementation by calling `.await`.
    pub fn wait(&self) -> Result<()> {
        if self.wait_timeout(Duration::MAX)? {
            Ok(())
        } else {
            Err(Error::VkError(vk::Result::TIMEOUT).into())
        }
    }

    /// Waits for the fence for at most `timeout`. A zero timeout polls the status without blocking.
    /// Returns whether the fence was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        let mut observed = self.observed.lock().map_err(|_| Error::PoisonError)?;
        if *observed {
            return Ok(true);
        }
        let signaled = if timeout.is_zero() {
            self.backend.fence_status(self.handle)?
        } else {
            let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
            self.backend.wait_for_fence(self.handle, nanos)?
        };
        *observed = signaled;
        Ok(signaled)
    }

    /// Check the fence status without blocking.
    pub fn is_signaled(&self) -> Result<bool> {
        self.wait_timeout(Duration::ZERO)
    }

    /// Resets a fence to the unsignaled status.
    pub fn reset(&self) -> Result<()> {
        let mut observed = self.observed.lock().map_err(|_| Error::PoisonError)?;
        self.backend.reset_fence(self.handle)?;
        *observed = false;
        Ok(())
    }

    /// Get the raw `VkFence` handle.
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }
}

impl<B: SyncBackend> Unpin for Fence<B> {}

// Note that the future implementation for Fence works by periodically polling the fence.
impl<B: SyncBackend> std::future::Future for Fence<B> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.is_signaled() {
            Ok(true) => Poll::Ready(Ok(())),
            Err(err) => Poll::Ready(Err(err)),
            Ok(false) => {
                let waker = ctx.waker().clone();
                std::thread::spawn(move || {
                    // We will try to poll every 5 milliseconds.
                    std::thread::sleep(Duration::from_millis(5));
                    waker.wake();
                });
                Poll::Pending
            }
        }
    }
}

impl<B: SyncBackend> Poolable for Fence<B> {
    fn on_release(&mut self) {
        if let Err(err) = self.reset() {
            error!("Failed to reset pooled fence: {err}");
        }
    }
}

impl<B: SyncBackend> Fence<B> {
    /// Create a pool of unsignaled fences.
    pub fn pool(backend: B, preallocate: usize) -> Result<Pool<Self>> {
        Pool::new(move || Fence::new(backend.clone(), false), preallocate)
    }

    /// Get a fence from a pool, creating one if the pool is empty.
    pub fn from_pool(pool: &Pool<Self>) -> Result<Pooled<Self>> {
        Self::new_in_pool(pool)
    }
}

impl<B: SyncBackend> Drop for Fence<B> {
    fn drop(&mut self) {
        self.backend.destroy_fence(self.handle);
    }
}
