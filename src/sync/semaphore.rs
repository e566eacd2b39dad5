//! Wrapper around `VkSemaphore` objects, used for GPU-GPU sync.
//!
//! Binary semaphores track whether a signal is pending and whether a wait has been submitted for it, so that a
//! semaphore is never waited on twice for a single signal. Timeline semaphores track the value the next signal
//! will reach, and cache the last value observed on the host.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use ash::vk;

use crate::{Device, Error};
use crate::sync::backend::{SemaphoreKind, SyncBackend};
use crate::sync::pool::{Pool, Poolable, Pooled};

#[derive(Debug, Default, Copy, Clone)]
struct SemaphoreState {
    signal_pending: bool,
    wait_pending: bool,
    target: u64,
    observed: u64,
}

/// Wrapper around a [`VkSemaphore`](vk::Semaphore) object. Semaphores are used for GPU-GPU sync.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Semaphore<B: SyncBackend = Device> {
    #[derivative(Debug = "ignore")]
    backend: B,
    handle: vk::Semaphore,
    kind: SemaphoreKind,
    state: Mutex<SemaphoreState>,
}

impl<B: SyncBackend> Semaphore<B> {
    /// Create a new binary `VkSemaphore` object.
    pub fn new(backend: B) -> Result<Self> {
        Self::with_kind(backend, SemaphoreKind::Binary)
    }

    /// Create a new timeline semaphore, starting at `initial`.
    pub fn new_timeline(backend: B, initial: u64) -> Result<Self> {
        Self::with_kind(backend, SemaphoreKind::Timeline(initial))
    }

    fn with_kind(backend: B, kind: SemaphoreKind) -> Result<Self> {
        let handle = backend.create_semaphore(kind)?;
        let initial = match kind {
            SemaphoreKind::Binary => 0,
            SemaphoreKind::Timeline(value) => value,
        };
        Ok(Self {
            backend,
            handle,
            kind,
            state: Mutex::new(SemaphoreState {
                target: initial,
                observed: initial,
                ..Default::default()
            }),
        })
    }

    pub fn is_timeline(&self) -> bool {
        matches!(self.kind, SemaphoreKind::Timeline(_))
    }

    /// Register a signal operation that is about to be submitted. Returns the value that will be signaled,
    /// which is always zero for binary semaphores.
    /// # Errors
    /// Fails if this is a binary semaphore that already has an unconsumed signal pending.
    pub fn signal_submitted(&self) -> Result<u64> {
        let mut state = self.state.lock().map_err(|_| Error::PoisonError)?;
        match self.kind {
            SemaphoreKind::Binary => {
                if state.signal_pending {
                    return Err(Error::Uncategorized("Binary semaphore signaled twice without a wait").into());
                }
                state.signal_pending = true;
                Ok(0)
            }
            SemaphoreKind::Timeline(_) => {
                state.target += 1;
                Ok(state.target)
            }
        }
    }

    /// Register a wait operation that is about to be submitted. Returns the value that will be waited for.
    /// # Errors
    /// Fails if this is a binary semaphore without a pending signal, or one that is already being waited on.
    pub fn wait_submitted(&self) -> Result<u64> {
        let mut state = self.state.lock().map_err(|_| Error::PoisonError)?;
        match self.kind {
            SemaphoreKind::Binary => {
                if !state.signal_pending || state.wait_pending {
                    return Err(Error::Uncategorized("Binary semaphore waited on without a matching signal").into());
                }
                state.wait_pending = true;
                Ok(0)
            }
            SemaphoreKind::Timeline(_) => Ok(state.target),
        }
    }

    /// Whether a signal was submitted that no wait has consumed yet.
    pub fn is_signal_pending(&self) -> bool {
        self.state.lock().map(|state| state.signal_pending && !state.wait_pending).unwrap_or(false)
    }

    /// The value the last submitted signal will reach. Zero for binary semaphores.
    pub fn target(&self) -> u64 {
        self.state.lock().map(|state| state.target).unwrap_or(0)
    }

    /// Block until the last submitted signal of a timeline semaphore has completed.
    /// Returns false if the timeout expired first.
    /// # Errors
    /// Binary semaphores cannot be waited on from the host.
    pub fn wait(&self, timeout: Duration) -> Result<bool> {
        if !self.is_timeline() {
            return Err(Error::Uncategorized("Cannot wait on a binary semaphore from the host").into());
        }
        let mut state = self.state.lock().map_err(|_| Error::PoisonError)?;
        if state.observed >= state.target {
            return Ok(true);
        }
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let reached = self.backend.wait_semaphore(self.handle, state.target, nanos)?;
        if reached {
            state.observed = state.target;
        }
        Ok(reached)
    }

    /// Query the current counter value of a timeline semaphore.
    pub fn value(&self) -> Result<u64> {
        if !self.is_timeline() {
            return Err(Error::Uncategorized("Binary semaphores have no counter value").into());
        }
        let value = self.backend.semaphore_value(self.handle)?;
        let mut state = self.state.lock().map_err(|_| Error::PoisonError)?;
        state.observed = state.observed.max(value);
        Ok(value)
    }

    /// Get the raw `VkSemaphore` handle.
    /// # Safety
    /// The caller must not destroy this handle, and must keep the pending state consistent by calling
    /// [`Semaphore::signal_submitted()`] and [`Semaphore::wait_submitted()`] for every submission using it.
    pub unsafe fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl<B: SyncBackend> Poolable for Semaphore<B> {
    fn on_release(&mut self) {
        // Binary semaphores are only released once the frame that used them has retired.
        let timeline = self.is_timeline();
        if let Ok(state) = self.state.get_mut() {
            if !timeline {
                *state = SemaphoreState::default();
            }
        }
    }
}

impl<B: SyncBackend> Semaphore<B> {
    /// Create a pool of binary semaphores.
    pub fn pool(backend: B, preallocate: usize) -> Result<Pool<Self>> {
        Pool::new(move || Semaphore::new(backend.clone()), preallocate)
    }

    /// Get a binary semaphore from a pool, creating one if the pool is empty.
    pub fn from_pool(pool: &Pool<Self>) -> Result<Pooled<Self>> {
        Self::new_in_pool(pool)
    }
}

impl<B: SyncBackend> Drop for Semaphore<B> {
    fn drop(&mut self) {
        self.backend.destroy_semaphore(self.handle);
    }
}
