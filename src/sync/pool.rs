//! Object pools for synchronization primitives.
//!
//! A [`Pool`] hands out [`Pooled`] objects that return to the pool when dropped. The pool keeps
//! statistics on how often it had to grow beyond its preallocated size.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;

/// Indicates that this object can be pooled in a [`Pool`]
pub trait Poolable {
    /// Called right before the object is released back to the pool, can be used to reset internal state.
    fn on_release(&mut self);

    /// Create a new pooled object from a pool.
    fn new_in_pool(pool: &Pool<Self>) -> Result<Pooled<Self>>
    where
        Self: Sized, {
        let item = pool.with(|pool| pool.get())?;
        Ok(Pooled::from_pool(pool.clone(), item))
    }
}

/// Represents a pooled object. When this is dropped, it's released back to the pool where it can
/// be reused immediately.
pub struct Pooled<P: Poolable> {
    item: Option<P>,
    pool: Pool<P>,
}

type BoxedCreateFunc<P> = Box<dyn Fn() -> Result<P> + Send>;

/// Usage counters of a pool.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Objects created up front.
    pub preallocated: usize,
    /// Objects created because the pool ran dry.
    pub overflow: usize,
    /// Number of times an object was handed out from the pool instead of being created.
    pub recycled: usize,
    /// Objects currently waiting in the pool.
    pub available: usize,
}

struct PoolInner<P: Poolable> {
    items: Vec<P>,
    create_fn: BoxedCreateFunc<P>,
    stats: PoolStats,
}

/// Represents an object pool that can be allocated from
pub struct Pool<P: Poolable> {
    inner: Arc<Mutex<PoolInner<P>>>,
}

impl<P: Poolable> Clone for Pool<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Poolable> std::fmt::Debug for Pool<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("stats", &self.stats()).finish()
    }
}

impl<P: Poolable> Pooled<P> {
    /// Create a new pooled object from a pool and an item
    fn from_pool(pool: Pool<P>, item: P) -> Self {
        Self {
            item: Some(item),
            pool,
        }
    }

    /// Take the object out of its pool for good. It is not released back when dropped.
    pub fn detach(mut this: Self) -> P {
        match this.item.take() {
            Some(item) => item,
            None => unreachable!("pooled item accessed after release"),
        }
    }
}

impl<P: Poolable> Deref for Pooled<P> {
    type Target = P;

    fn deref(&self) -> &Self::Target {
        // The item is only taken out in drop()
        match &self.item {
            Some(item) => item,
            None => unreachable!("pooled item accessed after release"),
        }
    }
}

impl<P: Poolable> DerefMut for Pooled<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.item {
            Some(item) => item,
            None => unreachable!("pooled item accessed after release"),
        }
    }
}

impl<P: Poolable + std::fmt::Debug> std::fmt::Debug for Pooled<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Pooled").field(&self.item).finish()
    }
}

impl<P: Poolable> Drop for Pooled<P> {
    fn drop(&mut self) {
        // Take the item out of self and release it back to the pool
        if let Some(mut item) = self.item.take() {
            item.on_release();
            self.pool.with(|pool| pool.take(item));
        }
    }
}

impl<P: Poolable> PoolInner<P> {
    /// Release an object back into the pool
    fn take(&mut self, item: P) {
        self.items.push(item);
        self.stats.available = self.items.len();
    }

    /// Grab an object from the pool. If there are none left, this will allocate a new one.
    fn get(&mut self) -> Result<P> {
        let item = match self.items.pop() {
            Some(item) => {
                self.stats.recycled += 1;
                item
            }
            None => {
                self.stats.overflow += 1;
                debug!(
                    "Pool of {} ran dry, allocating a new object ({} created on demand)",
                    std::any::type_name::<P>(),
                    self.stats.overflow
                );
                (self.create_fn)()?
            }
        };
        self.stats.available = self.items.len();
        Ok(item)
    }
}

impl<P: Poolable> Pool<P> {
    /// Get mutable access to the inner pool
    fn with<F: FnOnce(&mut PoolInner<P>) -> R, R>(&self, f: F) -> R {
        let mut inner: MutexGuard<PoolInner<P>> = match self.inner.lock() {
            Ok(inner) => inner,
            // The pool only holds plain objects, a panic while holding the lock cannot leave them half-updated.
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut inner)
    }

    /// Create a new pool. This must be supplied with a callback to be called
    /// when the pool needs to allocate a new object, and a count of objects to preallocate using this callback.
    pub fn new(create_fn: impl Fn() -> Result<P> + Send + 'static, preallocate_count: usize) -> Result<Self> {
        let mut items = Vec::with_capacity(preallocate_count);
        for _ in 0..preallocate_count {
            items.push(create_fn()?);
        }

        let inner = PoolInner {
            stats: PoolStats {
                preallocated: preallocate_count,
                available: preallocate_count,
                ..Default::default()
            },
            items,
            create_fn: Box::new(create_fn),
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    /// Get an object from the pool, creating one if the pool is empty.
    pub fn get(&self) -> Result<Pooled<P>> {
        P::new_in_pool(self)
    }

    /// Current usage statistics of the pool.
    pub fn stats(&self) -> PoolStats {
        self.with(|pool| pool.stats)
    }
}
