use std::time::Duration;

use anyhow::Result;
use futures::executor::block_on;

use deimos::prelude::*;

mod framework;

use framework::MockSync;

#[test]
fn fence_wait_is_idempotent() -> Result<()> {
    framework::init_logging();
    let backend = MockSync::new();
    let fence = Fence::new(backend.clone(), true)?;

    fence.wait()?;
    assert_eq!(backend.fence_waits(), 1);
    // Already observed, no native call is made again.
    fence.wait()?;
    assert!(fence.is_signaled()?);
    assert_eq!(backend.fence_waits(), 1);
    assert_eq!(backend.fence_queries(), 0);
    Ok(())
}

#[test]
fn fence_reset_clears_observed_state() -> Result<()> {
    let backend = MockSync::new();
    let fence = Fence::new(backend.clone(), false)?;
    assert!(!fence.is_signaled()?);
    assert!(!fence.wait_timeout(Duration::from_millis(1))?);
    assert_eq!(backend.fence_queries(), 1);
    assert_eq!(backend.fence_waits(), 1);

    backend.signal_fence(fence.handle());
    assert!(fence.is_signaled()?);
    fence.reset()?;
    assert_eq!(backend.fence_resets(), 1);
    assert!(!fence.is_signaled()?);
    // A blocking wait on a fence that never signals times out.
    assert!(fence.wait().is_err());
    Ok(())
}

#[test]
fn fence_as_future() -> Result<()> {
    let backend = MockSync::new();
    let fence = Fence::new(backend.clone(), true)?;
    block_on(fence)?;
    Ok(())
}

#[test]
fn fence_pool_statistics() -> Result<()> {
    let backend = MockSync::new();
    let pool = Fence::pool(backend.clone(), 2)?;
    assert_eq!(
        pool.stats(),
        PoolStats {
            preallocated: 2,
            overflow: 0,
            recycled: 0,
            available: 2,
        }
    );

    let fences = (0..3).map(|_| Fence::from_pool(&pool)).collect::<Result<Vec<_>>>()?;
    let stats = pool.stats();
    assert_eq!(stats.overflow, 1);
    assert_eq!(stats.recycled, 2);
    assert_eq!(stats.available, 0);
    assert_eq!(backend.created(), 3);

    // Released fences are reset and go back into the pool.
    drop(fences);
    assert_eq!(pool.stats().available, 3);
    assert_eq!(backend.fence_resets(), 3);

    let _fence = Fence::from_pool(&pool)?;
    assert_eq!(pool.stats().recycled, 3);
    assert_eq!(pool.stats().overflow, 1);
    assert_eq!(backend.created(), 3);
    Ok(())
}

#[test]
fn dropped_objects_are_destroyed() -> Result<()> {
    let backend = MockSync::new();
    {
        let _fence = Fence::new(backend.clone(), false)?;
        let _semaphore = Semaphore::new(backend.clone())?;
    }
    assert_eq!(backend.created(), 2);
    assert_eq!(backend.destroyed(), 2);
    Ok(())
}

#[test]
fn binary_semaphore_signal_wait_pairs() -> Result<()> {
    let backend = MockSync::new();
    let semaphore = Semaphore::new(backend)?;
    assert!(!semaphore.is_timeline());

    // Nothing to wait for yet.
    assert!(semaphore.wait_submitted().is_err());

    assert_eq!(semaphore.signal_submitted()?, 0);
    assert!(semaphore.is_signal_pending());
    assert!(semaphore.signal_submitted().is_err());

    semaphore.wait_submitted()?;
    assert!(!semaphore.is_signal_pending());
    assert!(semaphore.wait_submitted().is_err());

    // Binary semaphores cannot be observed from the host.
    assert!(semaphore.wait(Duration::from_millis(1)).is_err());
    assert!(semaphore.value().is_err());
    Ok(())
}

#[test]
fn pooled_semaphores_are_reset_on_release() -> Result<()> {
    let backend = MockSync::new();
    let pool = Semaphore::pool(backend, 1)?;
    {
        let semaphore = Semaphore::from_pool(&pool)?;
        semaphore.signal_submitted()?;
        semaphore.wait_submitted()?;
    }
    let semaphore = Semaphore::from_pool(&pool)?;
    assert!(!semaphore.is_signal_pending());
    semaphore.signal_submitted()?;
    assert_eq!(pool.stats().overflow, 0);
    Ok(())
}

#[test]
fn timeline_semaphore_wait_is_cached() -> Result<()> {
    let backend = MockSync::new();
    let semaphore = Semaphore::new_timeline(backend.clone(), 0)?;
    assert!(semaphore.is_timeline());

    assert_eq!(semaphore.signal_submitted()?, 1);
    assert_eq!(semaphore.wait_submitted()?, 1);
    assert_eq!(semaphore.target(), 1);

    // The GPU did not get there yet.
    assert!(!semaphore.wait(Duration::from_millis(1))?);
    assert_eq!(backend.semaphore_waits(), 1);

    backend.signal_semaphore(unsafe { semaphore.handle() }, 1);
    assert!(semaphore.wait(Duration::from_millis(1))?);
    assert_eq!(backend.semaphore_waits(), 2);
    assert!(semaphore.wait(Duration::from_millis(1))?);
    assert_eq!(backend.semaphore_waits(), 2);
    assert_eq!(semaphore.value()?, 1);

    assert_eq!(semaphore.signal_submitted()?, 2);
    Ok(())
}

#[test]
fn detached_objects_leave_the_pool() -> Result<()> {
    let backend = MockSync::new();
    let pool = Semaphore::pool(backend.clone(), 1)?;
    let semaphore = Semaphore::from_pool(&pool)?;
    semaphore.signal_submitted()?;

    // A semaphore left signaled cannot be reused, it is destroyed instead of going back to the pool.
    drop(Pooled::detach(semaphore));
    assert_eq!(backend.destroyed(), 1);
    assert_eq!(pool.stats().available, 0);

    let _fresh = Semaphore::from_pool(&pool)?;
    assert_eq!(pool.stats().overflow, 1);
    assert_eq!(backend.created(), 2);
    Ok(())
}

#[test]
fn device_is_a_sync_backend() {
    fn assert_backend<B: SyncBackend>() {}
    assert_backend::<Device>();
}
