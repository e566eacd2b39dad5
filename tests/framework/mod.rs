#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use anyhow::Result;
use ash::vk;
use ash::vk::Handle;

use deimos::prelude::*;

/// Enable log output for a test run. Safe to call from every test.
pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

#[derive(Debug, Default)]
struct MockState {
    next_handle: AtomicU64,
    fences: Mutex<HashMap<u64, bool>>,
    semaphores: Mutex<HashMap<u64, u64>>,
    fence_waits: AtomicUsize,
    fence_queries: AtomicUsize,
    fence_resets: AtomicUsize,
    semaphore_waits: AtomicUsize,
    destroyed: AtomicUsize,
}

/// Sync backend that simulates fences and semaphores on the CPU and counts the native calls made.
/// Fences are only signaled through [`MockSync::signal_fence`], semaphores through [`MockSync::signal_semaphore`].
/// Waiting on anything that is not signaled behaves as a timeout.
#[derive(Debug, Default, Clone)]
pub struct MockSync {
    state: Arc<MockState>,
}

impl MockSync {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self) -> u64 {
        self.state.next_handle.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn signal_fence(&self, fence: vk::Fence) {
        self.state.fences.lock().unwrap().insert(fence.as_raw(), true);
    }

    pub fn signal_semaphore(&self, semaphore: vk::Semaphore, value: u64) {
        self.state
            .semaphores
            .lock()
            .unwrap()
            .insert(semaphore.as_raw(), value);
    }

    /// Blocking fence waits issued so far.
    pub fn fence_waits(&self) -> usize {
        self.state.fence_waits.load(Ordering::SeqCst)
    }

    /// Non-blocking fence status queries issued so far.
    pub fn fence_queries(&self) -> usize {
        self.state.fence_queries.load(Ordering::SeqCst)
    }

    pub fn fence_resets(&self) -> usize {
        self.state.fence_resets.load(Ordering::SeqCst)
    }

    pub fn semaphore_waits(&self) -> usize {
        self.state.semaphore_waits.load(Ordering::SeqCst)
    }

    /// Handles created so far.
    pub fn created(&self) -> usize {
        self.state.next_handle.load(Ordering::SeqCst) as usize
    }

    pub fn destroyed(&self) -> usize {
        self.state.destroyed.load(Ordering::SeqCst)
    }
}

impl SyncBackend for MockSync {
    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let handle = self.handle();
        self.state.fences.lock().unwrap().insert(handle, signaled);
        Ok(vk::Fence::from_raw(handle))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.state.fences.lock().unwrap().remove(&fence.as_raw());
        self.state.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> Result<bool> {
        self.state.fence_waits.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .fences
            .lock()
            .unwrap()
            .get(&fence.as_raw())
            .copied()
            .unwrap_or(false))
    }

    fn fence_status(&self, fence: vk::Fence) -> Result<bool> {
        self.state.fence_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .fences
            .lock()
            .unwrap()
            .get(&fence.as_raw())
            .copied()
            .unwrap_or(false))
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        self.state.fence_resets.fetch_add(1, Ordering::SeqCst);
        self.state.fences.lock().unwrap().insert(fence.as_raw(), false);
        Ok(())
    }

    fn create_semaphore(&self, kind: SemaphoreKind) -> Result<vk::Semaphore> {
        let handle = self.handle();
        let initial = match kind {
            SemaphoreKind::Binary => 0,
            SemaphoreKind::Timeline(value) => value,
        };
        self.state.semaphores.lock().unwrap().insert(handle, initial);
        Ok(vk::Semaphore::from_raw(handle))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.semaphores.lock().unwrap().remove(&semaphore.as_raw());
        self.state.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn wait_semaphore(&self, semaphore: vk::Semaphore, value: u64, _timeout: u64) -> Result<bool> {
        self.state.semaphore_waits.fetch_add(1, Ordering::SeqCst);
        let current = self.semaphore_value(semaphore)?;
        Ok(current >= value)
    }

    fn semaphore_value(&self, semaphore: vk::Semaphore) -> Result<u64> {
        Ok(self
            .state
            .semaphores
            .lock()
            .unwrap()
            .get(&semaphore.as_raw())
            .copied()
            .unwrap_or(0))
    }
}

/// Downcast an error returned by deimos.
pub fn deimos_error(err: &anyhow::Error) -> &Error {
    err.downcast_ref::<Error>()
        .unwrap_or_else(|| panic!("expected a deimos error, got `{err}`"))
}

/// Shadow, geometry and UI passes. The UI is drawn on top of the geometry output, so it loads the color attachment.
pub fn scenario_graph<'cb>() -> Result<PassGraph<'cb>> {
    let shadow_map = VirtualResource::image("shadow_map");
    let color = VirtualResource::image("color");
    let depth = VirtualResource::image("depth");

    PassGraph::new()
        .declare_texture(&shadow_map, TextureInfo::absolute(2048, 2048, vk::Format::D32_SFLOAT))?
        .declare_texture(&color, TextureInfo::absolute(1920, 1080, vk::Format::R8G8B8A8_UNORM))?
        .declare_texture(&depth, TextureInfo::absolute(1920, 1080, vk::Format::D24_UNORM_S8_UINT))?
        .add_pass(
            PassBuilder::render("shadow")
                .clear_depth_attachment(
                    &shadow_map,
                    ClearDepthStencil {
                        depth: 1.0,
                        stencil: 0,
                    },
                )?
                .build(),
        )?
        .add_pass(
            PassBuilder::render("geometry")
                .sample_image(&shadow_map, PipelineStage::FRAGMENT_SHADER)
                .clear_color_attachment(&color, ClearColor::Float([0.0, 0.0, 0.0, 1.0]))?
                .clear_depth_attachment(
                    &depth,
                    ClearDepthStencil {
                        depth: 1.0,
                        stencil: 0,
                    },
                )?
                .build(),
        )?
        .add_pass(
            PassBuilder::render("ui")
                .load_color_attachment(&color)?
                .build(),
        )
}

/// A render pass that only clears a color attachment.
pub fn clear_pass<'cb>(name: &str, target: &VirtualResource) -> Result<Pass<'cb>> {
    Ok(PassBuilder::render(name)
        .clear_color_attachment(target, ClearColor::Float([0.0, 0.0, 0.0, 0.0]))?
        .build())
}

/// A 256x256 RGBA8 texture.
pub fn small_texture() -> TextureInfo {
    TextureInfo::absolute(256, 256, vk::Format::R8G8B8A8_UNORM)
}
