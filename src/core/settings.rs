//! Exposes [`GraphSettings`], the parameters that steer how a [`PassGraph`](crate::PassGraph) is baked.

use ash::vk;

/// Settings used when baking a pass graph into a [`BakedGraph`](crate::BakedGraph).
///
/// The swapchain extent and format are used to resolve resources declared relative to the swapchain
/// (see [`SizeClass::SwapchainRelative`](crate::graph::resource_info::SizeClass)). Changing them requires a rebake.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSettings {
    /// Extent of the swapchain images.
    pub swapchain_extent: vk::Extent2D,
    /// Format of the swapchain images. Used for resources declared with the "as swapchain" format.
    pub swapchain_format: vk::Format,
    /// Whether transient resources with disjoint lifetimes may share one physical resource.
    pub aliasing: bool,
    /// Whether consecutive compatible render passes are merged into one physical pass.
    pub merge_passes: bool,
    /// Whether passes that do not contribute to the backbuffer or an imported resource are dropped.
    /// Only applies when a backbuffer is set.
    pub cull_unused: bool,
    /// Amount of worker threads used for recording command buffers.
    pub recording_threads: usize,
}

/// Hardware concurrency / 2, minimum 1.
pub(crate) fn default_recording_threads() -> usize {
    let available = std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1);
    (available / 2).max(1)
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            swapchain_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            swapchain_format: vk::Format::B8G8R8A8_SRGB,
            aliasing: true,
            merge_passes: true,
            cull_unused: true,
            recording_threads: default_recording_threads(),
        }
    }
}

/// The graph settings builder is a convenience struct to easily create [`GraphSettings`].
/// # Example
/// ```
/// # use deimos::prelude::*;
/// let settings = GraphSettingsBuilder::new()
///     .swapchain(vk::Extent2D { width: 1920, height: 1080 }, vk::Format::B8G8R8A8_SRGB)
///     .aliasing(true)
///     .recording_threads(4)
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct GraphSettingsBuilder {
    inner: GraphSettings,
}

impl GraphSettingsBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the swapchain extent and format.
    pub fn swapchain(mut self, extent: vk::Extent2D, format: vk::Format) -> Self {
        self.inner.swapchain_extent = extent;
        self.inner.swapchain_format = format;
        self
    }

    /// Enable or disable aliasing of transient resources.
    pub fn aliasing(mut self, enabled: bool) -> Self {
        self.inner.aliasing = enabled;
        self
    }

    /// Enable or disable merging of compatible render passes.
    pub fn merge_passes(mut self, enabled: bool) -> Self {
        self.inner.merge_passes = enabled;
        self
    }

    /// Enable or disable culling of passes that do not contribute to the frame.
    pub fn cull_unused(mut self, enabled: bool) -> Self {
        self.inner.cull_unused = enabled;
        self
    }

    /// Set the amount of recording threads. Values below one are clamped to one.
    pub fn recording_threads(mut self, count: usize) -> Self {
        self.inner.recording_threads = count.max(1);
        self
    }

    /// Obtain the built settings.
    pub fn build(self) -> GraphSettings {
        self.inner
    }
}
