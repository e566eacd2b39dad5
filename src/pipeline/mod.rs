//! Pipeline related utilities used by the render graph.
//!
//! Pipeline creation itself is left to the application, but the graph names pipeline stages through
//! the [`PipelineStage`] alias, and the [`cache`] module persists driver pipeline caches on disk.

pub mod cache;

/// Pipeline stage flags, as used by `VK_KHR_synchronization2`.
pub type PipelineStage = ash::vk::PipelineStageFlags2;
