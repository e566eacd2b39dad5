//! Exposes the thin Vulkan resource wrappers the render graph allocates its physical resources with.

pub mod buffer;
pub mod image;
