//! The core module holds the minimal Vulkan context the render graph runs on: the device wrapper,
//! queues, the error type and graph settings.
//!
//! Instance creation and physical device selection are left to the application.

pub mod device;
pub mod error;
pub mod queue;
pub mod settings;
