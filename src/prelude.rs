pub use ash::vk;

pub use crate::core::device::Device;
pub use crate::core::error::Error;
pub use crate::core::queue::{Queue, QueueInfo, QueueType};
pub use crate::core::settings::{GraphSettings, GraphSettingsBuilder};

pub use crate::allocator::default_allocator;
pub use crate::allocator::default_allocator::DefaultAllocator;
pub use crate::allocator::memory_type::MemoryType;
pub use crate::allocator::traits::*;

pub use crate::resource::buffer::{Buffer, BufferView};
pub use crate::resource::image::{Image, ImageCreateInfo, ImageView};

pub use crate::sync::backend::{SemaphoreKind, SyncBackend};
pub use crate::sync::execution_manager::ExecutionManager;
pub use crate::sync::fence::*;
pub use crate::sync::pool::{Pool, PoolStats, Poolable, Pooled};
pub use crate::sync::semaphore::*;
pub use crate::sync::submit_batch::CommandBatch;

pub use crate::command_buffer::{CommandBuffer, IncompleteCommandBuffer};
pub use crate::command_buffer::command_pool::CommandPool;

pub use crate::pipeline::PipelineStage;
pub use crate::pipeline::cache::PipelineCacheFile;

pub use crate::graph::pass::{ClearColor, ClearDepthStencil, Pass, PassBuilder, PassExecutor};
pub use crate::graph::pass_graph::{BakedGraph, GraphViz, PassGraph};
pub use crate::graph::physical_resource::PhysicalResourceBindings;
pub use crate::graph::record::{FrameSync, RenderGraph};
pub use crate::graph::resource_info::{BufferInfo, ImportInfo, MipLevels, SizeClass, TextureInfo};
pub use crate::graph::virtual_resource::VirtualResource;
