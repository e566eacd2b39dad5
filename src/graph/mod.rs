//! The render graph describes the GPU work of a frame as a set of passes with declared resource usages. From these
//! declarations, the graph computes an execution order, allocates and aliases the physical resources, inserts all
//! barriers, layout transitions and queue ownership transfers, and submits the recorded work to the graphics, compute
//! and transfer queues with the semaphores needed between them.
//!
//! All resources are referred to through [`VirtualResource`]s, referenced by a string ID. Transient resources are
//! declared on the [`PassGraph`] and created by the graph. Resources owned by the application, such as the swapchain
//! image, are imported, and bound to each frame through the [`PhysicalResourceBindings`] struct.
//!
//! Through the [`GraphViz`] trait, it's possible to export a graphviz-compatible dot file to display the dependency
//! graph.
//!
//! # Example
//!
//! ```
//! use deimos::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let swapchain = VirtualResource::image("swapchain");
//! let shadow_map = VirtualResource::image("shadow_map");
//!
//! let graph = PassGraph::new()
//!     .declare_texture(&shadow_map, TextureInfo::absolute(2048, 2048, vk::Format::D32_SFLOAT))?
//!     .set_backbuffer(&swapchain)?
//!     .add_pass(PassBuilder::render("shadow")
//!         .clear_depth_attachment(&shadow_map, ClearDepthStencil { depth: 1.0, stencil: 0 })?
//!         .build())?
//!     .add_pass(PassBuilder::render("lighting")
//!         .sample_image(&shadow_map, PipelineStage::FRAGMENT_SHADER)
//!         .clear_color_attachment(&swapchain, ClearColor::Float([0.0, 0.0, 0.0, 1.0]))?
//!         .build())?;
//! let baked = graph.bake(&GraphSettings::default())?;
//! assert_eq!(baked.order(), vec!["shadow", "lighting"]);
//! # Ok(())
//! # }
//! ```
//!
//! For more complex passes, see the [`pass`] module documentation.
//!
//! # Baking
//!
//! [`PassGraph::bake()`] runs the following stages, each in its own module:
//! * [`dependency`]: derives read-after-write, write-after-write and write-after-read edges between passes, sorts them
//!   and assigns dependency levels.
//! * [`allocation`]: computes the lifetime of every resource and assigns physical resources, aliasing transient
//!   resources whose lifetimes do not overlap.
//! * [`barrier`]: tracks the state of every physical resource over the sorted passes and emits the barriers.
//! * [`physical_pass`]: merges consecutive render passes that share their attachments.
//! * [`submission`]: groups physical passes into submits and plans the semaphores between queues.
//!
//! # Recording
//!
//! A [`BakedGraph`] is executed through a [`RenderGraph`](crate::RenderGraph), which owns the physical resources and
//! records every frame:
//! ```ignore
//! use deimos::prelude::*;
//!
//! let mut render_graph = RenderGraph::new(device.clone(), exec.clone(), baked, &mut allocator)?;
//! let mut bindings = PhysicalResourceBindings::new();
//! bindings.bind_image("swapchain", swapchain_view.clone());
//! render_graph.execute(&bindings, &FrameSync::new())?;
//! ```

pub mod allocation;
pub mod barrier;
pub mod dependency;
pub mod pass;
pub mod pass_graph;
pub mod physical_pass;
pub mod physical_resource;
pub mod record;
pub mod resource;
pub mod resource_info;
pub mod submission;
pub mod virtual_resource;

pub use pass_graph::{BakedGraph, GraphViz, PassGraph};
pub use physical_resource::PhysicalResourceBindings;
pub use virtual_resource::VirtualResource;
