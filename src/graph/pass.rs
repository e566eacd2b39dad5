//! This module mainly exposes the [`PassBuilder`] struct, used for correctly defining passes in a
//! [`PassGraph`](crate::PassGraph).
//!
//! For documentation on how to use the pass graph, refer to the [`graph`](crate::graph) module level documentation.
//! Each pass targets one queue, declares the resources it reads and writes, and can optionally
//! specify a closure to be executed when the pass is recorded to a command buffer.
//!
//! A write declared together with a read of the same resource is a read-modify-write: the pass builds on the
//! previous contents. Attachments loaded with [`vk::AttachmentLoadOp::LOAD`] are declared this way, cleared
//! attachments are plain writes.
//!
//! # Example
//!
//! Two passes: one that renders to an offscreen texture, and one that samples from this texture to
//! render it to the swapchain.
//! ```
//! use deimos::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let offscreen = VirtualResource::image("offscreen");
//! let swapchain = VirtualResource::image("swapchain");
//!
//! let offscreen_pass = PassBuilder::render("offscreen")
//!     .clear_color_attachment(&offscreen, ClearColor::Float([1.0, 0.0, 0.0, 1.0]))?
//!     .build();
//!
//! let sample_pass = PassBuilder::render("sample")
//!     .clear_color_attachment(&swapchain, ClearColor::Float([0.0, 0.0, 0.0, 1.0]))?
//!     .sample_image(&offscreen, PipelineStage::FRAGMENT_SHADER)
//!     .execute_fn(|cmd, _bindings| {
//!         // Bind a pipeline and draw a fullscreen triangle sampling `offscreen`.
//!         Ok(cmd.full_viewport_scissor().draw(3, 1, 0, 0))
//!     })
//!     .build();
//! # Ok(())
//! # }
//! ```
//!
//! Binding physical resources and recording is covered under the [`graph`](crate::graph) module documentation.

use anyhow::Result;
use ash::vk;

use crate::{Error, PhysicalResourceBindings, QueueType, VirtualResource};
use crate::command_buffer::IncompleteCommandBuffer;
use crate::graph::resource::{AttachmentType, PassResource, ResourceUsage, WriteMode};
use crate::pipeline::PipelineStage;

/// The returned value from a pass callback function.
pub type PassFnResult = Result<IncompleteCommandBuffer>;

/// Defines a pass executor that can be called when the pass is recorded.
/// Executors of independent passes may be called from different worker threads, so they must be [`Send`].
pub trait PassExecutor: Send {
    /// Record this pass to a command buffer.
    fn execute(&mut self, cmd: IncompleteCommandBuffer, bindings: &PhysicalResourceBindings) -> PassFnResult;
}

impl<F> PassExecutor for F
where
    F: FnMut(IncompleteCommandBuffer, &PhysicalResourceBindings) -> PassFnResult + Send,
{
    /// Record this pass to a command buffer by calling the given function.
    fn execute(&mut self, cmd: IncompleteCommandBuffer, bindings: &PhysicalResourceBindings) -> PassFnResult {
        self(cmd, bindings)
    }
}

pub(crate) type BoxedPassFn<'cb> = Box<dyn PassExecutor + 'cb>;

/// An empty pass executor that does nothing
#[derive(Default)]
pub struct EmptyPassExecutor;

impl EmptyPassExecutor {
    /// Creates an empty pass executor
    pub fn new() -> Self {
        Self {}
    }

    /// Create a new empty pass executor in a [`Box`]
    pub fn new_boxed() -> Box<Self> {
        Box::new(Self::new())
    }
}

impl PassExecutor for EmptyPassExecutor {
    /// Execute the empty pass executor by just returning the command buffer.
    fn execute(&mut self, cmd: IncompleteCommandBuffer, _bindings: &PhysicalResourceBindings) -> PassFnResult {
        Ok(cmd)
    }
}

/// Represents one pass in a GPU task graph. You can obtain one using a [`PassBuilder`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Pass<'cb> {
    pub(crate) name: String,
    pub(crate) queue: QueueType,
    pub(crate) color: Option<[f32; 4]>,
    pub(crate) reads: Vec<PassResource>,
    pub(crate) writes: Vec<PassResource>,
    #[derivative(Debug = "ignore")]
    pub(crate) execute: BoxedPassFn<'cb>,
    pub(crate) is_renderpass: bool,
}

/// Clear value for a color attachment.
#[derive(Copy, Clone, Debug)]
pub enum ClearColor {
    Float([f32; 4]),
    Int([i32; 4]),
    Uint([u32; 4]),
}

/// Clear value for a depth-stencil attachment.
#[derive(Copy, Clone, Default, Debug)]
pub struct ClearDepthStencil {
    pub depth: f32,
    pub stencil: u32,
}

impl From<ClearColor> for vk::ClearColorValue {
    fn from(value: ClearColor) -> Self {
        match value {
            ClearColor::Float(values) => vk::ClearColorValue {
                float32: values,
            },
            ClearColor::Int(values) => vk::ClearColorValue {
                int32: values,
            },
            ClearColor::Uint(values) => vk::ClearColorValue {
                uint32: values,
            },
        }
    }
}

impl From<ClearDepthStencil> for vk::ClearDepthStencilValue {
    fn from(value: ClearDepthStencil) -> Self {
        vk::ClearDepthStencilValue {
            depth: value.depth,
            stencil: value.stencil,
        }
    }
}

impl<'cb> Pass<'cb> {
    /// Get the pass name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue this pass executes on.
    pub fn queue(&self) -> QueueType {
        self.queue
    }

    /// Debug color of this pass, if any.
    pub fn color(&self) -> Option<[f32; 4]> {
        self.color
    }

    /// Whether this pass renders to attachments.
    pub fn is_renderpass(&self) -> bool {
        self.is_renderpass
    }

    /// All read accesses of this pass.
    pub fn reads(&self) -> &[PassResource] {
        &self.reads
    }

    /// All write accesses of this pass.
    pub fn writes(&self) -> &[PassResource] {
        &self.writes
    }

    /// Whether this pass reads the resource, excluding reads that are part of a read-modify-write.
    pub fn is_pure_read(&self, resource: &str) -> bool {
        self.reads.iter().any(|r| r.resource.name() == resource) && !self.is_writer(resource)
    }

    /// Whether this pass reads the resource, including read-modify-writes.
    pub fn is_reader(&self, resource: &str) -> bool {
        self.reads.iter().any(|r| r.resource.name() == resource)
    }

    /// Whether this pass writes the resource.
    pub fn is_writer(&self, resource: &str) -> bool {
        self.writes.iter().any(|w| w.resource.name() == resource)
    }

    /// How this pass writes the resource, or `None` if it does not write it.
    pub fn write_mode(&self, resource: &str) -> Option<WriteMode> {
        if !self.is_writer(resource) {
            None
        } else if self.is_reader(resource) {
            Some(WriteMode::ReadModifyWrite)
        } else {
            Some(WriteMode::Overwrite)
        }
    }

    /// Names of every resource this pass touches, in declaration order and without duplicates.
    pub fn resources(&self) -> Vec<&VirtualResource> {
        let mut resources: Vec<&VirtualResource> = Vec::new();
        for access in self.reads.iter().chain(self.writes.iter()) {
            if !resources.iter().any(|r| r.name() == access.resource.name()) {
                resources.push(&access.resource);
            }
        }
        resources
    }

    /// Attachment writes of this pass, color attachments first.
    pub(crate) fn attachments(&self) -> impl Iterator<Item = &PassResource> {
        self.writes.iter().filter(|w| w.usage.is_attachment())
    }
}

/// Used to create [`Pass`] objects correctly.
/// # Example
/// See the [`pass`](crate::graph::pass) module level documentation.
pub struct PassBuilder<'cb> {
    inner: Pass<'cb>,
}

impl<'cb> PassBuilder<'cb> {
    /// Create a new pass for generic commands on the given queue. Does not support commands that are located inside a renderpass.
    pub fn new(name: impl Into<String>, queue: QueueType) -> Self {
        PassBuilder {
            inner: Pass {
                name: name.into(),
                queue,
                color: None,
                execute: EmptyPassExecutor::new_boxed(),
                reads: vec![],
                writes: vec![],
                is_renderpass: false,
            },
        }
    }

    /// Create a new renderpass on the graphics queue. This constructor is required for passes that render to any attachments.
    pub fn render(name: impl Into<String>) -> Self {
        let mut builder = Self::new(name, QueueType::Graphics);
        builder.inner.is_renderpass = true;
        builder
    }

    /// Create a compute-only pass on the compute queue.
    pub fn compute(name: impl Into<String>) -> Self {
        Self::new(name, QueueType::Compute)
    }

    /// Create a pass on the transfer queue.
    pub fn transfer(name: impl Into<String>) -> Self {
        Self::new(name, QueueType::Transfer)
    }

    /// Set the color of this pass. This can show up in graphics debuggers like RenderDoc.
    pub fn color(mut self, color: [f32; 4]) -> Self {
        self.inner.color = Some(color);
        self
    }

    fn read(mut self, access: PassResource) -> Self {
        self.inner.reads.push(access);
        self
    }

    fn write(mut self, access: PassResource) -> Self {
        self.inner.writes.push(access);
        self
    }

    fn attachment(
        self,
        ty: AttachmentType,
        resource: &VirtualResource,
        op: vk::AttachmentLoadOp,
        clear: Option<vk::ClearValue>,
    ) -> Result<Self> {
        if !self.inner.is_renderpass {
            return Err(Error::InvalidPass("Cannot add an attachment to a pass that is not a renderpass").into());
        }
        if op == vk::AttachmentLoadOp::CLEAR && clear.is_none() {
            return Err(anyhow::Error::from(Error::NoClearValue));
        }

        let usage = ResourceUsage::Attachment(ty);
        // Load and clear operations happen in the same stages as the attachment writes.
        // https://registry.khronos.org/vulkan/specs/1.3-extensions/man/html/VkPipelineStageFlagBits2.html
        let (stage, read_access, write_access, layout) = match ty {
            AttachmentType::Color => (
                PipelineStage::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::COLOR_ATTACHMENT_READ,
                vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ),
            AttachmentType::Depth => (
                PipelineStage::EARLY_FRAGMENT_TESTS | PipelineStage::LATE_FRAGMENT_TESTS,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            ),
        };

        let builder = if op == vk::AttachmentLoadOp::LOAD {
            self.read(PassResource::new(usage, resource, stage, read_access, layout))
        } else {
            self
        };

        let mut output = PassResource::new(usage, resource, stage, write_access, layout);
        output.clear_value = clear;
        output.load_op = Some(op);
        Ok(builder.write(output))
    }

    /// Adds a color attachment to this pass. If [`vk::AttachmentLoadOp::CLEAR`] was specified, `clear` must not be None.
    /// # Errors
    /// * Fails if this pass was not created using [`PassBuilder::render()`]
    /// * Fails if `op` was [`vk::AttachmentLoadOp::CLEAR`], but `clear` was [`None`].
    pub fn color_attachment(
        self,
        resource: &VirtualResource,
        op: vk::AttachmentLoadOp,
        clear: Option<vk::ClearColorValue>,
    ) -> Result<Self> {
        let clear = clear.map(|color| vk::ClearValue {
            color,
        });
        self.attachment(AttachmentType::Color, resource, op, clear)
    }

    /// Clear a color attachment with the specified clear color
    /// # Errors
    /// * Fails if this pass was not created using [`PassBuilder::render()`]
    pub fn clear_color_attachment(self, resource: &VirtualResource, color: ClearColor) -> Result<Self> {
        self.color_attachment(resource, vk::AttachmentLoadOp::CLEAR, Some(color.into()))
    }

    /// Load a color attachment. The pass builds on its previous contents.
    /// # Errors
    /// * Fails if this pass was not created using [`PassBuilder::render()`]
    pub fn load_color_attachment(self, resource: &VirtualResource) -> Result<Self> {
        self.color_attachment(resource, vk::AttachmentLoadOp::LOAD, None)
    }

    /// Adds a depth attachment to this pass. If [`vk::AttachmentLoadOp::CLEAR`] was specified, `clear` must not be None.
    /// # Errors
    /// * Fails if this pass was not created using [`PassBuilder::render()`]
    /// * Fails if `op` was [`vk::AttachmentLoadOp::CLEAR`], but `clear` was [`None`].
    pub fn depth_attachment(
        self,
        resource: &VirtualResource,
        op: vk::AttachmentLoadOp,
        clear: Option<vk::ClearDepthStencilValue>,
    ) -> Result<Self> {
        let clear = clear.map(|depth_stencil| vk::ClearValue {
            depth_stencil,
        });
        self.attachment(AttachmentType::Depth, resource, op, clear)
    }

    /// Clear the depth attachment with the specified clear values
    /// # Errors
    /// * Fails if this pass was not created using [`PassBuilder::render()`]
    pub fn clear_depth_attachment(self, resource: &VirtualResource, clear: ClearDepthStencil) -> Result<Self> {
        self.depth_attachment(resource, vk::AttachmentLoadOp::CLEAR, Some(clear.into()))
    }

    /// Load a depth attachment
    /// # Errors
    /// * Fails if this pass was not created using [`PassBuilder::render()`]
    pub fn load_depth_attachment(self, resource: &VirtualResource) -> Result<Self> {
        self.depth_attachment(resource, vk::AttachmentLoadOp::LOAD, None)
    }

    /// Declare that a resource will be used as a sampled image in the given pipeline stages.
    pub fn sample_image(self, resource: &VirtualResource, stage: PipelineStage) -> Self {
        self.read(PassResource::new(
            ResourceUsage::Sampled,
            resource,
            stage,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ))
    }

    /// Declare that a resource will be used as a storage image that will be read from in the given pipeline stages.
    pub fn read_storage_image(self, resource: &VirtualResource, stage: PipelineStage) -> Self {
        self.read(PassResource::new(
            ResourceUsage::StorageRead,
            resource,
            stage,
            vk::AccessFlags2::SHADER_STORAGE_READ,
            vk::ImageLayout::GENERAL,
        ))
    }

    /// Declare that a resource will be used as a storage image that is fully overwritten in the given pipeline stages.
    pub fn write_storage_image(self, resource: &VirtualResource, stage: PipelineStage) -> Self {
        self.write(PassResource::new(
            ResourceUsage::StorageWrite,
            resource,
            stage,
            vk::AccessFlags2::SHADER_STORAGE_WRITE,
            vk::ImageLayout::GENERAL,
        ))
    }

    /// Declare that a storage image is updated in place in the given pipeline stages.
    pub fn read_write_storage_image(self, resource: &VirtualResource, stage: PipelineStage) -> Self {
        self.read_storage_image(resource, stage)
            .write_storage_image(resource, stage)
    }

    /// Declare that a storage buffer will be read from in the given pipeline stages.
    pub fn read_storage_buffer(self, resource: &VirtualResource, stage: PipelineStage) -> Self {
        self.read(PassResource::new(
            ResourceUsage::StorageRead,
            resource,
            stage,
            vk::AccessFlags2::SHADER_STORAGE_READ,
            vk::ImageLayout::UNDEFINED,
        ))
    }

    /// Declare that a storage buffer is fully overwritten in the given pipeline stages.
    pub fn write_storage_buffer(self, resource: &VirtualResource, stage: PipelineStage) -> Self {
        self.write(PassResource::new(
            ResourceUsage::StorageWrite,
            resource,
            stage,
            vk::AccessFlags2::SHADER_STORAGE_WRITE,
            vk::ImageLayout::UNDEFINED,
        ))
    }

    /// Declare that a storage buffer is updated in place in the given pipeline stages.
    pub fn read_write_storage_buffer(self, resource: &VirtualResource, stage: PipelineStage) -> Self {
        self.read_storage_buffer(resource, stage)
            .write_storage_buffer(resource, stage)
    }

    /// Declare that a buffer is read as a uniform buffer in the given pipeline stages.
    pub fn uniform_buffer(self, resource: &VirtualResource, stage: PipelineStage) -> Self {
        self.read(PassResource::new(
            ResourceUsage::UniformBuffer,
            resource,
            stage,
            vk::AccessFlags2::UNIFORM_READ,
            vk::ImageLayout::UNDEFINED,
        ))
    }

    /// Declare that a buffer is bound as vertex buffer.
    pub fn vertex_buffer(self, resource: &VirtualResource) -> Self {
        self.read(PassResource::new(
            ResourceUsage::VertexBuffer,
            resource,
            PipelineStage::VERTEX_ATTRIBUTE_INPUT,
            vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
            vk::ImageLayout::UNDEFINED,
        ))
    }

    /// Declare that a buffer is bound as index buffer.
    pub fn index_buffer(self, resource: &VirtualResource) -> Self {
        self.read(PassResource::new(
            ResourceUsage::IndexBuffer,
            resource,
            PipelineStage::INDEX_INPUT,
            vk::AccessFlags2::INDEX_READ,
            vk::ImageLayout::UNDEFINED,
        ))
    }

    /// Declare that a buffer holds indirect draw or dispatch parameters.
    pub fn indirect_buffer(self, resource: &VirtualResource) -> Self {
        self.read(PassResource::new(
            ResourceUsage::IndirectBuffer,
            resource,
            PipelineStage::DRAW_INDIRECT,
            vk::AccessFlags2::INDIRECT_COMMAND_READ,
            vk::ImageLayout::UNDEFINED,
        ))
    }

    /// Declare that a resource is the source of a copy or blit.
    pub fn copy_src(self, resource: &VirtualResource) -> Self {
        self.read(PassResource::new(
            ResourceUsage::TransferSrc,
            resource,
            PipelineStage::TRANSFER,
            vk::AccessFlags2::TRANSFER_READ,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ))
    }

    /// Declare that a resource is fully overwritten by a copy, blit or clear.
    pub fn copy_dst(self, resource: &VirtualResource) -> Self {
        self.write(PassResource::new(
            ResourceUsage::TransferDst,
            resource,
            PipelineStage::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ))
    }

    /// Set the executor to be called when recording this pass.
    pub fn executor(mut self, exec: impl PassExecutor + 'cb) -> Self {
        self.inner.execute = Box::new(exec);
        self
    }

    /// Set the executor to be called when recording this pass. This method can be used to deduce types
    /// when a closure is used as a pass executor.
    pub fn execute_fn<F>(mut self, exec: F) -> Self
    where
        F: FnMut(IncompleteCommandBuffer, &PhysicalResourceBindings) -> PassFnResult + Send + 'cb, {
        self.inner.execute = Box::new(exec);
        self
    }

    /// Obtain a built [`Pass`] object.
    pub fn build(self) -> Pass<'cb> {
        self.inner
    }
}
