use std::str::FromStr;

use ash::vk;

use crate::{Error, PipelineStage};
use crate::graph::virtual_resource::VirtualResource;

/// Type of a resource in the pass graph.
#[derive(Debug, Default, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceType {
    /// Image resource
    #[default]
    Image,
    /// Buffer resource
    Buffer,
}

/// Kind of render pass attachment.
#[derive(Debug, Default, Copy, Clone, Hash, PartialEq, Eq)]
pub enum AttachmentType {
    #[default]
    Color,
    Depth,
}

impl FromStr for AttachmentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ColorAttachment" | "color" => Ok(AttachmentType::Color),
            "DepthStencilAttachment" | "depth" => Ok(AttachmentType::Depth),
            _ => Err(Error::UnknownToken {
                kind: "attachment",
                token: s.to_owned(),
            }),
        }
    }
}

/// How a resource is used by a pass.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum ResourceUsage {
    /// Render pass attachment.
    Attachment(AttachmentType),
    /// Sampled image.
    Sampled,
    /// Storage image or storage buffer, read only.
    StorageRead,
    /// Storage image or storage buffer, written.
    StorageWrite,
    UniformBuffer,
    VertexBuffer,
    IndexBuffer,
    IndirectBuffer,
    /// Source of a copy or blit.
    TransferSrc,
    /// Destination of a copy, blit or clear.
    TransferDst,
}

impl ResourceUsage {
    /// Image usage flags a physical image needs to support this usage.
    pub fn image_usage(&self) -> vk::ImageUsageFlags {
        match self {
            ResourceUsage::Attachment(AttachmentType::Color) => vk::ImageUsageFlags::COLOR_ATTACHMENT,
            ResourceUsage::Attachment(AttachmentType::Depth) => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ResourceUsage::Sampled => vk::ImageUsageFlags::SAMPLED,
            ResourceUsage::StorageRead | ResourceUsage::StorageWrite => vk::ImageUsageFlags::STORAGE,
            ResourceUsage::TransferSrc => vk::ImageUsageFlags::TRANSFER_SRC,
            ResourceUsage::TransferDst => vk::ImageUsageFlags::TRANSFER_DST,
            _ => vk::ImageUsageFlags::empty(),
        }
    }

    /// Buffer usage flags a physical buffer needs to support this usage.
    pub fn buffer_usage(&self) -> vk::BufferUsageFlags {
        match self {
            ResourceUsage::StorageRead | ResourceUsage::StorageWrite => vk::BufferUsageFlags::STORAGE_BUFFER,
            ResourceUsage::UniformBuffer => vk::BufferUsageFlags::UNIFORM_BUFFER,
            ResourceUsage::VertexBuffer => vk::BufferUsageFlags::VERTEX_BUFFER,
            ResourceUsage::IndexBuffer => vk::BufferUsageFlags::INDEX_BUFFER,
            ResourceUsage::IndirectBuffer => vk::BufferUsageFlags::INDIRECT_BUFFER,
            ResourceUsage::TransferSrc => vk::BufferUsageFlags::TRANSFER_SRC,
            ResourceUsage::TransferDst => vk::BufferUsageFlags::TRANSFER_DST,
            _ => vk::BufferUsageFlags::empty(),
        }
    }

    /// The resource type this usage applies to, or `None` if it applies to both.
    pub fn required_type(&self) -> Option<ResourceType> {
        match self {
            ResourceUsage::Attachment(_) | ResourceUsage::Sampled => Some(ResourceType::Image),
            ResourceUsage::UniformBuffer
            | ResourceUsage::VertexBuffer
            | ResourceUsage::IndexBuffer
            | ResourceUsage::IndirectBuffer => Some(ResourceType::Buffer),
            _ => None,
        }
    }

    pub fn is_attachment(&self) -> bool {
        matches!(self, ResourceUsage::Attachment(_))
    }
}

/// Whether a write replaces the previous contents of a resource, or builds on them.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum WriteMode {
    /// Previous contents are discarded (clears, full writes).
    Overwrite,
    /// Previous contents are read before being modified (loads, in-place updates).
    ReadModifyWrite,
}

/// One access of a pass to a resource: the stage, access mask and image layout it requires.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct PassResource {
    pub(crate) usage: ResourceUsage,
    pub(crate) resource: VirtualResource,
    pub(crate) stage: PipelineStage,
    pub(crate) access: vk::AccessFlags2,
    pub(crate) layout: vk::ImageLayout,
    #[derivative(Debug = "ignore")]
    pub(crate) clear_value: Option<vk::ClearValue>,
    pub(crate) load_op: Option<vk::AttachmentLoadOp>,
}

impl PassResource {
    pub(crate) fn new(
        usage: ResourceUsage,
        resource: &VirtualResource,
        stage: PipelineStage,
        access: vk::AccessFlags2,
        layout: vk::ImageLayout,
    ) -> Self {
        Self {
            usage,
            resource: resource.clone(),
            stage,
            access,
            // Buffers have no layout
            layout: if resource.is_image() {
                layout
            } else {
                vk::ImageLayout::UNDEFINED
            },
            clear_value: None,
            load_op: None,
        }
    }

    /// Get the virtual resource associated with this pass resource
    pub fn virtual_resource(&self) -> &VirtualResource {
        &self.resource
    }

    pub fn usage(&self) -> ResourceUsage {
        self.usage
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn access(&self) -> vk::AccessFlags2 {
        self.access
    }

    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    pub fn load_op(&self) -> Option<vk::AttachmentLoadOp> {
        self.load_op
    }

    pub fn clear_value(&self) -> Option<vk::ClearValue> {
        self.clear_value
    }
}

/// Access bits that write memory.
pub(crate) const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::SHADER_WRITE.as_raw()
        | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
        | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
        | vk::AccessFlags2::HOST_WRITE.as_raw()
        | vk::AccessFlags2::MEMORY_WRITE.as_raw(),
);

pub(crate) fn is_write(access: vk::AccessFlags2) -> bool {
    access.intersects(WRITE_ACCESS)
}
