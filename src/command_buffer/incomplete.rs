use anyhow::Result;
use ash::vk;

use crate::{Device, ImageView, PipelineStage, QueueType};
use crate::command_buffer::{CommandBuffer, IncompleteCommandBuffer};
use crate::command_buffer::state::{RenderingAttachmentInfo, RenderingInfo};

impl IncompleteCommandBuffer {
    pub(crate) fn new(
        device: Device,
        handle: vk::CommandBuffer,
        queue: QueueType,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<Self> {
        unsafe {
            let begin_info = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                p_next: std::ptr::null(),
                flags,
                p_inheritance_info: std::ptr::null(),
            };
            device.begin_command_buffer(handle, &begin_info)?;
        };
        Ok(IncompleteCommandBuffer {
            device,
            handle,
            queue,
            current_pipeline_layout: vk::PipelineLayout::null(),
            current_bindpoint: vk::PipelineBindPoint::default(),
            current_render_area: Default::default(),
        })
    }

    /// Finish recording a command buffer and move its contents into a finished
    /// command buffer that can be submitted
    pub fn finish(self) -> Result<CommandBuffer> {
        unsafe { self.device.end_command_buffer(self.handle)? }
        Ok(CommandBuffer {
            handle: self.handle,
            queue: self.queue,
        })
    }

    /// Transitions an image layout.
    /// Generally you will not need to call this function manually,
    /// using the render graph api you can do most transitions automatically.
    pub fn transition_image(
        self,
        image: &ImageView,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
        src_access: vk::AccessFlags2,
        dst_access: vk::AccessFlags2,
    ) -> Self {
        let barrier = vk::ImageMemoryBarrier2 {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
            p_next: std::ptr::null(),
            src_stage_mask: src_stage,
            src_access_mask: src_access,
            dst_stage_mask: dst_stage,
            dst_access_mask: dst_access,
            old_layout: from,
            new_layout: to,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: unsafe { image.image() },
            subresource_range: image.subresource_range(),
        };
        self.image_barriers(std::slice::from_ref(&barrier))
    }

    /// Record a list of image barriers in a single `vkCmdPipelineBarrier2` call. Does nothing if the list is empty.
    pub fn image_barriers(self, barriers: &[vk::ImageMemoryBarrier2]) -> Self {
        self.barriers(&[], &[], barriers)
    }

    /// Record global, buffer and image barriers in a single `vkCmdPipelineBarrier2` call.
    /// Does nothing if all lists are empty.
    pub fn barriers(
        self,
        memory: &[vk::MemoryBarrier2],
        buffers: &[vk::BufferMemoryBarrier2],
        images: &[vk::ImageMemoryBarrier2],
    ) -> Self {
        if memory.is_empty() && buffers.is_empty() && images.is_empty() {
            return self;
        }
        let dependency = vk::DependencyInfo {
            s_type: vk::StructureType::DEPENDENCY_INFO,
            p_next: std::ptr::null(),
            dependency_flags: vk::DependencyFlags::BY_REGION,
            memory_barrier_count: memory.len() as u32,
            p_memory_barriers: memory.as_ptr(),
            buffer_memory_barrier_count: buffers.len() as u32,
            p_buffer_memory_barriers: buffers.as_ptr(),
            image_memory_barrier_count: images.len() as u32,
            p_image_memory_barriers: images.as_ptr(),
        };
        self.pipeline_barrier_2(&dependency)
    }

    /// vkCmdPipelineBarrier2. Prefer using this over regular pipeline barriers if possible, to make
    /// full use of `VK_KHR_SYNCHRONIZATION_2`.
    pub fn pipeline_barrier_2(self, dependency: &vk::DependencyInfo) -> Self {
        unsafe {
            self.device.cmd_pipeline_barrier2(self.handle, dependency);
        }
        self
    }

    /// Upload push constants to the layout of the currently bound pipeline.
    /// Direct translation of [`vkCmdPushConstants`](https://registry.khronos.org/vulkan/specs/1.3-extensions/man/html/vkCmdPushConstants.html).
    pub fn push_constants<T: Copy>(self, stage: vk::ShaderStageFlags, offset: u32, data: &[T]) -> Self {
        unsafe {
            let (_, data, _) = data.align_to::<u8>();
            self.device
                .cmd_push_constants(self.handle, self.current_pipeline_layout, stage, offset, data);
        }
        self
    }

    pub(crate) fn begin_rendering(mut self, info: &RenderingInfo) -> Self {
        let map_attachment = |attachment: &RenderingAttachmentInfo| vk::RenderingAttachmentInfo {
            s_type: vk::StructureType::RENDERING_ATTACHMENT_INFO,
            p_next: std::ptr::null(),
            image_view: unsafe { attachment.image_view.handle() },
            image_layout: attachment.image_layout,
            resolve_mode: vk::ResolveModeFlags::NONE,
            resolve_image_view: vk::ImageView::null(),
            resolve_image_layout: vk::ImageLayout::UNDEFINED,
            load_op: attachment.load_op,
            store_op: attachment.store_op,
            clear_value: attachment.clear_value,
        };

        let color_attachments = info.color_attachments.iter().map(map_attachment).collect::<Vec<_>>();
        let depth_attachment = info.depth_attachment.as_ref().map(map_attachment);
        let stencil_attachment = info.stencil_attachment.as_ref().map(map_attachment);
        let vk_info = vk::RenderingInfo {
            s_type: vk::StructureType::RENDERING_INFO,
            p_next: std::ptr::null(),
            flags: vk::RenderingFlags::empty(),
            render_area: info.render_area,
            layer_count: info.layer_count,
            view_mask: 0,
            color_attachment_count: color_attachments.len() as u32,
            p_color_attachments: color_attachments.as_ptr(),
            p_depth_attachment: match &depth_attachment {
                Some(attachment) => attachment,
                None => std::ptr::null(),
            },
            p_stencil_attachment: match &stencil_attachment {
                Some(attachment) => attachment,
                None => std::ptr::null(),
            },
        };

        unsafe {
            self.device.cmd_begin_rendering(self.handle, &vk_info);
        }
        self.current_render_area = info.render_area;

        self
    }

    pub(crate) fn end_rendering(mut self) -> Self {
        unsafe {
            self.device.cmd_end_rendering(self.handle);
        }
        self.current_render_area = vk::Rect2D::default();

        self
    }

    /// Clear regions of the attachments of the current render pass. Used for clears of attachments that are
    /// already bound when a pass starts inside a merged render pass.
    pub fn clear_attachments(self, attachments: &[vk::ClearAttachment], rects: &[vk::ClearRect]) -> Self {
        if attachments.is_empty() {
            return self;
        }
        unsafe {
            self.device.cmd_clear_attachments(self.handle, attachments, rects);
        }
        self
    }

    /// Render area of the render pass currently being recorded. Empty outside of a render pass.
    pub fn render_area(&self) -> vk::Rect2D {
        self.current_render_area
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue
    }

    /// Get unsafe access to the underlying command buffer
    /// # Safety
    /// The caller must not end or reset this command buffer.
    pub unsafe fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }
}
