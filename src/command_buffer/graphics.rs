//! Commands that need a graphics capable queue.

use anyhow::Result;
use ash::vk;

use crate::{BufferView, Error, ImageView, PipelineStage, QueueType};
use crate::command_buffer::IncompleteCommandBuffer;

fn mip_extent(size: u32, level: u32) -> i32 {
    (size >> level).max(1) as i32
}

impl IncompleteCommandBuffer {
    /// Sets the viewport and scissor regions to the entire render area. Can only be called inside a renderpass.
    pub fn full_viewport_scissor(self) -> Self {
        let area = self.current_render_area;
        self.viewport(vk::Viewport {
            x: area.offset.x as f32,
            y: area.offset.y as f32,
            width: area.extent.width as f32,
            height: area.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        })
        .scissor(area)
    }

    pub fn viewport(self, viewport: vk::Viewport) -> Self {
        unsafe {
            self.device
                .cmd_set_viewport(self.handle, 0, std::slice::from_ref(&viewport));
        }
        self
    }

    pub fn scissor(self, scissor: vk::Rect2D) -> Self {
        unsafe {
            self.device
                .cmd_set_scissor(self.handle, 0, std::slice::from_ref(&scissor));
        }
        self
    }

    pub fn draw(self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Self {
        unsafe {
            self.device
                .cmd_draw(self.handle, vertex_count, instance_count, first_vertex, first_instance);
        }
        self
    }

    pub fn draw_indexed(
        self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Self {
        unsafe {
            self.device.cmd_draw_indexed(
                self.handle,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        }
        self
    }

    /// Bind a graphics pipeline. The layout is remembered for [`push_constants()`](IncompleteCommandBuffer::push_constants).
    pub fn bind_graphics_pipeline(mut self, pipeline: vk::Pipeline, layout: vk::PipelineLayout) -> Self {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.handle, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
        self.current_bindpoint = vk::PipelineBindPoint::GRAPHICS;
        self.current_pipeline_layout = layout;
        self
    }

    /// Bind descriptor sets to the bind point of the current pipeline.
    pub fn bind_descriptor_sets(self, first_set: u32, sets: &[vk::DescriptorSet]) -> Self {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.handle,
                self.current_bindpoint,
                self.current_pipeline_layout,
                first_set,
                sets,
                &[],
            );
        }
        self
    }

    pub fn bind_vertex_buffer(self, binding: u32, buffer: &BufferView) -> Self {
        unsafe {
            let handle = buffer.handle();
            let offset = buffer.offset();
            self.device.cmd_bind_vertex_buffers(
                self.handle,
                binding,
                std::slice::from_ref(&handle),
                std::slice::from_ref(&offset),
            )
        };
        self
    }

    pub fn bind_index_buffer(self, buffer: &BufferView, ty: vk::IndexType) -> Self {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.handle, buffer.handle(), buffer.offset(), ty);
        }
        self
    }

    /// Blit one image region to another. `src` must be in `TRANSFER_SRC_OPTIMAL` and `dst` in `TRANSFER_DST_OPTIMAL`.
    pub fn blit_image(
        self,
        src: &ImageView,
        dst: &ImageView,
        src_offsets: &[vk::Offset3D; 2],
        dst_offsets: &[vk::Offset3D; 2],
        filter: vk::Filter,
    ) -> Self {
        let blit = vk::ImageBlit {
            src_subresource: vk::ImageSubresourceLayers {
                aspect_mask: src.aspect(),
                mip_level: src.base_level(),
                base_array_layer: src.base_layer(),
                layer_count: src.layer_count(),
            },
            src_offsets: *src_offsets,
            dst_subresource: vk::ImageSubresourceLayers {
                aspect_mask: dst.aspect(),
                mip_level: dst.base_level(),
                base_array_layer: dst.base_layer(),
                layer_count: dst.layer_count(),
            },
            dst_offsets: *dst_offsets,
        };

        unsafe {
            self.device.cmd_blit_image(
                self.handle,
                src.image(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst.image(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&blit),
                filter,
            );
        }
        self
    }

    /// Fill mip levels `1..` of `image` by repeatedly blitting each level into the next one.
    ///
    /// Level 0 must have been written in `layout` by `src_stage` / `src_access`. Afterwards, every level of the
    /// image is in `TRANSFER_SRC_OPTIMAL` and the blits are visible to `PipelineStage::BLIT` writes.
    /// # Errors
    /// Fails if this command buffer was not allocated for the graphics queue.
    pub fn generate_mips(
        self,
        image: &ImageView,
        layout: vk::ImageLayout,
        src_stage: PipelineStage,
        src_access: vk::AccessFlags2,
    ) -> Result<Self> {
        if self.queue != QueueType::Graphics {
            return Err(Error::Uncategorized("Mip generation requires a graphics queue").into());
        }

        let range = image.subresource_range();
        let level = |level: u32, count: u32| vk::ImageSubresourceRange {
            base_mip_level: range.base_mip_level + level,
            level_count: count,
            ..range
        };
        let barrier = |range: vk::ImageSubresourceRange,
                       src_stage_mask: PipelineStage,
                       src_access_mask: vk::AccessFlags2,
                       old_layout: vk::ImageLayout,
                       new_layout: vk::ImageLayout,
                       dst_access_mask: vk::AccessFlags2| vk::ImageMemoryBarrier2 {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
            p_next: std::ptr::null(),
            src_stage_mask,
            src_access_mask,
            dst_stage_mask: PipelineStage::BLIT,
            dst_access_mask,
            old_layout,
            new_layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: unsafe { image.image() },
            subresource_range: range,
        };

        let levels = range.level_count;
        if levels <= 1 {
            return Ok(self);
        }

        let mut cmd = self.image_barriers(&[
            barrier(
                level(0, 1),
                src_stage,
                src_access,
                layout,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags2::TRANSFER_READ,
            ),
            barrier(
                level(1, levels - 1),
                PipelineStage::NONE,
                vk::AccessFlags2::NONE,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags2::TRANSFER_WRITE,
            ),
        ]);

        let size = image.size();
        for mip in 1..levels {
            let subresource = |mip: u32| vk::ImageSubresourceLayers {
                aspect_mask: range.aspect_mask,
                mip_level: range.base_mip_level + mip,
                base_array_layer: range.base_array_layer,
                layer_count: range.layer_count,
            };
            let extent = |mip: u32| vk::Offset3D {
                x: mip_extent(size.width, mip),
                y: mip_extent(size.height, mip),
                z: mip_extent(size.depth, mip),
            };
            let blit = vk::ImageBlit {
                src_subresource: subresource(mip - 1),
                src_offsets: [vk::Offset3D::default(), extent(mip - 1)],
                dst_subresource: subresource(mip),
                dst_offsets: [vk::Offset3D::default(), extent(mip)],
            };
            unsafe {
                cmd.device.cmd_blit_image(
                    cmd.handle,
                    image.image(),
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    image.image(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    std::slice::from_ref(&blit),
                    vk::Filter::LINEAR,
                );
            }
            cmd = cmd.image_barriers(&[barrier(
                level(mip, 1),
                PipelineStage::BLIT,
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags2::TRANSFER_READ,
            )]);
        }
        Ok(cmd)
    }
}
