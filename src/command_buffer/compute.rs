use ash::vk;

use crate::command_buffer::IncompleteCommandBuffer;

impl IncompleteCommandBuffer {
    /// Bind a compute pipeline. The layout is remembered for [`push_constants()`](IncompleteCommandBuffer::push_constants).
    pub fn bind_compute_pipeline(mut self, pipeline: vk::Pipeline, layout: vk::PipelineLayout) -> Self {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.handle, vk::PipelineBindPoint::COMPUTE, pipeline);
        }
        self.current_bindpoint = vk::PipelineBindPoint::COMPUTE;
        self.current_pipeline_layout = layout;
        self
    }

    pub fn dispatch(self, x: u32, y: u32, z: u32) -> Self {
        unsafe {
            self.device.cmd_dispatch(self.handle, x, y, z);
        }
        self
    }
}
