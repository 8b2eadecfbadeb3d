/// Queue - Vulkan command-submission queue

use ash::vk;
use ember_engine::ember::graphics_device::{CommandList as _, CommandQueue};
use ember_engine::ember::{Error, Result};
use std::sync::Arc;

use crate::vulkan::VulkanGraphicsDevice;
use crate::vulkan_command_list::CommandList;
use crate::vulkan_context::GpuContext;
use crate::vulkan_fence::Fence;

/// The device's single graphics + present queue
pub struct Queue {
    context: Arc<GpuContext>,
}

impl Queue {
    pub(crate) fn new(context: Arc<GpuContext>) -> Self {
        Self { context }
    }
}

impl CommandQueue<VulkanGraphicsDevice> for Queue {
    fn execute(&self, lists: &[&CommandList]) -> Result<()> {
        let mut buffer_infos = Vec::with_capacity(lists.len());
        for list in lists {
            if list.is_recording() {
                return Err(Error::InvalidState("cannot execute a command list that is still recording".to_string()));
            }
            buffer_infos.push(vk::CommandBufferSubmitInfo::default().command_buffer(list.command_buffer()));
        }

        let submit = vk::SubmitInfo2::default().command_buffer_infos(&buffer_infos);

        let queue = self.context.lock_queue()?;
        unsafe { self.context.device.queue_submit2(*queue, &[submit], vk::Fence::null()) }
            .map_err(|e| self.context.vk_error("vkQueueSubmit2", e))
    }

    fn signal(&self, fence: &Fence, value: u64) -> Result<()> {
        let signal_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(fence.semaphore)
            .value(value)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];

        let submit = vk::SubmitInfo2::default().signal_semaphore_infos(&signal_infos);

        let queue = self.context.lock_queue()?;
        unsafe { self.context.device.queue_submit2(*queue, &[submit], vk::Fence::null()) }
            .map_err(|e| self.context.vk_error("vkQueueSubmit2 (signal)", e))
    }
}
