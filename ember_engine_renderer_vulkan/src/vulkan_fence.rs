/// Fence - Vulkan timeline semaphore

use ash::vk;
use ember_engine::ember::graphics_device::Fence as GraphicsFence;
use ember_engine::ember::Result;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Timeline semaphore exposing a monotonically increasing completion value
pub struct Fence {
    pub(crate) semaphore: vk::Semaphore,
    context: Arc<GpuContext>,
}

impl Fence {
    /// Create a timeline semaphore starting at `initial_value`
    pub(crate) fn new(context: Arc<GpuContext>, initial_value: u64) -> Result<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe { context.device.create_semaphore(&create_info, None) }
            .map_err(|e| context.vk_error("vkCreateSemaphore", e))?;

        Ok(Self { semaphore, context })
    }

    /// Underlying Vulkan semaphore
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl GraphicsFence for Fence {
    fn completed_value(&self) -> Result<u64> {
        unsafe { self.context.device.get_semaphore_counter_value(self.semaphore) }
            .map_err(|e| self.context.vk_error("vkGetSemaphoreCounterValue", e))
    }

    fn wait_for_value(&self, value: u64) -> Result<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);

        unsafe { self.context.device.wait_semaphores(&wait_info, u64::MAX) }
            .map_err(|e| self.context.vk_error("vkWaitSemaphores", e))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.context.device.destroy_semaphore(self.semaphore, None);
        }
    }
}
