/*!
# Ember Engine - Vulkan Backend

Vulkan 1.3 implementation of the Ember engine capability traits.

This crate implements `GraphicsDevice` and its associated objects using the
Ash library for Vulkan bindings and gpu-allocator for memory management:

- **VulkanGraphicsDevice**: instance, adapter, logical device and descriptor table
- **Queue**: the single graphics + present queue
- **Fence**: timeline semaphore
- **CommandAllocator / CommandList**: command pool and command buffer, dynamic rendering
- **Swapchain**: offscreen backbuffers blitted to the window surface on present

Validation layers and the debug messenger are compiled in with the
`vulkan-validation` feature only.
*/

// Vulkan implementation modules
mod vulkan;
mod vulkan_context;
mod vulkan_format;
mod vulkan_image;
mod vulkan_fence;
mod vulkan_queue;
mod vulkan_command_list;
mod vulkan_swapchain;
#[cfg(feature = "vulkan-validation")]
mod debug;

pub use vulkan::VulkanGraphicsDevice;

// Backend objects, named after the associated types they implement
pub mod ember {
    pub use crate::vulkan::VulkanGraphicsDevice;
    pub use crate::vulkan_command_list::{CommandAllocator, CommandList};
    pub use crate::vulkan_fence::Fence;
    pub use crate::vulkan_image::{Image, View};
    pub use crate::vulkan_queue::Queue;
    pub use crate::vulkan_swapchain::Swapchain;

    #[cfg(feature = "vulkan-validation")]
    pub use crate::debug::ValidationStats;
}
