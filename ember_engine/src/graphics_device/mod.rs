/// Graphics device module - capability traits consumed by the engine core

// Module declarations
pub mod graphics_device;
pub mod image;
pub mod command_list;
pub mod swapchain;
pub mod window;
pub mod descriptor_allocator;

// Re-export everything from graphics_device.rs
pub use graphics_device::*;

// Re-export from other modules
pub use image::*;
pub use command_list::*;
pub use swapchain::*;
pub use window::*;
pub use descriptor_allocator::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
