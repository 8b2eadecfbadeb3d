/// Swapchain trait - for window presentation

use crate::error::Result;
use crate::graphics_device::{GraphicsDevice, ImageFormat};

/// Set of presentable backing buffers for one window
///
/// Backing buffer `i` is the color target of frame slot `i`.
pub trait Swapchain<D: GraphicsDevice> {
    /// Number of backing buffers
    fn buffer_count(&self) -> u32;

    /// Width of the backing buffers in pixels
    fn width(&self) -> u32;

    /// Height of the backing buffers in pixels
    fn height(&self) -> u32;

    /// Pixel format of the backing buffers
    fn format(&self) -> ImageFormat;

    /// Non-owning handle to backing buffer `index`
    ///
    /// The handle is invalidated by `resize_buffers` and must be dropped before it.
    fn backing_image(&self, index: u32) -> Result<D::Image>;

    /// Resize the backing buffers in place
    ///
    /// # Arguments
    ///
    /// * `buffer_count` - Number of backing buffers after the resize
    /// * `width` - New width in pixels
    /// * `height` - New height in pixels
    fn resize_buffers(&mut self, buffer_count: u32, width: u32, height: u32) -> Result<()>;

    /// Present backing buffer `index` with vertical sync
    fn present(&mut self, index: u32) -> Result<()>;
}
