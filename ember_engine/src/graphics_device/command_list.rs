/// CommandList and CommandAllocator traits - for recording GPU commands

use crate::error::Result;
use crate::graphics_device::{GraphicsDevice, ImageState};

/// Backing memory for the commands of one recording buffer
///
/// One allocator exists per frame in flight. It may only be reset once
/// the GPU has finished executing everything recorded from it.
pub trait CommandAllocator {
    /// Release all memory recorded from this allocator
    fn reset(&mut self) -> Result<()>;
}

/// Recording buffer for GPU commands
///
/// Created closed. `reset` opens it for recording against an allocator,
/// `close` finalizes it for submission. Every recording method fails when
/// the buffer is closed.
pub trait CommandList<D: GraphicsDevice> {
    /// Discard previous content and start recording from `allocator`
    fn reset(&mut self, allocator: &D::CommandAllocator) -> Result<()>;

    /// Stop recording; the buffer can now be submitted
    fn close(&mut self) -> Result<()>;

    /// Whether commands can currently be appended
    fn is_recording(&self) -> bool;

    /// Record one state-transition barrier for `image`
    ///
    /// # Arguments
    ///
    /// * `image` - Image whose state changes
    /// * `before` - State the image is currently in
    /// * `after` - State the image must be in for subsequent commands
    fn transition_barrier(&mut self, image: &D::Image, before: ImageState, after: ImageState) -> Result<()>;

    /// Set the viewport
    fn set_viewport(&mut self, viewport: &Viewport) -> Result<()>;

    /// Set the scissor rectangle
    fn set_scissor(&mut self, rect: &ScissorRect) -> Result<()>;

    /// Bind render-attachment views as the active render targets
    ///
    /// Opens a render scope that lasts until `close_render_scope`.
    ///
    /// # Arguments
    ///
    /// * `colors` - Color views, bound in slice order
    /// * `depth` - Optional depth/stencil view
    fn set_render_targets(&mut self, colors: &[&D::View], depth: Option<&D::View>) -> Result<()>;

    /// Clear a bound color view
    fn clear_render_target(&mut self, view: &D::View, color: [f32; 4]) -> Result<()>;

    /// Clear a bound depth/stencil view
    fn clear_depth_stencil(&mut self, view: &D::View, depth: f32, stencil: u8) -> Result<()>;

    /// Hint that the contents of `image` are no longer needed
    ///
    /// `image` must be bound in the open render scope. Backends may apply
    /// the hint when the scope ends.
    fn discard(&mut self, image: &D::Image) -> Result<()>;

    /// End the render scope opened by `set_render_targets`
    ///
    /// Must succeed even when no scope is open.
    fn close_render_scope(&mut self) -> Result<()>;
}

/// Viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle as an origin and a size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scissor {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Scissor {
    /// Edge form recorded into command lists
    pub fn to_rect(&self) -> ScissorRect {
        ScissorRect {
            left: self.x,
            top: self.y,
            right: self.x + self.width,
            bottom: self.y + self.height,
        }
    }
}

/// Scissor rectangle as four edges (right/bottom exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}
