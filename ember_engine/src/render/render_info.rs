/// RenderInfo - declarative description of one recording scope

use crate::error::Result;
use crate::graphics_device::{CommandList, GraphicsDevice, Scissor, Viewport};
use crate::render::ImageKey;

/// What happens to an attachment's contents when a recording scope opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadOp {
    /// Keep previous contents
    Load,
    /// Clear to the attachment's clear value
    #[default]
    Clear,
    /// Previous contents are irrelevant
    DontCare,
}

/// What happens to an attachment's contents when a recording scope closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreOp {
    /// Keep the rendered contents
    #[default]
    Store,
    /// Contents may be discarded
    DontCare,
}

/// Clear color, RGBA
pub type ClearColor = [f32; 4];

/// Clear values of a depth/stencil attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearDepthStencil {
    pub depth: f32,
    pub stencil: u8,
}

impl Default for ClearDepthStencil {
    fn default() -> Self {
        Self { depth: 1.0, stencil: 0 }
    }
}

/// Clear value of one attachment role
///
/// Color and depth attachments are handled by the same routines; only the
/// clear command differs.
pub trait ClearValue: Copy + std::fmt::Debug {
    /// Attachment role, used in log messages
    const ROLE: &'static str;

    /// Clear value used when none is given
    fn default_clear() -> Self;

    /// Record the clear of `view` into `cmd`
    fn record_clear<D: GraphicsDevice>(&self, cmd: &mut D::CommandList, view: &D::View) -> Result<()>;
}

impl ClearValue for ClearColor {
    const ROLE: &'static str = "color";

    fn default_clear() -> Self {
        [0.0, 0.0, 0.0, 1.0]
    }

    fn record_clear<D: GraphicsDevice>(&self, cmd: &mut D::CommandList, view: &D::View) -> Result<()> {
        cmd.clear_render_target(view, *self)
    }
}

impl ClearValue for ClearDepthStencil {
    const ROLE: &'static str = "depth";

    fn default_clear() -> Self {
        Self::default()
    }

    fn record_clear<D: GraphicsDevice>(&self, cmd: &mut D::CommandList, view: &D::View) -> Result<()> {
        cmd.clear_depth_stencil(view, self.depth, self.stencil)
    }
}

/// One attachment of a recording scope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentInfo<C: ClearValue> {
    /// Image to render into, as returned by the render target
    pub image: ImageKey,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    /// Used when `load_op` is `Clear`
    pub clear: C,
}

impl<C: ClearValue> AttachmentInfo<C> {
    /// Attachment on `image` with default ops and clear value
    pub fn new(image: ImageKey) -> Self {
        Self {
            image,
            ..Self::default()
        }
    }
}

impl<C: ClearValue> Default for AttachmentInfo<C> {
    fn default() -> Self {
        Self {
            image: ImageKey::default(),
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            clear: C::default_clear(),
        }
    }
}

pub type ColorAttachmentInfo = AttachmentInfo<ClearColor>;
pub type DepthAttachmentInfo = AttachmentInfo<ClearDepthStencil>;

/// Viewport and scissor of a recording scope
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderView {
    pub viewport: Viewport,
    pub scissor: Scissor,
}

impl RenderView {
    /// Viewport and scissor covering a whole `width` x `height` target
    pub fn from_extent(width: u32, height: u32) -> Self {
        Self {
            viewport: Viewport {
                width: width as f32,
                height: height as f32,
                ..Viewport::default()
            },
            scissor: Scissor {
                x: 0,
                y: 0,
                width: width as i32,
                height: height as i32,
            },
        }
    }
}

/// Everything `RenderContext::begin_recording` needs to open a scope
///
/// Color attachments are bound in list order.
#[derive(Debug, Clone, Default)]
pub struct RenderInfo {
    pub view: RenderView,
    pub color: Vec<ColorAttachmentInfo>,
    pub depth: Option<DepthAttachmentInfo>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "render_info_tests.rs"]
mod tests;
