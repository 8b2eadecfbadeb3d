/// Image data model - formats, usage flags, usage states and descriptors

use bitflags::bitflags;

/// Pixel format of a GPU image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    #[default]
    Undefined,
    /// 8-bit RGBA, normalized
    Rgba8,
    /// 16-bit float RGBA
    Rgba16F,
    /// 32-bit float RGBA
    Rgba32F,
    /// 24-bit depth + 8-bit stencil
    Depth24Stencil8,
}

impl ImageFormat {
    /// Whether this is a depth/stencil format
    pub fn is_depth(&self) -> bool {
        matches!(self, ImageFormat::Depth24Stencil8)
    }

    /// Whether this format carries a stencil component
    pub fn has_stencil(&self) -> bool {
        matches!(self, ImageFormat::Depth24Stencil8)
    }
}

bitflags! {
    /// How an image may be used. Flags can be combined.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageUsage: u32 {
        /// Bound as a color render target (needs a descriptor table slot)
        const RENDER_ATTACHMENT = 1;
        /// Bound as a depth/stencil target
        const DEPTH_STENCIL = 2;
        /// Read by shaders
        const SHADER = 4;
        /// Unordered (storage) access
        const UAV = 8;
    }
}

/// Current usage state of an image, as seen by the GPU
///
/// `Undefined` only describes an image that has not been used yet.
/// No transition may target it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageState {
    #[default]
    Undefined,
    /// Color render target
    Color,
    /// Depth/stencil write
    DepthStencil,
    /// Shader read
    Shader,
    /// Unordered access
    UAV,
    /// Ready for presentation
    Present,
}

/// Immutable description of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: ImageFormat,
    /// Allowed usages
    pub usage: ImageUsage,
}

impl ImageDesc {
    /// Descriptor of a color buffer that wraps a swapchain backing image
    pub fn swapchain_color(width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            width,
            height,
            format,
            usage: ImageUsage::RENDER_ATTACHMENT,
        }
    }

    /// Descriptor of a depth buffer
    pub fn depth(width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            width,
            height,
            format,
            usage: ImageUsage::DEPTH_STENCIL,
        }
    }

    /// Whether the image needs a render-attachment descriptor slot
    pub fn needs_descriptor_slot(&self) -> bool {
        self.usage.contains(ImageUsage::RENDER_ATTACHMENT)
    }

    /// Whether the image needs any attachment view (color or depth)
    pub fn needs_view(&self) -> bool {
        self.usage.intersects(ImageUsage::RENDER_ATTACHMENT | ImageUsage::DEPTH_STENCIL)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
