/// Conversions between engine image types and Vulkan enums
///
/// Pure functions, no device required.

use ash::vk;
use ember_engine::ember::{Error, Result};
use ember_engine::ember::graphics_device::{ImageFormat, ImageState, ImageUsage};

/// Depth/stencil formats tried, in order, for `ImageFormat::Depth24Stencil8`
pub(crate) const DEPTH_STENCIL_CANDIDATES: [vk::Format; 2] = [
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT_S8_UINT,
];

/// Format of the offscreen buffers presented through the swapchain
pub(crate) const BACKBUFFER_FORMAT: ImageFormat = ImageFormat::Rgba8;

/// Synchronization scope and layout of an image in a given state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateAccess {
    pub layout: vk::ImageLayout,
    pub access: vk::AccessFlags2,
    pub stage: vk::PipelineStageFlags2,
}

/// Convert ImageFormat to Vulkan format
///
/// `Undefined` has no native equivalent.
pub(crate) fn format_to_vk(format: ImageFormat) -> Result<vk::Format> {
    match format {
        ImageFormat::Undefined => Err(Error::InvalidResource("image format is undefined".to_string())),
        ImageFormat::Rgba8 => Ok(vk::Format::R8G8B8A8_UNORM),
        ImageFormat::Rgba16F => Ok(vk::Format::R16G16B16A16_SFLOAT),
        ImageFormat::Rgba32F => Ok(vk::Format::R32G32B32A32_SFLOAT),
        ImageFormat::Depth24Stencil8 => Ok(DEPTH_STENCIL_CANDIDATES[0]),
    }
}

/// Convert ImageUsage to Vulkan image usage flags
///
/// Color images are also transfer sources so they can be blitted to a
/// swapchain image.
pub(crate) fn usage_to_vk(usage: ImageUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(ImageUsage::RENDER_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(ImageUsage::DEPTH_STENCIL) {
        flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.contains(ImageUsage::SHADER) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(ImageUsage::UAV) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    flags
}

/// Image aspects covered by views and barriers of `format`
pub(crate) fn aspect_mask(format: ImageFormat) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Layout, access mask and pipeline stages of `state`
///
/// `Present` maps to a transfer source: presented images are blitted onto
/// the swapchain image, which performs its own transition to PRESENT_SRC.
pub(crate) fn state_to_vk(state: ImageState) -> StateAccess {
    match state {
        ImageState::Undefined => StateAccess {
            layout: vk::ImageLayout::UNDEFINED,
            access: vk::AccessFlags2::NONE,
            stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
        },
        ImageState::Color => StateAccess {
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            access: vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        },
        ImageState::DepthStencil => StateAccess {
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            stage: vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
        },
        ImageState::Shader => StateAccess {
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            access: vk::AccessFlags2::SHADER_SAMPLED_READ,
            stage: vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER,
        },
        ImageState::UAV => StateAccess {
            layout: vk::ImageLayout::GENERAL,
            access: vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE,
            stage: vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER,
        },
        ImageState::Present => StateAccess {
            layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            access: vk::AccessFlags2::TRANSFER_READ,
            stage: vk::PipelineStageFlags2::BLIT,
        },
    }
}

/// Source and destination of the barrier that drops an attachment's contents
///
/// The image stays in `state`; the old layout is `UNDEFINED` so the driver
/// may discard what was written. The source scope still covers the
/// attachment writes of `state`.
pub(crate) fn discard_to_vk(state: ImageState) -> (StateAccess, StateAccess) {
    let current = state_to_vk(state);
    let src = StateAccess {
        layout: vk::ImageLayout::UNDEFINED,
        ..current
    };
    (src, current)
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
