/// CommandAllocator and CommandList - Vulkan command pools and buffers
///
/// A command allocator is a `vk::CommandPool`. A command list records into a
/// primary `vk::CommandBuffer` taken from the pool it was last reset against.
/// Render scopes use dynamic rendering: `set_render_targets` begins one and
/// `close_render_scope` (or any barrier, or `close`) ends it.

use ash::vk;
use ember_engine::ember::graphics_device::{
    CommandAllocator as GraphicsCommandAllocator,
    CommandList as GraphicsCommandList,
    ImageState, ScissorRect, Viewport,
};
use ember_engine::ember::{Error, Result};
use ember_engine::engine_trace;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::vulkan::VulkanGraphicsDevice;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{discard_to_vk, state_to_vk};
use crate::vulkan_image::{Image, View};

const SOURCE: &str = "ember::vulkan::CommandList";

/// Command memory for one frame in flight
pub struct CommandAllocator {
    pub(crate) pool: vk::CommandPool,
    context: Arc<GpuContext>,
}

impl CommandAllocator {
    pub(crate) fn new(context: Arc<GpuContext>) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(context.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { context.device.create_command_pool(&create_info, None) }
            .map_err(|e| context.vk_error("vkCreateCommandPool", e))?;

        Ok(Self { pool, context })
    }
}

impl GraphicsCommandAllocator for CommandAllocator {
    fn reset(&mut self) -> Result<()> {
        unsafe {
            self.context
                .device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
        }
        .map_err(|e| self.context.vk_error("vkResetCommandPool", e))
    }
}

impl Drop for CommandAllocator {
    fn drop(&mut self) {
        // Frees every command buffer allocated from the pool
        unsafe {
            self.context.device.destroy_command_pool(self.pool, None);
        }
    }
}

/// Attachment bound in a render scope
struct BoundAttachment {
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    state: ImageState,
    discarded: bool,
}

impl BoundAttachment {
    fn new(view: &View, state: ImageState) -> Self {
        Self {
            image: view.image,
            aspect_mask: view.aspect_mask,
            state,
            discarded: false,
        }
    }
}

/// Render scope opened by `set_render_targets`
struct ActiveScope {
    colors: Vec<vk::ImageView>,
    depth: Option<vk::ImageView>,
    attachments: Vec<BoundAttachment>,
    area: vk::Rect2D,
}

/// Vulkan command list implementation
pub struct CommandList {
    /// One command buffer per pool this list has recorded from
    buffers: FxHashMap<vk::CommandPool, vk::CommandBuffer>,
    /// Buffer currently recording or last closed
    command_buffer: vk::CommandBuffer,
    /// Whether commands can be appended
    is_recording: bool,
    /// Open dynamic-rendering scope, if any
    scope: Option<ActiveScope>,
    context: Arc<GpuContext>,
}

impl CommandList {
    /// Create a closed command list whose first buffer comes from `allocator`
    pub(crate) fn new(context: Arc<GpuContext>, allocator: &CommandAllocator) -> Result<Self> {
        let mut list = Self {
            buffers: FxHashMap::default(),
            command_buffer: vk::CommandBuffer::null(),
            is_recording: false,
            scope: None,
            context,
        };
        list.command_buffer = list.buffer_for(allocator.pool)?;
        Ok(list)
    }

    /// Underlying Vulkan command buffer
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Whether a render scope is open
    pub fn in_render_scope(&self) -> bool {
        self.scope.is_some()
    }

    fn buffer_for(&mut self, pool: vk::CommandPool) -> Result<vk::CommandBuffer> {
        if let Some(&buffer) = self.buffers.get(&pool) {
            return Ok(buffer);
        }

        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.context.device.allocate_command_buffers(&allocate_info) }
            .map_err(|e| self.context.vk_error("vkAllocateCommandBuffers", e))?;
        let buffer = buffers
            .first()
            .copied()
            .ok_or_else(|| Error::BackendError("vkAllocateCommandBuffers returned no buffer".to_string()))?;

        self.buffers.insert(pool, buffer);
        Ok(buffer)
    }

    fn ensure_recording(&self, command: &str) -> Result<()> {
        if self.is_recording {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("{} on a closed command list", command)))
        }
    }

    /// End the open render scope, then drop the contents of discarded attachments
    fn end_scope(&mut self) {
        let Some(scope) = self.scope.take() else {
            return;
        };
        unsafe {
            self.context.device.cmd_end_rendering(self.command_buffer);
        }

        let barriers: Vec<vk::ImageMemoryBarrier2> = scope
            .attachments
            .iter()
            .filter(|attachment| attachment.discarded)
            .map(|attachment| {
                let (src, dst) = discard_to_vk(attachment.state);
                vk::ImageMemoryBarrier2::default()
                    .src_stage_mask(src.stage)
                    .src_access_mask(src.access)
                    .dst_stage_mask(dst.stage)
                    .dst_access_mask(dst.access)
                    .old_layout(src.layout)
                    .new_layout(dst.layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(attachment.image)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: attachment.aspect_mask,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
            })
            .collect();
        if barriers.is_empty() {
            return;
        }

        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe {
            self.context
                .device
                .cmd_pipeline_barrier2(self.command_buffer, &dependency_info);
        }
        engine_trace!(self.context.log, SOURCE, "Discarded {} attachments", barriers.len());
    }

    fn scope_rect(scope: &ActiveScope) -> vk::ClearRect {
        vk::ClearRect {
            rect: scope.area,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

impl GraphicsCommandList<VulkanGraphicsDevice> for CommandList {
    fn reset(&mut self, allocator: &CommandAllocator) -> Result<()> {
        if self.is_recording {
            engine_trace!(self.context.log, SOURCE, "Discarding unfinished recording");
        }
        self.scope = None;
        self.is_recording = false;

        self.command_buffer = self.buffer_for(allocator.pool)?;

        unsafe {
            self.context
                .device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| self.context.vk_error("vkResetCommandBuffer", e))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.context
                .device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| self.context.vk_error("vkBeginCommandBuffer", e))?;
        }

        self.is_recording = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_recording("close")?;
        self.end_scope();

        unsafe { self.context.device.end_command_buffer(self.command_buffer) }
            .map_err(|e| self.context.vk_error("vkEndCommandBuffer", e))?;

        self.is_recording = false;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.is_recording
    }

    fn transition_barrier(&mut self, image: &Image, before: ImageState, after: ImageState) -> Result<()> {
        self.ensure_recording("transition_barrier")?;
        if after == ImageState::Undefined {
            return Err(Error::InvalidState("no transition may target Undefined".to_string()));
        }
        // Layout transitions are not allowed inside dynamic rendering
        self.end_scope();

        let src = state_to_vk(before);
        let dst = state_to_vk(after);

        let barriers = [vk::ImageMemoryBarrier2::default()
            .src_stage_mask(src.stage)
            .src_access_mask(src.access)
            .dst_stage_mask(dst.stage)
            .dst_access_mask(dst.access)
            .old_layout(src.layout)
            .new_layout(dst.layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: image.aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })];

        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);

        unsafe {
            self.context
                .device
                .cmd_pipeline_barrier2(self.command_buffer, &dependency_info);
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        self.ensure_recording("set_viewport")?;

        let vk_viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };

        unsafe {
            self.context
                .device
                .cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]);
        }
        Ok(())
    }

    fn set_scissor(&mut self, rect: &ScissorRect) -> Result<()> {
        self.ensure_recording("set_scissor")?;

        // Vulkan rejects negative offsets
        let left = rect.left.max(0);
        let top = rect.top.max(0);
        let vk_rect = vk::Rect2D {
            offset: vk::Offset2D { x: left, y: top },
            extent: vk::Extent2D {
                width: (rect.right - left).max(0) as u32,
                height: (rect.bottom - top).max(0) as u32,
            },
        };

        unsafe {
            self.context
                .device
                .cmd_set_scissor(self.command_buffer, 0, &[vk_rect]);
        }
        Ok(())
    }

    fn set_render_targets(&mut self, colors: &[&View], depth: Option<&View>) -> Result<()> {
        self.ensure_recording("set_render_targets")?;
        self.end_scope();

        // Render area is the intersection of every attachment
        let mut extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        for view in colors.iter().copied().chain(depth) {
            extent.width = extent.width.min(view.extent.width);
            extent.height = extent.height.min(view.extent.height);
        }
        if colors.is_empty() && depth.is_none() {
            return Err(Error::InvalidState("set_render_targets without attachments".to_string()));
        }
        let area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        let color_attachments: Vec<vk::RenderingAttachmentInfo> = colors
            .iter()
            .map(|view| {
                vk::RenderingAttachmentInfo::default()
                    .image_view(view.view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(vk::AttachmentStoreOp::STORE)
            })
            .collect();

        let depth_attachment = depth.map(|view| {
            vk::RenderingAttachmentInfo::default()
                .image_view(view.view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::LOAD)
                .store_op(vk::AttachmentStoreOp::STORE)
        });
        let has_stencil = depth.is_some_and(|view| view.format.has_stencil());

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(attachment) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(attachment);
            if has_stencil {
                rendering_info = rendering_info.stencil_attachment(attachment);
            }
        }

        unsafe {
            self.context
                .device
                .cmd_begin_rendering(self.command_buffer, &rendering_info);
        }

        let attachments = colors
            .iter()
            .map(|view| BoundAttachment::new(view, ImageState::Color))
            .chain(depth.map(|view| BoundAttachment::new(view, ImageState::DepthStencil)))
            .collect();
        self.scope = Some(ActiveScope {
            colors: colors.iter().map(|view| view.view).collect(),
            depth: depth.map(|view| view.view),
            attachments,
            area,
        });
        Ok(())
    }

    fn clear_render_target(&mut self, view: &View, color: [f32; 4]) -> Result<()> {
        self.ensure_recording("clear_render_target")?;
        let scope = self
            .scope
            .as_ref()
            .ok_or_else(|| Error::InvalidState("clear_render_target outside a render scope".to_string()))?;
        let index = scope
            .colors
            .iter()
            .position(|&bound| bound == view.view)
            .ok_or_else(|| Error::InvalidState("clearing a view that is not bound".to_string()))?;

        let attachments = [vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: index as u32,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
        }];
        let rects = [Self::scope_rect(scope)];

        unsafe {
            self.context
                .device
                .cmd_clear_attachments(self.command_buffer, &attachments, &rects);
        }
        Ok(())
    }

    fn clear_depth_stencil(&mut self, view: &View, depth: f32, stencil: u8) -> Result<()> {
        self.ensure_recording("clear_depth_stencil")?;
        let scope = self
            .scope
            .as_ref()
            .ok_or_else(|| Error::InvalidState("clear_depth_stencil outside a render scope".to_string()))?;
        if scope.depth != Some(view.view) {
            return Err(Error::InvalidState("clearing a depth view that is not bound".to_string()));
        }

        let mut aspect_mask = vk::ImageAspectFlags::DEPTH;
        if view.format.has_stencil() {
            aspect_mask |= vk::ImageAspectFlags::STENCIL;
        }
        let attachments = [vk::ClearAttachment {
            aspect_mask,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth,
                    stencil: u32::from(stencil),
                },
            },
        }];
        let rects = [Self::scope_rect(scope)];

        unsafe {
            self.context
                .device
                .cmd_clear_attachments(self.command_buffer, &attachments, &rects);
        }
        Ok(())
    }

    fn discard(&mut self, image: &Image) -> Result<()> {
        self.ensure_recording("discard")?;
        // Applied when the scope ends, once the attachment writes are done
        let scope = self
            .scope
            .as_mut()
            .ok_or_else(|| Error::InvalidState("discard outside a render scope".to_string()))?;
        let attachment = scope
            .attachments
            .iter_mut()
            .find(|attachment| attachment.image == image.image)
            .ok_or_else(|| Error::InvalidState("discarding an image that is not bound".to_string()))?;
        attachment.discarded = true;
        Ok(())
    }

    fn close_render_scope(&mut self) -> Result<()> {
        if self.is_recording {
            self.end_scope();
        }
        Ok(())
    }
}
