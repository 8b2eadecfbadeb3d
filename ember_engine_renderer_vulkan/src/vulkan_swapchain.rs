/// Swapchain - Vulkan implementation of the Swapchain trait
///
/// The engine renders into offscreen backbuffers, one per frame in flight,
/// that it owns by index. `present(i)` acquires a surface image, blits
/// backbuffer `i` onto it and queues it for presentation with FIFO (vsync).
/// The surface swapchain itself is recreated transparently whenever the
/// window system reports it out of date.

use ash::vk;
use ember_engine::ember::graphics_device::{ImageFormat, Swapchain as GraphicsSwapchain, WindowSurface};
use ember_engine::ember::{Error, Result};
use ember_engine::{engine_debug, engine_error, engine_info};
use std::sync::Arc;

use crate::vulkan::VulkanGraphicsDevice;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{format_to_vk, BACKBUFFER_FORMAT};
use crate::vulkan_image::Image;

const SOURCE: &str = "ember::vulkan::Swapchain";

/// Presentation resources of one backbuffer
struct PresentSlot {
    command_buffer: vk::CommandBuffer,
    /// Signaled by image acquisition
    image_available: vk::Semaphore,
    /// Signaled when the blit of this slot completes
    in_flight: vk::Fence,
}

/// Vulkan swapchain implementation
pub struct Swapchain {
    /// Surface
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,

    /// Swapchain
    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain_images: Vec<vk::Image>,
    swapchain_extent: vk::Extent2D,
    /// Set when the surface reported out of date or suboptimal
    needs_recreate: bool,

    /// One semaphore per swapchain image (for present)
    render_finished_semaphores: Vec<vk::Semaphore>,

    /// Offscreen buffers rendered by the engine
    backbuffers: Vec<Image>,
    width: u32,
    height: u32,

    /// Pool of the blit command buffers
    command_pool: vk::CommandPool,
    present_slots: Vec<PresentSlot>,

    context: Arc<GpuContext>,
}

impl Swapchain {
    /// Create a swapchain for `window`
    ///
    /// # Arguments
    ///
    /// * `context` - Shared GPU context
    /// * `window` - Window providing the native handles
    /// * `buffer_count` - Number of backbuffers
    /// * `width` - Backbuffer width
    /// * `height` - Backbuffer height
    pub(crate) fn new(
        context: Arc<GpuContext>,
        window: &dyn WindowSurface,
        buffer_count: u32,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let (display_handle, window_handle) = window.raw_handles()?;

        let surface = unsafe {
            ash_window::create_surface(&context.entry, &context.instance, display_handle, window_handle, None)
        }
        .map_err(|e| {
            engine_error!(context.log, SOURCE, "Failed to create surface: {:?}", e);
            Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
        })?;

        let surface_loader = ash::khr::surface::Instance::new(&context.entry, &context.instance);
        let swapchain_loader = ash::khr::swapchain::Device::new(&context.instance, &context.device);

        // From here on, Drop releases whatever was created
        let mut swapchain = Self {
            surface,
            surface_loader,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            swapchain_images: Vec::new(),
            swapchain_extent: vk::Extent2D::default(),
            needs_recreate: true,
            render_finished_semaphores: Vec::new(),
            backbuffers: Vec::new(),
            width,
            height,
            command_pool: vk::CommandPool::null(),
            present_slots: Vec::new(),
            context,
        };

        let supported = unsafe {
            swapchain.surface_loader.get_physical_device_surface_support(
                swapchain.context.physical_device,
                swapchain.context.queue_family,
                surface,
            )
        }
        .unwrap_or(false);
        if !supported {
            engine_error!(swapchain.context.log, SOURCE, "Queue family {} cannot present to window {}",
                swapchain.context.queue_family, window.id());
            return Err(Error::InitializationFailed("Window surface not supported by the device queue".to_string()));
        }

        let pool_create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(swapchain.context.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        swapchain.command_pool = unsafe { swapchain.context.device.create_command_pool(&pool_create_info, None) }
            .map_err(|e| swapchain.context.vk_error("vkCreateCommandPool", e))?;

        swapchain.recreate_native()?;
        swapchain.create_backbuffers(buffer_count)?;

        engine_info!(swapchain.context.log, SOURCE, "Created {}x{} swapchain with {} buffers (surface {}x{})",
            width, height, buffer_count, swapchain.swapchain_extent.width, swapchain.swapchain_extent.height);
        Ok(swapchain)
    }

    /// Surface extent currently presented to
    pub fn surface_extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    /// (Re)create the surface swapchain from the current surface capabilities
    ///
    /// Leaves `needs_recreate` set when the surface has a zero extent
    /// (minimized window).
    fn recreate_native(&mut self) -> Result<()> {
        let context = Arc::clone(&self.context);
        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(context.physical_device, self.surface)
                .map_err(|e| context.vk_error("vkGetPhysicalDeviceSurfaceCapabilitiesKHR", e))?;

            let extent = if capabilities.current_extent.width != u32::MAX {
                capabilities.current_extent
            } else {
                vk::Extent2D {
                    width: self.width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
                    height: self.height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
                }
            };
            if extent.width == 0 || extent.height == 0 {
                engine_debug!(context.log, SOURCE, "Surface has a zero extent, presentation suspended");
                self.needs_recreate = true;
                return Ok(());
            }

            if !capabilities.supported_usage_flags.contains(vk::ImageUsageFlags::TRANSFER_DST) {
                engine_error!(context.log, SOURCE, "Surface does not accept transfer writes");
                return Err(Error::InitializationFailed("Surface images cannot be blit targets".to_string()));
            }

            let surface_formats = self
                .surface_loader
                .get_physical_device_surface_formats(context.physical_device, self.surface)
                .map_err(|e| context.vk_error("vkGetPhysicalDeviceSurfaceFormatsKHR", e))?;

            // UNORM so blitted values reach the screen unchanged
            let surface_format = surface_formats
                .iter()
                .find(|f| f.format == vk::Format::B8G8R8A8_UNORM || f.format == vk::Format::R8G8B8A8_UNORM)
                .or_else(|| surface_formats.first())
                .copied()
                .ok_or_else(|| {
                    engine_error!(context.log, SOURCE, "Surface reports no formats");
                    Error::InitializationFailed("Surface reports no formats".to_string())
                })?;

            let mut image_count = capabilities.min_image_count + 1;
            if capabilities.max_image_count > 0 {
                image_count = image_count.min(capabilities.max_image_count);
            }

            let old_swapchain = self.swapchain;
            let swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(self.surface)
                .min_image_count(image_count)
                .image_format(surface_format.format)
                .image_color_space(surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::TRANSFER_DST)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(vk::PresentModeKHR::FIFO)
                .clipped(true)
                .old_swapchain(old_swapchain);

            // Nothing may still use the old images or semaphores
            context.device.device_wait_idle().map_err(|e| context.vk_error("vkDeviceWaitIdle", e))?;

            let swapchain = self
                .swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(|e| context.vk_error("vkCreateSwapchainKHR", e))?;

            if old_swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
            self.swapchain = swapchain;
            self.swapchain_images.clear();

            self.swapchain_images = self
                .swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(|e| context.vk_error("vkGetSwapchainImagesKHR", e))?;
            self.swapchain_extent = extent;

            for semaphore in self.render_finished_semaphores.drain(..) {
                context.device.destroy_semaphore(semaphore, None);
            }
            let semaphore_create_info = vk::SemaphoreCreateInfo::default();
            for _ in 0..self.swapchain_images.len() {
                let semaphore = context
                    .device
                    .create_semaphore(&semaphore_create_info, None)
                    .map_err(|e| context.vk_error("vkCreateSemaphore", e))?;
                self.render_finished_semaphores.push(semaphore);
            }
        }

        self.needs_recreate = false;
        engine_debug!(context.log, SOURCE, "Surface swapchain {}x{} with {} images",
            self.swapchain_extent.width, self.swapchain_extent.height, self.swapchain_images.len());
        Ok(())
    }

    /// Create `count` backbuffers at the current size, with their present slots
    fn create_backbuffers(&mut self, count: u32) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidState(format!("cannot create {}x{} backbuffers", self.width, self.height)));
        }

        let vk_format = format_to_vk(BACKBUFFER_FORMAT)?;
        let extent = vk::Extent2D {
            width: self.width,
            height: self.height,
        };

        for _ in 0..count {
            let image = Image::new(
                Arc::clone(&self.context),
                BACKBUFFER_FORMAT,
                vk_format,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
                extent,
            )?;
            self.backbuffers.push(image);

            let slot = self.create_present_slot()?;
            self.present_slots.push(slot);
        }
        Ok(())
    }

    fn create_present_slot(&self) -> Result<PresentSlot> {
        let context = &self.context;
        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(self.command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = context
                .device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| context.vk_error("vkAllocateCommandBuffers", e))?
                .first()
                .copied()
                .ok_or_else(|| Error::BackendError("vkAllocateCommandBuffers returned no buffer".to_string()))?;

            let image_available = context
                .device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(|e| context.vk_error("vkCreateSemaphore", e))?;

            let fence_create_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            let in_flight = match context.device.create_fence(&fence_create_info, None) {
                Ok(fence) => fence,
                Err(e) => {
                    context.device.destroy_semaphore(image_available, None);
                    return Err(context.vk_error("vkCreateFence", e));
                }
            };

            Ok(PresentSlot {
                command_buffer,
                image_available,
                in_flight,
            })
        }
    }

    /// Destroy every backbuffer and present slot; the device must be idle
    fn destroy_backbuffers(&mut self) {
        unsafe {
            for slot in self.present_slots.drain(..) {
                self.context
                    .device
                    .free_command_buffers(self.command_pool, &[slot.command_buffer]);
                self.context.device.destroy_semaphore(slot.image_available, None);
                self.context.device.destroy_fence(slot.in_flight, None);
            }
        }
        self.backbuffers.clear();
    }

    /// Record the blit of `backbuffer` onto `target`, leaving `target` presentable
    fn record_blit(&self, command_buffer: vk::CommandBuffer, backbuffer: &Image, target: vk::Image) -> Result<()> {
        let device = &self.context.device;
        let color_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        let color_layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };

        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| self.context.vk_error("vkResetCommandBuffer", e))?;
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| self.context.vk_error("vkBeginCommandBuffer", e))?;

            // The backbuffer is already a transfer source; only the surface image moves
            let to_transfer = [vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::BLIT)
                .src_access_mask(vk::AccessFlags2::NONE)
                .dst_stage_mask(vk::PipelineStageFlags2::BLIT)
                .dst_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(target)
                .subresource_range(color_range)];
            device.cmd_pipeline_barrier2(
                command_buffer,
                &vk::DependencyInfo::default().image_memory_barriers(&to_transfer),
            );

            let src_extent = backbuffer.extent();
            let dst_extent = self.swapchain_extent;
            let region = vk::ImageBlit::default()
                .src_subresource(color_layers)
                .src_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: src_extent.width as i32,
                        y: src_extent.height as i32,
                        z: 1,
                    },
                ])
                .dst_subresource(color_layers)
                .dst_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: dst_extent.width as i32,
                        y: dst_extent.height as i32,
                        z: 1,
                    },
                ]);
            device.cmd_blit_image(
                command_buffer,
                backbuffer.handle(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                target,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                vk::Filter::LINEAR,
            );

            let to_present = [vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::BLIT)
                .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE)
                .dst_access_mask(vk::AccessFlags2::NONE)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(target)
                .subresource_range(color_range)];
            device.cmd_pipeline_barrier2(
                command_buffer,
                &vk::DependencyInfo::default().image_memory_barriers(&to_present),
            );

            device
                .end_command_buffer(command_buffer)
                .map_err(|e| self.context.vk_error("vkEndCommandBuffer", e))?;
        }
        Ok(())
    }
}

impl GraphicsSwapchain<VulkanGraphicsDevice> for Swapchain {
    fn buffer_count(&self) -> u32 {
        self.backbuffers.len() as u32
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> ImageFormat {
        BACKBUFFER_FORMAT
    }

    fn backing_image(&self, index: u32) -> Result<Image> {
        self.backbuffers
            .get(index as usize)
            .map(Image::borrowed)
            .ok_or_else(|| Error::InvalidResource(format!("swapchain has no buffer {}", index)))
    }

    fn resize_buffers(&mut self, buffer_count: u32, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidState(format!("cannot resize swapchain to {}x{}", width, height)));
        }

        unsafe { self.context.device.device_wait_idle() }
            .map_err(|e| self.context.vk_error("vkDeviceWaitIdle", e))?;

        self.destroy_backbuffers();
        self.width = width;
        self.height = height;
        self.recreate_native()?;
        self.create_backbuffers(buffer_count)?;

        engine_debug!(self.context.log, SOURCE, "Resized to {}x{} with {} buffers", width, height, buffer_count);
        Ok(())
    }

    fn present(&mut self, index: u32) -> Result<()> {
        let slot_index = index as usize;
        if slot_index >= self.backbuffers.len() {
            return Err(Error::InvalidState(format!("no swapchain buffer {}", index)));
        }

        if self.needs_recreate {
            self.recreate_native()?;
            if self.needs_recreate {
                // Minimized: the frame is dropped
                return Ok(());
            }
        }

        let context = Arc::clone(&self.context);
        let (command_buffer, image_available, in_flight) = {
            let slot = &self.present_slots[slot_index];
            (slot.command_buffer, slot.image_available, slot.in_flight)
        };

        unsafe {
            context
                .device
                .wait_for_fences(&[in_flight], true, u64::MAX)
                .map_err(|e| context.vk_error("vkWaitForFences", e))?;

            let (image_index, suboptimal) = match self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                image_available,
                vk::Fence::null(),
            ) {
                Ok(acquired) => acquired,
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    self.needs_recreate = true;
                    return Ok(());
                }
                Err(e) => return Err(context.vk_error("vkAcquireNextImageKHR", e)),
            };
            self.needs_recreate |= suboptimal;

            let target = self
                .swapchain_images
                .get(image_index as usize)
                .copied()
                .ok_or_else(|| Error::BackendError(format!("acquired unknown image {}", image_index)))?;
            let render_finished = self.render_finished_semaphores[image_index as usize];

            self.record_blit(command_buffer, &self.backbuffers[slot_index], target)?;

            context
                .device
                .reset_fences(&[in_flight])
                .map_err(|e| context.vk_error("vkResetFences", e))?;

            let wait_infos = [vk::SemaphoreSubmitInfo::default()
                .semaphore(image_available)
                .stage_mask(vk::PipelineStageFlags2::BLIT)];
            let command_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(command_buffer)];
            let signal_infos = [vk::SemaphoreSubmitInfo::default()
                .semaphore(render_finished)
                .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
            let submit = vk::SubmitInfo2::default()
                .wait_semaphore_infos(&wait_infos)
                .command_buffer_infos(&command_infos)
                .signal_semaphore_infos(&signal_infos);

            let queue = context.lock_queue()?;
            context
                .device
                .queue_submit2(*queue, &[submit], in_flight)
                .map_err(|e| context.vk_error("vkQueueSubmit2 (present blit)", e))?;

            let wait_semaphores = [render_finished];
            let swapchains = [self.swapchain];
            let image_indices = [image_index];
            let present_info = vk::PresentInfoKHR::default()
                .wait_semaphores(&wait_semaphores)
                .swapchains(&swapchains)
                .image_indices(&image_indices);

            match self.swapchain_loader.queue_present(*queue, &present_info) {
                Ok(suboptimal) => self.needs_recreate |= suboptimal,
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => self.needs_recreate = true,
                Err(e) => return Err(context.vk_error("vkQueuePresentKHR", e)),
            }
        }
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.context.device.device_wait_idle().ok();
        }

        self.destroy_backbuffers();

        unsafe {
            for semaphore in self.render_finished_semaphores.drain(..) {
                self.context.device.destroy_semaphore(semaphore, None);
            }
            if self.command_pool != vk::CommandPool::null() {
                self.context.device.destroy_command_pool(self.command_pool, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
