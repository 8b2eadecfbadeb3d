/// Image and View - Vulkan GPU image resources

use ash::vk;
use ember_engine::ember::graphics_device::ImageFormat;
use ember_engine::ember::{Error, Result};
use ember_engine::engine_error;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

const SOURCE: &str = "ember::vulkan::Image";

/// Vulkan image
///
/// Owned images free their memory and destroy the `vk::Image` when dropped.
/// Borrowed handles (swapchain backing buffers) release nothing.
pub struct Image {
    /// Vulkan image
    pub(crate) image: vk::Image,
    /// Native format
    pub(crate) vk_format: vk::Format,
    /// Engine format
    pub(crate) format: ImageFormat,
    /// Aspects covered by barriers and views
    pub(crate) aspect_mask: vk::ImageAspectFlags,
    /// Size in pixels
    pub(crate) extent: vk::Extent2D,
    /// GPU memory, only for owned images
    allocation: Option<Allocation>,
    /// Whether dropping this value destroys the image
    owned: bool,
    /// Shared GPU context (for cleanup)
    context: Arc<GpuContext>,
}

impl Image {
    /// Create an owned 2D image with dedicated GPU memory
    ///
    /// # Arguments
    ///
    /// * `context` - Shared GPU context
    /// * `format` - Engine format
    /// * `vk_format` - Native format
    /// * `usage` - Native usage flags
    /// * `extent` - Size in pixels
    pub(crate) fn new(
        context: Arc<GpuContext>,
        format: ImageFormat,
        vk_format: vk::Format,
        usage: vk::ImageUsageFlags,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        unsafe {
            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(vk_format)
                .extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = context
                .device
                .create_image(&image_create_info, None)
                .map_err(|e| context.vk_error("vkCreateImage", e))?;

            let requirements = context.device.get_image_memory_requirements(image);

            let allocation = context
                .lock_allocator()
                .and_then(|mut allocator| {
                    allocator
                        .allocate(&AllocationCreateDesc {
                            name: "ember image",
                            requirements,
                            location: MemoryLocation::GpuOnly,
                            linear: false,
                            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                        })
                        .map_err(|_e| {
                            let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                            engine_error!(context.log, SOURCE, "Out of GPU memory for {}x{} {:?} image ({:.2} MB)",
                                extent.width, extent.height, format, size_mb);
                            Error::OutOfMemory
                        })
                });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    context.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            if let Err(e) = context
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
            {
                if let Ok(mut allocator) = context.lock_allocator() {
                    allocator.free(allocation).ok();
                }
                context.device.destroy_image(image, None);
                return Err(context.vk_error("vkBindImageMemory", e));
            }

            Ok(Self {
                image,
                vk_format,
                format,
                aspect_mask: crate::vulkan_format::aspect_mask(format),
                extent,
                allocation: Some(allocation),
                owned: true,
                context,
            })
        }
    }

    /// Non-owning handle to the same image
    pub(crate) fn borrowed(&self) -> Self {
        Self {
            image: self.image,
            vk_format: self.vk_format,
            format: self.format,
            aspect_mask: self.aspect_mask,
            extent: self.extent,
            allocation: None,
            owned: false,
            context: Arc::clone(&self.context),
        }
    }

    /// Underlying Vulkan image
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Engine format
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Whether dropping this value destroys the image
    pub fn is_owned(&self) -> bool {
        self.owned
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        unsafe {
            // Free GPU memory
            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = self.context.lock_allocator() {
                    allocator.free(allocation).ok();
                }
            }

            // Destroy image
            self.context.device.destroy_image(self.image, None);
        }
    }
}

/// Attachment view of an image
///
/// Color views occupy a descriptor table slot and are published in the
/// device's view table while alive.
pub struct View {
    /// Vulkan image view
    pub(crate) view: vk::ImageView,
    /// Viewed image, not owned
    pub(crate) image: vk::Image,
    /// Aspects covered by the view
    pub(crate) aspect_mask: vk::ImageAspectFlags,
    /// Engine format of the viewed image
    pub(crate) format: ImageFormat,
    /// Size of the viewed image
    pub(crate) extent: vk::Extent2D,
    /// Descriptor table slot (color views only)
    pub(crate) slot: Option<u32>,
    /// Shared GPU context (for cleanup)
    context: Arc<GpuContext>,
}

impl View {
    /// Create a 2D view over the whole of `image`
    pub(crate) fn new(context: Arc<GpuContext>, image: &Image, slot: Option<u32>) -> Result<Self> {
        let view_create_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.vk_format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: image.aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { context.device.create_image_view(&view_create_info, None) }
            .map_err(|e| context.vk_error("vkCreateImageView", e))?;

        if let Some(slot) = slot {
            context.publish_view(slot, view);
        }

        Ok(Self {
            view,
            image: image.image,
            aspect_mask: image.aspect_mask,
            format: image.format,
            extent: image.extent,
            slot,
            context,
        })
    }

    /// Underlying Vulkan image view
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }

    /// Descriptor table slot, `None` for depth views
    pub fn slot(&self) -> Option<u32> {
        self.slot
    }

    /// Engine format of the viewed image
    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

impl Drop for View {
    fn drop(&mut self) {
        if let Some(slot) = self.slot {
            self.context.retract_view(slot);
        }
        unsafe {
            self.context.device.destroy_image_view(self.view, None);
        }
    }
}
