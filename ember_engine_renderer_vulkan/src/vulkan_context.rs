/// GpuContext - Vulkan objects shared by every GPU resource
///
/// Contains everything a resource needs to release itself:
/// - Device for Vulkan API calls
/// - Allocator for memory management
/// - Queue (behind a lock) for submission
/// - Render-attachment view table
///
/// Each resource holds an `Arc<GpuContext>`. The device and instance are
/// destroyed when the last reference goes away, after every resource.

use ash::vk;
use ember_engine::ember::{Error, Result};
use ember_engine::ember::log::LogSink;
use ember_engine::{engine_err, engine_error};
use gpu_allocator::vulkan::Allocator;
use rustc_hash::FxHashMap;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

#[cfg(feature = "vulkan-validation")]
use crate::debug::DebugMessenger;

const SOURCE: &str = "ember::vulkan::GpuContext";

/// Shared GPU context for all Vulkan resources
pub struct GpuContext {
    /// Vulkan logical device
    pub(crate) device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is released BEFORE the device is destroyed
    pub(crate) allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics + present queue. Submissions must hold the lock.
    pub(crate) queue: Mutex<vk::Queue>,

    /// Family of `queue`
    pub(crate) queue_family: u32,

    /// Adapter the device was created on
    pub(crate) physical_device: vk::PhysicalDevice,

    /// Native format backing `ImageFormat::Depth24Stencil8` on this adapter
    pub(crate) depth_stencil_format: vk::Format,

    /// Live render-attachment views, by descriptor table slot
    pub(crate) attachment_views: Mutex<FxHashMap<u32, vk::ImageView>>,

    /// Engine log
    pub(crate) log: LogSink,

    /// Raw `vk::Result` that lost the device, 0 while healthy
    device_lost: AtomicU32,

    /// Validation messenger, destroyed before the instance
    #[cfg(feature = "vulkan-validation")]
    pub(crate) debug: Mutex<Option<DebugMessenger>>,

    /// Vulkan instance
    pub(crate) instance: ash::Instance,

    /// Loader entry points (surface creation)
    pub(crate) entry: ash::Entry,
}

impl GpuContext {
    /// Create a new GPU context
    ///
    /// # Arguments
    ///
    /// * `entry` - Vulkan loader
    /// * `instance` - Vulkan instance
    /// * `physical_device` - Adapter of `device`
    /// * `device` - Vulkan logical device
    /// * `allocator` - GPU memory allocator
    /// * `queue` - Queue used for every submission
    /// * `queue_family` - Family of `queue`
    /// * `depth_stencil_format` - Native depth/stencil format
    /// * `log` - Engine log
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        allocator: Allocator,
        queue: vk::Queue,
        queue_family: u32,
        depth_stencil_format: vk::Format,
        log: LogSink,
    ) -> Self {
        Self {
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queue: Mutex::new(queue),
            queue_family,
            physical_device,
            depth_stencil_format,
            attachment_views: Mutex::new(FxHashMap::default()),
            log,
            device_lost: AtomicU32::new(0),
            #[cfg(feature = "vulkan-validation")]
            debug: Mutex::new(None),
            instance,
            entry,
        }
    }

    /// Lock the submission queue
    pub(crate) fn lock_queue(&self) -> Result<MutexGuard<'_, vk::Queue>> {
        self.queue
            .lock()
            .map_err(|_| engine_err!(self.log, SOURCE, "Queue lock poisoned"))
    }

    /// Lock the memory allocator
    pub(crate) fn lock_allocator(&self) -> Result<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| engine_err!(self.log, SOURCE, "Allocator lock poisoned"))
    }

    /// Translate a failed Vulkan call into an engine error
    ///
    /// `ERROR_DEVICE_LOST` is latched and reported as `Error::DeviceLost`
    /// from then on.
    pub(crate) fn vk_error(&self, action: &str, result: vk::Result) -> Error {
        match result {
            vk::Result::ERROR_DEVICE_LOST => {
                let reason = result.as_raw() as u32;
                if self.device_lost.swap(reason, Ordering::AcqRel) == 0 {
                    engine_error!(self.log, SOURCE, "Device lost during {} (reason: 0x{:08X})", action, reason);
                }
                Error::DeviceLost { reason }
            }
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                engine_error!(self.log, SOURCE, "{} failed: {:?}", action, result);
                Error::OutOfMemory
            }
            _ => engine_err!(self.log, SOURCE, "{} failed: {:?}", action, result),
        }
    }

    /// Raw `vk::Result` that lost the device
    pub(crate) fn device_lost_reason(&self) -> Option<u32> {
        match self.device_lost.load(Ordering::Acquire) {
            0 => None,
            reason => Some(reason),
        }
    }

    /// Register a render-attachment view under its descriptor slot
    pub(crate) fn publish_view(&self, slot: u32, view: vk::ImageView) {
        match self.attachment_views.lock() {
            Ok(mut views) => {
                views.insert(slot, view);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(slot, view);
            }
        }
    }

    /// Remove a render-attachment view from the table
    pub(crate) fn retract_view(&self, slot: u32) {
        match self.attachment_views.lock() {
            Ok(mut views) => {
                views.remove(&slot);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&slot);
            }
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            // 1. Free VkDeviceMemory pages BEFORE destroying the device
            ManuallyDrop::drop(&mut self.allocator);

            // 2. Debug messenger BEFORE the instance
            #[cfg(feature = "vulkan-validation")]
            if let Some(messenger) = self.debug.get_mut().ok().and_then(Option::take) {
                messenger.destroy();
            }

            // 3. Device and instance
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
