/// VulkanGraphicsDevice - Vulkan implementation of the GraphicsDevice trait

use ash::vk;
use ember_engine::ember::config::DeviceConfig;
use ember_engine::ember::graphics_device::{
    DescriptorAllocator, GraphicsDevice, ImageDesc, WindowSurface,
};
use ember_engine::ember::log::LogSink;
use ember_engine::ember::{Error, Result};
use ember_engine::{engine_debug, engine_error, engine_info};
#[cfg(feature = "vulkan-validation")]
use ember_engine::engine_warn;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::ffi::{CStr, CString};
use std::sync::{Arc, Mutex};

use crate::vulkan_command_list::{CommandAllocator, CommandList};
use crate::vulkan_context::GpuContext;
use crate::vulkan_fence::Fence;
use crate::vulkan_format::{format_to_vk, usage_to_vk, DEPTH_STENCIL_CANDIDATES};
use crate::vulkan_image::{Image, View};
use crate::vulkan_queue::Queue;
use crate::vulkan_swapchain::Swapchain;

#[cfg(feature = "vulkan-validation")]
use crate::debug::{DebugMessenger, ValidationStats};

const SOURCE: &str = "ember::vulkan::Device";

/// Validation layer name
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Adapter chosen for the device
struct AdapterSelection {
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    depth_stencil_format: vk::Format,
    name: String,
}

/// Vulkan graphics device
///
/// Owns the shared GPU context, the single graphics + present queue and the
/// render-attachment descriptor table. Every object it creates keeps the
/// context alive, so the Vulkan device outlives all of them.
pub struct VulkanGraphicsDevice {
    /// Submission queue
    queue: Queue,
    /// Render-attachment descriptor table
    descriptor_allocator: Mutex<DescriptorAllocator>,
    /// Adapter name, for diagnostics
    adapter_name: String,
    /// Shared GPU context
    context: Arc<GpuContext>,
    log: LogSink,
}

impl VulkanGraphicsDevice {
    /// Create a new Vulkan graphics device
    ///
    /// `window` is only used to pick a queue family able to present to it.
    ///
    /// # Arguments
    ///
    /// * `window` - Window the device will present to
    /// * `config` - Device configuration
    /// * `log` - Engine log, shared with every created object
    pub fn new(window: &dyn WindowSurface, config: &DeviceConfig, log: LogSink) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            engine_error!(log, SOURCE, "Failed to load Vulkan library: {}", e);
            Error::InitializationFailed(format!("Failed to load Vulkan: {}", e))
        })?;

        let (display_handle, _) = window.raw_handles()?;
        let validation = Self::validation_requested(&entry, config, &log);

        // 1. Instance
        let instance = Self::create_instance(&entry, display_handle, config, validation, &log)?;

        #[cfg(feature = "vulkan-validation")]
        let debug_messenger = if validation {
            match DebugMessenger::new(&entry, &instance, &log) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    engine_warn!(log, SOURCE, "Continuing without validation messages: {}", e);
                    None
                }
            }
        } else {
            None
        };

        // 2. Adapter, 3. logical device
        let created = Self::select_adapter(&entry, &instance, window, &log).and_then(|adapter| {
            let device = Self::create_logical_device(&instance, &adapter, &log)?;
            Ok((adapter, device))
        });
        let (adapter, device) = match created {
            Ok(created) => created,
            Err(e) => {
                unsafe {
                    #[cfg(feature = "vulkan-validation")]
                    if let Some(messenger) = debug_messenger {
                        messenger.destroy();
                    }
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        let teardown = |device: &ash::Device| unsafe {
            device.destroy_device(None);
            instance.destroy_instance(None);
        };

        // 4. Command queue
        let queue = unsafe { device.get_device_queue(adapter.queue_family, 0) };
        if queue == vk::Queue::null() {
            let reason = match unsafe { device.device_wait_idle() } {
                Err(e) => e.as_raw() as u32,
                Ok(()) => 0,
            };
            engine_error!(log, SOURCE, "Failed to get queue of family {} (device status: 0x{:08X})",
                adapter.queue_family, reason);
            #[cfg(feature = "vulkan-validation")]
            if let Some(messenger) = debug_messenger {
                unsafe { messenger.destroy() };
            }
            teardown(&device);
            return Err(Error::InitializationFailed("Failed to get command queue".to_string()));
        }

        // Memory allocator
        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device: adapter.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                engine_error!(log, SOURCE, "Failed to create GPU allocator: {:?}", e);
                #[cfg(feature = "vulkan-validation")]
                if let Some(messenger) = debug_messenger {
                    unsafe { messenger.destroy() };
                }
                teardown(&device);
                return Err(Error::InitializationFailed(format!("Failed to create allocator: {:?}", e)));
            }
        };

        // GpuContext now owns device and instance destruction
        let context = Arc::new(GpuContext::new(
            entry,
            instance.clone(),
            adapter.physical_device,
            device,
            allocator,
            queue,
            adapter.queue_family,
            adapter.depth_stencil_format,
            log.clone(),
        ));

        #[cfg(feature = "vulkan-validation")]
        if let Ok(mut debug) = context.debug.lock() {
            *debug = debug_messenger;
        }

        // 5. Descriptor table
        let descriptor_allocator = Mutex::new(DescriptorAllocator::new(config.descriptor_table_capacity));

        engine_info!(log, SOURCE, "Vulkan device ready on '{}' (queue family {}, depth {:?}, {} descriptor slots)",
            adapter.name, adapter.queue_family, adapter.depth_stencil_format, config.descriptor_table_capacity);

        Ok(Self {
            queue: Queue::new(Arc::clone(&context)),
            descriptor_allocator,
            adapter_name: adapter.name,
            context,
            log,
        })
    }

    /// Whether validation layers will be enabled
    fn validation_requested(entry: &ash::Entry, config: &DeviceConfig, log: &LogSink) -> bool {
        if !config.enable_validation {
            return false;
        }

        #[cfg(feature = "vulkan-validation")]
        {
            let available = unsafe { entry.enumerate_instance_layer_properties() }
                .unwrap_or_default()
                .iter()
                .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
            if !available {
                engine_warn!(log, SOURCE, "Validation requested but {:?} is not installed", VALIDATION_LAYER);
            }
            available
        }

        #[cfg(not(feature = "vulkan-validation"))]
        {
            let _ = entry;
            engine_debug!(log, SOURCE, "Validation requested but the vulkan-validation feature is disabled");
            false
        }
    }

    fn create_instance(
        entry: &ash::Entry,
        display_handle: raw_window_handle::RawDisplayHandle,
        config: &DeviceConfig,
        validation: bool,
        log: &LogSink,
    ) -> Result<ash::Instance> {
        let app_name = CString::new(config.app_name.as_str()).map_err(|e| {
            engine_error!(log, SOURCE, "Invalid application name: {}", e);
            Error::InitializationFailed(format!("Invalid application name: {}", e))
        })?;
        let (major, minor, patch) = config.app_version;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(c"Ember Engine")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extension_names = ash_window::enumerate_required_extensions(display_handle)
            .map_err(|e| {
                engine_error!(log, SOURCE, "Failed to get required extensions: {}", e);
                Error::InitializationFailed(format!("Failed to get required extensions: {}", e))
            })?
            .to_vec();

        // Only ever true with the vulkan-validation feature
        let mut layer_names = Vec::new();
        if validation {
            extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            layer_names.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);

        unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
            engine_error!(log, SOURCE, "Failed to create Vulkan instance: {:?}", e);
            Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
        })
    }

    /// Pick the best Vulkan 1.3 adapter with a queue family that can both
    /// render and present to `window`
    ///
    /// Discrete GPUs are preferred over integrated ones.
    fn select_adapter(
        entry: &ash::Entry,
        instance: &ash::Instance,
        window: &dyn WindowSurface,
        log: &LogSink,
    ) -> Result<AdapterSelection> {
        let (display_handle, window_handle) = window.raw_handles()?;

        unsafe {
            // Temporary surface for queue selection
            let surface = ash_window::create_surface(entry, instance, display_handle, window_handle, None)
                .map_err(|e| {
                    engine_error!(log, SOURCE, "Failed to create surface: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
                })?;
            let surface_loader = ash::khr::surface::Instance::new(entry, instance);

            let physical_devices = instance.enumerate_physical_devices().unwrap_or_default();

            let mut best: Option<(u32, AdapterSelection)> = None;
            for physical_device in physical_devices {
                let properties = instance.get_physical_device_properties(physical_device);
                let name = properties
                    .device_name_as_c_str()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| "Unknown".to_string());

                if properties.api_version < vk::API_VERSION_1_3 {
                    engine_debug!(log, SOURCE, "Skipping '{}': Vulkan 1.3 not supported", name);
                    continue;
                }

                let queue_family = instance
                    .get_physical_device_queue_family_properties(physical_device)
                    .iter()
                    .enumerate()
                    .find(|(index, family)| {
                        family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                            && surface_loader
                                .get_physical_device_surface_support(physical_device, *index as u32, surface)
                                .unwrap_or(false)
                    })
                    .map(|(index, _)| index as u32);
                let Some(queue_family) = queue_family else {
                    engine_debug!(log, SOURCE, "Skipping '{}': no queue can render and present", name);
                    continue;
                };

                let depth_stencil_format = DEPTH_STENCIL_CANDIDATES.iter().copied().find(|&format| {
                    instance
                        .get_physical_device_format_properties(physical_device, format)
                        .optimal_tiling_features
                        .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
                });
                let Some(depth_stencil_format) = depth_stencil_format else {
                    engine_debug!(log, SOURCE, "Skipping '{}': no depth/stencil format", name);
                    continue;
                };

                let score = match properties.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 3,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
                    _ => 1,
                };
                if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
                    best = Some((score, AdapterSelection {
                        physical_device,
                        queue_family,
                        depth_stencil_format,
                        name,
                    }));
                }
            }

            // Destroy temporary surface
            surface_loader.destroy_surface(surface, None);

            best.map(|(_, adapter)| adapter).ok_or_else(|| {
                engine_error!(log, SOURCE, "No Vulkan 1.3 GPU can render to this window");
                Error::InitializationFailed("No suitable Vulkan-capable GPU found".to_string())
            })
        }
    }

    fn create_logical_device(
        instance: &ash::Instance,
        adapter: &AdapterSelection,
        log: &LogSink,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(adapter.queue_family)
            .queue_priorities(&queue_priorities)];

        let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];

        let mut features12 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_extension_names)
            .push_next(&mut features12)
            .push_next(&mut features13);

        unsafe { instance.create_device(adapter.physical_device, &device_create_info, None) }.map_err(|e| {
            engine_error!(log, SOURCE, "Failed to create logical device: {:?}", e);
            Error::InitializationFailed(format!("Failed to create device: {:?}", e))
        })
    }

    /// Name of the adapter the device runs on
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Live render-attachment view published under descriptor `slot`
    pub fn attachment_view(&self, slot: u32) -> Option<vk::ImageView> {
        self.context
            .attachment_views
            .lock()
            .ok()
            .and_then(|views| views.get(&slot).copied())
    }

    /// Block until the GPU is idle
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.context.device.device_wait_idle() }
            .map_err(|e| self.context.vk_error("vkDeviceWaitIdle", e))
    }

    /// Validation messages received so far, `None` when validation is off
    #[cfg(feature = "vulkan-validation")]
    pub fn validation_stats(&self) -> Option<ValidationStats> {
        self.context
            .debug
            .lock()
            .ok()
            .and_then(|debug| debug.as_ref().map(DebugMessenger::stats))
    }
}

impl GraphicsDevice for VulkanGraphicsDevice {
    type Image = Image;
    type View = View;
    type Queue = Queue;
    type Fence = Fence;
    type CommandAllocator = CommandAllocator;
    type CommandList = CommandList;
    type Swapchain = Swapchain;

    fn queue(&self) -> &Queue {
        &self.queue
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<Image> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::ResourceCreationFailed(format!("{}x{} image", desc.width, desc.height)));
        }
        let usage = usage_to_vk(desc.usage);
        if usage.is_empty() {
            return Err(Error::ResourceCreationFailed("image has no usage".to_string()));
        }
        let vk_format = if desc.format.is_depth() {
            self.context.depth_stencil_format
        } else {
            format_to_vk(desc.format)?
        };

        Image::new(
            Arc::clone(&self.context),
            desc.format,
            vk_format,
            usage,
            vk::Extent2D {
                width: desc.width,
                height: desc.height,
            },
        )
    }

    fn create_view(&self, image: &Image, _desc: &ImageDesc, slot: Option<u32>) -> Result<View> {
        View::new(Arc::clone(&self.context), image, slot)
    }

    fn create_fence(&self, initial_value: u64) -> Result<Fence> {
        Fence::new(Arc::clone(&self.context), initial_value)
    }

    fn create_command_allocator(&self) -> Result<CommandAllocator> {
        CommandAllocator::new(Arc::clone(&self.context))
    }

    fn create_command_list(&self, allocator: &CommandAllocator) -> Result<CommandList> {
        CommandList::new(Arc::clone(&self.context), allocator)
    }

    fn create_swapchain(
        &self,
        window: &dyn WindowSurface,
        buffer_count: u32,
        width: u32,
        height: u32,
    ) -> Result<Swapchain> {
        Swapchain::new(Arc::clone(&self.context), window, buffer_count, width, height)
    }

    fn descriptor_allocator(&self) -> &Mutex<DescriptorAllocator> {
        &self.descriptor_allocator
    }

    fn device_lost_reason(&self) -> Option<u32> {
        self.context.device_lost_reason()
    }
}

impl Drop for VulkanGraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            self.context.device.device_wait_idle().ok();
        }
        // Remaining objects keep the context alive until they are dropped
        engine_debug!(self.log, SOURCE, "Device released ({} outstanding references)",
            Arc::strong_count(&self.context) - 1);
    }
}
