/// Vulkan Debug Messenger - routes validation layer messages to the engine log
///
/// Only compiled with the `vulkan-validation` feature. Each message is
/// forwarded to the `LogSink` of the device that installed the messenger,
/// under the source `ember::vulkan::validation`, and counted per severity.

use ash::vk;
use ember_engine::ember::{Error, Result};
use ember_engine::ember::log::{LogSeverity, LogSink};
use ember_engine::engine_error;
use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicU32, Ordering};

const SOURCE: &str = "ember::vulkan::validation";

/// Number of validation messages received, per severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    /// Total number of messages received
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// State reachable from the callback through `p_user_data`
struct CallbackState {
    log: LogSink,
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl CallbackState {
    fn record(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> LogSeverity {
        if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            self.errors.fetch_add(1, Ordering::Relaxed);
            LogSeverity::Error
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            self.warnings.fetch_add(1, Ordering::Relaxed);
            LogSeverity::Warn
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            self.info.fetch_add(1, Ordering::Relaxed);
            LogSeverity::Debug
        } else {
            self.verbose.fetch_add(1, Ordering::Relaxed);
            LogSeverity::Trace
        }
    }

    fn stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }
}

/// Installed debug messenger
///
/// The callback state is boxed so its address stays stable for the
/// lifetime of the messenger.
pub(crate) struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    state: Box<CallbackState>,
}

impl DebugMessenger {
    /// Install a messenger on `instance` reporting to `log`
    pub(crate) fn new(entry: &ash::Entry, instance: &ash::Instance, log: &LogSink) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let state = Box::new(CallbackState {
            log: log.clone(),
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        });

        // Skip severities the sink would drop anyway
        let mut severity_flags = vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING;
        if log.enabled(LogSeverity::Debug) {
            severity_flags |= vk::DebugUtilsMessageSeverityFlagsEXT::INFO;
        }
        if log.enabled(LogSeverity::Trace) {
            severity_flags |= vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE;
        }

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(severity_flags)
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback))
            .user_data(&*state as *const CallbackState as *mut c_void);

        let messenger = unsafe { loader.create_debug_utils_messenger(&debug_info, None) }.map_err(|e| {
            engine_error!(log, SOURCE, "Failed to create debug messenger: {:?}", e);
            Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
        })?;

        Ok(Self { loader, messenger, state })
    }

    /// Messages received so far
    pub(crate) fn stats(&self) -> ValidationStats {
        self.state.stats()
    }

    /// Destroy the messenger; must run before the instance is destroyed
    pub(crate) unsafe fn destroy(self) {
        self.loader.destroy_debug_utils_messenger(self.messenger, None);
        let stats = self.state.stats();
        if stats.errors > 0 || stats.warnings > 0 {
            self.state.log.log(
                LogSeverity::Warn,
                SOURCE,
                format!("Validation summary: {} errors, {} warnings", stats.errors, stats.warnings),
            );
        }
    }
}

/// Vulkan debug callback
unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_user_data.is_null() || p_callback_data.is_null() {
        return vk::FALSE;
    }
    let state = &*(p_user_data as *const CallbackState);
    let callback_data = &*p_callback_data;

    let message_id_name = if callback_data.p_message_id_name.is_null() {
        "Unknown"
    } else {
        CStr::from_ptr(callback_data.p_message_id_name)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };
    let message = if callback_data.p_message.is_null() {
        "No message"
    } else {
        CStr::from_ptr(callback_data.p_message)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };

    let severity = state.record(message_severity);
    state.log.log(
        severity,
        SOURCE,
        format!("[{:?}] {}: {}", message_type, message_id_name, message),
    );

    // Never abort the call that triggered the message
    vk::FALSE
}
