//! Configuration for devices and render targets

use crate::graphics_device::ImageFormat;

/// Default number of slots in a device's render-attachment descriptor table
pub const DEFAULT_DESCRIPTOR_TABLE_CAPACITY: u32 = 64;

/// Default number of frames in flight
pub const DEFAULT_FRAMES_IN_FLIGHT: u32 = 3;

/// Graphics device configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Enable validation/debug layers (only honored with the backend's validation feature)
    pub enable_validation: bool,
    /// Application name
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),
    /// Capacity of the render-attachment descriptor table
    pub descriptor_table_capacity: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            app_name: "Ember Application".to_string(),
            app_version: (1, 0, 0),
            descriptor_table_capacity: DEFAULT_DESCRIPTOR_TABLE_CAPACITY,
        }
    }
}

/// When the CPU waits for a submitted frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePacing {
    /// Wait for the slot right after submitting it. CPU and GPU run in lockstep.
    #[default]
    Throttled,
    /// Wait for a slot only right before its resources are reused,
    /// letting up to N frames overlap on the GPU.
    Overlapped,
}

/// Render target configuration
#[derive(Debug, Clone)]
pub struct RenderTargetConfig {
    /// Format of the per-frame depth buffers
    pub depth_format: ImageFormat,
    /// Submission pacing policy
    pub frame_pacing: FramePacing,
}

impl Default for RenderTargetConfig {
    fn default() -> Self {
        Self {
            depth_format: ImageFormat::Depth24Stencil8,
            frame_pacing: FramePacing::Throttled,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
