//! Error types for the Ember engine
//!
//! This module defines the error types used throughout the engine:
//! resource creation, descriptor table exhaustion, device loss,
//! pass registration and frame-slot misuse.

use std::fmt;

/// Result type for Ember engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ember engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan call failure, poisoned lock, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (unresolvable image reference, dead handle, etc.)
    InvalidResource(String),

    /// Initialization failed (device, swapchain, render target)
    InitializationFailed(String),

    /// A factory call failed while creating a GPU object
    ResourceCreationFailed(String),

    /// The descriptor table has no free slot left
    DescriptorExhausted {
        /// Capacity of the exhausted table
        capacity: u32,
    },

    /// The device was removed or lost; `reason` is the backend reason code
    DeviceLost {
        /// Backend-specific removal reason
        reason: u32,
    },

    /// A render pass with this name is already registered
    DuplicatePassName(String),

    /// An operation was called in a state that does not allow it
    InvalidState(String),

    /// The window observed by a render target no longer exists
    WindowClosed,

    /// The render target failed a resize and must be re-initialized
    TargetNotFunctional(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::ResourceCreationFailed(msg) => write!(f, "Resource creation failed: {}", msg),
            Error::DescriptorExhausted { capacity } => {
                write!(f, "Descriptor table exhausted (capacity: {})", capacity)
            }
            Error::DeviceLost { reason } => write!(f, "Device lost (reason: 0x{:08X})", reason),
            Error::DuplicatePassName(name) => write!(f, "Render pass '{}' already exists", name),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::WindowClosed => write!(f, "Window is closed"),
            Error::TargetNotFunctional(msg) => write!(f, "Render target not functional: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Whether this error means the device must be recreated by the caller
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Error::DeviceLost { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
