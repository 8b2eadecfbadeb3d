/*!
# Ember Engine

Core of the Ember rendering backend: per-frame GPU resources, CPU/GPU frame
synchronization and pass orchestration over render targets.

The engine is generic over one `GraphicsDevice` implementation chosen at
compile time (static polymorphism). The Vulkan backend lives in the
`ember_engine_renderer_vulkan` crate.

## Architecture

- **ImageBuffer**: one GPU image, its attachment view and its usage state
- **FrameSync**: one fence and a completion value per frame in flight
- **RenderTarget**: swapchain plus per-frame color/depth images and command lists
- **RenderContext**: records begin/end scopes described by a `RenderInfo`
- **RenderOrchestrator**: named passes executed in registration order
- **FrameLoop**: start, execute, end and submit for every target, once per frame

Logging goes through an explicit `LogSink` handed to every constructor.
*/

// Internal modules
mod error;
pub mod log;
pub mod config;
pub mod graphics_device;
pub mod render;

// Main ember namespace module
pub mod ember {
    // Error types
    pub use crate::error::{Error, Result};

    // Logging sub-module
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, LogSink, Logger};
    }

    // Configuration
    pub mod config {
        pub use crate::config::*;
    }

    // Capability traits implemented by backends
    pub mod graphics_device {
        pub use crate::graphics_device::*;
    }

    // Frame resources and orchestration
    pub mod render {
        pub use crate::render::*;
    }
}

// Re-export math library at crate root
pub use glam;
