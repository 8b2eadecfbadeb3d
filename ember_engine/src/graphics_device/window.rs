/// WindowSurface trait - what the engine observes of a window

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use winit::window::Window;

use crate::error::{Error, Result};

/// Window capability consumed by render targets
///
/// Render targets only hold a weak reference to it. The size is queried on
/// every staleness check; the native handles are used once, at swapchain
/// creation.
pub trait WindowSurface {
    /// Stable identifier of the window
    fn id(&self) -> u64;

    /// Current client width in pixels
    fn width(&self) -> u32;

    /// Current client height in pixels
    fn height(&self) -> u32;

    /// Whether the user asked to close the window
    fn close_requested(&self) -> bool;

    /// Native display and window handles
    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)>;
}

/// `WindowSurface` over a winit window
///
/// The event loop owns the close flag: call `request_close` when it
/// receives `WindowEvent::CloseRequested`.
pub struct WinitWindow {
    window: Arc<Window>,
    close_requested: AtomicBool,
}

impl WinitWindow {
    /// Wrap a winit window
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            close_requested: AtomicBool::new(false),
        }
    }

    /// Mark the window as closing
    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::Release);
    }

    /// The wrapped winit window
    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }
}

impl WindowSurface for WinitWindow {
    fn id(&self) -> u64 {
        u64::from(self.window.id())
    }

    fn width(&self) -> u32 {
        self.window.inner_size().width
    }

    fn height(&self) -> u32 {
        self.window.inner_size().height
    }

    fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| Error::InitializationFailed(format!("Failed to get display handle: {}", e)))?;
        let window = self
            .window
            .window_handle()
            .map_err(|e| Error::InitializationFailed(format!("Failed to get window handle: {}", e)))?;
        Ok((display.as_raw(), window.as_raw()))
    }
}
