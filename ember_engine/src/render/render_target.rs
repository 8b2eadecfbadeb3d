/// RenderTarget - swapchain, per-frame images and recording buffers of one window

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Weak};

use glam::UVec2;
use slotmap::{new_key_type, SlotMap};

use crate::config::{FramePacing, RenderTargetConfig};
use crate::error::{Error, Result};
use crate::graphics_device::{
    CommandAllocator, CommandList, CommandQueue, GraphicsDevice, ImageDesc, ImageState, Swapchain,
    WindowSurface,
};
use crate::log::LogSink;
use crate::render::{FrameSync, ImageBuffer};
use crate::{engine_debug, engine_error, engine_info, engine_trace, engine_warn};

const SOURCE: &str = "ember::RenderTarget";

new_key_type! {
    /// Handle to an image owned by a render target
    ///
    /// Keys are invalidated when the target recreates its images (resize,
    /// re-init). Resolving a stale key fails instead of reaching a
    /// destroyed image.
    pub struct ImageKey;
}

/// Render target shared between the frame loop, the passes and the context
pub type SharedRenderTarget<D> = Rc<RefCell<RenderTarget<D>>>;

/// Progress of one frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    /// Nothing recorded since the last submission
    #[default]
    Idle,
    /// `start_rendering` was called, commands may be recorded
    Recording,
    /// `end_rendering` was called, the slot is ready to submit
    Closed,
    /// Submitted to the GPU and presented
    Submitted,
}

/// Swapchain plus every per-frame-in-flight object of one window
///
/// For each of the N frame slots the target owns one color image (wrapping
/// swapchain backing buffer i), one depth image, one command allocator and
/// one command list. All N-sized collections are created and destroyed
/// together.
///
/// A frame slot goes through `start_rendering`, any number of recording
/// scopes through a `RenderContext`, `end_rendering`, then
/// `submit_rendering`. The target only holds a weak reference to its
/// window; once the window is gone every operation fails with
/// `Error::WindowClosed`.
pub struct RenderTarget<D: GraphicsDevice> {
    device: Arc<D>,
    window: Weak<dyn WindowSurface>,
    config: RenderTargetConfig,
    log: LogSink,
    sync: FrameSync<D>,
    swapchain: Option<D::Swapchain>,
    images: SlotMap<ImageKey, ImageBuffer<D>>,
    color_buffers: Vec<ImageKey>,
    depth_buffers: Vec<ImageKey>,
    command_allocators: Vec<D::CommandAllocator>,
    command_lists: Vec<D::CommandList>,
    frame_states: Vec<FrameState>,
    // Color and depth states at the last start_rendering, per slot
    start_states: Vec<(ImageState, ImageState)>,
    max_frames_in_flight: u32,
    functional: bool,
}

impl<D: GraphicsDevice> RenderTarget<D> {
    /// Create an uninitialized render target for `window`
    ///
    /// Nothing is allocated until `init`.
    pub fn new<W: WindowSurface + 'static>(
        device: Arc<D>,
        window: &Arc<W>,
        config: RenderTargetConfig,
        log: LogSink,
    ) -> Self {
        let window: Weak<W> = Arc::downgrade(window);
        let window: Weak<dyn WindowSurface> = window;
        Self {
            device,
            window,
            config,
            sync: FrameSync::new(log.clone()),
            log,
            swapchain: None,
            images: SlotMap::with_key(),
            color_buffers: Vec::new(),
            depth_buffers: Vec::new(),
            command_allocators: Vec::new(),
            command_lists: Vec::new(),
            frame_states: Vec::new(),
            start_states: Vec::new(),
            max_frames_in_flight: 0,
            functional: false,
        }
    }

    /// Wrap the target for sharing with passes and the frame loop
    pub fn into_shared(self) -> SharedRenderTarget<D> {
        Rc::new(RefCell::new(self))
    }

    /// Create the frame sync, the swapchain, then every per-frame object
    ///
    /// Anything held from a previous initialization is released first.
    /// On failure, objects created by earlier steps are kept until
    /// `cleanup` (or drop) and the target stays non-functional.
    ///
    /// # Arguments
    ///
    /// * `max_frames_in_flight` - Number of frame slots N (at least 1)
    pub fn init(&mut self, max_frames_in_flight: u32) -> Result<()> {
        self.cleanup();

        if max_frames_in_flight == 0 {
            return Err(self.log.report(
                SOURCE,
                Error::InitializationFailed("at least one frame in flight is required".to_string()),
            ));
        }
        let window = self.upgrade_window()?;
        self.max_frames_in_flight = max_frames_in_flight;

        self.sync.init(&self.device, max_frames_in_flight)?;

        let (width, height) = (window.width(), window.height());
        let swapchain = self
            .device
            .create_swapchain(&*window, max_frames_in_flight, width, height)
            .map_err(|e| {
                let e = self.device.check_device_lost(e);
                engine_error!(self.log, SOURCE, "Failed to create {}x{} swapchain: {}", width, height, e);
                e
            })?;
        self.swapchain = Some(swapchain);

        self.create_frame_resources()?;
        self.functional = true;
        engine_info!(self.log, SOURCE, "Render target initialized: {}x{}, {} frames in flight",
            width, height, max_frames_in_flight);
        Ok(())
    }

    /// Whether the swapchain no longer matches the window size
    ///
    /// Always false before `init`.
    pub fn out_of_date(&self) -> Result<bool> {
        let window = self.upgrade_window()?;
        Ok(match &self.swapchain {
            Some(swapchain) => swapchain.width() != window.width() || swapchain.height() != window.height(),
            None => false,
        })
    }

    /// Rebuild every size-dependent object at `width` x `height`
    ///
    /// Blocks until all frame slots have completed on the GPU. If the
    /// swapchain itself cannot be resized, dependent objects are not
    /// recreated and the target becomes non-functional until `init`.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.check_functional()?;
        if width == 0 || height == 0 {
            return Err(self.log.report(
                SOURCE,
                Error::InvalidState(format!("cannot resize to {}x{}", width, height)),
            ));
        }

        self.sync.wait_all()?;
        self.destroy_frame_resources();

        let resized = match self.swapchain.as_mut() {
            Some(swapchain) => swapchain.resize_buffers(self.max_frames_in_flight, width, height),
            None => Err(Error::InvalidState("render target has no swapchain".to_string())),
        };
        if let Err(e) = resized {
            let e = self.device.check_device_lost(e);
            self.functional = false;
            engine_error!(self.log, SOURCE,
                "Swapchain resize to {}x{} failed, target is no longer functional: {}", width, height, e);
            return Err(e);
        }

        if let Err(e) = self.create_frame_resources() {
            self.functional = false;
            engine_error!(self.log, SOURCE, "Failed to recreate frame resources after resize: {}", e);
            return Err(e);
        }

        engine_info!(self.log, SOURCE, "Resized to {}x{}", width, height);
        Ok(())
    }

    /// Open frame slot `index` for recording
    ///
    /// Resizes first if the window size changed, then waits until the
    /// slot's previous GPU work is done. Any commands recorded into the
    /// slot but not submitted are discarded. Leaves the color buffer in
    /// `Color` and the depth buffer in `DepthStencil`.
    pub fn start_rendering(&mut self, index: u32) -> Result<()> {
        let slot = self.check_frame(index)?;

        if self.out_of_date()? {
            let window = self.upgrade_window()?;
            engine_debug!(self.log, SOURCE, "Swapchain out of date, resizing to {}x{}",
                window.width(), window.height());
            self.resize(window.width(), window.height())?;
        }

        self.sync.wait_for_frame(index)?;

        let color_key = self.color_buffers[slot];
        let depth_key = self.depth_buffers[slot];

        if matches!(self.frame_states[slot], FrameState::Recording | FrameState::Closed) {
            // The barriers recorded since the last start never reach the GPU
            engine_warn!(self.log, SOURCE, "Frame {} restarted before submission, discarding its commands", index);
            let (color_state, depth_state) = self.start_states[slot];
            if let Some(color) = self.images.get_mut(color_key) {
                color.restore_state(color_state);
            }
            if let Some(depth) = self.images.get_mut(depth_key) {
                depth.restore_state(depth_state);
            }
        }

        self.command_allocators[slot].reset().map_err(|e| {
            let e = self.device.check_device_lost(e);
            engine_error!(self.log, SOURCE, "Failed to reset command allocator {}: {}", index, e);
            e
        })?;
        let cmd = &mut self.command_lists[slot];
        cmd.reset(&self.command_allocators[slot]).map_err(|e| {
            engine_error!(self.log, SOURCE, "Failed to reset command list {}: {}", index, e);
            e
        })?;

        let color = self.images.get_mut(color_key).ok_or_else(|| {
            self.log.report(SOURCE, Error::InvalidResource(format!("color buffer {} missing", index)))
        })?;
        let color_state = color.state();
        color.transition(cmd, ImageState::Color)?;

        let depth = self.images.get_mut(depth_key).ok_or_else(|| {
            self.log.report(SOURCE, Error::InvalidResource(format!("depth buffer {} missing", index)))
        })?;
        let depth_state = depth.state();
        // Depth images are not swapchain-owned and keep their state across frames
        if depth_state != ImageState::DepthStencil {
            depth.transition(cmd, ImageState::DepthStencil)?;
        }

        self.start_states[slot] = (color_state, depth_state);
        self.frame_states[slot] = FrameState::Recording;
        engine_trace!(self.log, SOURCE, "Frame {} recording", index);
        Ok(())
    }

    /// Move the color buffer to `Present` and close the command list
    pub fn end_rendering(&mut self, index: u32) -> Result<()> {
        let slot = self.check_frame(index)?;
        self.expect_state(slot, FrameState::Recording, "end rendering")?;

        let cmd = &mut self.command_lists[slot];
        let color = self.images.get_mut(self.color_buffers[slot]).ok_or_else(|| {
            self.log.report(SOURCE, Error::InvalidResource(format!("color buffer {} missing", index)))
        })?;
        color.transition(cmd, ImageState::Present)?;
        cmd.close().map_err(|e| {
            engine_error!(self.log, SOURCE, "Failed to close command list {}: {}", index, e);
            e
        })?;

        self.frame_states[slot] = FrameState::Closed;
        Ok(())
    }

    /// Submit, present and signal frame slot `index`
    ///
    /// With `FramePacing::Throttled` this also blocks until the GPU has
    /// finished the slot. Once the command list is executed the slot is
    /// signaled and the frame cursor advances, even if present fails.
    pub fn submit_rendering(&mut self, index: u32) -> Result<()> {
        let slot = self.check_frame(index)?;
        self.expect_state(slot, FrameState::Closed, "submit")?;

        let executed = self.device.queue().execute(&[&self.command_lists[slot]]);
        if let Err(e) = executed {
            return Err(self.submission_failed(e, "submit", index));
        }
        // The commands are on the queue now and can no longer be discarded
        self.frame_states[slot] = FrameState::Submitted;

        let presented = match self.swapchain.as_mut() {
            Some(swapchain) => swapchain.present(index),
            None => Err(Error::InvalidState("render target has no swapchain".to_string())),
        };

        // Signaled whatever present returned
        let signaled = self.sync.signal(self.device.queue(), index);
        if let Err(e) = signaled {
            // Nothing guards the slot's in-flight work anymore
            self.functional = false;
            return Err(self.submission_failed(e, "signal", index));
        }

        if self.config.frame_pacing == FramePacing::Throttled {
            self.sync.wait_for_frame(index)?;
        }
        self.sync.advance_frame();

        if let Err(e) = presented {
            return Err(self.submission_failed(e, "present", index));
        }
        engine_trace!(self.log, SOURCE, "Frame {} submitted", index);
        Ok(())
    }

    /// Release everything, in dependency order
    ///
    /// Waits for in-flight frames first. Safe to call any number of times.
    pub fn cleanup(&mut self) {
        if self.sync.is_initialized() {
            if let Err(e) = self.sync.wait_all() {
                engine_warn!(self.log, SOURCE, "Releasing frame resources without GPU completion: {}", e);
            }
        }
        self.destroy_frame_resources();
        self.swapchain = None;
        self.sync.destroy();
        self.functional = false;
    }

    /// Color image of frame slot `index`
    pub fn color_buffer(&self, index: u32) -> Option<ImageKey> {
        self.color_buffers.get(index as usize).copied()
    }

    /// Depth image of frame slot `index`
    pub fn depth_buffer(&self, index: u32) -> Option<ImageKey> {
        self.depth_buffers.get(index as usize).copied()
    }

    /// Image behind `key`, if the key is still valid
    pub fn image(&self, key: ImageKey) -> Option<&ImageBuffer<D>> {
        self.images.get(key)
    }

    /// Command list of frame slot `index`
    pub fn command_list(&self, index: u32) -> Option<&D::CommandList> {
        self.command_lists.get(index as usize)
    }

    /// Command allocator of frame slot `index`
    pub fn command_allocator(&self, index: u32) -> Option<&D::CommandAllocator> {
        self.command_allocators.get(index as usize)
    }

    /// Swapchain, if initialized
    pub fn swapchain(&self) -> Option<&D::Swapchain> {
        self.swapchain.as_ref()
    }

    /// Progress of frame slot `index`
    pub fn frame_state(&self, index: u32) -> Option<FrameState> {
        self.frame_states.get(index as usize).copied()
    }

    /// Fence value frame slot `index` must reach before reuse
    pub fn fence_value(&self, index: u32) -> Option<u64> {
        self.sync.fence_value(index)
    }

    /// Frame cursor kept by the frame sync
    pub fn current_frame(&self) -> u32 {
        self.sync.current_frame()
    }

    /// Whether the target can render
    ///
    /// False before `init`, after `cleanup`, after a failed resize and
    /// after a device loss.
    pub fn is_functional(&self) -> bool {
        self.functional
    }

    /// Number of frame slots
    pub fn max_frames_in_flight(&self) -> u32 {
        self.max_frames_in_flight
    }

    /// Size of the swapchain buffers, zero before `init`
    pub fn extent(&self) -> UVec2 {
        match &self.swapchain {
            Some(swapchain) => UVec2::new(swapchain.width(), swapchain.height()),
            None => UVec2::ZERO,
        }
    }

    /// Current size of the window
    pub fn window_extent(&self) -> Result<UVec2> {
        let window = self.upgrade_window()?;
        Ok(UVec2::new(window.width(), window.height()))
    }

    /// Whether the window is gone or asked to close
    pub fn close_requested(&self) -> bool {
        match self.window.upgrade() {
            Some(window) => window.close_requested(),
            None => true,
        }
    }

    pub fn config(&self) -> &RenderTargetConfig {
        &self.config
    }

    /// Images and command list of a slot that is recording
    pub(crate) fn recording_parts(
        &mut self,
        index: u32,
    ) -> Result<(&SlotMap<ImageKey, ImageBuffer<D>>, &mut D::CommandList)> {
        let slot = self.check_frame(index)?;
        self.expect_state(slot, FrameState::Recording, "record")?;
        Ok((&self.images, &mut self.command_lists[slot]))
    }

    fn create_frame_resources(&mut self) -> Result<()> {
        let swapchain = self.swapchain.as_ref().ok_or_else(|| {
            self.log.report(SOURCE, Error::InvalidState("render target has no swapchain".to_string()))
        })?;
        let (width, height, format) = (swapchain.width(), swapchain.height(), swapchain.format());
        let count = self.max_frames_in_flight;

        for index in 0..count {
            let backing = swapchain.backing_image(index).map_err(|e| {
                engine_error!(self.log, SOURCE, "Failed to get swapchain buffer {}: {}", index, e);
                e
            })?;
            let mut color = ImageBuffer::new(
                self.device.clone(),
                ImageDesc::swapchain_color(width, height, format),
                self.log.clone(),
            );
            color.wrap(backing).map_err(|e| {
                engine_error!(self.log, SOURCE, "Failed to wrap color buffer {}: {}", index, e);
                e
            })?;
            self.color_buffers.push(self.images.insert(color));

            let mut depth = ImageBuffer::new(
                self.device.clone(),
                ImageDesc::depth(width, height, self.config.depth_format),
                self.log.clone(),
            );
            depth.create().map_err(|e| {
                engine_error!(self.log, SOURCE, "Failed to create depth buffer {}: {}", index, e);
                e
            })?;
            self.depth_buffers.push(self.images.insert(depth));
        }

        for index in 0..count {
            let allocator = self.device.create_command_allocator().map_err(|e| {
                let e = self.device.check_device_lost(e);
                engine_error!(self.log, SOURCE, "Failed to create command allocator {}: {}", index, e);
                e
            })?;
            self.command_allocators.push(allocator);
        }

        for (index, allocator) in self.command_allocators.iter().enumerate() {
            let list = self.device.create_command_list(allocator).map_err(|e| {
                let e = self.device.check_device_lost(e);
                engine_error!(self.log, SOURCE, "Failed to create command list {}: {}", index, e);
                e
            })?;
            self.command_lists.push(list);
        }

        self.frame_states = vec![FrameState::Idle; count as usize];
        self.start_states = vec![(ImageState::Undefined, ImageState::Undefined); count as usize];
        Ok(())
    }

    fn destroy_frame_resources(&mut self) {
        self.command_lists.clear();
        self.command_allocators.clear();
        self.color_buffers.clear();
        self.depth_buffers.clear();
        self.images.clear();
        self.frame_states.clear();
        self.start_states.clear();
    }

    fn submission_failed(&mut self, error: Error, step: &str, index: u32) -> Error {
        let error = self.device.check_device_lost(error);
        if error.is_device_lost() {
            self.functional = false;
        }
        engine_error!(self.log, SOURCE, "Frame {} {} failed: {}", index, step, error);
        error
    }

    fn upgrade_window(&self) -> Result<Arc<dyn WindowSurface>> {
        self.window.upgrade().ok_or_else(|| self.log.report(SOURCE, Error::WindowClosed))
    }

    fn check_functional(&self) -> Result<()> {
        if self.functional {
            Ok(())
        } else {
            Err(self.log.report(
                SOURCE,
                Error::TargetNotFunctional("render target is not initialized or failed".to_string()),
            ))
        }
    }

    fn check_frame(&self, index: u32) -> Result<usize> {
        self.check_functional()?;
        if index >= self.max_frames_in_flight {
            return Err(self.log.report(
                SOURCE,
                Error::InvalidState(format!(
                    "frame index {} out of range (frames in flight: {})",
                    index, self.max_frames_in_flight
                )),
            ));
        }
        Ok(index as usize)
    }

    fn expect_state(&self, slot: usize, expected: FrameState, action: &str) -> Result<()> {
        let actual = self.frame_states[slot];
        if actual != expected {
            return Err(self.log.report(
                SOURCE,
                Error::InvalidState(format!(
                    "cannot {} frame {}: slot is {:?}, expected {:?}",
                    action, slot, actual, expected
                )),
            ));
        }
        Ok(())
    }
}

impl<D: GraphicsDevice> Drop for RenderTarget<D> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "render_target_tests.rs"]
mod tests;
