/// FrameSync - CPU/GPU synchronization for frames in flight

use crate::error::{Error, Result};
use crate::graphics_device::{CommandQueue, Fence, GraphicsDevice};
use crate::log::LogSink;
use crate::{engine_debug, engine_error, engine_trace};

const SOURCE: &str = "ember::FrameSync";

/// One fence plus one target value per frame slot
///
/// `signal` stores a fresh fence value for a slot and asks the queue to
/// reach it once the slot's work is done; `wait_for_frame` blocks until the
/// fence has reached that value. Values come from a single counter shared
/// by all slots, so a slot's value only increases and waiting on one slot
/// never returns early because another slot was signaled.
pub struct FrameSync<D: GraphicsDevice> {
    log: LogSink,
    fence: Option<D::Fence>,
    fence_values: Vec<u64>,
    last_signaled: u64,
    current_frame: u32,
}

impl<D: GraphicsDevice> FrameSync<D> {
    /// Create an uninitialized frame sync
    pub fn new(log: LogSink) -> Self {
        Self {
            log,
            fence: None,
            fence_values: Vec::new(),
            last_signaled: 0,
            current_frame: 0,
        }
    }

    /// Create the fence and `frame_count` slots, all at 0
    ///
    /// # Errors
    ///
    /// Returns an error if the fence cannot be created or `frame_count` is 0.
    pub fn init(&mut self, device: &D, frame_count: u32) -> Result<()> {
        if frame_count == 0 {
            return Err(self.log.report(
                SOURCE,
                Error::InitializationFailed("frame count must be at least 1".to_string()),
            ));
        }

        let fence = device.create_fence(0).map_err(|e| {
            let e = device.check_device_lost(e);
            engine_error!(self.log, SOURCE, "Failed to create fence: {}", e);
            e
        })?;

        self.fence = Some(fence);
        self.fence_values = vec![0; frame_count as usize];
        self.last_signaled = 0;
        self.current_frame = 0;
        engine_debug!(self.log, SOURCE, "Initialized with {} frame slots", frame_count);
        Ok(())
    }

    /// Enqueue a fence signal marking the end of `frame_index`'s submitted work
    pub fn signal(&mut self, queue: &D::Queue, frame_index: u32) -> Result<()> {
        let slot = self.slot(frame_index)?;
        let fence = self.fence.as_ref().ok_or_else(|| {
            self.log.report(SOURCE, Error::InvalidState("signal before init".to_string()))
        })?;

        let value = self.last_signaled + 1;
        queue.signal(fence, value).map_err(|e| {
            engine_error!(self.log, SOURCE, "Failed to signal frame {}: {}", frame_index, e);
            e
        })?;

        self.last_signaled = value;
        self.fence_values[slot] = value;
        engine_trace!(self.log, SOURCE, "Frame {} signaled with value {}", frame_index, value);
        Ok(())
    }

    /// Block until all work signaled for `frame_index` has completed
    ///
    /// Returns immediately if the slot was never signaled or is already done.
    pub fn wait_for_frame(&self, frame_index: u32) -> Result<()> {
        let slot = self.slot(frame_index)?;
        let target = self.fence_values[slot];
        if target == 0 {
            return Ok(());
        }
        let fence = self.fence.as_ref().ok_or_else(|| {
            self.log.report(SOURCE, Error::InvalidState("wait before init".to_string()))
        })?;

        if fence.completed_value()? >= target {
            return Ok(());
        }
        engine_trace!(self.log, SOURCE, "Waiting for frame {} (value {})", frame_index, target);
        fence.wait_for_value(target).map_err(|e| {
            engine_error!(self.log, SOURCE, "Failed to wait for frame {}: {}", frame_index, e);
            e
        })
    }

    /// Block until every slot has completed
    pub fn wait_all(&self) -> Result<()> {
        for frame_index in 0..self.frame_count() {
            self.wait_for_frame(frame_index)?;
        }
        Ok(())
    }

    /// Move the frame cursor to the next slot
    pub fn advance_frame(&mut self) {
        if !self.fence_values.is_empty() {
            self.current_frame = (self.current_frame + 1) % self.frame_count();
        }
    }

    /// Release the fence and the slots
    ///
    /// Safe to call when not initialized.
    pub fn destroy(&mut self) {
        self.fence = None;
        self.fence_values.clear();
        self.current_frame = 0;
    }

    /// Frame cursor
    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    /// Number of slots
    pub fn frame_count(&self) -> u32 {
        self.fence_values.len() as u32
    }

    /// Target value of `frame_index`, or `None` if out of range
    pub fn fence_value(&self, frame_index: u32) -> Option<u64> {
        self.fence_values.get(frame_index as usize).copied()
    }

    /// Value the GPU has reached
    pub fn completed_value(&self) -> Result<u64> {
        match &self.fence {
            Some(fence) => fence.completed_value(),
            None => Ok(0),
        }
    }

    /// Whether `init` succeeded and `destroy` has not been called since
    pub fn is_initialized(&self) -> bool {
        self.fence.is_some()
    }

    fn slot(&self, frame_index: u32) -> Result<usize> {
        let slot = frame_index as usize;
        if slot >= self.fence_values.len() {
            return Err(self.log.report(
                SOURCE,
                Error::InvalidState(format!(
                    "frame index {} out of range (frame count: {})",
                    frame_index,
                    self.fence_values.len()
                )),
            ));
        }
        Ok(slot)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "frame_sync_tests.rs"]
mod tests;
