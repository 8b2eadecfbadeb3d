/// FrameLoop - drives start, pass execution, end and submit for every target

use crate::error::{Error, Result};
use crate::graphics_device::GraphicsDevice;
use crate::log::LogSink;
use crate::render::{RenderContext, RenderOrchestrator, SharedRenderTarget};
use crate::{engine_debug, engine_error, engine_trace, engine_warn};

const SOURCE: &str = "ember::FrameLoop";

/// Per-frame driver owning the authoritative frame index
///
/// Every registered target must have the same number of frames in flight.
/// The frame index cycles modulo that number.
pub struct FrameLoop<D: GraphicsDevice> {
    log: LogSink,
    targets: Vec<SharedRenderTarget<D>>,
    frames_in_flight: u32,
    frame_index: u32,
    frame_count: u64,
}

impl<D: GraphicsDevice> FrameLoop<D> {
    /// Create a driver cycling over `frames_in_flight` slots
    pub fn new(frames_in_flight: u32, log: LogSink) -> Self {
        Self {
            log,
            targets: Vec::new(),
            frames_in_flight: frames_in_flight.max(1),
            frame_index: 0,
            frame_count: 0,
        }
    }

    /// Register a target
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` if the target was initialized with a different
    /// number of frames in flight.
    pub fn add_target(&mut self, target: SharedRenderTarget<D>) -> Result<()> {
        let frames = target.borrow().max_frames_in_flight();
        if frames != self.frames_in_flight {
            return Err(self.log.report(
                SOURCE,
                Error::InvalidState(format!(
                    "target has {} frames in flight, frame loop cycles over {}",
                    frames, self.frames_in_flight
                )),
            ));
        }
        self.targets.push(target);
        Ok(())
    }

    pub fn targets(&self) -> &[SharedRenderTarget<D>] {
        &self.targets
    }

    /// Frame slot the next `render_frame` records into
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Number of frames rendered so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Render one frame on every target that can render
    ///
    /// Targets that are non-functional, minimized or whose window is gone
    /// are skipped. Every started target is ended and submitted even if a
    /// pass fails; the first error is returned after that.
    pub fn render_frame(
        &mut self,
        orchestrator: &mut RenderOrchestrator<D>,
        ctx: &mut RenderContext<D>,
    ) -> Result<()> {
        let frame = self.frame_index;
        let mut started = Vec::with_capacity(self.targets.len());

        for (index, target) in self.targets.iter().enumerate() {
            if self.start_target(index, target, frame) {
                started.push(target.clone());
            }
        }

        ctx.set_frame_number(frame);
        let mut result = orchestrator.execute(ctx);

        for target in &started {
            let mut target = target.borrow_mut();
            let finished = target
                .end_rendering(frame)
                .and_then(|()| target.submit_rendering(frame));
            if let Err(e) = finished {
                engine_error!(self.log, SOURCE, "Frame {} could not be submitted: {}", frame, e);
                result = result.and(Err(e));
            }
        }

        self.frame_index = (self.frame_index + 1) % self.frames_in_flight;
        self.frame_count += 1;
        engine_trace!(self.log, SOURCE, "Frame {} done, next slot {}", frame, self.frame_index);
        result
    }

    fn start_target(&self, index: usize, target: &SharedRenderTarget<D>, frame: u32) -> bool {
        let mut target = target.borrow_mut();
        if !target.is_functional() {
            engine_warn!(self.log, SOURCE, "Target {} is not functional, skipping it", index);
            return false;
        }
        if target.close_requested() {
            engine_debug!(self.log, SOURCE, "Window of target {} is closing, skipping it", index);
            return false;
        }
        match target.window_extent() {
            Ok(extent) if extent.x == 0 || extent.y == 0 => {
                engine_trace!(self.log, SOURCE, "Target {} is minimized, skipping it", index);
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                engine_warn!(self.log, SOURCE, "Target {} unavailable: {}", index, e);
                return false;
            }
        }
        match target.start_rendering(frame) {
            Ok(()) => true,
            Err(e) => {
                engine_warn!(self.log, SOURCE, "Target {} could not start frame {}: {}", index, frame, e);
                false
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "frame_loop_tests.rs"]
mod tests;
