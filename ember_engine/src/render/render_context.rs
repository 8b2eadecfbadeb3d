/// RenderContext - records recording scopes into the active frame of a render target

use slotmap::SlotMap;

use crate::error::{Error, Result};
use crate::graphics_device::{CommandList, GraphicsDevice};
use crate::log::LogSink;
use crate::render::{
    AttachmentInfo, ClearValue, ImageBuffer, ImageKey, LoadOp, RenderInfo, SharedRenderTarget, StoreOp,
};
use crate::engine_error;

const SOURCE: &str = "ember::RenderContext";

/// Recording front-end handed to pass callbacks
///
/// Bound to one render target at a time and to the frame slot set with
/// `set_frame_number`. Each `begin_recording` opens a render scope on that
/// slot's command list; `end_recording` applies the store ops and closes it.
/// A frame may contain any number of scopes.
pub struct RenderContext<D: GraphicsDevice> {
    log: LogSink,
    frame_number: u32,
    target: Option<SharedRenderTarget<D>>,
}

impl<D: GraphicsDevice> RenderContext<D> {
    pub fn new(log: LogSink) -> Self {
        Self {
            log,
            frame_number: 0,
            target: None,
        }
    }

    /// Frame slot recorded into
    pub fn set_frame_number(&mut self, frame_number: u32) {
        self.frame_number = frame_number;
    }

    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// Bind the context to `target`
    pub fn set_render_target(&mut self, target: &SharedRenderTarget<D>) {
        self.target = Some(target.clone());
    }

    /// Target the context is bound to
    pub fn render_target(&self) -> Option<&SharedRenderTarget<D>> {
        self.target.as_ref()
    }

    /// Open a render scope described by `info`
    ///
    /// Sets viewport and scissor, binds every resolvable attachment (colors
    /// in list order) and records the clears of attachments whose load op
    /// is `Clear`. An attachment whose image cannot be resolved is reported
    /// and left out.
    pub fn begin_recording(&mut self, info: &RenderInfo) -> Result<()> {
        let target = self.bound_target()?;
        let mut target = target.try_borrow_mut().map_err(|_| {
            self.log.report(SOURCE, Error::InvalidState("render target is already borrowed".to_string()))
        })?;
        let (images, cmd) = target.recording_parts(self.frame_number)?;

        cmd.set_viewport(&info.view.viewport)?;
        cmd.set_scissor(&info.view.scissor.to_rect())?;

        let colors: Vec<Option<&D::View>> = info
            .color
            .iter()
            .map(|attachment| self.resolve_view(images, attachment))
            .collect();
        let depth = info
            .depth
            .as_ref()
            .and_then(|attachment| self.resolve_view(images, attachment));

        let bound: Vec<&D::View> = colors.iter().flatten().copied().collect();
        if !bound.is_empty() || depth.is_some() {
            cmd.set_render_targets(&bound, depth)?;
        }

        for (attachment, view) in info.color.iter().zip(&colors) {
            if let Some(view) = view {
                Self::apply_load_op(cmd, attachment, view)?;
            }
        }
        if let (Some(attachment), Some(view)) = (&info.depth, depth) {
            Self::apply_load_op(cmd, attachment, view)?;
        }
        Ok(())
    }

    /// Apply the store ops of `info` and close the render scope
    ///
    /// Attachments stored with `DontCare` get a discard hint. The scope is
    /// closed even when some attachments cannot be resolved; those are
    /// reported and skipped.
    pub fn end_recording(&mut self, info: &RenderInfo) -> Result<()> {
        let target = self.bound_target()?;
        let mut target = target.try_borrow_mut().map_err(|_| {
            self.log.report(SOURCE, Error::InvalidState("render target is already borrowed".to_string()))
        })?;
        let (images, cmd) = target.recording_parts(self.frame_number)?;

        let mut result: Result<()> = Ok(());
        for attachment in &info.color {
            result = result.and(self.apply_store_op(images, cmd, attachment));
        }
        if let Some(attachment) = &info.depth {
            result = result.and(self.apply_store_op(images, cmd, attachment));
        }

        // The scope must not stay open, whatever happened above
        let closed = cmd.close_render_scope();
        result.and(closed)
    }

    fn bound_target(&self) -> Result<SharedRenderTarget<D>> {
        self.target.clone().ok_or_else(|| {
            self.log.report(SOURCE, Error::InvalidState("no render target bound".to_string()))
        })
    }

    fn resolve_image<'a, C: ClearValue>(
        &self,
        images: &'a SlotMap<ImageKey, ImageBuffer<D>>,
        attachment: &AttachmentInfo<C>,
    ) -> Option<&'a ImageBuffer<D>> {
        let image = images.get(attachment.image).filter(|image| image.is_live());
        if image.is_none() {
            engine_error!(self.log, SOURCE, "Cannot resolve {} attachment {:?}, skipping it",
                C::ROLE, attachment.image);
        }
        image
    }

    fn resolve_view<'a, C: ClearValue>(
        &self,
        images: &'a SlotMap<ImageKey, ImageBuffer<D>>,
        attachment: &AttachmentInfo<C>,
    ) -> Option<&'a D::View> {
        let image = self.resolve_image(images, attachment)?;
        let view = image.view();
        if view.is_none() {
            engine_error!(self.log, SOURCE, "{} attachment {:?} has no attachment view, skipping it",
                C::ROLE, attachment.image);
        }
        view
    }

    fn apply_load_op<C: ClearValue>(
        cmd: &mut D::CommandList,
        attachment: &AttachmentInfo<C>,
        view: &D::View,
    ) -> Result<()> {
        match attachment.load_op {
            LoadOp::Clear => attachment.clear.record_clear::<D>(cmd, view),
            LoadOp::Load | LoadOp::DontCare => Ok(()),
        }
    }

    fn apply_store_op<C: ClearValue>(
        &self,
        images: &SlotMap<ImageKey, ImageBuffer<D>>,
        cmd: &mut D::CommandList,
        attachment: &AttachmentInfo<C>,
    ) -> Result<()> {
        let Some(image) = self.resolve_image(images, attachment) else {
            return Ok(());
        };
        match (attachment.store_op, image.image()) {
            (StoreOp::DontCare, Some(resource)) => cmd.discard(resource),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "render_context_tests.rs"]
mod tests;
