/// ImageBuffer - one GPU image, its view and its current usage state

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{CommandList, GraphicsDevice, ImageDesc, ImageState};
use crate::log::LogSink;
use crate::{engine_error, engine_trace};

const SOURCE: &str = "ember::ImageBuffer";

/// A GPU image together with its attachment view and usage state
///
/// The image is either created from the descriptor (`create`) or adopted
/// from a swapchain backing buffer (`wrap`). Images with the
/// render-attachment usage hold one slot of the device's descriptor table
/// while live.
///
/// State changes go through `transition`, which records a barrier into the
/// command list supplied by the caller.
pub struct ImageBuffer<D: GraphicsDevice> {
    device: Arc<D>,
    log: LogSink,
    desc: ImageDesc,
    state: ImageState,
    // Field order matters: the view must be released before the image
    view: Option<D::View>,
    image: Option<D::Image>,
    descriptor_slot: Option<u32>,
    wrapped: bool,
}

impl<D: GraphicsDevice> ImageBuffer<D> {
    /// Create an empty image buffer; no GPU resource is allocated yet
    pub fn new(device: Arc<D>, desc: ImageDesc, log: LogSink) -> Self {
        Self {
            device,
            log,
            desc,
            state: ImageState::Undefined,
            view: None,
            image: None,
            descriptor_slot: None,
            wrapped: false,
        }
    }

    /// Allocate a GPU image matching the descriptor
    ///
    /// Images with the render-attachment usage also take a descriptor table
    /// slot. Depth images get a view without a slot.
    ///
    /// # Errors
    ///
    /// - `Error::ResourceCreationFailed` if a resource is already held or the factory fails
    /// - `Error::DescriptorExhausted` if the descriptor table is full (no resource is leaked)
    /// - `Error::DeviceLost` if the device was removed
    pub fn create(&mut self) -> Result<()> {
        if self.image.is_some() {
            return Err(self.log.report(
                SOURCE,
                Error::ResourceCreationFailed("image buffer already holds a live resource".to_string()),
            ));
        }

        let image = self.device.create_image(&self.desc).map_err(|e| {
            let e = self.device.check_device_lost(e);
            engine_error!(self.log, SOURCE, "Failed to create {}x{} {:?} image: {}",
                self.desc.width, self.desc.height, self.desc.format, e);
            e
        })?;

        self.attach(image, false)
    }

    /// Adopt an existing image, typically a swapchain backing buffer
    ///
    /// The image buffer does not own the memory of a wrapped image; it only
    /// owns the view and descriptor slot. State starts at `Undefined`.
    pub fn wrap(&mut self, image: D::Image) -> Result<()> {
        if self.image.is_some() {
            return Err(self.log.report(
                SOURCE,
                Error::ResourceCreationFailed("image buffer already holds a live resource".to_string()),
            ));
        }
        self.attach(image, true)
    }

    fn attach(&mut self, image: D::Image, wrapped: bool) -> Result<()> {
        let slot = if self.desc.needs_descriptor_slot() {
            // On failure `image` is dropped here, releasing the GPU resource
            Some(self.device.allocate_descriptor().map_err(|e| {
                engine_error!(self.log, SOURCE, "No descriptor slot for render attachment: {}", e);
                e
            })?)
        } else {
            None
        };

        let view = if self.desc.needs_view() {
            match self.device.create_view(&image, &self.desc, slot) {
                Ok(view) => Some(view),
                Err(e) => {
                    if let Some(slot) = slot {
                        self.device.free_descriptor(slot);
                    }
                    let e = self.device.check_device_lost(e);
                    engine_error!(self.log, SOURCE, "Failed to create image view: {}", e);
                    return Err(e);
                }
            }
        } else {
            None
        };

        self.image = Some(image);
        self.view = view;
        self.descriptor_slot = slot;
        self.state = ImageState::Undefined;
        self.wrapped = wrapped;
        engine_trace!(self.log, SOURCE, "{} {}x{} {:?} image (slot {:?})",
            if wrapped { "Wrapped" } else { "Created" },
            self.desc.width, self.desc.height, self.desc.format, slot);
        Ok(())
    }

    /// Move the image to `to`, recording a barrier into `cmd`
    ///
    /// Returns `Ok(false)` without recording anything if the image is
    /// already in `to`.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidState` if `to` is `Undefined`
    /// - `Error::InvalidResource` if no resource is held
    pub fn transition(&mut self, cmd: &mut D::CommandList, to: ImageState) -> Result<bool> {
        if to == ImageState::Undefined {
            return Err(self.log.report(
                SOURCE,
                Error::InvalidState(format!("cannot transition from {:?} to Undefined", self.state)),
            ));
        }
        if to == self.state {
            return Ok(false);
        }
        let image = self.image.as_ref().ok_or_else(|| {
            self.log.report(SOURCE, Error::InvalidResource("transition on a destroyed image".to_string()))
        })?;

        cmd.transition_barrier(image, self.state, to)?;
        self.state = to;
        Ok(true)
    }

    /// Overwrite the tracked state without recording a barrier
    ///
    /// Used when recorded barriers were discarded before submission.
    pub(crate) fn restore_state(&mut self, state: ImageState) {
        self.state = state;
    }

    /// Release the descriptor slot, the view and the GPU resource
    ///
    /// Safe to call when nothing is held.
    pub fn destroy(&mut self) {
        if let Some(slot) = self.descriptor_slot.take() {
            self.device.free_descriptor(slot);
        }
        self.view = None;
        self.image = None;
        self.state = ImageState::Undefined;
        self.wrapped = false;
    }

    /// Descriptor this buffer was built from
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    /// Current usage state
    pub fn state(&self) -> ImageState {
        self.state
    }

    /// GPU image, if live
    pub fn image(&self) -> Option<&D::Image> {
        self.image.as_ref()
    }

    /// Attachment view, if the usage needs one and the image is live
    pub fn view(&self) -> Option<&D::View> {
        self.view.as_ref()
    }

    /// Descriptor table slot held by this image
    pub fn descriptor_slot(&self) -> Option<u32> {
        self.descriptor_slot
    }

    /// Whether a GPU resource is currently held
    pub fn is_live(&self) -> bool {
        self.image.is_some()
    }

    /// Whether the image was adopted rather than created
    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }
}

impl<D: GraphicsDevice> Drop for ImageBuffer<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "image_buffer_tests.rs"]
mod tests;
