/// GraphicsDevice trait - resource factory, submission queue and device health

use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::graphics_device::{
    CommandAllocator, CommandList, DescriptorAllocator, ImageDesc, Swapchain, WindowSurface,
};

/// Main graphics device trait
///
/// Central factory for every GPU object the engine creates, plus access to
/// the submission queue and the shared descriptor table. Exactly one backend
/// implements it per build; the engine is generic over it.
///
/// GPU objects are released when dropped. Backends must keep whatever they
/// need for destruction inside the objects themselves.
pub trait GraphicsDevice: Sized + 'static {
    /// GPU image resource
    type Image;
    /// Render-attachment or depth/stencil view of an image
    type View;
    /// Command-submission queue
    type Queue: CommandQueue<Self>;
    /// CPU/GPU fence with a monotonically increasing completion counter
    type Fence: Fence;
    /// Command memory for one frame in flight
    type CommandAllocator: CommandAllocator;
    /// Recording buffer
    type CommandList: CommandList<Self>;
    /// Presentable surface
    type Swapchain: Swapchain<Self>;

    /// The queue every recording buffer is submitted to
    fn queue(&self) -> &Self::Queue;

    /// Create a GPU image matching `desc`
    fn create_image(&self, desc: &ImageDesc) -> Result<Self::Image>;

    /// Create the attachment view of `image`
    ///
    /// # Arguments
    ///
    /// * `image` - Image to view
    /// * `desc` - Descriptor of the image
    /// * `slot` - Descriptor table slot for render-attachment views, `None` for depth views
    fn create_view(&self, image: &Self::Image, desc: &ImageDesc, slot: Option<u32>) -> Result<Self::View>;

    /// Create a fence starting at `initial_value`
    fn create_fence(&self, initial_value: u64) -> Result<Self::Fence>;

    /// Create a command allocator
    fn create_command_allocator(&self) -> Result<Self::CommandAllocator>;

    /// Create a closed recording buffer bound to `allocator`
    fn create_command_list(&self, allocator: &Self::CommandAllocator) -> Result<Self::CommandList>;

    /// Create a swapchain for `window`
    ///
    /// # Arguments
    ///
    /// * `window` - Window providing the native surface handle
    /// * `buffer_count` - Number of backing buffers (one per frame in flight)
    /// * `width` - Buffer width in pixels
    /// * `height` - Buffer height in pixels
    fn create_swapchain(
        &self,
        window: &dyn WindowSurface,
        buffer_count: u32,
        width: u32,
        height: u32,
    ) -> Result<Self::Swapchain>;

    /// Shared render-attachment descriptor table
    fn descriptor_allocator(&self) -> &Mutex<DescriptorAllocator>;

    /// Removal reason code if the device has been lost
    fn device_lost_reason(&self) -> Option<u32>;

    /// Allocate a render-attachment descriptor slot
    ///
    /// # Errors
    ///
    /// `Error::DescriptorExhausted` when no slot is free.
    fn allocate_descriptor(&self) -> Result<u32> {
        let mut table = self
            .descriptor_allocator()
            .lock()
            .map_err(|_| Error::BackendError("Descriptor allocator lock poisoned".to_string()))?;
        let capacity = table.capacity();
        table.allocate().ok_or(Error::DescriptorExhausted { capacity })
    }

    /// Return a descriptor slot to the table
    fn free_descriptor(&self, slot: u32) {
        // A poisoned table is still structurally valid
        let mut table = match self.descriptor_allocator().lock() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };
        table.free(slot);
    }

    /// Replace `error` with `Error::DeviceLost` when the device is gone
    ///
    /// Called after any failed submission or creation call.
    fn check_device_lost(&self, error: Error) -> Error {
        match self.device_lost_reason() {
            Some(reason) => Error::DeviceLost { reason },
            None => error,
        }
    }
}

/// Command-submission queue
pub trait CommandQueue<D: GraphicsDevice> {
    /// Submit closed recording buffers, in order
    fn execute(&self, lists: &[&D::CommandList]) -> Result<()>;

    /// Enqueue a signal setting `fence` to `value` once prior work completes
    fn signal(&self, fence: &D::Fence, value: u64) -> Result<()>;
}

/// CPU/GPU synchronization fence
pub trait Fence {
    /// Last value the GPU has reached
    fn completed_value(&self) -> Result<u64>;

    /// Block the calling thread until the completed value reaches `value`
    ///
    /// Unbounded: there is no timeout.
    fn wait_for_value(&self, value: u64) -> Result<()>;
}
