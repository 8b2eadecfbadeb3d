/// Render module - frame resources, synchronization and pass orchestration

pub mod image_buffer;
pub mod frame_sync;
pub mod render_info;
pub mod render_target;
pub mod render_context;
pub mod render_orchestrator;
pub mod frame_loop;

pub use image_buffer::ImageBuffer;
pub use frame_sync::FrameSync;
pub use render_info::{
    AttachmentInfo, ClearColor, ClearDepthStencil, ClearValue, ColorAttachmentInfo,
    DepthAttachmentInfo, LoadOp, RenderInfo, RenderView, StoreOp,
};
pub use render_target::{FrameState, ImageKey, RenderTarget, SharedRenderTarget};
pub use render_context::RenderContext;
pub use render_orchestrator::{PassCallback, RenderOrchestrator, RenderPass};
pub use frame_loop::FrameLoop;
