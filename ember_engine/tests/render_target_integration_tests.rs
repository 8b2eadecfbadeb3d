//! Integration tests for RenderTarget and FrameLoop on the Vulkan backend
//!
//! All tests require a GPU and a display, and share one device and window
//! (see gpu_test_utils).
//!
//! Run with: cargo test --test render_target_integration_tests -- --ignored --test-threads=1


use ember_engine::ember::config::{FramePacing, RenderTargetConfig};
use ember_engine::ember::graphics_device::{GraphicsDevice, ImageState, Swapchain};
use ember_engine::ember::log::LogSink;
use ember_engine::ember::render::{
    ColorAttachmentInfo, DepthAttachmentInfo, FrameLoop, FrameState, RenderContext, RenderInfo,
    RenderOrchestrator, RenderPass, RenderTarget, RenderView, SharedRenderTarget,
};
use ember_engine::ember::{Error, Result};
use ember_engine_renderer_vulkan::VulkanGraphicsDevice;
use gpu_test_utils::{get_test_graphics_device, get_test_window};
use serial_test::serial;
use std::cell::Cell;
use std::rc::Rc;

// ============================================================================
// HELPERS
// ============================================================================

fn new_target(frames: u32, frame_pacing: FramePacing) -> RenderTarget<VulkanGraphicsDevice> {
    let config = RenderTargetConfig {
        frame_pacing,
        ..RenderTargetConfig::default()
    };
    let mut target = RenderTarget::new(get_test_graphics_device(), &get_test_window(), config, LogSink::default());
    target.init(frames).unwrap();
    target
}

/// Clear color and depth of the current frame of `target`
fn clear_pass(
    ctx: &mut RenderContext<VulkanGraphicsDevice>,
    target: &SharedRenderTarget<VulkanGraphicsDevice>,
) -> Result<()> {
    let info = {
        let target = target.borrow();
        let frame = ctx.frame_number();
        let color = target
            .color_buffer(frame)
            .ok_or_else(|| Error::InvalidState(format!("no color buffer for frame {}", frame)))?;
        let depth = target
            .depth_buffer(frame)
            .ok_or_else(|| Error::InvalidState(format!("no depth buffer for frame {}", frame)))?;
        let extent = target.extent();
        RenderInfo {
            view: RenderView::from_extent(extent.x, extent.y),
            color: vec![ColorAttachmentInfo {
                clear: [0.1, 0.2, 0.3, 1.0],
                ..ColorAttachmentInfo::new(color)
            }],
            depth: Some(DepthAttachmentInfo::new(depth)),
        }
    };

    ctx.begin_recording(&info)?;
    ctx.end_recording(&info)
}

// ============================================================================
// INITIALIZATION TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_render_target_init_creates_frame_resources() {
    let target = new_target(3, FramePacing::Throttled);

    assert!(target.is_functional());
    assert_eq!(target.max_frames_in_flight(), 3);
    assert_eq!(target.current_frame(), 0);

    let swapchain = target.swapchain().unwrap();
    assert_eq!(swapchain.buffer_count(), 3);
    assert_eq!(target.extent(), target.window_extent().unwrap());

    for frame in 0..3 {
        let color = target.image(target.color_buffer(frame).unwrap()).unwrap();
        assert!(color.is_wrapped());
        assert!(color.descriptor_slot().is_some());
        assert_eq!(color.state(), ImageState::Undefined);

        let depth = target.image(target.depth_buffer(frame).unwrap()).unwrap();
        assert!(!depth.is_wrapped());
        assert!(depth.view().is_some());

        assert!(target.command_list(frame).is_some());
        assert_eq!(target.frame_state(frame), Some(FrameState::Idle));
    }
    assert!(target.color_buffer(3).is_none());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_render_target_color_slots_are_published() {
    let device = get_test_graphics_device();
    let target = new_target(2, FramePacing::Throttled);

    for frame in 0..2 {
        let color = target.image(target.color_buffer(frame).unwrap()).unwrap();
        let slot = color.descriptor_slot().unwrap();
        assert!(device.attachment_view(slot).is_some());
    }
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_render_target_init_zero_frames_fails() {
    let mut target = RenderTarget::new(
        get_test_graphics_device(),
        &get_test_window(),
        RenderTargetConfig::default(),
        LogSink::default(),
    );

    let result = target.init(0);

    assert!(result.is_err());
    assert!(!target.is_functional());
}

// ============================================================================
// FRAME TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_render_target_single_frame_lifecycle() {
    let mut target = new_target(3, FramePacing::Throttled);

    target.start_rendering(0).unwrap();
    assert_eq!(target.frame_state(0), Some(FrameState::Recording));
    let color_key = target.color_buffer(0).unwrap();
    let depth_key = target.depth_buffer(0).unwrap();
    assert_eq!(target.image(color_key).unwrap().state(), ImageState::Color);
    assert_eq!(target.image(depth_key).unwrap().state(), ImageState::DepthStencil);

    target.end_rendering(0).unwrap();
    assert_eq!(target.frame_state(0), Some(FrameState::Closed));
    assert_eq!(target.image(color_key).unwrap().state(), ImageState::Present);

    target.submit_rendering(0).unwrap();
    assert_eq!(target.frame_state(0), Some(FrameState::Submitted));
    assert_eq!(target.current_frame(), 1);
    assert!(target.fence_value(0).unwrap() > 0);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_render_target_submit_before_end_fails() {
    let mut target = new_target(2, FramePacing::Throttled);

    target.start_rendering(0).unwrap();
    let result = target.submit_rendering(0);

    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert!(target.is_functional());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_frame_loop_renders_many_frames() {
    let target = new_target(3, FramePacing::Overlapped).into_shared();
    let calls = Rc::new(Cell::new(0u32));

    let mut orchestrator = RenderOrchestrator::new(LogSink::default());
    let counter = calls.clone();
    orchestrator
        .new_pass(
            "clear",
            RenderPass::new(vec![target.clone()], move |ctx, target| {
                counter.set(counter.get() + 1);
                clear_pass(ctx, target)
            }),
        )
        .unwrap();

    let mut frame_loop = FrameLoop::new(3, LogSink::default());
    frame_loop.add_target(target.clone()).unwrap();
    let mut ctx = RenderContext::new(LogSink::default());

    for _ in 0..10 {
        frame_loop.render_frame(&mut orchestrator, &mut ctx).unwrap();
    }

    assert_eq!(calls.get(), 10);
    assert_eq!(frame_loop.frame_count(), 10);
    assert_eq!(frame_loop.frame_index(), 10 % 3);

    let target = target.borrow();
    assert!(target.is_functional());
    for frame in 0..3 {
        assert_eq!(target.frame_state(frame), Some(FrameState::Submitted));
    }
}

// ============================================================================
// RESIZE AND CLEANUP TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_render_target_resize_rebuilds_buffers() {
    let mut target = new_target(2, FramePacing::Throttled);
    let old_color = target.color_buffer(0).unwrap();

    target.resize(320, 240).unwrap();

    assert!(target.is_functional());
    assert_eq!(target.extent().x, 320);
    assert_eq!(target.extent().y, 240);
    assert!(target.image(old_color).is_none());
    let color = target.image(target.color_buffer(0).unwrap()).unwrap();
    assert_eq!(color.desc().width, 320);
    assert_eq!(color.desc().height, 240);

    // The window kept its size, so the next frame resizes back
    assert!(target.out_of_date().unwrap());
    target.start_rendering(0).unwrap();
    assert_eq!(target.extent(), target.window_extent().unwrap());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_render_target_resize_to_zero_fails() {
    let mut target = new_target(2, FramePacing::Throttled);

    let result = target.resize(0, 240);

    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert!(target.is_functional());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_render_target_cleanup_releases_everything() {
    let device = get_test_graphics_device();
    let in_use = device.descriptor_allocator().lock().unwrap().len();

    let mut target = new_target(3, FramePacing::Throttled);
    target.start_rendering(0).unwrap();
    target.end_rendering(0).unwrap();
    target.submit_rendering(0).unwrap();

    target.cleanup();

    assert!(!target.is_functional());
    assert!(target.swapchain().is_none());
    assert!(target.color_buffer(0).is_none());
    assert_eq!(device.descriptor_allocator().lock().unwrap().len(), in_use);

    // Cleanup is idempotent and the target can be initialized again
    target.cleanup();
    target.init(2).unwrap();
    assert!(target.is_functional());
}
