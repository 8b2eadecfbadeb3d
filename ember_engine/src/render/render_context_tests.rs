use super::*;
use crate::config::RenderTargetConfig;
use crate::graphics_device::mock_graphics_device::*;
use crate::graphics_device::{Scissor, Viewport};
use crate::render::{ClearDepthStencil, ColorAttachmentInfo, DepthAttachmentInfo, RenderTarget, RenderView};
use std::sync::Arc;

struct Fixture {
    _device: Arc<MockGraphicsDevice>,
    _window: Arc<MockWindow>,
    target: SharedRenderTarget<MockGraphicsDevice>,
}

fn started_target() -> Fixture {
    let device = Arc::new(MockGraphicsDevice::new());
    let window = MockWindow::new(320, 240);
    let mut target = RenderTarget::new(device.clone(), &window, RenderTargetConfig::default(), LogSink::default());
    target.init(2).unwrap();
    target.start_rendering(0).unwrap();
    Fixture {
        _device: device,
        _window: window,
        target: target.into_shared(),
    }
}

fn bound_context(fixture: &Fixture, log: LogSink) -> RenderContext<MockGraphicsDevice> {
    let mut ctx = RenderContext::new(log);
    ctx.set_frame_number(0);
    ctx.set_render_target(&fixture.target);
    ctx
}

/// Commands recorded in slot 0, barriers excluded
fn recorded(fixture: &Fixture) -> Vec<MockCommand> {
    fixture
        .target
        .borrow()
        .command_list(0)
        .unwrap()
        .commands
        .iter()
        .filter(|c| !matches!(c, MockCommand::Barrier { .. }))
        .cloned()
        .collect()
}

fn view_id(fixture: &Fixture, key: ImageKey) -> u64 {
    fixture.target.borrow().image(key).unwrap().view().unwrap().id
}

fn image_id(fixture: &Fixture, key: ImageKey) -> u64 {
    fixture.target.borrow().image(key).unwrap().image().unwrap().id
}

fn keys(fixture: &Fixture) -> (ImageKey, ImageKey, ImageKey) {
    let target = fixture.target.borrow();
    (
        target.color_buffer(0).unwrap(),
        target.color_buffer(1).unwrap(),
        target.depth_buffer(0).unwrap(),
    )
}

// ============================================================================
// BeginRecording
// ============================================================================

#[test]
fn test_begin_sets_viewport_and_scissor() {
    let fixture = started_target();
    let mut ctx = bound_context(&fixture, LogSink::default());
    let viewport = Viewport {
        x: 5.0,
        y: 6.0,
        width: 100.0,
        height: 50.0,
        ..Viewport::default()
    };
    let info = RenderInfo {
        view: RenderView {
            viewport,
            scissor: Scissor { x: 10, y: 20, width: 100, height: 50 },
        },
        ..RenderInfo::default()
    };

    ctx.begin_recording(&info).unwrap();

    let rect = crate::graphics_device::ScissorRect { left: 10, top: 20, right: 110, bottom: 70 };
    assert_eq!(recorded(&fixture), vec![MockCommand::SetViewport(viewport), MockCommand::SetScissor(rect)]);
}

#[test]
fn test_begin_binds_in_order_and_applies_load_ops() {
    let fixture = started_target();
    let (color_a, color_b, depth) = keys(&fixture);
    let mut ctx = bound_context(&fixture, LogSink::default());

    let info = RenderInfo {
        view: RenderView::from_extent(320, 240),
        color: vec![
            ColorAttachmentInfo {
                clear: [1.0, 0.0, 0.0, 1.0],
                ..ColorAttachmentInfo::new(color_a)
            },
            ColorAttachmentInfo {
                load_op: LoadOp::Load,
                ..ColorAttachmentInfo::new(color_b)
            },
        ],
        depth: Some(DepthAttachmentInfo {
            clear: ClearDepthStencil { depth: 0.5, stencil: 7 },
            ..DepthAttachmentInfo::new(depth)
        }),
    };

    ctx.begin_recording(&info).unwrap();

    let (view_a, view_b, view_d) = (view_id(&fixture, color_a), view_id(&fixture, color_b), view_id(&fixture, depth));
    let commands = recorded(&fixture);
    assert_eq!(
        commands[2..],
        [
            MockCommand::SetRenderTargets { colors: vec![view_a, view_b], depth: Some(view_d) },
            MockCommand::ClearColor { view: view_a, color: [1.0, 0.0, 0.0, 1.0] },
            MockCommand::ClearDepthStencil { view: view_d, depth: 0.5, stencil: 7 },
        ]
    );
}

#[test]
fn test_begin_dont_care_and_load_emit_no_clear() {
    let fixture = started_target();
    let (color, _, depth) = keys(&fixture);
    let mut ctx = bound_context(&fixture, LogSink::default());

    let info = RenderInfo {
        view: RenderView::from_extent(320, 240),
        color: vec![ColorAttachmentInfo {
            load_op: LoadOp::DontCare,
            ..ColorAttachmentInfo::new(color)
        }],
        depth: Some(DepthAttachmentInfo {
            load_op: LoadOp::Load,
            ..DepthAttachmentInfo::new(depth)
        }),
    };

    ctx.begin_recording(&info).unwrap();

    let clears = recorded(&fixture)
        .into_iter()
        .filter(|c| matches!(c, MockCommand::ClearColor { .. } | MockCommand::ClearDepthStencil { .. }))
        .count();
    assert_eq!(clears, 0);
}

#[test]
fn test_begin_skips_unresolved_attachment() {
    let fixture = started_target();
    let (color, _, depth) = keys(&fixture);
    let (log, entries) = capture_sink();
    let mut ctx = bound_context(&fixture, log);

    let info = RenderInfo {
        view: RenderView::from_extent(320, 240),
        color: vec![ColorAttachmentInfo::new(ImageKey::default()), ColorAttachmentInfo::new(color)],
        depth: Some(DepthAttachmentInfo::new(depth)),
    };

    ctx.begin_recording(&info).unwrap();

    let view_c = view_id(&fixture, color);
    let view_d = view_id(&fixture, depth);
    let commands = recorded(&fixture);
    assert_eq!(
        commands[2],
        MockCommand::SetRenderTargets { colors: vec![view_c], depth: Some(view_d) }
    );
    assert_eq!(error_count(&entries), 1);
}

#[test]
fn test_begin_without_target_fails() {
    let mut ctx = RenderContext::<MockGraphicsDevice>::new(LogSink::default());
    assert!(matches!(ctx.begin_recording(&RenderInfo::default()), Err(Error::InvalidState(_))));
}

#[test]
fn test_begin_on_idle_slot_fails() {
    let fixture = started_target();
    let mut ctx = bound_context(&fixture, LogSink::default());
    ctx.set_frame_number(1);
    assert!(matches!(ctx.begin_recording(&RenderInfo::default()), Err(Error::InvalidState(_))));

    ctx.set_frame_number(9);
    assert!(matches!(ctx.begin_recording(&RenderInfo::default()), Err(Error::InvalidState(_))));
}

// ============================================================================
// EndRecording
// ============================================================================

#[test]
fn test_end_discards_dont_care_color_then_depth() {
    let fixture = started_target();
    let (color, _, depth) = keys(&fixture);
    let mut ctx = bound_context(&fixture, LogSink::default());
    let info = RenderInfo {
        view: RenderView::from_extent(320, 240),
        color: vec![ColorAttachmentInfo {
            store_op: StoreOp::DontCare,
            ..ColorAttachmentInfo::new(color)
        }],
        depth: Some(DepthAttachmentInfo {
            store_op: StoreOp::DontCare,
            ..DepthAttachmentInfo::new(depth)
        }),
    };

    ctx.begin_recording(&info).unwrap();
    let before = recorded(&fixture).len();
    ctx.end_recording(&info).unwrap();

    let commands = recorded(&fixture);
    assert_eq!(
        commands[before..],
        [
            MockCommand::Discard { image: image_id(&fixture, color) },
            MockCommand::Discard { image: image_id(&fixture, depth) },
            MockCommand::CloseRenderScope,
        ]
    );
}

#[test]
fn test_end_store_emits_nothing_but_close() {
    let fixture = started_target();
    let (color, _, depth) = keys(&fixture);
    let mut ctx = bound_context(&fixture, LogSink::default());
    let info = RenderInfo {
        view: RenderView::from_extent(320, 240),
        color: vec![ColorAttachmentInfo::new(color)],
        depth: Some(DepthAttachmentInfo::new(depth)),
    };

    ctx.begin_recording(&info).unwrap();
    let before = recorded(&fixture).len();
    ctx.end_recording(&info).unwrap();

    assert_eq!(recorded(&fixture)[before..], [MockCommand::CloseRenderScope]);
}

#[test]
fn test_end_closes_scope_when_attachment_unresolved() {
    let fixture = started_target();
    let (_, _, depth) = keys(&fixture);
    let (log, entries) = capture_sink();
    let mut ctx = bound_context(&fixture, log);
    let info = RenderInfo {
        view: RenderView::from_extent(320, 240),
        color: vec![ColorAttachmentInfo {
            store_op: StoreOp::DontCare,
            ..ColorAttachmentInfo::new(ImageKey::default())
        }],
        depth: Some(DepthAttachmentInfo {
            store_op: StoreOp::DontCare,
            ..DepthAttachmentInfo::new(depth)
        }),
    };

    ctx.end_recording(&info).unwrap();

    assert_eq!(
        recorded(&fixture),
        vec![
            MockCommand::Discard { image: image_id(&fixture, depth) },
            MockCommand::CloseRenderScope,
        ]
    );
    assert_eq!(error_count(&entries), 1);
}

#[test]
fn test_several_scopes_in_one_frame() {
    let fixture = started_target();
    let (color, _, _) = keys(&fixture);
    let mut ctx = bound_context(&fixture, LogSink::default());
    let info = RenderInfo {
        view: RenderView::from_extent(320, 240),
        color: vec![ColorAttachmentInfo::new(color)],
        depth: None,
    };

    for _ in 0..2 {
        ctx.begin_recording(&info).unwrap();
        ctx.end_recording(&info).unwrap();
    }
    fixture.target.borrow_mut().end_rendering(0).unwrap();
    fixture.target.borrow_mut().submit_rendering(0).unwrap();

    let scopes = recorded(&fixture)
        .into_iter()
        .filter(|c| *c == MockCommand::CloseRenderScope)
        .count();
    assert_eq!(scopes, 2);
    assert_eq!(recorded(&fixture).last(), Some(&MockCommand::Close));
}

#[test]
fn test_recording_while_target_borrowed_fails() {
    let fixture = started_target();
    let mut ctx = bound_context(&fixture, LogSink::default());
    let _guard = fixture.target.borrow();
    assert!(matches!(ctx.begin_recording(&RenderInfo::default()), Err(Error::InvalidState(_))));
}
