use super::*;

#[test]
fn test_attachment_defaults() {
    let color = ColorAttachmentInfo::default();
    assert_eq!(color.load_op, LoadOp::Clear);
    assert_eq!(color.store_op, StoreOp::Store);
    assert_eq!(color.clear, [0.0, 0.0, 0.0, 1.0]);

    let depth = DepthAttachmentInfo::default();
    assert_eq!(depth.load_op, LoadOp::Clear);
    assert_eq!(depth.store_op, StoreOp::Store);
    assert_eq!(depth.clear.depth, 1.0);
    assert_eq!(depth.clear.stencil, 0);
}

#[test]
fn test_attachment_new_keeps_defaults() {
    let key = ImageKey::default();
    let color = ColorAttachmentInfo::new(key);
    assert_eq!(color.image, key);
    assert_eq!(color.clear, <ClearColor as ClearValue>::default_clear());
}

#[test]
fn test_render_view_from_extent() {
    let view = RenderView::from_extent(800, 600);
    assert_eq!(view.viewport.width, 800.0);
    assert_eq!(view.viewport.height, 600.0);
    assert_eq!(view.viewport.min_depth, 0.0);
    assert_eq!(view.viewport.max_depth, 1.0);

    let rect = view.scissor.to_rect();
    assert_eq!((rect.left, rect.top, rect.right, rect.bottom), (0, 0, 800, 600));
}

#[test]
fn test_scissor_rect_is_origin_plus_size() {
    let scissor = Scissor { x: 10, y: 20, width: 100, height: 50 };
    let rect = scissor.to_rect();
    assert_eq!(rect.left, 10);
    assert_eq!(rect.top, 20);
    assert_eq!(rect.right, 110);
    assert_eq!(rect.bottom, 70);
}

#[test]
fn test_render_info_default_is_empty() {
    let info = RenderInfo::default();
    assert!(info.color.is_empty());
    assert!(info.depth.is_none());
}

#[test]
fn test_clear_roles() {
    assert_eq!(<ClearColor as ClearValue>::ROLE, "color");
    assert_eq!(<ClearDepthStencil as ClearValue>::ROLE, "depth");
}
