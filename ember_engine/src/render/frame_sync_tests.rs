use super::*;
use crate::graphics_device::mock_graphics_device::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

fn init_sync(device: &MockGraphicsDevice, frames: u32) -> FrameSync<MockGraphicsDevice> {
    let mut sync = FrameSync::new(LogSink::default());
    sync.init(device, frames).unwrap();
    sync
}

// ============================================================================
// Init
// ============================================================================

#[test]
fn test_init_all_slots_zero() {
    let device = MockGraphicsDevice::new();
    for frames in 1..=4 {
        let sync = init_sync(&device, frames);
        assert_eq!(sync.frame_count(), frames);
        for i in 0..frames {
            assert_eq!(sync.fence_value(i), Some(0));
        }
        assert_eq!(sync.current_frame(), 0);
        assert!(sync.is_initialized());
    }
}

#[test]
fn test_wait_without_signal_returns_immediately() {
    let device = MockGraphicsDevice::new();
    device.set_defer_signals(true);
    let sync = init_sync(&device, 3);
    for i in 0..3 {
        sync.wait_for_frame(i).unwrap();
    }
}

#[test]
fn test_init_zero_frames_fails() {
    let device = MockGraphicsDevice::new();
    let mut sync = FrameSync::<MockGraphicsDevice>::new(LogSink::default());
    assert!(matches!(sync.init(&device, 0), Err(Error::InitializationFailed(_))));
    assert!(!sync.is_initialized());
}

// ============================================================================
// Signal / Wait
// ============================================================================

#[test]
fn test_signal_increases_slot_value() {
    let device = MockGraphicsDevice::new();
    let mut sync = init_sync(&device, 2);

    sync.signal(device.queue(), 0).unwrap();
    let first = sync.fence_value(0).unwrap();
    sync.signal(device.queue(), 0).unwrap();
    let second = sync.fence_value(0).unwrap();

    assert!(first > 0);
    assert!(second > first);
    assert_eq!(sync.fence_value(1), Some(0));
}

#[test]
fn test_slots_get_distinct_values() {
    let device = MockGraphicsDevice::new();
    let mut sync = init_sync(&device, 3);

    sync.signal(device.queue(), 0).unwrap();
    sync.signal(device.queue(), 1).unwrap();
    sync.signal(device.queue(), 2).unwrap();

    assert_eq!(sync.fence_value(0), Some(1));
    assert_eq!(sync.fence_value(1), Some(2));
    assert_eq!(sync.fence_value(2), Some(3));
}

#[test]
fn test_wait_blocks_until_gpu_completes() {
    let device = Arc::new(MockGraphicsDevice::new());
    device.set_defer_signals(true);
    let mut sync = init_sync(&device, 3);

    sync.signal(device.queue(), 1).unwrap();
    assert_eq!(sync.completed_value().unwrap(), 0);

    let completed = Arc::new(AtomicBool::new(false));
    let gpu = {
        let device = device.clone();
        let completed = completed.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            completed.store(true, Ordering::SeqCst);
            device.complete_pending_signals();
        })
    };

    sync.wait_for_frame(1).unwrap();
    assert!(completed.load(Ordering::SeqCst), "wait returned before the GPU completed");
    assert!(sync.completed_value().unwrap() >= sync.fence_value(1).unwrap());
    gpu.join().unwrap();
}

#[test]
fn test_wait_on_other_slot_not_satisfied_by_earlier_signal() {
    let device = MockGraphicsDevice::new();
    device.set_defer_signals(true);
    let mut sync = init_sync(&device, 2);

    sync.signal(device.queue(), 0).unwrap();
    device.complete_pending_signals();
    sync.signal(device.queue(), 1).unwrap();

    // Slot 0 is complete, slot 1 is still pending
    sync.wait_for_frame(0).unwrap();
    assert!(sync.completed_value().unwrap() < sync.fence_value(1).unwrap());

    device.complete_pending_signals();
    sync.wait_for_frame(1).unwrap();
}

#[test]
fn test_out_of_range_frame_rejected() {
    let device = MockGraphicsDevice::new();
    let mut sync = init_sync(&device, 2);
    assert!(matches!(sync.signal(device.queue(), 2), Err(Error::InvalidState(_))));
    assert!(matches!(sync.wait_for_frame(5), Err(Error::InvalidState(_))));
}

#[test]
fn test_signal_before_init_fails() {
    let device = MockGraphicsDevice::new();
    let mut sync = FrameSync::<MockGraphicsDevice>::new(LogSink::default());
    assert!(sync.signal(device.queue(), 0).is_err());
}

// ============================================================================
// Frame cursor
// ============================================================================

#[test]
fn test_advance_frame_wraps() {
    let device = MockGraphicsDevice::new();
    let mut sync = init_sync(&device, 3);

    let mut seen = Vec::new();
    for _ in 0..7 {
        seen.push(sync.current_frame());
        sync.advance_frame();
    }
    assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
}

#[test]
fn test_destroy_is_idempotent() {
    let device = MockGraphicsDevice::new();
    let mut sync = init_sync(&device, 2);
    sync.destroy();
    sync.destroy();
    assert!(!sync.is_initialized());
    assert_eq!(sync.frame_count(), 0);
    // Advancing an empty sync is a no-op
    sync.advance_frame();
    assert_eq!(sync.current_frame(), 0);
}
