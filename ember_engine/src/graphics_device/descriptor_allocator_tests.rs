use super::*;

// ============================================================================
// Basic allocation tests
// ============================================================================

#[test]
fn test_sequential_allocate() {
    let mut table = DescriptorAllocator::new(4);
    assert_eq!(table.allocate(), Some(0));
    assert_eq!(table.allocate(), Some(1));
    assert_eq!(table.allocate(), Some(2));
    assert_eq!(table.len(), 3);
}

#[test]
fn test_new_is_empty() {
    let table = DescriptorAllocator::new(8);
    assert!(table.is_empty());
    assert_eq!(table.len(), 0);
    assert_eq!(table.capacity(), 8);
    assert_eq!(table.high_water_mark(), 0);
    assert!(!table.is_exhausted());
}

#[test]
fn test_default_capacity_is_64() {
    let table = DescriptorAllocator::default();
    assert_eq!(table.capacity(), 64);
}

// ============================================================================
// Exhaustion tests
// ============================================================================

#[test]
fn test_capacity_two_exhausts_then_recycles() {
    let mut table = DescriptorAllocator::new(2);
    let a = table.allocate().unwrap();
    let b = table.allocate().unwrap();
    assert_ne!(a, b);

    assert!(table.is_exhausted());
    assert_eq!(table.allocate(), None);

    table.free(a);
    assert_eq!(table.allocate(), Some(a));
}

#[test]
fn test_zero_capacity_always_exhausted() {
    let mut table = DescriptorAllocator::new(0);
    assert!(table.is_exhausted());
    assert_eq!(table.allocate(), None);
    assert!(table.is_empty());
}

#[test]
fn test_failed_allocate_does_not_change_len() {
    let mut table = DescriptorAllocator::new(1);
    table.allocate().unwrap();
    assert_eq!(table.allocate(), None);
    assert_eq!(table.len(), 1);
}

// ============================================================================
// Free and recycle tests
// ============================================================================

#[test]
fn test_free_multiple_recycle_lifo() {
    let mut table = DescriptorAllocator::new(8);
    let a = table.allocate().unwrap(); // 0
    let _b = table.allocate().unwrap(); // 1
    let c = table.allocate().unwrap(); // 2
    table.free(a); // free list: [0]
    table.free(c); // free list: [0, 2]

    assert_eq!(table.allocate(), Some(2));
    assert_eq!(table.allocate(), Some(0));
    assert_eq!(table.allocate(), Some(3));
}

#[test]
fn test_free_all_becomes_empty() {
    let mut table = DescriptorAllocator::new(3);
    let slots: Vec<u32> = (0..3).filter_map(|_| table.allocate()).collect();
    for slot in slots {
        table.free(slot);
    }
    assert!(table.is_empty());
    assert_eq!(table.high_water_mark(), 3);
    assert!(!table.is_exhausted());
}
