use crate::config::DEFAULT_DESCRIPTOR_TABLE_CAPACITY;

/// Allocates and recycles slots of a fixed-capacity descriptor table.
///
/// Owned by the graphics device and shared by every image that needs a
/// render-attachment view. Freed indices are recycled (LIFO) before new
/// indices are handed out; once `capacity` indices are live, allocation
/// fails until one is freed.
///
/// # Example
///
/// ```ignore
/// let mut table = DescriptorAllocator::new(2);
/// let a = table.allocate();  // Some(0)
/// let b = table.allocate();  // Some(1)
/// let c = table.allocate();  // None (exhausted)
/// table.free(0);
/// let d = table.allocate();  // Some(0) (recycled)
/// ```
#[derive(Debug)]
pub struct DescriptorAllocator {
    free_list: Vec<u32>,
    next_index: u32,
    capacity: u32,
    len: u32,
}

impl DescriptorAllocator {
    /// Create an empty allocator over `capacity` slots
    pub fn new(capacity: u32) -> Self {
        Self {
            free_list: Vec::new(),
            next_index: 0,
            capacity,
            len: 0,
        }
    }

    /// Allocate a slot index, or `None` if the table is exhausted
    pub fn allocate(&mut self) -> Option<u32> {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None if self.next_index < self.capacity => {
                let index = self.next_index;
                self.next_index += 1;
                index
            }
            None => return None,
        };
        self.len += 1;
        Some(index)
    }

    /// Return a slot index to the table
    ///
    /// The index must currently be allocated. Double frees are not tracked.
    pub fn free(&mut self, index: u32) {
        debug_assert!(index < self.next_index, "freeing an unallocated descriptor slot: {}", index);
        self.len = self.len.saturating_sub(1);
        self.free_list.push(index);
    }

    /// Total number of slots in the table
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of currently allocated slots
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Whether no slots are currently allocated
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the next `allocate()` would fail
    pub fn is_exhausted(&self) -> bool {
        self.free_list.is_empty() && self.next_index >= self.capacity
    }

    /// Highest index ever handed out + 1
    pub fn high_water_mark(&self) -> u32 {
        self.next_index
    }
}

impl Default for DescriptorAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_DESCRIPTOR_TABLE_CAPACITY)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "descriptor_allocator_tests.rs"]
mod tests;
