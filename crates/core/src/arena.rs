//! Byte arena capability backing cached payloads.
//!
//! The cache only needs `allocate`/`free`. [`BudgetArena`] is the default: a
//! capacity-bounded heap whose reservations are rounded up to the requested
//! alignment, so it can run dry before the byte ledger does.

/// A block of payload memory handed out by a [`ByteArena`].
///
/// Blocks are move-only. Returning one to its arena consumes it, so a block
/// cannot be freed twice.
///
/// While a read is in flight the payload buffer is lent to the stream engine
/// with [`MemoryBlock::lend`] and handed back with [`MemoryBlock::restore`].
/// The block keeps its size and reservation meanwhile.
#[derive(Debug)]
pub struct MemoryBlock {
    id: u64,
    data: Box<[u8]>,
    size: u64,
    reserved: u64,
    alignment: usize,
}

impl MemoryBlock {
    /// Wrap a buffer that accounts for `reserved` bytes of arena capacity.
    #[must_use]
    pub fn new(id: u64, data: Box<[u8]>, reserved: u64, alignment: usize) -> Self {
        Self {
            id,
            size: data.len() as u64,
            data,
            reserved,
            alignment,
        }
    }

    /// Arena-local identifier.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Payload bytes. Empty while the buffer is lent.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length of the buffer currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Payload length in bytes, as accounted by the byte ledger.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Whether the block holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Arena capacity consumed by this block.
    #[must_use]
    pub const fn reserved(&self) -> u64 {
        self.reserved
    }

    /// Alignment the block was requested with.
    #[must_use]
    pub const fn alignment(&self) -> usize {
        self.alignment
    }

    /// Hand the payload buffer to a reader.
    pub fn lend(&mut self) -> Box<[u8]> {
        std::mem::take(&mut self.data)
    }

    /// Take back a lent buffer. Fails on a length mismatch.
    pub fn restore(&mut self, buffer: Box<[u8]>) -> bool {
        if buffer.len() as u64 != self.size {
            return false;
        }
        self.data = buffer;
        true
    }
}

/// Allocator for cached payloads.
pub trait ByteArena: Send {
    /// Reserve `size` bytes aligned to `alignment`. `None` when exhausted.
    fn allocate(&mut self, size: u64, alignment: usize) -> Option<MemoryBlock>;

    /// Return a block.
    fn free(&mut self, block: MemoryBlock);

    /// Bytes currently reserved.
    fn used(&self) -> u64;

    /// Total capacity in bytes.
    fn capacity(&self) -> u64;
}

/// Capacity-bounded arena.
#[derive(Debug)]
pub struct BudgetArena {
    capacity: u64,
    used: u64,
    next_id: u64,
}

impl BudgetArena {
    /// Create an arena holding at most `capacity` bytes.
    #[must_use]
    pub const fn new(capacity: u64) -> Self {
        Self {
            capacity,
            used: 0,
            next_id: 1,
        }
    }

    fn reservation(size: u64, alignment: usize) -> Option<u64> {
        let alignment = u64::try_from(alignment.max(1)).ok()?;
        size.div_ceil(alignment).checked_mul(alignment)
    }
}

impl ByteArena for BudgetArena {
    fn allocate(&mut self, size: u64, alignment: usize) -> Option<MemoryBlock> {
        let reserved = Self::reservation(size, alignment)?;
        if reserved > self.capacity - self.used {
            return None;
        }
        let len = usize::try_from(size).ok()?;
        let id = self.next_id;
        self.next_id += 1;
        self.used += reserved;
        Some(MemoryBlock::new(
            id,
            vec![0u8; len].into_boxed_slice(),
            reserved,
            alignment,
        ))
    }

    fn free(&mut self, block: MemoryBlock) {
        debug_assert!(block.reserved() <= self.used);
        self.used = self.used.saturating_sub(block.reserved());
    }

    fn used(&self) -> u64 {
        self.used
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free() {
        let mut arena = BudgetArena::new(100);
        let block = arena.allocate(40, 1).unwrap();
        assert_eq!(block.len(), 40);
        assert_eq!(arena.used(), 40);

        arena.free(block);
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn test_alignment_rounds_reservation() {
        let mut arena = BudgetArena::new(64);
        let block = arena.allocate(17, 16).unwrap();
        assert_eq!(block.reserved(), 32);
        assert_eq!(block.len(), 17);
        assert_eq!(arena.used(), 32);

        // 33 bytes at 16 alignment needs 48, only 32 left.
        assert!(arena.allocate(33, 16).is_none());
        assert!(arena.allocate(32, 16).is_some());
    }

    #[test]
    fn test_exhaustion() {
        let mut arena = BudgetArena::new(10);
        assert!(arena.allocate(11, 1).is_none());
        let block = arena.allocate(10, 1).unwrap();
        assert!(arena.allocate(1, 1).is_none());
        arena.free(block);
        assert!(arena.allocate(1, 1).is_some());
    }

    #[test]
    fn test_zero_capacity_refuses_everything_but_empty_blocks() {
        let mut arena = BudgetArena::new(0);
        assert!(arena.allocate(1, 1).is_none());
        let empty = arena.allocate(0, 1).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_lend_and_restore() {
        let mut arena = BudgetArena::new(8);
        let mut block = arena.allocate(4, 1).unwrap();
        let mut buffer = block.lend();
        assert_eq!(buffer.len(), 4);
        assert!(block.is_empty());
        assert_eq!(block.size(), 4);
        assert_eq!(arena.used(), 4);

        assert!(!block.restore(vec![1, 2, 3].into_boxed_slice()));
        buffer.copy_from_slice(&[1, 2, 3, 4]);
        assert!(block.restore(buffer));
        assert_eq!(block.data(), &[1, 2, 3, 4]);

        arena.free(block);
        assert_eq!(arena.used(), 0);
    }
}
