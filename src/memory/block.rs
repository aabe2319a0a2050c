//! Fixed-capacity backing block bookkeeping.

/// One backing buffer of the block allocator.
///
/// `alloc_offset` only moves forward until the block empties or is repacked,
/// so `alloc_offset - used_memory` is the fragmentation gap left by frees.
#[derive(Debug)]
pub struct Block<Buf> {
    pub(crate) buffer: Buf,
    pub(crate) alloc_offset: u64,
    pub(crate) used_memory: u64,
    pub(crate) handle_count: u32,
}

impl<Buf> Block<Buf> {
    pub(crate) fn new(buffer: Buf) -> Self {
        Self {
            buffer,
            alloc_offset: 0,
            used_memory: 0,
            handle_count: 0,
        }
    }

    pub fn buffer(&self) -> &Buf {
        &self.buffer
    }

    pub fn alloc_offset(&self) -> u64 {
        self.alloc_offset
    }

    pub fn used_memory(&self) -> u64 {
        self.used_memory
    }

    pub fn handle_count(&self) -> u32 {
        self.handle_count
    }

    pub fn fragmentation(&self) -> u64 {
        self.alloc_offset - self.used_memory
    }

    pub fn is_empty(&self) -> bool {
        self.handle_count == 0
    }

    pub fn fits(&self, chunk: u64, block_size: u64) -> bool {
        self.alloc_offset.checked_add(chunk).is_some_and(|end| end <= block_size)
    }

    /// Bumps the offset by `chunk` bytes and returns where it was placed.
    pub(crate) fn push(&mut self, chunk: u64) -> u64 {
        let offset = self.alloc_offset;
        self.alloc_offset += chunk;
        self.used_memory += chunk;
        self.handle_count += 1;
        offset
    }

    /// Releases `chunk` bytes. An emptied block rewinds to offset zero.
    pub(crate) fn release(&mut self, chunk: u64) {
        self.used_memory = self.used_memory.saturating_sub(chunk);
        self.handle_count = self.handle_count.saturating_sub(1);
        if self.used_memory == 0 {
            self.alloc_offset = 0;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.alloc_offset = 0;
        self.used_memory = 0;
        self.handle_count = 0;
    }
}

/// Snapshot of one block for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub alloc_offset: u64,
    pub used_memory: u64,
    pub handle_count: u32,
}

impl<Buf> From<&Block<Buf>> for BlockInfo {
    fn from(block: &Block<Buf>) -> Self {
        Self {
            alloc_offset: block.alloc_offset,
            used_memory: block.used_memory,
            handle_count: block.handle_count,
        }
    }
}
