//! Allocator tuning knobs.
//!
//! Defaults mirror a typical desktop budget; every value is meant to be raised
//! when the fatal capacity checks fire, not handled at runtime.

use super::error::{AllocError, AllocResult};

/// Capacity of one backing block.
pub const DEFAULT_BLOCK_SIZE: u64 = 16 * 1024 * 1024;
/// Every block allocation is rounded up to this many bytes.
pub const CHUNK_OFFSET_ALIGNMENT: u64 = 16;
/// Auto-defragmentation only runs when this many times the request is sitting unused.
pub const AUTO_DEFRAG_FACTOR: u64 = 8;
/// Per-slot capacity of the transient frame allocator.
pub const DEFAULT_FRAME_CAPACITY: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BlockAllocatorConfig {
    pub block_size: u64,
    pub chunk_alignment: u64,
    /// Hard cap on live blocks. `None` means unbounded.
    pub max_blocks: Option<usize>,
    /// Repack blocks before growing when enough memory sits in gaps.
    pub auto_defragment: bool,
    /// Destroy blocks left empty by defragmentation instead of keeping them.
    pub deallocate_empty_blocks: bool,
    pub label: String,
}

impl Default for BlockAllocatorConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            chunk_alignment: CHUNK_OFFSET_ALIGNMENT,
            max_blocks: None,
            auto_defragment: true,
            deallocate_empty_blocks: true,
            label: "vertex arena".to_string(),
        }
    }
}

impl BlockAllocatorConfig {
    pub fn block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn chunk_alignment(mut self, alignment: u64) -> Self {
        self.chunk_alignment = alignment.max(1);
        self
    }

    pub fn max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = Some(max_blocks);
        self
    }

    pub fn auto_defragment(mut self, enabled: bool) -> Self {
        self.auto_defragment = enabled;
        self
    }

    pub fn deallocate_empty_blocks(mut self, enabled: bool) -> Self {
        self.deallocate_empty_blocks = enabled;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Single-block arenas defragment as soon as the request fits in the gaps.
    pub fn auto_defrag_factor(&self) -> u64 {
        if self.max_blocks == Some(1) {
            1
        } else {
            AUTO_DEFRAG_FACTOR
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FrameBufferConfig {
    /// Bytes available to each of the two frame slots.
    pub capacity: u64,
    pub label: String,
}

impl Default for FrameBufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_FRAME_CAPACITY,
            label: "frame transient".to_string(),
        }
    }
}

impl FrameBufferConfig {
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Rounds `value` up to the next multiple of `alignment` (any non-zero alignment).
pub fn align_up(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

/// Smallest alignment satisfying both `a` and `b` (their least common multiple).
pub fn combined_alignment(a: u64, b: u64) -> u64 {
    let (a, b) = (a.max(1), b.max(1));
    let (mut x, mut y) = (a, b);
    while y != 0 {
        (x, y) = (y, x % y);
    }
    (a / x).saturating_mul(b)
}

/// [`align_up`] that reports overflow instead of wrapping.
pub fn checked_align_up(value: u64, alignment: u64) -> Option<u64> {
    let alignment = alignment.max(1);
    value.div_ceil(alignment).checked_mul(alignment)
}

/// Validates a write of `len` bytes at `offset` into an allocation of `size`
/// bytes for a backend writing in `alignment`-byte units. The start must be
/// aligned and so must the length, unless the write runs to the end of the
/// allocation where padding only touches slack.
pub(crate) fn check_write_range(
    offset: u64,
    len: u64,
    size: u64,
    alignment: u64,
) -> AllocResult<()> {
    let Some(end) = offset.checked_add(len).filter(|&end| end <= size) else {
        return Err(AllocError::OutOfRange { offset, len, size });
    };

    let alignment = alignment.max(1);
    if offset % alignment != 0 || (len % alignment != 0 && end != size) {
        return Err(AllocError::MisalignedWrite {
            offset,
            len,
            alignment,
        });
    }
    Ok(())
}
