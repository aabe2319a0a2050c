use thiserror::Error;

/// Allocation failures.
///
/// `OutOfBlocks` and `FrameBudgetExceeded` are capacity-planning violations:
/// the panicking entry points (`allocate`) treat them as fatal, the `try_*`
/// variants hand them back for callers that want to report before aborting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("block limit reached: {max_blocks} blocks of {block_size} bytes in use, cannot place {requested} bytes")]
    OutOfBlocks {
        max_blocks: usize,
        block_size: u64,
        requested: u64,
    },

    #[error("frame budget exceeded: {requested} bytes at offset {offset} overflow the {capacity}-byte frame slot")]
    FrameBudgetExceeded {
        requested: u64,
        offset: u64,
        capacity: u64,
    },

    #[error("allocation handle {index}:{generation} is not live")]
    InvalidHandle { index: u32, generation: u32 },

    #[error("write of {len} bytes at offset {offset} exceeds allocation of {size} bytes")]
    OutOfRange { offset: u64, len: u64, size: u64 },

    #[error("write of {len} bytes at offset {offset} is not aligned to {alignment} bytes")]
    MisalignedWrite { offset: u64, len: u64, alignment: u64 },

    #[error("huge allocation slot {index} is not live")]
    UnknownHugeSlot { index: usize },

    #[error("zero-sized allocation requested")]
    ZeroSize,
}

pub type AllocResult<T> = Result<T, AllocError>;
