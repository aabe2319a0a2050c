//! GPU vertex/index memory module
//!
//! Block arena with defragmentation, dedicated buffers for oversized
//! requests, and a double-buffered per-frame transient allocator. All of it
//! is single-threaded; callers serialize access.

pub mod backend;
pub mod block;
pub mod block_allocator;
pub mod config;
pub mod error;
pub mod frame;
pub mod handle;
pub mod huge;

#[cfg(feature = "wgpu")]
pub use backend::WgpuBackend;
pub use backend::{BufferBackend, HostBackend, HostBuffer};
pub use block::{Block, BlockInfo};
pub use block_allocator::{AllocatorStats, BlockAllocator, BufferLocation, DefragStats, Placement};
pub use config::{BlockAllocatorConfig, FrameBufferConfig};
pub use error::{AllocError, AllocResult};
pub use frame::{FrameAllocation, FrameDoubleBuffer, FrameSlot};
pub use handle::{AllocHandle, DataProvider, HandlePool, PodData};
pub use huge::HugeAllocator;
