//! Block-based vertex/index arena.
//!
//! Requests are rounded to chunk alignment and bump-allocated inside
//! fixed-size backing blocks. Frees only leave gaps; gaps are reclaimed when
//! a block empties completely or when [`BlockAllocator::defragment`] repacks
//! every live allocation largest-first. Requests larger than a block bypass
//! the blocks entirely and get a dedicated buffer from [`HugeAllocator`].

use super::backend::BufferBackend;
use super::block::{Block, BlockInfo};
use super::config::{align_up, check_write_range, combined_alignment, BlockAllocatorConfig};
use super::error::{AllocError, AllocResult};
use super::handle::{AllocHandle, DataProvider, HandlePool};
use super::huge::HugeAllocator;
use std::sync::Arc;

/// Where a live allocation currently resides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Block { block_index: usize, block_offset: u64 },
    /// Dedicated buffer; there is no block index for these.
    Huge { huge_index: usize },
}

struct Entry {
    placement: Placement,
    size: u64,
    chunk: u64,
    provider: Option<Arc<dyn DataProvider>>,
}

/// Buffer and byte range to bind for an allocation.
#[derive(Debug)]
pub struct BufferLocation<'a, Buf> {
    pub buffer: &'a Buf,
    pub offset: u64,
    pub size: u64,
    pub placement: Placement,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefragStats {
    pub relocated: usize,
    pub relocated_bytes: u64,
    pub blocks_released: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub used_memory: u64,
    pub unused_memory: u64,
    pub block_count: usize,
    pub live_handles: usize,
    pub huge_count: usize,
    pub huge_memory: u64,
    pub defrag_count: u64,
}

pub struct BlockAllocator<B: BufferBackend> {
    backend: B,
    config: BlockAllocatorConfig,
    blocks: Vec<Block<B::Buffer>>,
    handles: HandlePool<Entry>,
    huge: HugeAllocator<B::Buffer>,
    used_memory: u64,
    defrag_count: u64,
}

impl<B: BufferBackend> BlockAllocator<B> {
    pub fn new(backend: B, config: BlockAllocatorConfig) -> Self {
        Self {
            backend,
            config,
            blocks: Vec::new(),
            handles: HandlePool::new(),
            huge: HugeAllocator::new(),
            used_memory: 0,
            defrag_count: 0,
        }
    }

    /// Allocates `size` bytes, optionally filled from `provider`.
    ///
    /// # Panics
    ///
    /// Panics when the configured block limit is exhausted or `size` is zero.
    /// Both are budget errors to be fixed by configuration.
    pub fn allocate(&mut self, size: u64, provider: Option<Arc<dyn DataProvider>>) -> AllocHandle {
        match self.try_allocate(size, provider) {
            Ok(handle) => handle,
            Err(err) => {
                log::error!("{}: {}", self.config.label, err);
                panic!("{}: {}", self.config.label, err);
            }
        }
    }

    /// Allocates exactly as many bytes as `provider` currently exposes.
    pub fn allocate_with_data(&mut self, provider: Arc<dyn DataProvider>) -> AllocHandle {
        let size = provider.fetch().len() as u64;
        self.allocate(size, Some(provider))
    }

    pub fn try_allocate(
        &mut self,
        size: u64,
        provider: Option<Arc<dyn DataProvider>>,
    ) -> AllocResult<AllocHandle> {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }

        if size > self.config.block_size {
            let data = provider.as_deref().map(|p| p.fetch());
            let huge_index = self.huge.allocate(&mut self.backend, size, data, &self.config.label);
            return Ok(self.handles.insert(Entry {
                placement: Placement::Huge { huge_index },
                size,
                chunk: size,
                provider,
            }));
        }

        let chunk = align_up(size, self.chunk_alignment()).min(self.config.block_size);
        let block_index = self.find_or_create_block(size, chunk)?;

        let block = &mut self.blocks[block_index];
        let block_offset = block.push(chunk);
        self.used_memory += chunk;

        if let Some(provider) = &provider {
            let data = provider.fetch();
            let len = data.len().min(size as usize);
            self.backend.write_buffer(&block.buffer, block_offset, &data[..len]);
        }

        Ok(self.handles.insert(Entry {
            placement: Placement::Block {
                block_index,
                block_offset,
            },
            size,
            chunk,
            provider,
        }))
    }

    /// Configured chunk alignment, raised to the backend's write granularity.
    fn chunk_alignment(&self) -> u64 {
        combined_alignment(self.config.chunk_alignment, B::WRITE_ALIGNMENT)
    }

    fn find_or_create_block(&mut self, size: u64, chunk: u64) -> AllocResult<usize> {
        if let Some(index) = self.find_block(chunk) {
            return Ok(index);
        }

        let factor = self.config.auto_defrag_factor();
        if self.config.auto_defragment
            && !self.handles.is_empty()
            && self.unused_memory() >= size.saturating_mul(factor)
        {
            self.defragment(self.config.deallocate_empty_blocks);
            if let Some(index) = self.find_block(chunk) {
                return Ok(index);
            }
        }

        self.push_block(size)
    }

    fn find_block(&self, chunk: u64) -> Option<usize> {
        let block_size = self.config.block_size;
        self.blocks.iter().position(|b| b.fits(chunk, block_size))
    }

    fn push_block(&mut self, requested: u64) -> AllocResult<usize> {
        if let Some(max_blocks) = self.config.max_blocks {
            if self.blocks.len() >= max_blocks {
                return Err(AllocError::OutOfBlocks {
                    max_blocks,
                    block_size: self.config.block_size,
                    requested,
                });
            }
        }
        Ok(self.create_block())
    }

    fn create_block(&mut self) -> usize {
        let index = self.blocks.len();
        let label = format!("{} block {}", self.config.label, index);
        let buffer = self.backend.create_buffer(self.config.block_size, &label);
        self.blocks.push(Block::new(buffer));
        log::debug!("created {label} ({} bytes)", self.config.block_size);
        index
    }

    /// Frees an allocation. Its registry slot is pooled for reuse.
    pub fn deallocate(&mut self, handle: AllocHandle) -> AllocResult<()> {
        let Some(entry) = self.handles.remove(handle) else {
            log::warn!("{}: deallocate of stale handle {:?}", self.config.label, handle);
            return Err(invalid(handle));
        };

        match entry.placement {
            Placement::Block { block_index, .. } => {
                self.blocks[block_index].release(entry.chunk);
                self.used_memory -= entry.chunk;
            }
            Placement::Huge { huge_index } => {
                self.huge.deallocate(&mut self.backend, huge_index);
            }
        }
        Ok(())
    }

    /// Writes `data` at `offset` bytes into the allocation.
    ///
    /// `offset` must be a multiple of the backend's
    /// [`BufferBackend::WRITE_ALIGNMENT`], and so must the length unless the
    /// write ends exactly at the end of the allocation.
    pub fn update(&mut self, handle: AllocHandle, offset: u64, data: &[u8]) -> AllocResult<()> {
        let entry = self.handles.get(handle).ok_or_else(|| invalid(handle))?;
        check_write_range(offset, data.len() as u64, entry.size, B::WRITE_ALIGNMENT)?;

        match entry.placement {
            Placement::Block {
                block_index,
                block_offset,
            } => {
                let buffer = &self.blocks[block_index].buffer;
                self.backend.write_buffer(buffer, block_offset + offset, data);
            }
            Placement::Huge { huge_index } => {
                self.huge.update(&mut self.backend, huge_index, offset, data)?;
            }
        }
        Ok(())
    }

    /// Repacks every block allocation largest-first.
    ///
    /// Allocations whose address changes are re-uploaded from their
    /// [`DataProvider`]. Blocks left without allocations are destroyed when
    /// `deallocate_empty_blocks` is set, otherwise kept empty. If the repacked
    /// layout would need more blocks than `max_blocks` allows, nothing moves.
    pub fn defragment(&mut self, deallocate_empty_blocks: bool) -> DefragStats {
        let block_size = self.config.block_size;

        let mut order: Vec<(AllocHandle, u64, usize, u64)> = self
            .handles
            .iter()
            .filter_map(|(handle, entry)| match entry.placement {
                Placement::Block {
                    block_index,
                    block_offset,
                } => Some((handle, entry.chunk, block_index, block_offset)),
                Placement::Huge { .. } => None,
            })
            .collect();

        order.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then(a.2.cmp(&b.2))
                .then(a.3.cmp(&b.3))
        });

        // Plan first so a layout that no longer fits leaves everything untouched.
        let mut offsets = vec![0u64; self.blocks.len()];
        let mut plan = Vec::with_capacity(order.len());
        for &(handle, chunk, old_block, old_offset) in &order {
            let target = match offsets.iter().position(|&o| o + chunk <= block_size) {
                Some(index) => index,
                None => {
                    offsets.push(0);
                    offsets.len() - 1
                }
            };
            let new_offset = offsets[target];
            offsets[target] += chunk;
            plan.push((handle, chunk, target, new_offset, (old_block, old_offset)));
        }

        if let Some(max_blocks) = self.config.max_blocks {
            if offsets.len() > max_blocks {
                log::warn!(
                    "{}: defragmentation skipped, repacked layout needs {} blocks (limit {})",
                    self.config.label,
                    offsets.len(),
                    max_blocks
                );
                return DefragStats::default();
            }
        }

        for block in &mut self.blocks {
            block.clear();
        }
        while self.blocks.len() < offsets.len() {
            self.create_block();
        }

        let mut stats = DefragStats::default();
        for (handle, chunk, block_index, block_offset, previous) in plan {
            let placed = self.blocks[block_index].push(chunk);
            debug_assert_eq!(placed, block_offset);

            let Some(entry) = self.handles.get_mut(handle) else {
                continue;
            };
            entry.placement = Placement::Block {
                block_index,
                block_offset,
            };
            if previous == (block_index, block_offset) {
                continue;
            }

            stats.relocated += 1;
            stats.relocated_bytes += chunk;

            match &entry.provider {
                Some(provider) => {
                    let data = provider.fetch();
                    let len = data.len().min(entry.size as usize);
                    let buffer = &self.blocks[block_index].buffer;
                    self.backend.write_buffer(buffer, block_offset, &data[..len]);
                }
                None => log::warn!(
                    "{}: relocated allocation {:?} has no data provider, contents are undefined",
                    self.config.label,
                    handle
                ),
            }
        }

        if deallocate_empty_blocks {
            while self.blocks.last().is_some_and(|b| b.is_empty()) {
                if let Some(block) = self.blocks.pop() {
                    self.backend.destroy_buffer(block.buffer);
                    stats.blocks_released += 1;
                }
            }
        }

        self.defrag_count += 1;
        log::info!(
            "{}: defragmented, {} allocations moved ({} bytes), {} blocks released, {} blocks live",
            self.config.label,
            stats.relocated,
            stats.relocated_bytes,
            stats.blocks_released,
            self.blocks.len()
        );

        stats
    }

    /// Destroys every block and huge buffer and invalidates all handles.
    pub fn clear(&mut self) {
        let handles: Vec<AllocHandle> = self.handles.handles().collect();
        for handle in handles {
            self.handles.remove(handle);
        }
        for block in self.blocks.drain(..) {
            self.backend.destroy_buffer(block.buffer);
        }
        self.huge.release_all(&mut self.backend);
        self.used_memory = 0;
    }

    pub fn location(&self, handle: AllocHandle) -> Option<BufferLocation<'_, B::Buffer>> {
        let entry = self.handles.get(handle)?;
        let (buffer, offset) = match entry.placement {
            Placement::Block {
                block_index,
                block_offset,
            } => (&self.blocks[block_index].buffer, block_offset),
            Placement::Huge { huge_index } => (self.huge.buffer(huge_index)?, 0),
        };
        Some(BufferLocation {
            buffer,
            offset,
            size: entry.size,
            placement: entry.placement,
        })
    }

    pub fn placement(&self, handle: AllocHandle) -> Option<Placement> {
        self.handles.get(handle).map(|e| e.placement)
    }

    pub fn is_live(&self, handle: AllocHandle) -> bool {
        self.handles.get(handle).is_some()
    }

    /// Bytes held by block allocations, chunk-aligned. Huge allocations are
    /// tracked separately by [`HugeAllocator::used_memory`].
    pub fn used_memory(&self) -> u64 {
        self.used_memory
    }

    /// Block capacity not held by live allocations, gaps included.
    pub fn unused_memory(&self) -> u64 {
        (self.blocks.len() as u64 * self.config.block_size).saturating_sub(self.used_memory)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, index: usize) -> Option<&Block<B::Buffer>> {
        self.blocks.get(index)
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.blocks.iter().map(BlockInfo::from)
    }

    pub fn huge(&self) -> &HugeAllocator<B::Buffer> {
        &self.huge
    }

    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    pub fn config(&self) -> &BlockAllocatorConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            used_memory: self.used_memory,
            unused_memory: self.unused_memory(),
            block_count: self.blocks.len(),
            live_handles: self.handles.len(),
            huge_count: self.huge.len(),
            huge_memory: self.huge.used_memory(),
            defrag_count: self.defrag_count,
        }
    }
}

fn invalid(handle: AllocHandle) -> AllocError {
    AllocError::InvalidHandle {
        index: handle.index(),
        generation: handle.generation(),
    }
}
