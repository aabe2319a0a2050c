//! Dedicated buffers for allocations larger than a block.

use super::backend::BufferBackend;
use super::config::check_write_range;
use super::error::{AllocError, AllocResult};

#[derive(Debug)]
struct HugeAllocation<Buf> {
    buffer: Buf,
    size: u64,
}

/// Flat list of one-buffer-per-allocation entries. Never defragmented.
#[derive(Debug)]
pub struct HugeAllocator<Buf> {
    allocations: Vec<Option<HugeAllocation<Buf>>>,
    free_slots: Vec<usize>,
    used_memory: u64,
}

impl<Buf> Default for HugeAllocator<Buf> {
    fn default() -> Self {
        Self {
            allocations: Vec::new(),
            free_slots: Vec::new(),
            used_memory: 0,
        }
    }
}

impl<Buf> HugeAllocator<Buf> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer sized exactly to `size` and fills it with `data`.
    pub fn allocate<B>(
        &mut self,
        backend: &mut B,
        size: u64,
        data: Option<&[u8]>,
        label: &str,
    ) -> usize
    where
        B: BufferBackend<Buffer = Buf>,
    {
        let buffer = backend.create_buffer(size, label);
        if let Some(data) = data {
            backend.write_buffer(&buffer, 0, &data[..data.len().min(size as usize)]);
        }

        self.used_memory += size;
        log::debug!("huge allocation of {size} bytes ({label})");

        let entry = Some(HugeAllocation { buffer, size });
        match self.free_slots.pop() {
            Some(index) => {
                self.allocations[index] = entry;
                index
            }
            None => {
                self.allocations.push(entry);
                self.allocations.len() - 1
            }
        }
    }

    /// Destroys the allocation's buffer immediately.
    pub fn deallocate<B>(&mut self, backend: &mut B, index: usize) -> bool
    where
        B: BufferBackend<Buffer = Buf>,
    {
        let Some(allocation) = self.allocations.get_mut(index).and_then(Option::take) else {
            return false;
        };
        self.used_memory -= allocation.size;
        self.free_slots.push(index);
        backend.destroy_buffer(allocation.buffer);
        true
    }

    /// Writes `data` at `offset` inside the allocation.
    pub fn update<B>(
        &mut self,
        backend: &mut B,
        index: usize,
        offset: u64,
        data: &[u8],
    ) -> AllocResult<()>
    where
        B: BufferBackend<Buffer = Buf>,
    {
        let Some(Some(allocation)) = self.allocations.get(index) else {
            return Err(AllocError::UnknownHugeSlot { index });
        };
        check_write_range(offset, data.len() as u64, allocation.size, B::WRITE_ALIGNMENT)?;
        backend.write_buffer(&allocation.buffer, offset, data);
        Ok(())
    }

    pub fn buffer(&self, index: usize) -> Option<&Buf> {
        self.allocations.get(index)?.as_ref().map(|a| &a.buffer)
    }

    pub fn size(&self, index: usize) -> Option<u64> {
        self.allocations.get(index)?.as_ref().map(|a| a.size)
    }

    pub fn used_memory(&self) -> u64 {
        self.used_memory
    }

    pub fn len(&self) -> usize {
        self.allocations.len() - self.free_slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn release_all<B>(&mut self, backend: &mut B)
    where
        B: BufferBackend<Buffer = Buf>,
    {
        for allocation in self.allocations.drain(..).flatten() {
            backend.destroy_buffer(allocation.buffer);
        }
        self.free_slots.clear();
        self.used_memory = 0;
    }
}
