//! Double-buffered per-frame transient allocator.
//!
//! The CPU bump-allocates skinning matrices, instance constants and similar
//! per-frame data into the active slot while the GPU may still be reading
//! the other slot from the previous frame. [`FrameDoubleBuffer::swap_frames`]
//! must run once per render frame, after the previous frame's commands have
//! been submitted.

use super::backend::BufferBackend;
use super::config::{checked_align_up, combined_alignment, FrameBufferConfig};
use super::error::{AllocError, AllocResult};
use bytemuck::Pod;

#[derive(Debug)]
pub struct FrameSlot<Buf> {
    buffer: Buf,
    used_memory: u64,
    handle_count: u32,
    peak: u64,
}

impl<Buf> FrameSlot<Buf> {
    fn new(buffer: Buf) -> Self {
        Self {
            buffer,
            used_memory: 0,
            handle_count: 0,
            peak: 0,
        }
    }

    pub fn buffer(&self) -> &Buf {
        &self.buffer
    }

    pub fn used_memory(&self) -> u64 {
        self.used_memory
    }

    pub fn handle_count(&self) -> u32 {
        self.handle_count
    }

    /// Highest usage this slot has seen in any frame.
    pub fn peak(&self) -> u64 {
        self.peak
    }

    fn reset(&mut self) {
        self.used_memory = 0;
        self.handle_count = 0;
    }
}

/// Byte range handed out for the current frame. Only valid until the slot is
/// reused two swaps later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAllocation {
    pub slot: usize,
    pub offset: u64,
    pub size: u64,
    pub frame: u64,
}

pub struct FrameDoubleBuffer<B: BufferBackend> {
    backend: B,
    config: FrameBufferConfig,
    slots: [FrameSlot<B::Buffer>; 2],
    active: usize,
    max_memory_usage: u64,
    frame_index: u64,
}

impl<B: BufferBackend> FrameDoubleBuffer<B> {
    pub fn new(mut backend: B, config: FrameBufferConfig) -> Self {
        let slots = [0, 1].map(|i| {
            let label = format!("{} slot {}", config.label, i);
            FrameSlot::new(backend.create_buffer(config.capacity, &label))
        });
        log::debug!(
            "{}: two frame slots of {} bytes",
            config.label,
            config.capacity
        );

        Self {
            backend,
            config,
            slots,
            active: 0,
            max_memory_usage: 0,
            frame_index: 0,
        }
    }

    /// Bump-allocates `size` bytes aligned to `alignment` in the active slot.
    /// The alignment is raised to the backend's write granularity.
    ///
    /// # Panics
    ///
    /// Panics when the slot capacity is exceeded; raise
    /// [`FrameBufferConfig::capacity`] instead of handling it.
    pub fn allocate(&mut self, size: u64, alignment: u64, data: Option<&[u8]>) -> FrameAllocation {
        match self.try_allocate(size, alignment, data) {
            Ok(allocation) => allocation,
            Err(err) => {
                log::error!("{}: {}", self.config.label, err);
                panic!("{}: {}", self.config.label, err);
            }
        }
    }

    pub fn try_allocate(
        &mut self,
        size: u64,
        alignment: u64,
        data: Option<&[u8]>,
    ) -> AllocResult<FrameAllocation> {
        let capacity = self.config.capacity;
        let alignment = combined_alignment(alignment, B::WRITE_ALIGNMENT);
        let slot = &mut self.slots[self.active];

        let offset = checked_align_up(slot.used_memory, alignment).unwrap_or(u64::MAX);
        let Some(end) = offset.checked_add(size).filter(|&end| end <= capacity) else {
            return Err(AllocError::FrameBudgetExceeded {
                requested: size,
                offset,
                capacity,
            });
        };

        slot.used_memory = end;
        slot.handle_count += 1;
        slot.peak = slot.peak.max(slot.used_memory);

        if let Some(data) = data {
            let len = data.len().min(size as usize);
            self.backend.write_buffer(&slot.buffer, offset, &data[..len]);
        }

        Ok(FrameAllocation {
            slot: self.active,
            offset,
            size,
            frame: self.frame_index,
        })
    }

    /// Copies a typed slice into the active slot, aligned to its element type
    /// (at least 4 bytes, the GPU copy granularity).
    pub fn allocate_pod<T: Pod>(&mut self, data: &[T]) -> FrameAllocation {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let alignment = std::mem::align_of::<T>().max(4) as u64;
        self.allocate(bytes.len() as u64, alignment, Some(bytes))
    }

    /// Records the high-water mark, flips slots and clears the new active one.
    pub fn swap_frames(&mut self) {
        let used = self.slots[self.active].used_memory;
        self.max_memory_usage = self.max_memory_usage.max(used);

        self.active ^= 1;
        self.slots[self.active].reset();
        self.frame_index += 1;

        log::trace!(
            "{}: frame {} used {} bytes, peak {}",
            self.config.label,
            self.frame_index - 1,
            used,
            self.max_memory_usage
        );
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_slot(&self) -> &FrameSlot<B::Buffer> {
        &self.slots[self.active]
    }

    /// Slot the GPU may still be consuming.
    pub fn previous_slot(&self) -> &FrameSlot<B::Buffer> {
        &self.slots[self.active ^ 1]
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot<B::Buffer>> {
        self.slots.get(index)
    }

    pub fn buffer(&self, allocation: &FrameAllocation) -> &B::Buffer {
        &self.slots[allocation.slot & 1].buffer
    }

    pub fn capacity(&self) -> u64 {
        self.config.capacity
    }

    pub fn remaining(&self) -> u64 {
        self.config.capacity - self.slots[self.active].used_memory
    }

    pub fn max_memory_usage(&self) -> u64 {
        self.max_memory_usage
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::backend::HostBackend;

    fn frames(capacity: u64) -> FrameDoubleBuffer<HostBackend> {
        FrameDoubleBuffer::new(
            HostBackend::new(),
            FrameBufferConfig::default().capacity(capacity),
        )
    }

    #[test]
    fn allocations_respect_alignment() {
        let mut frames = frames(256);
        let a = frames.allocate(3, 1, None);
        let b = frames.allocate(8, 16, None);
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 16);
        assert_eq!(frames.active_slot().used_memory(), 24);
        assert_eq!(frames.active_slot().handle_count(), 2);
    }

    #[test]
    fn swap_resets_new_active_slot() {
        let mut frames = frames(256);
        frames.allocate(64, 4, None);
        frames.swap_frames();
        assert_eq!(frames.active_index(), 1);
        assert_eq!(frames.active_slot().used_memory(), 0);
        assert_eq!(frames.active_slot().handle_count(), 0);
        assert_eq!(frames.previous_slot().used_memory(), 64);

        frames.allocate(16, 4, None);
        frames.swap_frames();
        assert_eq!(frames.active_index(), 0);
        assert_eq!(frames.active_slot().used_memory(), 0);
    }

    #[test]
    fn high_water_mark_tracks_peak_frame() {
        let mut frames = frames(1024);
        for size in [100u64, 600, 50, 300] {
            frames.allocate(size, 4, None);
            frames.swap_frames();
        }
        assert_eq!(frames.max_memory_usage(), 600);
        assert_eq!(frames.frame_index(), 4);
        assert_eq!(frames.slot(0).unwrap().peak(), 100);
        assert_eq!(frames.slot(1).unwrap().peak(), 600);
    }

    #[test]
    fn pod_data_lands_in_active_buffer() {
        let mut frames = frames(256);
        frames.swap_frames();
        let allocation = frames.allocate_pod(&[1.0f32, 2.0, 3.0]);
        assert_eq!(allocation.slot, 1);
        let bytes = frames.backend().read(frames.buffer(&allocation)).unwrap();
        let expected: &[u8] = bytemuck::cast_slice(&[1.0f32, 2.0, 3.0]);
        assert_eq!(&bytes[..12], expected);
    }

    #[test]
    fn overflow_surfaces_error() {
        let mut frames = frames(64);
        frames.allocate(60, 4, None);
        assert_eq!(
            frames.try_allocate(8, 4, None),
            Err(AllocError::FrameBudgetExceeded {
                requested: 8,
                offset: 60,
                capacity: 64
            })
        );
    }

    #[test]
    fn wrapping_request_is_rejected() {
        let mut frames = frames(64);
        frames.allocate(16, 4, None);
        assert_eq!(
            frames.try_allocate(u64::MAX, 4, None),
            Err(AllocError::FrameBudgetExceeded {
                requested: u64::MAX,
                offset: 16,
                capacity: 64
            })
        );
        assert_eq!(frames.active_slot().used_memory(), 16);
        assert_eq!(frames.allocate(8, 4, None).offset, 16);
    }

    #[test]
    fn wrapping_alignment_is_rejected() {
        let mut frames = frames(64);
        frames.allocate(1, 1, None);
        assert!(matches!(
            frames.try_allocate(1, u64::MAX, None),
            Err(AllocError::FrameBudgetExceeded { .. })
        ));
        assert_eq!(frames.active_slot().used_memory(), 1);
    }

    #[test]
    #[should_panic(expected = "frame budget exceeded")]
    fn overflow_is_fatal() {
        let mut frames = frames(64);
        frames.allocate(65, 1, None);
    }
}
