//! Backing buffer seam between the allocators and the graphics API.

/// Creates, fills and destroys the buffers the allocators carve up.
///
/// Allocators own their backend and every buffer it hands out.
pub trait BufferBackend {
    type Buffer;

    /// Granularity of `write_buffer`. Every write starts at a multiple of it
    /// and may be zero-padded up to the next multiple, so allocators keep
    /// their offsets and chunk sizes aligned to it.
    const WRITE_ALIGNMENT: u64 = 1;

    fn create_buffer(&mut self, size: u64, label: &str) -> Self::Buffer;
    fn write_buffer(&mut self, buffer: &Self::Buffer, offset: u64, data: &[u8]);
    fn destroy_buffer(&mut self, buffer: Self::Buffer);
}

/// Identifier of a [`HostBackend`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostBuffer(usize);

impl HostBuffer {
    pub fn id(&self) -> usize {
        self.0
    }
}

/// CPU-side backend keeping each buffer as a byte vector.
///
/// Used for staging, headless tools and tests. Tracks how many bytes were
/// written so callers can observe re-uploads.
#[derive(Debug, Default)]
pub struct HostBackend {
    buffers: Vec<Option<Vec<u8>>>,
    free_ids: Vec<usize>,
    bytes_written: u64,
    write_count: u64,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, buffer: &HostBuffer) -> Option<&[u8]> {
        self.buffers.get(buffer.0)?.as_deref()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_some()).count()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn write_count(&self) -> u64 {
        self.write_count
    }
}

impl BufferBackend for HostBackend {
    type Buffer = HostBuffer;

    fn create_buffer(&mut self, size: u64, _label: &str) -> HostBuffer {
        let storage = vec![0u8; size as usize];
        match self.free_ids.pop() {
            Some(id) => {
                self.buffers[id] = Some(storage);
                HostBuffer(id)
            }
            None => {
                self.buffers.push(Some(storage));
                HostBuffer(self.buffers.len() - 1)
            }
        }
    }

    fn write_buffer(&mut self, buffer: &HostBuffer, offset: u64, data: &[u8]) {
        let Some(Some(storage)) = self.buffers.get_mut(buffer.0) else {
            log::warn!("write to destroyed host buffer {}", buffer.0);
            return;
        };

        let start = offset as usize;
        let end = (start + data.len()).min(storage.len());
        if start >= end {
            return;
        }
        storage[start..end].copy_from_slice(&data[..end - start]);
        self.bytes_written += (end - start) as u64;
        self.write_count += 1;
    }

    fn destroy_buffer(&mut self, buffer: HostBuffer) {
        if let Some(slot) = self.buffers.get_mut(buffer.0) {
            if slot.take().is_some() {
                self.free_ids.push(buffer.0);
            }
        }
    }
}

#[cfg(feature = "wgpu")]
pub use self::gpu::WgpuBackend;

#[cfg(feature = "wgpu")]
mod gpu {
    use super::BufferBackend;

    /// Backend allocating `wgpu` buffers and filling them through the queue.
    pub struct WgpuBackend {
        device: wgpu::Device,
        queue: wgpu::Queue,
        usage: wgpu::BufferUsages,
    }

    impl WgpuBackend {
        pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
            Self {
                device,
                queue,
                usage: wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::INDEX
                    | wgpu::BufferUsages::COPY_DST,
            }
        }

        /// Frame transient data usually binds as uniform or storage as well.
        pub fn with_usage(mut self, usage: wgpu::BufferUsages) -> Self {
            self.usage = usage | wgpu::BufferUsages::COPY_DST;
            self
        }

        pub fn device(&self) -> &wgpu::Device {
            &self.device
        }

        pub fn queue(&self) -> &wgpu::Queue {
            &self.queue
        }
    }

    impl BufferBackend for WgpuBackend {
        type Buffer = wgpu::Buffer;

        const WRITE_ALIGNMENT: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

        fn create_buffer(&mut self, size: u64, label: &str) -> wgpu::Buffer {
            let size = crate::memory::config::align_up(size, wgpu::COPY_BUFFER_ALIGNMENT);
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: self.usage,
                mapped_at_creation: false,
            })
        }

        fn write_buffer(&mut self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
            debug_assert_eq!(offset % wgpu::COPY_BUFFER_ALIGNMENT, 0);
            let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
            if data.len() % align == 0 {
                self.queue.write_buffer(buffer, offset, data);
            } else {
                let mut padded = data.to_vec();
                padded.resize(data.len().div_ceil(align) * align, 0);
                self.queue.write_buffer(buffer, offset, &padded);
            }
        }

        fn destroy_buffer(&mut self, buffer: wgpu::Buffer) {
            buffer.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_backend_writes_and_reuses_ids() {
        let mut backend = HostBackend::new();
        let a = backend.create_buffer(8, "a");
        backend.write_buffer(&a, 2, &[1, 2, 3]);
        assert_eq!(backend.read(&a), Some(&[0, 0, 1, 2, 3, 0, 0, 0][..]));
        assert_eq!(backend.bytes_written(), 3);

        backend.destroy_buffer(a);
        assert!(backend.read(&a).is_none());
        let b = backend.create_buffer(4, "b");
        assert_eq!(b.id(), a.id());
        assert_eq!(backend.live_buffers(), 1);
    }

    #[test]
    fn host_backend_clips_out_of_bounds_writes() {
        let mut backend = HostBackend::new();
        let a = backend.create_buffer(4, "a");
        backend.write_buffer(&a, 2, &[9, 9, 9, 9]);
        assert_eq!(backend.read(&a), Some(&[0, 0, 9, 9][..]));
    }
}
