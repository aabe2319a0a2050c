use ik_gpumem::memory::{
    AllocError, AllocHandle, BlockAllocator, BlockAllocatorConfig, BufferBackend, DataProvider,
    FrameBufferConfig, FrameDoubleBuffer, HostBackend, HostBuffer, PodData, Placement,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

const BLOCK_SIZE: u64 = 1024;

fn arena() -> BlockAllocator<HostBackend> {
    BlockAllocator::new(
        HostBackend::new(),
        BlockAllocatorConfig::default()
            .block_size(BLOCK_SIZE)
            .label("test arena"),
    )
}

/// Host backend with GPU copy rules: writes must start on a 4-byte boundary
/// and are zero-padded to a multiple of 4 bytes.
#[derive(Default)]
struct CopyAlignedBackend {
    host: HostBackend,
}

impl BufferBackend for CopyAlignedBackend {
    type Buffer = HostBuffer;

    const WRITE_ALIGNMENT: u64 = 4;

    fn create_buffer(&mut self, size: u64, label: &str) -> HostBuffer {
        self.host.create_buffer(size.div_ceil(4) * 4, label)
    }

    fn write_buffer(&mut self, buffer: &HostBuffer, offset: u64, data: &[u8]) {
        assert_eq!(offset % 4, 0, "unaligned write at {offset}");
        let mut padded = data.to_vec();
        padded.resize(data.len().div_ceil(4) * 4, 0);
        self.host.write_buffer(buffer, offset, &padded);
    }

    fn destroy_buffer(&mut self, buffer: HostBuffer) {
        self.host.destroy_buffer(buffer);
    }
}

#[derive(Debug, Clone)]
enum Op {
    Allocate(u64),
    Free(usize),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            3 => (1u64..=400).prop_map(Op::Allocate),
            2 => any::<usize>().prop_map(Op::Free),
        ],
        1..64,
    )
}

fn run(arena: &mut BlockAllocator<HostBackend>, ops: &[Op]) -> Vec<AllocHandle> {
    let mut live = Vec::new();
    for op in ops {
        match *op {
            Op::Allocate(size) => {
                let fill = (live.len() % 251) as u8;
                let provider: Arc<dyn DataProvider> = Arc::new(vec![fill; size as usize]);
                live.push(arena.allocate(size, Some(provider)));
            }
            Op::Free(pick) if !live.is_empty() => {
                let handle = live.swap_remove(pick % live.len());
                arena.deallocate(handle).unwrap();
            }
            Op::Free(_) => {}
        }
    }
    live
}

fn assert_layout(arena: &BlockAllocator<HostBackend>, live: &[AllocHandle]) {
    let block_total: u64 = arena.blocks().map(|b| b.used_memory).sum();
    assert_eq!(block_total, arena.used_memory());

    let mut per_block: BTreeMap<usize, Vec<(u64, u64)>> = BTreeMap::new();
    for &handle in live {
        let location = arena.location(handle).unwrap();
        if let Placement::Block { block_index, .. } = location.placement {
            assert!(location.offset % 16 == 0);
            assert!(location.offset + location.size <= BLOCK_SIZE);
            per_block
                .entry(block_index)
                .or_default()
                .push((location.offset, location.size));
        }
    }
    for ranges in per_block.values_mut() {
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            assert!(pair[0].0 + pair[0].1 <= pair[1].0, "overlap in {ranges:?}");
        }
    }
}

#[test]
fn block_size_boundary_picks_the_path() {
    let mut arena = arena();
    let fits = arena.allocate(BLOCK_SIZE, None);
    let huge = arena.allocate(BLOCK_SIZE + 1, None);

    assert!(matches!(arena.placement(fits), Some(Placement::Block { .. })));
    assert!(matches!(arena.placement(huge), Some(Placement::Huge { .. })));
    assert_eq!(arena.used_memory(), BLOCK_SIZE);
    assert_eq!(arena.huge().used_memory(), BLOCK_SIZE + 1);
}

#[test]
fn relocated_contents_follow_their_provider() {
    let mut arena = arena();
    let vertices: Vec<[f32; 3]> = (0..20).map(|i| [i as f32, 0.5, -1.0]).collect();
    let expected: Vec<u8> = bytemuck::cast_slice(&vertices).to_vec();

    let gap = arena.allocate(512, None);
    let mesh = arena.allocate_with_data(PodData::new(vertices).into_provider());
    arena.deallocate(gap).unwrap();
    arena.defragment(true);

    let location = arena.location(mesh).unwrap();
    assert_eq!(location.offset, 0);
    let contents = arena.backend().read(location.buffer).unwrap();
    assert_eq!(&contents[..expected.len()], expected.as_slice());
}

#[test]
fn tight_packing_is_widened_to_copy_alignment() {
    let mut arena = BlockAllocator::new(
        CopyAlignedBackend::default(),
        BlockAllocatorConfig::default().block_size(64).chunk_alignment(1),
    );
    let a = arena.allocate(3, Some(Arc::new(vec![1u8, 2, 3])));
    let b = arena.allocate(3, Some(Arc::new(vec![4u8, 5, 6])));

    assert_eq!(arena.location(b).unwrap().offset, 4);
    let location = arena.location(a).unwrap();
    let contents = arena.backend().host.read(location.buffer).unwrap();
    assert_eq!(&contents[..7], &[1, 2, 3, 0, 4, 5, 6]);
}

#[test]
fn unaligned_update_is_refused_by_copy_aligned_backend() {
    let mut arena = BlockAllocator::new(
        CopyAlignedBackend::default(),
        BlockAllocatorConfig::default().block_size(64),
    );
    let a = arena.allocate(10, None);

    assert_eq!(
        arena.update(a, 2, &[9, 9, 9, 9]),
        Err(AllocError::MisalignedWrite {
            offset: 2,
            len: 4,
            alignment: 4
        })
    );
    assert_eq!(
        arena.update(a, 0, &[9]),
        Err(AllocError::MisalignedWrite {
            offset: 0,
            len: 1,
            alignment: 4
        })
    );
    arena.update(a, 4, &[7, 7, 7, 7]).unwrap();
    arena.update(a, 8, &[8, 8]).unwrap();
}

#[test]
fn frame_writes_keep_copy_alignment() {
    let mut frames = FrameDoubleBuffer::new(
        CopyAlignedBackend::default(),
        FrameBufferConfig::default().capacity(64),
    );
    let first = frames.allocate(3, 1, Some(&[1, 2, 3]));
    let second = frames.allocate(3, 1, Some(&[4, 5, 6]));

    assert_eq!(first.offset, 0);
    assert_eq!(second.offset, 4);
    let contents = frames.backend().host.read(frames.buffer(&second)).unwrap();
    assert_eq!(&contents[..7], &[1, 2, 3, 0, 4, 5, 6]);
}

proptest! {
    #[test]
    fn block_accounting_matches_live_allocations(ops in ops()) {
        let mut arena = arena();
        let live = run(&mut arena, &ops);
        assert_layout(&arena, &live);
        prop_assert_eq!(arena.live_handles(), live.len());
    }

    #[test]
    fn defragment_is_idempotent(ops in ops()) {
        let mut arena = arena();
        let live = run(&mut arena, &ops);

        arena.defragment(true);
        assert_layout(&arena, &live);
        let placements: Vec<_> = live.iter().map(|&h| arena.placement(h)).collect();

        let second = arena.defragment(true);
        prop_assert_eq!(second.relocated, 0);
        prop_assert_eq!(second.blocks_released, 0);
        let again: Vec<_> = live.iter().map(|&h| arena.placement(h)).collect();
        prop_assert_eq!(placements, again);
    }

    #[test]
    fn copy_aligned_arena_never_writes_unaligned(ops in ops(), alignment in 1u64..=8) {
        let mut arena = BlockAllocator::new(
            CopyAlignedBackend::default(),
            BlockAllocatorConfig::default()
                .block_size(BLOCK_SIZE)
                .chunk_alignment(alignment),
        );
        let mut live = Vec::new();
        for op in &ops {
            match *op {
                Op::Allocate(size) => {
                    let provider: Arc<dyn DataProvider> = Arc::new(vec![0x5A; size as usize]);
                    live.push(arena.allocate(size, Some(provider)));
                }
                Op::Free(pick) if !live.is_empty() => {
                    let handle = live.swap_remove(pick % live.len());
                    arena.deallocate(handle).unwrap();
                }
                Op::Free(_) => {}
            }
        }
        arena.defragment(true);

        for &handle in &live {
            let location = arena.location(handle).unwrap();
            prop_assert_eq!(location.offset % 4, 0);
            let contents = arena.backend().host.read(location.buffer).unwrap();
            let start = location.offset as usize;
            let end = start + location.size as usize;
            prop_assert!(contents[start..end].iter().all(|&b| b == 0x5A));
        }
    }

    #[test]
    fn frame_peak_is_historical_maximum(
        frames in prop::collection::vec(prop::collection::vec(0u64..128, 0..8), 1..12),
    ) {
        let mut buffer = FrameDoubleBuffer::new(
            HostBackend::new(),
            FrameBufferConfig::default().capacity(4096),
        );

        let mut peak = 0;
        for sizes in &frames {
            for &size in sizes {
                buffer.allocate(size, 4, None);
            }
            peak = peak.max(buffer.active_slot().used_memory());
            buffer.swap_frames();
        }

        prop_assert_eq!(buffer.max_memory_usage(), peak);
        prop_assert_eq!(buffer.frame_index(), frames.len() as u64);
    }
}
