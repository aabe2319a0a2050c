use glam::Vec3;
use ik_gpumem::ik::{Chain, Constraint, IkChain};
use ik_gpumem::memory::{
    BlockAllocator, BlockAllocatorConfig, FrameBufferConfig, FrameDoubleBuffer, HostBackend,
    PodData,
};
use ik_gpumem::Transform;
use std::f32::consts::TAU;

const FRAMES: u32 = 8;

fn build_arm() -> Chain {
    Chain::builder()
        .add_joint_at_with_constraint(Vec3::ZERO, Constraint::angle(Vec3::Y, 70.0))
        .add_joint_at_with_constraint(
            Vec3::new(0.0, 1.0, 0.0),
            Constraint::hinge(Vec3::Z, -150.0, 0.0),
        )
        .add_joint_at_with_constraint(Vec3::new(0.0, 2.0, 0.0), Constraint::angle(Vec3::Y, 45.0))
        .add_joint_at(Vec3::new(0.0, 2.5, 0.0))
        .threshold(0.001)
        .max_iterations(8)
        .build()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut arm = build_arm();
    let mut meshes = BlockAllocator::new(
        HostBackend::new(),
        BlockAllocatorConfig::default()
            .block_size(64 * 1024)
            .label("demo meshes"),
    );
    let mut frames = FrameDoubleBuffer::new(
        HostBackend::new(),
        FrameBufferConfig::default().capacity(16 * 1024),
    );

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let vertices = PodData::new(vec![[i as f32; 3]; 256 + i * 97]);
            meshes.allocate_with_data(vertices.into_provider())
        })
        .collect();

    for handle in handles.iter().step_by(2) {
        if let Err(err) = meshes.deallocate(*handle) {
            log::warn!("{err}");
        }
    }

    let before = meshes.stats();
    let defrag = meshes.defragment(true);
    log::info!(
        "streamed {} meshes, {} bytes used over {} blocks; defrag moved {} and released {} blocks",
        before.live_handles,
        before.used_memory,
        before.block_count,
        defrag.relocated,
        defrag.blocks_released
    );

    let terrain = meshes.allocate(meshes.config().block_size + 1, None);

    for frame in 0..FRAMES {
        let t = frame as f32 / FRAMES as f32 * TAU;
        let target =
            Transform::from_position(Vec3::new(1.2 + 0.4 * t.cos(), 1.2 + 0.4 * t.sin(), 0.3));
        let result = arm.solve_detailed(target);

        log::info!(
            "frame {frame}: converged {} after {} iterations, tip distance {:.4}",
            result.converged,
            result.iterations,
            result.final_distance
        );

        let palette: Vec<[f32; 16]> = arm
            .links()
            .iter()
            .map(|link| link.world.to_matrix().to_cols_array())
            .collect();
        let allocation = frames.allocate_pod(&palette);
        log::debug!(
            "frame {frame}: skinning palette at slot {} offset {}",
            allocation.slot,
            allocation.offset
        );

        frames.swap_frames();
    }

    if let Err(err) = meshes.deallocate(terrain) {
        log::warn!("{err}");
    }

    let stats = meshes.stats();
    log::info!(
        "arena: {} bytes in {} blocks, {} huge; frame peak {} of {} bytes",
        stats.used_memory,
        stats.block_count,
        stats.huge_count,
        frames.max_memory_usage(),
        frames.capacity()
    );
}
