//! # ik-gpumem
//!
//! Two self-contained engine subsystems:
//!
//! - FABRIK (Forward And Backward Reaching Inverse Kinematics) chain solver
//!   with per-joint cone and hinge constraints
//! - GPU vertex/index memory: a block arena with defragmentation, a
//!   dedicated-buffer path for oversized requests and a double-buffered
//!   per-frame transient allocator
//!
//! ## Example
//! ```rust,ignore
//! use ik_gpumem::ik::{Chain, Constraint, IkChain};
//! use ik_gpumem::Transform;
//! use glam::Vec3;
//!
//! // Build an IK chain
//! let mut chain = Chain::builder()
//!     .add_joint_at(Vec3::ZERO)
//!     .add_joint_at_with_constraint(Vec3::Y, Constraint::hinge(Vec3::X, -10.0, 120.0))
//!     .add_joint_at(Vec3::new(0.0, 2.0, 0.0))
//!     .threshold(0.001)
//!     .max_iterations(10)
//!     .build();
//!
//! // Solve for target
//! let result = chain.solve_detailed(Transform::from_position(Vec3::new(1.0, 1.5, 0.0)));
//! println!("Converged: {}, iterations: {}", result.converged, result.iterations);
//! ```

pub mod ik;
pub mod math;
pub mod memory;

pub use ik::{
    AngleLimit, Chain, ChainBuilder, ChainN, ChainSettings, Constraint, ConstraintKind,
    FabrikSolver, HingeLimit, IkChain, Link, SolveResult,
};
pub use math::Transform;
pub use memory::{
    AllocError, AllocHandle, BlockAllocator, BlockAllocatorConfig, BufferBackend, DataProvider,
    FrameBufferConfig, FrameDoubleBuffer, HostBackend, HugeAllocator, PodData,
};
