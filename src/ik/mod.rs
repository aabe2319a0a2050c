//! Inverse Kinematics module
//!
//! This module contains the joint constraints, chain storage and the FABRIK
//! solver implementation.

pub mod chain;
pub mod constraint;
pub mod joint;
pub mod solver;

pub use chain::{Chain, ChainBuilder, ChainN, ChainSettings, IkChain};
pub use constraint::{AngleLimit, Constraint, ConstraintKind, HingeLimit};
pub use joint::Link;
pub use solver::{FabrikSolver, SolveResult};
