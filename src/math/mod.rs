//! Math utilities module
//!
//! Provides convenient re-exports from glam, the rigid transform type and
//! degree-based rotation helpers.

pub mod rotation;
mod transform;

pub use transform::Transform;

// Re-export commonly used glam types
pub use glam::{Mat4, Quat, Vec3, Vec4};
