use super::constraint::Constraint;
use crate::math::Transform;
use glam::Vec3;

/// One joint of an IK chain together with the link to its child.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Link {
    /// Transform relative to the parent joint (or the chain base for the root).
    pub local: Transform,
    /// Derived world transform, refreshed by the solver.
    pub world: Transform,
    /// Distance to the next joint. Zero for the tip.
    pub length: f32,
    pub constraint: Constraint,
}

impl Link {
    pub fn new(local: Transform) -> Self {
        Self {
            local,
            world: local,
            length: 0.0,
            constraint: Constraint::undefined(),
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn set_constraint(&mut self, constraint: Constraint) {
        self.constraint = constraint;
    }

    pub fn clear_constraint(&mut self) {
        self.constraint = Constraint::undefined();
    }

    pub fn position(&self) -> Vec3 {
        self.world.position
    }
}
