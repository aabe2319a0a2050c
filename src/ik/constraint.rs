use crate::math::rotation::{
    angle, angle_axis, from_to_rotation, look_rotation, ortho_normalize, rotate_towards,
};
use glam::{Quat, Vec3};

/// Twist limit used by the cone constraint. At 180 degrees twist is left free.
pub const ANGLE_TWIST_LIMIT_DEG: f32 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AngleLimit {
    /// Maximum swing away from the constraint axis, in degrees.
    pub swing_limit: f32,
}

impl AngleLimit {
    pub fn new(swing_limit_degrees: f32) -> Self {
        Self {
            swing_limit: swing_limit_degrees,
        }
    }

    fn limit_angle(&self, rotation: Quat, axis: Vec3, secondary_axis: Vec3) -> Quat {
        let swing = self.limit_swing(rotation, axis);
        limit_twist(swing, axis, secondary_axis, ANGLE_TWIST_LIMIT_DEG)
    }

    fn limit_swing(&self, rotation: Quat, axis: Vec3) -> Quat {
        if axis == Vec3::ZERO || self.swing_limit >= 180.0 {
            return rotation;
        }
        if angle(rotation, Quat::IDENTITY) == 0.0 {
            return rotation;
        }

        let swing_axis = rotation * axis;
        let swing_rotation = from_to_rotation(axis, swing_axis);
        let limited_swing =
            rotate_towards(Quat::IDENTITY, swing_rotation, self.swing_limit.max(0.0));
        let to_limits = from_to_rotation(swing_axis, limited_swing * axis);

        (to_limits * rotation).normalize()
    }
}

/// Single-axis limit. `last_angle` integrates across calls and must be
/// reset with [`Constraint::reset`] when the pose comes from a new source.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HingeLimit {
    pub min_angle: f32,
    pub max_angle: f32,
    pub last_angle: f32,
}

impl HingeLimit {
    pub fn new(min_angle_degrees: f32, max_angle_degrees: f32) -> Self {
        Self {
            min_angle: min_angle_degrees.min(max_angle_degrees),
            max_angle: max_angle_degrees.max(min_angle_degrees),
            last_angle: 0.0,
        }
    }

    fn limit_hinge(&mut self, rotation: Quat, axis: Vec3, secondary_axis: Vec3) -> Quat {
        if self.min_angle == 0.0 && self.max_angle == 0.0 {
            return angle_axis(0.0, axis);
        }

        let free = limit_1dof(rotation, axis);

        let working_space =
            (angle_axis(self.last_angle, axis) * look_rotation(secondary_axis, axis)).inverse();
        let d = working_space * free * secondary_axis;
        let delta = d.x.atan2(d.z).to_degrees();

        // Written out instead of f32::clamp, which panics on inverted bounds.
        self.last_angle = (self.last_angle + delta).max(self.min_angle).min(self.max_angle);

        angle_axis(self.last_angle, axis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintKind {
    #[default]
    Undefined,
    Angle(AngleLimit),
    Hinge(HingeLimit),
}

/// Per-joint rotation limiter working in the joint's default local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Constraint {
    pub kind: ConstraintKind,
    /// Reference pose the limits are measured from.
    pub default_local_rotation: Quat,
    /// Constraint axis in local bone space.
    pub axis: Vec3,
}

impl Default for Constraint {
    fn default() -> Self {
        Self::undefined()
    }
}

impl Constraint {
    pub fn undefined() -> Self {
        Self {
            kind: ConstraintKind::Undefined,
            default_local_rotation: Quat::IDENTITY,
            axis: Vec3::X,
        }
    }

    pub fn angle(axis: Vec3, swing_limit_degrees: f32) -> Self {
        Self {
            kind: ConstraintKind::Angle(AngleLimit::new(swing_limit_degrees)),
            default_local_rotation: Quat::IDENTITY,
            axis,
        }
    }

    pub fn hinge(axis: Vec3, min_angle_degrees: f32, max_angle_degrees: f32) -> Self {
        Self {
            kind: ConstraintKind::Hinge(HingeLimit::new(min_angle_degrees, max_angle_degrees)),
            default_local_rotation: Quat::IDENTITY,
            axis,
        }
    }

    pub fn with_default_local_rotation(mut self, rotation: Quat) -> Self {
        self.default_local_rotation = rotation;
        self
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.kind, ConstraintKind::Undefined)
    }

    /// Helper direction `(axis.y, -axis.z, axis.x)`. Only orthogonal to the
    /// axis for coordinate-aligned axes; consumers ortho-normalize it.
    pub fn secondary_axis(&self) -> Vec3 {
        Vec3::new(self.axis.y, -self.axis.z, self.axis.x)
    }

    /// Current integrated hinge angle in degrees, `None` for other kinds.
    pub fn hinge_angle(&self) -> Option<f32> {
        match self.kind {
            ConstraintKind::Hinge(hinge) => Some(hinge.last_angle),
            _ => None,
        }
    }

    /// Clears accumulated state. Call when re-posing from a different
    /// animation source to avoid hinge angle discontinuities.
    pub fn reset(&mut self) {
        if let ConstraintKind::Hinge(hinge) = &mut self.kind {
            hinge.last_angle = 0.0;
        }
    }

    /// Projects a local rotation onto the allowed subspace.
    pub fn apply(&mut self, rotation: Quat) -> Quat {
        if self.is_undefined() || self.axis == Vec3::ZERO {
            return rotation;
        }

        let axis = self.axis;
        let secondary_axis = self.secondary_axis();
        let local = self.pre(rotation);

        let limited = match &mut self.kind {
            ConstraintKind::Undefined => local,
            ConstraintKind::Angle(limit) => limit.limit_angle(local, axis, secondary_axis),
            ConstraintKind::Hinge(hinge) => hinge.limit_hinge(local, axis, secondary_axis),
        };

        self.post(limited)
    }

    fn pre(&self, rotation: Quat) -> Quat {
        self.default_local_rotation.inverse() * rotation
    }

    fn post(&self, rotation: Quat) -> Quat {
        (self.default_local_rotation * rotation).normalize()
    }
}

/// Removes every rotation component not about `axis`.
pub fn limit_1dof(rotation: Quat, axis: Vec3) -> Quat {
    (from_to_rotation(rotation * axis, axis) * rotation).normalize()
}

/// Limits rotation about `axis`, measured through `ortho_axis`.
pub fn limit_twist(rotation: Quat, axis: Vec3, ortho_axis: Vec3, twist_limit: f32) -> Quat {
    let twist_limit = twist_limit.max(0.0).min(180.0);
    if twist_limit >= 180.0 {
        return rotation;
    }

    let mut normal = rotation * axis;
    let mut ortho_tangent = ortho_axis;
    ortho_normalize(&mut normal, &mut ortho_tangent);

    let mut rotated_normal = rotation * axis;
    let mut rotated_ortho_tangent = rotation * ortho_axis;
    ortho_normalize(&mut rotated_normal, &mut rotated_ortho_tangent);

    let fixed = (from_to_rotation(rotated_ortho_tangent, ortho_tangent) * rotation).normalize();
    if twist_limit <= 0.0 {
        return fixed;
    }

    rotate_towards(fixed, rotation, twist_limit)
}
