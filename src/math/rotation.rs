//! Degree-based quaternion helpers shared by the joint constraints.
//!
//! All angles in this module are in degrees, matching how rig limits are
//! authored.

use glam::{Mat3, Quat, Vec3};

/// Below this many degrees two rotations are considered equal.
pub const ANGLE_EPSILON_DEG: f32 = 1e-6;

/// `|dot|` values this close to one are treated as the same rotation.
const DOT_EPSILON: f32 = 1e-6;

/// Angle in degrees between two rotations, `2 * acos(min(|dot(a, b)|, 1))`.
///
/// Results below [`ANGLE_EPSILON_DEG`] (or within f32 resolution of it) snap to zero.
pub fn angle(a: Quat, b: Quat) -> f32 {
    let dot = a.dot(b).abs().min(1.0);
    if dot > 1.0 - DOT_EPSILON {
        return 0.0;
    }
    let degrees = (dot.acos() * 2.0).to_degrees();
    if degrees < ANGLE_EPSILON_DEG {
        0.0
    } else {
        degrees
    }
}

/// Rotates `from` towards `to` by at most `max_degrees`.
///
/// Returns `to` itself once the remaining angle fits inside the step.
pub fn rotate_towards(from: Quat, to: Quat, max_degrees: f32) -> Quat {
    let angle = angle(from, to);
    if angle == 0.0 || max_degrees >= angle {
        return to;
    }
    from.slerp(to, (max_degrees / angle).max(0.0))
}

/// Shortest-arc rotation mapping direction `from` onto direction `to`.
pub fn from_to_rotation(from: Vec3, to: Vec3) -> Quat {
    let from = from.normalize_or_zero();
    let to = to.normalize_or_zero();
    if from == Vec3::ZERO || to == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(from, to)
}

/// Rotation of `degrees` around `axis`. A zero axis yields identity.
pub fn angle_axis(degrees: f32, axis: Vec3) -> Quat {
    let axis = axis.normalize_or_zero();
    if axis == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_axis_angle(axis, degrees.to_radians())
}

/// Rotation whose local +Z points along `forward` and whose local +Y is as
/// close to `up` as the forward direction allows.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let forward = forward.normalize_or_zero();
    if forward == Vec3::ZERO {
        return Quat::IDENTITY;
    }

    let right = up.cross(forward);
    if right.length_squared() < 1e-12 {
        return Quat::from_rotation_arc(Vec3::Z, forward);
    }
    let right = right.normalize();
    let up = forward.cross(right);

    Quat::from_mat3(&Mat3::from_cols(right, up, forward)).normalize()
}

/// Normalizes `normal` and makes `tangent` a unit vector orthogonal to it.
pub fn ortho_normalize(normal: &mut Vec3, tangent: &mut Vec3) {
    *normal = normal.normalize_or_zero();
    if *normal == Vec3::ZERO {
        *tangent = tangent.normalize_or_zero();
        return;
    }

    let projected = *tangent - *normal * normal.dot(*tangent);
    *tangent = if projected.length_squared() < 1e-12 {
        normal.any_orthonormal_vector()
    } else {
        projected.normalize()
    };
}

/// Angle in degrees between two directions; zero if either is degenerate.
pub fn direction_angle(a: Vec3, b: Vec3) -> f32 {
    if a.length_squared() < 1e-12 || b.length_squared() < 1e-12 {
        return 0.0;
    }
    a.angle_between(b).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_is_zero_for_identical_rotations() {
        let q = Quat::from_euler(glam::EulerRot::XYZ, 0.3, -1.2, 2.0);
        assert_eq!(angle(q, q), 0.0);
        assert_eq!(angle(Quat::IDENTITY, Quat::IDENTITY), 0.0);
    }

    #[test]
    fn angle_ignores_quaternion_sign() {
        let q = Quat::from_rotation_x(1.0);
        assert_eq!(angle(q, -q), 0.0);
    }

    #[test]
    fn angle_is_symmetric() {
        let a = Quat::from_rotation_y(0.4);
        let b = Quat::from_rotation_z(-1.1);
        assert!((angle(a, b) - angle(b, a)).abs() < 1e-4);
    }

    #[test]
    fn angle_matches_axis_rotation() {
        let q = angle_axis(90.0, Vec3::X);
        assert!((angle(Quat::IDENTITY, q) - 90.0).abs() < 1e-3);
    }

    #[test]
    fn rotate_towards_returns_target_when_step_covers_it() {
        let from = Quat::IDENTITY;
        let to = angle_axis(30.0, Vec3::Y);
        assert_eq!(rotate_towards(from, to, angle(from, to)), to);
        assert_eq!(rotate_towards(from, to, 180.0), to);
    }

    #[test]
    fn rotate_towards_limits_step() {
        let to = angle_axis(90.0, Vec3::Y);
        let stepped = rotate_towards(Quat::IDENTITY, to, 30.0);
        assert!((angle(Quat::IDENTITY, stepped) - 30.0).abs() < 1e-2);
    }

    #[test]
    fn from_to_rotation_handles_zero_vectors() {
        assert_eq!(from_to_rotation(Vec3::ZERO, Vec3::X), Quat::IDENTITY);
        let q = from_to_rotation(Vec3::X, Vec3::Y);
        assert!((q * Vec3::X - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn look_rotation_maps_z_and_y() {
        let q = look_rotation(Vec3::X, Vec3::Y);
        assert!((q * Vec3::Z - Vec3::X).length() < 1e-5);
        assert!((q * Vec3::Y - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn ortho_normalize_produces_orthogonal_pair() {
        let mut n = Vec3::new(0.0, 2.0, 0.0);
        let mut t = Vec3::new(1.0, 1.0, 0.0);
        ortho_normalize(&mut n, &mut t);
        assert!((n.length() - 1.0).abs() < 1e-5);
        assert!((t.length() - 1.0).abs() < 1e-5);
        assert!(n.dot(t).abs() < 1e-5);
    }
}
