use super::chain::{ChainSettings, IkChain};
use super::joint::Link;
use crate::math::rotation::from_to_rotation;
use crate::math::Transform;
use glam::Vec3;

const DIRECTION_EPSILON: f32 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveResult {
    pub converged: bool,
    pub iterations: u32,
    pub final_distance: f32,
}

pub struct FabrikSolver;

impl FabrikSolver {
    pub fn solve<C: IkChain + ?Sized>(chain: &mut C, target: Transform) -> SolveResult {
        let settings = *chain.settings();
        let base = chain.base();
        Self::solve_links(chain.links_mut(), &base, &settings, &target)
    }

    /// Runs the solver over a bare slice of links anchored at `base`.
    pub fn solve_links(
        links: &mut [Link],
        base: &Transform,
        settings: &ChainSettings,
        target: &Transform,
    ) -> SolveResult {
        if links.is_empty() {
            return SolveResult {
                converged: true,
                iterations: 0,
                final_distance: 0.0,
            };
        }

        chain_to_world(links, base);

        let goal = target.position;
        let root = links[0].world.position;
        let threshold = settings.threshold;

        let distance = tip_distance(links, goal);
        if distance <= threshold || links.len() < 2 {
            Self::world_to_chain(links, base, settings, target);
            return SolveResult {
                converged: distance <= threshold,
                iterations: 0,
                final_distance: distance,
            };
        }

        let total_length: f32 = links.iter().map(|l| l.length).sum();
        if (goal - root).length() >= total_length {
            Self::stretch_towards_target(links, root, goal);
            Self::calc_world_transform(links, base);
            Self::world_to_chain(links, base, settings, target);

            let final_distance = tip_distance(links, goal);
            return SolveResult {
                converged: final_distance <= threshold,
                iterations: 1,
                final_distance,
            };
        }

        for iteration in 0..settings.max_iterations {
            Self::iterate_backward(links, goal);
            Self::iterate_forward(links, root);
            Self::calc_world_transform(links, base);

            let distance = tip_distance(links, goal);
            if distance <= threshold {
                Self::world_to_chain(links, base, settings, target);
                return SolveResult {
                    converged: true,
                    iterations: iteration + 1,
                    final_distance: distance,
                };
            }
        }

        Self::world_to_chain(links, base, settings, target);
        let final_distance = tip_distance(links, goal);
        SolveResult {
            converged: final_distance <= threshold,
            iterations: settings.max_iterations,
            final_distance,
        }
    }

    /// Pins the tip to `goal` and walks towards the root restoring link lengths.
    fn iterate_backward(links: &mut [Link], goal: Vec3) {
        let n = links.len();

        links[n - 1].world.position = goal;

        for i in (0..n - 1).rev() {
            let next_pos = links[i + 1].world.position;
            let curr_pos = links[i].world.position;

            let direction = match (curr_pos - next_pos).try_normalize() {
                Some(direction) => direction,
                None => -bone_direction(links, i),
            };

            if direction != Vec3::ZERO {
                links[i].world.position = next_pos + direction * links[i].length;
            }
        }
    }

    /// Pins the root to `base` and walks towards the tip restoring link lengths.
    fn iterate_forward(links: &mut [Link], base: Vec3) {
        let n = links.len();

        links[0].world.position = base;

        for i in 1..n {
            let prev_pos = links[i - 1].world.position;
            let curr_pos = links[i].world.position;

            let direction = match (curr_pos - prev_pos).try_normalize() {
                Some(direction) => direction,
                None => bone_direction(links, i - 1),
            };

            if direction != Vec3::ZERO {
                links[i].world.position = prev_pos + direction * links[i - 1].length;
            }
        }
    }

    fn stretch_towards_target(links: &mut [Link], base: Vec3, target: Vec3) {
        let direction = (target - base).normalize_or_zero();

        if direction == Vec3::ZERO {
            return;
        }

        links[0].world.position = base;

        for i in 1..links.len() {
            let prev = links[i - 1].world.position;
            links[i].world.position = prev + direction * links[i - 1].length;
        }
    }

    /// Rebuilds joint rotations from the solved positions, running each
    /// joint's constraint on its local rotation. Once a constraint changes a
    /// rotation, that child and everything below it is re-placed from the
    /// constrained rotations and bind offsets.
    fn calc_world_transform(links: &mut [Link], base: &Transform) {
        let n = links.len();
        let mut parent_rotation = base.rotation;
        let mut displaced = false;

        for i in 0..n {
            if i + 1 == n {
                links[i].world.rotation = (parent_rotation * links[i].local.rotation).normalize();
                break;
            }

            let bind_offset = links[i + 1].local.position;
            let current = links[i].world.rotation * bind_offset;
            let desired = links[i + 1].world.position - links[i].world.position;

            let free_world = if current.length_squared() > DIRECTION_EPSILON
                && desired.length_squared() > DIRECTION_EPSILON
            {
                (from_to_rotation(current, desired) * links[i].world.rotation).normalize()
            } else {
                links[i].world.rotation
            };

            let free_local = parent_rotation.inverse() * free_world;
            let local = links[i].constraint.apply(free_local);
            let world_rotation = (parent_rotation * local).normalize();

            links[i].local.rotation = local;
            links[i].world.rotation = world_rotation;

            if local != free_local {
                displaced = true;
            }
            if displaced {
                links[i + 1].world.position =
                    links[i].world.position + world_rotation * bind_offset;
            }

            parent_rotation = world_rotation;
        }
    }

    /// Writes the solved world rotations back into local space.
    fn world_to_chain(
        links: &mut [Link],
        base: &Transform,
        settings: &ChainSettings,
        target: &Transform,
    ) {
        if settings.orient_tip {
            let n = links.len();
            let parent_rotation = if n >= 2 {
                links[n - 2].world.rotation
            } else {
                base.rotation
            };
            let tip = &mut links[n - 1];
            let local = tip.constraint.apply(parent_rotation.inverse() * target.rotation);
            tip.world.rotation = (parent_rotation * local).normalize();
        }

        let mut parent_rotation = base.rotation;
        for link in links.iter_mut() {
            link.local.rotation = (parent_rotation.inverse() * link.world.rotation).normalize();
            parent_rotation = link.world.rotation;
        }
    }
}

/// Forward kinematics: composes `base` and every local transform root to tip.
pub fn chain_to_world(links: &mut [Link], base: &Transform) {
    let mut parent = *base;
    for link in links.iter_mut() {
        link.world = parent.compose(&link.local);
        parent = link.world;
    }
}

fn tip_distance(links: &[Link], goal: Vec3) -> f32 {
    links
        .last()
        .map(|l| (l.world.position - goal).length())
        .unwrap_or(0.0)
}

/// Current world direction of the link from joint `i` to joint `i + 1`.
fn bone_direction(links: &[Link], i: usize) -> Vec3 {
    (links[i].world.rotation * links[i + 1].local.position).normalize_or_zero()
}
