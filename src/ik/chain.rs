use super::constraint::Constraint;
use super::joint::Link;
use super::solver::{chain_to_world, FabrikSolver, SolveResult};
use crate::math::Transform;
use glam::Vec3;

pub const DEFAULT_MAX_ITERATIONS: u32 = 4;
pub const DEFAULT_THRESHOLD: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChainSettings {
    pub max_iterations: u32,
    /// Tip-to-goal distance accepted as converged.
    pub threshold: f32,
    /// Rotate the tip joint to the target orientation after solving.
    pub orient_tip: bool,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            threshold: DEFAULT_THRESHOLD,
            orient_tip: false,
        }
    }
}

/// Storage-agnostic view of a chain, shared by [`Chain`] and [`ChainN`].
pub trait IkChain {
    fn links(&self) -> &[Link];
    fn links_mut(&mut self) -> &mut [Link];
    fn settings(&self) -> &ChainSettings;
    /// World transform of the root joint's parent space.
    fn base(&self) -> Transform;

    /// Solves towards `target` and reports whether the tip converged.
    fn solve(&mut self, target: Transform) -> bool {
        FabrikSolver::solve(self, target).converged
    }

    fn solve_detailed(&mut self, target: Transform) -> SolveResult {
        FabrikSolver::solve(self, target)
    }

    fn joint_count(&self) -> usize {
        self.links().len()
    }

    fn total_length(&self) -> f32 {
        self.links().iter().map(|l| l.length).sum()
    }

    fn end_effector(&self) -> Option<Vec3> {
        self.links().last().map(|l| l.world.position)
    }

    fn root_position(&self) -> Option<Vec3> {
        self.links().first().map(|l| l.world.position)
    }

    fn positions(&self) -> Vec<Vec3> {
        self.links().iter().map(|l| l.world.position).collect()
    }

    fn local_transforms(&self) -> Vec<Transform> {
        self.links().iter().map(|l| l.local).collect()
    }

    /// Clears hinge accumulators on every joint.
    fn reset_constraints(&mut self) {
        for link in self.links_mut() {
            link.constraint.reset();
        }
    }
}

/// Recomputes link lengths from the bind offsets: `length[i] = |local[i + 1].position|`.
pub(crate) fn compute_lengths(links: &mut [Link]) {
    let n = links.len();
    for i in 0..n {
        links[i].length = if i + 1 < n {
            links[i + 1].local.position.length()
        } else {
            0.0
        };
    }
}

fn assign_bind_pose(links: &mut [Link], pose: &[Transform], base: &Transform) {
    for (link, local) in links.iter_mut().zip(pose) {
        link.local = *local;
    }
    compute_lengths(links);
    chain_to_world(links, base);
}

/// Growable chain backed by a `Vec`.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    pub(crate) links: Vec<Link>,
    pub(crate) settings: ChainSettings,
    pub(crate) base: Transform,
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    pub fn new(settings: ChainSettings) -> Self {
        Self {
            links: Vec::new(),
            settings,
            base: Transform::IDENTITY,
        }
    }

    pub fn from_bind_pose(pose: &[Transform], settings: ChainSettings) -> Self {
        let mut chain = Self::new(settings);
        chain.set_bind_pose(pose);
        chain
    }

    /// Reallocates the chain to `size` joints. All previous link state,
    /// constraints included, is discarded.
    pub fn set_chain_size(&mut self, size: usize) {
        self.links = vec![Link::default(); size];
    }

    /// Resizes to `pose.len()` and takes the transforms as the new bind pose.
    /// Constraints of surviving joints are kept.
    pub fn set_bind_pose(&mut self, pose: &[Transform]) {
        self.links.resize(pose.len(), Link::default());
        assign_bind_pose(&mut self.links, pose, &self.base);
    }

    pub fn set_constraint(&mut self, joint: usize, constraint: Constraint) {
        if let Some(link) = self.links.get_mut(joint) {
            link.constraint = constraint;
        }
    }

    pub fn set_base(&mut self, base: Transform) {
        self.base = base;
        chain_to_world(&mut self.links, &self.base);
    }

    pub fn settings_mut(&mut self) -> &mut ChainSettings {
        &mut self.settings
    }
}

impl IkChain for Chain {
    fn links(&self) -> &[Link] {
        &self.links
    }

    fn links_mut(&mut self) -> &mut [Link] {
        &mut self.links
    }

    fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    fn base(&self) -> Transform {
        self.base
    }
}

/// Chain with a compile-time joint count.
#[derive(Debug, Clone)]
pub struct ChainN<const N: usize> {
    links: [Link; N],
    settings: ChainSettings,
    base: Transform,
}

impl<const N: usize> ChainN<N> {
    pub fn from_bind_pose(pose: [Transform; N], settings: ChainSettings) -> Self {
        let mut chain = Self {
            links: [Link::default(); N],
            settings,
            base: Transform::IDENTITY,
        };
        assign_bind_pose(&mut chain.links, &pose, &chain.base);
        chain
    }

    pub fn with_constraints(mut self, constraints: [Constraint; N]) -> Self {
        for (link, constraint) in self.links.iter_mut().zip(constraints) {
            link.constraint = constraint;
        }
        self
    }

    pub fn set_constraint(&mut self, joint: usize, constraint: Constraint) {
        if let Some(link) = self.links.get_mut(joint) {
            link.constraint = constraint;
        }
    }

    pub fn set_base(&mut self, base: Transform) {
        self.base = base;
        chain_to_world(&mut self.links, &self.base);
    }

    pub fn settings_mut(&mut self) -> &mut ChainSettings {
        &mut self.settings
    }
}

impl<const N: usize> IkChain for ChainN<N> {
    fn links(&self) -> &[Link] {
        &self.links
    }

    fn links_mut(&mut self) -> &mut [Link] {
        &mut self.links
    }

    fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    fn base(&self) -> Transform {
        self.base
    }
}

pub struct ChainBuilder {
    links: Vec<Link>,
    settings: ChainSettings,
    base: Transform,
    tip_world: Transform,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self {
            links: Vec::new(),
            settings: ChainSettings::default(),
            base: Transform::IDENTITY,
            tip_world: Transform::IDENTITY,
        }
    }

    /// Appends a joint given its transform relative to the previous joint.
    pub fn add_joint(mut self, local: Transform) -> Self {
        self.push(Link::new(local));
        self
    }

    pub fn add_joint_with_constraint(mut self, local: Transform, constraint: Constraint) -> Self {
        self.push(Link::new(local).with_constraint(constraint));
        self
    }

    /// Appends a joint at a world position, keeping the parent's orientation.
    pub fn add_joint_at(self, position: Vec3) -> Self {
        let local = self.local_offset(position);
        self.add_joint(local)
    }

    pub fn add_joint_at_with_constraint(self, position: Vec3, constraint: Constraint) -> Self {
        let local = self.local_offset(position);
        self.add_joint_with_constraint(local, constraint)
    }

    /// Must be set before joints are added with world positions.
    pub fn base(mut self, base: Transform) -> Self {
        self.base = base;
        self.tip_world = base;
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.settings.threshold = threshold;
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.settings.max_iterations = max_iterations;
        self
    }

    pub fn orient_tip(mut self, orient_tip: bool) -> Self {
        self.settings.orient_tip = orient_tip;
        self
    }

    pub fn build(self) -> Chain {
        let mut chain = Chain {
            links: self.links,
            settings: self.settings,
            base: self.base,
        };
        compute_lengths(&mut chain.links);
        chain_to_world(&mut chain.links, &chain.base);
        chain
    }

    /// Builds a fixed-size chain; `None` when the joint count is not `N`.
    pub fn build_fixed<const N: usize>(self) -> Option<ChainN<N>> {
        let chain = self.build();
        let links: [Link; N] = chain.links.try_into().ok()?;
        Some(ChainN {
            links,
            settings: chain.settings,
            base: chain.base,
        })
    }

    fn push(&mut self, link: Link) {
        self.tip_world = self.tip_world.compose(&link.local);
        self.links.push(link);
    }

    fn local_offset(&self, position: Vec3) -> Transform {
        let parent = self.tip_world;
        Transform::from_position(parent.rotation.inverse() * (position - parent.position))
    }
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_pose() -> [Transform; 3] {
        [
            Transform::IDENTITY,
            Transform::from_position(Vec3::Y * 2.0),
            Transform::from_position(Vec3::Y * 3.0),
        ]
    }

    #[test]
    fn lengths_come_from_child_offsets() {
        let chain = Chain::from_bind_pose(&straight_pose(), ChainSettings::default());
        let lengths: Vec<f32> = chain.links().iter().map(|l| l.length).collect();
        assert_eq!(lengths, vec![2.0, 3.0, 0.0]);
        assert_eq!(chain.total_length(), 5.0);
        assert_eq!(chain.end_effector(), Some(Vec3::Y * 5.0));
    }

    #[test]
    fn fixed_and_dynamic_chains_agree() {
        let dynamic = Chain::from_bind_pose(&straight_pose(), ChainSettings::default());
        let fixed = ChainN::from_bind_pose(straight_pose(), ChainSettings::default());
        assert_eq!(dynamic.positions(), fixed.positions());
        assert_eq!(dynamic.total_length(), fixed.total_length());
    }

    #[test]
    fn fixed_and_dynamic_chains_solve_identically() {
        let mut dynamic = Chain::from_bind_pose(&straight_pose(), ChainSettings::default());
        dynamic.set_constraint(1, Constraint::hinge(Vec3::Z, -90.0, 90.0));
        let mut fixed = ChainN::from_bind_pose(straight_pose(), ChainSettings::default());
        fixed.set_constraint(1, Constraint::hinge(Vec3::Z, -90.0, 90.0));

        let target = Transform::from_position(Vec3::new(2.0, 3.0, 0.5));
        assert_eq!(dynamic.solve_detailed(target), fixed.solve_detailed(target));
        assert_eq!(dynamic.positions(), fixed.positions());
        assert_eq!(dynamic.local_transforms(), fixed.local_transforms());
    }

    #[test]
    fn set_chain_size_discards_previous_links() {
        let mut chain = Chain::from_bind_pose(&straight_pose(), ChainSettings::default());
        chain.set_constraint(1, Constraint::hinge(Vec3::X, -10.0, 10.0));
        chain.set_chain_size(5);
        assert_eq!(chain.joint_count(), 5);
        assert!(chain.links().iter().all(|l| l.constraint.is_undefined() && l.length == 0.0));
    }

    #[test]
    fn builder_converts_world_positions_to_offsets() {
        let chain = Chain::builder()
            .base(Transform::from_position(Vec3::new(1.0, 0.0, 0.0)))
            .add_joint_at(Vec3::new(1.0, 0.0, 0.0))
            .add_joint_at(Vec3::new(1.0, 1.0, 0.0))
            .add_joint_at(Vec3::new(1.0, 1.0, 2.0))
            .build();
        assert_eq!(chain.links()[0].local.position, Vec3::ZERO);
        assert_eq!(chain.links()[2].local.position, Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(chain.total_length(), 3.0);
        assert_eq!(chain.end_effector(), Some(Vec3::new(1.0, 1.0, 2.0)));
    }

    #[test]
    fn build_fixed_checks_joint_count() {
        let builder = || {
            Chain::builder()
                .add_joint_at(Vec3::ZERO)
                .add_joint_at(Vec3::X)
        };
        assert!(builder().build_fixed::<2>().is_some());
        assert!(builder().build_fixed::<3>().is_none());
    }
}
