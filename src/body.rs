//! Rigid bodies and the handle-indexed body arena
//!
//! A [`RigidBody`] owns its mass/inertia and kinematic state and integrates
//! accumulated forces into motion. Bodies live in a [`BodySet`] arena and
//! are referenced everywhere else by [`BodyHandle`], so a contact can apply
//! corrections to a body it shares with other contacts without aliasing
//! trouble.
//!
//! The immovable convention is the usual one: `inverse_mass == 0.0` means
//! the body never moves. Immovable bodies never integrate, ignore applied
//! forces and solver corrections, and never toggle their awake state.

use crate::error::PhysicsError;
use glam::{Affine3A, Mat3, Quat, Vec3};
use tracing::trace;

/// Default exponential damping applied to linear velocity.
pub const DEFAULT_LINEAR_DAMPING: f32 = 0.95;
/// Default exponential damping applied to angular velocity.
pub const DEFAULT_ANGULAR_DAMPING: f32 = 0.8;
/// Default sleep threshold; normally overridden from `SimulationConfig`.
pub const DEFAULT_SLEEP_EPSILON: f32 = 0.3;

/// Handle into a [`BodySet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(u32);

impl BodyHandle {
    /// Index of the body inside its arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A rigid body: mass properties, pose, velocities and accumulators.
#[derive(Debug, Clone)]
pub struct RigidBody {
    inverse_mass: f32,
    inverse_inertia_tensor: Mat3,
    linear_damping: f32,
    angular_damping: f32,
    position: Vec3,
    orientation: Quat,
    velocity: Vec3,
    angular_velocity: Vec3,
    /// Base acceleration, gravity included.
    acceleration: Vec3,
    /// Acceleration actually applied during the last integration step.
    last_frame_acceleration: Vec3,
    inverse_inertia_tensor_world: Mat3,
    transform: Affine3A,
    force_accum: Vec3,
    torque_accum: Vec3,
    /// Exponentially smoothed kinetic-energy estimate for the sleep check.
    motion: f32,
    is_awake: bool,
    can_sleep: bool,
    sleep_epsilon: f32,
}

impl RigidBody {
    /// Create a dynamic body with the given mass at the origin.
    pub fn dynamic(mass: f32) -> Result<Self, PhysicsError> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(PhysicsError::InvalidMass(mass));
        }
        let mut body = Self {
            inverse_mass: 1.0 / mass,
            inverse_inertia_tensor: Mat3::IDENTITY,
            linear_damping: DEFAULT_LINEAR_DAMPING,
            angular_damping: DEFAULT_ANGULAR_DAMPING,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            last_frame_acceleration: Vec3::ZERO,
            inverse_inertia_tensor_world: Mat3::IDENTITY,
            transform: Affine3A::IDENTITY,
            force_accum: Vec3::ZERO,
            torque_accum: Vec3::ZERO,
            motion: DEFAULT_SLEEP_EPSILON * 2.0,
            is_awake: true,
            can_sleep: true,
            sleep_epsilon: DEFAULT_SLEEP_EPSILON,
        };
        body.calculate_derived_data();
        Ok(body)
    }

    /// Create an immovable body, used for ground planes and other anchors.
    pub fn fixed() -> Self {
        let mut body = Self {
            inverse_mass: 0.0,
            inverse_inertia_tensor: Mat3::ZERO,
            linear_damping: 1.0,
            angular_damping: 1.0,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            last_frame_acceleration: Vec3::ZERO,
            inverse_inertia_tensor_world: Mat3::ZERO,
            transform: Affine3A::IDENTITY,
            force_accum: Vec3::ZERO,
            torque_accum: Vec3::ZERO,
            motion: 0.0,
            is_awake: false,
            can_sleep: true,
            sleep_epsilon: DEFAULT_SLEEP_EPSILON,
        };
        body.calculate_derived_data();
        body
    }

    /// Builder-style position.
    pub fn at(mut self, position: Vec3) -> Self {
        self.set_position(position);
        self
    }

    /// Builder-style orientation.
    pub fn oriented(mut self, orientation: Quat) -> Self {
        self.set_orientation(orientation);
        self
    }

    /// Builder-style initial linear velocity.
    pub fn moving(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    // --- mass -----------------------------------------------------------

    /// Set the mass. Must be finite and positive; use [`RigidBody::fixed`]
    /// or [`RigidBody::set_infinite_mass`] for immovable bodies.
    pub fn set_mass(&mut self, mass: f32) -> Result<(), PhysicsError> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(PhysicsError::InvalidMass(mass));
        }
        self.inverse_mass = 1.0 / mass;
        Ok(())
    }

    /// Make the body immovable.
    pub fn set_infinite_mass(&mut self) {
        self.inverse_mass = 0.0;
        self.inverse_inertia_tensor = Mat3::ZERO;
        self.inverse_inertia_tensor_world = Mat3::ZERO;
        self.velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
        self.is_awake = false;
    }

    /// Mass of the body; `f32::INFINITY` for immovable bodies.
    pub fn mass(&self) -> f32 {
        if self.inverse_mass == 0.0 {
            f32::INFINITY
        } else {
            1.0 / self.inverse_mass
        }
    }

    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    /// Whether the body can move at all.
    pub fn has_finite_mass(&self) -> bool {
        self.inverse_mass > 0.0
    }

    // --- inertia --------------------------------------------------------

    /// Set the local inertia tensor from its coefficients: diagonal moments
    /// `(ix, iy, iz)` and products of inertia `(ixy, ixz, iyz)`.
    pub fn set_inertia_coefficients(
        &mut self,
        ix: f32,
        iy: f32,
        iz: f32,
        ixy: f32,
        ixz: f32,
        iyz: f32,
    ) -> Result<(), PhysicsError> {
        let tensor = Mat3::from_cols(
            Vec3::new(ix, -ixy, -ixz),
            Vec3::new(-ixy, iy, -iyz),
            Vec3::new(-ixz, -iyz, iz),
        );
        self.set_inertia_tensor(tensor)
    }

    /// Set the local inertia tensor directly.
    pub fn set_inertia_tensor(&mut self, tensor: Mat3) -> Result<(), PhysicsError> {
        let det = tensor.determinant();
        if !det.is_finite() || det.abs() < f32::EPSILON {
            return Err(PhysicsError::DegenerateInertia);
        }
        self.inverse_inertia_tensor = tensor.inverse();
        self.calculate_derived_data();
        Ok(())
    }

    /// World-space inverse inertia tensor, recomputed by
    /// [`calculate_derived_data`](Self::calculate_derived_data).
    pub fn inverse_inertia_tensor_world(&self) -> Mat3 {
        self.inverse_inertia_tensor_world
    }

    // --- damping --------------------------------------------------------

    /// Set the per-second exponential damping coefficients. A value of 1.0
    /// means no damping.
    pub fn set_damping(&mut self, linear: f32, angular: f32) {
        self.linear_damping = linear;
        self.angular_damping = angular;
    }

    // --- pose and velocity ----------------------------------------------

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.calculate_derived_data();
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation.normalize();
        self.calculate_derived_data();
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    pub fn set_angular_velocity(&mut self, angular_velocity: Vec3) {
        self.angular_velocity = angular_velocity;
    }

    /// Base acceleration, applied every step before accumulated forces.
    pub fn acceleration(&self) -> Vec3 {
        self.acceleration
    }

    pub fn set_acceleration(&mut self, acceleration: Vec3) {
        self.acceleration = acceleration;
    }

    /// Acceleration applied during the most recent integration step.
    pub fn last_frame_acceleration(&self) -> Vec3 {
        self.last_frame_acceleration
    }

    /// Cached world transform; valid after
    /// [`calculate_derived_data`](Self::calculate_derived_data).
    pub fn transform(&self) -> Affine3A {
        self.transform
    }

    /// Whether the cached transform is the identity, so shape bounding
    /// volumes can short-circuit to their untransformed cache.
    pub fn has_identity_transform(&self) -> bool {
        self.position == Vec3::ZERO && self.orientation == Quat::IDENTITY
    }

    // --- solver access --------------------------------------------------

    pub(crate) fn add_velocity(&mut self, delta: Vec3) {
        self.velocity += delta;
    }

    pub(crate) fn add_angular_velocity(&mut self, delta: Vec3) {
        self.angular_velocity += delta;
    }

    pub(crate) fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    /// Apply a scaled rotation-vector update to the orientation and
    /// renormalize; the transform cache is refreshed separately.
    pub(crate) fn add_scaled_orientation(&mut self, rotation: Vec3, scale: f32) {
        self.orientation = integrate_orientation(self.orientation, rotation, scale);
    }

    // --- space conversion -----------------------------------------------

    pub fn point_in_world_space(&self, point: Vec3) -> Vec3 {
        self.transform.transform_point3(point)
    }

    pub fn point_in_local_space(&self, point: Vec3) -> Vec3 {
        self.transform.inverse().transform_point3(point)
    }

    pub fn direction_in_world_space(&self, direction: Vec3) -> Vec3 {
        self.transform.transform_vector3(direction)
    }

    pub fn direction_in_local_space(&self, direction: Vec3) -> Vec3 {
        self.transform.inverse().transform_vector3(direction)
    }

    // --- forces ---------------------------------------------------------

    /// Accumulate a world-space force through the center of mass. Wakes the
    /// body; no-op for zero forces and immovable bodies.
    pub fn add_force(&mut self, force: Vec3) {
        if !self.has_finite_mass() || force.length_squared() == 0.0 {
            return;
        }
        self.force_accum += force;
        self.set_awake(true);
    }

    /// Accumulate a world-space torque. Wakes the body; no-op for zero
    /// torques and immovable bodies.
    pub fn add_torque(&mut self, torque: Vec3) {
        if !self.has_finite_mass() || torque.length_squared() == 0.0 {
            return;
        }
        self.torque_accum += torque;
        self.set_awake(true);
    }

    /// Accumulate a world-space force applied at a world-space point,
    /// producing both force and torque.
    pub fn add_force_at_point(&mut self, force: Vec3, point: Vec3) {
        if !self.has_finite_mass() || force.length_squared() == 0.0 {
            return;
        }
        let arm = point - self.position;
        self.force_accum += force;
        self.torque_accum += arm.cross(force);
        self.set_awake(true);
    }

    /// Accumulate a world-space force applied at a body-local point.
    pub fn add_force_at_body_point(&mut self, force: Vec3, point: Vec3) {
        let world_point = self.point_in_world_space(point);
        self.add_force_at_point(force, world_point);
    }

    pub(crate) fn clear_accumulators(&mut self) {
        self.force_accum = Vec3::ZERO;
        self.torque_accum = Vec3::ZERO;
    }

    // --- sleep ----------------------------------------------------------

    pub fn is_awake(&self) -> bool {
        self.is_awake
    }

    pub fn can_sleep(&self) -> bool {
        self.can_sleep
    }

    /// Wake or sleep the body. Waking seeds the motion estimate so the body
    /// does not instantly drop back to sleep; sleeping zeroes velocities.
    /// Immovable bodies never toggle.
    pub fn set_awake(&mut self, awake: bool) {
        if !self.has_finite_mass() {
            return;
        }
        if awake {
            self.is_awake = true;
            self.motion = self.sleep_epsilon * 2.0;
        } else {
            self.is_awake = false;
            self.velocity = Vec3::ZERO;
            self.angular_velocity = Vec3::ZERO;
        }
    }

    /// Allow or forbid sleeping. Forbidding wakes a sleeping body.
    pub fn set_can_sleep(&mut self, can_sleep: bool) {
        self.can_sleep = can_sleep;
        if !can_sleep && !self.is_awake {
            self.set_awake(true);
        }
    }

    /// Sleep threshold, normally set from `SimulationConfig`.
    pub fn set_sleep_epsilon(&mut self, sleep_epsilon: f32) {
        self.sleep_epsilon = sleep_epsilon;
    }

    /// Current smoothed kinetic-energy estimate.
    pub fn motion(&self) -> f32 {
        self.motion
    }

    // --- integration ----------------------------------------------------

    /// Refresh the cached world transform and world inverse inertia tensor
    /// from the current position and orientation.
    pub fn calculate_derived_data(&mut self) {
        self.orientation = self.orientation.normalize();
        self.transform = Affine3A::from_rotation_translation(self.orientation, self.position);
        let rot = Mat3::from_quat(self.orientation);
        self.inverse_inertia_tensor_world = rot * self.inverse_inertia_tensor * rot.transpose();
    }

    /// Advance the body's state by `dt` seconds. Skipped for sleeping and
    /// immovable bodies.
    pub fn integrate(&mut self, dt: f32) {
        if !self.is_awake || !self.has_finite_mass() {
            return;
        }

        self.last_frame_acceleration = self.acceleration + self.force_accum * self.inverse_mass;
        let angular_acceleration = self.inverse_inertia_tensor_world * self.torque_accum;

        self.velocity += self.last_frame_acceleration * dt;
        self.angular_velocity += angular_acceleration * dt;

        self.velocity *= self.linear_damping.powf(dt);
        self.angular_velocity *= self.angular_damping.powf(dt);

        self.position += self.velocity * dt;
        self.orientation = integrate_orientation(self.orientation, self.angular_velocity, dt);

        // Damping runs on both sides of the pose advance; the doubled
        // falloff is part of the integrator's tuned behaviour.
        self.velocity *= self.linear_damping.powf(dt);
        self.angular_velocity *= self.angular_damping.powf(dt);

        self.calculate_derived_data();
        self.clear_accumulators();

        if self.can_sleep {
            let current_motion =
                self.velocity.length_squared() + self.angular_velocity.length_squared();
            let bias = 0.5f32.powf(dt);
            self.motion = bias * self.motion + (1.0 - bias) * current_motion;

            if self.motion < self.sleep_epsilon {
                trace!(motion = self.motion, "body falling asleep");
                self.set_awake(false);
            } else if self.motion > 10.0 * self.sleep_epsilon {
                self.motion = 10.0 * self.sleep_epsilon;
            }
        }
    }
}

/// First-order quaternion exponential: treat the rotation vector as a pure
/// quaternion, take half its product with the current orientation, add and
/// renormalize.
fn integrate_orientation(orientation: Quat, rotation: Vec3, dt: f32) -> Quat {
    let w = Quat::from_xyzw(rotation.x * dt, rotation.y * dt, rotation.z * dt, 0.0);
    let delta = w * orientation;
    Quat::from_xyzw(
        orientation.x + delta.x * 0.5,
        orientation.y + delta.y * 0.5,
        orientation.z + delta.z * 0.5,
        orientation.w + delta.w * 0.5,
    )
    .normalize()
}

/// Arena of rigid bodies. Handles are stable; bodies are appended and never
/// removed during a step.
#[derive(Debug, Default)]
pub struct BodySet {
    bodies: Vec<RigidBody>,
}

impl BodySet {
    pub fn new() -> Self {
        Self { bodies: Vec::new() }
    }

    /// Add a body and return its handle.
    pub fn insert(&mut self, body: RigidBody) -> BodyHandle {
        let handle = BodyHandle(self.bodies.len() as u32);
        self.bodies.push(body);
        handle
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RigidBody> {
        self.bodies.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RigidBody> {
        self.bodies.iter_mut()
    }

    pub fn handles(&self) -> impl Iterator<Item = BodyHandle> {
        (0..self.bodies.len() as u32).map(BodyHandle)
    }
}

impl std::ops::Index<BodyHandle> for BodySet {
    type Output = RigidBody;

    fn index(&self, handle: BodyHandle) -> &RigidBody {
        &self.bodies[handle.index()]
    }
}

impl std::ops::IndexMut<BodyHandle> for BodySet {
    fn index_mut(&mut self, handle: BodyHandle) -> &mut RigidBody {
        &mut self.bodies[handle.index()]
    }
}
