//! Contacts and their resolution math
//!
//! A [`Contact`] holds the raw geometry produced by the narrow phase (point,
//! normal, penetration) plus step-scoped derived state built by
//! [`calculate_internals`](Contact::calculate_internals): the contact-space
//! basis, relative contact positions, closing velocity and the velocity
//! change required to satisfy restitution. The two `apply_*` operations do
//! the actual work of the resolver: an impulse in contact space (with a
//! Coulomb friction cone when friction is non-zero) and a direct positional
//! correction split between linear and angular motion.
//!
//! Contacts reference their one or two bodies by handle; the second slot may
//! be empty, meaning "the immovable world".

use crate::body::{BodyHandle, BodySet};
use glam::{Mat3, Vec3};

/// Closing speeds below this are treated as resting contact: restitution is
/// dropped to avoid vibration from micro-bounces.
const RESTING_VELOCITY_LIMIT: f32 = 0.25;

/// Fraction of the leverage-projected distance the angular part of a
/// position correction may use; beyond this the correction is shifted back
/// to linear motion to avoid over-rotating bodies.
const ANGULAR_MOVE_LIMIT: f32 = 0.2;

/// A single contact between two bodies (or one body and the world).
#[derive(Debug, Clone)]
pub struct Contact {
    bodies: [Option<BodyHandle>; 2],
    point: Vec3,
    normal: Vec3,
    penetration: f32,
    friction: f32,
    restitution: f32,

    // Derived, step-scoped state.
    contact_to_world: Mat3,
    contact_velocity: Vec3,
    desired_delta_velocity: f32,
    relative_contact_position: [Vec3; 2],
}

impl Contact {
    /// Store the raw contact geometry. The normal points in the direction
    /// the first participant must move to separate.
    pub fn new(
        bodies: [Option<BodyHandle>; 2],
        point: Vec3,
        normal: Vec3,
        penetration: f32,
        friction: f32,
        restitution: f32,
    ) -> Self {
        Self {
            bodies,
            point,
            normal,
            penetration,
            friction,
            restitution,
            contact_to_world: Mat3::IDENTITY,
            contact_velocity: Vec3::ZERO,
            desired_delta_velocity: 0.0,
            relative_contact_position: [Vec3::ZERO; 2],
        }
    }

    pub fn bodies(&self) -> [Option<BodyHandle>; 2] {
        self.bodies
    }

    pub fn body(&self, slot: usize) -> Option<BodyHandle> {
        self.bodies[slot]
    }

    pub fn point(&self) -> Vec3 {
        self.point
    }

    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn penetration(&self) -> f32 {
        self.penetration
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    /// Contact-to-world basis; columns are the normal and the two tangents.
    pub fn contact_to_world(&self) -> Mat3 {
        self.contact_to_world
    }

    /// Closing velocity in contact space (x along the normal).
    pub fn contact_velocity(&self) -> Vec3 {
        self.contact_velocity
    }

    /// Velocity change along the normal required to satisfy restitution.
    pub fn desired_delta_velocity(&self) -> f32 {
        self.desired_delta_velocity
    }

    pub fn relative_contact_position(&self, slot: usize) -> Vec3 {
        self.relative_contact_position[slot]
    }

    /// Re-point the contact at a body pair and material values, keeping
    /// the stored geometry. Used by contact generators that recycle
    /// geometry across pairs.
    pub fn set_body_data(
        &mut self,
        bodies: [Option<BodyHandle>; 2],
        friction: f32,
        restitution: f32,
    ) {
        self.bodies = bodies;
        self.friction = friction;
        self.restitution = restitution;
    }

    pub(crate) fn adjust_penetration(&mut self, delta: f32) {
        self.penetration += delta;
    }

    pub(crate) fn adjust_contact_velocity(&mut self, delta: Vec3) {
        self.contact_velocity += delta;
    }

    /// Swap the participants and flip the normal. Only meaningful before
    /// derived data is built.
    fn swap_bodies(&mut self) {
        self.normal = -self.normal;
        self.bodies.swap(0, 1);
    }

    /// Wake whichever of the two bodies is asleep if the other is awake.
    /// Contacts with the world never wake anything.
    pub fn match_awake_state(&self, bodies: &mut BodySet) {
        let (Some(b0), Some(b1)) = (self.bodies[0], self.bodies[1]) else {
            return;
        };
        let awake0 = bodies[b0].is_awake();
        let awake1 = bodies[b1].is_awake();
        if awake0 != awake1 {
            if awake0 {
                bodies[b1].set_awake(true);
            } else {
                bodies[b0].set_awake(true);
            }
        }
    }

    /// Build the step-scoped derived state: basis, relative positions,
    /// closing velocity and desired delta velocity. Ensures the first body
    /// slot is occupied, swapping (and flipping the normal) if needed.
    pub fn calculate_internals(&mut self, bodies: &BodySet, dt: f32) {
        if self.bodies[0].is_none() {
            self.swap_bodies();
        }
        debug_assert!(self.bodies[0].is_some(), "contact with no bodies");

        self.contact_to_world = contact_basis(self.normal);

        for slot in 0..2 {
            if let Some(handle) = self.bodies[slot] {
                self.relative_contact_position[slot] = self.point - bodies[handle].position();
            }
        }

        self.contact_velocity = self.local_velocity(bodies, 0, dt);
        if self.bodies[1].is_some() {
            self.contact_velocity -= self.local_velocity(bodies, 1, dt);
        }

        self.calculate_desired_delta_velocity(bodies, dt);
    }

    /// Contact-space velocity of one body at the contact point, including
    /// the planar part of the last frame's acceleration (the normal
    /// component is discounted: it is resolved through restitution).
    fn local_velocity(&self, bodies: &BodySet, slot: usize, dt: f32) -> Vec3 {
        let handle = self.bodies[slot].expect("slot checked by caller");
        let body = &bodies[handle];
        let rel = self.relative_contact_position[slot];

        let velocity = body.angular_velocity().cross(rel) + body.velocity();
        let contact_velocity = self.contact_to_world.transpose() * velocity;

        let mut acc_velocity =
            self.contact_to_world.transpose() * (body.last_frame_acceleration() * dt);
        acc_velocity.x = 0.0;

        contact_velocity + acc_velocity
    }

    /// Recompute the desired delta velocity from the current contact
    /// velocity; also used after velocity propagation from other contacts.
    pub(crate) fn calculate_desired_delta_velocity(&mut self, bodies: &BodySet, dt: f32) {
        // Velocity accumulated from acceleration this step must not bounce.
        let mut velocity_from_acc = 0.0;
        if let Some(b0) = self.bodies[0] {
            if bodies[b0].is_awake() {
                velocity_from_acc += (bodies[b0].last_frame_acceleration() * dt).dot(self.normal);
            }
        }
        if let Some(b1) = self.bodies[1] {
            if bodies[b1].is_awake() {
                velocity_from_acc -= (bodies[b1].last_frame_acceleration() * dt).dot(self.normal);
            }
        }

        let restitution = if self.contact_velocity.x.abs() < RESTING_VELOCITY_LIMIT {
            0.0
        } else {
            self.restitution
        };

        self.desired_delta_velocity =
            -self.contact_velocity.x - restitution * (self.contact_velocity.x - velocity_from_acc);
    }

    /// Apply the impulse that produces the desired velocity change, and
    /// return the per-slot velocity and rotation deltas for propagation to
    /// contacts sharing a body.
    pub fn apply_velocity_change(&mut self, bodies: &mut BodySet) -> ([Vec3; 2], [Vec3; 2]) {
        let b0 = self.bodies[0].expect("internals calculated");

        let iit = [
            bodies[b0].inverse_inertia_tensor_world(),
            self.bodies[1]
                .map(|h| bodies[h].inverse_inertia_tensor_world())
                .unwrap_or(Mat3::ZERO),
        ];

        let impulse_contact = if self.friction == 0.0 {
            self.frictionless_impulse(bodies, &iit)
        } else {
            self.friction_impulse(bodies, &iit)
        };
        let impulse = self.contact_to_world * impulse_contact;

        let mut velocity_change = [Vec3::ZERO; 2];
        let mut rotation_change = [Vec3::ZERO; 2];

        let impulsive_torque = self.relative_contact_position[0].cross(impulse);
        rotation_change[0] = iit[0] * impulsive_torque;
        velocity_change[0] = impulse * bodies[b0].inverse_mass();
        bodies[b0].add_velocity(velocity_change[0]);
        bodies[b0].add_angular_velocity(rotation_change[0]);

        if let Some(b1) = self.bodies[1] {
            // Opposite sign for the second body: reversed cross order and
            // negated inverse mass.
            let impulsive_torque = impulse.cross(self.relative_contact_position[1]);
            rotation_change[1] = iit[1] * impulsive_torque;
            velocity_change[1] = impulse * -bodies[b1].inverse_mass();
            bodies[b1].add_velocity(velocity_change[1]);
            bodies[b1].add_angular_velocity(rotation_change[1]);
        }

        (velocity_change, rotation_change)
    }

    /// Closed-form impulse along the normal only.
    fn frictionless_impulse(&self, bodies: &BodySet, iit: &[Mat3; 2]) -> Vec3 {
        let b0 = self.bodies[0].expect("internals calculated");

        let rel0 = self.relative_contact_position[0];
        let delta_vel_world = (iit[0] * rel0.cross(self.normal)).cross(rel0);
        let mut delta_velocity = delta_vel_world.dot(self.normal) + bodies[b0].inverse_mass();

        if let Some(b1) = self.bodies[1] {
            let rel1 = self.relative_contact_position[1];
            let delta_vel_world = (iit[1] * rel1.cross(self.normal)).cross(rel1);
            delta_velocity += delta_vel_world.dot(self.normal) + bodies[b1].inverse_mass();
        }

        Vec3::new(self.desired_delta_velocity / delta_velocity, 0.0, 0.0)
    }

    /// Full 3x3 contact-space solve, clamped to the Coulomb friction cone.
    fn friction_impulse(&self, bodies: &BodySet, iit: &[Mat3; 2]) -> Vec3 {
        let b0 = self.bodies[0].expect("internals calculated");
        let mut inverse_mass = bodies[b0].inverse_mass();

        // Unit impulse -> torque -> rotation -> velocity, as a matrix.
        let impulse_to_torque = skew_symmetric(self.relative_contact_position[0]);
        let mut delta_vel_world = -(impulse_to_torque * iit[0] * impulse_to_torque);

        if let Some(b1) = self.bodies[1] {
            let impulse_to_torque = skew_symmetric(self.relative_contact_position[1]);
            delta_vel_world += -(impulse_to_torque * iit[1] * impulse_to_torque);
            inverse_mass += bodies[b1].inverse_mass();
        }

        let mut delta_velocity =
            self.contact_to_world.transpose() * delta_vel_world * self.contact_to_world;
        delta_velocity += Mat3::from_diagonal(Vec3::splat(inverse_mass));

        let impulse_matrix = delta_velocity.inverse();

        // Velocity to kill: the desired normal change plus all sliding.
        let vel_kill = Vec3::new(
            self.desired_delta_velocity,
            -self.contact_velocity.y,
            -self.contact_velocity.z,
        );
        let mut impulse_contact = impulse_matrix * vel_kill;

        let planar_impulse =
            (impulse_contact.y * impulse_contact.y + impulse_contact.z * impulse_contact.z).sqrt();
        if planar_impulse > impulse_contact.x * self.friction {
            // Dynamic friction: rescale the tangential impulse onto the
            // cone and re-derive the normal impulse with the coupling.
            impulse_contact.y /= planar_impulse;
            impulse_contact.z /= planar_impulse;

            let row0 = delta_velocity.row(0);
            impulse_contact.x = self.desired_delta_velocity
                / (row0.x
                    + row0.y * self.friction * impulse_contact.y
                    + row0.z * self.friction * impulse_contact.z);
            impulse_contact.y *= self.friction * impulse_contact.x;
            impulse_contact.z *= self.friction * impulse_contact.x;
        }

        impulse_contact
    }

    /// Resolve `penetration` by moving the bodies directly, splitting the
    /// correction between linear and angular motion in proportion to each
    /// body's inertia at the contact. Returns the per-slot linear and
    /// angular deltas for propagation.
    pub fn apply_position_change(
        &mut self,
        bodies: &mut BodySet,
        penetration: f32,
    ) -> ([Vec3; 2], [Vec3; 2]) {
        let mut linear_change = [Vec3::ZERO; 2];
        let mut angular_change = [Vec3::ZERO; 2];

        let mut linear_inertia = [0.0f32; 2];
        let mut angular_inertia = [0.0f32; 2];
        let mut total_inertia = 0.0f32;

        for slot in 0..2 {
            if let Some(handle) = self.bodies[slot] {
                let body = &bodies[handle];
                let iit = body.inverse_inertia_tensor_world();
                let rel = self.relative_contact_position[slot];

                let angular_inertia_world = (iit * rel.cross(self.normal)).cross(rel);
                angular_inertia[slot] = angular_inertia_world.dot(self.normal);
                linear_inertia[slot] = body.inverse_mass();
                total_inertia += linear_inertia[slot] + angular_inertia[slot];
            }
        }

        if total_inertia <= 0.0 {
            return (linear_change, angular_change);
        }

        for slot in 0..2 {
            let Some(handle) = self.bodies[slot] else {
                continue;
            };
            let sign = if slot == 0 { 1.0 } else { -1.0 };
            let mut angular_move = sign * penetration * (angular_inertia[slot] / total_inertia);
            let mut linear_move = sign * penetration * (linear_inertia[slot] / total_inertia);

            // Limit the angular share by the leverage at the contact, so
            // bodies with the contact near their center of mass do not get
            // spun excessively.
            let rel = self.relative_contact_position[slot];
            let projection = rel + self.normal * (-rel.dot(self.normal));
            let max_magnitude = ANGULAR_MOVE_LIMIT * projection.length();

            if angular_move < -max_magnitude {
                let total_move = angular_move + linear_move;
                angular_move = -max_magnitude;
                linear_move = total_move - angular_move;
            } else if angular_move > max_magnitude {
                let total_move = angular_move + linear_move;
                angular_move = max_magnitude;
                linear_move = total_move - angular_move;
            }

            if angular_move.abs() > 1e-7 && angular_inertia[slot] > 1e-7 {
                let target_direction = rel.cross(self.normal);
                let iit = bodies[handle].inverse_inertia_tensor_world();
                angular_change[slot] =
                    (iit * target_direction) * (angular_move / angular_inertia[slot]);
            }

            linear_change[slot] = self.normal * linear_move;

            let body = &mut bodies[handle];
            body.translate(linear_change[slot]);
            if angular_change[slot] != Vec3::ZERO {
                body.add_scaled_orientation(angular_change[slot], 1.0);
            }

            // Sleeping bodies do not refresh derived data themselves, but
            // later contacts must see the corrected pose.
            if !body.is_awake() {
                body.calculate_derived_data();
            }
        }

        (linear_change, angular_change)
    }
}

/// Orthonormal contact basis from the world normal. The tangent seed axis is
/// picked by the dominant normal component to avoid degeneracy.
fn contact_basis(normal: Vec3) -> Mat3 {
    let (tangent0, tangent1);
    if normal.x.abs() > normal.y.abs() {
        let s = 1.0 / (normal.z * normal.z + normal.x * normal.x).sqrt();
        tangent0 = Vec3::new(normal.z * s, 0.0, -normal.x * s);
        tangent1 = Vec3::new(
            normal.y * tangent0.z,
            normal.z * tangent0.x - normal.x * tangent0.z,
            -normal.y * tangent0.x,
        );
    } else {
        let s = 1.0 / (normal.z * normal.z + normal.y * normal.y).sqrt();
        tangent0 = Vec3::new(0.0, -normal.z * s, normal.y * s);
        tangent1 = Vec3::new(
            normal.y * tangent0.z - normal.z * tangent0.y,
            -normal.x * tangent0.z,
            normal.x * tangent0.y,
        );
    }
    Mat3::from_cols(normal, tangent0, tangent1)
}

/// Matrix form of the cross product: `skew_symmetric(v) * w == v.cross(w)`.
fn skew_symmetric(v: Vec3) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(0.0, v.z, -v.y),
        Vec3::new(-v.z, 0.0, v.x),
        Vec3::new(v.y, -v.x, 0.0),
    )
}
