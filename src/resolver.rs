//! Iterative two-phase contact resolver
//!
//! The resolver owns the fixed-capacity contact pool for one simulation
//! step. [`resolve`](ContactResolver::resolve) runs three phases:
//!
//! 1. *prepare* — build each contact's derived data; contacts are
//!    independent here, so large pools run through rayon;
//! 2. *adjust positions* — repeatedly pick the worst remaining penetration,
//!    correct it, and propagate the position delta into the cached
//!    penetration of every contact sharing a body;
//! 3. *adjust velocities* — the symmetric loop keyed on desired delta
//!    velocity, propagating velocity deltas and re-deriving the desired
//!    change for affected contacts.
//!
//! The correction loops are strictly sequential: each iteration must see
//! all prior corrections. Iteration caps bound the per-frame cost, at the
//! price of possible residual error.

use crate::body::BodySet;
use crate::config::ResolverSettings;
use crate::contact::Contact;
use crate::error::PhysicsError;
use rayon::prelude::*;
use tracing::{debug, trace};

/// Contact count at which the prepare phase switches to rayon.
const PARALLEL_PREPARE_THRESHOLD: usize = 64;

/// Owns and resolves the contacts of one simulation step.
#[derive(Debug)]
pub struct ContactResolver {
    settings: ResolverSettings,
    contacts: Vec<Contact>,
    position_iterations_used: usize,
    velocity_iterations_used: usize,
}

impl ContactResolver {
    /// Create a resolver, validating the settings and sizing the pool once;
    /// resolution itself never allocates.
    pub fn new(settings: ResolverSettings) -> Result<Self, PhysicsError> {
        settings.validate()?;
        Ok(Self {
            contacts: Vec::with_capacity(settings.max_contacts),
            settings,
            position_iterations_used: 0,
            velocity_iterations_used: 0,
        })
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Drop all contacts, readying the pool for the next step.
    pub fn reset(&mut self) {
        self.contacts.clear();
        self.position_iterations_used = 0;
        self.velocity_iterations_used = 0;
    }

    /// Whether the pool can take another contact.
    pub fn has_free_contacts(&self) -> bool {
        self.contacts.len() < self.settings.max_contacts
    }

    pub fn remaining_capacity(&self) -> usize {
        self.settings.max_contacts - self.contacts.len()
    }

    /// Add a contact if the pool has room. Returns whether it was taken.
    pub fn add_contact(&mut self, contact: Contact) -> bool {
        if !self.has_free_contacts() {
            return false;
        }
        self.contacts.push(contact);
        true
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Iterations consumed by the last position pass.
    pub fn position_iterations_used(&self) -> usize {
        self.position_iterations_used
    }

    /// Iterations consumed by the last velocity pass.
    pub fn velocity_iterations_used(&self) -> usize {
        self.velocity_iterations_used
    }

    /// Resolve the current contact set against `bodies`.
    pub fn resolve(&mut self, bodies: &mut BodySet, dt: f32) {
        if self.contacts.is_empty() {
            return;
        }
        self.prepare(bodies, dt);
        self.adjust_positions(bodies);
        self.adjust_velocities(bodies, dt);
        debug!(
            contacts = self.contacts.len(),
            position_iterations = self.position_iterations_used,
            velocity_iterations = self.velocity_iterations_used,
            "contacts resolved"
        );
    }

    /// Build derived data for every contact. Contacts are independent, so
    /// big pools fan out over the rayon pool.
    fn prepare(&mut self, bodies: &BodySet, dt: f32) {
        if self.contacts.len() >= PARALLEL_PREPARE_THRESHOLD {
            self.contacts
                .par_iter_mut()
                .for_each(|contact| contact.calculate_internals(bodies, dt));
        } else {
            for contact in &mut self.contacts {
                contact.calculate_internals(bodies, dt);
            }
        }
    }

    fn adjust_positions(&mut self, bodies: &mut BodySet) {
        self.position_iterations_used = 0;

        while self.position_iterations_used < self.settings.position_iterations {
            // Worst remaining penetration above the epsilon.
            let mut worst = self.settings.position_epsilon;
            let mut index = None;
            for (i, contact) in self.contacts.iter().enumerate() {
                if contact.penetration() > worst {
                    worst = contact.penetration();
                    index = Some(i);
                }
            }
            let Some(index) = index else {
                break;
            };

            self.contacts[index].match_awake_state(bodies);
            let (linear_change, angular_change) =
                self.contacts[index].apply_position_change(bodies, worst);
            let resolved_bodies = self.contacts[index].bodies();

            trace!(index, penetration = worst, "position correction");

            // The correction moved bodies, so cached penetrations of every
            // contact sharing a body are now stale; adjust them by the
            // position delta projected onto their own normal.
            for i in 0..self.contacts.len() {
                for slot in 0..2 {
                    let Some(handle) = self.contacts[i].body(slot) else {
                        continue;
                    };
                    for (d, resolved) in resolved_bodies.iter().enumerate() {
                        if *resolved != Some(handle) {
                            continue;
                        }
                        let delta = linear_change[d]
                            + angular_change[d]
                                .cross(self.contacts[i].relative_contact_position(slot));
                        let sign = if slot == 1 { 1.0 } else { -1.0 };
                        let normal = self.contacts[i].normal();
                        self.contacts[i].adjust_penetration(delta.dot(normal) * sign);
                    }
                }
            }

            self.position_iterations_used += 1;
        }

        if self.position_iterations_used == self.settings.position_iterations {
            debug!("position correction hit its iteration cap");
        }
    }

    fn adjust_velocities(&mut self, bodies: &mut BodySet, dt: f32) {
        self.velocity_iterations_used = 0;

        while self.velocity_iterations_used < self.settings.velocity_iterations {
            // Contact with the largest required velocity change.
            let mut worst = self.settings.velocity_epsilon;
            let mut index = None;
            for (i, contact) in self.contacts.iter().enumerate() {
                if contact.desired_delta_velocity() > worst {
                    worst = contact.desired_delta_velocity();
                    index = Some(i);
                }
            }
            let Some(index) = index else {
                break;
            };

            self.contacts[index].match_awake_state(bodies);
            let (velocity_change, rotation_change) =
                self.contacts[index].apply_velocity_change(bodies);
            let resolved_bodies = self.contacts[index].bodies();

            trace!(index, desired = worst, "velocity correction");

            // Propagate the velocity deltas into the cached closing
            // velocity of every contact sharing a body, and re-derive
            // their desired change.
            for i in 0..self.contacts.len() {
                let mut touched = false;
                for slot in 0..2 {
                    let Some(handle) = self.contacts[i].body(slot) else {
                        continue;
                    };
                    for (d, resolved) in resolved_bodies.iter().enumerate() {
                        if *resolved != Some(handle) {
                            continue;
                        }
                        let delta_vel = velocity_change[d]
                            + rotation_change[d]
                                .cross(self.contacts[i].relative_contact_position(slot));
                        let sign = if slot == 1 { -1.0 } else { 1.0 };
                        let contact_space =
                            self.contacts[i].contact_to_world().transpose() * delta_vel * sign;
                        self.contacts[i].adjust_contact_velocity(contact_space);
                        touched = true;
                    }
                }
                if touched {
                    self.contacts[i].calculate_desired_delta_velocity(bodies, dt);
                }
            }

            self.velocity_iterations_used += 1;
        }

        if self.velocity_iterations_used == self.settings.velocity_iterations {
            debug!("velocity correction hit its iteration cap");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use glam::Vec3;

    fn settings(capacity: usize) -> ResolverSettings {
        ResolverSettings {
            max_contacts: capacity,
            ..Default::default()
        }
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut resolver = ContactResolver::new(settings(2)).unwrap();
        let mut bodies = BodySet::new();
        let handle = bodies.insert(RigidBody::dynamic(1.0).unwrap());

        let contact =
            Contact::new([Some(handle), None], Vec3::ZERO, Vec3::Y, 0.1, 0.0, 0.0);

        assert!(resolver.add_contact(contact.clone()));
        assert!(resolver.add_contact(contact.clone()));
        assert!(!resolver.has_free_contacts());
        assert!(!resolver.add_contact(contact));
        assert_eq!(resolver.contact_count(), 2);
    }

    #[test]
    fn test_reset_reclaims_pool() {
        let mut resolver = ContactResolver::new(settings(1)).unwrap();
        let mut bodies = BodySet::new();
        let handle = bodies.insert(RigidBody::dynamic(1.0).unwrap());

        resolver.add_contact(Contact::new(
            [Some(handle), None],
            Vec3::ZERO,
            Vec3::Y,
            0.1,
            0.0,
            0.0,
        ));
        resolver.reset();
        assert!(resolver.has_free_contacts());
        assert_eq!(resolver.contact_count(), 0);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(ContactResolver::new(settings(0)).is_err());
    }

    #[test]
    fn test_position_pass_resolves_single_contact() {
        let mut resolver = ContactResolver::new(settings(8)).unwrap();
        let mut bodies = BodySet::new();
        let handle = bodies.insert(RigidBody::dynamic(1.0).unwrap());
        bodies[handle].set_position(Vec3::new(0.0, 0.5, 0.0));

        resolver.add_contact(Contact::new(
            [Some(handle), None],
            Vec3::new(0.0, -0.5, 0.0),
            Vec3::Y,
            0.5,
            0.0,
            0.0,
        ));
        resolver.resolve(&mut bodies, 1.0 / 60.0);

        assert!((bodies[handle].position().y - 1.0).abs() < 1e-3);
        assert!(resolver.contacts()[0].penetration() <= resolver.settings().position_epsilon + 1e-4);
    }

    #[test]
    fn test_position_pass_is_idempotent_once_converged() {
        let mut resolver = ContactResolver::new(settings(8)).unwrap();
        let mut bodies = BodySet::new();
        let handle = bodies.insert(RigidBody::dynamic(1.0).unwrap());
        bodies[handle].set_position(Vec3::new(0.0, 0.5, 0.0));

        resolver.add_contact(Contact::new(
            [Some(handle), None],
            Vec3::new(0.0, -0.5, 0.0),
            Vec3::Y,
            0.5,
            0.0,
            0.0,
        ));
        resolver.resolve(&mut bodies, 1.0 / 60.0);
        let settled = bodies[handle].position();

        // A second position pass over the converged set changes nothing.
        resolver.adjust_positions(&mut bodies);
        assert_eq!(resolver.position_iterations_used(), 0);
        assert_eq!(bodies[handle].position(), settled);
    }

    #[test]
    fn test_iteration_cap_terminates() {
        let mut settings = settings(64);
        settings.position_iterations = 3;

        let mut resolver = ContactResolver::new(settings).unwrap();
        let mut bodies = BodySet::new();
        let handle = bodies.insert(RigidBody::dynamic(1.0).unwrap());

        // More deep contacts on one body than three iterations can clear;
        // opposing normals keep re-inflating each other's penetration.
        for i in 0..8 {
            let normal = if i % 2 == 0 { Vec3::Y } else { -Vec3::Y };
            resolver.add_contact(Contact::new(
                [Some(handle), None],
                Vec3::ZERO,
                normal,
                1.0,
                0.0,
                0.0,
            ));
        }
        resolver.resolve(&mut bodies, 1.0 / 60.0);

        assert_eq!(resolver.position_iterations_used(), 3);
        // Residual penetration remains, bounded rather than resolved.
        assert!(resolver
            .contacts()
            .iter()
            .any(|c| c.penetration() > resolver.settings().position_epsilon));
    }

    #[test]
    fn test_empty_resolve_is_noop() {
        let mut resolver = ContactResolver::new(settings(4)).unwrap();
        let mut bodies = BodySet::new();
        resolver.resolve(&mut bodies, 1.0 / 60.0);
        assert_eq!(resolver.position_iterations_used(), 0);
        assert_eq!(resolver.velocity_iterations_used(), 0);
    }
}
