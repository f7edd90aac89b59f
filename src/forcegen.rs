//! Force and contact generators
//!
//! Force generators accumulate forces on individual bodies each step;
//! the [`ForceRegistry`] tracks which generator feeds which body. Global
//! generators apply to every registered body without per-body bookkeeping.
//! Contact generators let callers feed custom contacts (joints, cables,
//! scripted constraints) into the resolver alongside the narrow phase.

use crate::body::{BodyHandle, BodySet, RigidBody};
use crate::resolver::ContactResolver;

/// Accumulates a force on one body each step.
pub trait ForceGenerator: Send + Sync {
    fn update_force(&mut self, body: &mut RigidBody, dt: f32);
}

/// A force applied to every body in the simulation.
pub trait GlobalForceGenerator: ForceGenerator {
    /// Inactive generators are skipped without being removed.
    fn is_active(&self) -> bool {
        true
    }
}

/// Produces contacts directly, bypassing collision detection.
pub trait ContactGenerator: Send + Sync {
    /// Add contacts to the resolver. Returns whether this call added at
    /// least one contact; a generator with nothing to emit this step
    /// returns false without that meaning anything went wrong.
    fn add_contact(&mut self, bodies: &BodySet, resolver: &mut ContactResolver) -> bool;
}

struct Registration {
    body: BodyHandle,
    generator: Box<dyn ForceGenerator>,
}

/// Pairs of (body, generator), run once per step before integration.
#[derive(Default)]
pub struct ForceRegistry {
    registrations: Vec<Registration>,
}

impl ForceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, body: BodyHandle, generator: Box<dyn ForceGenerator>) {
        self.registrations.push(Registration { body, generator });
    }

    /// Remove every generator registered for a body.
    pub fn remove_body(&mut self, body: BodyHandle) {
        self.registrations.retain(|r| r.body != body);
    }

    pub fn clear(&mut self) {
        self.registrations.clear();
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn update_forces(&mut self, bodies: &mut BodySet, dt: f32) {
        for registration in &mut self.registrations {
            registration
                .generator
                .update_force(&mut bodies[registration.body], dt);
        }
    }
}
