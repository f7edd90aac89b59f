//! Simulated objects
//!
//! A [`PhysicsObject`] couples an optional body with the colliders that
//! represent it, plus per-frame lifecycle hooks. The broad-phase hooks are
//! part of the contract for callers that prune pairs themselves; the
//! simulator's own detection loop is all-pairs and does not use them.

use crate::body::{BodyHandle, BodySet};
use crate::collision::shapes::Collider;
use crate::collision::Aabb;
use glam::{Quat, Vec3};

pub trait PhysicsObject: Send + Sync {
    /// The body this object moves with, if any. Static world geometry
    /// has none.
    fn body(&self) -> Option<BodyHandle>;

    fn colliders(&self) -> &[Collider];

    /// Coarse overlap test against another object's bounds.
    fn broad_phase_test(&self, other: &dyn PhysicsObject, bodies: &BodySet) -> bool {
        self.broad_phase_bounds(bodies)
            .overlaps(&other.broad_phase_bounds(bodies))
    }

    /// Merged world bounds of every collider. Objects without colliders
    /// report a degenerate box at the origin.
    fn broad_phase_bounds(&self, bodies: &BodySet) -> Aabb {
        let mut colliders = self.colliders().iter();
        let Some(first) = colliders.next() else {
            return Aabb::new(Vec3::ZERO, Vec3::ZERO);
        };
        let mut bounds = first.world_aabb(bodies);
        for collider in colliders {
            bounds = bounds.merge(&collider.world_aabb(bodies));
        }
        bounds
    }

    /// Colliders whose world bounds overlap the query box.
    fn broad_phase_colliders<'a>(
        &'a self,
        bounds: &Aabb,
        bodies: &BodySet,
    ) -> Vec<&'a Collider> {
        self.colliders()
            .iter()
            .filter(|collider| collider.world_aabb(bodies).overlaps(bounds))
            .collect()
    }

    /// Per-frame hook, run after integration and before detection.
    fn update(&mut self, bodies: &mut BodySet) {
        let _ = bodies;
    }

    /// Restore the object to the state it was created in.
    fn reset(&mut self, bodies: &mut BodySet) {
        let _ = bodies;
    }
}

/// The stock object: one optional body plus its collider list. Remembers
/// the body's starting pose so [`reset`](PhysicsObject::reset) can restore
/// it.
pub struct BasicObject {
    body: Option<BodyHandle>,
    colliders: Vec<Collider>,
    initial_position: Vec3,
    initial_orientation: Quat,
}

impl BasicObject {
    /// An object moving with `handle`. Colliders are expected to be
    /// attached to the same body.
    pub fn with_body(bodies: &BodySet, handle: BodyHandle, colliders: Vec<Collider>) -> Self {
        let body = &bodies[handle];
        Self {
            body: Some(handle),
            colliders,
            initial_position: body.position(),
            initial_orientation: body.orientation(),
        }
    }

    /// Static world geometry: colliders in world coordinates, no body.
    pub fn static_geometry(colliders: Vec<Collider>) -> Self {
        Self {
            body: None,
            colliders,
            initial_position: Vec3::ZERO,
            initial_orientation: Quat::IDENTITY,
        }
    }

    pub fn add_collider(&mut self, collider: Collider) {
        self.colliders.push(collider);
    }
}

impl PhysicsObject for BasicObject {
    fn body(&self) -> Option<BodyHandle> {
        self.body
    }

    fn colliders(&self) -> &[Collider] {
        &self.colliders
    }

    fn reset(&mut self, bodies: &mut BodySet) {
        let Some(handle) = self.body else {
            return;
        };
        let body = &mut bodies[handle];
        body.set_position(self.initial_position);
        body.set_orientation(self.initial_orientation);
        body.set_velocity(Vec3::ZERO);
        body.set_angular_velocity(Vec3::ZERO);
        body.set_awake(true);
    }
}
