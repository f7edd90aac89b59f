//! Per-frame simulation driver
//!
//! The [`Simulator`] owns the bodies, objects, force generators and the
//! contact resolver, and runs the fixed order every step: forces,
//! integration, object hooks, contact generation, detection, resolution.
//! A step always runs to completion; the resolver's iteration caps are the
//! only safety valve against pathological contact sets.

use crate::body::{BodyHandle, BodySet, RigidBody};
use crate::collision::narrow_phase;
use crate::config::SimulationConfig;
use crate::error::PhysicsError;
use crate::forcegen::{ContactGenerator, ForceGenerator, ForceRegistry, GlobalForceGenerator};
use crate::object::PhysicsObject;
use crate::resolver::ContactResolver;
use tracing::{debug, warn};

struct RegisteredObject {
    /// Mass of the object's body at registration time; immovable and
    /// bodiless objects sort as infinite.
    mass: f32,
    object: Box<dyn PhysicsObject>,
}

/// The simulation: bodies, objects, generators and the resolver.
pub struct Simulator {
    config: SimulationConfig,
    bodies: BodySet,
    /// Kept sorted by ascending mass, immovable last. Ordering convention
    /// only; nothing downstream depends on it for correctness.
    objects: Vec<RegisteredObject>,
    force_registry: ForceRegistry,
    global_generators: Vec<Box<dyn GlobalForceGenerator>>,
    contact_generators: Vec<Box<dyn ContactGenerator>>,
    resolver: ContactResolver,
}

impl Simulator {
    pub fn new(config: SimulationConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        let resolver = ContactResolver::new(config.resolver)?;
        Ok(Self {
            config,
            bodies: BodySet::new(),
            objects: Vec::new(),
            force_registry: ForceRegistry::new(),
            global_generators: Vec::new(),
            contact_generators: Vec::new(),
            resolver,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn bodies(&self) -> &BodySet {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut BodySet {
        &mut self.bodies
    }

    pub fn resolver(&self) -> &ContactResolver {
        &self.resolver
    }

    /// Add a body, threading the configured gravity and sleep threshold
    /// into it. Gravity becomes the body's base acceleration; immovable
    /// bodies are left untouched.
    pub fn add_body(&mut self, mut body: RigidBody) -> BodyHandle {
        if body.has_finite_mass() {
            body.set_acceleration(self.config.gravity);
        }
        body.set_sleep_epsilon(self.config.sleep_epsilon);
        self.bodies.insert(body)
    }

    /// Register an object, keeping the list sorted by ascending body mass
    /// with immovable objects last.
    pub fn add_object(&mut self, object: Box<dyn PhysicsObject>) {
        let mass = match object.body() {
            Some(handle) if self.bodies[handle].has_finite_mass() => self.bodies[handle].mass(),
            _ => f32::INFINITY,
        };
        let index = self.objects.partition_point(|r| r.mass <= mass);
        self.objects.insert(index, RegisteredObject { mass, object });
    }

    pub fn objects(&self) -> impl Iterator<Item = &dyn PhysicsObject> {
        self.objects.iter().map(|r| r.object.as_ref())
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Attach a force generator to one body.
    pub fn register_force(&mut self, body: BodyHandle, generator: Box<dyn ForceGenerator>) {
        self.force_registry.add(body, generator);
    }

    /// Add a generator applied to every body each step.
    pub fn add_global_generator(&mut self, generator: Box<dyn GlobalForceGenerator>) {
        self.global_generators.push(generator);
    }

    /// Add a generator that feeds contacts straight into the resolver.
    pub fn add_contact_generator(&mut self, generator: Box<dyn ContactGenerator>) {
        self.contact_generators.push(generator);
    }

    /// Advance the simulation by `dt` seconds. Oversized deltas are
    /// clamped to `max_timestep` to keep the integrator stable.
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let dt = if dt > self.config.max_timestep {
            warn!(
                dt,
                max_timestep = self.config.max_timestep,
                "timestep clamped"
            );
            self.config.max_timestep
        } else {
            dt
        };

        for generator in &mut self.global_generators {
            if !generator.is_active() {
                continue;
            }
            for body in self.bodies.iter_mut() {
                generator.update_force(body, dt);
            }
        }
        self.force_registry.update_forces(&mut self.bodies, dt);

        for body in self.bodies.iter_mut() {
            body.integrate(dt);
        }

        for registered in &mut self.objects {
            registered.object.update(&mut self.bodies);
        }

        self.resolver.reset();
        // A generator with nothing to emit must not stop the ones after
        // it; only a full pool does.
        for generator in &mut self.contact_generators {
            if !self.resolver.has_free_contacts() {
                break;
            }
            generator.add_contact(&self.bodies, &mut self.resolver);
        }
        self.detect_contacts();
        debug!(
            bodies = self.bodies.len(),
            contacts = self.resolver.contact_count(),
            "step"
        );

        self.resolver.resolve(&mut self.bodies, dt);
    }

    /// All-pairs detection across object collider lists.
    fn detect_contacts(&mut self) {
        for j in 1..self.objects.len() {
            let (left, right) = self.objects.split_at(j);
            let second = &right[0];
            for first in left {
                for a in first.object.colliders() {
                    for b in second.object.colliders() {
                        if !self.resolver.has_free_contacts() {
                            return;
                        }
                        narrow_phase::detect(a, b, &self.bodies, &mut self.resolver);
                    }
                }
            }
        }
    }

    /// Restore every object to its starting state and drop any contacts
    /// held from the last step.
    pub fn reset(&mut self) {
        for registered in &mut self.objects {
            registered.object.reset(&mut self.bodies);
        }
        self.resolver.reset();
    }
}
