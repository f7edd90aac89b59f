//! rigidsim: a rigid-body dynamics core
//!
//! Impulse-based rigid-body simulation: force accumulation, semi-implicit
//! integration with exponential damping and sleeping, narrow-phase contact
//! generation for spheres, boxes, half-space planes and triangle soups, and
//! an iterative worst-first contact resolver that corrects penetration and
//! velocity in two separate passes.
//!
//! The usual entry point is the [`Simulator`]:
//!
//! ```
//! use glam::Vec3;
//! use rigidsim::{BasicObject, Collider, RigidBody, SimulationConfig, Simulator};
//!
//! let mut sim = Simulator::new(SimulationConfig::default())?;
//!
//! let ball = sim.add_body(RigidBody::dynamic(1.0)?.at(Vec3::new(0.0, 5.0, 0.0)));
//! let collider = Collider::sphere(1.0)?.attached(sim.bodies_mut(), ball)?;
//! sim.add_object(Box::new(BasicObject::with_body(sim.bodies(), ball, vec![collider])));
//!
//! sim.add_object(Box::new(BasicObject::static_geometry(vec![
//!     Collider::plane(Vec3::Y, 0.0)?,
//! ])));
//!
//! for _ in 0..120 {
//!     sim.step(1.0 / 60.0);
//! }
//! # Ok::<(), rigidsim::PhysicsError>(())
//! ```
//!
//! Bodies live in a [`BodySet`] arena and are addressed by [`BodyHandle`],
//! so contacts and colliders never hold references into the set. All math
//! is `glam` f32.

pub mod body;
pub mod collision;
pub mod config;
pub mod contact;
pub mod error;
pub mod forcegen;
pub mod object;
pub mod resolver;
pub mod simulator;

pub use body::{BodyHandle, BodySet, RigidBody};
pub use collision::shapes::{Collider, ColliderShape};
pub use collision::{Aabb, BoundingSphere};
pub use config::{ResolverSettings, SimulationConfig};
pub use contact::Contact;
pub use error::PhysicsError;
pub use forcegen::{ContactGenerator, ForceGenerator, ForceRegistry, GlobalForceGenerator};
pub use object::{BasicObject, PhysicsObject};
pub use resolver::ContactResolver;
pub use simulator::Simulator;
