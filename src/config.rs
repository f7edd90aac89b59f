//! Simulation configuration
//!
//! All tunables that used to live as global state (gravity, sleep epsilon)
//! are carried in an explicit [`SimulationConfig`] passed to the
//! [`Simulator`](crate::simulator::Simulator) and threaded through to body
//! initialization. Configs are plain serde data so they can be stored next
//! to scene files.

use crate::error::PhysicsError;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Settings owned by the contact resolver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Capacity of the per-step contact pool. Allocated once; detection
    /// stops adding contacts when the pool is full.
    pub max_contacts: usize,

    /// Iteration cap for the position-correction loop.
    pub position_iterations: usize,

    /// Iteration cap for the velocity-correction loop.
    pub velocity_iterations: usize,

    /// Penetrations at or below this depth are left alone.
    pub position_epsilon: f32,

    /// Desired velocity changes at or below this are left alone.
    pub velocity_epsilon: f32,

    /// Friction coefficient assigned to detector-generated contacts.
    pub friction: f32,

    /// Restitution coefficient assigned to detector-generated contacts.
    pub restitution: f32,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_contacts: 256,
            position_iterations: 512,
            velocity_iterations: 512,
            position_epsilon: 0.01,
            velocity_epsilon: 0.01,
            friction: 0.6,
            restitution: 0.3,
        }
    }
}

impl ResolverSettings {
    /// Validate the settings, failing fast on programmer error.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.max_contacts == 0 {
            return Err(PhysicsError::InvalidResolverSettings(
                "max_contacts must be at least 1".into(),
            ));
        }
        if self.position_iterations == 0 || self.velocity_iterations == 0 {
            return Err(PhysicsError::InvalidResolverSettings(
                "iteration caps must be at least 1".into(),
            ));
        }
        if !self.position_epsilon.is_finite() || self.position_epsilon < 0.0 {
            return Err(PhysicsError::InvalidResolverSettings(
                "position_epsilon must be finite and non-negative".into(),
            ));
        }
        if !self.velocity_epsilon.is_finite() || self.velocity_epsilon < 0.0 {
            return Err(PhysicsError::InvalidResolverSettings(
                "velocity_epsilon must be finite and non-negative".into(),
            ));
        }
        if !self.friction.is_finite() || self.friction < 0.0 {
            return Err(PhysicsError::InvalidResolverSettings(
                "friction must be finite and non-negative".into(),
            ));
        }
        if !self.restitution.is_finite() || !(0.0..=1.0).contains(&self.restitution) {
            return Err(PhysicsError::InvalidResolverSettings(
                "restitution must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Top-level simulation tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Gravitational acceleration applied as every dynamic body's base
    /// acceleration.
    pub gravity: Vec3,

    /// Kinetic-energy estimate below which a body that can sleep is put
    /// to sleep.
    pub sleep_epsilon: f32,

    /// Upper bound on the per-frame timestep. Larger deltas are clamped
    /// to keep the integrator stable.
    pub max_timestep: f32,

    /// Contact resolver settings.
    pub resolver: ResolverSettings,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            sleep_epsilon: 0.3,
            max_timestep: 0.05,
            resolver: ResolverSettings::default(),
        }
    }
}

impl SimulationConfig {
    /// Validate the config, failing fast on programmer error.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if !self.gravity.is_finite() {
            return Err(PhysicsError::InvalidConfig("gravity must be finite".into()));
        }
        if !self.sleep_epsilon.is_finite() || self.sleep_epsilon <= 0.0 {
            return Err(PhysicsError::InvalidConfig(
                "sleep_epsilon must be finite and positive".into(),
            ));
        }
        if !self.max_timestep.is_finite() || self.max_timestep <= 0.0 {
            return Err(PhysicsError::InvalidConfig(
                "max_timestep must be finite and positive".into(),
            ));
        }
        self.resolver.validate()
    }

    /// Parse a config from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, PhysicsError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the config to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, PhysicsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
