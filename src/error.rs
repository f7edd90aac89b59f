//! Error types for construction-time validation
//!
//! Nothing in the per-step hot path returns errors: capacity exhaustion is
//! handled by simply not adding contacts, and numerical edge cases are
//! handled with epsilon guards. Errors here signal programmer error (bad
//! arguments at construction time) and abort construction rather than
//! silently defaulting.

/// Errors raised when constructing bodies, colliders or solver settings
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    #[error("mass must be finite and positive, got {0}")]
    InvalidMass(f32),

    #[error("inertia tensor is singular and cannot be inverted")]
    DegenerateInertia,

    #[error("sphere radius must be finite and positive, got {0}")]
    InvalidRadius(f32),

    #[error("box half-extents must be finite and positive, got {0:?}")]
    InvalidHalfExtents(glam::Vec3),

    #[error("plane normal has near-zero length")]
    DegeneratePlaneNormal,

    #[error("triangle soup has no triangles")]
    EmptyTriangleSoup,

    #[error("triangle index {index} out of range for {vertex_count} vertices")]
    TriangleIndexOutOfRange { index: u32, vertex_count: usize },

    #[error("a plane collider cannot be attached to a finite-mass body")]
    PlaneOnDynamicBody,

    #[error("invalid resolver settings: {0}")]
    InvalidResolverSettings(String),

    #[error("invalid simulation config: {0}")]
    InvalidConfig(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
