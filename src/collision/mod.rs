//! Collision detection subsystem
//!
//! Shapes and their bounding volumes live in [`shapes`]; the pairwise
//! contact generators live in [`narrow_phase`]. Contact normals follow the
//! resolver's convention: the normal points in the direction the *first*
//! participant must move to separate, i.e. from the second body toward the
//! first.

pub mod narrow_phase;
pub mod shapes;

use glam::Vec3;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Smallest box containing all `points`. Empty input yields a
    /// degenerate box at the origin.
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut aabb = Self::new(Vec3::splat(f32::MAX), Vec3::splat(f32::MIN));
        for &point in points {
            aabb.expand_to_include(point);
        }
        if points.is_empty() {
            aabb = Self::new(Vec3::ZERO, Vec3::ZERO);
        }
        aabb
    }

    /// A box large enough to contain any scene; used for half-space planes.
    pub fn infinite() -> Self {
        Self {
            min: Vec3::splat(f32::MIN / 2.0),
            max: Vec3::splat(f32::MAX / 2.0),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Overlap test against a sphere, used for coarse triangle rejection.
    pub fn overlaps_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        (closest - center).length_squared() <= radius * radius
    }

    pub fn expand_to_include(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn overlaps(&self, other: &BoundingSphere) -> bool {
        let radii = self.radius + other.radius;
        (other.center - self.center).length_squared() <= radii * radii
    }
}
