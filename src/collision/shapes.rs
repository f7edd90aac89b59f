//! Collider shapes and lazily transformed bounding volumes
//!
//! A [`Collider`] couples an immutable local-space shape with the body whose
//! pose positions it in the world. Geometry is validated once at
//! construction; bounding volumes are cached untransformed and only pushed
//! through the body transform when that transform is non-identity.

use crate::body::{BodyHandle, BodySet};
use crate::collision::{Aabb, BoundingSphere};
use crate::error::PhysicsError;
use glam::{Affine3A, Mat3, Vec3};

/// Closed set of collision primitives.
#[derive(Debug, Clone, PartialEq)]
pub enum ColliderShape {
    /// Sphere centered on the body origin.
    Sphere { radius: f32 },
    /// Oriented box with the given half-extents.
    Box { half_extents: Vec3 },
    /// Half-space: all points `p` with `normal · p <= offset` are solid.
    Plane { normal: Vec3, offset: f32 },
    /// Triangle soup, typically static terrain.
    TriangleSoup {
        vertices: Vec<Vec3>,
        triangles: Vec<[u32; 3]>,
    },
}

/// A shape positioned in the world by an optional owning body.
///
/// A collider without a body is static world geometry expressed directly in
/// world coordinates (the usual case for planes and terrain soups).
#[derive(Debug, Clone)]
pub struct Collider {
    shape: ColliderShape,
    body: Option<BodyHandle>,
    local_aabb: Aabb,
    local_bounding_sphere: BoundingSphere,
}

impl Collider {
    /// Sphere collider. Radius must be finite and positive.
    pub fn sphere(radius: f32) -> Result<Self, PhysicsError> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(PhysicsError::InvalidRadius(radius));
        }
        Ok(Self::from_shape(ColliderShape::Sphere { radius }))
    }

    /// Box collider. Half-extents must be finite and positive.
    pub fn box_collider(half_extents: Vec3) -> Result<Self, PhysicsError> {
        if !half_extents.is_finite() || half_extents.min_element() <= 0.0 {
            return Err(PhysicsError::InvalidHalfExtents(half_extents));
        }
        Ok(Self::from_shape(ColliderShape::Box { half_extents }))
    }

    /// Half-space collider. The normal is normalized internally.
    pub fn plane(normal: Vec3, offset: f32) -> Result<Self, PhysicsError> {
        if normal.length_squared() < 1e-8 || !normal.is_finite() {
            return Err(PhysicsError::DegeneratePlaneNormal);
        }
        Ok(Self::from_shape(ColliderShape::Plane {
            normal: normal.normalize(),
            offset,
        }))
    }

    /// Triangle-soup collider. Must contain at least one triangle and all
    /// indices must be in range.
    pub fn triangle_soup(
        vertices: Vec<Vec3>,
        triangles: Vec<[u32; 3]>,
    ) -> Result<Self, PhysicsError> {
        if triangles.is_empty() {
            return Err(PhysicsError::EmptyTriangleSoup);
        }
        for tri in &triangles {
            for &index in tri {
                if index as usize >= vertices.len() {
                    return Err(PhysicsError::TriangleIndexOutOfRange {
                        index,
                        vertex_count: vertices.len(),
                    });
                }
            }
        }
        Ok(Self::from_shape(ColliderShape::TriangleSoup {
            vertices,
            triangles,
        }))
    }

    fn from_shape(shape: ColliderShape) -> Self {
        let local_aabb = local_aabb_of(&shape);
        let local_bounding_sphere = local_bounding_sphere_of(&shape);
        Self {
            shape,
            body: None,
            local_aabb,
            local_bounding_sphere,
        }
    }

    /// Attach the collider to a body. Attaching to a finite-mass body
    /// initializes the body's inertia tensor from the shape; planes can
    /// only be attached to immovable bodies.
    pub fn attach(&mut self, bodies: &mut BodySet, handle: BodyHandle) -> Result<(), PhysicsError> {
        let body = &mut bodies[handle];
        if body.has_finite_mass() {
            let tensor = self
                .inertia_tensor(body.mass())
                .ok_or(PhysicsError::PlaneOnDynamicBody)?;
            body.set_inertia_tensor(tensor)?;
        }
        self.body = Some(handle);
        Ok(())
    }

    /// Builder-style [`attach`](Self::attach).
    pub fn attached(
        mut self,
        bodies: &mut BodySet,
        handle: BodyHandle,
    ) -> Result<Self, PhysicsError> {
        self.attach(bodies, handle)?;
        Ok(self)
    }

    pub fn shape(&self) -> &ColliderShape {
        &self.shape
    }

    pub fn body(&self) -> Option<BodyHandle> {
        self.body
    }

    /// Local inertia tensor for this shape at the given mass; `None` for
    /// planes, whose inertia is undefined.
    pub fn inertia_tensor(&self, mass: f32) -> Option<Mat3> {
        match &self.shape {
            ColliderShape::Sphere { radius } => {
                let inertia = 0.4 * mass * radius * radius;
                Some(Mat3::from_diagonal(Vec3::splat(inertia)))
            }
            ColliderShape::Box { half_extents } => Some(box_inertia(mass, *half_extents)),
            ColliderShape::Plane { .. } => None,
            // Approximated by the soup's bounding box.
            ColliderShape::TriangleSoup { .. } => {
                Some(box_inertia(mass, self.local_aabb.half_extents()))
            }
        }
    }

    /// World transform of the collider: the owning body's cached transform,
    /// or identity for detached (static) colliders.
    pub fn world_transform(&self, bodies: &BodySet) -> Affine3A {
        match self.body {
            Some(handle) => bodies[handle].transform(),
            None => Affine3A::IDENTITY,
        }
    }

    fn has_identity_transform(&self, bodies: &BodySet) -> bool {
        match self.body {
            Some(handle) => bodies[handle].has_identity_transform(),
            None => true,
        }
    }

    /// Untransformed bounding box, cached at construction.
    pub fn local_aabb(&self) -> Aabb {
        self.local_aabb
    }

    /// Bounding box under the owning body's current pose.
    pub fn world_aabb(&self, bodies: &BodySet) -> Aabb {
        if self.has_identity_transform(bodies) {
            return self.local_aabb;
        }
        let transform = self.world_transform(bodies);
        match &self.shape {
            // Spheres are rotation-invariant.
            ColliderShape::Sphere { radius } => Aabb::from_center_half_extents(
                transform.transform_point3(Vec3::ZERO),
                Vec3::splat(*radius),
            ),
            ColliderShape::Box { half_extents } => {
                let mut aabb = Aabb::new(Vec3::splat(f32::MAX), Vec3::splat(f32::MIN));
                for corner in box_corners(*half_extents) {
                    aabb.expand_to_include(transform.transform_point3(corner));
                }
                aabb
            }
            ColliderShape::Plane { .. } => Aabb::infinite(),
            ColliderShape::TriangleSoup { vertices, .. } => {
                let mut aabb = Aabb::new(Vec3::splat(f32::MAX), Vec3::splat(f32::MIN));
                for &vertex in vertices {
                    aabb.expand_to_include(transform.transform_point3(vertex));
                }
                aabb
            }
        }
    }

    /// Bounding sphere under the owning body's current pose.
    pub fn world_bounding_sphere(&self, bodies: &BodySet) -> BoundingSphere {
        if self.has_identity_transform(bodies) {
            return self.local_bounding_sphere;
        }
        let transform = self.world_transform(bodies);
        BoundingSphere::new(
            transform.transform_point3(self.local_bounding_sphere.center),
            self.local_bounding_sphere.radius,
        )
    }

    /// World-space center of the collider.
    pub fn world_center(&self, bodies: &BodySet) -> Vec3 {
        self.world_transform(bodies).transform_point3(Vec3::ZERO)
    }

    /// World-space triangles of a soup; empty for every other shape.
    pub fn world_triangles<'a>(
        &'a self,
        bodies: &BodySet,
    ) -> impl Iterator<Item = [Vec3; 3]> + 'a {
        let transform = self.world_transform(bodies);
        let (vertices, triangles): (&[Vec3], &[[u32; 3]]) = match &self.shape {
            ColliderShape::TriangleSoup {
                vertices,
                triangles,
            } => (vertices, triangles),
            _ => (&[], &[]),
        };
        triangles.iter().map(move |tri| {
            [
                transform.transform_point3(vertices[tri[0] as usize]),
                transform.transform_point3(vertices[tri[1] as usize]),
                transform.transform_point3(vertices[tri[2] as usize]),
            ]
        })
    }
}

/// The eight corners of a box with the given half-extents.
pub(crate) fn box_corners(half_extents: Vec3) -> [Vec3; 8] {
    let h = half_extents;
    [
        Vec3::new(-h.x, -h.y, -h.z),
        Vec3::new(h.x, -h.y, -h.z),
        Vec3::new(-h.x, h.y, -h.z),
        Vec3::new(h.x, h.y, -h.z),
        Vec3::new(-h.x, -h.y, h.z),
        Vec3::new(h.x, -h.y, h.z),
        Vec3::new(-h.x, h.y, h.z),
        Vec3::new(h.x, h.y, h.z),
    ]
}

fn box_inertia(mass: f32, half_extents: Vec3) -> Mat3 {
    let x = half_extents.x * 2.0;
    let y = half_extents.y * 2.0;
    let z = half_extents.z * 2.0;
    let factor = mass / 12.0;
    Mat3::from_diagonal(Vec3::new(
        factor * (y * y + z * z),
        factor * (x * x + z * z),
        factor * (x * x + y * y),
    ))
}

fn local_aabb_of(shape: &ColliderShape) -> Aabb {
    match shape {
        ColliderShape::Sphere { radius } => {
            Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(*radius))
        }
        ColliderShape::Box { half_extents } => {
            Aabb::from_center_half_extents(Vec3::ZERO, *half_extents)
        }
        ColliderShape::Plane { .. } => Aabb::infinite(),
        ColliderShape::TriangleSoup { vertices, .. } => Aabb::from_points(vertices),
    }
}

fn local_bounding_sphere_of(shape: &ColliderShape) -> BoundingSphere {
    match shape {
        ColliderShape::Sphere { radius } => BoundingSphere::new(Vec3::ZERO, *radius),
        ColliderShape::Box { half_extents } => {
            BoundingSphere::new(Vec3::ZERO, half_extents.length())
        }
        ColliderShape::Plane { .. } => BoundingSphere::new(Vec3::ZERO, f32::MAX / 2.0),
        ColliderShape::TriangleSoup { vertices, .. } => {
            let aabb = Aabb::from_points(vertices);
            let center = aabb.center();
            let radius = vertices
                .iter()
                .map(|v| (*v - center).length())
                .fold(0.0f32, f32::max);
            BoundingSphere::new(center, radius)
        }
    }
}
