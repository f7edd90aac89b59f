//! Narrow-phase contact generation
//!
//! [`detect`] dispatches on the concrete shapes of a collider pair,
//! normalized so a plane is always the second operand (plane-plane pairs
//! are rejected). Every pair function stops adding contacts once the
//! resolver's pool is exhausted: capacity exhaustion is never an error,
//! just an incomplete frame.
//!
//! Degenerate geometry (near-zero SAT axes, parallel edges, coincident
//! sphere centers) is handled with epsilon guards that report "no
//! collision" or fall back to a known-good point; nothing in here panics
//! on bad input.

use crate::body::{BodyHandle, BodySet};
use crate::collision::shapes::{box_corners, Collider, ColliderShape};
use crate::collision::Aabb;
use crate::contact::Contact;
use crate::resolver::ContactResolver;
use glam::{Affine3A, Vec3};
use tracing::trace;

/// Axes shorter than this (squared) are skipped in SAT tests.
const SAT_AXIS_EPSILON: f32 = 1e-4;

/// Denominator threshold below which two edges are treated as parallel.
const EDGE_PARALLEL_EPSILON: f32 = 1e-4;

/// Distance within which candidate contact points are merged.
const POINT_MERGE_EPSILON: f32 = 1e-4;

/// Corners this close to a plane (or closer) are treated as touching.
const PLANE_CONTACT_EPSILON: f32 = 1e-4;

/// Generate contacts for a collider pair into the resolver's pool.
/// Returns the number of contacts added.
pub fn detect(
    a: &Collider,
    b: &Collider,
    bodies: &BodySet,
    resolver: &mut ContactResolver,
) -> usize {
    // A pair with no movable participant cannot be resolved; skip it.
    let movable =
        |c: &Collider| c.body().map_or(false, |h| bodies[h].has_finite_mass());
    if !movable(a) && !movable(b) {
        return 0;
    }
    if !resolver.has_free_contacts() {
        return 0;
    }

    use ColliderShape as S;
    match (a.shape(), b.shape()) {
        (S::Plane { .. }, S::Plane { .. }) => 0,
        // Planes always go second.
        (S::Plane { .. }, _) => detect(b, a, bodies, resolver),

        (S::Sphere { .. }, S::Sphere { .. }) => sphere_and_sphere(a, b, bodies, resolver),
        (S::Sphere { .. }, S::Plane { .. }) => sphere_and_half_space(a, b, bodies, resolver),
        (S::Sphere { .. }, S::Box { .. }) => box_and_sphere(b, a, bodies, resolver),
        (S::Sphere { .. }, S::TriangleSoup { .. }) => {
            sphere_and_triangle_soup(a, b, bodies, resolver)
        }

        (S::Box { .. }, S::Box { .. }) => box_and_box(a, b, bodies, resolver),
        (S::Box { .. }, S::Sphere { .. }) => box_and_sphere(a, b, bodies, resolver),
        (S::Box { .. }, S::Plane { .. }) => box_and_half_space(a, b, bodies, resolver),
        (S::Box { .. }, S::TriangleSoup { .. }) => box_and_triangle_soup(a, b, bodies, resolver),

        (S::TriangleSoup { .. }, S::Sphere { .. }) => {
            sphere_and_triangle_soup(b, a, bodies, resolver)
        }
        (S::TriangleSoup { .. }, S::Box { .. }) => box_and_triangle_soup(b, a, bodies, resolver),
        // Soups act as static geometry; against a plane or another soup
        // there is nothing to generate.
        (S::TriangleSoup { .. }, S::TriangleSoup { .. }) => 0,
        (S::TriangleSoup { .. }, S::Plane { .. }) => 0,
    }
}

fn materials(resolver: &ContactResolver) -> (f32, f32) {
    let settings = resolver.settings();
    (settings.friction, settings.restitution)
}

// --- sphere pairs -------------------------------------------------------

fn sphere_and_sphere(
    a: &Collider,
    b: &Collider,
    bodies: &BodySet,
    resolver: &mut ContactResolver,
) -> usize {
    let (r0, r1) = match (a.shape(), b.shape()) {
        (ColliderShape::Sphere { radius: r0 }, ColliderShape::Sphere { radius: r1 }) => (*r0, *r1),
        _ => return 0,
    };
    let p0 = a.world_center(bodies);
    let p1 = b.world_center(bodies);

    let midline = p0 - p1;
    let size = midline.length();
    // Coincident centers have no usable normal; treat as no collision.
    if size <= 0.0 || size >= r0 + r1 {
        return 0;
    }

    let normal = midline / size;
    let (friction, restitution) = materials(resolver);
    let contact = Contact::new(
        [a.body(), b.body()],
        p0 - midline * 0.5,
        normal,
        r0 + r1 - size,
        friction,
        restitution,
    );
    resolver.add_contact(contact) as usize
}

fn sphere_and_half_space(
    sphere: &Collider,
    plane: &Collider,
    bodies: &BodySet,
    resolver: &mut ContactResolver,
) -> usize {
    let radius = match sphere.shape() {
        ColliderShape::Sphere { radius } => *radius,
        _ => return 0,
    };
    let (normal, offset) = match plane_in_world(plane, bodies) {
        Some(p) => p,
        None => return 0,
    };
    let center = sphere.world_center(bodies);

    let ball_distance = normal.dot(center) - offset - radius;
    if ball_distance >= 0.0 {
        return 0;
    }

    let (friction, restitution) = materials(resolver);
    let contact = Contact::new(
        [sphere.body(), plane.body()],
        center - normal * (ball_distance + radius),
        normal,
        -ball_distance,
        friction,
        restitution,
    );
    resolver.add_contact(contact) as usize
}

fn sphere_and_triangle_soup(
    sphere: &Collider,
    soup: &Collider,
    bodies: &BodySet,
    resolver: &mut ContactResolver,
) -> usize {
    let radius = match sphere.shape() {
        ColliderShape::Sphere { radius } => *radius,
        _ => return 0,
    };
    let center = sphere.world_center(bodies);
    let (friction, restitution) = materials(resolver);

    let mut added = 0;
    for [va, vb, vc] in soup.world_triangles(bodies) {
        if !resolver.has_free_contacts() {
            break;
        }
        // Coarse reject against the triangle's bounds.
        let tri_aabb = Aabb::from_points(&[va, vb, vc]);
        if !tri_aabb.overlaps_sphere(center, radius) {
            continue;
        }

        let closest = closest_point_on_triangle(center, va, vb, vc);
        let delta = center - closest;
        let distance_sq = delta.length_squared();
        if distance_sq >= radius * radius {
            continue;
        }

        let distance = distance_sq.sqrt();
        let normal = if distance > 1e-6 {
            delta / distance
        } else {
            // Center on the triangle: fall back to the face normal.
            let face = (vb - va).cross(vc - va);
            if face.length_squared() < 1e-10 {
                continue;
            }
            face.normalize()
        };

        let contact = Contact::new(
            [sphere.body(), soup.body()],
            closest,
            normal,
            radius - distance,
            friction,
            restitution,
        );
        if resolver.add_contact(contact) {
            added += 1;
        }
    }
    added
}

// --- box pairs ----------------------------------------------------------

fn box_and_half_space(
    box_collider: &Collider,
    plane: &Collider,
    bodies: &BodySet,
    resolver: &mut ContactResolver,
) -> usize {
    let half_extents = match box_collider.shape() {
        ColliderShape::Box { half_extents } => *half_extents,
        _ => return 0,
    };
    let (normal, offset) = match plane_in_world(plane, bodies) {
        Some(p) => p,
        None => return 0,
    };
    let transform = box_collider.world_transform(bodies);
    let (friction, restitution) = materials(resolver);

    let mut added = 0;
    for corner in box_corners(half_extents) {
        if !resolver.has_free_contacts() {
            break;
        }
        let vertex = transform.transform_point3(corner);
        let vertex_distance = normal.dot(vertex) - offset;
        if vertex_distance > PLANE_CONTACT_EPSILON {
            continue;
        }

        let contact = Contact::new(
            [box_collider.body(), plane.body()],
            vertex,
            normal,
            -vertex_distance,
            friction,
            restitution,
        );
        if resolver.add_contact(contact) {
            added += 1;
        }
    }
    added
}

fn box_and_sphere(
    box_collider: &Collider,
    sphere: &Collider,
    bodies: &BodySet,
    resolver: &mut ContactResolver,
) -> usize {
    let half_extents = match box_collider.shape() {
        ColliderShape::Box { half_extents } => *half_extents,
        _ => return 0,
    };
    let radius = match sphere.shape() {
        ColliderShape::Sphere { radius } => *radius,
        _ => return 0,
    };

    let transform = box_collider.world_transform(bodies);
    let center = sphere.world_center(bodies);
    let local_center = transform.inverse().transform_point3(center);

    // Early out on the separating faces.
    if local_center.x.abs() - radius > half_extents.x
        || local_center.y.abs() - radius > half_extents.y
        || local_center.z.abs() - radius > half_extents.z
    {
        return 0;
    }

    let clamped = local_center.clamp(-half_extents, half_extents);
    let delta = local_center - clamped;
    let distance_sq = delta.length_squared();
    if distance_sq > radius * radius {
        return 0;
    }

    let (local_normal, penetration, closest) = if distance_sq > 1e-10 {
        let distance = distance_sq.sqrt();
        // Points from the box surface toward the sphere.
        (delta / distance, radius - distance, clamped)
    } else {
        // Sphere center inside the box: exit through the nearest face.
        let depths = [
            half_extents.x - local_center.x.abs(),
            half_extents.y - local_center.y.abs(),
            half_extents.z - local_center.z.abs(),
        ];
        let mut face = 0;
        if depths[1] < depths[face] {
            face = 1;
        }
        if depths[2] < depths[face] {
            face = 2;
        }
        let mut normal = Vec3::ZERO;
        normal[face] = local_center[face].signum();
        let mut surface = local_center;
        surface[face] = half_extents[face] * local_center[face].signum();
        (normal, radius + depths[face], surface)
    };

    // The resolver's normal points toward the first body (the box), which
    // is opposite the box-to-sphere direction.
    let world_normal = -transform.transform_vector3(local_normal);
    let (friction, restitution) = materials(resolver);
    let contact = Contact::new(
        [box_collider.body(), sphere.body()],
        transform.transform_point3(closest),
        world_normal,
        penetration,
        friction,
        restitution,
    );
    resolver.add_contact(contact) as usize
}

/// Oriented-box view of a box collider under its body's pose.
struct OrientedBox {
    center: Vec3,
    axes: [Vec3; 3],
    half_extents: Vec3,
    transform: Affine3A,
    body: Option<BodyHandle>,
}

impl OrientedBox {
    fn new(collider: &Collider, bodies: &BodySet) -> Option<Self> {
        let half_extents = match collider.shape() {
            ColliderShape::Box { half_extents } => *half_extents,
            _ => return None,
        };
        let transform = collider.world_transform(bodies);
        Some(Self {
            center: transform.transform_point3(Vec3::ZERO),
            axes: [
                transform.transform_vector3(Vec3::X),
                transform.transform_vector3(Vec3::Y),
                transform.transform_vector3(Vec3::Z),
            ],
            half_extents,
            transform,
            body: collider.body(),
        })
    }

    fn axis(&self, index: usize) -> Vec3 {
        self.axes[index]
    }

    /// Half-projection of the box onto a unit axis.
    fn project_onto(&self, axis: Vec3) -> f32 {
        self.half_extents.x * self.axes[0].dot(axis).abs()
            + self.half_extents.y * self.axes[1].dot(axis).abs()
            + self.half_extents.z * self.axes[2].dot(axis).abs()
    }
}

fn penetration_on_axis(one: &OrientedBox, two: &OrientedBox, axis: Vec3, to_centre: Vec3) -> f32 {
    one.project_onto(axis) + two.project_onto(axis) - to_centre.dot(axis).abs()
}

/// Test one candidate axis, tracking the minimum penetration. Returns
/// false if the axis separates the boxes.
#[allow(clippy::too_many_arguments)]
fn try_axis(
    one: &OrientedBox,
    two: &OrientedBox,
    axis: Vec3,
    to_centre: Vec3,
    index: usize,
    smallest_penetration: &mut f32,
    smallest_case: &mut Option<usize>,
) -> bool {
    // Near-zero axes come from almost-parallel edges; skip them.
    if axis.length_squared() < SAT_AXIS_EPSILON {
        return true;
    }
    let axis = axis.normalize();

    let penetration = penetration_on_axis(one, two, axis, to_centre);
    if penetration < 0.0 {
        return false;
    }
    if penetration < *smallest_penetration {
        *smallest_penetration = penetration;
        *smallest_case = Some(index);
    }
    true
}

/// Contact for a vertex of `two` against a face of `one`.
fn fill_point_face(
    one: &OrientedBox,
    two: &OrientedBox,
    to_centre: Vec3,
    best: usize,
    penetration: f32,
    friction: f32,
    restitution: f32,
) -> Contact {
    // Which of the two face directions is away from the other box.
    let mut normal = one.axis(best);
    if normal.dot(to_centre) > 0.0 {
        normal = -normal;
    }

    // The vertex of `two` deepest along the face normal.
    let mut vertex = two.half_extents;
    for i in 0..3 {
        if two.axis(i).dot(normal) < 0.0 {
            vertex[i] = -vertex[i];
        }
    }

    Contact::new(
        [one.body, two.body],
        two.transform.transform_point3(vertex),
        normal,
        penetration,
        friction,
        restitution,
    )
}

/// Closest point between two edge segments, given their midpoints,
/// directions and half-lengths. Degenerate (parallel) or out-of-range
/// solutions fall back to one of the midpoints, picked by `use_one`.
#[allow(clippy::too_many_arguments)]
fn edge_contact_point(
    p_one: Vec3,
    d_one: Vec3,
    one_size: f32,
    p_two: Vec3,
    d_two: Vec3,
    two_size: f32,
    use_one: bool,
) -> Vec3 {
    let sm_one = d_one.length_squared();
    let sm_two = d_two.length_squared();
    let dp_one_two = d_two.dot(d_one);

    let to_st = p_one - p_two;
    let dp_sta_one = d_one.dot(to_st);
    let dp_sta_two = d_two.dot(to_st);

    let denom = sm_one * sm_two - dp_one_two * dp_one_two;
    if denom.abs() < EDGE_PARALLEL_EPSILON {
        return if use_one { p_one } else { p_two };
    }

    let mua = (dp_one_two * dp_sta_two - sm_two * dp_sta_one) / denom;
    let mub = (sm_one * dp_sta_two - dp_one_two * dp_sta_one) / denom;

    if mua > one_size || mua < -one_size || mub > two_size || mub < -two_size {
        if use_one {
            p_one
        } else {
            p_two
        }
    } else {
        let c_one = p_one + d_one * mua;
        let c_two = p_two + d_two * mub;
        c_one * 0.5 + c_two * 0.5
    }
}

fn box_and_box(
    a: &Collider,
    b: &Collider,
    bodies: &BodySet,
    resolver: &mut ContactResolver,
) -> usize {
    let Some(one) = OrientedBox::new(a, bodies) else {
        return 0;
    };
    let Some(two) = OrientedBox::new(b, bodies) else {
        return 0;
    };
    let to_centre = two.center - one.center;

    let mut penetration = f32::MAX;
    let mut best: Option<usize> = None;

    // Face axes of each box.
    for i in 0..3 {
        if !try_axis(&one, &two, one.axis(i), to_centre, i, &mut penetration, &mut best) {
            return 0;
        }
    }
    for i in 0..3 {
        if !try_axis(&one, &two, two.axis(i), to_centre, 3 + i, &mut penetration, &mut best) {
            return 0;
        }
    }

    // Remember the best face axis before the edge-edge cases; it breaks
    // ties in the parallel-edge fallback below.
    let best_single_axis = best;

    // Edge-edge cross axes.
    for i in 0..3 {
        for j in 0..3 {
            let axis = one.axis(i).cross(two.axis(j));
            let index = 6 + i * 3 + j;
            if !try_axis(&one, &two, axis, to_centre, index, &mut penetration, &mut best) {
                return 0;
            }
        }
    }

    let Some(best) = best else {
        return 0;
    };
    trace!(best, penetration, "box-box SAT overlap");

    let (friction, restitution) = materials(resolver);
    let contact = if best < 3 {
        // Vertex of two on a face of one.
        fill_point_face(&one, &two, to_centre, best, penetration, friction, restitution)
    } else if best < 6 {
        // Vertex of one on a face of two.
        fill_point_face(&two, &one, -to_centre, best - 3, penetration, friction, restitution)
    } else {
        // Edge-edge: recover the two edges and take their closest point.
        let best = best - 6;
        let one_axis_index = best / 3;
        let two_axis_index = best % 3;
        let one_axis = one.axis(one_axis_index);
        let two_axis = two.axis(two_axis_index);
        let mut axis = one_axis.cross(two_axis).normalize();
        if axis.dot(to_centre) > 0.0 {
            axis = -axis;
        }

        // Midpoints of the contacting edges: extremal on every axis but
        // their own direction.
        let mut pt_on_one_edge = one.half_extents;
        let mut pt_on_two_edge = two.half_extents;
        for i in 0..3 {
            if i == one_axis_index {
                pt_on_one_edge[i] = 0.0;
            } else if one.axis(i).dot(axis) > 0.0 {
                pt_on_one_edge[i] = -pt_on_one_edge[i];
            }
            if i == two_axis_index {
                pt_on_two_edge[i] = 0.0;
            } else if two.axis(i).dot(axis) < 0.0 {
                pt_on_two_edge[i] = -pt_on_two_edge[i];
            }
        }
        let p_one = one.transform.transform_point3(pt_on_one_edge);
        let p_two = two.transform.transform_point3(pt_on_two_edge);

        let use_one = best_single_axis.map_or(false, |b| b > 2);
        let vertex = edge_contact_point(
            p_one,
            one_axis,
            one.half_extents[one_axis_index],
            p_two,
            two_axis,
            two.half_extents[two_axis_index],
            use_one,
        );

        Contact::new(
            [one.body, two.body],
            vertex,
            axis,
            penetration,
            friction,
            restitution,
        )
    };

    resolver.add_contact(contact) as usize
}

// --- box vs triangle soup ----------------------------------------------

/// Edges of the corner array produced by `box_corners`.
const BOX_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [2, 3],
    [4, 5],
    [6, 7],
    [0, 2],
    [1, 3],
    [4, 6],
    [5, 7],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

fn box_and_triangle_soup(
    box_collider: &Collider,
    soup: &Collider,
    bodies: &BodySet,
    resolver: &mut ContactResolver,
) -> usize {
    let half_extents = match box_collider.shape() {
        ColliderShape::Box { half_extents } => *half_extents,
        _ => return 0,
    };
    let transform = box_collider.world_transform(bodies);
    let inverse = transform.inverse();
    let corners = box_corners(half_extents);
    let (friction, restitution) = materials(resolver);

    let mut added = 0;
    // Candidate buffer reused across triangles.
    let mut candidates: Vec<Vec3> = Vec::new();
    'triangles: for tri in soup.world_triangles(bodies) {
        if !resolver.has_free_contacts() {
            break;
        }

        // Work in the box's local frame, where the box is axis-aligned.
        let v = [
            inverse.transform_point3(tri[0]),
            inverse.transform_point3(tri[1]),
            inverse.transform_point3(tri[2]),
        ];
        if !triangle_aabb_overlap(&v, half_extents) {
            continue;
        }

        // Triangle plane, oriented so the box center is on the outside.
        let mut normal = (v[1] - v[0]).cross(v[2] - v[0]);
        if normal.length_squared() < 1e-10 {
            continue;
        }
        normal = normal.normalize();
        let mut plane_offset = normal.dot(v[0]);
        if plane_offset > 0.0 {
            normal = -normal;
            plane_offset = -plane_offset;
        }

        // Candidate contact points: box corners behind the triangle's
        // plane within its prism, triangle vertices inside the box,
        // triangle edges crossing the box surface, and box edges crossing
        // the triangle.
        candidates.clear();
        for corner in corners {
            if point_in_triangle_prism(corner, &v, normal) {
                push_unique(&mut candidates, corner);
            }
        }
        for vertex in v {
            if vertex.x.abs() <= half_extents.x
                && vertex.y.abs() <= half_extents.y
                && vertex.z.abs() <= half_extents.z
            {
                push_unique(&mut candidates, vertex);
            }
        }
        for edge in [[v[0], v[1]], [v[1], v[2]], [v[2], v[0]]] {
            for point in segment_aabb_crossings(edge[0], edge[1], half_extents)
                .into_iter()
                .flatten()
            {
                push_unique(&mut candidates, point);
            }
        }
        for edge in BOX_EDGES {
            if let Some(point) =
                segment_triangle_intersection(corners[edge[0]], corners[edge[1]], &v)
            {
                push_unique(&mut candidates, point);
            }
        }

        for &point in &candidates {
            if !resolver.has_free_contacts() {
                break 'triangles;
            }
            // Depth of the candidate behind the triangle plane.
            let depth = plane_offset - normal.dot(point);
            if depth <= 1e-5 {
                continue;
            }
            let contact = Contact::new(
                [box_collider.body(), soup.body()],
                transform.transform_point3(point),
                transform.transform_vector3(normal),
                depth,
                friction,
                restitution,
            );
            if resolver.add_contact(contact) {
                added += 1;
            }
        }
    }
    added
}

/// Separating-axis overlap test between a triangle and an origin-centered
/// axis-aligned box (13 axes).
fn triangle_aabb_overlap(v: &[Vec3; 3], half_extents: Vec3) -> bool {
    // Box face normals: compare component ranges.
    for axis in 0..3 {
        let min = v[0][axis].min(v[1][axis]).min(v[2][axis]);
        let max = v[0][axis].max(v[1][axis]).max(v[2][axis]);
        if min > half_extents[axis] || max < -half_extents[axis] {
            return false;
        }
    }

    // Triangle face normal.
    let normal = (v[1] - v[0]).cross(v[2] - v[0]);
    if normal.length_squared() > 1e-10 {
        let distance = normal.dot(v[0]);
        let radius = half_extents.x * normal.x.abs()
            + half_extents.y * normal.y.abs()
            + half_extents.z * normal.z.abs();
        if distance.abs() > radius {
            return false;
        }
    }

    // Cross products of box axes and triangle edges.
    let axes = [Vec3::X, Vec3::Y, Vec3::Z];
    let edges = [v[1] - v[0], v[2] - v[1], v[0] - v[2]];
    for box_axis in axes {
        for edge in edges {
            let axis = box_axis.cross(edge);
            if axis.length_squared() < 1e-8 {
                continue;
            }
            let p0 = axis.dot(v[0]);
            let p1 = axis.dot(v[1]);
            let p2 = axis.dot(v[2]);
            let radius = half_extents.x * axis.x.abs()
                + half_extents.y * axis.y.abs()
                + half_extents.z * axis.z.abs();
            if p0.min(p1).min(p2) > radius || p0.max(p1).max(p2) < -radius {
                return false;
            }
        }
    }
    true
}

/// Points where a segment crosses the surface of an origin-centered box,
/// found by slab clipping. Endpoints inside the box are not reported.
fn segment_aabb_crossings(p0: Vec3, p1: Vec3, half_extents: Vec3) -> [Option<Vec3>; 2] {
    let dir = p1 - p0;
    let mut t_min = 0.0f32;
    let mut t_max = 1.0f32;

    for axis in 0..3 {
        if dir[axis].abs() < 1e-8 {
            if p0[axis].abs() > half_extents[axis] {
                return [None, None];
            }
            continue;
        }
        let inv = 1.0 / dir[axis];
        let mut t1 = (-half_extents[axis] - p0[axis]) * inv;
        let mut t2 = (half_extents[axis] - p0[axis]) * inv;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        t_min = t_min.max(t1);
        t_max = t_max.min(t2);
        if t_min > t_max {
            return [None, None];
        }
    }

    [
        (t_min > 0.0).then(|| p0 + dir * t_min),
        (t_max < 1.0).then(|| p0 + dir * t_max),
    ]
}

/// Whether a point projects onto the triangle's interior along its normal.
fn point_in_triangle_prism(p: Vec3, v: &[Vec3; 3], normal: Vec3) -> bool {
    let mut sign = 0.0f32;
    for i in 0..3 {
        let edge = v[(i + 1) % 3] - v[i];
        let side = edge.cross(p - v[i]).dot(normal);
        if side.abs() < 1e-8 {
            continue;
        }
        if sign == 0.0 {
            sign = side.signum();
        } else if side.signum() != sign {
            return false;
        }
    }
    true
}

/// Intersection of a segment with a triangle (Möller-Trumbore restricted
/// to the segment's parameter range).
fn segment_triangle_intersection(p: Vec3, q: Vec3, v: &[Vec3; 3]) -> Option<Vec3> {
    let dir = q - p;
    let e1 = v[1] - v[0];
    let e2 = v[2] - v[0];

    let h = dir.cross(e2);
    let det = e1.dot(h);
    if det.abs() < 1e-8 {
        return None;
    }
    let inv = 1.0 / det;

    let s = p - v[0];
    let u = s.dot(h) * inv;
    if !(-1e-6..=1.0 + 1e-6).contains(&u) {
        return None;
    }

    let qv = s.cross(e1);
    let w = dir.dot(qv) * inv;
    if w < -1e-6 || u + w > 1.0 + 1e-6 {
        return None;
    }

    let t = e2.dot(qv) * inv;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    Some(p + dir * t)
}

fn push_unique(points: &mut Vec<Vec3>, point: Vec3) {
    if points
        .iter()
        .all(|p| (*p - point).length_squared() > POINT_MERGE_EPSILON * POINT_MERGE_EPSILON)
    {
        points.push(point);
    }
}

/// Closest point on a triangle to a point (barycentric region walk).
fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

/// World-space normal and offset of a plane collider.
fn plane_in_world(plane: &Collider, bodies: &BodySet) -> Option<(Vec3, f32)> {
    let (normal, offset) = match plane.shape() {
        ColliderShape::Plane { normal, offset } => (*normal, *offset),
        _ => return None,
    };
    match plane.body() {
        None => Some((normal, offset)),
        Some(handle) => {
            let transform = bodies[handle].transform();
            let world_normal = transform.transform_vector3(normal);
            let point_on_plane = transform.transform_point3(normal * offset);
            Some((world_normal, world_normal.dot(point_on_plane)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use crate::config::ResolverSettings;

    fn resolver() -> ContactResolver {
        ContactResolver::new(ResolverSettings::default()).unwrap()
    }

    fn dynamic_body(bodies: &mut BodySet, position: Vec3) -> BodyHandle {
        let handle = bodies.insert(RigidBody::dynamic(1.0).unwrap());
        bodies[handle].set_position(position);
        handle
    }

    fn sphere_at(bodies: &mut BodySet, position: Vec3, radius: f32) -> Collider {
        let handle = dynamic_body(bodies, position);
        Collider::sphere(radius)
            .unwrap()
            .attached(bodies, handle)
            .unwrap()
    }

    fn box_at(bodies: &mut BodySet, position: Vec3, half_extents: Vec3) -> Collider {
        let handle = dynamic_body(bodies, position);
        Collider::box_collider(half_extents)
            .unwrap()
            .attached(bodies, handle)
            .unwrap()
    }

    #[test]
    fn test_sphere_sphere_overlap() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let a = sphere_at(&mut bodies, Vec3::ZERO, 1.0);
        let b = sphere_at(&mut bodies, Vec3::new(1.5, 0.0, 0.0), 1.0);

        assert_eq!(detect(&a, &b, &bodies, &mut resolver), 1);
        let contact = &resolver.contacts()[0];
        assert!((contact.penetration() - 0.5).abs() < 1e-5);
        // Normal points from the second sphere toward the first.
        assert!((contact.normal() - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5);
        assert!((contact.point() - Vec3::new(0.75, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_sphere_sphere_separated() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let a = sphere_at(&mut bodies, Vec3::ZERO, 1.0);
        let b = sphere_at(&mut bodies, Vec3::new(3.0, 0.0, 0.0), 1.0);
        assert_eq!(detect(&a, &b, &bodies, &mut resolver), 0);
    }

    #[test]
    fn test_sphere_sphere_coincident_centers_rejected() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let a = sphere_at(&mut bodies, Vec3::ZERO, 1.0);
        let b = sphere_at(&mut bodies, Vec3::ZERO, 1.0);
        assert_eq!(detect(&a, &b, &bodies, &mut resolver), 0);
    }

    #[test]
    fn test_sphere_half_space() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let sphere = sphere_at(&mut bodies, Vec3::new(0.0, 0.5, 0.0), 1.0);
        let plane = Collider::plane(Vec3::Y, 0.0).unwrap();

        assert_eq!(detect(&sphere, &plane, &bodies, &mut resolver), 1);
        let contact = &resolver.contacts()[0];
        assert!((contact.penetration() - 0.5).abs() < 1e-5);
        assert!((contact.normal() - Vec3::Y).length() < 1e-5);
        assert!((contact.point() - Vec3::ZERO).length() < 1e-5);
    }

    #[test]
    fn test_plane_normalized_to_second_operand() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let sphere = sphere_at(&mut bodies, Vec3::new(0.0, 0.5, 0.0), 1.0);
        let plane = Collider::plane(Vec3::Y, 0.0).unwrap();

        // Plane given first: dispatch must swap the operands.
        assert_eq!(detect(&plane, &sphere, &bodies, &mut resolver), 1);
        let contact = &resolver.contacts()[0];
        assert_eq!(contact.body(0), sphere.body());
        assert!((contact.normal() - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_plane_plane_rejected() {
        let bodies = BodySet::new();
        let mut resolver = resolver();
        let a = Collider::plane(Vec3::Y, 0.0).unwrap();
        let b = Collider::plane(Vec3::X, 0.0).unwrap();
        assert_eq!(detect(&a, &b, &bodies, &mut resolver), 0);
    }

    #[test]
    fn test_box_half_space_four_corners() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let box_collider = box_at(&mut bodies, Vec3::new(0.0, 0.5, 0.0), Vec3::ONE);
        let plane = Collider::plane(Vec3::Y, 0.0).unwrap();

        // Bottom face at y = -0.5: four corners penetrate.
        assert_eq!(detect(&box_collider, &plane, &bodies, &mut resolver), 4);
        for contact in resolver.contacts() {
            assert!((contact.penetration() - 0.5).abs() < 1e-5);
            assert!((contact.normal() - Vec3::Y).length() < 1e-5);
        }
    }

    #[test]
    fn test_box_sphere_face_contact() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let box_collider = box_at(&mut bodies, Vec3::ZERO, Vec3::ONE);
        let sphere = sphere_at(&mut bodies, Vec3::new(1.5, 0.0, 0.0), 1.0);

        assert_eq!(detect(&box_collider, &sphere, &bodies, &mut resolver), 1);
        let contact = &resolver.contacts()[0];
        assert!((contact.penetration() - 0.5).abs() < 1e-5);
        // Normal points from the sphere toward the box.
        assert!((contact.normal() - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5);
        assert!((contact.point() - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_box_sphere_center_inside() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let box_collider = box_at(&mut bodies, Vec3::ZERO, Vec3::ONE);
        let sphere = sphere_at(&mut bodies, Vec3::new(0.9, 0.0, 0.0), 0.5);

        assert_eq!(detect(&box_collider, &sphere, &bodies, &mut resolver), 1);
        let contact = &resolver.contacts()[0];
        // Exit through the +X face: penetration is radius plus face depth.
        assert!((contact.penetration() - 0.6).abs() < 1e-4);
        assert!((contact.normal() - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_box_box_face_axis() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let a = box_at(&mut bodies, Vec3::ZERO, Vec3::ONE);
        let b = box_at(&mut bodies, Vec3::new(1.5, 0.0, 0.0), Vec3::ONE);

        assert_eq!(detect(&a, &b, &bodies, &mut resolver), 1);
        let contact = &resolver.contacts()[0];
        assert!((contact.penetration() - 0.5).abs() < 1e-5);
        // Face contact along X; normal pushes the first box away.
        assert!((contact.normal() - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_box_box_separated() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let a = box_at(&mut bodies, Vec3::ZERO, Vec3::ONE);
        let b = box_at(&mut bodies, Vec3::new(4.0, 0.0, 0.0), Vec3::ONE);
        assert_eq!(detect(&a, &b, &bodies, &mut resolver), 0);
    }

    #[test]
    fn test_box_box_rotated_vertex_on_face() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let a = box_at(&mut bodies, Vec3::ZERO, Vec3::ONE);

        // Second box rotated 45 degrees about Z, up-right on the diagonal.
        // The shallowest axis is the rotated box's own face direction, so
        // a corner of the first box rests on that face.
        let handle = dynamic_body(&mut bodies, Vec3::new(1.35, 1.35, 0.0));
        bodies[handle].set_orientation(glam::Quat::from_rotation_z(
            std::f32::consts::FRAC_PI_4,
        ));
        let b = Collider::box_collider(Vec3::ONE)
            .unwrap()
            .attached(&mut bodies, handle)
            .unwrap();

        let added = detect(&a, &b, &bodies, &mut resolver);
        assert_eq!(added, 1);
        let contact = &resolver.contacts()[0];
        // Overlap on the rotated face axis: 2*sqrt(2)/2 + 1 - 1.35*sqrt(2).
        assert!((contact.penetration() - 0.505).abs() < 1e-2);
        // The face owner lands in the first slot; the normal pushes it
        // up-right, away from the axis-aligned box.
        assert_eq!(contact.body(0), Some(handle));
        let diagonal = Vec3::new(1.0, 1.0, 0.0).normalize();
        assert!((contact.normal() - diagonal).length() < 1e-4);
    }

    #[test]
    fn test_sphere_triangle_soup() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let sphere = sphere_at(&mut bodies, Vec3::new(0.25, 0.5, 0.25), 1.0);
        // One large ground triangle in the XZ plane.
        let soup = Collider::triangle_soup(
            vec![
                Vec3::new(-10.0, 0.0, -10.0),
                Vec3::new(10.0, 0.0, -10.0),
                Vec3::new(0.0, 0.0, 10.0),
            ],
            vec![[0, 1, 2]],
        )
        .unwrap();

        assert_eq!(detect(&sphere, &soup, &bodies, &mut resolver), 1);
        let contact = &resolver.contacts()[0];
        assert!((contact.penetration() - 0.5).abs() < 1e-4);
        assert!((contact.normal() - Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn test_sphere_triangle_soup_miss() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let sphere = sphere_at(&mut bodies, Vec3::new(0.0, 5.0, 0.0), 1.0);
        let soup = Collider::triangle_soup(
            vec![Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 0.0, -1.0), Vec3::new(0.0, 0.0, 1.0)],
            vec![[0, 1, 2]],
        )
        .unwrap();
        assert_eq!(detect(&sphere, &soup, &bodies, &mut resolver), 0);
    }

    #[test]
    fn test_box_triangle_soup() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let box_collider = box_at(&mut bodies, Vec3::new(0.0, 0.8, 0.0), Vec3::ONE);
        // Ground triangle under the box, large enough for the whole face.
        let soup = Collider::triangle_soup(
            vec![
                Vec3::new(-20.0, 0.0, -20.0),
                Vec3::new(20.0, 0.0, -20.0),
                Vec3::new(0.0, 0.0, 20.0),
            ],
            vec![[0, 1, 2]],
        )
        .unwrap();

        // The four bottom corners sit 0.2 below the triangle; the edge
        // crossings on the plane itself carry no depth.
        let added = detect(&box_collider, &soup, &bodies, &mut resolver);
        assert_eq!(added, 4);
        for contact in resolver.contacts() {
            // Normal in world space points up toward the box.
            assert!((contact.normal() - Vec3::Y).length() < 1e-4);
            assert!((contact.penetration() - 0.2).abs() < 1e-4);
        }
    }

    #[test]
    fn test_box_triangle_soup_separated() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        let box_collider = box_at(&mut bodies, Vec3::new(0.0, 1.5, 0.0), Vec3::ONE);
        let soup = Collider::triangle_soup(
            vec![
                Vec3::new(-20.0, 0.0, -20.0),
                Vec3::new(20.0, 0.0, -20.0),
                Vec3::new(0.0, 0.0, 20.0),
            ],
            vec![[0, 1, 2]],
        )
        .unwrap();
        assert_eq!(detect(&box_collider, &soup, &bodies, &mut resolver), 0);
    }

    #[test]
    fn test_soup_against_plane_generates_nothing() {
        let mut bodies = BodySet::new();
        let mut resolver = resolver();
        // Soup on a dynamic body, so the pair is not skipped as static.
        let handle = dynamic_body(&mut bodies, Vec3::new(0.0, 0.2, 0.0));
        let soup = Collider::triangle_soup(
            vec![
                Vec3::new(-1.0, 0.0, -1.0),
                Vec3::new(1.0, 0.0, -1.0),
                Vec3::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 1, 2]],
        )
        .unwrap()
        .attached(&mut bodies, handle)
        .unwrap();
        let plane = Collider::plane(Vec3::Y, 0.0).unwrap();

        assert_eq!(detect(&soup, &plane, &bodies, &mut resolver), 0);
        assert_eq!(detect(&plane, &soup, &bodies, &mut resolver), 0);
    }

    #[test]
    fn test_capacity_exhaustion_stops_generation() {
        let mut bodies = BodySet::new();
        let mut resolver = ContactResolver::new(ResolverSettings {
            max_contacts: 2,
            ..Default::default()
        })
        .unwrap();

        let box_collider = box_at(&mut bodies, Vec3::new(0.0, 0.5, 0.0), Vec3::ONE);
        let plane = Collider::plane(Vec3::Y, 0.0).unwrap();

        // Four corners penetrate but only two slots exist.
        assert_eq!(detect(&box_collider, &plane, &bodies, &mut resolver), 2);
        assert!(!resolver.has_free_contacts());
    }

    #[test]
    fn test_static_pair_skipped() {
        let bodies = BodySet::new();
        let mut resolver = resolver();
        let plane = Collider::plane(Vec3::Y, 0.0).unwrap();
        let soup = Collider::triangle_soup(
            vec![Vec3::ZERO, Vec3::X, Vec3::Z],
            vec![[0, 1, 2]],
        )
        .unwrap();
        assert_eq!(detect(&soup, &plane, &bodies, &mut resolver), 0);
    }

    #[test]
    fn test_closest_point_on_triangle_regions() {
        let a = Vec3::ZERO;
        let b = Vec3::new(2.0, 0.0, 0.0);
        let c = Vec3::new(0.0, 2.0, 0.0);

        // Interior point projects straight down.
        let p = closest_point_on_triangle(Vec3::new(0.5, 0.5, 1.0), a, b, c);
        assert!((p - Vec3::new(0.5, 0.5, 0.0)).length() < 1e-5);

        // Beyond vertex a.
        let p = closest_point_on_triangle(Vec3::new(-1.0, -1.0, 0.0), a, b, c);
        assert!((p - a).length() < 1e-5);

        // Closest to edge ab.
        let p = closest_point_on_triangle(Vec3::new(1.0, -1.0, 0.0), a, b, c);
        assert!((p - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_edge_contact_point_parallel_fallback() {
        // Parallel edges: solver must fall back to a midpoint.
        let p = edge_contact_point(
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::X,
            1.0,
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::X,
            1.0,
            true,
        );
        assert_eq!(p, Vec3::new(0.0, 1.0, 0.0));
    }
}
