//! Reference contact-generation scenarios with known-good values

use glam::{Quat, Vec3};
use rigidsim::collision::narrow_phase;
use rigidsim::{BodySet, Collider, ContactResolver, ResolverSettings, RigidBody};

fn resolver() -> ContactResolver {
    ContactResolver::new(ResolverSettings::default()).unwrap()
}

#[test]
fn test_sphere_half_space_reference_values() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut bodies = BodySet::new();
    let mut resolver = resolver();

    // Unit sphere with its center 0.5 above a ground plane through the
    // origin: penetration 0.5, normal straight up, contact at the origin.
    let handle = bodies.insert(RigidBody::dynamic(1.0).unwrap().at(Vec3::new(0.0, 0.5, 0.0)));
    let sphere = Collider::sphere(1.0)
        .unwrap()
        .attached(&mut bodies, handle)
        .unwrap();
    let plane = Collider::plane(Vec3::Y, 0.0).unwrap();

    assert_eq!(narrow_phase::detect(&sphere, &plane, &bodies, &mut resolver), 1);
    let contact = &resolver.contacts()[0];
    assert!((contact.penetration() - 0.5).abs() < 1e-5);
    assert!((contact.normal() - Vec3::Y).length() < 1e-5);
    assert!((contact.point() - Vec3::ZERO).length() < 1e-5);
    assert_eq!(contact.body(0), Some(handle));
    assert_eq!(contact.body(1), None);
}

#[test]
fn test_box_box_face_overlap_reference_values() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut bodies = BodySet::new();
    let mut resolver = resolver();

    // Two axis-aligned unit-half-extent boxes 1.5 apart along X overlap
    // by 0.5 on the X face axis.
    let ha = bodies.insert(RigidBody::dynamic(1.0).unwrap());
    let a = Collider::box_collider(Vec3::ONE)
        .unwrap()
        .attached(&mut bodies, ha)
        .unwrap();
    let hb = bodies.insert(RigidBody::dynamic(1.0).unwrap().at(Vec3::new(1.5, 0.0, 0.0)));
    let b = Collider::box_collider(Vec3::ONE)
        .unwrap()
        .attached(&mut bodies, hb)
        .unwrap();

    assert_eq!(narrow_phase::detect(&a, &b, &bodies, &mut resolver), 1);
    let contact = &resolver.contacts()[0];
    assert!((contact.penetration() - 0.5).abs() < 1e-5);
    // The normal pushes the first box away from the second.
    assert!((contact.normal() - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5);
    assert!((contact.point().x - 0.5).abs() < 1e-5);
}

#[test]
fn test_rotated_box_on_plane_touches_on_edge() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut bodies = BodySet::new();
    let mut resolver = resolver();

    // A unit box rotated 45 degrees about Z rests on its edge; only the
    // two lowest corners can touch the plane.
    let lowest = std::f32::consts::SQRT_2;
    let handle = bodies.insert(
        RigidBody::dynamic(1.0)
            .unwrap()
            .at(Vec3::new(0.0, lowest - 0.1, 0.0))
            .oriented(Quat::from_rotation_z(std::f32::consts::FRAC_PI_4)),
    );
    let box_collider = Collider::box_collider(Vec3::ONE)
        .unwrap()
        .attached(&mut bodies, handle)
        .unwrap();
    let plane = Collider::plane(Vec3::Y, 0.0).unwrap();

    let added = narrow_phase::detect(&box_collider, &plane, &bodies, &mut resolver);
    assert_eq!(added, 2);
    for contact in resolver.contacts() {
        assert!((contact.penetration() - 0.1).abs() < 1e-4);
        assert!((contact.normal() - Vec3::Y).length() < 1e-5);
    }
}

#[test]
fn test_sphere_on_soup_matches_plane_equivalent() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut bodies = BodySet::new();
    let mut soup_resolver = resolver();
    let mut plane_resolver = resolver();

    let handle = bodies.insert(RigidBody::dynamic(1.0).unwrap().at(Vec3::new(0.0, 0.5, 0.0)));
    let sphere = Collider::sphere(1.0)
        .unwrap()
        .attached(&mut bodies, handle)
        .unwrap();

    // A ground quad as two triangles should produce the same contact as
    // the infinite plane (one triangle contains the contact point).
    let soup = Collider::triangle_soup(
        vec![
            Vec3::new(-10.0, 0.0, -10.0),
            Vec3::new(10.0, 0.0, -10.0),
            Vec3::new(10.0, 0.0, 10.0),
            Vec3::new(-10.0, 0.0, 10.0),
        ],
        vec![[0, 1, 2], [0, 2, 3]],
    )
    .unwrap();
    let plane = Collider::plane(Vec3::Y, 0.0).unwrap();

    let soup_count = narrow_phase::detect(&sphere, &soup, &bodies, &mut soup_resolver);
    narrow_phase::detect(&sphere, &plane, &bodies, &mut plane_resolver);

    assert!(soup_count >= 1);
    let reference = &plane_resolver.contacts()[0];
    let soup_contact = soup_resolver
        .contacts()
        .iter()
        .max_by(|a, b| a.penetration().total_cmp(&b.penetration()))
        .unwrap();
    assert!((soup_contact.penetration() - reference.penetration()).abs() < 1e-4);
    assert!((soup_contact.normal() - reference.normal()).length() < 1e-4);
}

#[test]
fn test_box_sphere_corner_region() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut bodies = BodySet::new();
    let mut resolver = resolver();

    let hb = bodies.insert(RigidBody::dynamic(1.0).unwrap());
    let box_collider = Collider::box_collider(Vec3::ONE)
        .unwrap()
        .attached(&mut bodies, hb)
        .unwrap();

    // Sphere off the corner along the diagonal; closest point is the
    // corner itself.
    let corner = Vec3::ONE;
    let direction = Vec3::ONE.normalize();
    let hs = bodies.insert(
        RigidBody::dynamic(1.0)
            .unwrap()
            .at(corner + direction * 0.8),
    );
    let sphere = Collider::sphere(1.0)
        .unwrap()
        .attached(&mut bodies, hs)
        .unwrap();

    assert_eq!(
        narrow_phase::detect(&box_collider, &sphere, &bodies, &mut resolver),
        1
    );
    let contact = &resolver.contacts()[0];
    assert!((contact.point() - corner).length() < 1e-4);
    assert!((contact.penetration() - 0.2).abs() < 1e-4);
    // Normal points from the sphere toward the box, down the diagonal.
    assert!((contact.normal() + direction).length() < 1e-4);
}
