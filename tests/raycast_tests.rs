use approx::assert_relative_eq;
use oxiphys::*;

fn world_with_static_box(kind: BroadPhaseKind, half: Vec3) -> World {
    let mut world = World::new(kind, Vec3::ZERO);
    let body = world.add_body(&RigidBodyConfig {
        kind: RigidBodyKind::Static,
        ..Default::default()
    });
    world.add_shape(body, &ShapeConfig::with_geometry(Geometry::cuboid(half)));
    world
}

#[test]
fn ray_hits_box_with_fraction_and_normal() {
    for kind in [BroadPhaseKind::BruteForce, BroadPhaseKind::Bvh] {
        let mut world = world_with_static_box(kind, Vec3::ONE);
        let hit = world
            .ray_cast_closest(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0))
            .expect("ray should hit the box");
        assert_relative_eq!(hit.1.fraction, 0.4, epsilon = 1e-9);
        assert_relative_eq!(hit.1.normal.x, -1.0, epsilon = 1e-9);
        assert_relative_eq!(hit.1.position.x, -1.0, epsilon = 1e-9);
    }
}

#[test]
fn ray_above_box_invokes_no_callback() {
    let mut world = world_with_static_box(BroadPhaseKind::Bvh, Vec3::ONE);
    let mut invoked = false;
    world.ray_cast(
        Vec3::new(-5.0, 5.0, 0.0),
        Vec3::new(5.0, 5.0, 0.0),
        &mut |_, _| invoked = true,
    );
    assert!(!invoked);
}

#[test]
fn ray_from_inside_misses_by_design() {
    let mut world = world_with_static_box(BroadPhaseKind::Bvh, Vec3::ONE);
    assert!(world
        .ray_cast_closest(Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0))
        .is_none());
}

#[test]
fn ray_reports_nearest_of_many_shapes() {
    let mut world = World::new(BroadPhaseKind::Bvh, Vec3::ZERO);
    let mut nearest = None;
    for x in [6.0, 2.0, 10.0] {
        let body = world.add_body(&RigidBodyConfig {
            position: Vec3::new(x, 0.0, 0.0),
            kind: RigidBodyKind::Static,
            ..Default::default()
        });
        world.add_shape(body, &ShapeConfig::with_geometry(Geometry::sphere(0.5)));
        if x == 2.0 {
            nearest = Some(body);
        }
    }
    let (body, hit) = world
        .ray_cast_closest(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(15.0, 0.0, 0.0))
        .expect("ray should hit");
    assert_eq!(Some(body), nearest);
    assert_relative_eq!(hit.position.x, 1.5, epsilon = 1e-9);
}

#[test]
fn convex_hull_ray_cast_goes_through_gjk() {
    let mut world = World::new(BroadPhaseKind::Bvh, Vec3::ZERO);
    let body = world.add_body(&RigidBodyConfig {
        kind: RigidBodyKind::Static,
        ..Default::default()
    });
    // an axis-aligned cube expressed as a vertex cloud
    let vertices = vec![
        Vec3::new(-1.0, -1.0, -1.0),
        Vec3::new(1.0, -1.0, -1.0),
        Vec3::new(1.0, 1.0, -1.0),
        Vec3::new(-1.0, 1.0, -1.0),
        Vec3::new(-1.0, -1.0, 1.0),
        Vec3::new(1.0, -1.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(-1.0, 1.0, 1.0),
    ];
    world.add_shape(
        body,
        &ShapeConfig::with_geometry(Geometry::convex_hull(vertices)),
    );

    let hit = world
        .ray_cast_closest(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0))
        .expect("hull should be hit");
    // the hull surface carries the GJK margin shell
    assert!((hit.1.position.x + 1.0).abs() < 0.1);
    assert!(hit.1.normal.x < -0.9);
}

#[test]
fn convex_cast_reports_time_of_impact() {
    let mut world = world_with_static_box(BroadPhaseKind::Bvh, Vec3::ONE);
    let probe = Geometry::sphere(0.5);
    let mut hits = Vec::new();
    world.convex_cast(
        &probe,
        &Transform::from_position(Vec3::new(-5.0, 0.0, 0.0)),
        Vec3::new(10.0, 0.0, 0.0),
        &mut |_, hit| hits.push(*hit),
    );
    assert_eq!(hits.len(), 1);
    // the sphere surface reaches the face at x = −1 after traveling 3.5
    assert_relative_eq!(hits[0].fraction, 0.35, epsilon = 1e-3);
}

#[test]
fn convex_cast_past_the_target_misses() {
    let mut world = world_with_static_box(BroadPhaseKind::Bvh, Vec3::ONE);
    let probe = Geometry::sphere(0.5);
    let mut invoked = false;
    world.convex_cast(
        &probe,
        &Transform::from_position(Vec3::new(-5.0, 5.0, 0.0)),
        Vec3::new(10.0, 0.0, 0.0),
        &mut |_, _| invoked = true,
    );
    assert!(!invoked);
}

#[test]
fn aabb_test_reports_overlapping_shapes() {
    let mut world = World::new(BroadPhaseKind::Bvh, Vec3::ZERO);
    for x in 0..5 {
        let body = world.add_body(&RigidBodyConfig {
            position: Vec3::new(x as Real * 3.0, 0.0, 0.0),
            kind: RigidBodyKind::Static,
            ..Default::default()
        });
        world.add_shape(body, &ShapeConfig::with_geometry(Geometry::sphere(0.5)));
    }

    let region = Aabb::new(Vec3::new(2.0, -1.0, -1.0), Vec3::new(7.0, 1.0, 1.0));
    let mut count = 0;
    world.aabb_test(&region, &mut |_| count += 1);
    assert_eq!(count, 2); // the spheres at x = 3 and x = 6
}
