use approx::assert_relative_eq;
use oxiphys::*;

/// Builds a world with zero gravity and zero solver iterations so manifolds
/// can be inspected without the solver disturbing them.
fn frozen_world(kind: BroadPhaseKind) -> World {
    let mut world = World::new(kind, Vec3::ZERO);
    world.set_num_velocity_iterations(0);
    world.set_num_position_iterations(0);
    world
}

fn add_box(world: &mut World, position: Vec3, half: Vec3, kind: RigidBodyKind) -> BodyId {
    let body = world.add_body(&RigidBodyConfig {
        position,
        kind,
        ..Default::default()
    });
    world.add_shape(body, &ShapeConfig::with_geometry(Geometry::cuboid(half)));
    body
}

#[test]
fn box_box_face_contact_produces_four_corner_manifold() {
    let mut world = frozen_world(BroadPhaseKind::Bvh);
    // the dynamic box is added first, so it becomes shape 1 of the pair
    add_box(
        &mut world,
        Vec3::new(1.9, 0.0, 0.0),
        Vec3::ONE,
        RigidBodyKind::Dynamic,
    );
    add_box(&mut world, Vec3::ZERO, Vec3::ONE, RigidBodyKind::Static);

    world.step(1.0 / 60.0);

    let contact = world.contacts().next().expect("boxes should touch");
    let manifold = contact.manifold();
    assert_eq!(manifold.num_points, 4);
    assert_relative_eq!(manifold.normal.x, 1.0, epsilon = 1e-6);
    assert_relative_eq!(manifold.normal.y, 0.0, epsilon = 1e-6);
    assert_relative_eq!(manifold.normal.z, 0.0, epsilon = 1e-6);
    for p in &manifold.points[..manifold.num_points] {
        assert_relative_eq!(p.depth, 0.1, epsilon = 1e-6);
        // corner points of the overlapping face
        assert_relative_eq!(p.pos1.y.abs(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.pos1.z.abs(), 1.0, epsilon = 1e-6);
    }
}

#[test]
fn manifold_frame_is_orthonormal() {
    let mut world = frozen_world(BroadPhaseKind::Bvh);
    add_box(
        &mut world,
        Vec3::new(0.4, 1.2, -0.2),
        Vec3::splat(0.7),
        RigidBodyKind::Dynamic,
    );
    add_box(
        &mut world,
        Vec3::ZERO,
        Vec3::new(2.0, 0.7, 2.0),
        RigidBodyKind::Static,
    );
    world.step(1.0 / 60.0);

    for contact in world.contacts() {
        let m = contact.manifold();
        assert!(m.num_points <= 4);
        assert_relative_eq!(m.normal.length(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(m.normal.dot(m.tangent), 0.0, epsilon = 1e-9);
        assert!((m.normal.cross(m.tangent) - m.binormal).length() < 1e-9);
    }
}

#[test]
fn manifold_points_reconstruct_from_local_positions() {
    let mut world = World::default();
    add_box(
        &mut world,
        Vec3::new(0.0, -0.5, 0.0),
        Vec3::new(5.0, 0.5, 5.0),
        RigidBodyKind::Static,
    );
    add_box(
        &mut world,
        Vec3::new(0.0, 0.25, 0.0),
        Vec3::splat(0.3),
        RigidBodyKind::Dynamic,
    );

    for _ in 0..30 {
        world.step(1.0 / 60.0);
    }

    for contact in world.contacts() {
        let m = contact.manifold();
        let b1 = world.body(contact.body1()).unwrap();
        let b2 = world.body(contact.body2()).unwrap();
        for p in &m.points[..m.num_points] {
            let rebuilt1 = b1.transform().point_to_world(p.local_pos1);
            let rebuilt2 = b2.transform().point_to_world(p.local_pos2);
            assert!((rebuilt1 - p.pos1).length() < 1e-6);
            assert!((rebuilt2 - p.pos2).length() < 1e-6);
        }
    }
}

#[test]
fn normal_impulses_stay_nonnegative_and_friction_in_cone() {
    let mut world = World::default();
    add_box(
        &mut world,
        Vec3::new(0.0, -0.5, 0.0),
        Vec3::new(5.0, 0.5, 5.0),
        RigidBodyKind::Static,
    );
    let cube = world.add_body(&RigidBodyConfig {
        position: Vec3::new(0.0, 0.29, 0.0),
        linear_velocity: Vec3::new(3.0, 0.0, 0.0),
        auto_sleep: false,
        ..Default::default()
    });
    world.add_shape(
        cube,
        &ShapeConfig::with_geometry(Geometry::cuboid(Vec3::splat(0.3))),
    );

    for _ in 0..90 {
        world.step(1.0 / 60.0);
        for contact in world.contacts() {
            let m = contact.manifold();
            for p in &m.points[..m.num_points] {
                assert!(p.impulse.impulse_n >= 0.0);
                let lateral = p.impulse.impulse_l.length();
                // μ = √(0.2 · 0.2) = 0.2
                assert!(
                    lateral <= 0.2 * p.impulse.impulse_n + 1e-9,
                    "lateral {lateral} exceeds cone {}",
                    0.2 * p.impulse.impulse_n
                );
            }
        }
    }
    // friction eventually stops the slide
    let v = world.body(cube).unwrap().linear_velocity();
    assert!(v.x < 3.0);
}

#[test]
fn sphere_settles_on_box_through_closed_form_detector() {
    let mut world = World::default();
    add_box(
        &mut world,
        Vec3::new(0.0, -0.5, 0.0),
        Vec3::new(5.0, 0.5, 5.0),
        RigidBodyKind::Static,
    );
    let ball = world.add_body(&RigidBodyConfig {
        position: Vec3::new(0.0, 2.0, 0.0),
        ..Default::default()
    });
    world.add_shape(ball, &ShapeConfig::with_geometry(Geometry::sphere(0.5)));

    for _ in 0..240 {
        world.step(1.0 / 60.0);
    }

    let y = world.body(ball).unwrap().position().y;
    assert!((y - 0.5).abs() < 0.02, "ball rests at y = {y}");
}

#[test]
fn cone_settles_on_floor_through_gjk_detector() {
    let mut world = World::default();
    add_box(
        &mut world,
        Vec3::new(0.0, -0.5, 0.0),
        Vec3::new(5.0, 0.5, 5.0),
        RigidBodyKind::Static,
    );
    let cone = world.add_body(&RigidBodyConfig {
        position: Vec3::new(0.0, 1.5, 0.0),
        ..Default::default()
    });
    world.add_shape(
        cone,
        &ShapeConfig::with_geometry(Geometry::cone(0.5, 0.5)),
    );

    for _ in 0..300 {
        world.step(1.0 / 60.0);
    }

    let b = world.body(cone).unwrap();
    // the cone lands base-down and stays near the floor
    assert!(b.position().y < 0.6, "cone at {:?}", b.position());
    assert!(b.position().y > 0.3);
    assert!(b.linear_velocity().length() < 0.5);
}

#[test]
fn capsules_stack_against_each_other() {
    let mut world = World::default();
    add_box(
        &mut world,
        Vec3::new(0.0, -0.5, 0.0),
        Vec3::new(5.0, 0.5, 5.0),
        RigidBodyKind::Static,
    );
    let lying = world.add_body(&RigidBodyConfig {
        position: Vec3::new(0.0, 0.4, 0.0),
        rotation: Mat3::from_rotation_z(std::f64::consts::FRAC_PI_2),
        ..Default::default()
    });
    world.add_shape(
        lying,
        &ShapeConfig::with_geometry(Geometry::capsule(0.4, 0.6)),
    );

    for _ in 0..240 {
        world.step(1.0 / 60.0);
    }

    let b = world.body(lying).unwrap();
    assert!((b.position().y - 0.4).abs() < 0.05, "capsule at {:?}", b.position());
}

#[test]
fn collision_groups_filter_pairs() {
    let mut world = frozen_world(BroadPhaseKind::Bvh);
    let a = world.add_body(&RigidBodyConfig::default());
    world.add_shape(
        a,
        &ShapeConfig {
            geometry: Some(Geometry::sphere(1.0)),
            collision_group: 0b01,
            collision_mask: 0b01,
            ..Default::default()
        },
    );
    let b = world.add_body(&RigidBodyConfig {
        position: Vec3::new(0.5, 0.0, 0.0),
        ..Default::default()
    });
    world.add_shape(
        b,
        &ShapeConfig {
            geometry: Some(Geometry::sphere(1.0)),
            collision_group: 0b10,
            collision_mask: 0b10,
            ..Default::default()
        },
    );

    world.step(1.0 / 60.0);
    assert_eq!(world.num_contacts(), 0);
}

#[test]
fn joined_bodies_with_collision_disabled_do_not_collide() {
    let mut world = frozen_world(BroadPhaseKind::Bvh);
    let a = add_box(&mut world, Vec3::ZERO, Vec3::ONE, RigidBodyKind::Dynamic);
    let b = add_box(
        &mut world,
        Vec3::new(1.5, 0.0, 0.0),
        Vec3::ONE,
        RigidBodyKind::Dynamic,
    );
    world.add_joint(&JointConfig {
        body1: a,
        body2: b,
        local_anchor1: Vec3::new(0.75, 0.0, 0.0),
        local_anchor2: Vec3::new(-0.75, 0.0, 0.0),
        allow_collision: false,
        position_correction: PositionCorrection::Baumgarte,
    });

    world.step(1.0 / 60.0);
    assert_eq!(world.num_contacts(), 0);
}

#[test]
fn spherical_joint_holds_a_pendulum_together() {
    let mut world = World::default();
    let anchor = world.add_body(&RigidBodyConfig {
        position: Vec3::new(0.0, 4.0, 0.0),
        kind: RigidBodyKind::Static,
        ..Default::default()
    });
    world.add_shape(
        anchor,
        &ShapeConfig::with_geometry(Geometry::cuboid(Vec3::splat(0.1))),
    );
    let bob = world.add_body(&RigidBodyConfig {
        position: Vec3::new(1.0, 4.0, 0.0),
        auto_sleep: false,
        ..Default::default()
    });
    world.add_shape(bob, &ShapeConfig::with_geometry(Geometry::sphere(0.2)));

    world.add_joint(&JointConfig {
        body1: anchor,
        body2: bob,
        local_anchor1: Vec3::ZERO,
        local_anchor2: Vec3::new(-1.0, 0.0, 0.0),
        allow_collision: false,
        position_correction: PositionCorrection::Baumgarte,
    });

    for _ in 0..300 {
        world.step(1.0 / 60.0);
    }

    // the joint keeps the bob within arm's length of the pivot
    let bob_anchor = world.body(bob).unwrap().get_world_point(Vec3::new(-1.0, 0.0, 0.0));
    let distance = (bob_anchor - Vec3::new(0.0, 4.0, 0.0)).length();
    assert!(distance < 0.1, "pendulum drifted {distance}");
    // and the island solved both bodies together
    assert_eq!(world.num_islands(), 1);
}
