use oxiphys::*;

fn main() {
    let mut world = World::new(BroadPhaseKind::Bvh, Vec3::ZERO);

    for i in 0..8 {
        let body = world.add_body(&RigidBodyConfig {
            position: Vec3::new(i as Real * 3.0, 0.0, 0.0),
            kind: RigidBodyKind::Static,
            ..Default::default()
        });
        let geometry = if i % 2 == 0 {
            Geometry::sphere(0.7)
        } else {
            Geometry::cuboid(Vec3::splat(0.6))
        };
        world.add_shape(body, &ShapeConfig::with_geometry(geometry));
    }

    let begin = Vec3::new(-5.0, 0.1, 0.0);
    let end = Vec3::new(25.0, 0.1, 0.0);

    let mut hits = 0;
    world.ray_cast(begin, end, &mut |shape, hit| {
        hits += 1;
        println!(
            "hit shape {} at {:?} (fraction {:.3}, normal {:?})",
            shape.id(),
            hit.position,
            hit.fraction,
            hit.normal
        );
    });
    println!("{hits} shapes along the ray");

    match world.ray_cast_closest(begin, end) {
        Some((_, hit)) => println!("closest hit at fraction {:.3}", hit.fraction),
        None => println!("no hit"),
    }
}
