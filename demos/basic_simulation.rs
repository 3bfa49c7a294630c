use oxiphys::*;

fn main() {
    let mut world = World::default();

    let floor = world.add_body(&RigidBodyConfig {
        position: Vec3::new(0.0, -0.5, 0.0),
        kind: RigidBodyKind::Static,
        ..Default::default()
    });
    world.add_shape(
        floor,
        &ShapeConfig::with_geometry(Geometry::cuboid(Vec3::new(10.0, 0.5, 10.0))),
    );

    let ball = world.add_body(&RigidBodyConfig {
        position: Vec3::new(0.0, 5.0, 0.0),
        ..Default::default()
    });
    world.add_shape(ball, &ShapeConfig::with_geometry(Geometry::sphere(0.5)));

    for step in 0..300 {
        world.step(1.0 / 60.0);
        if step % 30 == 0 {
            let b = world.body(ball).unwrap();
            println!(
                "t = {:>4.2}s  y = {:>6.3}  vy = {:>6.3}",
                step as Real / 60.0,
                b.position().y,
                b.linear_velocity().y
            );
        }
    }
    println!(
        "ball settled at y = {:.3}",
        world.body(ball).unwrap().position().y
    );
}
