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
        &ShapeConfig::with_geometry(Geometry::cuboid(Vec3::new(7.0, 0.5, 7.0))),
    );

    let mut cubes = Vec::new();
    for layer in 0..5 {
        cubes.push({
            let body = world.add_body(&RigidBodyConfig {
                position: Vec3::new(0.0, 0.3 + layer as Real * 0.62, 0.0),
                ..Default::default()
            });
            world.add_shape(
                body,
                &ShapeConfig::with_geometry(Geometry::cuboid(Vec3::splat(0.3))),
            );
            body
        });
    }

    for _ in 0..240 {
        world.step(1.0 / 60.0);
    }

    let asleep = cubes
        .iter()
        .filter(|id| world.body(**id).unwrap().sleeping())
        .count();
    println!(
        "simulated a 5-cube tower for 4 seconds: {asleep}/{} cubes sleeping, {} contacts",
        cubes.len(),
        world.num_contacts()
    );
    for (i, id) in cubes.iter().enumerate() {
        println!("cube {i}: {:?}", world.body(*id).unwrap().position());
    }
}
