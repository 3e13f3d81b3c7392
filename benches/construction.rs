use criterion::{criterion_group, criterion_main, Criterion, black_box};

use glam::{DVec3, Vec3};

use solidtree::core::camera::Camera;
use solidtree::core::config::ConstructionConfig;
use solidtree::lod::{ImportanceSample, SoftwareIdRenderer};
use solidtree::math::Aabb;
use solidtree::mesh::MeshBuilder;
use solidtree::octree::{CancelToken, ConstructionEngine, OctreeNode};
use solidtree::shape::{Shape, ShapeHandle};

fn sphere() -> ShapeHandle {
    Shape::sphere(DVec3::splat(5.0), 3.0).into_handle()
}

fn drilled() -> ShapeHandle {
    Shape::cuboid(DVec3::splat(2.0), DVec3::splat(8.0))
        .intersect(Shape::sphere(DVec3::splat(5.0), 3.8))
        .subtract(Shape::cylinder(DVec3::splat(5.0), 1.2, 10.0))
        .into_handle()
}

fn meshed(engine: &ConstructionEngine, shape: &ShapeHandle, depth: u8) -> OctreeNode {
    let mut tree = engine
        .build(shape, Aabb::cube(10.0), depth, &CancelToken::new())
        .unwrap()
        .unwrap();
    MeshBuilder::default().mesh_tree(&mut tree);
    tree
}

fn bench_build_sphere(c: &mut Criterion) {
    solidtree::core::logging::init_with_timestamps();
    let engine = ConstructionEngine::with_config(ConstructionConfig::default()).unwrap();
    let shape = sphere();

    for depth in [5u8, 7] {
        c.bench_function(&format!("build_sphere_depth_{}", depth), |b| {
            b.iter(|| engine.build(&shape, Aabb::cube(10.0), black_box(depth), &CancelToken::new()));
        });
    }
}

fn bench_build_csg(c: &mut Criterion) {
    let engine = ConstructionEngine::with_config(ConstructionConfig::default()).unwrap();
    let shape = drilled();

    c.bench_function("build_drilled_depth_6", |b| {
        b.iter(|| engine.build(&shape, Aabb::cube(10.0), black_box(6), &CancelToken::new()));
    });
}

fn bench_mesh_and_merge(c: &mut Criterion) {
    let engine = ConstructionEngine::with_config(ConstructionConfig::default()).unwrap();
    let tree = engine
        .build(&sphere(), Aabb::cube(10.0), 6, &CancelToken::new())
        .unwrap()
        .unwrap();
    let builder = MeshBuilder::default();

    c.bench_function("mesh_sphere_depth_6", |b| {
        b.iter(|| {
            let mut tree = tree.clone();
            builder.mesh_tree(&mut tree)
        });
    });

    let meshed = meshed(&engine, &sphere(), 6);
    c.bench_function("merge_sphere_depth_6", |b| {
        b.iter(|| builder.merge_tree(black_box(&meshed), 1));
    });
}

fn bench_importance_sample(c: &mut Criterion) {
    let engine = ConstructionEngine::with_config(ConstructionConfig::default()).unwrap();
    let tree = meshed(&engine, &sphere(), 5);
    let mut camera = Camera::look_at(Vec3::new(5.0, 8.0, 20.0), Vec3::splat(5.0), Vec3::Y);
    camera.set_aspect(256.0, 192.0);

    c.bench_function("importance_sample_256x192", |b| {
        b.iter(|| ImportanceSample::capture(&SoftwareIdRenderer, &camera, black_box(&tree), 1, (256, 192)));
    });
}

criterion_group!(
    benches,
    bench_build_sphere,
    bench_build_csg,
    bench_mesh_and_merge,
    bench_importance_sample,
);
criterion_main!(benches);
