//! Headless model builder: constructs a demo shape, optionally runs LOD
//! passes from a fixed camera, and exports the result.
//!
//! Usage: cargo run --release --bin build_shape -- [OPTIONS]
//!
//! Options:
//!   --shape <NAME>       sphere | bracket | drilled (default: bracket)
//!   --size <MM>          Edge length of the cubic build region (default: 10)
//!   --depth <N>          Construction depth (default: lod.base_depth)
//!   --config <PATH>      Engine config JSON
//!   --lod <N>            LOD passes to run after construction (default: 0)
//!   --distance <MM>      Camera distance from the model center for LOD (default: frame the region)
//!   --archive <PATH>     Write an archive of the final tree
//!   --levels <N>         Levels per archive file (default: config value)
//!   --stl <PATH>         Write a binary STL of the final mesh

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{DVec3, Vec3};

use solidtree::core::camera::Camera;
use solidtree::core::config::EngineConfig;
use solidtree::core::context::{AppContext, ErrorMarker, HostBindings};
use solidtree::core::logging;
use solidtree::lod::{LodController, LodPass};
use solidtree::math::Aabb;
use solidtree::shape::Shape;
use solidtree::task::{ExportRequest, TaskEvent, TaskScheduler};

/// Prints status and errors to the terminal
struct ConsoleHost;

impl HostBindings for ConsoleHost {
    fn set_status(&self, text: &str) {
        println!("[status] {}", text);
    }

    fn mark_error(&self, marker: ErrorMarker) {
        match marker.region {
            Some(region) => eprintln!("[error] {} (at {})", marker.message, region),
            None => eprintln!("[error] {}", marker.message),
        }
    }

    fn clear_error(&self) {}

    fn is_view_visible(&self) -> bool {
        true
    }
}

fn demo_shape(name: &str, size: f64) -> Option<Shape> {
    let c = DVec3::splat(size * 0.5);
    let shape = match name {
        "sphere" => Shape::sphere(c, size * 0.3),
        "bracket" => {
            let plate = Shape::cuboid(DVec3::splat(size * 0.15), DVec3::new(size * 0.85, size * 0.85, size * 0.35));
            let boss = Shape::cylinder(DVec3::new(c.x, c.y, size * 0.5), size * 0.2, size * 0.6);
            let hole = Shape::cylinder(DVec3::new(c.x, c.y, size * 0.5), size * 0.1, size);
            plate.union(boss).subtract(hole)
        }
        "drilled" => {
            let block = Shape::cuboid(DVec3::splat(size * 0.2), DVec3::splat(size * 0.8));
            let ball = Shape::sphere(c, size * 0.38);
            block.intersect(ball).subtract(Shape::cylinder(c, size * 0.12, size))
        }
        _ => return None,
    };
    Some(shape)
}

/// Reap until every task has finished
fn drain(scheduler: &mut TaskScheduler) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    loop {
        events.extend(scheduler.reap());
        if scheduler.is_idle() {
            return events;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn main() {
    logging::init_with_timestamps();

    let args: Vec<String> = std::env::args().collect();
    let shape_name = parse_str_arg(&args, "--shape").unwrap_or_else(|| "bracket".to_string());
    let size = parse_f64_arg(&args, "--size").unwrap_or(10.0);
    let lod_passes = parse_usize_arg(&args, "--lod").unwrap_or(0);
    let archive = parse_str_arg(&args, "--archive").map(PathBuf::from);
    let stl = parse_str_arg(&args, "--stl").map(PathBuf::from);

    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => match EngineConfig::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(2);
            }
        },
        None => EngineConfig::default(),
    };
    if let Some(levels) = parse_u8_arg(&args, "--levels") {
        config.archive.levels_per_file = Some(levels);
    }
    let depth = parse_u8_arg(&args, "--depth").unwrap_or(config.lod.base_depth);
    let distance = parse_f64_arg(&args, "--distance");

    let Some(shape) = demo_shape(&shape_name, size) else {
        eprintln!("Unknown shape '{}' (expected sphere, bracket or drilled)", shape_name);
        std::process::exit(2);
    };

    println!("=== Solidtree Shape Builder ===");
    println!("Shape:  {} ({} expression nodes)", shape_name, shape.node_count());
    println!("Region: {} mm cube", size);
    println!("Depth:  {}", depth);
    println!();

    let ctx = AppContext::new(config, Arc::new(ConsoleHost));
    let mut scheduler = match TaskScheduler::new(&ctx) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to start scheduler: {}", e);
            std::process::exit(1);
        }
    };

    let start = Instant::now();
    let region = Aabb::cube(size);
    if let Err(e) = scheduler.submit_construct(shape.into_handle(), region, depth) {
        eprintln!("Failed to submit construct: {}", e);
        std::process::exit(1);
    }
    let failed = drain(&mut scheduler)
        .iter()
        .any(|e| matches!(e, TaskEvent::Failed { .. }));
    if failed {
        std::process::exit(1);
    }
    println!("Construct finished in {:.2}s", start.elapsed().as_secs_f64());

    if lod_passes > 0 {
        let mut camera = Camera::framing(&region, Vec3::new(-0.3, -0.4, -1.0));
        if let Some(distance) = distance {
            let center = region.center().as_vec3();
            camera = Camera::look_at(center - camera.forward() * distance as f32, center, Vec3::Y);
        }
        let mut lod = LodController::new(&ctx);
        lod.set_camera(camera);

        for pass in 0..lod_passes {
            match scheduler.run_lod_pass(&mut lod) {
                Ok(LodPass::Complete) => {
                    println!("LOD complete after {} passes", pass);
                    break;
                }
                Ok(_) => {
                    drain(&mut scheduler);
                }
                Err(e) => {
                    eprintln!("LOD pass failed: {}", e);
                    break;
                }
            }
        }
    }

    let Some(snapshot) = scheduler.snapshot() else {
        eprintln!("No model was produced");
        std::process::exit(1);
    };
    println!(
        "Model: generation {}, {} nodes, {} leaves, max depth {}, {} triangles",
        snapshot.generation,
        snapshot.tree.node_count(),
        snapshot.tree.leaf_count(),
        snapshot.tree.max_depth(),
        snapshot.mesh.triangle_count()
    );

    if archive.is_some() || stl.is_some() {
        let request = ExportRequest { archive, stl };
        if let Err(e) = scheduler.submit_export(request) {
            eprintln!("Failed to submit export: {}", e);
            std::process::exit(1);
        }
        let failed = drain(&mut scheduler)
            .iter()
            .any(|e| matches!(e, TaskEvent::Failed { .. }));
        if failed {
            std::process::exit(1);
        }
    }

    scheduler.shutdown();
    println!("Done in {:.2}s", start.elapsed().as_secs_f64());
}

fn parse_f64_arg(args: &[String], flag: &str) -> Option<f64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u8_arg(args: &[String], flag: &str) -> Option<u8> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
