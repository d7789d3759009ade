//! Headless grass simulation on the CPU passes.
//!
//! Runs the full frame (physics, cull, indirect args, draw) without a device
//! and prints field statistics once per simulated second.
//!
//! Usage: cargo run --release --bin simulate -- --extent 40 --seconds 10 [--config grass.json] [--json]

use std::path::PathBuf;
use std::time::Instant;

use glam::{Mat4, Vec2, Vec3};
use serde::Serialize;

use verdant::core::camera::Camera;
use verdant::grass::{
    BladeAnchor, BladeSet, CameraView, ColliderSet, FrameInput, GrassConfig, GrassField, SphereCollider,
};
use verdant::render::BladeMesh;
use verdant::sim::CpuPasses;

const STEP: f32 = 1.0 / 60.0;

#[derive(Serialize)]
struct SecondStats {
    second: u32,
    blades: u32,
    visible: u32,
    mean_deflection: f32,
    max_penetration: f32,
    frame_ms: f64,
}

fn stats(passes: &CpuPasses, second: u32, frame_ms: f64) -> SecondStats {
    let blades = passes.blades();
    let deflection: f32 = blades
        .rest()
        .iter()
        .zip(blades.shape())
        .map(|(r, s)| (s.v2() - r.rest_tip()).length())
        .sum();
    let max_penetration = blades.force().iter().map(|f| f[3]).fold(0.0f32, f32::max);
    SecondStats {
        second,
        blades: blades.len() as u32,
        visible: passes.visible_count(),
        mean_deflection: deflection / blades.len().max(1) as f32,
        max_penetration,
        frame_ms,
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let flag = |name: &str| args.iter().position(|a| a == name).and_then(|i| args.get(i + 1));
    let extent: f32 = flag("--extent").and_then(|v| v.parse().ok()).unwrap_or(40.0);
    let seconds: u32 = flag("--seconds").and_then(|v| v.parse().ok()).unwrap_or(10);
    let json = args.iter().any(|a| a == "--json");

    let config = match flag("--config").map(PathBuf::from) {
        Some(path) => match GrassConfig::load_sync(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => GrassConfig::default(),
    };

    let anchors = BladeAnchor::grid(Vec2::splat(extent), config.blade.density);
    let blades = match BladeSet::new(&anchors, &config.blade) {
        Ok(blades) => blades,
        Err(e) => {
            log::error!("Invalid blade set: {e}");
            std::process::exit(1);
        }
    };
    let radius = (extent * 0.05).max(0.5);
    let colliders = ColliderSet::new(vec![SphereCollider::new(Vec3::ZERO, radius)]);
    let field = colliders.and_then(|c| GrassField::new(config, c, blades.len()));
    let mut field = match field {
        Ok(field) => field,
        Err(e) => {
            log::error!("Invalid grass setup: {e}");
            std::process::exit(1);
        }
    };

    log::info!("Simulating {} blades over {extent}m x {extent}m for {seconds}s", blades.len());
    let mut passes = CpuPasses::new(blades, 1, BladeMesh::default().index_count());

    let camera = Camera::look_at(Vec3::new(0.0, extent * 0.25, extent * 0.6), Vec3::ZERO, Vec3::Y);
    let frames_per_second = (1.0 / STEP).round() as u32;

    for second in 1..=seconds {
        let start = Instant::now();
        for _ in 0..frames_per_second {
            let t = field.time() + STEP;
            let orbit = extent * 0.2;
            let positions = [Vec3::new(t.cos() * orbit, radius * 0.5, t.sin() * orbit)];
            let input = FrameInput {
                delta_time: STEP,
                substeps: 1,
                camera: CameraView::from_camera(&camera),
                object_to_world: Mat4::IDENTITY,
                collider_positions: &positions,
            };
            if let Err(e) = field.frame(&mut passes, &input) {
                log::error!("Frame {} failed: {e}", field.frame_index());
                std::process::exit(1);
            }
        }
        let frame_ms = start.elapsed().as_secs_f64() * 1000.0 / frames_per_second as f64;
        let s = stats(&passes, second, frame_ms);

        if json {
            match serde_json::to_string(&s) {
                Ok(line) => println!("{line}"),
                Err(e) => log::error!("Failed to encode stats: {e}"),
            }
        } else {
            println!(
                "t={:>3}s  visible {:>8}/{:<8}  deflection {:.4}m  penetration {:.4}m  {:.2} ms/frame",
                s.second, s.visible, s.blades, s.mean_deflection, s.max_penetration, s.frame_ms
            );
        }
    }
}
