//! Verdant - interactive grass viewer

use std::path::PathBuf;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use glam::{Mat4, Vec2, Vec3};
use verdant::core::{
    camera::Camera,
    logging,
    time::{FixedStep, FrameTimer},
};
use verdant::grass::{
    BladeAnchor, BladeSet, CameraView, ColliderSet, FrameInput, GrassConfig, GrassField, SphereCollider,
};
use verdant::render::{create_depth_view, BladeMesh, GpuContext, GrassRenderer, RenderTarget};

const SKY: wgpu::Color = wgpu::Color { r: 0.45, g: 0.62, b: 0.85, a: 1.0 };
const PHYSICS_STEP: f32 = 1.0 / 120.0;

/// Window and GPU state, created on resume
struct ViewerState {
    window: Arc<Window>,
    gpu: GpuContext,
    depth: wgpu::TextureView,
    renderer: GrassRenderer,
}

struct App {
    config: GrassConfig,
    extent: f32,
    state: Option<ViewerState>,
    field: Option<GrassField>,
    camera: Camera,
    timer: FrameTimer,
    physics_clock: FixedStep,
    orbit_angle: f32,
    paused: bool,
}

impl App {
    fn new(config: GrassConfig, extent: f32) -> Self {
        let eye = Vec3::new(0.0, extent * 0.25, extent * 0.6);
        Self {
            config,
            extent,
            state: None,
            field: None,
            camera: Camera::look_at(eye, Vec3::ZERO, Vec3::Y),
            timer: FrameTimer::new(),
            physics_clock: FixedStep::new(PHYSICS_STEP, 8),
            orbit_angle: 0.0,
            paused: false,
        }
    }

    fn update_camera(&mut self, dt: f32) {
        if !self.paused {
            self.orbit_angle += dt * 0.1;
        }
        let radius = self.extent * 0.6;
        let eye = Vec3::new(self.orbit_angle.sin() * radius, self.extent * 0.25, self.orbit_angle.cos() * radius);
        self.camera.position = eye;
        self.camera.point_at(Vec3::ZERO, Vec3::Y);
    }

    fn render(&mut self) {
        let dt = self.timer.delta_secs();
        self.update_camera(dt);

        // Every released step runs at the fixed length; none released means no physics
        let steps = if self.paused { 0 } else { self.physics_clock.advance(dt) };
        let step = if steps > 0 { self.physics_clock.step() } else { 0.0 };

        let (Some(state), Some(field)) = (&mut self.state, &mut self.field) else {
            return;
        };
        let positions = collider_positions(self.extent, field.time() + step * steps as f32);

        let output = match state.gpu.get_current_texture() {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Skipping frame: {e}");
                let (w, h) = state.gpu.size();
                state.gpu.resize(w, h);
                return;
            }
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = state.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });

        let input = FrameInput {
            delta_time: step,
            substeps: steps,
            camera: CameraView::from_camera(&self.camera),
            object_to_world: Mat4::IDENTITY,
            collider_positions: &positions,
        };
        let target = RenderTarget { color: &view, depth: &state.depth, clear_color: Some(SKY) };
        let result = {
            let mut frame = state.renderer.begin_frame(&state.gpu.queue, &mut encoder, target);
            field.frame(&mut frame, &input)
        };
        if let Err(e) = result {
            log::error!("Grass frame failed: {e}");
        }

        state.gpu.queue.submit(std::iter::once(encoder.finish()));
        state.renderer.after_submit(&state.gpu.device);
        output.present();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title("Verdant")
            .with_inner_size(PhysicalSize::new(1280, 720));
        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        let gpu = match pollster::block_on(GpuContext::new(window.clone())) {
            Ok(gpu) => gpu,
            Err(e) => {
                log::error!("Failed to create GPU context: {e}");
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        self.camera.set_aspect(size.width as f32, size.height as f32);
        log::info!("Window created: {}x{}", size.width, size.height);
        log::info!("GPU: {}", gpu.adapter.get_info().name);

        let anchors = BladeAnchor::grid(Vec2::splat(self.extent), self.config.blade.density);
        let setup = BladeSet::new(&anchors, &self.config.blade).and_then(|blades| {
            // Bent tips stay within one blade height of the rest pose
            if let Some(bounds) = blades.bounds().map(|b| b.inflated(self.config.blade.height)) {
                log::info!("Grass bounds: {:?} .. {:?}", bounds.min, bounds.max);
            }
            let initial = collider_positions(self.extent, 0.0);
            let colliders = ColliderSet::new(initial.iter().map(|&p| SphereCollider::new(p, 0.75)).collect())?;
            let mesh = BladeMesh::default();
            let renderer = GrassRenderer::new(
                &gpu.device,
                &gpu.queue,
                &blades,
                colliders.len(),
                &mesh,
                gpu.format(),
                &self.config.diagnostics,
            )?;
            let field = GrassField::new(self.config.clone(), colliders, blades.len())?;
            Ok((renderer, field))
        });
        let (renderer, field) = match setup {
            Ok(parts) => parts,
            Err(e) => {
                log::error!("Failed to set up grass: {e}");
                event_loop.exit();
                return;
            }
        };
        log::info!("Grass field: {} blades over {}m x {}m", field.blade_count(), self.extent, self.extent);

        let depth = create_depth_view(&gpu.device, size.width, size.height);
        self.field = Some(field);
        self.state = Some(ViewerState { window, gpu, depth, renderer });
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(state) = &mut self.state {
                    state.renderer.shutdown();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    if let Some(state) = &mut self.state {
                        state.gpu.resize(size.width, size.height);
                        state.depth = create_depth_view(&state.gpu.device, size.width, size.height);
                        self.camera.set_aspect(size.width as f32, size.height as f32);
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() {
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::Escape) => {
                            if let Some(state) = &mut self.state {
                                state.renderer.shutdown();
                            }
                            event_loop.exit();
                        }
                        PhysicalKey::Code(KeyCode::Space) => {
                            self.paused = !self.paused;
                            log::info!("Simulation {}", if self.paused { "paused" } else { "resumed" });
                        }
                        _ => {}
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                self.timer.tick();
                self.render();

                if let Some(state) = &self.state {
                    let visible = state
                        .renderer
                        .latest_visible_count()
                        .map(|c| format!(" | {c} visible"))
                        .unwrap_or_default();
                    state
                        .window
                        .set_title(&format!("Verdant - {:.1} FPS{visible} | Space=pause", self.timer.fps()));
                    state.window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

fn main() {
    logging::init();
    log::info!("Verdant starting...");

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_path_arg(&args, "--config", "-c") {
        Some(path) => match GrassConfig::load_sync(&path) {
            Ok(config) => {
                log::info!("Loaded grass config from {}", path.display());
                config
            }
            Err(e) => {
                log::error!("Failed to load {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => GrassConfig::default(),
    };
    let extent = parse_extent_arg(&args).unwrap_or(40.0);

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {e}");
            std::process::exit(1);
        }
    };
    let mut app = App::new(config, extent);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {e}");
    }
}

/// Two spheres sweeping through the field on opposite orbits
fn collider_positions(extent: f32, time: f32) -> [Vec3; 2] {
    let r = extent * 0.25;
    [
        Vec3::new(time.cos() * r, 0.4, time.sin() * r),
        Vec3::new(-(time * 0.7).cos() * r * 0.5, 0.6, (time * 0.7).sin() * r * 0.5),
    ]
}

/// Parse a path-valued flag from the command line
fn parse_path_arg(args: &[String], long: &str, short: &str) -> Option<PathBuf> {
    let i = args.iter().position(|a| a == long || a == short)?;
    args.get(i + 1).map(PathBuf::from)
}

/// Parse --extent (field side length in meters)
fn parse_extent_arg(args: &[String]) -> Option<f32> {
    let i = args.iter().position(|a| a == "--extent" || a == "-e")?;
    args.get(i + 1)?.parse().ok().filter(|e: &f32| *e > 0.0)
}
