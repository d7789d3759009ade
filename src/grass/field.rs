//! Per-frame sequencing of the grass passes.

use glam::{Mat4, Vec3};

use crate::core::{Error, Result};
use crate::grass::collider::ColliderSet;
use crate::grass::config::GrassConfig;
use crate::grass::params::{workgroup_count, CameraView, CullParams, SimParams};
use crate::grass::passes::GrassPasses;

/// Why a frame issued no work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The field has zero blades.
    NoBlades,
    /// The backend's buffers do not exist yet.
    NotReady,
}

/// Per-frame inputs from the host.
#[derive(Clone, Copy, Debug)]
pub struct FrameInput<'a> {
    /// Length of one physics step in seconds.
    pub delta_time: f32,
    /// Physics steps of `delta_time` to run this frame. Zero counts as one.
    pub substeps: u32,
    pub camera: CameraView,
    pub object_to_world: Mat4,
    /// Live world-space collider centers, one per collider.
    pub collider_positions: &'a [Vec3],
}

/// What one call to [`GrassField::frame`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Compute dispatches issued (one physics per substep, cull, indirect args).
    pub dispatches: u32,
    /// Indirect draws issued.
    pub draws: u32,
    pub skipped: Option<SkipReason>,
    /// Physics ran with a zero time step and left every shape unchanged.
    pub physics_noop: bool,
}

/// One grass object: configuration, colliders and simulated time.
///
/// The blade count is fixed at creation. Buffers live in the backend.
pub struct GrassField {
    config: GrassConfig,
    colliders: ColliderSet,
    blade_count: u32,
    time: f32,
    frame_index: u64,
}

impl GrassField {
    pub fn new(config: GrassConfig, colliders: ColliderSet, blade_count: usize) -> Result<Self> {
        config.validate()?;
        let blade_count = u32::try_from(blade_count)
            .map_err(|_| Error::Config(format!("{blade_count} blades exceed the u32 index range")))?;
        Ok(Self {
            config,
            colliders,
            blade_count,
            time: 0.0,
            frame_index: 0,
        })
    }

    pub fn config(&self) -> &GrassConfig {
        &self.config
    }

    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    pub fn blade_count(&self) -> u32 {
        self.blade_count
    }

    /// Simulated seconds so far
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Run one frame: colliders, physics, cull, indirect args, draw.
    pub fn frame<P: GrassPasses>(&mut self, passes: &mut P, input: &FrameInput) -> Result<FrameReport> {
        self.colliders.refresh(input.collider_positions)?;

        if self.blade_count == 0 {
            log::debug!("grass frame {}: no blades, skipping", self.frame_index);
            self.frame_index += 1;
            return Ok(FrameReport { skipped: Some(SkipReason::NoBlades), ..Default::default() });
        }
        if !passes.is_ready() {
            log::debug!("grass frame {}: buffers not ready, skipping", self.frame_index);
            return Ok(FrameReport { skipped: Some(SkipReason::NotReady), ..Default::default() });
        }

        let det = input.object_to_world.determinant();
        if !(det.is_finite() && det != 0.0) {
            return Err(Error::Config("grass object transform is not invertible".into()));
        }
        let world_to_object = input.object_to_world.inverse();

        let dt = if input.delta_time.is_finite() && input.delta_time > 0.0 {
            input.delta_time
        } else {
            0.0
        };
        // A zero step is dispatched once as an identity pass
        let substeps = if dt == 0.0 { 1 } else { input.substeps.max(1) };
        self.time += dt * substeps as f32;

        let workgroups = workgroup_count(self.blade_count);
        let mut report = FrameReport { physics_noop: dt == 0.0, ..Default::default() };
        if report.physics_noop {
            log::debug!("grass frame {}: zero delta time, physics is a no-op", self.frame_index);
        }

        passes.upload_colliders(&self.colliders.to_object_space(&world_to_object))?;
        passes.upload_sim_params(&SimParams::new(
            &self.config,
            &world_to_object,
            self.time,
            dt,
            self.blade_count,
            self.colliders.len() as u32,
        ));
        // Parameters are uploaded once; every substep reuses the same step length
        for _ in 0..substeps {
            passes.dispatch_physics(workgroups);
            report.dispatches += 1;
        }

        passes.upload_cull_params(&CullParams::new(
            &self.config,
            &input.camera,
            &input.object_to_world,
            self.blade_count,
        ));
        passes.dispatch_cull(workgroups);
        report.dispatches += 1;

        passes.dispatch_indirect_args();
        report.dispatches += 1;

        passes.draw_indirect();
        report.draws += 1;

        self.frame_index += 1;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::camera::Camera;
    use crate::core::time::FixedStep;
    use crate::grass::blade::{BladeAnchor, BladeSet};
    use crate::grass::collider::{ColliderRecord, SphereCollider};
    use crate::sim::CpuPasses;
    use glam::Vec2;
    use std::collections::HashSet;

    #[derive(Debug, PartialEq)]
    enum Call {
        Colliders(usize),
        SimParams(f32),
        Physics(u32),
        CullParams,
        Cull(u32),
        IndirectArgs,
        Draw,
    }

    #[derive(Default)]
    struct Recorder {
        not_ready: bool,
        calls: Vec<Call>,
    }

    impl GrassPasses for Recorder {
        fn is_ready(&self) -> bool {
            !self.not_ready
        }
        fn upload_colliders(&mut self, colliders: &[ColliderRecord]) -> Result<()> {
            self.calls.push(Call::Colliders(colliders.len()));
            Ok(())
        }
        fn upload_sim_params(&mut self, params: &SimParams) {
            self.calls.push(Call::SimParams(params.delta_time));
        }
        fn dispatch_physics(&mut self, workgroups: u32) {
            self.calls.push(Call::Physics(workgroups));
        }
        fn upload_cull_params(&mut self, _params: &CullParams) {
            self.calls.push(Call::CullParams);
        }
        fn dispatch_cull(&mut self, workgroups: u32) {
            self.calls.push(Call::Cull(workgroups));
        }
        fn dispatch_indirect_args(&mut self) {
            self.calls.push(Call::IndirectArgs);
        }
        fn draw_indirect(&mut self) {
            self.calls.push(Call::Draw);
        }
    }

    fn camera_view() -> CameraView {
        CameraView::from_camera(&Camera::look_at(Vec3::new(0.0, 3.0, 10.0), Vec3::ZERO, Vec3::Y))
    }

    fn input(dt: f32, positions: &[Vec3]) -> FrameInput<'_> {
        FrameInput {
            delta_time: dt,
            substeps: 1,
            camera: camera_view(),
            object_to_world: Mat4::IDENTITY,
            collider_positions: positions,
        }
    }

    fn one_collider() -> ColliderSet {
        ColliderSet::new(vec![SphereCollider::new(Vec3::ZERO, 0.5)]).unwrap()
    }

    #[test]
    fn test_passes_run_in_order() {
        let mut field = GrassField::new(GrassConfig::default(), one_collider(), 20).unwrap();
        let mut rec = Recorder::default();
        let report = field.frame(&mut rec, &input(0.016, &[Vec3::X])).unwrap();

        assert_eq!(rec.calls, vec![
            Call::Colliders(1),
            Call::SimParams(0.016),
            Call::Physics(3),
            Call::CullParams,
            Call::Cull(3),
            Call::IndirectArgs,
            Call::Draw,
        ]);
        assert_eq!(report, FrameReport { dispatches: 3, draws: 1, skipped: None, physics_noop: false });
        assert_eq!(field.colliders().colliders()[0].center, Vec3::X);
        assert_eq!(field.frame_index(), 1);
    }

    #[test]
    fn test_substeps_dispatch_physics_repeatedly() {
        let mut field = GrassField::new(GrassConfig::default(), one_collider(), 20).unwrap();
        let mut rec = Recorder::default();
        let frame = FrameInput { substeps: 3, ..input(0.01, &[Vec3::X]) };
        let report = field.frame(&mut rec, &frame).unwrap();

        assert_eq!(rec.calls, vec![
            Call::Colliders(1),
            Call::SimParams(0.01),
            Call::Physics(3),
            Call::Physics(3),
            Call::Physics(3),
            Call::CullParams,
            Call::Cull(3),
            Call::IndirectArgs,
            Call::Draw,
        ]);
        assert_eq!(report.dispatches, 5);
        assert!((field.time() - 0.03).abs() < 1e-6);

        // Zero substeps still steps once; a zero step ignores the count
        let mut rec = Recorder::default();
        field.frame(&mut rec, &FrameInput { substeps: 0, ..input(0.01, &[Vec3::X]) }).unwrap();
        assert_eq!(rec.calls.iter().filter(|c| matches!(c, Call::Physics(_))).count(), 1);
        let mut rec = Recorder::default();
        let report = field.frame(&mut rec, &FrameInput { substeps: 4, ..input(0.0, &[Vec3::X]) }).unwrap();
        assert_eq!(report.dispatches, 3);
        assert!(report.physics_noop);
    }

    #[test]
    fn test_substeps_match_separate_frames() {
        let cfg = GrassConfig::default();
        let blades = BladeSet::new(&BladeAnchor::grid(Vec2::splat(4.0), 2.0), &cfg.blade).unwrap();
        let collider = [Vec3::new(0.3, 0.4, 0.0)];
        let step = 1.0 / 120.0;

        let mut split = CpuPasses::new(blades.clone(), 1, 39);
        let mut split_field = GrassField::new(cfg.clone(), one_collider(), blades.len()).unwrap();
        let mut merged = CpuPasses::new(blades.clone(), 1, 39);
        let mut merged_field = GrassField::new(cfg, one_collider(), blades.len()).unwrap();

        for _ in 0..6 {
            split_field.frame(&mut split, &input(step, &collider)).unwrap();
        }
        for _ in 0..3 {
            merged_field.frame(&mut merged, &FrameInput { substeps: 2, ..input(step, &collider) }).unwrap();
        }

        assert_eq!(split.blades().shape(), merged.blades().shape());
        assert_eq!(split.blades().force(), merged.blades().force());
        assert!((split_field.time() - merged_field.time()).abs() < 1e-6);
    }

    #[test]
    fn test_zero_blades_dispatch_nothing() {
        let mut field = GrassField::new(GrassConfig::default(), ColliderSet::default(), 0).unwrap();
        let mut rec = Recorder::default();
        let report = field.frame(&mut rec, &input(0.016, &[])).unwrap();
        assert!(rec.calls.is_empty());
        assert_eq!(report.dispatches, 0);
        assert_eq!(report.draws, 0);
        assert_eq!(report.skipped, Some(SkipReason::NoBlades));

        // Also holds for the CPU backend
        let blades = BladeSet::new(&[], &GrassConfig::default().blade).unwrap();
        let mut cpu = CpuPasses::new(blades, 0, 39);
        let report = field.frame(&mut cpu, &input(0.016, &[])).unwrap();
        assert_eq!(report.dispatches, 0);
        assert_eq!(cpu.args().instance_count, 0);
    }

    #[test]
    fn test_not_ready_skips() {
        let mut field = GrassField::new(GrassConfig::default(), ColliderSet::default(), 8).unwrap();
        let mut rec = Recorder { not_ready: true, ..Default::default() };
        let report = field.frame(&mut rec, &input(0.016, &[])).unwrap();
        assert!(rec.calls.is_empty());
        assert_eq!(report.skipped, Some(SkipReason::NotReady));
        assert_eq!(field.time(), 0.0);
    }

    #[test]
    fn test_bad_delta_time_is_noop_physics() {
        let mut field = GrassField::new(GrassConfig::default(), ColliderSet::default(), 8).unwrap();
        for dt in [0.0, -0.5, f32::NAN, f32::INFINITY] {
            let mut rec = Recorder::default();
            let report = field.frame(&mut rec, &input(dt, &[])).unwrap();
            assert!(report.physics_noop);
            assert_eq!(report.dispatches, 3);
            assert_eq!(rec.calls[1], Call::SimParams(0.0));
        }
        assert_eq!(field.time(), 0.0);
    }

    #[test]
    fn test_collider_count_mismatch_is_error() {
        let mut field = GrassField::new(GrassConfig::default(), one_collider(), 8).unwrap();
        let mut rec = Recorder::default();
        let err = field.frame(&mut rec, &input(0.016, &[])).unwrap_err();
        assert!(matches!(err, Error::BufferSize { .. }));
        assert!(rec.calls.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = GrassConfig::default();
        cfg.physics.mass = 0.0;
        assert!(matches!(GrassField::new(cfg, ColliderSet::default(), 8), Err(Error::Config(_))));
    }

    #[test]
    fn test_singular_transform_rejected() {
        let mut field = GrassField::new(GrassConfig::default(), ColliderSet::default(), 8).unwrap();
        let mut rec = Recorder::default();
        let mut frame = input(0.016, &[]);
        frame.object_to_world = Mat4::ZERO;
        assert!(field.frame(&mut rec, &frame).is_err());
        assert!(rec.calls.is_empty());
    }

    #[test]
    fn test_cpu_frame_draws_exactly_visible_blades() {
        let cfg = GrassConfig::default();
        let anchors = BladeAnchor::grid(Vec2::splat(30.0), 1.0);
        let blades = BladeSet::new(&anchors, &cfg.blade).unwrap();
        let mut field = GrassField::new(cfg, one_collider(), blades.len()).unwrap();
        let mut cpu = CpuPasses::new(blades, 1, 39);

        let mut step = FixedStep::new(1.0 / 60.0, 4);
        for _ in 0..10 {
            for _ in 0..step.advance(1.0 / 60.0) {
                field.frame(&mut cpu, &input(step.step(), &[Vec3::new(0.0, 0.2, 0.0)])).unwrap();
            }
        }
        assert!(field.time() > 0.1);

        let count = cpu.visible_count();
        assert!(count > 0 && (count as usize) < cpu.blades().len());
        assert_eq!(cpu.args().instance_count, count);
        assert_eq!(cpu.args().index_count, 39);

        let visible: HashSet<u32> = cpu.visible_indices().into_iter().collect();
        assert_eq!(visible.len(), count as usize);
        let drawn: HashSet<u32> = cpu.drawn().iter().copied().collect();
        assert_eq!(drawn, visible);
        assert_eq!(cpu.drawn().len(), count as usize);
    }
}
