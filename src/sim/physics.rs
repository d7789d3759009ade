//! Blade physics step (host reference for grass_physics.wgsl).
//!
//! Every quantity is in the grass object's local space. One call advances one
//! blade by `params.delta_time`; blades never read each other's state.

use glam::Vec3;
use rayon::prelude::*;

use crate::grass::blade::{GpuBladeRest, GpuBladeShape};
use crate::grass::collider::ColliderRecord;
use crate::grass::params::{SimParams, WORKGROUP_SIZE};

/// Below this distance a tip counts as sitting on the collider center.
const CENTER_EPSILON: f32 = 1e-6;

/// Upper bound on surface projection sweeps. Pushing out of one sphere can land
/// the tip inside an overlapping one, so sweeps repeat until none is penetrated.
pub const PROJECTION_PASSES: u32 = 4;

/// Re-derive V1 and rescale V1/V2 so the blade keeps length `height`.
///
/// V1 rises toward the anchor's up axis as the tip bends over and never drops
/// below 5% of the height above ground. V1 also never sits above the tip's own
/// height, so a tip pushed straight down its axis is stretched back out instead
/// of folding the curve onto itself.
pub fn correct_length(v0: Vec3, v2: Vec3, up: Vec3, height: f32) -> (Vec3, Vec3) {
    let offset = v2 - v0;
    let along = offset.dot(up);
    let projected = (offset - up * along).length();
    let ratio = projected / height;
    let lift = (height * (1.0 - ratio).max(0.05 * ratio.max(1.0))).min(along.max(0.05 * height));
    let v1 = v0 + up * lift;

    // Approximate Bezier length for a degree-2 curve
    let l0 = offset.length();
    let l1 = (v1 - v0).length() + (v2 - v1).length();
    let length = (2.0 * l0 + l1) / 3.0;
    if length <= f32::EPSILON {
        return (v1, v2);
    }

    let r = height / length;
    let v1_corrected = v0 + (v1 - v0) * r;
    let v2_corrected = v1_corrected + (v2 - v1) * r;
    (v1_corrected, v2_corrected)
}

/// Keep the tip on or above the anchor's ground plane
fn clamp_to_ground(v0: Vec3, v2: Vec3, up: Vec3) -> Vec3 {
    v2 - up * (v2 - v0).dot(up).min(0.0)
}

fn push_direction(offset: Vec3, distance: f32, up: Vec3) -> Vec3 {
    if distance > CENTER_EPSILON {
        offset / distance
    } else {
        up
    }
}

/// Project a tip still inside any sphere onto that sphere's surface
fn project_out(mut v2: Vec3, up: Vec3, colliders: &[ColliderRecord]) -> Vec3 {
    for _ in 0..PROJECTION_PASSES {
        let mut moved = false;
        for c in colliders {
            let offset = v2 - c.center();
            let distance = offset.length();
            if distance < c.radius {
                v2 = c.center() + push_direction(offset, distance, up) * c.radius;
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }
    v2
}

/// Advance one blade. Returns the new shape and the new force scratch
/// (accumulated collision force in xyz, deepest penetration this step in w).
///
/// A non-positive or non-finite `delta_time` returns the inputs untouched.
pub fn step_blade(
    rest: &GpuBladeRest,
    shape: &GpuBladeShape,
    force: [f32; 4],
    params: &SimParams,
    colliders: &[ColliderRecord],
) -> (GpuBladeShape, [f32; 4]) {
    let dt = params.delta_time;
    if !(dt > 0.0 && dt.is_finite()) {
        return (*shape, force);
    }

    let v0 = rest.anchor();
    let up = rest.up();
    let height = rest.height();
    let mass = params.mass;
    let mut v2 = shape.v2();

    // Spring toward the rest tip. Gain capped at 1 so a long frame cannot overshoot.
    let gain = (params.stiffness * dt / mass).min(1.0);
    let recovery = (rest.rest_tip() - v2) * gain;

    // Point gravity blended into directional gravity
    let magnitude = params.gravity_magnitude();
    let direction = Vec3::new(params.gravity[0], params.gravity[1], params.gravity[2]);
    let point = Vec3::new(params.gravity_point[0], params.gravity_point[1], params.gravity_point[2]);
    let toward_point = (point - v2).normalize_or_zero() * magnitude;
    let environment = toward_point.lerp(direction * magnitude, params.gravity_blend());
    let front = rest.facing() * environment.length() * params.front_factor;
    let gravity = (environment + front) * mass;

    // Collision force decays over time and grows with penetration depth
    let decay = (1.0 - params.collision_decrease_amount * dt).max(0.0);
    let mut collision = Vec3::new(force[0], force[1], force[2]) * decay;
    let mut max_penetration = 0.0f32;
    for c in colliders {
        let offset = v2 - c.center();
        let distance = offset.length();
        if distance < c.radius {
            let depth = c.radius - distance;
            collision += push_direction(offset, distance, up) * depth * params.collision_strength;
            max_penetration = max_penetration.max(depth);
        }
    }

    v2 += recovery + (gravity + collision) * dt / mass;
    v2 = clamp_to_ground(v0, v2, up);

    let (v1, v2) = correct_length(v0, v2, up, height);
    let v2 = clamp_to_ground(v0, project_out(v2, up, colliders), up);

    (
        GpuBladeShape::new(v1, shape.height(), v2, shape.width()),
        collision.extend(max_penetration).to_array(),
    )
}

/// Run the physics kernel over a dispatch of `workgroups` groups.
///
/// Invocations past the end of the blade arrays do nothing, like the
/// bounds check at the top of the shader.
pub fn dispatch(
    workgroups: u32,
    rest: &[GpuBladeRest],
    shape: &mut [GpuBladeShape],
    force: &mut [[f32; 4]],
    params: &SimParams,
    colliders: &[ColliderRecord],
) {
    let invocations = (workgroups as usize) * (WORKGROUP_SIZE as usize);
    shape
        .par_iter_mut()
        .zip(force.par_iter_mut())
        .zip(rest.par_iter())
        .take(invocations)
        .for_each(|((shape, force), rest)| {
            let (next_shape, next_force) = step_blade(rest, shape, *force, params, colliders);
            *shape = next_shape;
            *force = next_force;
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grass::blade::{BladeAnchor, BladeSet};
    use crate::grass::config::{BladeConfig, GrassConfig};
    use crate::grass::params::workgroup_count;
    use glam::{Mat4, Vec2};

    fn params(config: &GrassConfig, dt: f32, blades: u32, colliders: u32) -> SimParams {
        SimParams::new(config, &Mat4::IDENTITY, 0.0, dt, blades, colliders)
    }

    fn unit_blade() -> BladeSet {
        let cfg = BladeConfig { height: 1.0, width: 0.1, rest_lean: 0.01, density: 1.0 };
        BladeSet::new(&[BladeAnchor::new(Mat4::IDENTITY)], &cfg).unwrap()
    }

    #[test]
    fn test_correct_length_keeps_height() {
        let v0 = Vec3::ZERO;
        let (v1, v2) = correct_length(v0, Vec3::new(0.8, 0.3, 0.0), Vec3::Y, 1.0);
        let l = (2.0 * (v2 - v0).length() + (v1 - v0).length() + (v2 - v1).length()) / 3.0;
        assert!((l - 1.0).abs() < 1e-4);
        assert!(v1.y > 0.0);
    }

    #[test]
    fn test_zero_delta_time_is_identity() {
        let cfg = GrassConfig::default();
        let blades = BladeSet::new(
            &BladeAnchor::grid(Vec2::splat(4.0), 4.0),
            &cfg.blade,
        ).unwrap();
        let colliders = [ColliderRecord::new(Vec3::new(0.0, 0.2, 0.0), 1.0)];

        for dt in [0.0, -1.0, f32::NAN] {
            let p = params(&cfg, dt, blades.len() as u32, 1);
            for ((rest, shape), force) in blades.rest().iter().zip(blades.shape()).zip(blades.force()) {
                let scratch = [0.3, -0.2, 0.1, 0.05];
                let (next, next_force) = step_blade(rest, shape, scratch, &p, &colliders);
                assert_eq!(&next, shape);
                assert_eq!(next_force, scratch);
                assert_eq!(*force, [0.0; 4]);
            }
        }
    }

    #[test]
    fn test_gravity_bends_blade_and_converges() {
        let cfg = GrassConfig::default();
        let mut blades = BladeSet::new(&BladeAnchor::grid(Vec2::splat(4.0), 4.0), &{
            let mut b = cfg.blade.clone();
            b.height = 1.0;
            b
        }).unwrap();
        assert_eq!(blades.len(), 64);

        let n = blades.len() as u32;
        let p = params(&cfg, 1.0 / 60.0, n, 0);
        let rest_tips: Vec<Vec3> = blades.rest().iter().map(|r| r.rest_tip()).collect();

        let mut first_move = 0.0f32;
        let mut last_move = 0.0f32;
        for step in 0..60 {
            let before: Vec<Vec3> = blades.shape().iter().map(|s| s.v2()).collect();
            let (rest, shape, force) = blades.split_mut();
            dispatch(workgroup_count(n), rest, shape, force, &p, &[]);

            let moved = blades.shape().iter().zip(&before)
                .map(|(s, b)| (s.v2() - *b).length())
                .fold(0.0f32, f32::max);
            if step == 0 {
                first_move = moved;
            }
            last_move = moved;
        }

        for ((shape, rest), rest_tip) in blades.shape().iter().zip(blades.rest()).zip(&rest_tips) {
            let tip = shape.v2() - rest.anchor();
            // Displaced downward, still above the anchor
            assert!(tip.y < (*rest_tip - rest.anchor()).y - 0.05);
            assert!(tip.y > 0.0);
            assert!(shape.v2().is_finite() && shape.v1().is_finite());
            // Encoded dimensions survive
            assert_eq!(shape.height(), 1.0);
        }
        assert!(last_move < first_move);
        assert!(last_move < 1e-3);
    }

    #[test]
    fn test_collision_pushes_tip_outside_sphere() {
        let cfg = GrassConfig::default();
        let mut blades = unit_blade();
        let center = Vec3::new(0.25, 0.5, 0.0);
        let radius = 0.6;
        // Anchor and rest tip both start inside the sphere
        assert!(blades.rest()[0].anchor().distance(center) < radius);
        assert!(blades.rest()[0].rest_tip().distance(center) < radius);

        let colliders = [ColliderRecord::new(center, radius)];
        let p = params(&cfg, 1.0 / 60.0, 1, 1);
        for _ in 0..60 {
            let (rest, shape, force) = blades.split_mut();
            dispatch(1, rest, shape, force, &p, &colliders);
        }

        let tip = blades.shape()[0].v2();
        assert!(tip.distance(center) >= radius - 1e-4);
        assert!(tip.y >= -1e-5);
    }

    #[test]
    fn test_collision_records_penetration() {
        let cfg = GrassConfig::default();
        let blades = unit_blade();
        let tip = blades.shape()[0].v2();
        let colliders = [ColliderRecord::new(tip + Vec3::new(0.1, 0.0, 0.0), 0.3)];
        let p = params(&cfg, 1.0 / 60.0, 1, 1);

        let (_, force) = step_blade(&blades.rest()[0], &blades.shape()[0], [0.0; 4], &p, &colliders);
        assert!((force[3] - 0.2).abs() < 1e-5);
        // Pushed away from the center, toward -X
        assert!(force[0] < 0.0);
    }

    #[test]
    fn test_point_gravity_pulls_toward_point() {
        let mut cfg = GrassConfig::default();
        cfg.gravity.blend = 0.0;
        cfg.gravity.front_factor = 0.0;
        cfg.gravity.point = [10.0, 1.0, 0.0];
        let blades = unit_blade();
        let p = params(&cfg, 1.0 / 60.0, 1, 0);

        let (next, _) = step_blade(&blades.rest()[0], &blades.shape()[0], [0.0; 4], &p, &[]);
        assert!(next.v2().x > blades.shape()[0].v2().x);
    }

    #[test]
    fn test_overlapping_colliders_both_cleared() {
        let cfg = GrassConfig::default();
        let mut blades = unit_blade();
        let colliders = [
            ColliderRecord::new(Vec3::new(0.3, 0.8, 0.0), 0.4),
            ColliderRecord::new(Vec3::new(-0.3, 0.8, 0.0), 0.4),
        ];
        let p = params(&cfg, 1.0 / 60.0, 1, 2);
        for _ in 0..120 {
            let (rest, shape, force) = blades.split_mut();
            dispatch(1, rest, shape, force, &p, &colliders);
            let tip = blades.shape()[0].v2();
            for c in &colliders {
                assert!(tip.distance(c.center()) >= c.radius - 1e-4);
            }
        }
    }

    #[test]
    fn test_upright_blade_without_lean_does_not_fold() {
        let mut cfg = GrassConfig::default();
        cfg.gravity.front_factor = 0.0;
        let blade = BladeConfig { height: 1.0, width: 0.1, rest_lean: 0.0, density: 1.0 };
        let mut blades = BladeSet::new(&[BladeAnchor::new(Mat4::IDENTITY)], &blade).unwrap();
        let p = params(&cfg, 1.0 / 60.0, 1, 0);
        for _ in 0..120 {
            let (rest, shape, force) = blades.split_mut();
            dispatch(1, rest, shape, force, &p, &[]);
        }

        // The control point never rises above the tip on a straight blade
        let shape = blades.shape()[0];
        assert!(shape.v1().y <= shape.v2().y + 1e-4);
        assert!((shape.v2().y - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_correct_length_caps_control_point_at_tip() {
        let (v1, v2) = correct_length(Vec3::ZERO, Vec3::new(0.0, 0.7, 0.0), Vec3::Y, 1.0);
        assert!(v1.y <= v2.y + 1e-5);
        assert!((v2.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_dispatch_ignores_tail_invocations() {
        let cfg = GrassConfig::default();
        let mut blades = BladeSet::new(
            &BladeAnchor::grid(Vec2::new(3.0, 3.0), 1.0),
            &cfg.blade,
        ).unwrap();
        assert_eq!(blades.len(), 9);
        let before = blades.shape().to_vec();

        let p = params(&cfg, 1.0 / 60.0, 9, 0);
        // One workgroup covers the first 8 blades only
        let (rest, shape, force) = blades.split_mut();
        dispatch(1, rest, shape, force, &p, &[]);
        assert_ne!(blades.shape()[0], before[0]);
        assert_eq!(blades.shape()[8], before[8]);

        let (rest, shape, force) = blades.split_mut();
        dispatch(workgroup_count(9), rest, shape, force, &p, &[]);
        assert_ne!(blades.shape()[8], before[8]);
    }
}
