//! Per-blade data, stored struct-of-arrays.
//!
//! Blade `i` is the tuple of element `i` across `rest`, `shape` and `force`.
//! The three vectors are sized once from the authoring set and never resized.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec2, Vec3};

use crate::core::{Error, Result};
use crate::grass::config::BladeConfig;
use crate::math::Aabb;
use crate::sim::physics::correct_length;

/// Immutable per-blade rest data (64 bytes). Must match `BladeRest` in the shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuBladeRest {
    /// Ground anchor V0 (xyz), blade height in w
    pub anchor: [f32; 4],
    /// Blade up axis (xyz, normalized), blade width in w
    pub up: [f32; 4],
    /// Facing axis (xyz, normalized, perpendicular to up)
    pub facing: [f32; 4],
    /// Rest position of the tip control point
    pub rest_tip: [f32; 4],
}

impl GpuBladeRest {
    pub fn anchor(&self) -> Vec3 {
        Vec3::new(self.anchor[0], self.anchor[1], self.anchor[2])
    }

    pub fn height(&self) -> f32 {
        self.anchor[3]
    }

    pub fn up(&self) -> Vec3 {
        Vec3::new(self.up[0], self.up[1], self.up[2])
    }

    pub fn width(&self) -> f32 {
        self.up[3]
    }

    pub fn facing(&self) -> Vec3 {
        Vec3::new(self.facing[0], self.facing[1], self.facing[2])
    }

    pub fn rest_tip(&self) -> Vec3 {
        Vec3::new(self.rest_tip[0], self.rest_tip[1], self.rest_tip[2])
    }
}

/// Mutable blade shape: two control vectors (32 bytes).
/// Must match `BladeShape` in the shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuBladeShape {
    /// Mid control point (xyz), height in w
    pub v1: [f32; 4],
    /// Tip control point (xyz), width in w
    pub v2: [f32; 4],
}

impl GpuBladeShape {
    pub fn new(v1: Vec3, height: f32, v2: Vec3, width: f32) -> Self {
        Self {
            v1: v1.extend(height).to_array(),
            v2: v2.extend(width).to_array(),
        }
    }

    pub fn v1(&self) -> Vec3 {
        Vec3::new(self.v1[0], self.v1[1], self.v1[2])
    }

    pub fn v2(&self) -> Vec3 {
        Vec3::new(self.v2[0], self.v2[1], self.v2[2])
    }

    pub fn height(&self) -> f32 {
        self.v1[3]
    }

    pub fn width(&self) -> f32 {
        self.v2[3]
    }

    /// Point halfway along the quadratic Bezier V0 -> V1 -> V2
    pub fn midpoint(&self, anchor: Vec3) -> Vec3 {
        anchor * 0.25 + self.v1() * 0.5 + self.v2() * 0.25
    }
}

/// Authoring-time placement of one blade.
///
/// Translation is the ground anchor, +Y the blade's up axis, +Z its facing.
/// Axis lengths scale the configured height (Y) and width (X).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BladeAnchor {
    pub transform: Mat4,
}

impl BladeAnchor {
    pub fn new(transform: Mat4) -> Self {
        Self { transform }
    }

    /// Anchor standing on a surface point, up along the surface normal,
    /// turned `yaw` radians around that normal.
    pub fn from_surface(position: Vec3, normal: Vec3, yaw: f32) -> Self {
        let normal = normal.try_normalize().unwrap_or(Vec3::Y);
        let rotation = Quat::from_rotation_arc(Vec3::Y, normal) * Quat::from_rotation_y(yaw);
        Self::new(Mat4::from_rotation_translation(rotation, position))
    }

    /// Blades on a jittered grid covering `extent` (XZ, centered on the origin).
    ///
    /// Spacing is `1 / sqrt(density)`. Placement and yaw are deterministic.
    pub fn grid(extent: Vec2, density: f32) -> Vec<Self> {
        if !(density > 0.0) || extent.x <= 0.0 || extent.y <= 0.0 {
            return Vec::new();
        }
        let spacing = 1.0 / density.sqrt();
        let nx = (extent.x / spacing).floor().max(1.0) as u32;
        let nz = (extent.y / spacing).floor().max(1.0) as u32;
        let origin = -extent * 0.5 + Vec2::splat(spacing * 0.5);

        let mut anchors = Vec::with_capacity((nx * nz) as usize);
        for z in 0..nz {
            for x in 0..nx {
                let h = hash2(x, z);
                let jitter = Vec2::new(unit(h) - 0.5, unit(h >> 8) - 0.5) * spacing * 0.8;
                let p = origin + Vec2::new(x as f32, z as f32) * spacing + jitter;
                let yaw = unit(h >> 16) * std::f32::consts::TAU;
                anchors.push(Self::from_surface(Vec3::new(p.x, 0.0, p.y), Vec3::Y, yaw));
            }
        }
        anchors
    }
}

fn hash2(x: u32, z: u32) -> u32 {
    let mut h = x.wrapping_mul(0x8da6_b343) ^ z.wrapping_mul(0xd816_3841);
    h ^= h >> 13;
    h = h.wrapping_mul(0x5bd1_e995);
    h ^ (h >> 15)
}

fn unit(h: u32) -> f32 {
    (h & 0xFF) as f32 / 255.0
}

/// Struct-of-arrays storage for every blade in a field.
#[derive(Clone, Debug)]
pub struct BladeSet {
    rest: Vec<GpuBladeRest>,
    shape: Vec<GpuBladeShape>,
    force: Vec<[f32; 4]>,
}

impl BladeSet {
    /// Build the rest pose and initial shape of every anchor.
    pub fn new(anchors: &[BladeAnchor], config: &BladeConfig) -> Result<Self> {
        if u32::try_from(anchors.len()).is_err() {
            return Err(Error::Config(format!("{} blades exceed the u32 index range", anchors.len())));
        }

        let mut rest = Vec::with_capacity(anchors.len());
        let mut shape = Vec::with_capacity(anchors.len());

        for (i, anchor) in anchors.iter().enumerate() {
            let (r, s) = Self::blade_from_anchor(anchor, config)
                .ok_or_else(|| Error::Config(format!("blade anchor {i} has a degenerate transform")))?;
            rest.push(r);
            shape.push(s);
        }

        let force = vec![[0.0; 4]; anchors.len()];
        Ok(Self { rest, shape, force })
    }

    fn blade_from_anchor(anchor: &BladeAnchor, config: &BladeConfig) -> Option<(GpuBladeRest, GpuBladeShape)> {
        let m = anchor.transform;
        if !m.is_finite() {
            return None;
        }

        let v0 = m.w_axis.truncate();
        let y = m.y_axis.truncate();
        let x = m.x_axis.truncate();
        let up = y.try_normalize()?;

        // Facing: +Z made perpendicular to up
        let z = m.z_axis.truncate();
        let facing = (z - up * z.dot(up))
            .try_normalize()
            .unwrap_or_else(|| up.any_orthonormal_vector());

        let height = config.height * y.length();
        let width = config.width * x.length().max(f32::EPSILON);
        if !(height > 0.0) {
            return None;
        }

        let rest_tip = v0 + up * height + facing * (height * config.rest_lean);
        let (v1, v2) = correct_length(v0, rest_tip, up, height);

        let rest = GpuBladeRest {
            anchor: v0.extend(height).to_array(),
            up: up.extend(width).to_array(),
            facing: facing.extend(0.0).to_array(),
            rest_tip: v2.extend(0.0).to_array(),
        };
        Some((rest, GpuBladeShape::new(v1, height, v2, width)))
    }

    pub fn len(&self) -> usize {
        self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    pub fn rest(&self) -> &[GpuBladeRest] {
        &self.rest
    }

    pub fn shape(&self) -> &[GpuBladeShape] {
        &self.shape
    }

    pub fn force(&self) -> &[[f32; 4]] {
        &self.force
    }

    /// Mutable views of the per-frame buffers, with the rest pose alongside.
    pub fn split_mut(&mut self) -> (&[GpuBladeRest], &mut [GpuBladeShape], &mut [[f32; 4]]) {
        (&self.rest, &mut self.shape, &mut self.force)
    }

    /// Object-space bounds of anchors and tips at rest, grown by blade height.
    pub fn bounds(&self) -> Option<Aabb> {
        let max_height = self.rest.iter().map(|r| r.height()).fold(0.0f32, f32::max);
        Aabb::from_points(self.rest.iter().flat_map(|r| [r.anchor(), r.rest_tip()]))
            .map(|aabb| aabb.inflated(max_height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes() {
        assert_eq!(std::mem::size_of::<GpuBladeRest>(), 64);
        assert_eq!(std::mem::size_of::<GpuBladeShape>(), 32);
    }

    #[test]
    fn test_upright_blade_rest_pose() {
        let cfg = BladeConfig { height: 1.0, width: 0.2, rest_lean: 0.0, density: 1.0 };
        let set = BladeSet::new(&[BladeAnchor::new(Mat4::from_translation(Vec3::new(2.0, 0.0, 3.0)))], &cfg).unwrap();

        let rest = set.rest()[0];
        assert_eq!(rest.anchor(), Vec3::new(2.0, 0.0, 3.0));
        assert_eq!(rest.height(), 1.0);
        assert_eq!(rest.width(), 0.2);
        assert!((rest.up() - Vec3::Y).length() < 1e-6);

        let shape = set.shape()[0];
        assert!((shape.v2() - Vec3::new(2.0, 1.0, 3.0)).length() < 1e-4);
        assert_eq!(shape.height(), 1.0);
        assert_eq!(shape.width(), 0.2);
        assert_eq!(set.force()[0], [0.0; 4]);
    }

    #[test]
    fn test_rest_lean_tilts_tip_forward() {
        let cfg = BladeConfig { rest_lean: 0.05, ..BladeConfig::default() };
        let set = BladeSet::new(&[BladeAnchor::new(Mat4::IDENTITY)], &cfg).unwrap();
        let rest = set.rest()[0];
        // Facing is +Z for an identity anchor
        assert!(rest.rest_tip().z > 0.0);
        // Length correction keeps the tip at roughly blade height
        assert!((rest.rest_tip().length() - cfg.height).abs() < 0.05 * cfg.height);
    }

    #[test]
    fn test_anchor_scale_scales_dimensions() {
        let cfg = BladeConfig { height: 0.5, width: 0.1, rest_lean: 0.0, density: 1.0 };
        let anchor = BladeAnchor::new(Mat4::from_scale(Vec3::new(2.0, 3.0, 1.0)));
        let set = BladeSet::new(&[anchor], &cfg).unwrap();
        assert!((set.rest()[0].height() - 1.5).abs() < 1e-6);
        assert!((set.rest()[0].width() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_anchor_rejected() {
        let cfg = BladeConfig::default();
        let err = BladeSet::new(&[BladeAnchor::new(Mat4::ZERO)], &cfg).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let mut nan = Mat4::IDENTITY;
        nan.w_axis.x = f32::NAN;
        assert!(BladeSet::new(&[BladeAnchor::new(nan)], &cfg).is_err());
    }

    #[test]
    fn test_from_surface_follows_normal() {
        let normal = Vec3::new(1.0, 1.0, 0.0).normalize();
        let set = BladeSet::new(
            &[BladeAnchor::from_surface(Vec3::ZERO, normal, 0.7)],
            &BladeConfig::default(),
        ).unwrap();
        let rest = set.rest()[0];
        assert!((rest.up() - normal).length() < 1e-5);
        assert!(rest.facing().dot(rest.up()).abs() < 1e-5);
    }

    #[test]
    fn test_grid_is_deterministic() {
        let a = BladeAnchor::grid(Vec2::new(4.0, 4.0), 4.0);
        let b = BladeAnchor::grid(Vec2::new(4.0, 4.0), 4.0);
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        for anchor in &a {
            let p = anchor.transform.w_axis.truncate();
            assert!(p.x.abs() <= 2.0 && p.z.abs() <= 2.0);
            assert_eq!(p.y, 0.0);
        }
        assert!(BladeAnchor::grid(Vec2::new(4.0, 4.0), 0.0).is_empty());
    }

    #[test]
    fn test_empty_set() {
        let set = BladeSet::new(&[], &BladeConfig::default()).unwrap();
        assert!(set.is_empty());
        assert!(set.bounds().is_none());
    }
}
