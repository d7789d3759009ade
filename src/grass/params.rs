//! GPU-ready uniform and argument records.
//!
//! Each struct mirrors a WGSL struct byte for byte. All simulation values are
//! expressed in the owning object's local space; the host converts world-space
//! gravity and colliders before upload.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::grass::config::GrassConfig;
use crate::math::Frustum;

/// Blades processed per workgroup in the physics and culling kernels.
/// Must match `@workgroup_size` in grass_physics.wgsl and grass_cull.wgsl.
pub const WORKGROUP_SIZE: u32 = 8;

/// Workgroups needed to cover `count` items; 0 for an empty set.
pub fn workgroup_count(count: u32) -> u32 {
    count.div_ceil(WORKGROUP_SIZE)
}

/// Physics uniform. Must match `SimParams` in grass_physics.wgsl.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SimParams {
    /// Object-space gravity direction (xyz, normalized), magnitude in w
    pub gravity: [f32; 4],
    /// Object-space gravity attractor (xyz), blend weight in w
    pub gravity_point: [f32; 4],
    // -- 32 bytes --
    pub time: f32,
    pub delta_time: f32,
    pub mass: f32,
    pub stiffness: f32,
    // -- 48 bytes --
    pub collision_strength: f32,
    pub collision_decrease_amount: f32,
    pub front_factor: f32,
    pub _pad0: f32,
    // -- 64 bytes --
    pub blade_count: u32,
    pub collider_count: u32,
    pub _pad1: [u32; 2],
    // Total: 80 bytes
}

impl SimParams {
    /// Build the per-frame physics uniform.
    ///
    /// `world_to_object` converts world gravity into the blades' local space.
    pub fn new(
        config: &GrassConfig,
        world_to_object: &Mat4,
        time: f32,
        delta_time: f32,
        blade_count: u32,
        collider_count: u32,
    ) -> Self {
        let g = &config.gravity;
        let gravity_world = config.gravity_direction() * g.magnitude;
        let gravity_local = world_to_object.transform_vector3(gravity_world);
        let magnitude = gravity_local.length();
        let direction = gravity_local.normalize_or_zero();
        let point = world_to_object.transform_point3(Vec3::from_array(g.point));

        Self {
            gravity: direction.extend(magnitude).to_array(),
            gravity_point: point.extend(g.blend).to_array(),
            time,
            delta_time,
            mass: config.physics.mass,
            stiffness: config.physics.stiffness,
            collision_strength: config.physics.collision_strength,
            collision_decrease_amount: config.physics.collision_decrease_amount,
            front_factor: g.front_factor,
            _pad0: 0.0,
            blade_count,
            collider_count,
            _pad1: [0; 2],
        }
    }

    /// Gravity magnitude in object-space units
    pub fn gravity_magnitude(&self) -> f32 {
        self.gravity[3]
    }

    /// Point/directional blend weight
    pub fn gravity_blend(&self) -> f32 {
        self.gravity_point[3]
    }
}

/// View uniform shared by culling and drawing.
/// Must match `CullParams` in grass_cull.wgsl and grass_draw.wgsl.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CullParams {
    pub view_proj: [[f32; 4]; 4],
    pub object_to_world: [[f32; 4]; 4],
    // -- 128 bytes --
    /// World-space frustum planes (normal.xyz, distance): near, far, left, right, top, bottom
    pub planes: [[f32; 4]; 6],
    // -- 224 bytes --
    /// Camera position (xyz), max forward distance in w (0 = unlimited)
    pub camera_position: [f32; 4],
    /// Camera forward (xyz, normalized), near plane pull-back in w
    pub camera_forward: [f32; 4],
    // -- 256 bytes --
    pub frustum_margin: f32,
    pub blade_count: u32,
    pub _pad: [u32; 2],
    // Total: 272 bytes
}

/// Per-frame camera data the culling pass needs.
#[derive(Clone, Copy, Debug)]
pub struct CameraView {
    pub view_proj: Mat4,
    pub position: Vec3,
    pub forward: Vec3,
}

impl CameraView {
    pub fn from_camera(camera: &crate::core::camera::Camera) -> Self {
        Self {
            view_proj: camera.view_projection(),
            position: camera.position,
            forward: camera.forward(),
        }
    }
}

impl CullParams {
    pub fn new(config: &GrassConfig, view: &CameraView, object_to_world: &Mat4, blade_count: u32) -> Self {
        let frustum = Frustum::from_view_projection(&view.view_proj);
        Self {
            view_proj: view.view_proj.to_cols_array_2d(),
            object_to_world: object_to_world.to_cols_array_2d(),
            planes: frustum.to_gpu_planes(),
            camera_position: view.position.extend(config.cull.max_distance).to_array(),
            camera_forward: view.forward.normalize_or_zero().extend(config.cull.near_offset).to_array(),
            frustum_margin: config.cull.frustum_margin,
            blade_count,
            _pad: [0; 2],
        }
    }

    pub fn object_to_world(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.object_to_world)
    }

    pub fn max_distance(&self) -> f32 {
        self.camera_position[3]
    }

    pub fn near_offset(&self) -> f32 {
        self.camera_forward[3]
    }
}

/// DrawIndexedIndirect arguments. `instance_count` is written on the device.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectArgs {
    /// Indices per instance (one blade mesh).
    pub index_count: u32,
    /// Number of instances to draw (filled from the visibility counter).
    pub instance_count: u32,
    /// First index.
    pub first_index: u32,
    /// Base vertex.
    pub base_vertex: i32,
    /// First instance.
    pub first_instance: u32,
}

impl DrawIndexedIndirectArgs {
    /// Arguments for one blade mesh with no instances yet
    pub fn for_mesh(index_count: u32) -> Self {
        Self {
            index_count,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes() {
        assert_eq!(std::mem::size_of::<SimParams>(), 80);
        assert_eq!(std::mem::size_of::<CullParams>(), 272);
        assert_eq!(std::mem::size_of::<SimParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<CullParams>() % 16, 0);
        // Layout fixed by the indirect draw command
        assert_eq!(std::mem::size_of::<DrawIndexedIndirectArgs>(), 20);
    }

    #[test]
    fn test_workgroup_count() {
        assert_eq!(workgroup_count(0), 0);
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(8), 1);
        assert_eq!(workgroup_count(9), 2);
        assert_eq!(workgroup_count(64), 8);
    }

    #[test]
    fn test_sim_params_identity_transform() {
        let cfg = GrassConfig::default();
        let p = SimParams::new(&cfg, &Mat4::IDENTITY, 2.0, 0.5, 10, 3);
        let dir = Vec3::new(p.gravity[0], p.gravity[1], p.gravity[2]);
        assert!((dir - Vec3::NEG_Y).length() < 1e-6);
        assert!((p.gravity_magnitude() - 9.81).abs() < 1e-5);
        assert_eq!(p.gravity_blend(), 1.0);
        assert_eq!(p.delta_time, 0.5);
        assert_eq!(p.blade_count, 10);
        assert_eq!(p.collider_count, 3);
    }

    #[test]
    fn test_sim_params_rotated_object() {
        let cfg = GrassConfig::default();
        // Object lying on its side: world down is object-space +X
        let object_to_world = Mat4::from_rotation_z(-std::f32::consts::FRAC_PI_2);
        let p = SimParams::new(&cfg, &object_to_world.inverse(), 0.0, 0.0, 1, 0);
        let dir = Vec3::new(p.gravity[0], p.gravity[1], p.gravity[2]);
        assert!((dir - Vec3::X).length() < 1e-5);
        assert!((p.gravity_magnitude() - 9.81).abs() < 1e-4);
    }

    #[test]
    fn test_scaled_object_scales_gravity() {
        let cfg = GrassConfig::default();
        let object_to_world = Mat4::from_scale(Vec3::splat(2.0));
        let p = SimParams::new(&cfg, &object_to_world.inverse(), 0.0, 0.1, 1, 0);
        assert!((p.gravity_magnitude() - 9.81 / 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_indirect_args_for_mesh() {
        let args = DrawIndexedIndirectArgs::for_mesh(39);
        assert_eq!(args.index_count, 39);
        assert_eq!(args.instance_count, 0);
        let bytes = bytemuck::bytes_of(&args);
        assert_eq!(&bytes[0..4], &39u32.to_le_bytes());
    }
}
