//! Sphere colliders that push blades aside.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::core::{Error, Result};

/// Object-space sphere as uploaded to the physics kernel (16 bytes).
/// Must match `Collider` in grass_physics.wgsl.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ColliderRecord {
    pub center: [f32; 3],
    pub radius: f32,
}

impl ColliderRecord {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center: center.to_array(), radius }
    }

    pub fn center(&self) -> Vec3 {
        Vec3::from_array(self.center)
    }
}

/// Authoring-side sphere. The effective world radius is `radius` times the
/// largest component of `world_scale`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SphereCollider {
    pub center: Vec3,
    pub radius: f32,
    pub world_scale: Vec3,
}

impl SphereCollider {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius, world_scale: Vec3::ONE }
    }

    pub fn with_scale(mut self, world_scale: Vec3) -> Self {
        self.world_scale = world_scale;
        self
    }

    pub fn world_radius(&self) -> f32 {
        self.radius * self.world_scale.abs().max_element()
    }
}

/// The collider list for one grass field.
///
/// The count is fixed at creation; only positions change between frames.
#[derive(Clone, Debug, Default)]
pub struct ColliderSet {
    colliders: Vec<SphereCollider>,
}

impl ColliderSet {
    pub fn new(colliders: Vec<SphereCollider>) -> Result<Self> {
        for (i, c) in colliders.iter().enumerate() {
            if !c.center.is_finite() || !c.world_scale.is_finite() || !(c.radius.is_finite() && c.radius >= 0.0) {
                return Err(Error::Config(format!("collider {i} has a non-finite center or invalid radius")));
            }
        }
        Ok(Self { colliders })
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    pub fn colliders(&self) -> &[SphereCollider] {
        &self.colliders
    }

    /// Move every collider to a new world position.
    ///
    /// `positions` must have exactly one entry per collider.
    pub fn refresh(&mut self, positions: &[Vec3]) -> Result<()> {
        if positions.len() != self.colliders.len() {
            return Err(Error::BufferSize {
                name: "collider positions",
                expected: self.colliders.len(),
                actual: positions.len(),
            });
        }
        for (collider, &p) in self.colliders.iter_mut().zip(positions) {
            collider.center = p;
        }
        Ok(())
    }

    /// Object-space records for upload. Radii follow the object's scale.
    pub fn to_object_space(&self, world_to_object: &Mat4) -> Vec<ColliderRecord> {
        let scale = world_to_object.x_axis.truncate().length()
            .max(world_to_object.y_axis.truncate().length())
            .max(world_to_object.z_axis.truncate().length());

        self.colliders
            .iter()
            .map(|c| ColliderRecord::new(world_to_object.transform_point3(c.center), c.world_radius() * scale))
            .collect()
    }
}
