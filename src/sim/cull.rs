//! Visibility test and parallel filter-and-compact (host reference for grass_cull.wgsl).

use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Mat4, Vec3, Vec4};
use rayon::prelude::*;

use crate::grass::blade::{GpuBladeRest, GpuBladeShape};
use crate::grass::params::{CullParams, WORKGROUP_SIZE};

/// Host view of [`CullParams`] with the matrices and planes unpacked once.
#[derive(Clone, Copy, Debug)]
pub struct CullView {
    object_to_world: Mat4,
    planes: [Vec4; 6],
    camera_position: Vec3,
    camera_forward: Vec3,
    max_distance: f32,
    near_offset: f32,
    margin: f32,
}

impl CullView {
    pub fn new(params: &CullParams) -> Self {
        Self {
            object_to_world: params.object_to_world(),
            planes: params.planes.map(Vec4::from_array),
            camera_position: Vec4::from_array(params.camera_position).truncate(),
            camera_forward: Vec4::from_array(params.camera_forward).truncate(),
            max_distance: params.max_distance(),
            near_offset: params.near_offset(),
            margin: params.frustum_margin,
        }
    }

    fn point_visible(&self, p: Vec3) -> bool {
        for (i, plane) in self.planes.iter().enumerate() {
            // Plane 0 is the near plane
            let slack = if i == 0 { self.margin + self.near_offset } else { self.margin };
            if plane.truncate().dot(p) + plane.w < -slack {
                return false;
            }
        }
        self.max_distance <= 0.0 || (p - self.camera_position).dot(self.camera_forward) <= self.max_distance
    }

    /// A blade is visible when its anchor, Bezier midpoint or tip is.
    pub fn blade_visible(&self, rest: &GpuBladeRest, shape: &GpuBladeShape) -> bool {
        let v0 = rest.anchor();
        [v0, shape.midpoint(v0), shape.v2()]
            .into_iter()
            .any(|p| self.point_visible(self.object_to_world.transform_point3(p)))
    }
}

/// Free-function form of [`CullView::blade_visible`].
pub fn blade_visible(params: &CullParams, rest: &GpuBladeRest, shape: &GpuBladeShape) -> bool {
    CullView::new(params).blade_visible(rest, shape)
}

/// Parallel filter-and-compact over `len` items in `workgroups` groups.
///
/// Resets `counter`, then every passing index reserves a slot with one atomic
/// add and scatters itself there. Slots at or past the final count keep
/// whatever they held. Returns the count.
pub fn compact_parallel<F>(
    len: usize,
    workgroups: u32,
    slots: &[AtomicU32],
    counter: &AtomicU32,
    predicate: F,
) -> u32
where
    F: Fn(usize) -> bool + Sync,
{
    counter.store(0, Ordering::Relaxed);

    let invocations = (workgroups as usize) * (WORKGROUP_SIZE as usize);
    (0..invocations).into_par_iter().for_each(|i| {
        if i >= len || !predicate(i) {
            return;
        }
        let slot = counter.fetch_add(1, Ordering::Relaxed) as usize;
        slots[slot].store(i as u32, Ordering::Relaxed);
    });

    counter.load(Ordering::Acquire)
}

/// Run the culling kernel: compact visible blade indices into `visible`.
pub fn dispatch(
    workgroups: u32,
    params: &CullParams,
    rest: &[GpuBladeRest],
    shape: &[GpuBladeShape],
    visible: &[AtomicU32],
    counter: &AtomicU32,
) -> u32 {
    let view = CullView::new(params);
    compact_parallel(rest.len().min(shape.len()), workgroups, visible, counter, |i| {
        view.blade_visible(&rest[i], &shape[i])
    })
}
