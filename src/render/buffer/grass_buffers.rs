//! Device-resident buffer set for one grass field.
//!
//! Allocated once, sized exactly N blades / max(1, M) colliders / one counter
//! and one args record. Nothing is resized afterwards. Release happens through
//! [`GrassBuffers::destroy`], which is safe to call any number of times and is
//! also run on drop.

use bytemuck::Zeroable;

use crate::core::{Error, Result};
use crate::grass::blade::{BladeSet, GpuBladeRest, GpuBladeShape};
use crate::grass::collider::ColliderRecord;
use crate::grass::params::{workgroup_count, CullParams, DrawIndexedIndirectArgs, SimParams};

/// The live buffers. Element `i` of every per-blade buffer is blade `i`.
pub struct BufferSet {
    pub rest: wgpu::Buffer,
    pub shape: wgpu::Buffer,
    pub force: wgpu::Buffer,
    /// Never empty: holds one unused record when there are no colliders
    pub colliders: wgpu::Buffer,
    pub visible: wgpu::Buffer,
    pub counter: wgpu::Buffer,
    pub args: wgpu::Buffer,
    pub sim_params: wgpu::Buffer,
    pub cull_params: wgpu::Buffer,
}

impl BufferSet {
    fn all(&self) -> [&wgpu::Buffer; 9] {
        [
            &self.rest,
            &self.shape,
            &self.force,
            &self.colliders,
            &self.visible,
            &self.counter,
            &self.args,
            &self.sim_params,
            &self.cull_params,
        ]
    }

    /// Total bytes allocated on the device
    pub fn byte_size(&self) -> u64 {
        self.all().iter().map(|b| b.size()).sum()
    }
}

pub struct GrassBuffers {
    set: Option<BufferSet>,
    blade_count: u32,
    collider_count: u32,
}

fn storage_size(name: &'static str, count: usize, stride: usize, limit: u64) -> Result<u64> {
    let bytes = (count as u64) * (stride as u64);
    if bytes > limit {
        return Err(Error::BufferSize {
            name,
            expected: limit as usize,
            actual: bytes as usize,
        });
    }
    Ok(bytes)
}

/// Per-blade passes dispatch `ceil(n / 8)` groups along X, which must fit the device limit.
fn check_workgroups(blade_count: u32, limit: u32) -> Result<u32> {
    let groups = workgroup_count(blade_count);
    if groups > limit {
        return Err(Error::Config(format!(
            "{blade_count} blades need {groups} workgroups per dispatch, device allows {limit}"
        )));
    }
    Ok(groups)
}

impl GrassBuffers {
    /// A buffer set that was never created. `destroy` on it is a no-op.
    pub fn unallocated() -> Self {
        Self {
            set: None,
            blade_count: 0,
            collider_count: 0,
        }
    }

    /// Allocate every buffer and upload the initial blade state.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        blades: &BladeSet,
        collider_count: usize,
        index_count: u32,
    ) -> Result<Self> {
        let n = blades.len();
        if n == 0 {
            return Err(Error::Config("grass buffers need at least one blade".into()));
        }
        let blade_count = u32::try_from(n)
            .map_err(|_| Error::Config(format!("{n} blades exceed the u32 index range")))?;
        let collider_count_u32 = u32::try_from(collider_count)
            .map_err(|_| Error::Config(format!("{collider_count} colliders exceed the u32 range")))?;

        let limits = device.limits();
        check_workgroups(blade_count, limits.max_compute_workgroups_per_dimension)?;
        let limit = limits.max_storage_buffer_binding_size as u64;
        let rest_size = storage_size("blade rest", n, std::mem::size_of::<GpuBladeRest>(), limit)?;
        let shape_size = storage_size("blade shape", n, std::mem::size_of::<GpuBladeShape>(), limit)?;
        let force_size = storage_size("blade force", n, std::mem::size_of::<[f32; 4]>(), limit)?;
        let collider_size = storage_size(
            "colliders",
            collider_count.max(1),
            std::mem::size_of::<ColliderRecord>(),
            limit,
        )?;
        let visible_size = storage_size("visible indices", n, std::mem::size_of::<u32>(), limit)?;

        let storage = |label: &str, size: u64, extra: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | extra,
                mapped_at_creation: false,
            })
        };
        let uniform = |label: &str, size: usize| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        let set = BufferSet {
            rest: storage("grass_rest", rest_size, wgpu::BufferUsages::empty()),
            shape: storage("grass_shape", shape_size, wgpu::BufferUsages::COPY_SRC),
            force: storage("grass_force", force_size, wgpu::BufferUsages::empty()),
            colliders: storage("grass_colliders", collider_size, wgpu::BufferUsages::empty()),
            visible: storage("grass_visible", visible_size, wgpu::BufferUsages::COPY_SRC),
            counter: storage("grass_counter", 4, wgpu::BufferUsages::COPY_SRC),
            args: storage(
                "grass_indirect_args",
                std::mem::size_of::<DrawIndexedIndirectArgs>() as u64,
                wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_SRC,
            ),
            sim_params: uniform("grass_sim_params", std::mem::size_of::<SimParams>()),
            cull_params: uniform("grass_cull_params", std::mem::size_of::<CullParams>()),
        };

        queue.write_buffer(&set.rest, 0, bytemuck::cast_slice(blades.rest()));
        queue.write_buffer(&set.shape, 0, bytemuck::cast_slice(blades.shape()));
        queue.write_buffer(&set.force, 0, bytemuck::cast_slice(blades.force()));
        queue.write_buffer(&set.colliders, 0, bytemuck::bytes_of(&ColliderRecord::zeroed()));
        queue.write_buffer(&set.args, 0, bytemuck::bytes_of(&DrawIndexedIndirectArgs::for_mesh(index_count)));

        log::info!(
            "Grass buffers: {} blades, {} colliders, {:.2} MB",
            blade_count,
            collider_count,
            set.byte_size() as f64 / (1024.0 * 1024.0)
        );

        Ok(Self {
            set: Some(set),
            blade_count,
            collider_count: collider_count_u32,
        })
    }

    pub fn get(&self) -> Option<&BufferSet> {
        self.set.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.set.is_some()
    }

    pub fn blade_count(&self) -> u32 {
        self.blade_count
    }

    pub fn collider_count(&self) -> u32 {
        self.collider_count
    }

    /// Upload object-space colliders. The count must match the allocation.
    pub fn write_colliders(&self, queue: &wgpu::Queue, colliders: &[ColliderRecord]) -> Result<()> {
        self.check_collider_count(colliders.len())?;
        if let Some(set) = &self.set {
            if !colliders.is_empty() {
                queue.write_buffer(&set.colliders, 0, bytemuck::cast_slice(colliders));
            }
        }
        Ok(())
    }

    fn check_collider_count(&self, count: usize) -> Result<()> {
        if count != self.collider_count as usize {
            return Err(Error::BufferSize {
                name: "colliders",
                expected: self.collider_count as usize,
                actual: count,
            });
        }
        Ok(())
    }

    pub fn write_sim_params(&self, queue: &wgpu::Queue, params: &SimParams) {
        if let Some(set) = &self.set {
            queue.write_buffer(&set.sim_params, 0, bytemuck::bytes_of(params));
        }
    }

    pub fn write_cull_params(&self, queue: &wgpu::Queue, params: &CullParams) {
        if let Some(set) = &self.set {
            queue.write_buffer(&set.cull_params, 0, bytemuck::bytes_of(params));
        }
    }

    /// Release every device buffer. Returns false when there was nothing to release.
    pub fn destroy(&mut self) -> bool {
        let Some(set) = self.set.take() else {
            log::trace!("grass buffers already released");
            return false;
        };
        for buffer in set.all() {
            buffer.destroy();
        }
        log::debug!("Released grass buffers ({} blades)", self.blade_count);
        true
    }
}

impl Drop for GrassBuffers {
    fn drop(&mut self) {
        self.destroy();
    }
}
