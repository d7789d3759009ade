//! Blade physics compute pipeline

use super::{buffer_bind_group, compute_pipeline, storage_entry, uniform_entry};
use crate::render::buffer::BufferSet;

pub(crate) const SHADER: &str = include_str!("../../../shaders/grass_physics.wgsl");

/// One invocation per blade, `WORKGROUP_SIZE` blades per group.
///
/// Bindings: params, rest (read), shape (read-write), force scratch
/// (read-write), colliders (read).
pub struct PhysicsPipeline {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl PhysicsPipeline {
    pub fn new(device: &wgpu::Device) -> Self {
        let stage = wgpu::ShaderStages::COMPUTE;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("grass_physics_layout"),
            entries: &[
                uniform_entry(0, stage),
                storage_entry(1, true, stage),
                storage_entry(2, false, stage),
                storage_entry(3, false, stage),
                storage_entry(4, true, stage),
            ],
        });

        let pipeline = compute_pipeline(
            device,
            "grass_physics",
            SHADER,
            &bind_group_layout,
        );

        Self { pipeline, bind_group_layout }
    }

    pub fn create_bind_group(&self, device: &wgpu::Device, buffers: &BufferSet) -> wgpu::BindGroup {
        buffer_bind_group(
            device,
            "grass_physics_bind_group",
            &self.bind_group_layout,
            &[&buffers.sim_params, &buffers.rest, &buffers.shape, &buffers.force, &buffers.colliders],
        )
    }

    pub fn dispatch(&self, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup, workgroups: u32) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("grass_physics_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(workgroups, 1, 1);
    }
}
