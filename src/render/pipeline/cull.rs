//! Visibility culling compute pipeline

use super::{buffer_bind_group, compute_pipeline, storage_entry, uniform_entry};
use crate::render::buffer::BufferSet;

pub(crate) const SHADER: &str = include_str!("../../../shaders/grass_cull.wgsl");

/// Compacts visible blade indices using an atomic counter.
///
/// The counter must be cleared in the same encoder before [`dispatch`](Self::dispatch).
pub struct CullPipeline {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl CullPipeline {
    pub fn new(device: &wgpu::Device) -> Self {
        let stage = wgpu::ShaderStages::COMPUTE;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("grass_cull_layout"),
            entries: &[
                uniform_entry(0, stage),
                storage_entry(1, true, stage),
                storage_entry(2, true, stage),
                storage_entry(3, false, stage),
                storage_entry(4, false, stage),
            ],
        });

        let pipeline = compute_pipeline(
            device,
            "grass_cull",
            SHADER,
            &bind_group_layout,
        );

        Self { pipeline, bind_group_layout }
    }

    pub fn create_bind_group(&self, device: &wgpu::Device, buffers: &BufferSet) -> wgpu::BindGroup {
        buffer_bind_group(
            device,
            "grass_cull_bind_group",
            &self.bind_group_layout,
            &[&buffers.cull_params, &buffers.rest, &buffers.shape, &buffers.visible, &buffers.counter],
        )
    }

    pub fn dispatch(&self, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup, workgroups: u32) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("grass_cull_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(workgroups, 1, 1);
    }
}
