//! Indirect draw argument pipeline (single invocation)

use super::{buffer_bind_group, compute_pipeline, storage_entry};
use crate::render::buffer::BufferSet;

pub(crate) const SHADER: &str = include_str!("../../../shaders/grass_indirect.wgsl");

pub struct IndirectArgsPipeline {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl IndirectArgsPipeline {
    pub fn new(device: &wgpu::Device) -> Self {
        let stage = wgpu::ShaderStages::COMPUTE;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("grass_indirect_layout"),
            entries: &[storage_entry(0, true, stage), storage_entry(1, false, stage)],
        });

        let pipeline = compute_pipeline(
            device,
            "grass_indirect",
            SHADER,
            &bind_group_layout,
        );

        Self { pipeline, bind_group_layout }
    }

    pub fn create_bind_group(&self, device: &wgpu::Device, buffers: &BufferSet) -> wgpu::BindGroup {
        buffer_bind_group(
            device,
            "grass_indirect_bind_group",
            &self.bind_group_layout,
            &[&buffers.counter, &buffers.args],
        )
    }

    pub fn dispatch(&self, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("grass_indirect_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(1, 1, 1);
    }
}
