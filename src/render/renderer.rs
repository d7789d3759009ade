//! GPU backend for the grass passes.
//!
//! [`GrassRenderer`] owns the buffer set, the four pipelines and their bind
//! groups. Each frame, [`GrassRenderer::begin_frame`] borrows it together with
//! a command encoder as a [`GpuFrame`], which implements [`GrassPasses`] by
//! recording one compute pass per stage followed by the indirect draw.
//! wgpu orders the passes within the encoder, so every pass observes the
//! writes of the one before it.

use crate::core::{Error, Result};
use crate::grass::blade::{BladeSet, GpuBladeShape};
use crate::grass::collider::ColliderRecord;
use crate::grass::config::DiagnosticsConfig;
use crate::grass::params::{CullParams, DrawIndexedIndirectArgs, SimParams};
use crate::grass::passes::GrassPasses;
use crate::render::buffer::GrassBuffers;
use crate::render::mesh::{BladeMesh, GpuMesh};
use crate::render::pipeline::draw::RenderTarget;
use crate::render::pipeline::{CullPipeline, GrassDrawPipeline, IndirectArgsPipeline, PhysicsPipeline};
use crate::render::readback::{read_buffer_blocking, CountReadback};

struct BindGroups {
    physics: wgpu::BindGroup,
    cull: wgpu::BindGroup,
    indirect: wgpu::BindGroup,
    draw: wgpu::BindGroup,
}

pub struct GrassRenderer {
    buffers: GrassBuffers,
    bind_groups: Option<BindGroups>,
    mesh: Option<GpuMesh>,
    physics: PhysicsPipeline,
    cull: CullPipeline,
    indirect: IndirectArgsPipeline,
    draw: GrassDrawPipeline,
    readback: Option<CountReadback>,
    log_interval: u32,
    frame: u64,
}

impl GrassRenderer {
    /// Allocate buffers for `blades` and build every pipeline.
    ///
    /// An empty blade set is valid: no buffers are created and the renderer
    /// never reports ready.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        blades: &BladeSet,
        collider_count: usize,
        mesh: &BladeMesh,
        color_format: wgpu::TextureFormat,
        diagnostics: &DiagnosticsConfig,
    ) -> Result<Self> {
        let physics = PhysicsPipeline::new(device);
        let cull = CullPipeline::new(device);
        let indirect = IndirectArgsPipeline::new(device);
        let draw = GrassDrawPipeline::new(device, color_format);
        let gpu_mesh = mesh.upload(device, queue);

        let buffers = if blades.is_empty() {
            log::info!("Grass renderer created with no blades; passes will be skipped");
            GrassBuffers::unallocated()
        } else {
            GrassBuffers::new(device, queue, blades, collider_count, mesh.index_count())?
        };

        let bind_groups = buffers.get().map(|set| BindGroups {
            physics: physics.create_bind_group(device, set),
            cull: cull.create_bind_group(device, set),
            indirect: indirect.create_bind_group(device, set),
            draw: draw.create_bind_group(device, set),
        });

        let readback = diagnostics.readback_visible_count.then(|| CountReadback::new(device));

        Ok(Self {
            buffers,
            bind_groups,
            mesh: Some(gpu_mesh),
            physics,
            cull,
            indirect,
            draw,
            readback,
            log_interval: diagnostics.log_interval_frames,
            frame: 0,
        })
    }

    pub fn buffers(&self) -> &GrassBuffers {
        &self.buffers
    }

    /// Borrow the renderer as a pass backend that records into `encoder`.
    pub fn begin_frame<'a>(
        &'a mut self,
        queue: &'a wgpu::Queue,
        encoder: &'a mut wgpu::CommandEncoder,
        target: RenderTarget<'a>,
    ) -> GpuFrame<'a> {
        GpuFrame {
            renderer: self,
            queue,
            encoder,
            target,
        }
    }

    /// Call after the frame's encoder has been submitted.
    pub fn after_submit(&mut self, device: &wgpu::Device) {
        let Some(readback) = &mut self.readback else {
            return;
        };
        readback.after_submit();
        if let Some((frame, count)) = readback.poll(device) {
            if self.log_interval > 0 && frame % self.log_interval as u64 == 0 {
                log::info!("Grass frame {frame}: {count} of {} blades visible", self.buffers.blade_count());
            }
        }
    }

    /// Latest diagnostic visible count, if readback is enabled
    pub fn latest_visible_count(&self) -> Option<u32> {
        self.readback.as_ref()?.latest().map(|(_, count)| count)
    }

    /// Release every device buffer the renderer owns: the blade set, the
    /// blade mesh and the readback staging buffer. Safe to call more than once;
    /// returns whether anything was released.
    pub fn shutdown(&mut self) -> bool {
        self.bind_groups = None;
        let mut released = self.buffers.destroy();
        if let Some(mesh) = self.mesh.take() {
            mesh.destroy();
            released = true;
        }
        if let Some(readback) = self.readback.take() {
            readback.destroy();
            released = true;
        }
        released
    }

    /// Whether any device resource is still held
    pub fn holds_resources(&self) -> bool {
        self.buffers.is_live() || self.mesh.is_some() || self.readback.is_some()
    }

    /// Blocking read of the visibility counter
    pub fn read_visible_count_blocking(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<u32> {
        let set = self.live()?;
        let bytes = read_buffer_blocking(device, queue, &set.counter, 4)?;
        Ok(bytemuck::pod_read_unaligned(&bytes[..4]))
    }

    /// Blocking read of the indirect args record
    pub fn read_args_blocking(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<DrawIndexedIndirectArgs> {
        let set = self.live()?;
        let size = std::mem::size_of::<DrawIndexedIndirectArgs>();
        let bytes = read_buffer_blocking(device, queue, &set.args, size as u64)?;
        Ok(bytemuck::pod_read_unaligned(&bytes[..size]))
    }

    /// Blocking read of every blade shape
    pub fn read_shapes_blocking(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<GpuBladeShape>> {
        let set = self.live()?;
        let bytes = read_buffer_blocking(device, queue, &set.shape, set.shape.size())?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// Blocking read of the valid slice of the visible-index buffer
    pub fn read_visible_indices_blocking(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u32>> {
        let count = self.read_visible_count_blocking(device, queue)? as usize;
        let set = self.live()?;
        let bytes = read_buffer_blocking(device, queue, &set.visible, set.visible.size())?;
        let all: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes);
        Ok(all[..count.min(all.len())].to_vec())
    }

    fn live(&self) -> Result<&crate::render::buffer::BufferSet> {
        self.buffers
            .get()
            .ok_or_else(|| Error::Gpu("grass buffers are not allocated".into()))
    }
}

/// One frame's worth of recording against a [`GrassRenderer`].
pub struct GpuFrame<'a> {
    renderer: &'a mut GrassRenderer,
    queue: &'a wgpu::Queue,
    encoder: &'a mut wgpu::CommandEncoder,
    target: RenderTarget<'a>,
}

impl GrassPasses for GpuFrame<'_> {
    fn is_ready(&self) -> bool {
        self.renderer.bind_groups.is_some() && self.renderer.mesh.is_some() && self.renderer.buffers.is_live()
    }

    fn upload_colliders(&mut self, colliders: &[ColliderRecord]) -> Result<()> {
        self.renderer.buffers.write_colliders(self.queue, colliders)
    }

    fn upload_sim_params(&mut self, params: &SimParams) {
        self.renderer.buffers.write_sim_params(self.queue, params);
    }

    fn dispatch_physics(&mut self, workgroups: u32) {
        let Some(groups) = &self.renderer.bind_groups else { return };
        self.renderer.physics.dispatch(self.encoder, &groups.physics, workgroups);
    }

    fn upload_cull_params(&mut self, params: &CullParams) {
        self.renderer.buffers.write_cull_params(self.queue, params);
    }

    fn dispatch_cull(&mut self, workgroups: u32) {
        let (Some(groups), Some(set)) = (&self.renderer.bind_groups, self.renderer.buffers.get()) else {
            return;
        };
        // Counter starts from zero every frame
        self.encoder.clear_buffer(&set.counter, 0, None);
        self.renderer.cull.dispatch(self.encoder, &groups.cull, workgroups);
    }

    fn dispatch_indirect_args(&mut self) {
        let Some(groups) = &self.renderer.bind_groups else { return };
        self.renderer.indirect.dispatch(self.encoder, &groups.indirect);
    }

    fn draw_indirect(&mut self) {
        let renderer = &mut *self.renderer;
        let (Some(groups), Some(set), Some(mesh)) = (&renderer.bind_groups, renderer.buffers.get(), &renderer.mesh)
        else {
            return;
        };
        renderer.draw.draw(self.encoder, &self.target, &groups.draw, mesh, &set.args);

        if let Some(readback) = &mut renderer.readback {
            readback.schedule(self.encoder, &set.counter, renderer.frame);
        }
        renderer.frame += 1;
    }
}
