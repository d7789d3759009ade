//! CPU reference backend.
//!
//! Runs the same kernels as the shaders across a rayon work grid. Used by the
//! headless `simulate` binary, the benches, and every property test.

pub mod cull;
pub mod indirect;
pub mod physics;

use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::{Error, Result};
use crate::grass::blade::BladeSet;
use crate::grass::collider::ColliderRecord;
use crate::grass::params::{CullParams, DrawIndexedIndirectArgs, SimParams};
use crate::grass::passes::GrassPasses;

/// Host-memory buffer set plus the four passes.
pub struct CpuPasses {
    blades: BladeSet,
    collider_capacity: usize,
    colliders: Vec<ColliderRecord>,
    sim_params: SimParams,
    cull_params: CullParams,
    visible: Vec<AtomicU32>,
    counter: AtomicU32,
    args: DrawIndexedIndirectArgs,
    drawn: Vec<u32>,
}

impl CpuPasses {
    /// `collider_count` is fixed for the lifetime of the backend.
    pub fn new(blades: BladeSet, collider_count: usize, index_count: u32) -> Self {
        let visible = (0..blades.len()).map(|_| AtomicU32::new(0)).collect();
        Self {
            blades,
            collider_capacity: collider_count,
            colliders: Vec::with_capacity(collider_count),
            sim_params: SimParams::default(),
            cull_params: CullParams::default(),
            visible,
            counter: AtomicU32::new(0),
            args: DrawIndexedIndirectArgs::for_mesh(index_count),
            drawn: Vec::new(),
        }
    }

    pub fn blades(&self) -> &BladeSet {
        &self.blades
    }

    /// Current value of the visibility counter
    pub fn visible_count(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    /// The valid slice of the visible-index buffer, in compaction order
    pub fn visible_indices(&self) -> Vec<u32> {
        let count = (self.visible_count() as usize).min(self.visible.len());
        self.visible[..count]
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .collect()
    }

    pub fn args(&self) -> &DrawIndexedIndirectArgs {
        &self.args
    }

    /// Blade indices resolved by the last draw, one per instance id
    pub fn drawn(&self) -> &[u32] {
        &self.drawn
    }
}

impl GrassPasses for CpuPasses {
    fn is_ready(&self) -> bool {
        true
    }

    fn upload_colliders(&mut self, colliders: &[ColliderRecord]) -> Result<()> {
        if colliders.len() != self.collider_capacity {
            return Err(Error::BufferSize {
                name: "colliders",
                expected: self.collider_capacity,
                actual: colliders.len(),
            });
        }
        self.colliders.clear();
        self.colliders.extend_from_slice(colliders);
        Ok(())
    }

    fn upload_sim_params(&mut self, params: &SimParams) {
        self.sim_params = *params;
    }

    fn dispatch_physics(&mut self, workgroups: u32) {
        let (rest, shape, force) = self.blades.split_mut();
        physics::dispatch(workgroups, rest, shape, force, &self.sim_params, &self.colliders);
    }

    fn upload_cull_params(&mut self, params: &CullParams) {
        self.cull_params = *params;
    }

    fn dispatch_cull(&mut self, workgroups: u32) {
        cull::dispatch(
            workgroups,
            &self.cull_params,
            self.blades.rest(),
            self.blades.shape(),
            &self.visible,
            &self.counter,
        );
    }

    fn dispatch_indirect_args(&mut self) {
        indirect::write_instance_count(&self.counter, &mut self.args);
    }

    fn draw_indirect(&mut self) {
        // instance id -> visible slot -> blade index
        let first = self.args.first_instance as usize;
        let count = self.args.instance_count as usize;
        self.drawn = (first..first + count)
            .filter_map(|id| self.visible.get(id))
            .map(|slot| slot.load(Ordering::Relaxed))
            .collect();
    }
}
