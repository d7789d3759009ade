//! The four per-frame passes as a backend-neutral trait.
//!
//! [`GrassField::frame`](crate::grass::field::GrassField::frame) calls these in
//! a fixed order. A backend must make each pass observe the results of the
//! previous one.

use crate::core::Result;
use crate::grass::collider::ColliderRecord;
use crate::grass::params::{CullParams, SimParams};

pub trait GrassPasses {
    /// True once every buffer the passes touch exists.
    fn is_ready(&self) -> bool;

    /// Replace the object-space collider list. The count must match the
    /// count the backend was created with.
    fn upload_colliders(&mut self, colliders: &[ColliderRecord]) -> Result<()>;

    fn upload_sim_params(&mut self, params: &SimParams);

    /// Advance every blade's shape. `workgroups` is never 0.
    fn dispatch_physics(&mut self, workgroups: u32);

    fn upload_cull_params(&mut self, params: &CullParams);

    /// Reset the visibility counter and compact visible blade indices.
    fn dispatch_cull(&mut self, workgroups: u32);

    /// Copy the visibility counter into the indirect instance count.
    fn dispatch_indirect_args(&mut self);

    /// One indirect instanced draw of the visible blades.
    fn draw_indirect(&mut self);
}
