//! Indirect-args kernel (host reference for grass_indirect.wgsl).

use std::sync::atomic::{AtomicU32, Ordering};

use crate::grass::params::DrawIndexedIndirectArgs;

/// Copy the visibility counter into `instance_count`; other fields are untouched.
pub fn write_instance_count(counter: &AtomicU32, args: &mut DrawIndexedIndirectArgs) {
    args.instance_count = counter.load(Ordering::Acquire);
}
