//! Verdant - GPU-driven grass: per-blade physics, frustum culling with atomic
//! compaction and a single indirect instanced draw.

pub mod core;
pub mod math;
pub mod grass;
pub mod sim;
pub mod render;
