//! GPU-driven grass field.
//!
//! Blades are stored struct-of-arrays and advanced every frame by four passes:
//! physics, visibility culling with atomic compaction, indirect-args
//! generation, and one indirect instanced draw. [`GrassField`] sequences the
//! passes against any [`GrassPasses`] backend.

pub mod blade;
pub mod collider;
pub mod config;
pub mod field;
pub mod params;
pub mod passes;

pub use blade::{BladeAnchor, BladeSet, GpuBladeRest, GpuBladeShape};
pub use collider::{ColliderRecord, ColliderSet, SphereCollider};
pub use config::GrassConfig;
pub use field::{FrameInput, FrameReport, GrassField, SkipReason};
pub use params::{CameraView, CullParams, DrawIndexedIndirectArgs, SimParams};
pub use passes::GrassPasses;
