//! GPU backend: device context, buffers, pipelines and the per-frame renderer

pub mod buffer;
pub mod context;
pub mod mesh;
pub mod pipeline;
pub mod readback;
pub mod renderer;

pub use context::GpuContext;
pub use mesh::{BladeMesh, BladeVertex, GpuMesh};
pub use pipeline::{create_depth_view, RenderTarget};
pub use renderer::{GpuFrame, GrassRenderer};
