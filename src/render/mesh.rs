//! The per-instance blade mesh.
//!
//! Vertices carry only `(side, t)`: side is -1/0/+1 across the blade, t runs
//! 0..1 from base to tip. The vertex shader evaluates the blade's Bezier curve
//! at `t`, so one small mesh serves every instance.

use bytemuck::{Pod, Zeroable};

use crate::core::{Error, Result};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BladeVertex {
    pub side: f32,
    pub t: f32,
}

impl BladeVertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<BladeVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// CPU-side blade mesh
#[derive(Clone, Debug, PartialEq)]
pub struct BladeMesh {
    vertices: Vec<BladeVertex>,
    indices: Vec<u16>,
}

impl BladeMesh {
    /// Tapered strip: `segments` rows of vertex pairs closed by a tip vertex.
    ///
    /// Index count is `(segments - 1) * 6 + 3`.
    pub fn strip(segments: u16) -> Self {
        let rows = segments.max(1);
        let mut vertices = Vec::with_capacity(rows as usize * 2 + 1);
        for r in 0..rows {
            let t = r as f32 / rows as f32;
            vertices.push(BladeVertex { side: -1.0, t });
            vertices.push(BladeVertex { side: 1.0, t });
        }
        vertices.push(BladeVertex { side: 0.0, t: 1.0 });

        let mut indices = Vec::with_capacity((rows as usize - 1) * 6 + 3);
        for r in 0..rows - 1 {
            let l0 = r * 2;
            let (r0, l1, r1) = (l0 + 1, l0 + 2, l0 + 3);
            indices.extend_from_slice(&[l0, r0, l1, r0, r1, l1]);
        }
        let last = (rows - 1) * 2;
        indices.extend_from_slice(&[last, last + 1, rows * 2]);

        Self { vertices, indices }
    }

    /// Caller-supplied mesh. Rejected if empty, not a triangle list, non-finite
    /// or indexing past the vertex list.
    pub fn from_raw(vertices: Vec<BladeVertex>, indices: Vec<u16>) -> Result<Self> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(Error::Config("blade mesh is empty".into()));
        }
        if indices.len() % 3 != 0 {
            return Err(Error::Config(format!(
                "blade mesh index count {} is not a multiple of 3",
                indices.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(Error::Config(format!(
                "blade mesh index {bad} out of range for {} vertices",
                vertices.len()
            )));
        }
        if vertices.iter().any(|v| !v.side.is_finite() || !v.t.is_finite()) {
            return Err(Error::Config("blade mesh has non-finite vertices".into()));
        }
        Ok(Self { vertices, indices })
    }

    pub fn vertices(&self) -> &[BladeVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn upload(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> GpuMesh {
        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("blade_mesh_vertices"),
            size: std::mem::size_of_val(self.vertices.as_slice()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&vertex_buffer, 0, bytemuck::cast_slice(&self.vertices));

        // write_buffer needs a multiple of 4 bytes
        let mut index_data: Vec<u16> = self.indices.clone();
        if index_data.len() % 2 != 0 {
            index_data.push(0);
        }
        let index_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("blade_mesh_indices"),
            size: std::mem::size_of_val(index_data.as_slice()) as u64,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&index_buffer, 0, bytemuck::cast_slice(&index_data));

        GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: self.index_count(),
        }
    }
}

impl Default for BladeMesh {
    fn default() -> Self {
        Self::strip(7)
    }
}

/// Uploaded blade mesh
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn destroy(&self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_counts() {
        let mesh = BladeMesh::strip(7);
        assert_eq!(mesh.vertices().len(), 15);
        assert_eq!(mesh.index_count(), 39);
        assert_eq!(BladeMesh::default(), mesh);

        let single = BladeMesh::strip(1);
        assert_eq!(single.indices(), &[0, 1, 2]);
        assert_eq!(BladeMesh::strip(0), single);
    }

    #[test]
    fn test_strip_is_valid_raw_mesh() {
        let mesh = BladeMesh::strip(5);
        let rebuilt = BladeMesh::from_raw(mesh.vertices().to_vec(), mesh.indices().to_vec()).unwrap();
        assert_eq!(rebuilt, mesh);
        // Tip is the last vertex at t = 1
        assert_eq!(mesh.vertices().last(), Some(&BladeVertex { side: 0.0, t: 1.0 }));
        assert!(mesh.vertices().iter().all(|v| (0.0..=1.0).contains(&v.t)));
    }

    #[test]
    fn test_from_raw_rejects_bad_meshes() {
        let v = vec![BladeVertex::default(); 3];
        assert!(BladeMesh::from_raw(vec![], vec![0, 1, 2]).is_err());
        assert!(BladeMesh::from_raw(v.clone(), vec![0, 1]).is_err());
        assert!(BladeMesh::from_raw(v.clone(), vec![0, 1, 3]).is_err());
        let nan = vec![BladeVertex { side: f32::NAN, t: 0.0 }; 3];
        assert!(BladeMesh::from_raw(nan, vec![0, 1, 2]).is_err());
        BladeMesh::from_raw(v, vec![0, 1, 2]).unwrap();
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<BladeVertex>(), 8);
        assert_eq!(BladeVertex::layout().array_stride, 8);
    }
}
