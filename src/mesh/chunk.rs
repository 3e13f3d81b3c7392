//! Mesh data handed to rendering and export

use bytemuck::{Pod, Zeroable};

use crate::core::types::DVec3;
use crate::math::Aabb;

/// Mesh vertex - 24 bytes, position and normal
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    pub fn new(position: DVec3, normal: DVec3) -> Self {
        Self {
            position: position.as_vec3().to_array(),
            normal: normal.as_vec3().to_array(),
        }
    }
}

/// Triangles produced from a single leaf
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshChunk {
    pub vertices: Vec<Vertex>,
    /// Triangle list indexing into `vertices`
    pub indices: Vec<u32>,
}

impl MeshChunk {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Merged, drawable mesh for a whole tree.
///
/// `generation` identifies the snapshot it was built for so consumers can
/// tell a stale mesh from a current one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub generation: u64,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// Bounds of all vertex positions; zero-sized for an empty mesh
    pub bounds: Aabb,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Raw vertex bytes for GPU upload
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Raw index bytes for GPU upload
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Triangle corner positions
    pub fn triangles(&self) -> impl Iterator<Item = [[f32; 3]; 3]> + '_ {
        self.indices.chunks_exact(3).map(move |tri| {
            [
                self.vertices[tri[0] as usize].position,
                self.vertices[tri[1] as usize].position,
                self.vertices[tri[2] as usize].position,
            ]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
    }

    #[test]
    fn test_byte_views() {
        let mesh = Mesh {
            generation: 1,
            vertices: vec![Vertex::default(); 3],
            indices: vec![0, 1, 2],
            bounds: Aabb::default(),
        };
        assert_eq!(mesh.vertex_bytes().len(), 72);
        assert_eq!(mesh.index_bytes().len(), 12);
        assert_eq!(mesh.triangles().count(), 1);
    }
}
