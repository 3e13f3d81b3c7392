//! Leaf meshing and chunk merging
//!
//! Chunks are built independently in parallel and stored in their leaves.
//! Merging is a single sequential pass that renumbers each chunk's indices by
//! the vertex count of the chunks before it. Vertices on chunk boundaries are
//! duplicated, not welded.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::core::types::DVec3;
use crate::math::Aabb;
use crate::mesh::chunk::{Mesh, MeshChunk};
use crate::mesh::triangulate::{MarchingTetrahedra, Triangulator};
use crate::octree::{NodeKind, OctreeNode};

/// Produces mesh chunks for leaves and merges them
pub struct MeshBuilder {
    triangulator: Box<dyn Triangulator>,
}

impl Default for MeshBuilder {
    fn default() -> Self {
        Self::new(Box::new(MarchingTetrahedra))
    }
}

impl MeshBuilder {
    pub fn new(triangulator: Box<dyn Triangulator>) -> Self {
        Self { triangulator }
    }

    /// Triangulate a single leaf. Non-leaves produce an empty chunk.
    pub fn triangulate(&self, node: &OctreeNode) -> MeshChunk {
        if !node.is_leaf() {
            return MeshChunk::default();
        }
        self.triangulator.triangulate(&node.bounds, &node.corners)
    }

    /// Triangulate every leaf that has no chunk yet, in parallel.
    /// Returns the number of leaves meshed.
    pub fn mesh_tree(&self, root: &mut OctreeNode) -> usize {
        let start = Instant::now();
        let pending: Vec<&mut OctreeNode> = root
            .leaves_mut()
            .into_iter()
            .filter(|leaf| leaf.chunk().is_none())
            .collect();
        let count = pending.len();

        pending.into_par_iter().for_each(|leaf| {
            let chunk = self.triangulator.triangulate(&leaf.bounds, &leaf.corners);
            leaf.kind = NodeKind::Leaf { chunk: Some(Arc::new(chunk)) };
        });

        log::debug!("Meshed {} leaves in {:.1}ms", count, start.elapsed().as_secs_f64() * 1000.0);
        count
    }

    /// Concatenate chunks into one mesh
    pub fn merge<'a, I>(&self, chunks: I, generation: u64) -> Mesh
    where
        I: IntoIterator<Item = &'a MeshChunk>,
    {
        merge_chunks(chunks, generation)
    }

    /// Merge every leaf chunk of `root` in depth-first order.
    /// Leaves without a chunk contribute nothing.
    pub fn merge_tree(&self, root: &OctreeNode, generation: u64) -> Mesh {
        let leaves = root.leaves();
        merge_chunks(leaves.iter().filter_map(|(_, leaf)| leaf.chunk().map(Arc::as_ref)), generation)
    }
}

/// Concatenate chunks, offsetting indices by the running vertex count
pub fn merge_chunks<'a, I>(chunks: I, generation: u64) -> Mesh
where
    I: IntoIterator<Item = &'a MeshChunk>,
{
    let mut mesh = Mesh { generation, ..Default::default() };
    let mut bounds: Option<Aabb> = None;

    for chunk in chunks {
        let base = mesh.vertices.len() as u32;
        mesh.vertices.extend_from_slice(&chunk.vertices);
        mesh.indices.extend(chunk.indices.iter().map(|i| i + base));

        for v in &chunk.vertices {
            let p = DVec3::new(v.position[0] as f64, v.position[1] as f64, v.position[2] as f64);
            match bounds.as_mut() {
                Some(b) => b.expand(p),
                None => bounds = Some(Aabb::new(p, p)),
            }
        }
    }

    mesh.bounds = bounds.unwrap_or_default();
    mesh
}
