//! Leaf triangulation from corner samples
//!
//! Each leaf cube is cut into 6 tetrahedra around the 0-7 diagonal. Every
//! cube in the tree uses the same cut, so the diagonals on shared faces agree
//! and neighbouring leaves produce matching edges. Crossing points are always
//! interpolated from the lexicographically smaller endpoint, so two leaves
//! sharing an edge compute bit-identical positions.

use std::collections::HashMap;

use crate::core::types::DVec3;
use crate::math::Aabb;
use crate::mesh::chunk::{MeshChunk, Vertex};

/// Turns a leaf's box and corner samples into triangles
pub trait Triangulator: Send + Sync {
    fn triangulate(&self, bounds: &Aabb, corners: &[f64; 8]) -> MeshChunk;
}

/// Cube split along the 0-7 diagonal
const TETRAHEDRA: [[u8; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

/// Marching tetrahedra over the 8 corner samples of a leaf
#[derive(Clone, Copy, Debug, Default)]
pub struct MarchingTetrahedra;

/// Per-leaf triangulation state
struct CellMesher<'a> {
    bounds: &'a Aabb,
    corners: &'a [f64; 8],
    positions: [DVec3; 8],
    /// Crossing vertex per cube edge (corner pair, low index first)
    edge_vertices: HashMap<(u8, u8), u32>,
    chunk: MeshChunk,
}

impl<'a> CellMesher<'a> {
    fn new(bounds: &'a Aabb, corners: &'a [f64; 8]) -> Self {
        let mut positions = [DVec3::ZERO; 8];
        for (i, p) in positions.iter_mut().enumerate() {
            *p = bounds.corner(i as u8);
        }
        Self {
            bounds,
            corners,
            positions,
            edge_vertices: HashMap::new(),
            chunk: MeshChunk::default(),
        }
    }

    fn inside(&self, corner: u8) -> bool {
        self.corners[corner as usize] < 0.0
    }

    /// Surface crossing on the edge between two corners
    fn crossing(&self, a: u8, b: u8) -> DVec3 {
        let (pa, pb) = (self.positions[a as usize], self.positions[b as usize]);
        let (va, vb) = (self.corners[a as usize], self.corners[b as usize]);
        let ((p0, v0), (p1, v1)) = if pa.to_array() <= pb.to_array() {
            ((pa, va), (pb, vb))
        } else {
            ((pb, vb), (pa, va))
        };
        let t = (v0 / (v0 - v1)).clamp(0.0, 1.0);
        p0 + (p1 - p0) * t
    }

    /// Gradient of the trilinear interpolant of the corner samples at `p`
    fn gradient(&self, p: DVec3) -> DVec3 {
        let size = self.bounds.size();
        let u = (p - self.bounds.min) / size;
        let mut g = DVec3::ZERO;
        for i in 0..8u8 {
            let c = self.corners[i as usize];
            let (sx, wx) = if i & 1 != 0 { (1.0, u.x) } else { (-1.0, 1.0 - u.x) };
            let (sy, wy) = if i & 2 != 0 { (1.0, u.y) } else { (-1.0, 1.0 - u.y) };
            let (sz, wz) = if i & 4 != 0 { (1.0, u.z) } else { (-1.0, 1.0 - u.z) };
            g.x += c * sx * wy * wz;
            g.y += c * wx * sy * wz;
            g.z += c * wx * wy * sz;
        }
        g / size
    }

    fn edge_vertex(&mut self, a: u8, b: u8) -> u32 {
        let key = (a.min(b), a.max(b));
        if let Some(&index) = self.edge_vertices.get(&key) {
            return index;
        }
        let position = self.crossing(a, b);
        let normal = self.gradient(position).normalize_or_zero();
        let index = self.chunk.vertices.len() as u32;
        self.chunk.vertices.push(Vertex::new(position, normal));
        self.edge_vertices.insert(key, index);
        index
    }

    /// Emit a triangle facing away from the inside corner `inner`
    fn triangle(&mut self, edges: [(u8, u8); 3], inner: u8) {
        let ids = edges.map(|(a, b)| self.edge_vertex(a, b));
        let p = ids.map(|i| {
            let v = self.chunk.vertices[i as usize].position;
            DVec3::new(v[0] as f64, v[1] as f64, v[2] as f64)
        });
        let normal = (p[1] - p[0]).cross(p[2] - p[0]);
        let toward_inside = self.positions[inner as usize] - p[0];
        if normal.dot(toward_inside) > 0.0 {
            self.chunk.indices.extend_from_slice(&[ids[0], ids[2], ids[1]]);
        } else {
            self.chunk.indices.extend_from_slice(&ids);
        }
    }

    fn tetrahedron(&mut self, tet: [u8; 4]) {
        let (inside, outside): (Vec<u8>, Vec<u8>) = tet.iter().partition(|&&c| self.inside(c));
        match (inside.as_slice(), outside.as_slice()) {
            ([i], [a, b, c]) => {
                self.triangle([(*i, *a), (*i, *b), (*i, *c)], *i);
            }
            ([a, b, c], [o]) => {
                self.triangle([(*o, *a), (*o, *b), (*o, *c)], *a);
            }
            ([i, j], [k, l]) => {
                // Quad i-k, i-l, j-l, j-k split along i-k / j-l
                self.triangle([(*i, *k), (*i, *l), (*j, *l)], *i);
                self.triangle([(*i, *k), (*j, *l), (*j, *k)], *j);
            }
            _ => {}
        }
    }
}

impl Triangulator for MarchingTetrahedra {
    fn triangulate(&self, bounds: &Aabb, corners: &[f64; 8]) -> MeshChunk {
        if corners.iter().all(|&v| v < 0.0) || corners.iter().all(|&v| v >= 0.0) {
            return MeshChunk::default();
        }
        let mut mesher = CellMesher::new(bounds, corners);
        for tet in TETRAHEDRA {
            mesher.tetrahedron(tet);
        }
        mesher.chunk
    }
}
