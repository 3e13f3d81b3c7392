//! Surface extraction from octree leaves

pub mod builder;
pub mod chunk;
pub mod stl;
pub mod triangulate;

pub use builder::{merge_chunks, MeshBuilder};
pub use chunk::{Mesh, MeshChunk, Vertex};
pub use stl::{export_stl, write_stl};
pub use triangulate::{MarchingTetrahedra, Triangulator};
