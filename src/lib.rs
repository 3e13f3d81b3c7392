//! Solidtree - interactive octree construction and level of detail for
//! signed-distance solid models

pub mod core;
pub mod math;
pub mod shape;
pub mod octree;
pub mod mesh;
pub mod archive;
pub mod lod;
pub mod task;
