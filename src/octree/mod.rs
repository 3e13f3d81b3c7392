//! Octree of distance samples and its construction engine

pub mod builder;
pub mod cancel;
pub mod node;
pub mod path;

pub use builder::{check_depth_limit, simplify, ConstructionEngine};
pub use cancel::CancelToken;
pub use node::{NodeKind, NodeState, OctreeNode, SourceDescriptor};
pub use path::NodePath;
