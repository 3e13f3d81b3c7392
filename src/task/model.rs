//! Immutable model snapshots and subtree swaps
//!
//! Readers only ever hold an `Arc<ModelSnapshot>`. A refine or collapse
//! produces a [`SubtreeSwap`] off-thread; applying it builds a new snapshot
//! and never touches the old one.

use std::sync::Arc;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::mesh::{Mesh, MeshBuilder};
use crate::octree::{NodePath, NodeState, OctreeNode};

/// Versioned tree and merged mesh handed to rendering and LOD sampling
#[derive(Debug)]
pub struct ModelSnapshot {
    /// Bumped on every new snapshot
    pub generation: u64,
    /// Generation of the Construct task that produced the baseline tree
    pub shape_generation: u64,
    pub tree: Arc<OctreeNode>,
    pub mesh: Arc<Mesh>,
}

impl ModelSnapshot {
    /// Snapshot over an already meshed tree
    pub fn new(generation: u64, shape_generation: u64, tree: OctreeNode) -> Self {
        let mesh = MeshBuilder::default().merge_tree(&tree, generation);
        Self {
            generation,
            shape_generation,
            tree: Arc::new(tree),
            mesh: Arc::new(mesh),
        }
    }

    /// Apply `swap` on a copy of the tree.
    ///
    /// Returns `Ok(None)` when the swap was computed against another baseline
    /// or the target node has changed since.
    pub fn apply(&self, swap: SubtreeSwap, generation: u64) -> Result<Option<ModelSnapshot>> {
        if swap.shape_generation != self.shape_generation {
            return Ok(None);
        }
        let target = self
            .tree
            .get(&swap.path)
            .ok_or_else(|| Error::InvalidPath(format!("{} not in current tree", swap.path)))?;
        if target.state() != swap.expected || target.bounds != swap.subtree.bounds {
            return Ok(None);
        }

        let mut tree = (*self.tree).clone();
        tree.replace(&swap.path, swap.subtree)?;
        Ok(Some(ModelSnapshot::new(generation, self.shape_generation, tree)))
    }
}

/// Replacement for one node, computed off the UI thread
#[derive(Debug)]
pub struct SubtreeSwap {
    pub path: NodePath,
    /// State the target must still be in for the swap to apply
    pub expected: NodeState,
    /// Meshed replacement subtree
    pub subtree: OctreeNode,
    pub shape_generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConstructionConfig;
    use crate::core::types::DVec3;
    use crate::math::Aabb;
    use crate::octree::{CancelToken, ConstructionEngine};
    use crate::shape::Shape;

    fn snapshot() -> (ConstructionEngine, ModelSnapshot) {
        let engine = ConstructionEngine::with_config(ConstructionConfig::default()).unwrap();
        let shape = Shape::sphere(DVec3::splat(5.0), 3.0).into_handle();
        let mut tree = engine.build(&shape, Aabb::cube(10.0), 2, &CancelToken::new()).unwrap().unwrap();
        MeshBuilder::default().mesh_tree(&mut tree);
        (engine, ModelSnapshot::new(1, 1, tree))
    }

    fn refine_first_leaf(engine: &ConstructionEngine, snap: &ModelSnapshot) -> SubtreeSwap {
        let (path, leaf) = snap.tree.leaves()[0];
        let shape = leaf.source.as_ref().and_then(|s| s.shape()).unwrap().clone();
        let mut subtree = engine
            .build_at(&shape, leaf.bounds, leaf.depth, leaf.depth + 1, &CancelToken::new())
            .unwrap()
            .unwrap();
        MeshBuilder::default().mesh_tree(&mut subtree);
        SubtreeSwap {
            path,
            expected: NodeState::Leaf,
            subtree,
            shape_generation: snap.shape_generation,
        }
    }

    #[test]
    fn test_apply_builds_new_snapshot() {
        let (engine, snap) = snapshot();
        let before = snap.tree.node_count();
        let swap = refine_first_leaf(&engine, &snap);
        let path = swap.path;

        let next = snap.apply(swap, 2).unwrap().unwrap();
        assert_eq!(next.generation, 2);
        assert_eq!(next.mesh.generation, 2);
        assert_eq!(next.tree.get(&path).unwrap().state(), NodeState::Branch);
        assert!(next.tree.node_count() > before);
        // Old snapshot is untouched
        assert_eq!(snap.tree.node_count(), before);
        assert_eq!(snap.tree.get(&path).unwrap().state(), NodeState::Leaf);
    }

    #[test]
    fn test_stale_swaps_are_dropped() {
        let (engine, snap) = snapshot();

        let mut other_shape = refine_first_leaf(&engine, &snap);
        other_shape.shape_generation = 99;
        assert!(snap.apply(other_shape, 2).unwrap().is_none());

        let mut moved = refine_first_leaf(&engine, &snap);
        moved.expected = NodeState::Branch;
        assert!(snap.apply(moved, 2).unwrap().is_none());
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let (engine, snap) = snapshot();
        let mut swap = refine_first_leaf(&engine, &snap);
        swap.path = "7777777".parse().unwrap();
        assert!(matches!(snap.apply(swap, 2), Err(Error::InvalidPath(_))));
    }
}
