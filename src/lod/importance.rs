//! Screen-space importance of leaves

use std::collections::HashMap;

use crate::core::camera::Camera;
use crate::lod::id_render::IdRenderer;
use crate::octree::{NodePath, OctreeNode};

/// Per-leaf viewport coverage taken from one identifier render
#[derive(Clone, Debug, PartialEq)]
pub struct ImportanceSample {
    /// Snapshot generation the sample was taken from
    pub generation: u64,
    total_pixels: u64,
    coverage: HashMap<NodePath, u64>,
}

impl ImportanceSample {
    /// Render the meshed leaves of `tree` and count the pixels each covers
    pub fn capture(
        renderer: &dyn IdRenderer,
        camera: &Camera,
        tree: &OctreeNode,
        generation: u64,
        viewport: (u32, u32),
    ) -> Self {
        let leaves: Vec<_> = tree
            .leaves()
            .into_iter()
            .filter_map(|(path, leaf)| leaf.chunk().map(|chunk| (path, chunk.as_ref())))
            .collect();
        let chunks: Vec<_> = leaves.iter().map(|(_, chunk)| *chunk).collect();

        let buffer = renderer.render(camera, &chunks, viewport.0, viewport.1);
        let counts = buffer.histogram(leaves.len() as u32);
        let coverage = leaves
            .iter()
            .zip(counts.iter().skip(1))
            .filter(|(_, n)| **n > 0)
            .map(|((path, _), n)| (*path, *n))
            .collect();

        Self {
            generation,
            total_pixels: buffer.pixel_count(),
            coverage,
        }
    }

    pub fn total_pixels(&self) -> u64 {
        self.total_pixels
    }

    /// Pixels covered by any leaf
    pub fn covered_pixels(&self) -> u64 {
        self.coverage.values().sum()
    }

    /// Share of the viewport covered by the leaf at `path`
    pub fn leaf(&self, path: &NodePath) -> f64 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        self.coverage.get(path).copied().unwrap_or(0) as f64 / self.total_pixels as f64
    }

    /// Share of the viewport covered by every leaf under `path`
    pub fn subtree(&self, path: &NodePath) -> f64 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        let pixels: u64 = self
            .coverage
            .iter()
            .filter(|(leaf, _)| path.contains(leaf))
            .map(|(_, n)| n)
            .sum();
        pixels as f64 / self.total_pixels as f64
    }
}
