//! Adaptive octree construction from a signed-distance shape
//!
//! Each box is classified with interval arithmetic. Empty and Full boxes stop
//! immediately; ambiguous boxes split until the depth limit or the minimum
//! cell size is reached and become surface leaves there. The root's octants
//! are built in parallel on the engine's pool, everything below an octant
//! runs sequentially on the worker that owns it.

use std::time::Instant;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::core::config::{ConstructionConfig, MAX_SUPPORTED_DEPTH};
use crate::core::context::AppContext;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::Aabb;
use crate::octree::cancel::CancelToken;
use crate::octree::node::{NodeKind, NodeState, OctreeNode, SourceDescriptor};
use crate::shape::ShapeHandle;

/// Why a recursive build stopped early
enum Interrupt {
    Cancelled,
    Failed(Error),
}

impl From<Error> for Interrupt {
    fn from(err: Error) -> Self {
        Interrupt::Failed(err)
    }
}

/// State shared by every recursive call of one build
struct BuildJob<'a> {
    shape: &'a ShapeHandle,
    depth_limit: u8,
    min_cell_size: f64,
    cancel: &'a CancelToken,
}

impl BuildJob<'_> {
    #[inline]
    fn poll(&self) -> std::result::Result<(), Interrupt> {
        if self.cancel.is_cancelled() {
            Err(Interrupt::Cancelled)
        } else {
            Ok(())
        }
    }

    fn source(&self) -> SourceDescriptor {
        SourceDescriptor::Expression(self.shape.clone())
    }

    /// Classify `bounds` and return the node if it needs no children
    fn classify(&self, bounds: Aabb, depth: u8) -> std::result::Result<NodeOrSplit, Interrupt> {
        self.poll()?;
        let c = self.shape.classify(&bounds)?;
        if c.occupancy.is_terminal() {
            let node = OctreeNode::terminal(bounds, depth, c.occupancy, c.corners);
            return Ok(NodeOrSplit::Node(node.with_source(self.source())));
        }

        let axes = bounds.split_axes(self.min_cell_size);
        if depth >= self.depth_limit || axes == 0 {
            let node = OctreeNode::leaf(bounds, depth, c.corners);
            return Ok(NodeOrSplit::Node(node.with_source(self.source())));
        }
        Ok(NodeOrSplit::Split { axes, mask: Aabb::octant_mask(axes) })
    }

    /// Sequential recursive build
    fn build_node(&self, bounds: Aabb, depth: u8) -> std::result::Result<OctreeNode, Interrupt> {
        match self.classify(bounds, depth)? {
            NodeOrSplit::Node(node) => Ok(node),
            NodeOrSplit::Split { axes, mask } => {
                let mut children = Vec::with_capacity(mask.count_ones() as usize);
                for slot in (0u8..8).filter(|s| mask & (1u8 << *s) != 0) {
                    self.poll()?;
                    children.push(self.build_node(bounds.octant(slot, axes), depth + 1)?);
                }
                Ok(self.combine(bounds, depth, mask, children))
            }
        }
    }

    fn combine(&self, bounds: Aabb, depth: u8, mask: u8, children: Vec<OctreeNode>) -> OctreeNode {
        simplify(OctreeNode::branch(bounds, depth, mask, children)).with_source(self.source())
    }
}

/// Node paths hold at most `MAX_SUPPORTED_DEPTH` levels. Splitting only
/// happens below the limit, so checked limits also keep `depth + 1` in range.
pub fn check_depth_limit(depth_limit: u8) -> Result<()> {
    if depth_limit > MAX_SUPPORTED_DEPTH {
        return Err(Error::Config(format!(
            "depth limit {} exceeds the supported maximum of {}",
            depth_limit, MAX_SUPPORTED_DEPTH
        )));
    }
    Ok(())
}

enum NodeOrSplit {
    Node(OctreeNode),
    Split { axes: u8, mask: u8 },
}

/// Collapse a branch whose children are all Empty or all Full into a single
/// terminal node. Anything else is returned unchanged.
pub fn simplify(node: OctreeNode) -> OctreeNode {
    let uniform = match &node.kind {
        NodeKind::Branch { children, .. } => {
            let first = children.first().map(OctreeNode::state);
            match first {
                Some(state @ (NodeState::Empty | NodeState::Full))
                    if children.iter().all(|c| c.state() == state) => Some(state),
                _ => None,
            }
        }
        _ => None,
    };

    match uniform {
        Some(state) => OctreeNode {
            bounds: node.bounds,
            depth: node.depth,
            corners: node.corners,
            kind: if state == NodeState::Full { NodeKind::Full } else { NodeKind::Empty },
            source: node.source,
        },
        None => node,
    }
}

/// Builds octrees on a bounded worker pool
pub struct ConstructionEngine {
    pool: ThreadPool,
    config: ConstructionConfig,
}

impl ConstructionEngine {
    /// Create an engine from the context's construction settings
    pub fn new(ctx: &AppContext) -> Result<Self> {
        Self::with_config(ctx.config.construction.clone())
    }

    pub fn with_config(config: ConstructionConfig) -> Result<Self> {
        let hardware = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let workers = match config.max_workers {
            0 => hardware,
            n => n.min(hardware),
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("octree-build-{}", i))
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;
        log::debug!("Construction pool ready with {} workers", workers);
        Ok(Self { pool, config })
    }

    /// Number of pool threads
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn config(&self) -> &ConstructionConfig {
        &self.config
    }

    /// Run `op` inside the engine's pool, e.g. to triangulate a fresh tree
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Build the tree for `shape` over `region` down to `depth_limit`.
    ///
    /// Returns `Ok(None)` if `cancel` fired; no part of the partial tree is
    /// kept. An evaluation failure anywhere aborts the whole build.
    pub fn build(
        &self,
        shape: &ShapeHandle,
        region: Aabb,
        depth_limit: u8,
        cancel: &CancelToken,
    ) -> Result<Option<OctreeNode>> {
        self.build_at(shape, region, 0, depth_limit, cancel)
    }

    /// Build a subtree whose root sits at `root_depth` in the model.
    /// Used by refine (limit = depth + 1) and collapse (limit = depth).
    pub fn build_at(
        &self,
        shape: &ShapeHandle,
        region: Aabb,
        root_depth: u8,
        depth_limit: u8,
        cancel: &CancelToken,
    ) -> Result<Option<OctreeNode>> {
        check_depth_limit(depth_limit)?;
        let start = Instant::now();
        let job = BuildJob {
            shape,
            depth_limit,
            min_cell_size: self.config.min_cell_size,
            cancel,
        };

        log::debug!("Building {} from depth {} to {}", region, root_depth, depth_limit);

        let result = match job.classify(region, root_depth) {
            Ok(NodeOrSplit::Node(node)) => Ok(node),
            Ok(NodeOrSplit::Split { axes, mask }) => self.fan_out(&job, region, root_depth, axes, mask),
            Err(interrupt) => Err(interrupt),
        };

        match result {
            Ok(node) => {
                log::info!(
                    "Built octree: {} nodes, {} leaves, depth {}..{} in {:.1}ms",
                    node.node_count(),
                    node.leaf_count(),
                    root_depth,
                    node.max_depth(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
                Ok(Some(node))
            }
            Err(Interrupt::Cancelled) => {
                log::debug!("Build of {} cancelled", region);
                Ok(None)
            }
            Err(Interrupt::Failed(err)) => {
                log::warn!("Build of {} failed: {}", region, err);
                Err(err)
            }
        }
    }

    /// Build the root's octants in parallel, one pool task each
    fn fan_out(
        &self,
        job: &BuildJob<'_>,
        region: Aabb,
        depth: u8,
        axes: u8,
        mask: u8,
    ) -> std::result::Result<OctreeNode, Interrupt> {
        let slots: Vec<u8> = (0u8..8).filter(|s| mask & (1u8 << *s) != 0).collect();
        let children: std::result::Result<Vec<OctreeNode>, Interrupt> = self.pool.install(|| {
            slots
                .par_iter()
                .map(|&slot| {
                    job.poll()?;
                    job.build_node(region.octant(slot, axes), depth + 1)
                })
                .collect()
        });
        // Join has happened; only now combine
        Ok(job.combine(region, depth, mask, children?))
    }
}
