//! Refine / collapse policy
//!
//! One pass samples importance (reusing the last sample while the camera and
//! snapshot are unchanged), then picks at most one leaf to refine and one
//! branch to collapse, shallowest first. The pass itself never mutates the
//! tree; it returns [`LodAction`]s that the scheduler runs as tasks.

use std::sync::Arc;

use crate::archive::load_subtree;
use crate::core::camera::Camera;
use crate::core::config::LodConfig;
use crate::core::context::{AppContext, HostBindings};
use crate::core::types::Result;
use crate::lod::id_render::{IdRenderer, SoftwareIdRenderer};
use crate::lod::importance::ImportanceSample;
use crate::math::Aabb;
use crate::mesh::MeshBuilder;
use crate::octree::{CancelToken, ConstructionEngine, NodeKind, NodePath, NodeState, OctreeNode, SourceDescriptor};
use crate::task::ModelSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LodOp {
    /// Replace a leaf by a subtree one level deeper
    Refine,
    /// Replace a branch by a leaf regenerated at its own depth
    Collapse,
}

/// One refine or collapse decision
#[derive(Clone, Debug)]
pub struct LodAction {
    pub op: LodOp,
    pub path: NodePath,
    pub bounds: Aabb,
    pub depth: u8,
    /// State of the target when the decision was made
    pub expected: NodeState,
    pub source: SourceDescriptor,
    /// Viewport share of the target (aggregate for branches)
    pub importance: f64,
}

impl LodAction {
    /// Regenerate the target from its source and mesh the result.
    /// `Ok(None)` if cancelled.
    pub fn execute(
        &self,
        engine: &ConstructionEngine,
        mesher: &MeshBuilder,
        cancel: &CancelToken,
    ) -> Result<Option<OctreeNode>> {
        let limit = match self.op {
            LodOp::Refine => self.depth + 1,
            LodOp::Collapse => self.depth,
        };
        let built = match &self.source {
            SourceDescriptor::Expression(shape) => {
                engine.build_at(shape, self.bounds, self.depth, limit, cancel)?
            }
            SourceDescriptor::Archive { file, path, .. } => {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                let levels = limit - self.depth;
                Some(load_subtree(file, path, levels)?)
            }
        };
        let Some(mut node) = built else {
            return Ok(None);
        };
        if cancel.is_cancelled() {
            return Ok(None);
        }
        engine.install(|| mesher.mesh_tree(&mut node));
        Ok(Some(node))
    }
}

/// Why a pass did not look at the model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    ViewHidden,
    /// A construct, export or LOD task holds the model
    LeaseHeld,
    /// No model has been built yet
    NoModel,
}

/// Outcome of one LOD pass
#[derive(Clone, Debug)]
pub enum LodPass {
    Skipped(SkipReason),
    /// Nothing to refine or collapse
    Complete,
    Act {
        refine: Option<LodAction>,
        collapse: Option<LodAction>,
    },
}

impl LodPass {
    pub fn is_complete(&self) -> bool {
        matches!(self, LodPass::Complete)
    }
}

#[derive(Default)]
struct Candidates {
    refine: Vec<LodAction>,
    collapse: Vec<LodAction>,
}

/// Keeps displayed detail matched to screen importance
pub struct LodController {
    config: LodConfig,
    host: Arc<dyn HostBindings>,
    renderer: Box<dyn IdRenderer>,
    camera: Camera,
    sample: Option<ImportanceSample>,
}

impl LodController {
    pub fn new(ctx: &AppContext) -> Self {
        Self::with_renderer(ctx, Box::new(SoftwareIdRenderer))
    }

    pub fn with_renderer(ctx: &AppContext, renderer: Box<dyn IdRenderer>) -> Self {
        Self {
            config: ctx.config.lod.clone(),
            host: ctx.host.clone(),
            renderer,
            camera: Camera::default(),
            sample: None,
        }
    }

    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Move the camera. Any change drops the current sample.
    pub fn set_camera(&mut self, mut camera: Camera) {
        camera.set_aspect(self.config.viewport.0 as f32, self.config.viewport.1 as f32);
        if camera != self.camera {
            self.camera = camera;
            self.invalidate();
        }
    }

    /// Force a fresh sample on the next pass
    pub fn invalidate(&mut self) {
        self.sample = None;
    }

    /// Current sample for `snapshot`, rendering a new one if needed
    pub fn sample(&mut self, snapshot: &ModelSnapshot) -> &ImportanceSample {
        let sample = match self.sample.take() {
            Some(sample) if sample.generation == snapshot.generation => sample,
            _ => {
                let sample = ImportanceSample::capture(
                    self.renderer.as_ref(),
                    &self.camera,
                    &snapshot.tree,
                    snapshot.generation,
                    self.config.viewport,
                );
                log::trace!(
                    "Sampled importance for generation {}: {} of {} pixels covered",
                    snapshot.generation,
                    sample.covered_pixels(),
                    sample.total_pixels()
                );
                sample
            }
        };
        self.sample.insert(sample)
    }

    /// Run one pass against `snapshot`. `lease_held` is true while another
    /// task owns the model.
    pub fn pass(&mut self, snapshot: &ModelSnapshot, lease_held: bool) -> LodPass {
        if !self.host.is_view_visible() {
            return LodPass::Skipped(SkipReason::ViewHidden);
        }
        if lease_held {
            return LodPass::Skipped(SkipReason::LeaseHeld);
        }

        self.sample(snapshot);
        let mut found = Candidates::default();
        if let Some(sample) = &self.sample {
            self.survey(&snapshot.tree, NodePath::root(), sample, &mut found);
        }

        let collapse = found
            .collapse
            .into_iter()
            .min_by(|a, b| (a.depth, a.path).cmp(&(b.depth, b.path)));
        let refine = found
            .refine
            .into_iter()
            .filter(|r| collapse.as_ref().is_none_or(|c| !c.path.contains(&r.path)))
            .min_by(|a, b| {
                a.depth
                    .cmp(&b.depth)
                    .then(b.importance.total_cmp(&a.importance))
                    .then(a.path.cmp(&b.path))
            });

        if refine.is_none() && collapse.is_none() {
            log::trace!("LOD pass complete for generation {}", snapshot.generation);
            return LodPass::Complete;
        }
        if let Some(r) = &refine {
            log::debug!("LOD refine {} (depth {}, {:.1}%)", r.path, r.depth, r.importance * 100.0);
        }
        if let Some(c) = &collapse {
            log::debug!("LOD collapse {} (depth {}, {:.2}%)", c.path, c.depth, c.importance * 100.0);
        }
        LodPass::Act { refine, collapse }
    }

    fn refinable(&self, leaf: &OctreeNode) -> bool {
        match &leaf.source {
            Some(SourceDescriptor::Expression(_)) => leaf.depth < self.config.max_depth,
            Some(SourceDescriptor::Archive { has_children, .. }) => *has_children,
            None => false,
        }
    }

    /// Collect candidates under `node`; returns its aggregate importance
    fn survey(&self, node: &OctreeNode, path: NodePath, sample: &ImportanceSample, out: &mut Candidates) -> f64 {
        match &node.kind {
            NodeKind::Empty | NodeKind::Full => 0.0,
            NodeKind::Leaf { .. } => {
                let importance = sample.leaf(&path);
                if importance > self.config.refine_threshold && self.refinable(node) {
                    if let Some(source) = node.source.clone() {
                        out.refine.push(action(LodOp::Refine, node, path, source, importance));
                    }
                }
                importance
            }
            NodeKind::Branch { .. } => {
                let importance: f64 = node
                    .slots()
                    .map(|(octant, child)| self.survey(child, path.child(octant), sample, out))
                    .sum();
                if node.depth >= self.config.base_depth && importance < self.config.collapse_threshold {
                    if let Some(source) = node.source.clone() {
                        out.collapse.push(action(LodOp::Collapse, node, path, source, importance));
                    }
                }
                importance
            }
        }
    }
}

fn action(op: LodOp, node: &OctreeNode, path: NodePath, source: SourceDescriptor, importance: f64) -> LodAction {
    LodAction {
        op,
        path,
        bounds: node.bounds,
        depth: node.depth,
        expected: node.state(),
        source,
        importance,
    }
}
