//! Octree nodes
//!
//! A branch owns its children outright, so dropping a branch drops its whole
//! subtree. Mesh chunks hang off leaves behind an `Arc` so cloning a tree for
//! a new snapshot shares the triangulated geometry.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::Aabb;
use crate::mesh::MeshChunk;
use crate::octree::path::NodePath;
use crate::shape::{Occupancy, ShapeHandle};

/// Coarse node state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeState {
    Empty,
    Full,
    Leaf,
    Branch,
}

/// How to regenerate a node at a different depth
#[derive(Clone)]
pub enum SourceDescriptor {
    /// Re-evaluate this shape over the node's bounds
    Expression(ShapeHandle),
    /// Reload the record at `path` (relative to the file's root) from an archive file
    Archive {
        file: PathBuf,
        path: NodePath,
        /// A deeper level is stored for this node
        has_children: bool,
    },
}

impl SourceDescriptor {
    pub fn shape(&self) -> Option<&ShapeHandle> {
        match self {
            SourceDescriptor::Expression(shape) => Some(shape),
            SourceDescriptor::Archive { .. } => None,
        }
    }
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Expression(shape) => {
                write!(f, "Expression({:p})", Arc::as_ptr(shape) as *const ())
            }
            SourceDescriptor::Archive { file, path, has_children } => f
                .debug_struct("Archive")
                .field("file", file)
                .field("path", path)
                .field("has_children", has_children)
                .finish(),
        }
    }
}

/// Node payload
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Entirely outside the shape
    Empty,
    /// Entirely inside the shape
    Full,
    /// Surface cell at the depth limit; `chunk` is filled in by the mesh builder
    Leaf { chunk: Option<Arc<MeshChunk>> },
    /// Subdivided cell. `octant_mask` bit `i` is set when slot `i` exists;
    /// `children` holds the present slots in ascending order.
    Branch { octant_mask: u8, children: Box<[OctreeNode]> },
}

/// Spatial cell of the model
#[derive(Clone, Debug)]
pub struct OctreeNode {
    pub bounds: Aabb,
    /// Depth below the model root (root = 0)
    pub depth: u8,
    /// Distance samples at the 8 corners (bit 0 = +x, 1 = +y, 2 = +z)
    pub corners: [f64; 8],
    pub kind: NodeKind,
    pub source: Option<SourceDescriptor>,
}

/// Axes split by a branch with the given octant mask
pub(crate) fn axes_of_mask(octant_mask: u8) -> u8 {
    let mut axes = 0;
    if octant_mask & (1 << 1) != 0 { axes |= 1; }
    if octant_mask & (1 << 2) != 0 { axes |= 2; }
    if octant_mask & (1 << 4) != 0 { axes |= 4; }
    axes
}

impl OctreeNode {
    /// Empty or Full node from a terminal classification.
    /// Ambiguous occupancy produces a leaf.
    pub fn terminal(bounds: Aabb, depth: u8, occupancy: Occupancy, corners: [f64; 8]) -> Self {
        let kind = match occupancy {
            Occupancy::Empty => NodeKind::Empty,
            Occupancy::Full => NodeKind::Full,
            Occupancy::Ambiguous => NodeKind::Leaf { chunk: None },
        };
        Self { bounds, depth, corners, kind, source: None }
    }

    /// Surface leaf without a mesh chunk
    pub fn leaf(bounds: Aabb, depth: u8, corners: [f64; 8]) -> Self {
        Self::terminal(bounds, depth, Occupancy::Ambiguous, corners)
    }

    /// Branch over `children`, which must be the present slots of
    /// `octant_mask` in ascending order. Corner samples are taken from the
    /// children.
    pub fn branch(bounds: Aabb, depth: u8, octant_mask: u8, children: Vec<OctreeNode>) -> Self {
        debug_assert_eq!(octant_mask.count_ones() as usize, children.len());
        let axes = axes_of_mask(octant_mask);
        let mut corners = [0.0; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let slot = i as u8 & axes;
            let index = (octant_mask & ((1u8 << slot) - 1)).count_ones() as usize;
            *corner = children[index].corners[i];
        }
        Self {
            bounds,
            depth,
            corners,
            kind: NodeKind::Branch { octant_mask, children: children.into_boxed_slice() },
            source: None,
        }
    }

    pub fn with_source(mut self, source: SourceDescriptor) -> Self {
        self.source = Some(source);
        self
    }

    pub fn state(&self) -> NodeState {
        match self.kind {
            NodeKind::Empty => NodeState::Empty,
            NodeKind::Full => NodeState::Full,
            NodeKind::Leaf { .. } => NodeState::Leaf,
            NodeKind::Branch { .. } => NodeState::Branch,
        }
    }

    /// Empty or Full
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, NodeKind::Empty | NodeKind::Full)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.kind, NodeKind::Branch { .. })
    }

    /// Children of a branch, empty otherwise
    pub fn children(&self) -> &[OctreeNode] {
        match &self.kind {
            NodeKind::Branch { children, .. } => children,
            _ => &[],
        }
    }

    /// Octant slots present; zero for non-branches
    pub fn octant_mask(&self) -> u8 {
        match self.kind {
            NodeKind::Branch { octant_mask, .. } => octant_mask,
            _ => 0,
        }
    }

    /// Present slots paired with their child
    pub fn slots(&self) -> impl Iterator<Item = (u8, &OctreeNode)> {
        let mask = self.octant_mask();
        (0u8..8)
            .filter(move |slot| mask & (1u8 << *slot) != 0)
            .zip(self.children().iter())
    }

    fn slot_index(&self, octant: u8) -> Option<usize> {
        let mask = self.octant_mask();
        if octant >= 8 || mask & (1 << octant) == 0 {
            return None;
        }
        Some((mask & ((1u8 << octant) - 1)).count_ones() as usize)
    }

    /// Child in slot `octant`
    pub fn child(&self, octant: u8) -> Option<&OctreeNode> {
        let index = self.slot_index(octant)?;
        self.children().get(index)
    }

    fn child_mut(&mut self, octant: u8) -> Option<&mut OctreeNode> {
        let index = self.slot_index(octant)?;
        match &mut self.kind {
            NodeKind::Branch { children, .. } => children.get_mut(index),
            _ => None,
        }
    }

    /// Mesh chunk of a meshed leaf
    pub fn chunk(&self) -> Option<&Arc<MeshChunk>> {
        match &self.kind {
            NodeKind::Leaf { chunk } => chunk.as_ref(),
            _ => None,
        }
    }

    /// Node at `path` below this one
    pub fn get(&self, path: &NodePath) -> Option<&OctreeNode> {
        path.octants().try_fold(self, |node, octant| node.child(octant))
    }

    pub fn get_mut(&mut self, path: &NodePath) -> Option<&mut OctreeNode> {
        path.octants().try_fold(self, |node, octant| node.child_mut(octant))
    }

    /// Replace the node at `path`, returning the old one
    pub fn replace(&mut self, path: &NodePath, node: OctreeNode) -> Result<OctreeNode> {
        let slot = self
            .get_mut(path)
            .ok_or_else(|| Error::InvalidPath(format!("no node at {}", path)))?;
        Ok(std::mem::replace(slot, node))
    }

    /// Visit every node depth-first (parents before children)
    pub fn visit<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(NodePath, &'a OctreeNode),
    {
        self.visit_from(NodePath::root(), f);
    }

    fn visit_from<'a, F>(&'a self, path: NodePath, f: &mut F)
    where
        F: FnMut(NodePath, &'a OctreeNode),
    {
        f(path, self);
        for (slot, child) in self.slots() {
            child.visit_from(path.child(slot), f);
        }
    }

    /// Leaves with their paths, in depth-first order
    pub fn leaves(&self) -> Vec<(NodePath, &OctreeNode)> {
        let mut out = Vec::new();
        self.visit(&mut |path, node| {
            if node.is_leaf() {
                out.push((path, node));
            }
        });
        out
    }

    /// Mutable references to every leaf
    pub fn leaves_mut(&mut self) -> Vec<&mut OctreeNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_leaf() {
                out.push(node);
            } else if let NodeKind::Branch { children, .. } = &mut node.kind {
                stack.extend(children.iter_mut());
            }
        }
        out
    }

    /// Total nodes in this subtree, including self
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(OctreeNode::node_count).sum::<usize>()
    }

    pub fn leaf_count(&self) -> usize {
        match self.kind {
            NodeKind::Leaf { .. } => 1,
            NodeKind::Branch { .. } => self.children().iter().map(OctreeNode::leaf_count).sum(),
            _ => 0,
        }
    }

    /// Deepest node depth in this subtree
    pub fn max_depth(&self) -> u8 {
        self.children()
            .iter()
            .map(OctreeNode::max_depth)
            .max()
            .unwrap_or(self.depth)
    }

    /// Bounds of every non-branch node; these tile the root
    pub fn cells(&self) -> Vec<Aabb> {
        let mut out = Vec::new();
        self.visit(&mut |_, node| {
            if !node.is_branch() {
                out.push(node.bounds);
            }
        });
        out
    }
}
