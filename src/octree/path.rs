//! Node addresses
//!
//! A path is the sequence of octant slots from the root down to a node,
//! packed 3 bits per level into a `u64` (level 1 in the low bits).

use std::fmt;
use std::str::FromStr;

use crate::core::config::MAX_SUPPORTED_DEPTH;
use crate::core::error::Error;

/// Address of a node relative to some root
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath {
    depth: u8,
    bits: u64,
}

impl NodePath {
    /// The root itself
    pub const fn root() -> Self {
        Self { depth: 0, bits: 0 }
    }

    /// Number of levels below the root
    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    /// Octant slot taken at `level` (1-based)
    pub fn octant_at(&self, level: u8) -> u8 {
        debug_assert!(level >= 1 && level <= self.depth);
        ((self.bits >> ((level - 1) as u32 * 3)) & 7) as u8
    }

    /// Octant slots from the root downward
    pub fn octants(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=self.depth).map(move |level| self.octant_at(level))
    }

    /// Path to child `octant` of this node
    pub fn child(&self, octant: u8) -> Self {
        assert!(self.depth < MAX_SUPPORTED_DEPTH, "path deeper than {}", MAX_SUPPORTED_DEPTH);
        debug_assert!(octant < 8);
        Self {
            depth: self.depth + 1,
            bits: self.bits | ((octant as u64 & 7) << (self.depth as u32 * 3)),
        }
    }

    /// Path to the parent, `None` at the root
    pub fn parent(&self) -> Option<Self> {
        if self.depth == 0 {
            return None;
        }
        let depth = self.depth - 1;
        let mask = (1u64 << (depth as u32 * 3)) - 1;
        Some(Self { depth, bits: self.bits & mask })
    }

    /// True if `other` is this node or lies inside its subtree
    pub fn contains(&self, other: &NodePath) -> bool {
        if other.depth < self.depth {
            return false;
        }
        let mask = (1u64 << (self.depth as u32 * 3)) - 1;
        other.bits & mask == self.bits
    }

    /// Append `rel` below this path
    pub fn join(&self, rel: &NodePath) -> Self {
        rel.octants().fold(*self, |path, octant| path.child(octant))
    }

    /// Remainder of this path below `ancestor`
    pub fn strip_prefix(&self, ancestor: &NodePath) -> Option<Self> {
        if !ancestor.contains(self) {
            return None;
        }
        let shift = ancestor.depth as u32 * 3;
        Some(Self {
            depth: self.depth - ancestor.depth,
            bits: self.bits >> shift,
        })
    }

    /// One octal digit per level, root first. Empty for the root.
    pub fn digits(&self) -> String {
        self.octants().map(|o| char::from(b'0' + o)).collect()
    }
}

impl FromStr for NodePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > MAX_SUPPORTED_DEPTH as usize {
            return Err(Error::InvalidPath(format!("'{}' is deeper than {}", s, MAX_SUPPORTED_DEPTH)));
        }
        s.bytes().try_fold(NodePath::root(), |path, b| match b {
            b'0'..=b'7' => Ok(path.child(b - b'0')),
            _ => Err(Error::InvalidPath(format!("'{}' is not an octal path", s))),
        })
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.digits())
        }
    }
}
