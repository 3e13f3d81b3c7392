//! Archive file contents
//!
//! A file holds one subtree as a depth-first list of node records. Branch
//! records are followed by their present children in slot order. A Stub is a
//! branch whose children were written to a sibling file instead.
//!
//! On disk: `lz4(size-prepended, rkyv(ArchiveData))`.

use rkyv::{Archive, Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{DVec3, Result};
use crate::math::Aabb;
use crate::octree::{NodeKind, OctreeNode};

/// Current archive format version
pub const ARCHIVE_VERSION: u32 = 1;

/// Stored node kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Archive, Deserialize, Serialize)]
pub enum RecordKind {
    Empty,
    Full,
    Leaf,
    Branch,
    /// Branch whose children live in a sibling file
    Stub,
}

/// One stored node
#[derive(Clone, Debug, PartialEq, Archive, Deserialize, Serialize)]
pub struct NodeRecord {
    pub min: [f64; 3],
    pub max: [f64; 3],
    pub depth: u8,
    pub kind: RecordKind,
    pub octant_mask: u8,
    pub corners: [f64; 8],
    /// Children that follow this record in the same file
    pub child_count: u8,
}

impl NodeRecord {
    /// Record for `node` without its children
    pub fn from_node(node: &OctreeNode, stub: bool) -> Self {
        let (kind, child_count) = match &node.kind {
            NodeKind::Empty => (RecordKind::Empty, 0),
            NodeKind::Full => (RecordKind::Full, 0),
            NodeKind::Leaf { .. } => (RecordKind::Leaf, 0),
            NodeKind::Branch { children, .. } if !stub => (RecordKind::Branch, children.len() as u8),
            NodeKind::Branch { .. } => (RecordKind::Stub, 0),
        };
        Self {
            min: node.bounds.min.to_array(),
            max: node.bounds.max.to_array(),
            depth: node.depth,
            kind,
            octant_mask: node.octant_mask(),
            corners: node.corners,
            child_count,
        }
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::new(DVec3::from_array(self.min), DVec3::from_array(self.max))
    }

    /// A deeper level exists for this node, here or in a sibling file
    pub fn has_children(&self) -> bool {
        matches!(self.kind, RecordKind::Branch | RecordKind::Stub)
    }
}

/// Contents of one archive file
#[derive(Clone, Debug, PartialEq, Archive, Deserialize, Serialize)]
pub struct ArchiveData {
    pub version: u32,
    /// File stem of the top-level archive; sibling names derive from it
    pub base: String,
    /// Model depth of the first record
    pub root_depth: u8,
    /// Octal path of the first record from the model root
    pub path: String,
    pub nodes: Vec<NodeRecord>,
}

impl ArchiveData {
    /// Index one past the last record of the subtree starting at `start`
    pub fn subtree_end(&self, start: usize) -> Result<usize> {
        let mut pending = 1usize;
        let mut i = start;
        while pending > 0 {
            let record = self
                .nodes
                .get(i)
                .ok_or_else(|| Error::Archive(format!("truncated subtree at record {}", start)))?;
            pending = pending - 1 + record.child_count as usize;
            i += 1;
        }
        Ok(i)
    }

    /// Record indices of the children of the record at `index`, in slot order
    pub fn child_indices(&self, index: usize) -> Result<Vec<usize>> {
        let record = self
            .nodes
            .get(index)
            .ok_or_else(|| Error::Archive(format!("no record {}", index)))?;
        let mut out = Vec::with_capacity(record.child_count as usize);
        let mut next = index + 1;
        for _ in 0..record.child_count {
            out.push(next);
            next = self.subtree_end(next)?;
        }
        Ok(out)
    }

    /// Check structural consistency of the record list
    pub fn validate(&self) -> Result<()> {
        if self.version != ARCHIVE_VERSION {
            return Err(Error::Archive(format!(
                "unsupported archive version {} (expected {})",
                self.version, ARCHIVE_VERSION
            )));
        }
        if self.nodes.is_empty() {
            return Err(Error::Archive("archive has no records".into()));
        }
        for (i, record) in self.nodes.iter().enumerate() {
            let expected = match record.kind {
                RecordKind::Branch => record.octant_mask.count_ones() as u8,
                _ => 0,
            };
            if record.child_count != expected {
                return Err(Error::Archive(format!(
                    "record {} has {} children but mask {:#010b}",
                    i, record.child_count, record.octant_mask
                )));
            }
        }
        if self.subtree_end(0)? != self.nodes.len() {
            return Err(Error::Archive("trailing records after root subtree".into()));
        }
        Ok(())
    }
}

/// Serialize and compress
pub fn encode(data: &ArchiveData) -> Result<Vec<u8>> {
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(data)
        .map_err(|e| Error::Archive(e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&bytes))
}

/// Decompress, deserialize and validate
pub fn decode(bytes: &[u8]) -> Result<ArchiveData> {
    let decompressed = lz4_flex::decompress_size_prepended(bytes)
        .map_err(|e| Error::Archive(format!("LZ4 decompression failed: {}", e)))?;
    let archived = rkyv::access::<ArchivedArchiveData, rkyv::rancor::Error>(&decompressed)
        .map_err(|e| Error::Archive(e.to_string()))?;
    let data: ArchiveData = rkyv::deserialize::<ArchiveData, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Archive(e.to_string()))?;
    data.validate()?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: RecordKind, mask: u8, child_count: u8) -> NodeRecord {
        NodeRecord {
            min: [0.0; 3],
            max: [1.0; 3],
            depth: 0,
            kind,
            octant_mask: mask,
            corners: [0.5; 8],
            child_count,
        }
    }

    fn two_level() -> ArchiveData {
        // Branch over 2 slots (x split), first child is itself a branch of 2
        ArchiveData {
            version: ARCHIVE_VERSION,
            base: "model".into(),
            root_depth: 0,
            path: String::new(),
            nodes: vec![
                record(RecordKind::Branch, 0b11, 2),
                record(RecordKind::Branch, 0b11, 2),
                record(RecordKind::Leaf, 0, 0),
                record(RecordKind::Empty, 0, 0),
                record(RecordKind::Stub, 0b1111_1111, 0),
            ],
        }
    }

    #[test]
    fn test_subtree_navigation() {
        let data = two_level();
        assert_eq!(data.subtree_end(0).unwrap(), 5);
        assert_eq!(data.subtree_end(1).unwrap(), 4);
        assert_eq!(data.child_indices(0).unwrap(), vec![1, 4]);
        assert!(data.validate().is_ok());
    }

    #[test]
    fn test_encode_decode() {
        let data = two_level();
        let bytes = encode(&data).unwrap();
        assert_eq!(decode(&bytes).unwrap(), data);
    }

    #[test]
    fn test_rejects_corrupt_bytes() {
        assert!(matches!(decode(&[1, 2, 3, 4, 5]), Err(Error::Archive(_))));
    }

    #[test]
    fn test_rejects_truncated_records() {
        let mut data = two_level();
        data.nodes.pop();
        assert!(matches!(data.validate(), Err(Error::Archive(_))));
    }

    #[test]
    fn test_rejects_other_version() {
        let mut data = two_level();
        data.version = 99;
        assert!(data.validate().is_err());
    }
}
