//! Saving and loading trees as archive files
//!
//! With `levels_per_file = Some(n)`, branches `n` levels below a file's root
//! are written as stubs and their subtree goes to a sibling file named
//! `<base>_<path digits>.<ext>` next to the top-level file. Loading stops at
//! stubs unless asked to follow them, so deep levels stay on disk until a
//! refine step needs them.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::archive::format::{self, ArchiveData, NodeRecord, RecordKind, ARCHIVE_VERSION};
use crate::core::config::ArchiveConfig;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::octree::{CancelToken, NodePath, OctreeNode, SourceDescriptor};
use crate::shape::Occupancy;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to a temp file in the target directory, then rename it
/// into place. The temp file is removed on failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Archive(format!("{} has no file name", path.display())))?;
    let temp = dir.join(format!(
        ".{}.{}-{}.tmp",
        name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let result = (|| -> Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&temp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    result
}

/// Path of the sibling file holding the subtree at `path`
pub fn sibling_path(dir: &Path, base: &str, path: &NodePath, ext: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", base, path.digits(), ext))
}

fn file_parts(file: &Path, config: &ArchiveConfig) -> Result<(PathBuf, String, String)> {
    let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
    let base = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Archive(format!("{} has no file name", file.display())))?;
    let ext = file
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| config.extension.clone());
    Ok((dir, base, ext))
}

/// Read and decode one archive file
pub fn read_archive(file: &Path) -> Result<ArchiveData> {
    let bytes = std::fs::read(file)?;
    format::decode(&bytes).map_err(|e| match e {
        Error::Archive(msg) => Error::Archive(format!("{}: {}", file.display(), msg)),
        other => other,
    })
}

struct Saver<'a> {
    dir: PathBuf,
    base: String,
    ext: String,
    levels_per_file: Option<u8>,
    cancel: &'a CancelToken,
    written: Vec<PathBuf>,
}

impl Saver<'_> {
    fn collect<'n>(
        &self,
        node: &'n OctreeNode,
        path: NodePath,
        level: u8,
        records: &mut Vec<NodeRecord>,
        spill: &mut Vec<(&'n OctreeNode, NodePath)>,
    ) {
        let stub = node.is_branch() && self.levels_per_file.is_some_and(|n| level >= n);
        records.push(NodeRecord::from_node(node, stub));
        if stub {
            spill.push((node, path));
            return;
        }
        for (slot, child) in node.slots() {
            self.collect(child, path.child(slot), level + 1, records, spill);
        }
    }

    /// Write the file for `node` and, first, all its sibling files.
    /// Returns false if cancelled.
    fn write_file(&mut self, node: &OctreeNode, path: NodePath, file: &Path) -> Result<bool> {
        let mut records = Vec::new();
        let mut spill = Vec::new();
        self.collect(node, path, 0, &mut records, &mut spill);

        for (child, child_path) in spill {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            let sibling = sibling_path(&self.dir, &self.base, &child_path, &self.ext);
            if !self.write_file(child, child_path, &sibling)? {
                return Ok(false);
            }
        }
        if self.cancel.is_cancelled() {
            return Ok(false);
        }

        let data = ArchiveData {
            version: ARCHIVE_VERSION,
            base: self.base.clone(),
            root_depth: node.depth,
            path: path.digits(),
            nodes: records,
        };
        write_atomic(file, &format::encode(&data)?)?;
        self.written.push(file.to_path_buf());
        Ok(true)
    }
}

/// Save `root` (at `root_path` in the model) to `file` and its siblings.
///
/// Returns the written files, or `None` if `cancel` fired; in both the
/// cancelled and the failed case every file written so far is removed.
pub fn save_tree(
    root: &OctreeNode,
    root_path: NodePath,
    file: &Path,
    config: &ArchiveConfig,
    cancel: &CancelToken,
) -> Result<Option<Vec<PathBuf>>> {
    let (dir, base, ext) = file_parts(file, config)?;
    let mut saver = Saver {
        dir,
        base,
        ext,
        levels_per_file: config.levels_per_file,
        cancel,
        written: Vec::new(),
    };

    match saver.write_file(root, root_path, file) {
        Ok(true) => {
            log::info!(
                "Saved archive {} ({} files, {} nodes)",
                file.display(),
                saver.written.len(),
                root.node_count()
            );
            Ok(Some(saver.written))
        }
        result => {
            for path in &saver.written {
                let _ = std::fs::remove_file(path);
            }
            result.map(|_| {
                log::debug!("Archive save to {} cancelled", file.display());
                None
            })
        }
    }
}

struct Loader<'a> {
    data: ArchiveData,
    file: &'a Path,
    dir: PathBuf,
    ext: String,
    /// Load sibling files when a stub is reached with levels left
    cross_files: bool,
}

impl<'a> Loader<'a> {
    fn open(file: &'a Path, cross_files: bool) -> Result<Self> {
        let data = read_archive(file)?;
        let (dir, _, ext) = file_parts(file, &ArchiveConfig::default())?;
        Ok(Self { data, file, dir, ext, cross_files })
    }

    fn source(&self, rel: NodePath, has_children: bool) -> SourceDescriptor {
        SourceDescriptor::Archive {
            file: self.file.to_path_buf(),
            path: rel,
            has_children,
        }
    }

    /// Record index of the node at `rel`
    fn find(&self, rel: &NodePath) -> Result<usize> {
        let mut index = 0;
        for octant in rel.octants() {
            let record = &self.data.nodes[index];
            if record.kind != RecordKind::Branch || record.octant_mask & (1 << octant) == 0 {
                return Err(Error::InvalidPath(format!("{} not in {}", rel, self.file.display())));
            }
            let slot = (record.octant_mask & ((1u8 << octant) - 1)).count_ones() as usize;
            index = self.data.child_indices(index)?[slot];
        }
        Ok(index)
    }

    fn node_at(&self, index: usize, rel: NodePath, levels: u8) -> Result<OctreeNode> {
        let record = &self.data.nodes[index];
        let bounds = record.bounds();
        let node = match record.kind {
            RecordKind::Empty => OctreeNode::terminal(bounds, record.depth, Occupancy::Empty, record.corners)
                .with_source(self.source(rel, false)),
            RecordKind::Full => OctreeNode::terminal(bounds, record.depth, Occupancy::Full, record.corners)
                .with_source(self.source(rel, false)),
            RecordKind::Leaf => OctreeNode::leaf(bounds, record.depth, record.corners)
                .with_source(self.source(rel, false)),
            RecordKind::Branch if levels == 0 => OctreeNode::leaf(bounds, record.depth, record.corners)
                .with_source(self.source(rel, true)),
            RecordKind::Branch => {
                let mut children = Vec::with_capacity(record.child_count as usize);
                let slots = (0u8..8).filter(|s| record.octant_mask & (1u8 << *s) != 0);
                for (slot, child) in slots.zip(self.data.child_indices(index)?) {
                    children.push(self.node_at(child, rel.child(slot), levels - 1)?);
                }
                let mut node = OctreeNode::branch(bounds, record.depth, record.octant_mask, children);
                node.corners = record.corners;
                node.with_source(self.source(rel, true))
            }
            RecordKind::Stub => {
                let model_path = self.model_path()?.join(&rel);
                let sibling = sibling_path(&self.dir, &self.data.base, &model_path, &self.ext);
                if levels > 0 && self.cross_files {
                    let loader = Loader::open(&sibling, true)?;
                    return loader.node_at(0, NodePath::root(), levels);
                }
                OctreeNode::leaf(bounds, record.depth, record.corners).with_source(SourceDescriptor::Archive {
                    file: sibling,
                    path: NodePath::root(),
                    has_children: true,
                })
            }
        };
        Ok(node)
    }

    fn model_path(&self) -> Result<NodePath> {
        self.data.path.parse()
    }
}

/// Load every node stored in `file`. Stubs become leaves whose source points
/// at their sibling file.
pub fn load_tree(file: &Path) -> Result<OctreeNode> {
    let loader = Loader::open(file, false)?;
    let root = loader.node_at(0, NodePath::root(), u8::MAX)?;
    log::info!("Loaded archive {} ({} nodes)", file.display(), root.node_count());
    Ok(root)
}

/// Load the whole tree, following every sibling file
pub fn load_tree_full(file: &Path) -> Result<OctreeNode> {
    let loader = Loader::open(file, true)?;
    loader.node_at(0, NodePath::root(), u8::MAX)
}

/// Load the node at `rel` inside `file` with `levels` levels of children.
/// Branches at the cut become leaves that remember a deeper level exists.
pub fn load_subtree(file: &Path, rel: &NodePath, levels: u8) -> Result<OctreeNode> {
    let loader = Loader::open(file, true)?;
    let index = loader.find(rel)?;
    loader.node_at(index, *rel, levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConstructionConfig;
    use crate::core::types::DVec3;
    use crate::math::Aabb;
    use crate::mesh::MeshBuilder;
    use crate::octree::{ConstructionEngine, NodeState};
    use crate::shape::Shape;

    fn sphere_tree(depth: u8) -> OctreeNode {
        let engine = ConstructionEngine::with_config(ConstructionConfig::default()).unwrap();
        let shape = Shape::sphere(DVec3::splat(5.0), 3.0).into_handle();
        engine.build(&shape, Aabb::cube(10.0), depth, &CancelToken::new()).unwrap().unwrap()
    }

    fn mesh_counts(root: &OctreeNode) -> (usize, usize) {
        let builder = MeshBuilder::default();
        let mut root = root.clone();
        builder.mesh_tree(&mut root);
        let mesh = builder.merge_tree(&root, 0);
        (mesh.vertex_count(), mesh.triangle_count())
    }

    #[test]
    fn test_round_trip_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sphere.sto");
        let tree = sphere_tree(4);
        let written = save_tree(&tree, NodePath::root(), &file, &ArchiveConfig::default(), &CancelToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(written, vec![file.clone()]);

        let loaded = load_tree(&file).unwrap();
        assert_eq!(loaded.node_count(), tree.node_count());
        assert_eq!(loaded.leaf_count(), tree.leaf_count());
        assert_eq!(mesh_counts(&loaded), mesh_counts(&tree));
    }

    #[test]
    fn test_round_trip_split_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sphere.sto");
        let tree = sphere_tree(4);
        let config = ArchiveConfig { levels_per_file: Some(2), ..Default::default() };
        let written = save_tree(&tree, NodePath::root(), &file, &config, &CancelToken::new())
            .unwrap()
            .unwrap();
        assert!(written.len() > 1);
        assert_eq!(written.last(), Some(&file));

        let full = load_tree_full(&file).unwrap();
        assert_eq!(full.node_count(), tree.node_count());
        assert_eq!(mesh_counts(&full), mesh_counts(&tree));

        // Lazy load stops at the stubs
        let lazy = load_tree(&file).unwrap();
        assert!(lazy.max_depth() <= 2);
        let (path, stub) = lazy
            .leaves()
            .into_iter()
            .find(|(_, leaf)| matches!(leaf.source, Some(SourceDescriptor::Archive { has_children: true, .. })))
            .unwrap();
        assert_eq!(path.depth(), 2);
        let Some(SourceDescriptor::Archive { file: sibling, path: rel, .. }) = &stub.source else {
            panic!("expected archive source");
        };
        assert!(sibling.exists());
        assert!(sibling.file_name().unwrap().to_string_lossy().starts_with("sphere_"));

        let refined = load_subtree(sibling, rel, 1).unwrap();
        assert_eq!(refined.depth, 2);
        assert_eq!(refined.bounds, stub.bounds);
        assert_eq!(refined.state(), NodeState::Branch);
        assert!(refined.children().iter().all(|c| c.depth == 3 && !c.is_branch()));
    }

    #[test]
    fn test_collapse_reload_is_leaf_at_same_depth() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("model.sto");
        let tree = sphere_tree(3);
        save_tree(&tree, NodePath::root(), &file, &ArchiveConfig::default(), &CancelToken::new()).unwrap();

        let (path, branch) = {
            let mut found = None;
            tree.visit(&mut |p, n| {
                if found.is_none() && n.depth == 1 && n.is_branch() {
                    found = Some((p, n.clone()));
                }
            });
            found.unwrap()
        };
        let leaf = load_subtree(&file, &path, 0).unwrap();
        assert!(leaf.is_leaf());
        assert_eq!(leaf.corners, branch.corners);
        assert_eq!(leaf.bounds, branch.bounds);
    }

    #[test]
    fn test_cancelled_save_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sphere.sto");
        let cancel = CancelToken::new();
        cancel.cancel();
        let config = ArchiveConfig { levels_per_file: Some(1), ..Default::default() };
        let result = save_tree(&sphere_tree(3), NodePath::root(), &file, &config, &cancel).unwrap();
        assert!(result.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_save_removes_written_siblings() {
        let config = ArchiveConfig { levels_per_file: Some(1), ..Default::default() };
        let tree = sphere_tree(3);

        let clean = tempfile::tempdir().unwrap();
        let written = save_tree(&tree, NodePath::root(), &clean.path().join("sphere.sto"), &config, &CancelToken::new())
            .unwrap()
            .unwrap();
        assert!(written.len() > 1);

        // Siblings are written before the top-level file, which cannot
        // replace a non-empty directory
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sphere.sto");
        std::fs::create_dir(&file).unwrap();
        std::fs::write(file.join("keep"), b"x").unwrap();

        let result = save_tree(&tree, NodePath::root(), &file, &config, &CancelToken::new());
        assert!(matches!(result, Err(Error::Io(_))));
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["sphere.sto".to_string()]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_tree(&dir.path().join("nope.sto")), Err(Error::Io(_))));
    }

    #[test]
    fn test_bad_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("m.sto");
        save_tree(&sphere_tree(2), NodePath::root(), &file, &ArchiveConfig::default(), &CancelToken::new()).unwrap();
        let bogus: NodePath = "0000".parse().unwrap();
        assert!(matches!(load_subtree(&file, &bogus, 1), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_write_atomic_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out.bin");
        write_atomic(&file, b"first").unwrap();
        write_atomic(&file, b"second").unwrap();
        assert_eq!(std::fs::read(&file).unwrap(), b"second");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
