//! Transforms applied to stored trees without rebuilding them
//!
//! Rescale and offset rewrite the records of every file in an archive.
//! Slicing reads the records and reports the 2D cross-section at a height.

use std::path::{Path, PathBuf};

use crate::archive::format::{ArchiveData, RecordKind};
use crate::archive::store::{read_archive, sibling_path, write_atomic};
use crate::archive::format;
use crate::core::error::Error;
use crate::core::types::{DVec3, Result};
use crate::octree::NodePath;

/// Scale every record about the origin. Distances scale with the geometry.
pub fn rescale(data: &mut ArchiveData, factor: f64) -> Result<()> {
    if !(factor > 0.0 && factor.is_finite()) {
        return Err(Error::Archive(format!("rescale factor must be positive, got {}", factor)));
    }
    for record in &mut data.nodes {
        record.min = record.min.map(|v| v * factor);
        record.max = record.max.map(|v| v * factor);
        record.corners = record.corners.map(|v| v * factor);
    }
    Ok(())
}

/// Translate every record by `delta`. Distances are unchanged.
pub fn offset(data: &mut ArchiveData, delta: DVec3) {
    let d = delta.to_array();
    for record in &mut data.nodes {
        for axis in 0..3 {
            record.min[axis] += d[axis];
            record.max[axis] += d[axis];
        }
    }
}

/// How much of a slice cell lies inside the model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceFill {
    Full,
    /// The surface crosses the cell
    Partial,
}

/// One rectangle of a horizontal cross-section
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceCell {
    pub min: [f64; 2],
    pub max: [f64; 2],
    pub fill: SliceFill,
}

impl SliceCell {
    pub fn area(&self) -> f64 {
        (self.max[0] - self.min[0]) * (self.max[1] - self.min[1])
    }
}

/// Cross-section of one file's records at height `z`.
/// Stub records are reported as partial cells.
pub fn slice_z(data: &ArchiveData, z: f64) -> Vec<SliceCell> {
    let top = data.nodes.first().map_or(f64::NEG_INFINITY, |root| root.max[2]);
    slice_records(data, z, top, true)
}

fn slice_records(data: &ArchiveData, z: f64, top: f64, include_stubs: bool) -> Vec<SliceCell> {
    let mut out = Vec::new();
    for record in &data.nodes {
        let (lo, hi) = (record.min[2], record.max[2]);
        let crosses = (lo <= z && z < hi) || (z == hi && hi == top);
        if !crosses {
            continue;
        }
        let fill = match record.kind {
            RecordKind::Branch | RecordKind::Empty => continue,
            RecordKind::Stub if !include_stubs => continue,
            RecordKind::Stub => SliceFill::Partial,
            RecordKind::Full => SliceFill::Full,
            RecordKind::Leaf => {
                // Interpolate the 4 vertical edges to height z
                let t = if hi > lo { (z - lo) / (hi - lo) } else { 0.0 };
                let at_z: Vec<f64> = (0..4)
                    .map(|i| record.corners[i] * (1.0 - t) + record.corners[i + 4] * t)
                    .collect();
                if at_z.iter().all(|&v| v < 0.0) {
                    SliceFill::Full
                } else if at_z.iter().all(|&v| v >= 0.0) {
                    continue;
                } else {
                    SliceFill::Partial
                }
            }
        };
        out.push(SliceCell {
            min: [record.min[0], record.min[1]],
            max: [record.max[0], record.max[1]],
            fill,
        });
    }
    out
}

/// Model paths of the stub records in `data`
fn stub_paths(data: &ArchiveData) -> Result<Vec<NodePath>> {
    let base: NodePath = data.path.parse()?;
    let mut out = Vec::new();
    let mut stack = vec![(0usize, base)];
    while let Some((index, path)) = stack.pop() {
        let record = &data.nodes[index];
        match record.kind {
            RecordKind::Stub => out.push(path),
            RecordKind::Branch => {
                let slots = (0u8..8).filter(|s| record.octant_mask & (1u8 << *s) != 0);
                for (slot, child) in slots.zip(data.child_indices(index)?) {
                    stack.push((child, path.child(slot)));
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

/// The top-level file and every sibling file reachable from it
pub fn archive_files(file: &Path) -> Result<Vec<PathBuf>> {
    let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
    let ext = file
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut files = Vec::new();
    let mut pending = vec![file.to_path_buf()];
    while let Some(path) = pending.pop() {
        let data = read_archive(&path)?;
        for stub in stub_paths(&data)? {
            pending.push(sibling_path(&dir, &data.base, &stub, &ext));
        }
        files.push(path);
    }
    Ok(files)
}

fn rewrite_all<F>(file: &Path, mut op: F) -> Result<usize>
where
    F: FnMut(&mut ArchiveData) -> Result<()>,
{
    let files = archive_files(file)?;
    for path in &files {
        let mut data = read_archive(path)?;
        op(&mut data)?;
        write_atomic(path, &format::encode(&data)?)?;
    }
    Ok(files.len())
}

/// Rescale an archive in place, sibling files included
pub fn rescale_file(file: &Path, factor: f64) -> Result<()> {
    let count = rewrite_all(file, |data| rescale(data, factor))?;
    log::info!("Rescaled {} by {} ({} files)", file.display(), factor, count);
    Ok(())
}

/// Translate an archive in place, sibling files included
pub fn offset_file(file: &Path, delta: DVec3) -> Result<()> {
    let count = rewrite_all(file, |data| {
        offset(data, delta);
        Ok(())
    })?;
    log::info!("Offset {} by {} ({} files)", file.display(), delta, count);
    Ok(())
}

/// Cross-section of a whole archive at height `z`, following sibling files
pub fn slice_file_z(file: &Path, z: f64) -> Result<Vec<SliceCell>> {
    let files = archive_files(file)?;
    let mut top = f64::NEG_INFINITY;
    let mut cells = Vec::new();
    for (i, path) in files.iter().enumerate() {
        let data = read_archive(path)?;
        if i == 0 {
            top = data.nodes[0].max[2];
        }
        // Stubs are covered by their own sibling file
        cells.extend(slice_records(&data, z, top, false));
    }
    Ok(cells)
}
