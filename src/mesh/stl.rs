//! Binary STL export
//!
//! 80-byte header, little-endian triangle count, then 50 bytes per triangle:
//! face normal, three vertices and a zero attribute word.

use std::io::Write;
use std::path::Path;

use crate::archive::write_atomic;
use crate::core::types::{Result, Vec3};
use crate::mesh::chunk::Mesh;

const HEADER: &[u8] = b"solidtree binary stl";

fn face_normal(tri: &[[f32; 3]; 3]) -> [f32; 3] {
    let [a, b, c] = tri.map(Vec3::from_array);
    (b - a).cross(c - a).normalize_or_zero().to_array()
}

/// Encode `mesh` as binary STL into `w`
pub fn write_stl<W: Write>(mesh: &Mesh, w: &mut W) -> Result<()> {
    let mut header = [0u8; 80];
    header[..HEADER.len()].copy_from_slice(HEADER);
    w.write_all(&header)?;
    w.write_all(&(mesh.triangle_count() as u32).to_le_bytes())?;

    for tri in mesh.triangles() {
        for v in [face_normal(&tri), tri[0], tri[1], tri[2]] {
            for c in v {
                w.write_all(&c.to_le_bytes())?;
            }
        }
        w.write_all(&0u16.to_le_bytes())?;
    }
    Ok(())
}

/// STL bytes for `mesh`
pub fn stl_bytes(mesh: &Mesh) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(84 + 50 * mesh.triangle_count());
    write_stl(mesh, &mut bytes)?;
    Ok(bytes)
}

/// Write `mesh` to `path`, replacing any existing file atomically
pub fn export_stl(mesh: &Mesh, path: &Path) -> Result<()> {
    write_atomic(path, &stl_bytes(mesh)?)?;
    log::info!("Exported {} triangles to {}", mesh.triangle_count(), path.display());
    Ok(())
}
