//! Identifier rendering for visibility sampling
//!
//! Every leaf chunk is drawn in one flat identifier (`index + 1`, `0` is the
//! background) with a depth test, so the histogram of the buffer tells how
//! many pixels each leaf covers.

use crate::core::camera::Camera;
use crate::core::types::Vec3;
use crate::mesh::MeshChunk;

/// Off-screen identifier buffer, row-major, top row first
#[derive(Clone, Debug, PartialEq)]
pub struct IdBuffer {
    pub width: u32,
    pub height: u32,
    pub ids: Vec<u32>,
}

impl IdBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ids: vec![0; width as usize * height as usize],
        }
    }

    pub fn pixel_count(&self) -> u64 {
        self.ids.len() as u64
    }

    /// Pixel count per identifier, `0..=max_id`. Larger ids are ignored.
    pub fn histogram(&self, max_id: u32) -> Vec<u64> {
        let mut counts = vec![0u64; max_id as usize + 1];
        for &id in &self.ids {
            if let Some(count) = counts.get_mut(id as usize) {
                *count += 1;
            }
        }
        counts
    }
}

/// Draws chunks into an identifier buffer
pub trait IdRenderer: Send {
    /// Render `chunks[i]` with identifier `i + 1`
    fn render(&self, camera: &Camera, chunks: &[&MeshChunk], width: u32, height: u32) -> IdBuffer;
}

/// CPU rasterizer with a depth buffer
#[derive(Clone, Copy, Debug, Default)]
pub struct SoftwareIdRenderer;

/// Projected vertex: pixel coordinates plus depth
#[derive(Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    z: f32,
}

fn edge(a: ScreenVertex, b: ScreenVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

impl SoftwareIdRenderer {
    fn project(camera: &Camera, view_proj: &glam::Mat4, p: [f32; 3], width: u32, height: u32) -> Option<ScreenVertex> {
        // Triangles reaching behind the near plane are dropped, not clipped
        camera
            .project_to_viewport(view_proj, Vec3::from_array(p), width, height)
            .map(|v| ScreenVertex { x: v.x, y: v.y, z: v.z })
    }

    fn fill(tri: [ScreenVertex; 3], id: u32, buffer: &mut IdBuffer, depth: &mut [f32]) {
        let [a, b, c] = tri;
        let area = edge(a, b, c.x, c.y);
        if area.abs() < 1e-12 {
            return;
        }
        let (w, h) = (buffer.width as f32, buffer.height as f32);
        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0);
        let max_x = a.x.max(b.x).max(c.x).ceil().min(w);
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0);
        let max_y = a.y.max(b.y).max(c.y).ceil().min(h);
        if min_x >= max_x || min_y >= max_y {
            return;
        }

        for py in min_y as u32..max_y as u32 {
            for px in min_x as u32..max_x as u32 {
                let (sx, sy) = (px as f32 + 0.5, py as f32 + 0.5);
                let w0 = edge(b, c, sx, sy) / area;
                let w1 = edge(c, a, sx, sy) / area;
                let w2 = edge(a, b, sx, sy) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let z = w0 * a.z + w1 * b.z + w2 * c.z;
                let index = (py * buffer.width + px) as usize;
                if z < depth[index] {
                    depth[index] = z;
                    buffer.ids[index] = id;
                }
            }
        }
    }
}

impl IdRenderer for SoftwareIdRenderer {
    fn render(&self, camera: &Camera, chunks: &[&MeshChunk], width: u32, height: u32) -> IdBuffer {
        let mut buffer = IdBuffer::new(width, height);
        let mut depth = vec![f32::INFINITY; buffer.ids.len()];
        let view_proj = camera.view_projection();

        for (i, chunk) in chunks.iter().enumerate() {
            let id = i as u32 + 1;
            for tri in chunk.indices.chunks_exact(3) {
                let projected = [tri[0], tri[1], tri[2]].map(|v| {
                    let p = chunk.vertices[v as usize].position;
                    Self::project(camera, &view_proj, p, width, height)
                });
                if let [Some(a), Some(b), Some(c)] = projected {
                    Self::fill([a, b, c], id, &mut buffer, &mut depth);
                }
            }
        }
        buffer
    }
}
