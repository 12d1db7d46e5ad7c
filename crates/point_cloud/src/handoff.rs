//! Hand-off of finished CPU-side arrays to whoever owns the GPU buffers.
//!
//! Nothing in this crate talks to a graphics API. A renderer implements
//! `BufferOwner`, and the functions here walk a cloud and pass it borrowed
//! slices; buffer lifetime stays entirely on the owner's side. `plan_draws`
//! tells the renderer which level of each chunk to draw and at what size.

use crate::data::{Chunk, Point, PointCloud};
use crate::lod::select_lod;
use glam::Vec3;

/// Smallest and largest point size a draw is given.
pub const POINT_SIZE_RANGE: (f32, f32) = (1.0, 25.0);

pub trait BufferOwner {
    /// Full-resolution points of a cloud (local space).
    fn upload_points(&mut self, cloud: &str, points: &[Point]);

    /// Drop every chunk-level buffer previously created for `cloud`.
    fn release_chunk_buffers(&mut self, cloud: &str);

    /// One LOD level of one chunk. When `shared_with_base` is set the slice is
    /// level 0's data and the owner may reuse that buffer instead.
    fn upload_chunk_level(
        &mut self,
        cloud: &str,
        chunk: usize,
        level: usize,
        points: &[Point],
        shared_with_base: bool,
    );

    /// Line-list vertices of the chunk outlines.
    fn upload_outlines(&mut self, cloud: &str, vertices: &[Vec3]);
}

/// Raw vertex bytes for a slice of points.
pub fn point_bytes(points: &[Point]) -> &[u8] {
    bytemuck::cast_slice(points)
}

pub fn hand_off_points<O: BufferOwner + ?Sized>(cloud: &PointCloud, owner: &mut O) {
    owner.upload_points(&cloud.name, &cloud.points);
}

/// Pass a replaced chunk set to the owner. Does nothing unless the cloud
/// was re-chunked since the last hand-off. Returns the number of level
/// uploads.
pub fn hand_off_chunks<O: BufferOwner + ?Sized>(cloud: &mut PointCloud, owner: &mut O) -> usize {
    if !cloud.chunks_dirty {
        return 0;
    }

    owner.release_chunk_buffers(&cloud.name);

    let mut uploads = 0;
    for (index, chunk) in cloud.chunks.iter().enumerate() {
        for (level, lod) in chunk.lods.iter().enumerate() {
            let shared = level > 0 && chunk.level_shares_base(level);
            owner.upload_chunk_level(&cloud.name, index, level, &lod.points, shared);
            uploads += 1;
        }
    }

    owner.upload_outlines(&cloud.name, &cloud.chunk_outline_vertices);
    cloud.chunks_dirty = false;

    log::debug!(
        "{}: handed off {} chunk levels (generation {})",
        cloud.name,
        uploads,
        cloud.chunk_generation
    );

    uploads
}

/// One chunk level to draw this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCall {
    pub chunk: usize,
    pub level: usize,
    pub point_size: f32,
}

/// Point size for a level: coarser levels and denser chunks get larger
/// points to cover the gaps left by sampling.
pub fn point_size(base_point_size: f32, level: usize, density: f32) -> f32 {
    let level_factor = 1.0 + level as f32 * 1.2;
    let density_factor = if density > 1000.0 {
        1.8
    } else if density > 200.0 {
        1.4
    } else if density < 20.0 {
        0.8
    } else {
        1.0
    };

    let (min, max) = POINT_SIZE_RANGE;
    (base_point_size * level_factor * density_factor).clamp(min, max)
}

/// Distance from `camera` to the nearest point of the chunk's bounding
/// sphere; zero inside it.
fn chunk_distance(chunk: &Chunk, camera: Vec3) -> f32 {
    (camera.distance(chunk.center_position) - chunk.bounding_radius).max(0.0)
}

/// Pick a level and point size for every chunk as seen from `camera`
/// (world space). Hidden clouds draw nothing.
pub fn plan_draws(cloud: &PointCloud, camera: Vec3) -> Vec<DrawCall> {
    if !cloud.visible {
        return Vec::new();
    }

    let volume = cloud.chunk_size.powi(3);
    cloud
        .chunks
        .iter()
        .enumerate()
        .filter(|(_, chunk)| chunk.point_count() > 0)
        .map(|(index, chunk)| {
            let level = select_lod(chunk_distance(chunk, camera), &cloud.lod_distances);
            let density = chunk.point_count() as f32 / volume;
            DrawCall {
                chunk: index,
                level,
                point_size: point_size(cloud.base_point_size, level, density),
            }
        })
        .collect()
}
