//! Spatial chunking: partition a cloud's points into fixed-size grid cells.

use crate::config::ChunkConfig;
use crate::data::{CellIndex, Chunk, Point, PointCloud};
use crate::error::{PointCloudError, Result};
use crate::lod::{build_lods_with_rng, sampler_rng};
use crate::outline::build_outlines;
use glam::Vec3;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// `floor(world_pos / chunk_size)` per axis.
#[inline]
pub fn cell_index(world_pos: Vec3, chunk_size: f32) -> CellIndex {
    let c = (world_pos / chunk_size).floor();
    CellIndex(c.x as i32, c.y as i32, c.z as i32)
}

#[derive(Default)]
struct Cell {
    points: Vec<Point>,
    max_dist_sq: f32,
}

/// Re-chunk with the default configuration.
pub fn generate_chunks(cloud: &mut PointCloud, chunk_size: f32) -> Result<()> {
    generate_chunks_with(cloud, chunk_size, &ChunkConfig::default())
}

/// Replace the cloud's chunk set.
///
/// Points are binned by their transformed position. One chunk is emitted per
/// non-empty cell, in ascending cell order, each with its LOD levels built.
/// The chunk outlines are rebuilt and the cloud is flagged so the buffer
/// owner drops its old chunk buffers.
pub fn generate_chunks_with(
    cloud: &mut PointCloud,
    chunk_size: f32,
    config: &ChunkConfig,
) -> Result<()> {
    if !(chunk_size.is_finite() && chunk_size > 0.0) {
        return Err(PointCloudError::InvalidChunkSize(chunk_size));
    }

    cloud.chunks.clear();
    cloud.chunks_dirty = true;
    cloud.chunk_generation += 1;
    cloud.chunk_size = chunk_size;

    let model = cloud.model_matrix();
    let mut cells: BTreeMap<CellIndex, Cell> = BTreeMap::new();

    for point in &cloud.points {
        let world = model.transform_point3(point.pos());
        let index = cell_index(world, chunk_size);

        let cell = cells.entry(index).or_default();
        cell.points.push(*point);
        cell.max_dist_sq = cell
            .max_dist_sq
            .max(world.distance_squared(index.center(chunk_size)));
    }

    let cells: Vec<(CellIndex, Cell)> = cells.into_iter().collect();
    let build = |(ordinal, (index, cell)): (usize, (CellIndex, Cell))| {
        build_chunk(index, cell, chunk_size, config, ordinal as u64)
    };

    cloud.chunks = if config.parallel {
        cells.into_par_iter().enumerate().map(build).collect()
    } else {
        cells.into_iter().enumerate().map(build).collect()
    };

    cloud.chunk_outline_vertices = build_outlines(&cloud.chunks, chunk_size);

    log::info!(
        "{}: {} points -> {} chunks (size {}, generation {})",
        cloud.name,
        cloud.points.len(),
        cloud.chunks.len(),
        chunk_size,
        cloud.chunk_generation
    );

    Ok(())
}

fn build_chunk(
    index: CellIndex,
    cell: Cell,
    chunk_size: f32,
    config: &ChunkConfig,
    ordinal: u64,
) -> Chunk {
    let points: Arc<[Point]> = Arc::from(cell.points);
    let mut rng = sampler_rng(config.lod.sampling, ordinal);
    let lods = build_lods_with_rng(&points, &config.lod, &mut rng);

    let chunk = Chunk {
        cell: index,
        points,
        center_position: index.center(chunk_size),
        bounding_radius: cell.max_dist_sq.sqrt(),
        lods,
    };

    log::debug!(
        "chunk {:?}: {} points, radius {:.3}, lods {:?}",
        index,
        chunk.point_count(),
        chunk.bounding_radius,
        chunk.lod_point_counts()
    );

    chunk
}
