//! Core data types: points, chunks and the point cloud that owns them.

use crate::config::{LOD_DISTANCES, LOD_LEVELS};
use glam::{Mat4, Vec3};
use std::path::PathBuf;
use std::sync::Arc;

/// A single sample, laid out for direct upload as a vertex.
/// Field order matches the attribute layout expected by the point shaders
/// (position, intensity, color).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Point {
    pub position: [f32; 3],
    pub intensity: f32,
    /// Normalised 0..1 RGB.
    pub color: [f32; 3],
}

impl Point {
    pub fn new(position: [f32; 3], intensity: f32, color: [f32; 3]) -> Self {
        Self {
            position,
            intensity,
            color,
        }
    }

    #[inline]
    pub fn pos(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Position / rotation / scale of a cloud. Rotation is Euler degrees,
/// applied X, then Y, then Z.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// `T * Rx * Ry * Rz * S`.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position)
            * Mat4::from_rotation_x(self.rotation.x.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_z(self.rotation.z.to_radians())
            * Mat4::from_scale(self.scale)
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

/// Integer grid cell, `floor(world_pos / chunk_size)` per axis.
/// Ordered lexicographically (x, then y, then z).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellIndex(pub i32, pub i32, pub i32);

impl CellIndex {
    /// Center of the cell in world space.
    pub fn center(&self, chunk_size: f32) -> Vec3 {
        Vec3::new(
            (self.0 as f32 + 0.5) * chunk_size,
            (self.1 as f32 + 0.5) * chunk_size,
            (self.2 as f32 + 0.5) * chunk_size,
        )
    }
}

/// One level of detail. Levels that did not need sampling share the
/// allocation of level 0.
#[derive(Clone, Debug)]
pub struct LodLevel {
    pub points: Arc<[Point]>,
}

impl LodLevel {
    pub fn count(&self) -> usize {
        self.points.len()
    }
}

/// The points of one grid cell plus their LOD levels.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub cell: CellIndex,
    /// Local-space points, a disjoint subset of the owning cloud's points.
    pub points: Arc<[Point]>,
    /// World-space cell center (not the centroid).
    pub center_position: Vec3,
    /// Max world-space distance from `center_position` to a member point.
    pub bounding_radius: f32,
    pub lods: [LodLevel; LOD_LEVELS],
}

impl Chunk {
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn lod_point_counts(&self) -> [usize; LOD_LEVELS] {
        std::array::from_fn(|level| self.lods[level].count())
    }

    /// Whether `level` reuses level 0's data instead of a sampled subset.
    pub fn level_shares_base(&self, level: usize) -> bool {
        Arc::ptr_eq(&self.lods[level].points, &self.points)
    }
}

#[derive(Clone, Debug)]
pub struct PointCloud {
    pub name: String,
    pub file_path: PathBuf,
    /// Full-resolution points in local space. Kept after chunking.
    pub points: Vec<Point>,
    pub transform: Transform,
    pub chunk_size: f32,
    pub chunks: Vec<Chunk>,
    /// Line-list vertices outlining every chunk cell.
    pub chunk_outline_vertices: Vec<Vec3>,
    pub lod_distances: [f32; LOD_LEVELS],
    pub base_point_size: f32,
    pub visible: bool,
    /// Bumped every time the chunk set is replaced.
    pub chunk_generation: u64,
    /// Set when the chunk set was replaced and GPU-side chunk buffers are stale.
    pub chunks_dirty: bool,
}

impl Default for PointCloud {
    fn default() -> Self {
        Self {
            name: String::new(),
            file_path: PathBuf::new(),
            points: Vec::new(),
            transform: Transform::default(),
            chunk_size: 2.0,
            chunks: Vec::new(),
            chunk_outline_vertices: Vec::new(),
            lod_distances: LOD_DISTANCES,
            base_point_size: 2.0,
            visible: true,
            chunk_generation: 0,
            chunks_dirty: false,
        }
    }
}

impl PointCloud {
    /// An empty cloud named after the file it came from.
    pub fn named_for(path: impl Into<PathBuf>) -> Self {
        let file_path = path.into();
        let file_name = file_path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            name: format!("PointCloud_{file_name}"),
            file_path,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Sum of the chunk sizes; equals `point_count` once chunked.
    pub fn chunked_point_count(&self) -> usize {
        self.chunks.iter().map(Chunk::point_count).sum()
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.transform.model_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Point>(), 28);
        let pts = [Point::new([1.0, 2.0, 3.0], 1.0, [0.5; 3])];
        let bytes: &[u8] = bytemuck::cast_slice(&pts);
        assert_eq!(bytes.len(), 28);
    }

    #[test]
    fn model_matrix_order() {
        let t = Transform {
            position: Vec3::new(10.0, 0.0, 0.0),
            rotation: Vec3::new(0.0, 0.0, 90.0),
            scale: Vec3::splat(2.0),
        };
        // Scale, then rotate about Z, then translate.
        let p = t.model_matrix().transform_point3(Vec3::X);
        assert!((p - Vec3::new(10.0, 2.0, 0.0)).length() < 1e-5);
        assert!(Transform::default().is_identity());
    }

    #[test]
    fn cell_center_and_ordering() {
        assert_eq!(CellIndex(1, 1, 1).center(1.0), Vec3::splat(1.5));
        assert_eq!(CellIndex(-1, 0, 2).center(2.0), Vec3::new(-1.0, 1.0, 5.0));
        assert!(CellIndex(0, 5, 5) < CellIndex(1, 0, 0));
    }

    #[test]
    fn named_for_uses_file_name() {
        let cloud = PointCloud::named_for("/data/scans/room.xyz");
        assert_eq!(cloud.name, "PointCloud_room.xyz");
        assert!(cloud.is_empty());
        assert_eq!(cloud.lod_distances, LOD_DISTANCES);
    }
}
