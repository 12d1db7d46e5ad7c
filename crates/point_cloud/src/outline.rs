//! Debug wireframes for chunk cells and octree nodes.

use crate::data::Chunk;
use glam::Vec3;

pub const VERTICES_PER_OUTLINE: usize = 24;

/// Line-list vertices for the 12 edges of every chunk's cell cube
/// (front face, back face, then the four connecting edges).
pub fn build_outlines(chunks: &[Chunk], chunk_size: f32) -> Vec<Vec3> {
    let mut vertices = Vec::with_capacity(chunks.len() * VERTICES_PER_OUTLINE);

    for chunk in chunks {
        push_box_edges(&mut vertices, chunk.center_position, Vec3::splat(chunk_size / 2.0));
    }

    vertices
}

/// The 12 edges of an axis-aligned box as 24 line-list vertices.
pub(crate) fn push_box_edges(out: &mut Vec<Vec3>, center: Vec3, half_extent: Vec3) {
    let lo = center - half_extent;
    let hi = center + half_extent;

    let front = [
        Vec3::new(lo.x, lo.y, lo.z),
        Vec3::new(hi.x, lo.y, lo.z),
        Vec3::new(hi.x, hi.y, lo.z),
        Vec3::new(lo.x, hi.y, lo.z),
    ];
    let back = front.map(|v| Vec3::new(v.x, v.y, hi.z));

    for face in [front, back] {
        for i in 0..4 {
            out.push(face[i]);
            out.push(face[(i + 1) % 4]);
        }
    }

    for i in 0..4 {
        out.push(front[i]);
        out.push(back[i]);
    }
}
