//! In-memory octree over a cloud's local-space points.
//!
//! Only leaves hold points. Each leaf carries five sampled levels whose
//! sizes depend on how densely its box is filled: sparse leaves keep almost
//! everything, packed ones are thinned hard. Nothing is paged to disk.

use crate::config::{OctreeConfig, LOD_LEVELS};
use crate::data::{LodLevel, Point};
use crate::lod::{reservoir_indices, sampler_rng};
use crate::outline::push_box_edges;
use glam::Vec3;
use rand::Rng;
use std::sync::Arc;

/// Root cube edge relative to the largest extent of the points.
pub const BOUNDS_PADDING: f32 = 1.1;

/// Bounds of a point set. `size` is the padded edge of the cube the root
/// node spans around `center`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OctreeBounds {
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
    pub size: f32,
}

impl OctreeBounds {
    pub fn of_points(points: &[Point]) -> Self {
        let Some(first) = points.first() else {
            return Self {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
                center: Vec3::ZERO,
                size: 1.0,
            };
        };

        let (min, max) = points
            .iter()
            .fold((first.pos(), first.pos()), |(lo, hi), p| {
                (lo.min(p.pos()), hi.max(p.pos()))
            });

        Self {
            min,
            max,
            center: (min + max) * 0.5,
            size: (max - min).max_element() * BOUNDS_PADDING,
        }
    }
}

/// Octant of `pos` around `center`: bit 0 is +x, bit 1 is +y, bit 2 is +z.
/// A coordinate equal to the center goes to the positive side.
pub fn child_index(pos: Vec3, center: Vec3) -> usize {
    (pos.x >= center.x) as usize
        | ((pos.y >= center.y) as usize) << 1
        | ((pos.z >= center.z) as usize) << 2
}

/// Center and half-extent of octant `index` of a node.
pub fn child_bounds(center: Vec3, half_extent: Vec3, index: usize) -> (Vec3, Vec3) {
    let half = half_extent * 0.5;
    let sign = |bit: usize| if index & bit != 0 { 1.0 } else { -1.0 };
    (center + half * Vec3::new(sign(1), sign(2), sign(4)), half)
}

/// Per-level point counts for a leaf of `total` points.
///
/// Density is points per unit volume of the node box, raised by 10% per
/// level of depth. Each density band has its own reduction factors and a
/// minimum count; leaves of 20 points or fewer keep at least 30% at every
/// level. Counts never exceed `total`.
pub fn lod_point_counts(total: usize, half_extent: Vec3, depth: u32) -> [usize; LOD_LEVELS] {
    let volume = (half_extent * 2.0).element_product();
    let density = total as f32 / volume * (1.0 + depth as f32 * 0.1);

    let (factors, floor): ([f32; LOD_LEVELS], usize) = if density < 10.0 {
        ([1.0, 1.0, 0.9, 0.8, 0.7], 1)
    } else if density < 50.0 {
        ([1.0, 0.9, 0.7, 0.5, 0.3], 1)
    } else if density < 200.0 {
        ([1.0, 0.7, 0.4, 0.2, 0.08], 2)
    } else if density < 1000.0 {
        ([1.0, 0.5, 0.2, 0.05, 0.01], 3)
    } else {
        ([1.0, 0.3, 0.08, 0.015, 0.003], 5)
    };

    let small_floor = if total <= 20 {
        ((total as f32 * 0.3) as usize).max(1)
    } else {
        0
    };

    factors.map(|f| {
        ((total as f32 * f) as usize)
            .max(floor)
            .max(small_floor)
            .min(total)
    })
}

#[derive(Clone, Debug)]
pub struct OctreeNode {
    /// Pre-order number, 1 for the root.
    pub id: u32,
    pub depth: u32,
    pub center: Vec3,
    pub half_extent: Vec3,
    /// Points in this node's subtree.
    pub total_point_count: usize,
    /// Leaf points; empty for interior nodes.
    pub points: Arc<[Point]>,
    /// Sampled levels, present on leaves only.
    pub lods: Option<[LodLevel; LOD_LEVELS]>,
    /// Only non-empty octants get a child.
    pub children: [Option<Box<OctreeNode>>; 8],
}

impl OctreeNode {
    pub fn is_leaf(&self) -> bool {
        self.lods.is_some()
    }

    pub fn children(&self) -> impl Iterator<Item = &OctreeNode> {
        self.children.iter().flatten().map(|child| &**child)
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a OctreeNode)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }
}

#[derive(Clone, Debug)]
pub struct Octree {
    pub bounds: OctreeBounds,
    pub root: OctreeNode,
    pub node_count: usize,
}

impl Octree {
    pub fn point_count(&self) -> usize {
        self.root.total_point_count
    }

    /// Leaves in depth-first, octant order.
    pub fn leaves(&self) -> Vec<&OctreeNode> {
        let mut leaves = Vec::new();
        self.root.visit(&mut |node| {
            if node.is_leaf() {
                leaves.push(node);
            }
        });
        leaves
    }

    pub fn depth(&self) -> u32 {
        let mut depth = 0;
        self.root.visit(&mut |node| depth = depth.max(node.depth));
        depth
    }

    /// Points per level summed over all leaves.
    pub fn lod_point_counts(&self) -> [usize; LOD_LEVELS] {
        let mut totals = [0; LOD_LEVELS];
        for leaf in self.leaves() {
            if let Some(lods) = &leaf.lods {
                for (total, lod) in totals.iter_mut().zip(lods) {
                    *total += lod.count();
                }
            }
        }
        totals
    }

    /// Wireframe of the nodes at `depth`, plus shallower leaves.
    pub fn outline_vertices(&self, depth: u32) -> Vec<Vec3> {
        let mut vertices = Vec::new();
        push_outlines(&self.root, depth, &mut vertices);
        vertices
    }
}

fn push_outlines(node: &OctreeNode, depth: u32, out: &mut Vec<Vec3>) {
    if node.depth == depth || node.is_leaf() {
        push_box_edges(out, node.center, node.half_extent);
        return;
    }
    for child in node.children() {
        push_outlines(child, depth, out);
    }
}

/// Build an octree over `points`. Returns `None` for an empty set.
pub fn build_octree(points: &[Point], config: &OctreeConfig) -> Option<Octree> {
    if points.is_empty() {
        return None;
    }

    let bounds = OctreeBounds::of_points(points);
    let mut builder = Builder { config, next_id: 1 };
    let root = builder.build(
        points,
        (0..points.len()).collect(),
        bounds.center,
        Vec3::splat(bounds.size * 0.5),
        0,
    );

    let octree = Octree {
        bounds,
        root,
        node_count: (builder.next_id - 1) as usize,
    };

    log::info!(
        "octree: {} points -> {} nodes, {} leaves, depth {}",
        points.len(),
        octree.node_count,
        octree.leaves().len(),
        octree.depth()
    );

    Some(octree)
}

struct Builder<'a> {
    config: &'a OctreeConfig,
    next_id: u32,
}

impl Builder<'_> {
    fn build(
        &mut self,
        points: &[Point],
        indices: Vec<usize>,
        center: Vec3,
        half_extent: Vec3,
        depth: u32,
    ) -> OctreeNode {
        let id = self.next_id;
        self.next_id += 1;

        let mut node = OctreeNode {
            id,
            depth,
            center,
            half_extent,
            total_point_count: indices.len(),
            points: Arc::from(Vec::new()),
            lods: None,
            children: Default::default(),
        };

        if indices.len() <= self.config.max_points_per_node || depth >= self.config.max_depth {
            let leaf: Arc<[Point]> = indices.iter().map(|&i| points[i]).collect();
            let mut rng = sampler_rng(self.config.sampling, id as u64);
            node.lods = Some(leaf_lods(&leaf, half_extent, depth, &mut rng));
            node.points = leaf;
            return node;
        }

        let mut octants: [Vec<usize>; 8] = Default::default();
        for i in indices {
            octants[child_index(points[i].pos(), center)].push(i);
        }

        for (octant, members) in octants.into_iter().enumerate() {
            if members.is_empty() {
                continue;
            }
            let (child_center, child_half) = child_bounds(center, half_extent, octant);
            let child = self.build(points, members, child_center, child_half, depth + 1);
            node.children[octant] = Some(Box::new(child));
        }

        node
    }
}

fn leaf_lods<R: Rng + ?Sized>(
    points: &Arc<[Point]>,
    half_extent: Vec3,
    depth: u32,
    rng: &mut R,
) -> [LodLevel; LOD_LEVELS] {
    lod_point_counts(points.len(), half_extent, depth).map(|count| {
        if count >= points.len() {
            return LodLevel {
                points: Arc::clone(points),
            };
        }
        LodLevel {
            points: reservoir_indices(points.len(), count, rng)
                .into_iter()
                .map(|i| points[i])
                .collect(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LodSampling;
    use crate::outline::VERTICES_PER_OUTLINE;

    fn grid(n: usize) -> Vec<Point> {
        let mut points = Vec::with_capacity(n * n * n);
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    points.push(Point::new([x as f32, y as f32, z as f32], 1.0, [0.5; 3]));
                }
            }
        }
        points
    }

    fn small(max_points_per_node: usize, max_depth: u32) -> OctreeConfig {
        OctreeConfig {
            max_points_per_node,
            max_depth,
            sampling: LodSampling::Seeded(3),
        }
    }

    #[test]
    fn bounds_are_padded_cube() {
        let points = [
            Point::new([0.0, 0.0, 0.0], 1.0, [0.0; 3]),
            Point::new([2.0, 1.0, -1.0], 1.0, [0.0; 3]),
        ];
        let b = OctreeBounds::of_points(&points);
        assert_eq!(b.min, Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(b.max, Vec3::new(2.0, 1.0, 0.0));
        assert_eq!(b.center, Vec3::new(1.0, 0.5, -0.5));
        assert!((b.size - 2.2).abs() < 1e-6);

        assert_eq!(OctreeBounds::of_points(&[]).size, 1.0);
    }

    #[test]
    fn octants() {
        let c = Vec3::ZERO;
        assert_eq!(child_index(Vec3::new(-1.0, -1.0, -1.0), c), 0);
        assert_eq!(child_index(Vec3::new(1.0, -1.0, -1.0), c), 1);
        assert_eq!(child_index(Vec3::new(-1.0, 1.0, 1.0), c), 6);
        assert_eq!(child_index(Vec3::ZERO, c), 7);

        let (center, half) = child_bounds(Vec3::ZERO, Vec3::splat(2.0), 5);
        assert_eq!(center, Vec3::new(1.0, -1.0, 1.0));
        assert_eq!(half, Vec3::ONE);
    }

    #[test]
    fn density_bands() {
        // 100 points in a 2x2x2 box: 12.5 per unit volume.
        assert_eq!(lod_point_counts(100, Vec3::ONE, 0), [100, 90, 70, 50, 30]);

        // 9.5 per unit volume is sparse at the root, but not one level down.
        assert_eq!(lod_point_counts(76, Vec3::ONE, 0), [76, 76, 68, 60, 53]);
        assert_eq!(lod_point_counts(76, Vec3::ONE, 1), [76, 68, 53, 38, 22]);

        // Packed leaves are thinned to the band minimum but never above
        // their size.
        assert_eq!(lod_point_counts(10, Vec3::splat(0.01), 0), [10, 5, 5, 5, 5]);
        assert_eq!(lod_point_counts(2, Vec3::splat(0.01), 0), [2; LOD_LEVELS]);
    }

    #[test]
    fn leaves_partition_the_points() {
        let points = grid(10);
        let octree = build_octree(&points, &small(100, 12)).unwrap();

        assert_eq!(octree.point_count(), 1000);
        assert!(!octree.root.is_leaf());

        let leaves = octree.leaves();
        assert_eq!(leaves.iter().map(|l| l.points.len()).sum::<usize>(), 1000);
        for leaf in &leaves {
            assert!(leaf.points.len() <= 100);
            assert_eq!(leaf.total_point_count, leaf.points.len());
            for p in leaf.points.iter() {
                let offset = (p.pos() - leaf.center).abs();
                assert!(offset.cmple(leaf.half_extent + 1e-4).all());
            }
            let counts = leaf.lods.as_ref().unwrap().each_ref().map(LodLevel::count);
            assert_eq!(counts, lod_point_counts(leaf.points.len(), leaf.half_extent, leaf.depth));
        }

        let mut ids = Vec::new();
        octree.root.visit(&mut |node| ids.push(node.id));
        assert_eq!(ids, (1..=octree.node_count as u32).collect::<Vec<_>>());
    }

    #[test]
    fn depth_limit_stops_subdivision() {
        let points = vec![Point::new([1.0, 1.0, 1.0], 1.0, [1.0; 3]); 50];
        let octree = build_octree(&points, &small(10, 3)).unwrap();

        assert_eq!(octree.depth(), 3);
        assert_eq!(octree.node_count, 4);
        let leaves = octree.leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].points.len(), 50);
    }

    #[test]
    fn outlines_per_depth() {
        let octree = build_octree(&grid(4), &small(8, 12)).unwrap();
        assert_eq!(octree.outline_vertices(0).len(), VERTICES_PER_OUTLINE);

        let children = octree.root.children().count();
        assert_eq!(children, 8);
        assert_eq!(octree.outline_vertices(1).len(), children * VERTICES_PER_OUTLINE);
    }

    #[test]
    fn seeded_builds_repeat() {
        let points = grid(12);
        let a = build_octree(&points, &small(500, 12)).unwrap();
        let b = build_octree(&points, &small(500, 12)).unwrap();

        assert_eq!(a.lod_point_counts(), b.lod_point_counts());
        for (la, lb) in a.leaves().iter().zip(b.leaves()) {
            let (la, lb) = (la.lods.as_ref().unwrap(), lb.lods.as_ref().unwrap());
            assert_eq!(la[4].points[..], lb[4].points[..]);
        }
    }

    #[test]
    fn empty_cloud_has_no_octree() {
        assert!(build_octree(&[], &OctreeConfig::default()).is_none());
    }
}
