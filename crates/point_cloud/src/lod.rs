//! Per-chunk levels of detail built by batched reservoir sampling.

use crate::config::{LodConfig, LodSampling, LOD_LEVELS};
use crate::data::{LodLevel, Point};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Random source for one chunk's LOD build.
///
/// `ordinal` is the chunk's position in cell order; it only matters for
/// seeded sampling.
pub fn sampler_rng(sampling: LodSampling, ordinal: u64) -> StdRng {
    match sampling {
        LodSampling::Fresh => StdRng::from_entropy(),
        LodSampling::Seeded(seed) => {
            StdRng::seed_from_u64(seed ^ ordinal.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        }
    }
}

/// Build all levels for one chunk with a fresh generator per call.
pub fn build_lods(points: &Arc<[Point]>, config: &LodConfig) -> [LodLevel; LOD_LEVELS] {
    let mut rng = sampler_rng(config.sampling, 0);
    build_lods_with_rng(points, config, &mut rng)
}

/// Level 0 is the full point set. Each further level keeps at most its
/// threshold; a chunk already within the threshold shares level 0's data.
pub fn build_lods_with_rng<R: Rng + ?Sized>(
    points: &Arc<[Point]>,
    config: &LodConfig,
    rng: &mut R,
) -> [LodLevel; LOD_LEVELS] {
    std::array::from_fn(|level| {
        let threshold = config.thresholds[level];

        if level == 0 || points.len() <= threshold {
            return LodLevel {
                points: Arc::clone(points),
            };
        }

        let selected = sample_batched(points, threshold, config.batch_size, rng);
        LodLevel {
            points: Arc::from(selected),
        }
    })
}

/// Reduce `points` to about `target` points, one batch at a time.
///
/// Each batch contributes `round(batch_len * target / total)` points drawn
/// uniformly from that batch. Batches are appended until `target` is reached;
/// any excess is trimmed. Rounding may leave the result slightly short of
/// `target`, never above it.
pub fn sample_batched<R: Rng + ?Sized>(
    points: &[Point],
    target: usize,
    batch_size: usize,
    rng: &mut R,
) -> Vec<Point> {
    let total = points.len();
    if target >= total {
        return points.to_vec();
    }

    let mut selected = Vec::with_capacity(target);

    for batch in points.chunks(batch_size.max(1)) {
        let quota = (batch.len() as f64 * target as f64 / total as f64).round() as usize;
        let quota = quota.min(batch.len());

        selected.extend(reservoir_indices(batch.len(), quota, rng).into_iter().map(|i| batch[i]));

        if selected.len() >= target {
            selected.truncate(target);
            break;
        }
    }

    selected
}

/// Algorithm R over `0..n`: a uniform random `k`-subset of indices, returned
/// in ascending order.
pub fn reservoir_indices<R: Rng + ?Sized>(n: usize, k: usize, rng: &mut R) -> Vec<usize> {
    let k = k.min(n);
    let mut reservoir: Vec<usize> = (0..k).collect();

    for i in k..n {
        let j = rng.gen_range(0..=i);
        if j < k {
            reservoir[j] = i;
        }
    }

    reservoir.sort_unstable();
    reservoir
}

/// Distance-based level pick: the first level whose distance the viewer is
/// still inside; the coarsest level beyond the last one.
pub fn select_lod(distance: f32, lod_distances: &[f32; LOD_LEVELS]) -> usize {
    lod_distances
        .iter()
        .position(|&limit| distance < limit)
        .unwrap_or(LOD_LEVELS - 1)
}
