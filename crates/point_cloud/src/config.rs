//! Tunables for ingestion, chunking and LOD generation.
//!
//! Defaults: 1 MiB read buffers, one worker per hardware thread, the
//! absolute LOD point budgets and 5000-point octree leaves.

/// Number of LOD levels built for every chunk.
pub const LOD_LEVELS: usize = 5;

/// Absolute per-level point budgets. Level 0 is always the full chunk.
pub const LOD_THRESHOLDS: [usize; LOD_LEVELS] = [usize::MAX, 40_000, 15_000, 5_000, 2_500];

/// Points handled per reservoir batch.
pub const LOD_BATCH_SIZE: usize = 1_000_000;

/// Distances at which a renderer switches to the next LOD level.
pub const LOD_DISTANCES: [f32; LOD_LEVELS] = [10.0, 25.0, 50.0, 100.0, 200.0];

pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// An octree node holding at most this many points becomes a leaf.
pub const MAX_POINTS_PER_NODE: usize = 5_000;

pub const MAX_OCTREE_DEPTH: u32 = 12;

/// What the text loader does with a line that straddles two read buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryLines {
    /// Each buffer is parsed on its own; the fragments on either side of a
    /// boundary are skipped and the line is lost.
    #[default]
    Drop,
    /// Buffers are cut at their last newline and the unterminated tail is
    /// prepended to the next read, so every line reaches a worker whole.
    Carry,
}

/// Controls the bounded worker batches used by the text and binary loaders.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Bytes read from disk per worker job.
    pub buffer_size: usize,
    /// Workers launched per batch; the caller joins each batch before
    /// reading further.
    pub workers: usize,
    pub boundary_lines: BoundaryLines,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            workers: hardware_concurrency(),
            boundary_lines: BoundaryLines::Drop,
        }
    }
}

impl LoaderConfig {
    pub(crate) fn buffer_size(&self) -> usize {
        self.buffer_size.max(1)
    }

    pub(crate) fn workers(&self) -> usize {
        self.workers.max(1)
    }
}

pub fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Where the LOD sampler gets its randomness from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LodSampling {
    /// New entropy-seeded generator for every call. Regenerating LODs for the
    /// same chunk yields a different subset each time.
    #[default]
    Fresh,
    /// Deterministic: each chunk's generator is seeded from this value and
    /// the chunk's position in cell order.
    Seeded(u64),
}

#[derive(Debug, Clone)]
pub struct LodConfig {
    pub thresholds: [usize; LOD_LEVELS],
    pub batch_size: usize,
    pub sampling: LodSampling,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            thresholds: LOD_THRESHOLDS,
            batch_size: LOD_BATCH_SIZE,
            sampling: LodSampling::Fresh,
        }
    }
}

impl LodConfig {
    pub fn seeded(seed: u64) -> Self {
        Self {
            sampling: LodSampling::Seeded(seed),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChunkConfig {
    pub lod: LodConfig,
    /// Build chunk LODs on the rayon pool. With seeded sampling the result
    /// does not depend on this flag.
    pub parallel: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            lod: LodConfig::default(),
            parallel: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OctreeConfig {
    pub max_points_per_node: usize,
    /// Nodes at this depth are leaves whatever their point count.
    pub max_depth: u32,
    pub sampling: LodSampling,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_points_per_node: MAX_POINTS_PER_NODE,
            max_depth: MAX_OCTREE_DEPTH,
            sampling: LodSampling::Fresh,
        }
    }
}
