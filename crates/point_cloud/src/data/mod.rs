// src/data/mod.rs
//! Data model for loaded point clouds.
//!
//! This module provides:
//! - The GPU-ready `Point` record.
//! - Chunks, their LOD levels, and the `PointCloud` that owns them.

pub mod types;

// Re-export commonly used types for convenience.
pub use self::types::{CellIndex, Chunk, LodLevel, Point, PointCloud, Transform};
