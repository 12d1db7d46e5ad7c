// src/lib.rs
//! Point cloud ingestion and spatial preparation.
//!
//! Loads text (`x y z intensity r g b`), binary `.pcb` and (with the `hdf5`
//! feature) HDF5 point files, partitions the points into a uniform grid of
//! chunks, and builds a pyramid of randomly sampled levels of detail per
//! chunk. An octree with density-driven leaf levels can be built over the
//! same points. The finished arrays are handed to a renderer through the
//! `handoff::BufferOwner` seam.

pub mod chunker;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod handoff;
pub mod loader;
pub mod lod;
pub mod octree;
pub mod outline;
pub mod scene;

mod workers;

pub use chunker::{generate_chunks, generate_chunks_with};
pub use config::{
    BoundaryLines, ChunkConfig, LoaderConfig, LodConfig, LodSampling, OctreeConfig,
};
pub use data::{CellIndex, Chunk, LodLevel, Point, PointCloud, Transform};
pub use error::{PointCloudError, Result};
#[cfg(feature = "hdf5")]
pub use export::export_to_hdf5;
pub use export::{export_to_binary, export_to_xyz};
pub use loader::{load_from_binary, load_point_cloud_file, try_load_point_cloud_file};
pub use octree::{build_octree, Octree, OctreeNode};
