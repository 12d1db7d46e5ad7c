// src/loader/mod.rs
//! Point cloud loaders.
//!
//! The `try_*` functions report every failure. The plain functions apply the
//! loading policy instead: text loading never fails (an unopenable file
//! yields an empty cloud), binary loading is all-or-nothing (any decode
//! error yields an empty cloud, never a partial one), and a failed HDF5 load
//! yields an empty cloud named after the file.

pub mod binary;
#[cfg(feature = "hdf5")]
pub mod h5;
pub mod text;

pub use self::binary::try_load_binary;
#[cfg(feature = "hdf5")]
pub use self::h5::try_load_hdf5;
pub use self::text::try_load_text;

use crate::config::LoaderConfig;
use crate::data::PointCloud;
use crate::error::{PointCloudError, Result};
use std::path::Path;

/// File extension of binary point cloud blobs.
pub const BINARY_EXTENSION: &str = "pcb";

/// Extensions routed to the HDF5 loader.
pub const HDF5_EXTENSIONS: [&str; 3] = ["h5", "hdf5", "f5"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Binary,
    Hdf5,
}

impl FileKind {
    /// Pick a loader by extension, ignoring case. Unknown extensions are text.
    pub fn of(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            return FileKind::Text;
        };

        if ext.eq_ignore_ascii_case(BINARY_EXTENSION) {
            FileKind::Binary
        } else if HDF5_EXTENSIONS.iter().any(|h| ext.eq_ignore_ascii_case(h)) {
            FileKind::Hdf5
        } else {
            FileKind::Text
        }
    }
}

/// Load any supported point file and report every failure.
pub fn try_load_point_cloud_file(
    path: &Path,
    downsample: usize,
    config: &LoaderConfig,
) -> Result<PointCloud> {
    match FileKind::of(path) {
        FileKind::Text => try_load_text(path, downsample, config),
        FileKind::Binary => try_load_binary(path, config),
        FileKind::Hdf5 => load_hdf5_file(path, downsample),
    }
}

#[cfg(feature = "hdf5")]
fn load_hdf5_file(path: &Path, downsample: usize) -> Result<PointCloud> {
    try_load_hdf5(path, downsample)
}

#[cfg(not(feature = "hdf5"))]
fn load_hdf5_file(path: &Path, _downsample: usize) -> Result<PointCloud> {
    Err(PointCloudError::Hdf5Layout(format!(
        "{}: built without the `hdf5` feature",
        path.display()
    )))
}

/// Load any supported point file; `.pcb` goes to the binary decoder,
/// `.h5`/`.hdf5`/`.f5` to the HDF5 reader, everything else is read as text.
pub fn load_point_cloud_file(path: impl AsRef<Path>, downsample: usize) -> PointCloud {
    load_point_cloud_file_with(path, downsample, &LoaderConfig::default())
}

pub fn load_point_cloud_file_with(
    path: impl AsRef<Path>,
    downsample: usize,
    config: &LoaderConfig,
) -> PointCloud {
    let path = path.as_ref();

    match FileKind::of(path) {
        FileKind::Binary => load_from_binary_with(path, config),
        FileKind::Hdf5 => match load_hdf5_file(path, downsample) {
            Ok(cloud) => cloud,
            Err(err) => {
                log::error!("Error loading HDF5 point cloud {}: {}", path.display(), err);
                PointCloud::named_for(path)
            }
        },
        FileKind::Text => match try_load_text(path, downsample, config) {
            Ok(cloud) => cloud,
            Err(err) => {
                log::error!("Failed to open point cloud file: {}", err);
                PointCloud::named_for(path)
            }
        },
    }
}

pub fn load_from_binary(path: impl AsRef<Path>) -> PointCloud {
    load_from_binary_with(path, &LoaderConfig::default())
}

pub fn load_from_binary_with(path: impl AsRef<Path>, config: &LoaderConfig) -> PointCloud {
    let path = path.as_ref();

    match try_load_binary(path, config) {
        Ok(cloud) => cloud,
        Err(err @ PointCloudError::Open { .. }) => {
            log::error!("Failed to open file for reading: {}", err);
            PointCloud::named_for(path)
        }
        Err(err) => {
            log::error!("Error loading point cloud {}: {}", path.display(), err);
            PointCloud::default()
        }
    }
}
