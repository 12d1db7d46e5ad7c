//! Error type shared by the loaders, exporters and the chunker.

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, PointCloudError>;

#[derive(Debug, thiserror::Error)]
pub enum PointCloudError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid binary point cloud: {0}")]
    Format(String),

    #[error("binary point cloud truncated: header declares {expected} points, read {read}")]
    Truncated { expected: usize, read: usize },

    #[error("chunk size must be positive and finite, got {0}")]
    InvalidChunkSize(f32),

    #[error("scene record error: {0}")]
    Scene(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("unsupported HDF5 layout: {0}")]
    Hdf5Layout(String),
}

impl PointCloudError {
    pub(crate) fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    /// Map an error coming out of the `pcb` codec: bad data is a format
    /// error, everything else stays an I/O error.
    pub(crate) fn from_codec(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidData => Self::Format(err.to_string()),
            _ => Self::Io(err),
        }
    }
}
