//! Point cloud entries of a saved scene.
//!
//! A scene stores each cloud as a binary blob under `pointClouds/` next to
//! the scene file, plus a small JSON record carrying its name and transform.

use crate::config::LoaderConfig;
use crate::data::{PointCloud, Transform};
use crate::error::{PointCloudError, Result};
use crate::export::try_export_to_binary;
use crate::loader::{try_load_binary, BINARY_EXTENSION};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path};

pub const POINT_CLOUD_DIR: &str = "pointClouds";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointCloudRecord {
    pub name: String,
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub scale: [f32; 3],
    /// Blob path relative to the scene directory.
    #[serde(rename = "dataPath")]
    pub data_path: String,
}

impl PointCloudRecord {
    pub fn transform(&self) -> Transform {
        Transform {
            position: Vec3::from_array(self.position),
            rotation: Vec3::from_array(self.rotation),
            scale: Vec3::from_array(self.scale),
        }
    }
}

fn check_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(PointCloudError::Scene(format!(
            "point cloud name {name:?} is not usable as a file name"
        ))),
    }
}

/// Write `cloud` as `pointClouds/<name>.pcb` under `scene_dir`.
pub fn save_point_cloud(scene_dir: &Path, cloud: &PointCloud) -> Result<PointCloudRecord> {
    check_name(&cloud.name)?;

    let dir = scene_dir.join(POINT_CLOUD_DIR);
    fs::create_dir_all(&dir).map_err(|e| PointCloudError::open(&dir, e))?;

    let file_name = format!("{}.{}", cloud.name, BINARY_EXTENSION);
    try_export_to_binary(cloud, &dir.join(&file_name))?;

    let t = cloud.transform;
    Ok(PointCloudRecord {
        name: cloud.name.clone(),
        position: t.position.to_array(),
        rotation: t.rotation.to_array(),
        scale: t.scale.to_array(),
        data_path: format!("{POINT_CLOUD_DIR}/{file_name}"),
    })
}

/// Load the blob a record points at and restore its name and transform.
///
/// The blob already holds world-space positions, so a non-identity
/// transform ends up applied twice when the cloud is displayed.
pub fn load_point_cloud(scene_dir: &Path, record: &PointCloudRecord) -> Result<PointCloud> {
    if Path::new(&record.data_path)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(PointCloudError::Scene(format!(
            "data path {:?} escapes the scene directory",
            record.data_path
        )));
    }

    let path = scene_dir.join(&record.data_path);
    let mut cloud = try_load_binary(&path, &LoaderConfig::default())?;
    cloud.name = record.name.clone();
    cloud.transform = record.transform();

    log::debug!("{}: restored {} points from {}", cloud.name, cloud.point_count(), path.display());

    Ok(cloud)
}

pub fn records_to_json(records: &[PointCloudRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

pub fn records_from_json(json: &str) -> Result<Vec<PointCloudRecord>> {
    Ok(serde_json::from_str(json)?)
}
