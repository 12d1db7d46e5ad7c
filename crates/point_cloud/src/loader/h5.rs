//! HDF5 point files (`.h5`, `.hdf5`, `.f5`).
//!
//! Our own files hold a 1-D dataset `points` of compound records with seven
//! `f32` members. Files from other tools are searched for point data in
//! this order: well-known top-level dataset names, the first `t=<time>`
//! group, the F5 `Selection/Points/StandardCartesianChart3D` layout (`.f5`
//! only), and finally the first top-level object.

use crate::data::{Point, PointCloud};
use crate::error::{PointCloudError, Result};
use hdf5::types::TypeDescriptor;
use hdf5::{Dataset, File, Group, H5Type};
use std::path::Path;

const TOP_LEVEL_NAMES: [&str; 4] = ["points", "point_cloud", "data", "vertices"];

/// Dataset names taken as point data below a time-step group.
const POINT_NAMES: [&str; 6] = ["vertices", "points", "coordinates", "positions", "Mesh", "mesh"];

/// Group names worth descending into below a time-step group.
const NESTED_NAMES: [&str; 5] = ["geometry", "cells", "topology", "Points", "VerticesSet"];

const MAX_SEARCH_DEPTH: usize = 5;

const F5_CHART_PATH: [&str; 3] = ["Selection", "Points", "StandardCartesianChart3D"];

/// Compound record stored per point. Members are matched by name on read,
/// so their order in a foreign file does not matter.
#[derive(H5Type, Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct H5Point {
    pub position_x: f32,
    pub position_y: f32,
    pub position_z: f32,
    pub intensity: f32,
    pub color_r: f32,
    pub color_g: f32,
    pub color_b: f32,
}

impl H5Point {
    pub fn new(position: [f32; 3], point: &Point) -> Self {
        let [position_x, position_y, position_z] = position;
        let [color_r, color_g, color_b] = point.color;
        Self {
            position_x,
            position_y,
            position_z,
            intensity: point.intensity,
            color_r,
            color_g,
            color_b,
        }
    }
}

impl From<H5Point> for Point {
    fn from(p: H5Point) -> Self {
        Point::new(
            [p.position_x, p.position_y, p.position_z],
            p.intensity,
            [p.color_r, p.color_g, p.color_b],
        )
    }
}

/// Indices kept by downsampling: `n / factor` points at stride `factor`.
fn strided(n: usize, downsample: usize) -> impl Iterator<Item = usize> {
    let step = downsample.max(1);
    (0..n / step).map(move |i| i * step)
}

fn is_compound(dataset: &Dataset) -> Result<bool> {
    Ok(matches!(
        dataset.dtype()?.to_descriptor()?,
        TypeDescriptor::Compound(_)
    ))
}

fn read_compound(dataset: &Dataset, downsample: usize) -> Result<Vec<Point>> {
    let records = dataset.read_raw::<H5Point>()?;
    Ok(strided(records.len(), downsample)
        .map(|i| Point::from(records[i]))
        .collect())
}

/// An `N x 3` numeric dataset read as bare positions: white, intensity 1.
fn read_positions(dataset: &Dataset, downsample: usize) -> Result<Vec<Point>> {
    let shape = dataset.shape();
    if shape.len() != 2 || shape[1] != 3 {
        return Err(PointCloudError::Hdf5Layout(format!(
            "dataset {} has shape {:?}, expected N x 3",
            dataset.name(),
            shape
        )));
    }

    let xyz = dataset.read_raw::<f32>()?;
    Ok(strided(shape[0], downsample)
        .map(|i| Point::new([xyz[3 * i], xyz[3 * i + 1], xyz[3 * i + 2]], 1.0, [1.0; 3]))
        .collect())
}

/// First dataset directly in `group` whose shape passes `accept`, read as
/// flat `f32`.
fn first_dataset_where(group: &Group, accept: impl Fn(&[usize]) -> bool) -> Result<Option<Vec<f32>>> {
    for name in group.member_names()? {
        if let Ok(dataset) = group.dataset(&name) {
            if accept(&dataset.shape()) {
                return Ok(Some(dataset.read_raw::<f32>()?));
            }
        }
    }
    Ok(None)
}

fn f5_chart(file: &File, time_step: &str) -> Option<Group> {
    let mut group = file.group(time_step).ok()?;
    for name in F5_CHART_PATH {
        group = group.group(name).ok()?;
    }
    Some(group)
}

/// Positions, RGB (0..255) and intensity held in separate F5 chart groups.
/// Missing colors default to white and missing intensities to 1.
fn read_f5_chart(chart: &Group, downsample: usize) -> Result<Option<Vec<Point>>> {
    let is_xyz = |shape: &[usize]| shape.len() == 2 && shape[0] > 0 && shape[1] == 3;

    let mut positions = match chart.group("Positions") {
        Ok(group) => first_dataset_where(&group, is_xyz)?,
        Err(_) => None,
    };
    if positions.is_none() {
        for name in chart.member_names()? {
            if let Ok(group) = chart.group(&name) {
                positions = first_dataset_where(&group, is_xyz)?;
                if positions.is_some() {
                    break;
                }
            }
        }
    }
    let Some(xyz) = positions else {
        return Ok(None);
    };
    let n = xyz.len() / 3;

    let rgb = match chart.group("RGB") {
        Ok(group) => first_dataset_where(&group, |s| s.len() == 2 && s[0] == n && s[1] == 3)?,
        Err(_) => None,
    };
    let intensity = match chart.group("Intensity") {
        Ok(group) => first_dataset_where(&group, |s| {
            s.first() == Some(&n) && s[1..].iter().all(|&d| d == 1)
        })?,
        Err(_) => None,
    };

    let points = strided(n, downsample)
        .map(|i| {
            let color = rgb
                .as_ref()
                .map_or([1.0; 3], |c| [c[3 * i], c[3 * i + 1], c[3 * i + 2]].map(|v| v / 255.0));
            let intensity = intensity.as_ref().map_or(1.0, |v| v[i]);
            Point::new([xyz[3 * i], xyz[3 * i + 1], xyz[3 * i + 2]], intensity, color)
        })
        .collect();

    Ok(Some(points))
}

/// Depth-first search for point data below a time-step group.
fn search_group(group: &Group, depth: usize) -> Result<Option<Dataset>> {
    let names = group.member_names()?;

    for name in names.iter().filter(|n| POINT_NAMES.contains(&n.as_str())) {
        if let Ok(dataset) = group.dataset(name) {
            return Ok(Some(dataset));
        }
    }

    if depth >= MAX_SEARCH_DEPTH {
        return Ok(None);
    }

    for name in names.iter().filter(|n| NESTED_NAMES.contains(&n.as_str())) {
        if let Ok(nested) = group.group(name) {
            if let Some(dataset) = search_group(&nested, depth + 1)? {
                return Ok(Some(dataset));
            }
        }
    }

    let Some(first) = names.first() else {
        return Ok(None);
    };
    if let Ok(dataset) = group.dataset(first) {
        return Ok(Some(dataset));
    }
    match group.group(first) {
        Ok(nested) => search_group(&nested, depth + 1),
        Err(_) => Ok(None),
    }
}

fn time_step_dataset(file: &File, time_step: &str) -> Result<Option<Dataset>> {
    if let Ok(dataset) = file.dataset(time_step) {
        return Ok(Some(dataset));
    }
    match file.group(time_step) {
        Ok(group) => search_group(&group, 1),
        Err(_) => Ok(None),
    }
}

fn is_f5_path(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("f5"))
}

fn read_points(file: &File, path: &Path, downsample: usize) -> Result<Vec<Point>> {
    let names = file.member_names()?;
    log::debug!("{}: top-level objects {:?}", path.display(), names);

    let time_step = names.iter().find(|n| n.starts_with("t="));
    let chart = match time_step {
        Some(t) if is_f5_path(path) => f5_chart(file, t),
        _ => None,
    };

    let mut dataset = TOP_LEVEL_NAMES
        .iter()
        .find_map(|name| file.dataset(name).ok());

    if dataset.is_none() {
        if let Some(t) = time_step {
            dataset = time_step_dataset(file, t)?;
        }
    }

    if dataset.is_none() {
        if let Some(chart) = &chart {
            if let Some(points) = read_f5_chart(chart, downsample)? {
                return Ok(points);
            }
        }
        dataset = names.first().and_then(|name| file.dataset(name).ok());
    }

    let Some(dataset) = dataset else {
        return Err(PointCloudError::Hdf5Layout(
            "no point dataset found".to_string(),
        ));
    };
    log::debug!("{}: reading dataset {}", path.display(), dataset.name());

    if is_compound(&dataset)? {
        return read_compound(&dataset, downsample);
    }
    if let Some(chart) = &chart {
        if let Some(points) = read_f5_chart(chart, downsample)? {
            return Ok(points);
        }
    }
    read_positions(&dataset, downsample)
}

/// Load an HDF5 point file, keeping `n / downsample` points at stride
/// `downsample`.
pub fn try_load_hdf5(path: &Path, downsample: usize) -> Result<PointCloud> {
    let mut cloud = PointCloud::named_for(path);
    let file = File::open(path)?;

    log::info!("Loading HDF5 point cloud from: {}", path.display());

    cloud.points = read_points(&file, path, downsample)?;

    log::info!(
        "{}: {} points loaded (downsample {})",
        path.display(),
        cloud.points.len(),
        downsample.max(1)
    );

    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::try_export_to_hdf5;
    use crate::data::Transform;
    use glam::Vec3;
    use hdf5::types::VarLenUnicode;

    fn sample(n: usize) -> PointCloud {
        let mut cloud = PointCloud::named_for("scan.h5");
        cloud.points = (0..n)
            .map(|i| Point::new([i as f32, 0.5, -1.0], 0.25, [0.0, 0.5, 1.0]))
            .collect();
        cloud
    }

    #[test]
    fn export_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.h5");

        let mut cloud = sample(10);
        cloud.transform = Transform {
            position: Vec3::new(0.0, 0.0, 5.0),
            ..Transform::default()
        };
        try_export_to_hdf5(&cloud, &path).unwrap();

        let back = try_load_hdf5(&path, 1).unwrap();
        assert_eq!(back.name, "PointCloud_scan.h5");
        assert_eq!(back.point_count(), 10);
        // The transform is baked into the stored positions.
        assert_eq!(back.points[3].position, [3.0, 0.5, 4.0]);
        assert_eq!(back.points[3].intensity, 0.25);
        assert_eq!(back.points[3].color, [0.0, 0.5, 1.0]);

        let file = File::open(&path).unwrap();
        let points = file.dataset("points").unwrap();
        assert_eq!(points.attr("point_count").unwrap().read_scalar::<u64>().unwrap(), 10);
        let name: VarLenUnicode = points.attr("name").unwrap().read_scalar().unwrap();
        assert_eq!(name.as_str(), "PointCloud_scan.h5");
        assert!(points.attr("created").is_ok());
    }

    #[test]
    fn downsampling_reads_at_stride() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.hdf5");
        try_export_to_hdf5(&sample(10), &path).unwrap();

        let xs: Vec<f32> = try_load_hdf5(&path, 3)
            .unwrap()
            .points
            .iter()
            .map(|p| p.position[0])
            .collect();
        assert_eq!(xs, vec![0.0, 3.0, 6.0]);
    }

    #[test]
    fn time_step_group_is_searched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.h5");
        {
            let file = File::create(&path).unwrap();
            let geometry = file.create_group("t=0.5").unwrap().create_group("geometry").unwrap();
            let xyz: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
            let ds = geometry
                .new_dataset::<f32>()
                .shape((2, 3))
                .create("coordinates")
                .unwrap();
            ds.write_raw(&xyz).unwrap();
        }

        let cloud = try_load_hdf5(&path, 1).unwrap();
        assert_eq!(cloud.point_count(), 2);
        assert_eq!(cloud.points[1].position, [4.0, 5.0, 6.0]);
        assert_eq!(cloud.points[1].color, [1.0; 3]);
        assert_eq!(cloud.points[1].intensity, 1.0);
    }

    #[test]
    fn f5_chart_groups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.f5");
        {
            let file = File::create(&path).unwrap();
            let chart = file
                .create_group("t=0")
                .unwrap()
                .create_group("Selection")
                .unwrap()
                .create_group("Points")
                .unwrap()
                .create_group("StandardCartesianChart3D")
                .unwrap();

            let write = |group: &str, shape: (usize, usize), data: &[f32]| {
                let ds = chart
                    .create_group(group)
                    .unwrap()
                    .new_dataset::<f32>()
                    .shape(shape)
                    .create("Fragment[0]")
                    .unwrap();
                ds.write_raw(data).unwrap();
            };
            write("Positions", (2, 3), &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
            write("RGB", (2, 3), &[255.0, 0.0, 0.0, 0.0, 255.0, 0.0]);
            write("Intensity", (2, 1), &[0.5, 2.0]);
        }

        let cloud = try_load_hdf5(&path, 1).unwrap();
        assert_eq!(cloud.point_count(), 2);
        assert_eq!(cloud.points[0].color, [1.0, 0.0, 0.0]);
        assert_eq!(cloud.points[1].position, [1.0, 1.0, 1.0]);
        assert_eq!(cloud.points[1].intensity, 2.0);
    }

    #[test]
    fn file_without_datasets_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.h5");
        File::create(&path).unwrap().create_group("nothing").unwrap();

        assert!(matches!(
            try_load_hdf5(&path, 1),
            Err(PointCloudError::Hdf5Layout(_))
        ));
    }

    #[test]
    fn f5_extension_ignores_case() {
        assert!(is_f5_path(Path::new("a/scan.f5")));
        assert!(is_f5_path(Path::new("scan.F5")));
        assert!(!is_f5_path(Path::new("scan.h5")));
        assert!(!is_f5_path(Path::new("f5")));
    }
}
