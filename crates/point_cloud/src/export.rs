//! Writers for text, binary and (with the `hdf5` feature) HDF5 point files.
//!
//! All formats store world-space points: the cloud's current transform is
//! baked into every position on the way out. A failure half-way through
//! leaves the partially written file in place.

use crate::data::{Point, PointCloud};
use crate::error::{PointCloudError, Result};
use glam::{Mat4, Vec3};
use pcb::{quantize_channel, quantize_intensity, PcbRecord, PcbWriter};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[inline]
fn world_position(model: &Mat4, point: &Point) -> [f32; 3] {
    model.transform_point3(Vec3::from_array(point.position)).to_array()
}

pub(crate) fn to_record(model: &Mat4, point: &Point) -> PcbRecord {
    PcbRecord {
        position: world_position(model, point),
        intensity: quantize_intensity(point.intensity),
        color: point.color.map(quantize_channel),
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| PointCloudError::open(path, e))
}

pub fn try_export_to_binary(cloud: &PointCloud, path: &Path) -> Result<()> {
    let count = u32::try_from(cloud.points.len()).map_err(|_| {
        PointCloudError::Format(format!("{} points do not fit a PCB header", cloud.points.len()))
    })?;

    let model = cloud.model_matrix();
    let mut writer = PcbWriter::new(create(path)?, count)?;

    for point in &cloud.points {
        writer.write_record(&to_record(&model, point))?;
    }

    writer.finish()?;

    log::info!(
        "Exported {} points to {} (binary)",
        cloud.points.len(),
        path.display()
    );

    Ok(())
}

/// Returns `false` if the file could not be written; the reason is logged.
pub fn export_to_binary(cloud: &PointCloud, path: impl AsRef<Path>) -> bool {
    report(try_export_to_binary(cloud, path.as_ref()))
}

/// One line per point: `x y z intensity r g b`, positions with three
/// decimals, intensity in thousandths, color channels 0..255.
pub fn write_xyz<W: Write>(cloud: &PointCloud, out: &mut W) -> io::Result<()> {
    let model = cloud.model_matrix();

    for point in &cloud.points {
        let [x, y, z] = world_position(&model, point);
        let [r, g, b] = point.color.map(quantize_channel);
        writeln!(
            out,
            "{:.3} {:.3} {:.3} {} {} {} {}",
            x,
            y,
            z,
            (point.intensity * 1000.0) as i32,
            r,
            g,
            b
        )?;
    }

    Ok(())
}

pub fn try_export_to_xyz(cloud: &PointCloud, path: &Path) -> Result<()> {
    let mut out = create(path)?;
    write_xyz(cloud, &mut out)?;
    out.flush()?;

    log::info!(
        "Exported {} points to {} (text)",
        cloud.points.len(),
        path.display()
    );

    Ok(())
}

pub fn export_to_xyz(cloud: &PointCloud, path: impl AsRef<Path>) -> bool {
    report(try_export_to_xyz(cloud, path.as_ref()))
}

/// `ctime`-style timestamp stored in the `created` attribute.
#[cfg(feature = "hdf5")]
const CREATED_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Write a single `points` dataset of compound records, tagged with
/// `point_count`, `name` and `created` attributes.
#[cfg(feature = "hdf5")]
pub fn try_export_to_hdf5(cloud: &PointCloud, path: &Path) -> Result<()> {
    use crate::loader::h5::H5Point;
    use hdf5::types::VarLenUnicode;

    let model = cloud.model_matrix();
    let records: Vec<H5Point> = cloud
        .points
        .iter()
        .map(|p| H5Point::new(world_position(&model, p), p))
        .collect();

    let file = hdf5::File::create(path)?;
    let dataset = file
        .new_dataset::<H5Point>()
        .shape(records.len())
        .create("points")?;
    dataset.write_raw(&records)?;

    let text = |value: &str| {
        value
            .parse::<VarLenUnicode>()
            .map_err(|e| PointCloudError::Hdf5Layout(format!("attribute {value:?}: {e}")))
    };
    dataset
        .new_attr::<u64>()
        .shape(())
        .create("point_count")?
        .write_scalar(&(records.len() as u64))?;
    dataset
        .new_attr::<VarLenUnicode>()
        .shape(())
        .create("name")?
        .write_scalar(&text(&cloud.name)?)?;
    let created = chrono::Local::now().format(CREATED_FORMAT).to_string();
    dataset
        .new_attr::<VarLenUnicode>()
        .shape(())
        .create("created")?
        .write_scalar(&text(&created)?)?;

    log::info!(
        "Exported {} points to {} (HDF5)",
        records.len(),
        path.display()
    );

    Ok(())
}

#[cfg(feature = "hdf5")]
pub fn export_to_hdf5(cloud: &PointCloud, path: impl AsRef<Path>) -> bool {
    report(try_export_to_hdf5(cloud, path.as_ref()))
}

fn report(result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err @ PointCloudError::Open { .. }) => {
            log::error!("Failed to open file for writing: {}", err);
            false
        }
        Err(err) => {
            log::error!("Export failed: {}", err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Transform;
    use crate::loader::{load_from_binary, load_point_cloud_file};

    fn cloud() -> PointCloud {
        let mut cloud = PointCloud::named_for("mem");
        cloud.points = vec![
            Point::new([1.0, 2.0, 3.0], 0.1234, [1.0, 0.5, 0.0]),
            Point::new([-4.5, 0.0, 7.25], 2.0, [0.2, 0.4, 0.6]),
        ];
        cloud
    }

    #[test]
    fn binary_round_trip_bakes_transform() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.pcb");

        let mut src = cloud();
        src.transform = Transform {
            position: Vec3::new(10.0, 0.0, -1.0),
            rotation: Vec3::new(0.0, 90.0, 0.0),
            scale: Vec3::splat(2.0),
        };
        assert!(export_to_binary(&src, &path));

        let back = load_from_binary(&path);
        assert_eq!(back.point_count(), 2);
        assert!(back.transform.is_identity());

        let model = src.model_matrix();
        for (a, b) in src.points.iter().zip(&back.points) {
            let expected = model.transform_point3(a.pos());
            assert!((expected - b.pos()).length() < 1e-4);
            assert!((a.intensity - b.intensity).abs() <= 0.0005);
            for c in 0..3 {
                assert!((a.color[c] - b.color[c]).abs() <= 1.0 / 255.0);
            }
        }
    }

    #[test]
    fn xyz_lines() {
        let mut buf = Vec::new();
        write_xyz(&cloud(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "1.000 2.000 3.000 123 255 128 0");
        assert_eq!(lines[1], "-4.500 0.000 7.250 2000 51 102 153");
    }

    #[test]
    fn xyz_reimports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.xyz");
        assert!(export_to_xyz(&cloud(), &path));

        let back = load_point_cloud_file(&path, 1);
        assert_eq!(back.point_count(), 2);
        assert_eq!(back.points[1].position, [-4.5, 0.0, 7.25]);
        assert_eq!(back.points[1].intensity, 1.0);
    }

    #[test]
    fn unwritable_path_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("c.pcb");
        assert!(!export_to_binary(&cloud(), &path));
        assert!(!export_to_xyz(&cloud(), &path));
        #[cfg(feature = "hdf5")]
        assert!(!export_to_hdf5(&cloud(), path.with_extension("h5")));
    }
}
