//! Parallel decode of PCB blobs into a `PointCloud`.

use crate::config::LoaderConfig;
use crate::data::{Point, PointCloud};
use crate::error::{PointCloudError, Result};
use crate::workers::run_batched;
use pcb::{dequantize_channel, dequantize_intensity, PcbRecord, RECORD_SIZE};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

#[inline]
pub(crate) fn point_from_record(record: &PcbRecord) -> Point {
    Point {
        position: record.position,
        intensity: dequantize_intensity(record.intensity),
        color: record.color.map(dequantize_channel),
    }
}

/// Decode a PCB file. All-or-nothing: any error discards every decoded
/// point.
pub fn try_load_binary(path: &Path, config: &LoaderConfig) -> Result<PointCloud> {
    let mut cloud = PointCloud::named_for(path);
    let file = File::open(path).map_err(|e| PointCloudError::open(path, e))?;
    let mut reader = BufReader::new(file);

    let declared = pcb::read_header(&mut reader).map_err(PointCloudError::from_codec)? as usize;
    log::debug!("{}: header declares {} points", path.display(), declared);

    let records_per_buffer = (config.buffer_size() / RECORD_SIZE).max(1);
    let mut requested = 0usize;
    let decoded = AtomicUsize::new(0);
    let mut truncated = false;

    let outcome = run_batched(
        || -> io::Result<Option<Vec<u8>>> {
            if requested >= declared || truncated {
                return Ok(None);
            }

            let wanted = records_per_buffer.min(declared - requested);
            let mut buffer = Vec::with_capacity(wanted * RECORD_SIZE);
            (&mut reader)
                .take((wanted * RECORD_SIZE) as u64)
                .read_to_end(&mut buffer)?;

            // Keep whole records only; a short read means the file ends early.
            let whole = buffer.len() / RECORD_SIZE;
            buffer.truncate(whole * RECORD_SIZE);
            if whole < wanted {
                truncated = true;
            }
            if whole == 0 {
                return Ok(None);
            }

            requested += whole;
            Ok(Some(buffer))
        },
        config.workers(),
        |buffer| {
            // Length is a whole number of records by construction.
            let points: Vec<Point> = pcb::iter_records(&buffer)
                .map(|record| point_from_record(&record))
                .collect();
            decoded.fetch_add(points.len(), Ordering::Relaxed);
            points
        },
    );

    if let Some(err) = outcome.error {
        return Err(PointCloudError::from_codec(err));
    }

    let read = decoded.load(Ordering::Relaxed);
    if read < declared {
        return Err(PointCloudError::Truncated {
            expected: declared,
            read,
        });
    }

    cloud.points = outcome.points;

    log::info!(
        "Successfully loaded point cloud from: {} ({} points, {} buffers)",
        path.display(),
        cloud.points.len(),
        outcome.jobs
    );

    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcb::{PcbFile, PcbWriter};
    use std::io::Write;

    fn records(n: usize) -> Vec<PcbRecord> {
        (0..n)
            .map(|i| PcbRecord {
                position: [i as f32, -(i as f32), 0.5],
                intensity: (i * 7 % 2000) as u32,
                color: [(i % 256) as u8, 0, 255],
            })
            .collect()
    }

    fn write_blob(records: &[PcbRecord]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        pcb::write_file(
            file.path(),
            &PcbFile {
                records: records.to_vec(),
            },
        )
        .unwrap();
        file
    }

    #[test]
    fn decodes_in_file_order_with_small_buffers() {
        let recs = records(1000);
        let file = write_blob(&recs);
        let config = LoaderConfig {
            buffer_size: RECORD_SIZE * 13 + 5,
            workers: 4,
            ..LoaderConfig::default()
        };

        let cloud = try_load_binary(file.path(), &config).unwrap();
        assert_eq!(cloud.point_count(), 1000);
        for (p, r) in cloud.points.iter().zip(&recs) {
            assert_eq!(p.position, r.position);
            assert!((p.intensity - r.intensity as f32 / 1000.0).abs() < 1e-6);
            assert_eq!(p.color[2], 1.0);
        }
    }

    #[test]
    fn truncated_payload_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        {
            let mut writer = PcbWriter::new(Vec::new(), 10).unwrap();
            for r in records(10) {
                writer.write_record(&r).unwrap();
            }
            let bytes = writer.finish().unwrap();
            file.write_all(&bytes[..bytes.len() - RECORD_SIZE - 4]).unwrap();
            file.flush().unwrap();
        }

        let err = try_load_binary(file.path(), &LoaderConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PointCloudError::Truncated {
                expected: 10,
                read: 8
            }
        ));
    }

    #[test]
    fn corrupt_magic_is_format_error() {
        let file = write_blob(&records(3));
        let mut bytes = std::fs::read(file.path()).unwrap();
        bytes[1] ^= 0xFF;
        std::fs::write(file.path(), &bytes).unwrap();

        let err = try_load_binary(file.path(), &LoaderConfig::default()).unwrap_err();
        assert!(matches!(err, PointCloudError::Format(_)));
    }

    #[test]
    fn empty_blob_loads_empty_cloud() {
        let file = write_blob(&[]);
        let cloud = try_load_binary(file.path(), &LoaderConfig::default()).unwrap();
        assert!(cloud.is_empty());
    }
}
