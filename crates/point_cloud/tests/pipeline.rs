use glam::Vec3;
use point_cloud::chunker::cell_index;
use point_cloud::config::LOD_LEVELS;
use point_cloud::{
    export_to_binary, generate_chunks, generate_chunks_with, load_from_binary,
    load_point_cloud_file, CellIndex, ChunkConfig, LodConfig, LodSampling, Point, PointCloud,
};
use std::fs;

#[test]
fn two_point_text_scene() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two.xyz");
    fs::write(&path, "0 0 0 1.0 255 0 0\n1 1 1 1.0 0 255 0\n").unwrap();

    let mut cloud = load_point_cloud_file(&path, 1);
    assert_eq!(cloud.point_count(), 2);
    assert_eq!(cloud.points[0].color, [1.0, 0.0, 0.0]);
    assert_eq!(cloud.points[1].color, [0.0, 1.0, 0.0]);
    assert!(cloud.points.iter().all(|p| p.intensity == 1.0));

    generate_chunks(&mut cloud, 1.0).unwrap();
    assert_eq!(cloud.chunk_count(), 2);

    let expected = [
        (CellIndex(0, 0, 0), Vec3::splat(0.5)),
        (CellIndex(1, 1, 1), Vec3::splat(1.5)),
    ];
    for (chunk, (cell, center)) in cloud.chunks.iter().zip(expected) {
        assert_eq!(chunk.cell, cell);
        assert_eq!(chunk.point_count(), 1);
        assert_eq!(chunk.center_position, center);
        assert!((chunk.bounding_radius - 0.75f32.sqrt()).abs() < 1e-5);
        assert_eq!(chunk.lod_point_counts(), [1; LOD_LEVELS]);
    }

    // Full-resolution points stay on the cloud.
    assert_eq!(cloud.point_count(), 2);
}

#[test]
fn binary_round_trip_then_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cloud.pcb");

    let mut src = PointCloud::named_for("synthetic");
    for i in 0..2_000u32 {
        let t = i as f32 * 0.01;
        src.points.push(Point::new(
            [t.sin() * 4.0, t.cos() * 4.0, t],
            (i % 7) as f32 * 0.25,
            [(i % 255) as f32 / 255.0, 0.5, 1.0],
        ));
    }
    assert!(export_to_binary(&src, &path));

    let mut back = load_from_binary(&path);
    assert_eq!(back.point_count(), src.point_count());
    for (a, b) in src.points.iter().zip(&back.points) {
        assert_eq!(a.position, b.position);
        assert!((a.intensity - b.intensity).abs() <= 0.0005);
        for c in 0..3 {
            assert!((a.color[c] - b.color[c]).abs() <= 1.0 / 255.0);
        }
    }

    let config = ChunkConfig {
        lod: LodConfig {
            thresholds: [usize::MAX, 200, 100, 50, 10],
            batch_size: 32,
            sampling: LodSampling::Seeded(11),
        },
        parallel: true,
    };
    generate_chunks_with(&mut back, 2.0, &config).unwrap();

    assert_eq!(back.chunked_point_count(), back.point_count());
    for chunk in &back.chunks {
        let counts = chunk.lod_point_counts();
        assert!(counts.windows(2).all(|w| w[0] >= w[1]));
        for (level, &threshold) in config.lod.thresholds.iter().enumerate() {
            if chunk.point_count() <= threshold {
                assert_eq!(counts[level], chunk.point_count());
            } else {
                assert!(counts[level] <= threshold);
            }
        }
        for p in chunk.points.iter() {
            assert_eq!(cell_index(p.pos(), 2.0), chunk.cell);
        }
    }
}

#[test]
fn corrupt_magic_gives_empty_cloud() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.pcb");

    let mut src = PointCloud::named_for("ok");
    src.points.push(Point::new([1.0, 2.0, 3.0], 1.0, [1.0; 3]));
    assert!(export_to_binary(&src, &path));

    let mut bytes = fs::read(&path).unwrap();
    bytes[..4].copy_from_slice(b"XXXX");
    fs::write(&path, bytes).unwrap();

    let cloud = load_from_binary(&path);
    assert!(cloud.is_empty());
    assert!(cloud.chunks.is_empty());
}
