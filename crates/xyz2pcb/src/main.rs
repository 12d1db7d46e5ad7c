use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use point_cloud::config::{BoundaryLines, LoaderConfig, LodSampling, LOD_LEVELS};
use point_cloud::export::{try_export_to_binary, try_export_to_xyz};
use point_cloud::loader::{try_load_point_cloud_file, BINARY_EXTENSION, HDF5_EXTENSIONS};
use point_cloud::{
    build_octree, generate_chunks_with, ChunkConfig, LodConfig, OctreeConfig, PointCloud,
};
use rayon::prelude::*;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use walkdir::WalkDir;

/// Extensions read as `x y z intensity r g b` text.
const TEXT_EXTENSIONS: [&str; 3] = ["xyz", "txt", "pts"];

/// Output format; the input format is the other one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
enum Target {
    /// Text (and, with the `hdf5` feature, HDF5) files -> binary `.pcb` blobs.
    Pcb,
    /// `.pcb` blobs -> text `.xyz` files.
    Xyz,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Target::Pcb => "pcb",
            Target::Xyz => "xyz",
        };

        f.write_str(s)
    }
}

impl Target {
    fn output_extension(self) -> &'static str {
        match self {
            Target::Pcb => BINARY_EXTENSION,
            Target::Xyz => "xyz",
        }
    }

    fn accepts(self, ext: &str) -> bool {
        match self {
            Target::Pcb => {
                TEXT_EXTENSIONS.contains(&ext)
                    || (cfg!(feature = "hdf5") && HDF5_EXTENSIONS.contains(&ext))
            }
            Target::Xyz => ext == BINARY_EXTENSION,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "xyz2pcb", version)]
struct Args {
    #[arg(long, env = "XYZ2PCB_INPUT_DIR", default_value = "clouds")]
    input_dir: PathBuf,

    #[arg(long, env = "XYZ2PCB_OUTPUT_DIR", default_value = "clouds_bin")]
    output_dir: PathBuf,

    #[arg(long, env = "XYZ2PCB_TO", value_enum, default_value_t = Target::Pcb)]
    to: Target,

    /// Keep every Nth line of text input (1 = keep all).
    #[arg(long, env = "XYZ2PCB_DOWNSAMPLE", default_value_t = 1)]
    downsample: usize,

    #[arg(long, env = "XYZ2PCB_OVERWRITE", default_value_t = false)]
    overwrite: bool,

    /// Carry text lines cut by a read buffer into the next buffer instead
    /// of dropping them.
    #[arg(long, env = "XYZ2PCB_KEEP_SPLIT_LINES", default_value_t = false)]
    keep_split_lines: bool,

    /// Chunk every cloud at this cell size and report per-level LOD totals.
    #[arg(long, env = "XYZ2PCB_CHUNK_SIZE")]
    chunk_size: Option<f32>,

    /// Build an octree over every cloud and report its shape.
    #[arg(long, env = "XYZ2PCB_OCTREE", default_value_t = false)]
    octree: bool,

    /// Seed for reproducible LOD sampling (with --chunk-size or --octree).
    #[arg(long, env = "XYZ2PCB_SEED")]
    seed: Option<u64>,

    /// Write a JSON summary of the run to this path.
    #[arg(long, env = "XYZ2PCB_SUMMARY")]
    summary: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ChunkReport {
    chunk_size: f32,
    chunks: usize,
    lod_points: [usize; LOD_LEVELS],
}

#[derive(Debug, Serialize)]
struct OctreeReport {
    nodes: usize,
    leaves: usize,
    depth: u32,
    lod_points: [usize; LOD_LEVELS],
}

#[derive(Debug, Serialize)]
struct FileReport {
    input: PathBuf,
    output: PathBuf,
    points: usize,
    skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunking: Option<ChunkReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    octree: Option<OctreeReport>,
}

#[derive(Debug, Serialize)]
struct Summary {
    target: Target,
    converted: Vec<FileReport>,
    failed: Vec<PathBuf>,
}

fn collect_inputs(input_dir: &Path, target: Target) -> Vec<PathBuf> {
    let mut inputs: Vec<PathBuf> = WalkDir::new(input_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|s| s.to_str())
                .map(|s| target.accepts(&s.to_ascii_lowercase()))
                .unwrap_or(false)
        })
        .collect();

    inputs.sort();
    inputs
}

/// Mirror `input`'s position under `input_dir` into `output_dir`.
fn output_path(input: &Path, input_dir: &Path, output_dir: &Path, target: Target) -> PathBuf {
    let relative = input
        .strip_prefix(input_dir)
        .unwrap_or_else(|_| Path::new(input.file_name().unwrap_or_default()));

    output_dir
        .join(relative)
        .with_extension(target.output_extension())
}

fn chunk_cloud(cloud: &mut PointCloud, chunk_size: f32, seed: Option<u64>) -> Result<ChunkReport> {
    let config = ChunkConfig {
        lod: seed.map(LodConfig::seeded).unwrap_or_default(),
        parallel: true,
    };
    generate_chunks_with(cloud, chunk_size, &config)?;

    let mut lod_points = [0usize; LOD_LEVELS];
    for chunk in &cloud.chunks {
        for (total, count) in lod_points.iter_mut().zip(chunk.lod_point_counts()) {
            *total += count;
        }
    }

    Ok(ChunkReport {
        chunk_size,
        chunks: cloud.chunk_count(),
        lod_points,
    })
}

fn octree_report(cloud: &PointCloud, seed: Option<u64>) -> Option<OctreeReport> {
    let config = OctreeConfig {
        sampling: seed.map_or(LodSampling::Fresh, LodSampling::Seeded),
        ..OctreeConfig::default()
    };
    let octree = build_octree(&cloud.points, &config)?;

    Some(OctreeReport {
        nodes: octree.node_count,
        leaves: octree.leaves().len(),
        depth: octree.depth(),
        lod_points: octree.lod_point_counts(),
    })
}

fn loader_config(args: &Args) -> LoaderConfig {
    // Files already run in parallel; split the loader workers between them.
    LoaderConfig {
        workers: (LoaderConfig::default().workers / rayon::current_num_threads()).max(1),
        boundary_lines: if args.keep_split_lines {
            BoundaryLines::Carry
        } else {
            BoundaryLines::Drop
        },
        ..LoaderConfig::default()
    }
}

fn process_one(path: &Path, args: &Args, loader: &LoaderConfig) -> Result<FileReport> {
    let out_path = output_path(path, &args.input_dir, &args.output_dir, args.to);

    if out_path.exists() && !args.overwrite {
        debug!("Skipping existing file: {}", out_path.display());
        return Ok(FileReport {
            input: path.to_path_buf(),
            output: out_path,
            points: 0,
            skipped: true,
            chunking: None,
            octree: None,
        });
    }

    info!("Converting {} -> {}", path.display(), out_path.display());
    let started = Instant::now();

    let mut cloud = try_load_point_cloud_file(path, args.downsample, loader)
        .with_context(|| format!("loading {}", path.display()))?;

    let chunking = match args.chunk_size {
        Some(size) => {
            let report = chunk_cloud(&mut cloud, size, args.seed)?;
            info!(
                "{}: {} chunks, LOD totals {:?}",
                path.display(),
                report.chunks,
                report.lod_points
            );
            Some(report)
        }
        None => None,
    };

    let octree = if args.octree {
        octree_report(&cloud, args.seed)
    } else {
        None
    };
    if let Some(report) = &octree {
        info!(
            "{}: octree of {} nodes ({} leaves, depth {})",
            path.display(),
            report.nodes,
            report.leaves,
            report.depth
        );
    }

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    match args.to {
        Target::Pcb => try_export_to_binary(&cloud, &out_path),
        Target::Xyz => try_export_to_xyz(&cloud, &out_path),
    }
    .with_context(|| format!("writing {}", out_path.display()))?;

    debug!(
        "{}: {} points in {:.2?}",
        path.display(),
        cloud.point_count(),
        started.elapsed()
    );

    Ok(FileReport {
        input: path.to_path_buf(),
        output: out_path,
        points: cloud.point_count(),
        skipped: false,
        chunking,
        octree,
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    let inputs = collect_inputs(&args.input_dir, args.to);
    info!(
        "Converting {} files from {} to {}...",
        inputs.len(),
        args.input_dir.display(),
        args.to
    );

    let loader = loader_config(&args);

    let results: Vec<(PathBuf, Result<FileReport>)> = inputs
        .par_iter()
        .map(|path| (path.clone(), process_one(path, &args, &loader)))
        .collect();

    let mut summary = Summary {
        target: args.to,
        converted: Vec::new(),
        failed: Vec::new(),
    };

    for (path, result) in results {
        match result {
            Ok(report) => summary.converted.push(report),
            Err(err) => {
                warn!("Error processing {}: {:#}", path.display(), err);
                summary.failed.push(path);
            }
        }
    }

    let points: usize = summary.converted.iter().map(|r| r.points).sum();
    info!(
        "Done: {} converted ({} points), {} skipped, {} failed",
        summary.converted.iter().filter(|r| !r.skipped).count(),
        points,
        summary.converted.iter().filter(|r| r.skipped).count(),
        summary.failed.len()
    );

    if let Some(summary_path) = &args.summary {
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(summary_path, json)
            .with_context(|| format!("writing {}", summary_path.display()))?;
    }

    Ok(())
}
