//! Subcommand implementations.
//!
//! Each command returns a plain report struct; printing is left to `main`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use voxmap_io::{read_file, read_points, write_file};
use voxmap_octree::{OccupancyTree, insert_point_cloud, insert_scan};
use voxmap_types::{Occupancy, Point3, TreeConfig};

/// Parse `"x,y,z"` into a point.
pub fn parse_point(s: &str) -> Result<Point3, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, z] = *parts.as_slice() else {
        return Err(format!("expected x,y,z, got '{s}'"));
    };
    let num = |v: &str| {
        v.parse::<f64>()
            .map_err(|e| format!("bad coordinate '{v}': {e}"))
    };
    Ok(Point3::new(num(x)?, num(y)?, num(z)?))
}

// ────────────────────────────────────────────────────────────────────────────
// build
// ────────────────────────────────────────────────────────────────────────────

/// Inputs of `voxmap build`, after merging flags over the config file.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub tree: TreeConfig,
    pub origin: Option<Point3>,
    pub max_range: Option<f64>,
    pub query: Point3,
    pub prune: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub points: usize,
    pub nodes: usize,
    pub leaves: usize,
    pub collapsed: usize,
    pub query: Point3,
    pub occupancy: Occupancy,
}

pub fn build(opts: &BuildOptions) -> Result<BuildReport> {
    let points = read_points(&opts.input)
        .with_context(|| format!("Failed to read point cloud {}", opts.input.display()))?;
    info!(points = points.len(), input = %opts.input.display(), "loaded point cloud");

    let mut tree = OccupancyTree::new(opts.tree.clone()).context("Invalid tree configuration")?;
    match opts.origin {
        Some(origin) => {
            let summary = insert_scan(&mut tree, &points, origin, opts.max_range)
                .context("Failed to insert scan")?;
            info!(hits = summary.hits, misses = summary.misses, "inserted scan");
        }
        None => {
            if opts.max_range.is_some() {
                warn!("--max-range has no effect without --origin");
            }
            insert_point_cloud(&mut tree, points.iter().copied(), None)
                .context("Failed to insert point cloud")?;
        }
    }

    let collapsed = if opts.prune { tree.prune() } else { 0 };
    let occupancy = tree
        .classify(opts.query)
        .context("Query point is outside the map")?;

    write_file(&tree, &opts.output)
        .with_context(|| format!("Failed to write map {}", opts.output.display()))?;
    info!(output = %opts.output.display(), nodes = tree.node_count(), "map written");

    Ok(BuildReport {
        points: points.len(),
        nodes: tree.node_count(),
        leaves: tree.leaf_count(),
        collapsed,
        query: opts.query,
        occupancy,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// query / info
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct QueryReport {
    pub occupancy: Occupancy,
    /// `None` for never-observed space.
    pub probability: Option<f64>,
}

pub fn query(map: &Path, point: Point3) -> Result<QueryReport> {
    let tree = load_map(map)?;
    let node = tree
        .search(point)
        .context("Query point is outside the map")?;
    Ok(QueryReport {
        occupancy: node.map_or(Occupancy::Unknown, |n| n.occupancy()),
        probability: node.map(|n| n.probability()),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapInfo {
    pub resolution: f64,
    pub max_depth: u8,
    pub root_level: u8,
    pub nodes: usize,
    pub leaves: usize,
    pub occupied: usize,
    pub free: usize,
    pub bounds: Option<(Point3, Point3)>,
    pub memory_bytes: usize,
}

pub fn info(map: &Path) -> Result<MapInfo> {
    let tree = load_map(map)?;
    let mut leaves = 0;
    let mut occupied = 0;
    let mut free = 0;
    for leaf in tree.leaves() {
        leaves += 1;
        match leaf.occupancy() {
            Occupancy::Occupied => occupied += 1,
            Occupancy::Free => free += 1,
            Occupancy::Unknown => {}
        }
    }
    Ok(MapInfo {
        resolution: tree.resolution(),
        max_depth: tree.key_space().max_depth(),
        root_level: tree.root_level(),
        nodes: tree.node_count(),
        leaves,
        occupied,
        free,
        bounds: tree.metric_bounds(),
        memory_bytes: tree.memory_usage(),
    })
}

fn load_map(path: &Path) -> Result<OccupancyTree> {
    read_file(path).with_context(|| format!("Failed to load map {}", path.display()))
}
