//! `voxmap` – occupancy map command line tool.
//!
//! Turns raw point clouds into probabilistic occupancy maps and inspects
//! them:
//!
//! 1. `voxmap build` reads a `.bin` cloud of `f32` triples, inserts every
//!    point (as hits, or as rays when `--origin` is given), reports the
//!    occupancy of one query voxel and writes the map.
//! 2. `voxmap query` loads a map and classifies a point.
//! 3. `voxmap info` prints size and extent statistics of a map.
//! 4. `voxmap config` shows or saves the effective configuration.
//!
//! Defaults come from `~/.voxmap/config.toml` and `VOXMAP_*` environment
//! variables; command-line flags win over both.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::warn;

use commands::{BuildOptions, parse_point};
use voxmap_types::{Occupancy, Point3};

/// Probabilistic occupancy maps from point clouds.
#[derive(Parser)]
#[command(name = "voxmap")]
#[command(about = "Build and query probabilistic occupancy octrees", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a map from a point cloud file
    Build {
        /// Little-endian f32 x,y,z point cloud
        #[arg(default_value = "pointcloud.bin")]
        input: PathBuf,

        /// Map file to write (default: `output_path` from the config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Voxel edge length in metres
        #[arg(short, long)]
        resolution: Option<f64>,

        /// Sensor origin "x,y,z"; enables free-space carving along each ray
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        origin: Option<Point3>,

        /// Truncate rays longer than this (requires --origin)
        #[arg(long)]
        max_range: Option<f64>,

        /// Voxel to report after building
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true, default_value = "1,1,1")]
        query: Point3,

        /// Collapse identical sibling voxels before writing
        #[arg(long)]
        prune: bool,
    },

    /// Classify a point in an existing map
    Query {
        /// Map file
        map: PathBuf,

        /// Point "x,y,z"
        #[arg(value_parser = parse_point, allow_hyphen_values = true)]
        point: Point3,
    },

    /// Print statistics about a map file
    Info {
        /// Map file
        map: PathBuf,
    },

    /// Show the effective configuration
    Config {
        /// Save it to ~/.voxmap/config.toml
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the level (default "info"); VOXMAP_LOG_FORMAT=json
    // switches to newline-delimited JSON.  Results still go to stdout via
    // println!.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("VOXMAP_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    let cli = Cli::parse();

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(error = %e, "Failed to load config; using defaults");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    match cli.command {
        Commands::Build {
            input,
            output,
            resolution,
            origin,
            max_range,
            query,
            prune,
        } => {
            let mut tree = cfg.tree.clone();
            if let Some(res) = resolution {
                tree.resolution = res;
            }
            let opts = BuildOptions {
                input,
                output: output.unwrap_or_else(|| cfg.output_path.clone()),
                tree,
                origin,
                max_range,
                query,
                prune,
            };
            let report = commands::build(&opts)?;
            println!(
                "  {} {} points into {} nodes ({} leaves)",
                "✓".green().bold(),
                report.points,
                report.nodes,
                report.leaves
            );
            if opts.prune {
                println!("  Pruned {} nodes", report.collapsed);
            }
            println!(
                "  The voxel at {} is {}.",
                fmt_point(report.query).bold(),
                paint(report.occupancy)
            );
            println!("  Map written to {}", opts.output.display().to_string().bold());
        }
        Commands::Query { map, point } => {
            let report = commands::query(&map, point)?;
            match report.probability {
                Some(p) => println!(
                    "  {} is {} (p = {:.3})",
                    fmt_point(point).bold(),
                    paint(report.occupancy),
                    p
                ),
                None => println!("  {} is {}", fmt_point(point).bold(), paint(report.occupancy)),
            }
        }
        Commands::Info { map } => {
            let info = commands::info(&map)?;
            println!("  {}", map.display().to_string().bold());
            println!("    resolution   {}", info.resolution);
            println!("    max depth    {}", info.max_depth);
            println!("    root level   {}", info.root_level);
            println!("    nodes        {}", info.nodes);
            println!(
                "    leaves       {} ({} occupied, {} free)",
                info.leaves,
                info.occupied.to_string().red(),
                info.free.to_string().green()
            );
            match info.bounds {
                Some((lo, hi)) => {
                    println!("    bounds       {} .. {}", fmt_point(lo), fmt_point(hi))
                }
                None => println!("    bounds       {}", "empty".dimmed()),
            }
            println!("    memory       {} KiB", info.memory_bytes / 1024);
        }
        Commands::Config { write } => {
            if write {
                config::save(&cfg).map_err(anyhow::Error::msg)?;
                println!(
                    "  {} Config saved to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                );
            } else {
                println!("# {}", config::config_path().display().to_string().dimmed());
                print!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn paint(occupancy: Occupancy) -> colored::ColoredString {
    let label = occupancy.to_string();
    match occupancy {
        Occupancy::Occupied => label.red().bold(),
        Occupancy::Free => label.green().bold(),
        Occupancy::Unknown => label.yellow(),
    }
}

fn fmt_point(p: Point3) -> String {
    format!("({}, {}, {})", p.x, p.y, p.z)
}
