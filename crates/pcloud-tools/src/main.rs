use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use glam::DVec3;
use log::error;
use pcloud_octree::OctreeBuilderOptions;
use pcloud_streaming::LoaderConfig;
use pcloud_tools::{build, inspect, parse_vec3, stream, ToolResult};

#[derive(Parser, Debug)]
#[command(name = "pcloud", version, about = "Out-of-core point cloud tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an ASCII PLY file into a point cloud folder.
    Build {
        input: PathBuf,
        output: PathBuf,
        /// Points an octant may hold before its overflow is split.
        #[arg(long, default_value_t = 10_000)]
        bucket: u32,
        /// Subsampling cells per octant edge.
        #[arg(long, default_value_t = 128)]
        grid: u32,
    },
    /// Print the structure of a point cloud folder.
    Inspect { folder: PathBuf },
    /// Stream a folder from a fixed camera and report what stays resident.
    Stream {
        folder: PathBuf,
        #[arg(long, value_parser = parse_vec3)]
        eye: DVec3,
        #[arg(long, value_parser = parse_vec3, default_value = "0,0,0")]
        target: DVec3,
        #[arg(long, default_value_t = 60)]
        frames: usize,
        #[arg(long, default_value_t = 1_000_000)]
        threshold: u64,
        #[arg(long, default_value_t = 0.1)]
        min_proj_size_modifier: f64,
    },
}

fn run(cli: Cli) -> ToolResult<()> {
    match cli.command {
        Command::Build {
            input,
            output,
            bucket,
            grid,
        } => {
            let options = OctreeBuilderOptions::new()
                .with_max_points_in_bucket(bucket)
                .with_grid_resolution(grid);
            let summary = build(&input, &output, options)?;
            println!("{}", summary);
        }
        Command::Inspect { folder } => {
            print!("{}", inspect(&folder)?);
        }
        Command::Stream {
            folder,
            eye,
            target,
            frames,
            threshold,
            min_proj_size_modifier,
        } => {
            let config = LoaderConfig::new()
                .with_point_threshold(threshold)
                .with_min_proj_size_modifier(min_proj_size_modifier);
            let stats = stream(&folder, eye, target, frames, config)?;
            println!("{}", stats);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
