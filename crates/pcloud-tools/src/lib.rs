//! Commands behind the `pcloud` binary.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use glam::DVec3;
use log::info;
use pcloud_core::codec::RawPointCodec;
use pcloud_core::status::PointCloudError;
use pcloud_octree::{
    OctreeBuilder, OctreeBuilderOptions, OctreeFileReader, OctreeFileWriter, PlyReader,
    PointCloudReader,
};
use pcloud_streaming::{Camera, LoaderConfig, LoaderStats, OctantLoader, PointSizeMode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Loader did not shut down within {0:?}")]
    ShutdownTimeout(Duration),
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Parses `x,y,z` into a vector.
pub fn parse_vec3(s: &str) -> Result<DVec3, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected x,y,z, got '{}'", s));
    }
    let mut v = [0.0; 3];
    for (dst, part) in v.iter_mut().zip(&parts) {
        *dst = part
            .parse()
            .map_err(|_| format!("'{}' is not a number", part))?;
    }
    Ok(DVec3::from_array(v))
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildSummary {
    pub points: usize,
    pub octants: usize,
    pub max_level: u32,
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} points in {} octants, max level {}",
            self.points, self.octants, self.max_level
        )
    }
}

/// Converts an ASCII PLY file into a point cloud folder.
pub fn build(input: &Path, output: &Path, options: OctreeBuilderOptions) -> ToolResult<BuildSummary> {
    let start = Instant::now();
    let mut reader = PlyReader::open(input)?;
    let schema = Arc::new(reader.schema().clone());
    let points = reader.read_points()?;
    info!("Read {} points from {}", points.len(), input.display());

    let tree = OctreeBuilder::new(options).build(points)?;
    OctreeFileWriter::new(output).write(&tree, &RawPointCodec::new(schema))?;
    info!("Built {} in {:.2?}", output.display(), start.elapsed());

    Ok(BuildSummary {
        points: tree.total_points(),
        octants: tree.hierarchy.len(),
        max_level: tree.hierarchy.max_level(),
    })
}

/// Structure statistics of a point cloud folder.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderSummary {
    pub folder: PathBuf,
    pub schema: String,
    pub root_center: DVec3,
    pub root_size: f64,
    pub octants: usize,
    pub leaves: usize,
    pub total_points: u64,
    /// Points stored per level, root first.
    pub points_per_level: Vec<u64>,
}

impl fmt::Display for FolderSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Point cloud: {}", self.folder.display())?;
        writeln!(f, "  schema:   {}", self.schema)?;
        writeln!(
            f,
            "  root:     center {:?}, size {}",
            self.root_center, self.root_size
        )?;
        writeln!(f, "  octants:  {} ({} leaves)", self.octants, self.leaves)?;
        writeln!(f, "  points:   {}", self.total_points)?;
        for (level, points) in self.points_per_level.iter().enumerate() {
            writeln!(f, "  level {:2}: {} points", level, points)?;
        }
        Ok(())
    }
}

pub fn inspect(folder: &Path) -> ToolResult<FolderSummary> {
    let mut reader = OctreeFileReader::new(folder);
    let hierarchy = reader.get_scene()?;
    let schema = reader
        .schema()
        .map(|s| s.to_string())
        .unwrap_or_default();

    let mut points_per_level = vec![0u64; hierarchy.max_level() as usize + 1];
    for octant in hierarchy.octants() {
        points_per_level[octant.level() as usize] += u64::from(octant.point_count);
    }
    let root = &hierarchy[hierarchy.root()];
    Ok(FolderSummary {
        folder: folder.to_path_buf(),
        schema,
        root_center: root.center,
        root_size: root.size,
        octants: hierarchy.len(),
        leaves: hierarchy.octants().iter().filter(|o| o.is_leaf).count(),
        total_points: hierarchy.total_points(),
        points_per_level,
    })
}

/// Streams a folder for `frames` frames from a fixed camera, then shuts the
/// loader down. Returns the loader statistics of the last frame.
pub fn stream(
    folder: &Path,
    eye: DVec3,
    target: DVec3,
    frames: usize,
    config: LoaderConfig,
) -> ToolResult<LoaderStats> {
    if eye.distance(target) == 0.0 {
        return Err(ToolError::InvalidArgument(
            "camera eye and target must differ".into(),
        ));
    }
    // The camera's up vector is +Y.
    if (target - eye).normalize().cross(DVec3::Y).length() < 1e-9 {
        return Err(ToolError::InvalidArgument(
            "camera must not look straight up or down".into(),
        ));
    }
    let interval = config.update_interval;
    let mut camera = Camera::look_at(eye, target, std::f64::consts::FRAC_PI_3, 1280, 720);
    let mut loader: OctantLoader = OctantLoader::new(config.with_file_folder_path(folder));
    loader.init(&camera)?;

    let mut stats = LoaderStats::default();
    for frame in 0..frames {
        if loader.update_scene(&mut camera, PointSizeMode::FixedPixelSize, &mut []) {
            info!("Frame {}: {}", frame, loader.stats());
        }
        stats = loader.stats();
        thread::sleep(interval);
    }

    loader.request_shutdown();
    let timeout = Duration::from_secs(30);
    let deadline = Instant::now() + timeout;
    while !loader.is_shut_down() {
        if Instant::now() > deadline {
            return Err(ToolError::ShutdownTimeout(timeout));
        }
        loader.update_scene(&mut camera, PointSizeMode::FixedPixelSize, &mut []);
        thread::sleep(interval.max(Duration::from_millis(1)));
    }
    Ok(stats)
}
