use std::path::PathBuf;
use std::time::Duration;

use pcloud_core::status::{configuration_error, PointCloudResult};

/// Tuning of the [`OctantLoader`](crate::loader::OctantLoader).
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Soft cap on resident points.
    pub point_threshold: u64,
    /// Octants whose projected size falls below the root's projected size
    /// times this factor are never loaded.
    pub min_proj_size_modifier: f64,
    /// New load requests issued per update, largest octants first.
    pub max_requests_per_update: usize,
    /// Minimum time between two traversals of the hierarchy.
    pub update_interval: Duration,
    pub worker_threads: usize,
    /// Point cloud folder opened by `init` when no root is set yet.
    pub file_folder_path: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            point_threshold: 1_000_000,
            min_proj_size_modifier: 0.1,
            max_requests_per_update: 5,
            update_interval: Duration::from_secs_f64(1.0 / 30.0),
            worker_threads: num_cpus::get().clamp(1, 4),
            file_folder_path: None,
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_point_threshold(mut self, threshold: u64) -> Self {
        self.point_threshold = threshold;
        self
    }

    pub fn with_min_proj_size_modifier(mut self, modifier: f64) -> Self {
        self.min_proj_size_modifier = modifier;
        self
    }

    pub fn with_max_requests_per_update(mut self, max: usize) -> Self {
        self.max_requests_per_update = max;
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_file_folder_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_folder_path = Some(path.into());
        self
    }

    /// # Errors
    ///
    /// Returns `PointCloudError::Configuration` for a negative or non-finite
    /// modifier, zero workers or zero requests per update.
    pub fn validate(&self) -> PointCloudResult<()> {
        if !self.min_proj_size_modifier.is_finite() || self.min_proj_size_modifier < 0.0 {
            return Err(configuration_error(format!(
                "min_proj_size_modifier must be a non-negative number, got {}",
                self.min_proj_size_modifier
            )));
        }
        if self.worker_threads == 0 {
            return Err(configuration_error("worker_threads must be at least 1"));
        }
        if self.max_requests_per_update == 0 {
            return Err(configuration_error(
                "max_requests_per_update must be at least 1",
            ));
        }
        Ok(())
    }
}
