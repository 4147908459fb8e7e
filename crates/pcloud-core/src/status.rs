use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PointCloudError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("Insufficient data: need {needed} bytes, have {available}")]
    InsufficientData { needed: usize, available: usize },
    #[error("Structural corruption: {0}")]
    StructuralCorruption(String),
    #[error("Failed to load octant {octant}: {reason}")]
    LoadFailure { octant: String, reason: String },
    #[error("IO error: {0}")]
    Io(String),
}

pub type PointCloudResult<T> = Result<T, PointCloudError>;

impl PointCloudError {
    /// Errors that are fatal to a schema rather than a single point or octant.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PointCloudError::Configuration(_) | PointCloudError::UnsupportedEncoding(_)
        )
    }

    /// Returns a copy of this error rescoped to one octant's load.
    ///
    /// Errors that already carry an octant are returned unchanged.
    pub fn into_load_failure(self, octant: impl Into<String>) -> Self {
        match self {
            PointCloudError::LoadFailure { .. } => self,
            other => PointCloudError::LoadFailure {
                octant: octant.into(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for PointCloudError {
    fn from(err: std::io::Error) -> Self {
        PointCloudError::Io(err.to_string())
    }
}

pub fn configuration_error(msg: impl Into<String>) -> PointCloudError {
    PointCloudError::Configuration(msg.into())
}

pub fn corruption_error(msg: impl Into<String>) -> PointCloudError {
    PointCloudError::StructuralCorruption(msg.into())
}
