//! Error types for head construction, forward passes and config I/O.

use thiserror::Error;

/// Errors raised by the detection head.
#[derive(Error, Debug)]
pub enum HeadError {
    /// Configuration rejected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A constructed layer does not match the configured channel arithmetic.
    #[error("Channel mismatch in {what}: expected {expected}, got {actual}")]
    ChannelMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    /// Number of feature maps differs from the number of configured strides.
    #[error("Expected {expected} feature maps (one per stride), got {actual}")]
    LevelCountMismatch { expected: usize, actual: usize },

    /// A feature map has the wrong channel count.
    #[error("Level {level} (stride {stride}): expected {expected} input channels, got {actual}")]
    LevelChannelMismatch {
        level: usize,
        stride: usize,
        expected: usize,
        actual: usize,
    },

    /// Export flattening only supports a single image.
    #[error("Export mode requires batch size 1, level {level} has batch size {batch}")]
    ExportBatch { level: usize, batch: usize },

    /// Integral input whose last dimension is not `4 * (reg_max + 1)`.
    #[error("Distribution shape mismatch: expected last dimension {expected}, got {actual}")]
    DistributionShape { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for head operations.
pub type Result<T> = std::result::Result<T, HeadError>;

impl HeadError {
    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
