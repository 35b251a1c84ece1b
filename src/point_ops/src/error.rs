//! Error type shared by all point operations.

use thiserror::Error;

/// Errors from point operations.
///
/// All variants are detected before any output is produced, so a failed
/// call never hands back a partial result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PointOpsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index {index} out of range for {len} rows")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("empty input: {0}")]
    EmptyInput(&'static str),
}

impl PointOpsError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        PointOpsError::InvalidArgument(reason.into())
    }
}

/// Result alias for leaf operations.
pub type Result<T> = std::result::Result<T, PointOpsError>;
