//! Error types for the recorder.
//!
//! Configuration and camera-open failures are fatal to a run. Transient read
//! failures never surface here; they are reported as `Ok(None)` by
//! `CameraSource::read`.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, RecorderError>;

#[derive(Error, Debug)]
pub enum RecorderError {
    /// Invalid or inconsistent configuration, detected before any device is touched.
    #[error("configuration error: {0}")]
    Config(String),

    /// A camera could not be acquired.
    #[error("failed to open camera '{camera}' (index {index}): {reason}")]
    CameraOpen {
        camera: String,
        index: u32,
        reason: String,
    },

    /// `read` was called on a camera that was never opened (or already released).
    #[error("camera '{0}' is not open")]
    CameraNotOpen(String),

    /// A frame did not match the layout the sink was created with.
    #[error("frame {got} does not match sink layout {expected}")]
    FrameMismatch { expected: String, got: String },

    #[error("video sink error: {0}")]
    VideoSink(String),

    #[error("episode table error: {0}")]
    Table(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<parquet::errors::ParquetError> for RecorderError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        RecorderError::Table(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for RecorderError {
    fn from(err: arrow::error::ArrowError) -> Self {
        RecorderError::Table(err.to_string())
    }
}
