//! Error types for the localization engine

use thiserror::Error;

/// Errors that can occur during engine operation.
///
/// Not every failure mode in the component design is represented here:
/// `InsufficientSources` and `LinkerNonMatch` are normal control flow
/// (an `Option::None` or a fresh session allocation), never an `Err`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to parse inbound message: {0}")]
    ParseError(String),

    #[error("invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("no calibration data loaded, refusing to start live mode")]
    NoCalibration,

    #[error("failed to read zones table: {0}")]
    ZonesError(String),

    #[error("failed to write output stream: {0}")]
    WriteFailure(String),

    #[error("upload sidecar error: {0}")]
    UploaderError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
