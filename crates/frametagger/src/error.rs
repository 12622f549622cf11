use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),

    #[error("Image {0} not found in library")]
    ImageNotFound(i64),

    #[error("Library record error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Invalid crop box: {0}")]
    InvalidCropBox(String),

    #[error("Image has zero width or height")]
    EmptyImage,
}

/// Failures surfaced by the upload pipeline and its resolution calls.
///
/// A found duplicate is not an error; it is a paused file state.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No files provided")]
    NoFilesProvided,

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid crop box: {0}")]
    InvalidCropBox(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File '{filename}' is {actual}, not awaiting {expected}")]
    StateMismatch {
        filename: String,
        expected: &'static str,
        actual: String,
    },

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Upload queue is full ({0} jobs held)")]
    JobTableFull(u64),
}

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        IngestError::StorageFailure(err.to_string())
    }
}

impl From<crate::db::DatabaseError> for IngestError {
    fn from(err: crate::db::DatabaseError) -> Self {
        IngestError::StorageFailure(err.to_string())
    }
}

impl From<TransformError> for IngestError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Decode(msg) => IngestError::InvalidImage(msg),
            TransformError::EmptyImage => IngestError::InvalidImage(err.to_string()),
            TransformError::InvalidCropBox(msg) => IngestError::InvalidCropBox(msg),
            TransformError::Encode(msg) => IngestError::StorageFailure(msg),
        }
    }
}
