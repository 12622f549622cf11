pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod jobs;
pub mod library;
pub mod pipeline;
pub mod transform;

pub use config::{load_config, Config};
pub use db::Database;
pub use error::{ConfigError, IngestError, StorageError, TransformError};
pub use jobs::{FileResult, FileStatus, JobManager, JobStatus, JobStatusResponse, UploadFile};
pub use library::{LibraryImage, LibraryStore, SqliteLibrary};
pub use pipeline::{DuplicateAction, DuplicateCandidate, MatchKind};
pub use transform::{AspectInfo, CropBox, TransformEngine};
