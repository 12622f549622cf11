//! Upload jobs: the job table, per-job background tasks, and the status
//! snapshot clients poll.

pub mod manager;
pub mod model;
mod runner;
pub mod status;
pub mod store;

pub use manager::JobManager;
pub use model::{FileResult, FileStatus, JobStatus, UploadJob};
pub use runner::UploadFile;
pub use status::JobStatusResponse;
pub use store::{JobEntry, JobStore};
