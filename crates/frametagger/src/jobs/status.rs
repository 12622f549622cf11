use serde::{Deserialize, Serialize};

use super::model::{FileResult, JobStatus, UploadJob};

/// Polling payload for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    pub progress: u8,
    pub results: Vec<FileResult>,
    pub total_files: usize,
    pub current_step: String,
    pub errors: Vec<String>,
}

impl From<UploadJob> for JobStatusResponse {
    fn from(job: UploadJob) -> Self {
        Self {
            status: job.status,
            progress: job.progress(),
            results: job.results,
            total_files: job.total_files,
            current_step: job.current_step,
            errors: job.errors,
        }
    }
}
