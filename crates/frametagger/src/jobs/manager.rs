use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::config::{Config, JobsConfig};
use crate::error::IngestError;
use crate::library::LibraryStore;
use crate::pipeline::{DuplicateAction, FileProcessor, PipelineConfig};
use crate::transform::CropBox;

use super::model::UploadJob;
use super::runner::{JobRunner, UploadFile};
use super::status::JobStatusResponse;
use super::store::{JobEntry, JobStore};

/// Owns all upload jobs of the process and the background task of each.
///
/// Cloning is cheap; clones share the same job table.
#[derive(Clone)]
pub struct JobManager {
    jobs: JobStore,
    processor: Arc<FileProcessor>,
}

impl JobManager {
    pub fn new(config: &Config, library: Arc<dyn LibraryStore>) -> Self {
        Self::with_parts(PipelineConfig::from_config(config), &config.jobs, library)
    }

    pub fn with_parts(
        pipeline: PipelineConfig,
        jobs: &JobsConfig,
        library: Arc<dyn LibraryStore>,
    ) -> Self {
        Self {
            jobs: JobStore::new(jobs),
            processor: Arc::new(FileProcessor::new(pipeline, library)),
        }
    }

    /// Creates a job for `files` and starts processing it in the background.
    /// Fails with `JobTableFull` rather than displacing a live job.
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, files: Vec<UploadFile>) -> Result<String, IngestError> {
        if files.is_empty() {
            return Err(IngestError::NoFilesProvided);
        }

        let job_id = Uuid::new_v4().to_string();
        let filenames: Vec<String> = files.iter().map(|f| f.filename.clone()).collect();
        let entry = Arc::new(JobEntry::new(
            UploadJob::new(job_id.clone(), files.len()),
            filenames,
        ));
        self.jobs.insert(Arc::clone(&entry))?;

        info!(job_id = %job_id, total_files = files.len(), "Upload job submitted");

        let runner = JobRunner::new(entry, self.jobs.clone(), Arc::clone(&self.processor));
        tokio::spawn(runner.run(files));

        Ok(job_id)
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatusResponse, IngestError> {
        Ok(self.snapshot(job_id)?.into())
    }

    /// Full copy of the job, including id and creation time.
    pub fn snapshot(&self, job_id: &str) -> Result<UploadJob, IngestError> {
        Ok(self.jobs.get(job_id)?.snapshot())
    }

    /// Hands the user's decision to a file paused on a duplicate.
    pub fn resolve_duplicate(
        &self,
        job_id: &str,
        filename: &str,
        action: DuplicateAction,
    ) -> Result<(), IngestError> {
        let entry = self.jobs.get(job_id)?;
        let tx = entry.take_duplicate(filename)?;
        tx.send(action).map_err(|_| IngestError::StateMismatch {
            filename: filename.to_string(),
            expected: "duplicate_pending",
            actual: "abandoned".to_string(),
        })?;

        info!(job_id, filename, ?action, "Duplicate action delivered");
        Ok(())
    }

    /// Hands a crop box to a file paused on its position.
    pub fn resolve_position(
        &self,
        job_id: &str,
        filename: &str,
        crop_box: CropBox,
    ) -> Result<(), IngestError> {
        let entry = self.jobs.get(job_id)?;
        let tx = entry.take_crop(filename, &crop_box)?;
        tx.send(crop_box).map_err(|_| IngestError::StateMismatch {
            filename: filename.to_string(),
            expected: "crop_pending",
            actual: "abandoned".to_string(),
        })?;

        info!(job_id, filename, ?crop_box, "Crop position delivered");
        Ok(())
    }

    /// Number of jobs currently held.
    pub fn job_count(&self) -> u64 {
        self.jobs.run_pending_tasks();
        self.jobs.len()
    }
}
