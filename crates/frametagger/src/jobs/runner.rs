//! Background task driving one job's files in submission order.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{info, info_span, warn, Instrument};

use crate::error::IngestError;
use crate::pipeline::{
    CropChoice, CropPlan, DuplicateAction, FileContext, FileProcessor, Inspection,
};
use crate::transform::jpeg_data_url;

use super::model::{FileResult, FileStatus, JobStatus};
use super::store::{JobEntry, JobStore, Resolution};

/// One file of a submitted batch.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

enum FileOutcome {
    Done(FileResult),
    /// The job was evicted while this file waited for the user.
    Abandoned(FileResult),
}

pub(crate) struct JobRunner {
    entry: Arc<JobEntry>,
    store: JobStore,
    processor: Arc<FileProcessor>,
}

impl JobRunner {
    pub(crate) fn new(entry: Arc<JobEntry>, store: JobStore, processor: Arc<FileProcessor>) -> Self {
        Self {
            entry,
            store,
            processor,
        }
    }

    pub(crate) async fn run(self, files: Vec<UploadFile>) {
        let job_id = self.entry.id();
        let total = files.len();
        let span = info_span!("upload_job", job_id = %job_id, total_files = total);

        async move {
            info!("Upload job started");
            self.entry.update(|job| job.status = JobStatus::Processing);

            for (index, file) in files.into_iter().enumerate() {
                if self.entry.is_abandoned() {
                    warn!("Job abandoned, remaining files not processed");
                    break;
                }

                let step = format!("Processing {} ({}/{})", file.filename, index + 1, total);
                self.entry.update(|job| job.current_step = step);

                let file_span = info_span!("file", filename = %file.filename, index);
                let outcome = self.process_file(index, file).instrument(file_span).await;

                match outcome {
                    FileOutcome::Done(result) => {
                        self.entry.update(|job| job.finish_file(index, result));
                        self.store.refresh(&self.entry);
                    }
                    FileOutcome::Abandoned(result) => {
                        self.entry.update(|job| job.finish_file(index, result));
                        break;
                    }
                }
            }

            self.finish();
        }
        .instrument(span)
        .await
    }

    fn finish(&self) {
        self.entry.update(|job| {
            job.status = if self.entry.is_abandoned() {
                JobStatus::Error
            } else {
                job.final_status()
            };
            job.current_step = "Complete".to_string();
        });

        let snapshot = self.entry.snapshot();
        info!(
            status = ?snapshot.status,
            processed = snapshot.processed_count,
            errors = snapshot.errors.len(),
            "Upload job finished"
        );
        self.store.refresh(&self.entry);
    }

    async fn process_file(&self, index: usize, file: UploadFile) -> FileOutcome {
        let filename = file.filename.clone();
        let size_bytes = file.bytes.len() as u64;
        let ctx = FileContext::new(file.filename, file.bytes);

        match self.drive(index, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "File failed");
                FileOutcome::Done(FileResult::failed(filename, size_bytes, e.to_string()))
            }
        }
    }

    async fn drive(&self, index: usize, ctx: FileContext) -> Result<FileOutcome, IngestError> {
        // Validating, Hashing, DuplicateCheck
        let (mut ctx, inspection) = self
            .blocking(ctx, |processor, ctx| processor.inspect(ctx))
            .await?;
        let mut result = base_result(&ctx);

        if let Inspection::Duplicate(candidate) = inspection {
            let (tx, rx) = oneshot::channel();
            result.status = FileStatus::DuplicatePending;
            result.duplicate = Some(candidate);
            if !self.pause(index, Resolution::Duplicate(tx), &result, "duplicate decision") {
                return Ok(abandoned(result));
            }

            let Ok(action) = rx.await else {
                return Ok(abandoned(result));
            };
            if !self.processor.apply_duplicate_action(&mut ctx, action)? {
                result.status = FileStatus::Skipped;
                return Ok(FileOutcome::Done(result));
            }
            if action == DuplicateAction::ImportAnyway {
                info!("Importing despite duplicate");
            }
        }

        // AspectCheck, then a crop box from the user when needed
        let choice = match self.processor.check_aspect(&mut ctx)? {
            CropPlan::CenterCrop => CropChoice::Center,
            CropPlan::NeedsPosition(suggested) => {
                let (tx, rx) = oneshot::channel();
                result.status = FileStatus::CropPending;
                result.crop_box = Some(suggested);
                if !self.pause(index, Resolution::Crop(tx), &result, "crop position") {
                    return Ok(abandoned(result));
                }

                let Ok(crop_box) = rx.await else {
                    return Ok(abandoned(result));
                };
                info!(?crop_box, "Crop position received");
                CropChoice::Box(crop_box)
            }
        };

        // Transforming, Committing
        let (_ctx, committed) = self
            .blocking(ctx, move |processor, ctx| {
                processor.transform_and_commit(ctx, choice)
            })
            .await?;

        info!(image_id = committed.image_id, "File accepted");
        result.status = FileStatus::Accepted;
        result.crop_box = Some(committed.crop_box);
        result.image_id = Some(committed.image_id);
        Ok(FileOutcome::Done(result))
    }

    /// Parks the task's channel, then publishes the paused result. The
    /// channel is in place before any client can see the pause.
    fn pause(
        &self,
        index: usize,
        resolution: Resolution,
        result: &FileResult,
        waiting_for: &str,
    ) -> bool {
        if !self.entry.park(index, resolution) {
            return false;
        }

        let published = result.clone();
        let step = format!("Waiting for {} on {}", waiting_for, result.filename);
        self.entry.update(|job| {
            job.put_result(index, published);
            job.current_step = step;
        });
        self.store.refresh(&self.entry);
        info!(status = result.status.as_str(), "File paused");
        true
    }

    /// Runs a processor step on the blocking pool, handing the context there
    /// and back.
    async fn blocking<T, F>(
        &self,
        mut ctx: FileContext,
        step: F,
    ) -> Result<(FileContext, T), IngestError>
    where
        T: Send + 'static,
        F: FnOnce(&FileProcessor, &mut FileContext) -> Result<T, IngestError> + Send + 'static,
    {
        let processor = Arc::clone(&self.processor);
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || -> Result<(FileContext, T), IngestError> {
            let _entered = span.enter();
            let value = step(&processor, &mut ctx)?;
            Ok((ctx, value))
        })
        .await
        .map_err(|e| IngestError::StorageFailure(format!("processing task failed: {}", e)))?
    }
}

fn base_result(ctx: &FileContext) -> FileResult {
    let mut result = FileResult::new(ctx.filename.clone(), FileStatus::Error, ctx.size_bytes());
    result.thumbnail = ctx.thumbnail.as_deref().map(jpeg_data_url);
    result.aspect_info = ctx.aspect;
    result
}

fn abandoned(mut result: FileResult) -> FileOutcome {
    result.status = FileStatus::Error;
    result.error = Some("abandoned while awaiting resolution".to_string());
    FileOutcome::Abandoned(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abandoned_result_is_error() {
        let ctx = FileContext::new("b.jpg", vec![0; 12]);
        let FileOutcome::Abandoned(result) = abandoned(base_result(&ctx)) else {
            panic!("expected abandoned outcome");
        };
        assert_eq!(result.status, FileStatus::Error);
        assert_eq!(result.size_bytes, 12);
        assert!(result.error.unwrap().contains("abandoned"));
    }

    #[test]
    fn test_upload_file_new() {
        let file = UploadFile::new("a.jpg", vec![1, 2]);
        assert_eq!(file.filename, "a.jpg");
        assert_eq!(file.bytes.len(), 2);
    }
}
