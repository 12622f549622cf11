use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::DuplicateCandidate;
use crate::transform::{AspectInfo, CropBox};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

/// Client-visible status of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Accepted,
    DuplicatePending,
    CropPending,
    Skipped,
    Error,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Accepted => "accepted",
            FileStatus::DuplicatePending => "duplicate_pending",
            FileStatus::CropPending => "crop_pending",
            FileStatus::Skipped => "skipped",
            FileStatus::Error => "error",
        }
    }

    pub fn is_final(self) -> bool {
        matches!(
            self,
            FileStatus::Accepted | FileStatus::Skipped | FileStatus::Error
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    pub filename: String,
    pub status: FileStatus,
    /// JPEG `data:` URL preview of the upload.
    pub thumbnail: Option<String>,
    pub aspect_info: Option<AspectInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<DuplicateCandidate>,
    /// Suggested box while `crop_pending`, applied box once accepted.
    pub crop_box: Option<CropBox>,
    pub image_id: Option<i64>,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileResult {
    pub fn new(filename: impl Into<String>, status: FileStatus, size_bytes: u64) -> Self {
        Self {
            filename: filename.into(),
            status,
            thumbnail: None,
            aspect_info: None,
            duplicate: None,
            crop_box: None,
            image_id: None,
            size_bytes,
            error: None,
        }
    }

    pub fn failed(filename: impl Into<String>, size_bytes: u64, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(filename, FileStatus::Error, size_bytes)
        }
    }
}

/// One uploaded batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
    pub total_files: usize,
    pub processed_count: usize,
    /// In submission order; grows as files reach a visible status.
    pub results: Vec<FileResult>,
    pub current_step: String,
    pub errors: Vec<String>,
}

impl UploadJob {
    pub fn new(id: impl Into<String>, total_files: usize) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            status: JobStatus::Pending,
            total_files,
            processed_count: 0,
            results: Vec::with_capacity(total_files),
            current_step: "Queued".to_string(),
            errors: Vec::new(),
        }
    }

    /// Writes the result for the file at `index`, replacing an earlier
    /// paused entry for the same file.
    pub fn put_result(&mut self, index: usize, result: FileResult) {
        if index < self.results.len() {
            self.results[index] = result;
        } else {
            debug_assert_eq!(index, self.results.len());
            self.results.push(result);
        }
    }

    /// Marks the file at `index` finished with `result`.
    pub fn finish_file(&mut self, index: usize, result: FileResult) {
        if let (FileStatus::Error, Some(message)) = (result.status, result.error.as_ref()) {
            self.errors.push(format!("{}: {}", result.filename, message));
        }
        self.put_result(index, result);
        self.processed_count += 1;
    }

    /// Status a job ends with: `error` only when no file got through.
    pub fn final_status(&self) -> JobStatus {
        let all_failed = self.total_files > 0
            && self.results.len() == self.total_files
            && self
                .results
                .iter()
                .all(|r| r.status == FileStatus::Error);
        if all_failed {
            JobStatus::Error
        } else {
            JobStatus::Complete
        }
    }

    /// `floor(processed / total * 100)`.
    pub fn progress(&self) -> u8 {
        if self.total_files == 0 {
            return 0;
        }
        (self.processed_count.min(self.total_files) * 100 / self.total_files) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = UploadJob::new("job-1", 3);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_files, 3);
        assert!(job.results.is_empty());
        assert_eq!(job.progress(), 0);
    }

    #[test]
    fn test_progress_floors() {
        let mut job = UploadJob::new("job-1", 3);
        job.finish_file(0, FileResult::new("a.jpg", FileStatus::Accepted, 1));
        assert_eq!(job.progress(), 33);
        job.finish_file(1, FileResult::new("b.jpg", FileStatus::Skipped, 1));
        assert_eq!(job.progress(), 66);
        job.finish_file(2, FileResult::new("c.jpg", FileStatus::Accepted, 1));
        assert_eq!(job.progress(), 100);
    }

    #[test]
    fn test_paused_entry_replaced_in_place() {
        let mut job = UploadJob::new("job-1", 2);
        job.put_result(0, FileResult::new("a.jpg", FileStatus::DuplicatePending, 1));
        job.finish_file(0, FileResult::new("a.jpg", FileStatus::Skipped, 1));

        assert_eq!(job.results.len(), 1);
        assert_eq!(job.results[0].status, FileStatus::Skipped);
        assert_eq!(job.processed_count, 1);
    }

    #[test]
    fn test_errors_are_recorded_with_filename() {
        let mut job = UploadJob::new("job-1", 1);
        job.finish_file(0, FileResult::failed("x.jpg", 4, "Invalid image: bad header"));
        assert_eq!(job.errors, vec!["x.jpg: Invalid image: bad header".to_string()]);
    }

    #[test]
    fn test_final_status_partial_success_completes() {
        let mut job = UploadJob::new("job-1", 2);
        job.finish_file(0, FileResult::failed("x.jpg", 4, "broken"));
        job.finish_file(1, FileResult::new("a.jpg", FileStatus::Accepted, 1));
        assert_eq!(job.final_status(), JobStatus::Complete);
    }

    #[test]
    fn test_final_status_all_failed() {
        let mut job = UploadJob::new("job-1", 2);
        job.finish_file(0, FileResult::failed("x.jpg", 4, "broken"));
        job.finish_file(1, FileResult::failed("y.jpg", 4, "broken"));
        assert_eq!(job.final_status(), JobStatus::Error);
    }

    #[test]
    fn test_file_result_serialization() {
        let result = FileResult::new("a.jpg", FileStatus::CropPending, 10);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "crop_pending");
        assert!(json.get("duplicate").is_none());
        assert!(json.get("error").is_none());
        assert!(json["image_id"].is_null());
    }
}
