//! In-process job table with time-based eviction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use moka::notification::RemovalCause;
use moka::sync::Cache;
use moka::Expiry;
use tokio::sync::oneshot;

use crate::config::JobsConfig;
use crate::error::IngestError;
use crate::pipeline::DuplicateAction;
use crate::transform::CropBox;

use super::model::{FileStatus, UploadJob};

/// Channel a paused file is waiting on.
#[derive(Debug)]
pub enum Resolution {
    Duplicate(oneshot::Sender<DuplicateAction>),
    Crop(oneshot::Sender<CropBox>),
}

impl Resolution {
    fn awaiting(&self) -> FileStatus {
        match self {
            Resolution::Duplicate(_) => FileStatus::DuplicatePending,
            Resolution::Crop(_) => FileStatus::CropPending,
        }
    }
}

#[derive(Debug)]
struct PendingResolution {
    index: usize,
    resolution: Resolution,
}

/// Shared state of one job: the snapshot clients read and the slot its
/// task parks on while a file is paused.
#[derive(Debug)]
pub struct JobEntry {
    filenames: Vec<String>,
    state: RwLock<UploadJob>,
    pending: Mutex<Option<PendingResolution>>,
    abandoned: AtomicBool,
}

impl JobEntry {
    pub fn new(job: UploadJob, filenames: Vec<String>) -> Self {
        Self {
            filenames,
            state: RwLock::new(job),
            pending: Mutex::new(None),
            abandoned: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> String {
        self.read(|job| job.id.clone())
    }

    /// Consistent copy of the job.
    pub fn snapshot(&self) -> UploadJob {
        self.read(|job| job.clone())
    }

    pub fn read<T>(&self, f: impl FnOnce(&UploadJob) -> T) -> T {
        let job = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&job)
    }

    /// Mutates the job. Terminal jobs are left untouched.
    pub fn update(&self, f: impl FnOnce(&mut UploadJob)) {
        let mut job = self.state.write().unwrap_or_else(|e| e.into_inner());
        if job.status.is_terminal() {
            tracing::warn!(job_id = %job.id, "Ignoring update to finished job");
            return;
        }
        f(&mut job);
    }

    pub fn is_terminal(&self) -> bool {
        self.read(|job| job.status.is_terminal())
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Drops any pending channel so a parked task wakes and stops.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
        let dropped = self.lock_pending().take();
        if dropped.is_some() {
            tracing::info!("Abandoned paused upload job");
        }
    }

    /// Parks file `index` on `resolution`. Returns false when the job was
    /// abandoned and nobody can resolve it any more.
    pub fn park(&self, index: usize, resolution: Resolution) -> bool {
        let mut pending = self.lock_pending();
        if self.is_abandoned() {
            return false;
        }
        *pending = Some(PendingResolution { index, resolution });
        true
    }

    /// Takes the duplicate channel for `filename`. Exactly one caller wins.
    pub fn take_duplicate(
        &self,
        filename: &str,
    ) -> Result<oneshot::Sender<DuplicateAction>, IngestError> {
        let mut pending = self.lock_pending();
        self.check_pending(&pending, filename, FileStatus::DuplicatePending)?;
        match pending.take().map(|p| p.resolution) {
            Some(Resolution::Duplicate(tx)) => Ok(tx),
            _ => Err(self.mismatch(filename, FileStatus::DuplicatePending)),
        }
    }

    /// Takes the crop channel for `filename` once `crop_box` is valid. An
    /// invalid box leaves the file paused.
    pub fn take_crop(
        &self,
        filename: &str,
        crop_box: &CropBox,
    ) -> Result<oneshot::Sender<CropBox>, IngestError> {
        let mut pending = self.lock_pending();
        self.check_pending(&pending, filename, FileStatus::CropPending)?;
        crop_box.validate()?;
        match pending.take().map(|p| p.resolution) {
            Some(Resolution::Crop(tx)) => Ok(tx),
            _ => Err(self.mismatch(filename, FileStatus::CropPending)),
        }
    }

    fn check_pending(
        &self,
        pending: &Option<PendingResolution>,
        filename: &str,
        expected: FileStatus,
    ) -> Result<(), IngestError> {
        if !self.filenames.iter().any(|f| f == filename) {
            return Err(IngestError::NotFound(format!("file '{}'", filename)));
        }

        match pending {
            Some(p) if self.filenames[p.index] == filename && p.resolution.awaiting() == expected => {
                Ok(())
            }
            _ => Err(self.mismatch(filename, expected)),
        }
    }

    fn mismatch(&self, filename: &str, expected: FileStatus) -> IngestError {
        let actual = self.read(|job| {
            match job.results.iter().rev().find(|r| r.filename == filename) {
                // Result still shows the pause but the channel is gone.
                Some(r) if r.status == expected => "resolving".to_string(),
                Some(r) => r.status.as_str().to_string(),
                None => "queued".to_string(),
            }
        });
        IngestError::StateMismatch {
            filename: filename.to_string(),
            expected: expected.as_str(),
            actual,
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<PendingResolution>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ─── Expiry ─────────────────────────────────────────────────────────────────

struct JobExpiry {
    retention: Duration,
    orphan_timeout: Duration,
}

impl JobExpiry {
    fn ttl(&self, entry: &JobEntry) -> Duration {
        if entry.is_terminal() {
            self.retention
        } else {
            self.orphan_timeout
        }
    }
}

impl Expiry<String, Arc<JobEntry>> for JobExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<JobEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.ttl(value))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<JobEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.ttl(value))
    }
}

// ─── JobStore ───────────────────────────────────────────────────────────────

/// Jobs by id. Non-terminal jobs live `orphan_timeout_secs` past their last
/// refresh, finished ones `retention_secs` past completion. Only expiry
/// removes a job; a full table refuses new ones instead.
#[derive(Clone)]
pub struct JobStore {
    cache: Cache<String, Arc<JobEntry>>,
    max_jobs: u64,
    admission: Arc<Mutex<()>>,
}

impl JobStore {
    pub fn new(config: &JobsConfig) -> Self {
        let expiry = JobExpiry {
            retention: Duration::from_secs(config.retention_secs),
            orphan_timeout: Duration::from_secs(config.orphan_timeout_secs),
        };

        let cache = Cache::builder()
            .expire_after(expiry)
            .eviction_listener(|key: Arc<String>, entry: Arc<JobEntry>, cause: RemovalCause| {
                if cause == RemovalCause::Expired {
                    tracing::info!(job_id = %key, "Upload job expired");
                    entry.abandon();
                }
            })
            .build();

        Self {
            cache,
            max_jobs: config.max_jobs,
            admission: Arc::new(Mutex::new(())),
        }
    }

    /// Admits a new job, or fails with `JobTableFull` when `max_jobs` jobs
    /// are already held.
    pub fn insert(&self, entry: Arc<JobEntry>) -> Result<(), IngestError> {
        let _admission = self.admission.lock().unwrap_or_else(|e| e.into_inner());
        self.cache.run_pending_tasks();
        if self.cache.entry_count() >= self.max_jobs {
            return Err(IngestError::JobTableFull(self.max_jobs));
        }
        self.cache.insert(entry.id(), entry);
        Ok(())
    }

    pub fn get(&self, job_id: &str) -> Result<Arc<JobEntry>, IngestError> {
        self.cache
            .get(job_id)
            .ok_or_else(|| IngestError::NotFound(format!("job '{}'", job_id)))
    }

    /// Re-arms the entry's expiry after a write.
    pub fn refresh(&self, entry: &Arc<JobEntry>) {
        if entry.is_abandoned() {
            return;
        }
        self.cache.insert(entry.id(), Arc::clone(entry));
    }

    /// Evicts expired entries now instead of on the next access.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }

    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }
}
