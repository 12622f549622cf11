//! Test harness for isolated upload pipeline runs.
//!
//! Each `TestHarness` owns a temporary library directory with its own
//! SQLite database, a `SqliteLibrary` over it and a `JobManager`.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use frametagger::config::{CanvasConfig, Config, ResampleFilter};
use frametagger::db::image_repo;
use frametagger::{
    Database, FileStatus, JobManager, JobStatusResponse, LibraryStore, SqliteLibrary, UploadFile,
};

const WAIT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub library: Arc<SqliteLibrary>,
    pub manager: JobManager,
}

impl TestHarness {
    /// Small 160x90 canvas for fast runs.
    pub fn new() -> Self {
        Self::with_config(|config| {
            config.canvas = CanvasConfig {
                width: 160,
                height: 90,
            };
            config.thumbnail_max_dimension = 32;
        })
    }

    /// Harness whose config starts from defaults plus `customize`.
    pub fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = Config::with_library_directory(temp_dir.path().join("library"));
        config.resample_filter = ResampleFilter::Triangle;
        customize(&mut config);

        let db = Database::open(&config.database_file()).expect("Failed to open database");
        let library = Arc::new(SqliteLibrary::new(db, config.library_path()));
        let manager = JobManager::new(&config, library.clone());

        Self {
            temp_dir,
            config,
            library,
            manager,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn submit(&self, files: Vec<(&str, Vec<u8>)>) -> String {
        let files = files
            .into_iter()
            .map(|(name, bytes)| UploadFile::new(name, bytes))
            .collect();
        self.manager.submit(files).expect("submit failed")
    }

    /// Ingests one file through the pipeline and waits for it to land.
    pub async fn seed(&self, filename: &str, bytes: Vec<u8>) -> i64 {
        let job_id = self.submit(vec![(filename, bytes)]);
        let status = self.wait_terminal(&job_id).await;
        assert_eq!(status.results[0].status, FileStatus::Accepted, "seed {} failed", filename);
        status.results[0].image_id.expect("seeded image id")
    }

    /// Polls until `done` holds, panicking after a generous timeout.
    pub async fn wait_until<F>(&self, job_id: &str, mut done: F) -> JobStatusResponse
    where
        F: FnMut(&JobStatusResponse) -> bool,
    {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            let status = self.manager.status(job_id).expect("job should exist");
            if done(&status) {
                return status;
            }
            if Instant::now() > deadline {
                panic!(
                    "timed out waiting on job {} at step '{}': {:?}",
                    job_id, status.current_step, status.results
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_terminal(&self, job_id: &str) -> JobStatusResponse {
        self.wait_until(job_id, |s| s.status.is_terminal()).await
    }

    pub async fn wait_for_file(
        &self,
        job_id: &str,
        filename: &str,
        status: FileStatus,
    ) -> JobStatusResponse {
        self.wait_until(job_id, |s| {
            s.results
                .iter()
                .any(|r| r.filename == filename && r.status == status)
        })
        .await
    }

    pub fn image_count(&self) -> u64 {
        image_repo::count(self.library.database()).expect("count images")
    }

    pub fn tags(&self, image_id: i64) -> Vec<String> {
        image_repo::tags_for_image(self.library.database(), image_id).expect("list tags")
    }

    pub fn add_tag(&self, image_id: i64, tag: &str) {
        image_repo::add_tag(self.library.database(), image_id, tag).expect("add tag");
    }

    /// Decoded frame of a committed image.
    pub fn frame(&self, image_id: i64) -> image::DynamicImage {
        let image = self
            .library
            .get(image_id)
            .expect("lookup")
            .expect("image exists");
        let bytes = self.library.frame_bytes(&image).expect("frame bytes");
        image::load_from_memory(&bytes).expect("frame decodes")
    }
}
