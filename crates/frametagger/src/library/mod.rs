//! Library Store: image records in SQLite, artifacts on disk.

pub mod storage;

use std::path::Path;

use chrono::Utc;

use crate::db::image_repo::{self, ImageRow};
use crate::db::Database;
use crate::error::StorageError;

pub use storage::{sanitize_filename, FileStorage};

/// A committed library entry.
pub type LibraryImage = ImageRow;

/// Everything written for one accepted upload.
#[derive(Debug, Clone, Copy)]
pub struct ImageArtifacts<'a> {
    pub original_filename: &'a str,
    pub original: &'a [u8],
    pub frame_jpeg: &'a [u8],
    pub thumbnail_jpeg: &'a [u8],
    pub fingerprint: &'a str,
    pub width: u32,
    pub height: u32,
}

/// Persistence boundary used by the ingestion pipeline.
///
/// Calls are blocking; async callers run them on the blocking pool.
pub trait LibraryStore: Send + Sync {
    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<LibraryImage>, StorageError>;

    fn find_by_filename(&self, filename: &str) -> Result<Option<LibraryImage>, StorageError>;

    fn get(&self, id: i64) -> Result<Option<LibraryImage>, StorageError>;

    fn insert(&self, artifacts: &ImageArtifacts<'_>) -> Result<LibraryImage, StorageError>;

    /// Replaces content, fingerprint and dimensions of image `id`. The id,
    /// original filename, creation time and tag associations are kept.
    fn update(&self, id: i64, artifacts: &ImageArtifacts<'_>) -> Result<LibraryImage, StorageError>;

    /// The bytes exactly as uploaded.
    fn original_bytes(&self, image: &LibraryImage) -> Result<Vec<u8>, StorageError>;

    /// The canvas-sized JPEG.
    fn frame_bytes(&self, image: &LibraryImage) -> Result<Vec<u8>, StorageError>;

    fn thumbnail_bytes(&self, image: &LibraryImage) -> Result<Vec<u8>, StorageError>;
}

#[derive(Debug, Clone)]
pub struct SqliteLibrary {
    db: Database,
    files: FileStorage,
}

struct StoredPaths {
    filename: String,
    original: String,
    frame: String,
    thumbnail: String,
}

impl SqliteLibrary {
    pub fn new<P: AsRef<Path>>(db: Database, library_directory: P) -> Self {
        Self {
            db,
            files: FileStorage::new(library_directory),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn write_artifacts(&self, artifacts: &ImageArtifacts<'_>) -> Result<StoredPaths, StorageError> {
        let name = sanitize_filename(artifacts.original_filename);
        let prefix = Utc::now().timestamp_millis();
        let stored_name = format!("{}_{}", prefix, name);

        let original = self
            .files
            .store(artifacts.original, storage::ORIGINALS_DIR, &stored_name)?;
        // Frame and thumbnail share the final (possibly suffixed) stem.
        let filename = original
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&stored_name)
            .to_string();
        let jpeg_name = format!("{}.jpg", storage::stem(&filename));

        let frame = match self
            .files
            .store(artifacts.frame_jpeg, storage::FRAMES_DIR, &jpeg_name)
        {
            Ok(path) => path,
            Err(e) => {
                self.files.remove_quietly(&original);
                return Err(e);
            }
        };
        let thumbnail = match self
            .files
            .store(artifacts.thumbnail_jpeg, storage::THUMBNAILS_DIR, &jpeg_name)
        {
            Ok(path) => path,
            Err(e) => {
                self.files.remove_quietly(&original);
                self.files.remove_quietly(&frame);
                return Err(e);
            }
        };

        tracing::debug!(
            original = %original.display(),
            frame = %frame.display(),
            "Wrote image artifacts"
        );

        Ok(StoredPaths {
            filename,
            original: original.display().to_string(),
            frame: frame.display().to_string(),
            thumbnail: thumbnail.display().to_string(),
        })
    }

    fn discard(&self, paths: &StoredPaths) {
        self.files.remove_quietly(Path::new(&paths.original));
        self.files.remove_quietly(Path::new(&paths.frame));
        self.files.remove_quietly(Path::new(&paths.thumbnail));
    }
}

impl LibraryStore for SqliteLibrary {
    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<LibraryImage>, StorageError> {
        Ok(image_repo::find_by_fingerprint(&self.db, fingerprint)?)
    }

    fn find_by_filename(&self, filename: &str) -> Result<Option<LibraryImage>, StorageError> {
        Ok(image_repo::find_by_original_filename(&self.db, filename)?)
    }

    fn get(&self, id: i64) -> Result<Option<LibraryImage>, StorageError> {
        Ok(image_repo::find_by_id(&self.db, id)?)
    }

    fn insert(&self, artifacts: &ImageArtifacts<'_>) -> Result<LibraryImage, StorageError> {
        let paths = self.write_artifacts(artifacts)?;
        let now = Utc::now().to_rfc3339();

        let mut row = ImageRow {
            id: 0,
            filename: paths.filename.clone(),
            original_filename: artifacts.original_filename.to_string(),
            path: paths.original.clone(),
            frame_path: paths.frame.clone(),
            thumbnail_path: paths.thumbnail.clone(),
            fingerprint: artifacts.fingerprint.to_string(),
            width: artifacts.width,
            height: artifacts.height,
            size_bytes: artifacts.original.len() as i64,
            created_at: now.clone(),
            updated_at: now,
        };

        match image_repo::insert(&self.db, &row) {
            Ok(id) => {
                row.id = id;
                tracing::info!(image_id = id, filename = %row.original_filename, "Image added to library");
                Ok(row)
            }
            Err(e) => {
                self.discard(&paths);
                Err(e.into())
            }
        }
    }

    fn update(&self, id: i64, artifacts: &ImageArtifacts<'_>) -> Result<LibraryImage, StorageError> {
        let existing = image_repo::find_by_id(&self.db, id)?.ok_or(StorageError::ImageNotFound(id))?;
        let paths = self.write_artifacts(artifacts)?;

        let row = ImageRow {
            id,
            filename: paths.filename.clone(),
            original_filename: existing.original_filename.clone(),
            path: paths.original.clone(),
            frame_path: paths.frame.clone(),
            thumbnail_path: paths.thumbnail.clone(),
            fingerprint: artifacts.fingerprint.to_string(),
            width: artifacts.width,
            height: artifacts.height,
            size_bytes: artifacts.original.len() as i64,
            created_at: existing.created_at.clone(),
            updated_at: Utc::now().to_rfc3339(),
        };

        match image_repo::update_content(&self.db, &row) {
            Ok(true) => {}
            Ok(false) => {
                self.discard(&paths);
                return Err(StorageError::ImageNotFound(id));
            }
            Err(e) => {
                self.discard(&paths);
                return Err(e.into());
            }
        }

        for old in [&existing.path, &existing.frame_path, &existing.thumbnail_path] {
            self.files.remove_quietly(Path::new(old));
        }

        tracing::info!(image_id = id, filename = %row.original_filename, "Library image overwritten");
        Ok(row)
    }

    fn original_bytes(&self, image: &LibraryImage) -> Result<Vec<u8>, StorageError> {
        self.files.read(Path::new(&image.path))
    }

    fn frame_bytes(&self, image: &LibraryImage) -> Result<Vec<u8>, StorageError> {
        self.files.read(Path::new(&image.frame_path))
    }

    fn thumbnail_bytes(&self, image: &LibraryImage) -> Result<Vec<u8>, StorageError> {
        self.files.read(Path::new(&image.thumbnail_path))
    }
}
