use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

pub const ORIGINALS_DIR: &str = "originals";
pub const FRAMES_DIR: &str = "frames";
pub const THUMBNAILS_DIR: &str = "thumbnails";

/// Writes artifact files below a library root, never replacing an
/// existing file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }


    /// Stores `content` as `<root>/<relative_directory>/<filename>`, adding a
    /// `_<n>` suffix before the extension when the name is taken.
    pub fn store(
        &self,
        content: &[u8],
        relative_directory: &str,
        filename: &str,
    ) -> Result<PathBuf, StorageError> {
        let dir_path = self.root.join(relative_directory);
        self.ensure_directory(&dir_path)?;

        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) if dot_pos > 0 => (&filename[..dot_pos], Some(&filename[dot_pos..])),
            _ => (filename, None),
        };

        for counter in 1..=1000 {
            let try_filename = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };
            let try_path = dir_path.join(&try_filename);

            // create_new gives O_CREAT | O_EXCL
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(mut file) => {
                    file.write_all(content)
                        .map_err(|e| StorageError::WriteFile {
                            path: try_path.clone(),
                            source: e,
                        })?;
                    return Ok(try_path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    })
                }
            }
        }

        Err(StorageError::FileExists(dir_path.join(filename)))
    }

    pub fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        std::fs::read(path).map_err(|e| StorageError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Deletes a file, logging instead of failing.
    pub fn remove_quietly(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove superseded artifact");
            }
        }
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// Reduces an uploaded name to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(&['/', '\\'][..]).next().unwrap_or(name);
    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}

/// File stem of a sanitized name.
pub fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot_pos) if dot_pos > 0 => &name[..dot_pos],
        _ => name,
    }
}
