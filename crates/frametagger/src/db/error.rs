use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create database directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema upgrade to v{version} ({name}) failed: {source}")]
    SchemaUpgrade {
        version: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// The file was written by a newer build.
    #[error("Database schema v{found} is newer than supported v{supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}
