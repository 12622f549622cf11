//! Image repository: CRUD operations for the `images` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw image row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRow {
    pub id: i64,
    /// Generated storage filename (unique).
    pub filename: String,
    pub original_filename: String,
    /// Path of the unmodified upload.
    pub path: String,
    pub frame_path: String,
    pub thumbnail_path: String,
    pub fingerprint: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl ImageRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            filename: row.get("filename")?,
            original_filename: row.get("original_filename")?,
            path: row.get("path")?,
            frame_path: row.get("frame_path")?,
            thumbnail_path: row.get("thumbnail_path")?,
            fingerprint: row.get("fingerprint")?,
            width: row.get("width")?,
            height: row.get("height")?,
            size_bytes: row.get("size_bytes")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a new image row, ignoring `image.id`. Returns the assigned id.
pub fn insert(db: &Database, image: &ImageRow) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO images (filename, original_filename, path, frame_path, thumbnail_path,
             fingerprint, width, height, size_bytes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                image.filename,
                image.original_filename,
                image.path,
                image.frame_path,
                image.thumbnail_path,
                image.fingerprint,
                image.width,
                image.height,
                image.size_bytes,
                image.created_at,
                image.updated_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Replaces the stored content of an existing row.
///
/// `id`, `original_filename` and `created_at` are left untouched, as are any
/// rows in `image_tags`. Returns false when no row has this id.
pub fn update_content(db: &Database, image: &ImageRow) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE images SET filename=?2, path=?3, frame_path=?4, thumbnail_path=?5,
             fingerprint=?6, width=?7, height=?8, size_bytes=?9, updated_at=?10
             WHERE id=?1",
            params![
                image.id,
                image.filename,
                image.path,
                image.frame_path,
                image.thumbnail_path,
                image.fingerprint,
                image.width,
                image.height,
                image.size_bytes,
                image.updated_at,
            ],
        )?;
        Ok(changed > 0)
    })
}

/// Finds an image by its ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<ImageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM images WHERE id = ?1",
                params![id],
                ImageRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Finds the oldest image with this content fingerprint.
pub fn find_by_fingerprint(
    db: &Database,
    fingerprint: &str,
) -> Result<Option<ImageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM images WHERE fingerprint = ?1 ORDER BY id ASC LIMIT 1",
                params![fingerprint],
                ImageRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Finds the oldest image uploaded under this original filename.
pub fn find_by_original_filename(
    db: &Database,
    original_filename: &str,
) -> Result<Option<ImageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM images WHERE original_filename = ?1 ORDER BY id ASC LIMIT 1",
                params![original_filename],
                ImageRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Counts all image rows.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM images", [], |r| r.get(0))?;
        Ok(count)
    })
}

/// Associates a tag with an image. Tag ownership lives outside the
/// ingestion pipeline; this exists so that associations can be seeded and
/// checked.
pub fn add_tag(db: &Database, image_id: i64, tag: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO image_tags (image_id, tag) VALUES (?1, ?2)",
            params![image_id, tag],
        )?;
        Ok(())
    })
}

/// Lists the tags attached to an image, alphabetically.
pub fn tags_for_image(db: &Database, image_id: i64) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT tag FROM image_tags WHERE image_id = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map(params![image_id], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tags)
    })
}
