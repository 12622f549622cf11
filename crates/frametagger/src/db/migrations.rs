//! Schema upgrades. The applied version lives in `PRAGMA user_version`;
//! each step runs in its own transaction.

use rusqlite::Connection;

use super::error::DatabaseError;

/// (version, name, sql), ascending.
const STEPS: &[(u32, &str, &str)] = &[
    (1, "images", include_str!("sql/001_create_images.sql")),
    (2, "image_tags", include_str!("sql/002_create_image_tags.sql")),
];

pub fn latest_version() -> u32 {
    STEPS.last().map(|(version, _, _)| *version).unwrap_or(0)
}

pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Brings `conn` up to the latest schema. Returns the number of steps run.
pub fn upgrade(conn: &Connection) -> Result<usize, DatabaseError> {
    let found = schema_version(conn)?;
    if found > latest_version() {
        return Err(DatabaseError::UnsupportedSchema {
            found,
            supported: latest_version(),
        });
    }

    let mut applied = 0;
    for &(version, name, sql) in STEPS.iter().filter(|(v, _, _)| *v > found) {
        log::info!("Upgrading library schema to v{} ({})", version, name);
        let step = |source| DatabaseError::SchemaUpgrade {
            version,
            name,
            source,
        };

        let tx = conn.unchecked_transaction().map_err(step)?;
        tx.execute_batch(sql).map_err(step)?;
        tx.pragma_update(None, "user_version", version)
            .map_err(step)?;
        tx.commit().map_err(step)?;
        applied += 1;
    }

    Ok(applied)
}
