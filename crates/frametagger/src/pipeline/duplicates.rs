//! Duplicate Resolver: matches an incoming file against the library.
//!
//! A content fingerprint match always wins over a filename match. A match is
//! never resolved here; it is handed back so the user can decide.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::library::{LibraryImage, LibraryStore};
use crate::transform::jpeg_data_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Fingerprint,
    Filename,
}

/// User decision for a file paused on a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAction {
    Skip,
    Overwrite,
    ImportAnyway,
}

#[derive(Debug, Clone)]
pub struct DuplicateMatch {
    pub kind: MatchKind,
    pub image: LibraryImage,
}

/// Name, size and dimensions of one side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSide {
    pub filename: String,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    /// `data:` URL, absent when no preview could be produced.
    pub thumbnail: Option<String>,
}

/// Comparison payload shown while a file is `duplicate_pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub match_kind: MatchKind,
    pub existing_id: i64,
    pub existing: CandidateSide,
    pub incoming: CandidateSide,
}

pub fn find_match(
    store: &dyn LibraryStore,
    fingerprint: &str,
    filename: &str,
) -> Result<Option<DuplicateMatch>, StorageError> {
    if let Some(image) = store.find_by_fingerprint(fingerprint)? {
        return Ok(Some(DuplicateMatch {
            kind: MatchKind::Fingerprint,
            image,
        }));
    }

    Ok(store
        .find_by_filename(filename)?
        .map(|image| DuplicateMatch {
            kind: MatchKind::Filename,
            image,
        }))
}

/// Builds the side-by-side payload. A missing stored thumbnail only drops the
/// existing preview.
pub fn build_candidate(
    store: &dyn LibraryStore,
    found: &DuplicateMatch,
    incoming: CandidateSide,
) -> DuplicateCandidate {
    let existing_thumbnail = match store.thumbnail_bytes(&found.image) {
        Ok(bytes) => Some(jpeg_data_url(&bytes)),
        Err(e) => {
            tracing::warn!(image_id = found.image.id, error = %e, "Stored thumbnail unavailable");
            None
        }
    };

    DuplicateCandidate {
        match_kind: found.kind,
        existing_id: found.image.id,
        existing: existing_side(&found.image, existing_thumbnail),
        incoming,
    }
}

fn existing_side(image: &LibraryImage, thumbnail: Option<String>) -> CandidateSide {
    CandidateSide {
        filename: image.original_filename.clone(),
        size_bytes: image.size_bytes.max(0) as u64,
        width: image.width,
        height: image.height,
        thumbnail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::library::{ImageArtifacts, SqliteLibrary};
    use tempfile::TempDir;

    fn library_with(entries: &[(&str, &str)]) -> (TempDir, SqliteLibrary) {
        let dir = TempDir::new().unwrap();
        let library = SqliteLibrary::new(Database::open_in_memory().unwrap(), dir.path());
        for &(name, fingerprint) in entries {
            library
                .insert(&ImageArtifacts {
                    original_filename: name,
                    original: b"bytes",
                    frame_jpeg: b"frame",
                    thumbnail_jpeg: &[0xFF, 0xD8, 0xFF],
                    fingerprint,
                    width: 640,
                    height: 360,
                })
                .unwrap();
        }
        (dir, library)
    }

    #[test]
    fn test_no_match() {
        let (_dir, library) = library_with(&[("c.jpg", "fp-c")]);
        assert!(find_match(&library, "fp-x", "x.jpg").unwrap().is_none());
    }

    #[test]
    fn test_fingerprint_match() {
        let (_dir, library) = library_with(&[("c.jpg", "fp-c")]);
        let found = find_match(&library, "fp-c", "b.jpg").unwrap().unwrap();
        assert_eq!(found.kind, MatchKind::Fingerprint);
        assert_eq!(found.image.original_filename, "c.jpg");
    }

    #[test]
    fn test_filename_fallback() {
        let (_dir, library) = library_with(&[("c.jpg", "fp-c")]);
        let found = find_match(&library, "fp-other", "c.jpg").unwrap().unwrap();
        assert_eq!(found.kind, MatchKind::Filename);
    }

    #[test]
    fn test_fingerprint_beats_filename() {
        let (_dir, library) = library_with(&[("b.jpg", "fp-b"), ("c.jpg", "fp-c")]);
        let found = find_match(&library, "fp-c", "b.jpg").unwrap().unwrap();
        assert_eq!(found.kind, MatchKind::Fingerprint);
        assert_eq!(found.image.original_filename, "c.jpg");
    }

    #[test]
    fn test_candidate_carries_both_sides() {
        let (_dir, library) = library_with(&[("c.jpg", "fp-c")]);
        let found = find_match(&library, "fp-c", "b.jpg").unwrap().unwrap();
        let incoming = CandidateSide {
            filename: "b.jpg".to_string(),
            size_bytes: 5,
            width: 640,
            height: 360,
            thumbnail: None,
        };

        let candidate = build_candidate(&library, &found, incoming.clone());
        assert_eq!(candidate.existing_id, found.image.id);
        assert_eq!(candidate.existing.filename, "c.jpg");
        assert_eq!(candidate.existing.size_bytes, 5);
        assert_eq!(
            candidate.existing.thumbnail.as_deref(),
            Some("data:image/jpeg;base64,/9j/")
        );
        assert_eq!(candidate.incoming, incoming);

        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["match_kind"], "fingerprint");
    }

    #[test]
    fn test_action_names() {
        let action: DuplicateAction = serde_json::from_str("\"import_anyway\"").unwrap();
        assert_eq!(action, DuplicateAction::ImportAnyway);
        assert!(serde_json::from_str::<DuplicateAction>("\"merge\"").is_err());
    }
}
