use image::DynamicImage;

use crate::error::IngestError;
use crate::transform::AspectInfo;

use super::duplicates::{DuplicateAction, DuplicateMatch};

/// Position of one file in the ingestion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePhase {
    Validating,
    Hashing,
    DuplicateCheck,
    AwaitingDuplicateResolution,
    AspectCheck,
    AwaitingCropPosition,
    Transforming,
    Committing,
    Accepted,
    Skipped,
    Errored,
}

impl FilePhase {
    fn rank(self) -> u8 {
        match self {
            FilePhase::Validating => 0,
            FilePhase::Hashing => 1,
            FilePhase::DuplicateCheck => 2,
            FilePhase::AwaitingDuplicateResolution => 3,
            FilePhase::AspectCheck => 4,
            FilePhase::AwaitingCropPosition => 5,
            FilePhase::Transforming => 6,
            FilePhase::Committing => 7,
            FilePhase::Accepted | FilePhase::Skipped | FilePhase::Errored => 8,
        }
    }

    pub fn is_final(self) -> bool {
        self.rank() == 8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilePhase::Validating => "validating",
            FilePhase::Hashing => "hashing",
            FilePhase::DuplicateCheck => "duplicate_check",
            FilePhase::AwaitingDuplicateResolution => "duplicate_pending",
            FilePhase::AspectCheck => "aspect_check",
            FilePhase::AwaitingCropPosition => "crop_pending",
            FilePhase::Transforming => "transforming",
            FilePhase::Committing => "committing",
            FilePhase::Accepted => "accepted",
            FilePhase::Skipped => "skipped",
            FilePhase::Errored => "error",
        }
    }
}

/// Working state for one uploaded file.
pub struct FileContext {
    pub filename: String,
    pub bytes: Vec<u8>,
    phase: FilePhase,

    // Set while validating
    pub image: Option<DynamicImage>,
    pub aspect: Option<AspectInfo>,
    pub thumbnail: Option<Vec<u8>>,

    // Set while hashing
    pub fingerprint: Option<String>,

    // Set by the duplicate check and its resolution
    pub duplicate: Option<DuplicateMatch>,
    pub action: Option<DuplicateAction>,
}

impl FileContext {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            phase: FilePhase::Validating,
            image: None,
            aspect: None,
            thumbnail: None,
            fingerprint: None,
            duplicate: None,
            action: None,
        }
    }

    pub fn phase(&self) -> FilePhase {
        self.phase
    }

    /// Moves forward to `next`. Going backwards, or leaving a final phase,
    /// is refused.
    pub fn advance(&mut self, next: FilePhase) -> Result<(), IngestError> {
        if self.phase.is_final() || next.rank() < self.phase.rank() {
            return Err(IngestError::StateMismatch {
                filename: self.filename.clone(),
                expected: next.as_str(),
                actual: self.phase.as_str().to_string(),
            });
        }
        tracing::trace!(from = self.phase.as_str(), to = next.as_str(), "File phase");
        self.phase = next;
        Ok(())
    }

    /// Library row to overwrite, when the user chose `overwrite`.
    pub fn overwrite_target(&self) -> Option<i64> {
        match (self.action, &self.duplicate) {
            (Some(DuplicateAction::Overwrite), Some(found)) => Some(found.image.id),
            _ => None,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_starts_validating() {
        let ctx = FileContext::new("a.jpg", vec![1, 2, 3]);
        assert_eq!(ctx.phase(), FilePhase::Validating);
        assert_eq!(ctx.size_bytes(), 3);
        assert!(ctx.overwrite_target().is_none());
    }

    #[test]
    fn test_advance_forward_and_skip_ahead() {
        let mut ctx = FileContext::new("a.jpg", Vec::new());
        ctx.advance(FilePhase::Hashing).unwrap();
        ctx.advance(FilePhase::DuplicateCheck).unwrap();
        ctx.advance(FilePhase::AspectCheck).unwrap();
        ctx.advance(FilePhase::Transforming).unwrap();
        ctx.advance(FilePhase::Accepted).unwrap();
        assert_eq!(ctx.phase(), FilePhase::Accepted);
    }

    #[test]
    fn test_advance_refuses_going_back() {
        let mut ctx = FileContext::new("a.jpg", Vec::new());
        ctx.advance(FilePhase::AspectCheck).unwrap();
        let err = ctx.advance(FilePhase::DuplicateCheck).unwrap_err();
        assert!(matches!(err, IngestError::StateMismatch { .. }));
        assert_eq!(ctx.phase(), FilePhase::AspectCheck);
    }

    #[test]
    fn test_final_phase_is_sticky() {
        let mut ctx = FileContext::new("a.jpg", Vec::new());
        ctx.advance(FilePhase::Skipped).unwrap();
        assert!(ctx.advance(FilePhase::Errored).is_err());
        assert!(ctx.advance(FilePhase::Accepted).is_err());
    }
}
