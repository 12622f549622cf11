use std::sync::Arc;

use image::GenericImageView;
use tracing::{debug, info};

use crate::error::IngestError;
use crate::fingerprint::fingerprint;
use crate::library::{ImageArtifacts, LibraryStore};
use crate::transform::{AspectInfo, CropBox, TransformEngine};

use super::config::PipelineConfig;
use super::context::{FileContext, FilePhase};
use super::duplicates::{self, CandidateSide, DuplicateAction, DuplicateCandidate};
use super::locks::CommitLocks;

/// Result of validating, hashing and looking up a file.
#[derive(Debug)]
pub enum Inspection {
    Clear,
    Duplicate(DuplicateCandidate),
}

/// What the aspect check decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropPlan {
    /// Close enough to the canvas aspect for a symmetric center crop.
    CenterCrop,
    /// The user has to place a box; the value is the suggestion.
    NeedsPosition(CropBox),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropChoice {
    Center,
    Box(CropBox),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Committed {
    pub image_id: i64,
    pub crop_box: CropBox,
}

/// Runs single files through the ingestion state machine. Every step is
/// blocking; pauses between steps are owned by the caller.
pub struct FileProcessor {
    config: PipelineConfig,
    engine: TransformEngine,
    store: Arc<dyn LibraryStore>,
    locks: CommitLocks,
}

impl FileProcessor {
    pub fn new(config: PipelineConfig, store: Arc<dyn LibraryStore>) -> Self {
        let engine = config.transform_engine();
        Self {
            config,
            engine,
            store,
            locks: CommitLocks::new(),
        }
    }

    /// Validating, Hashing and DuplicateCheck.
    pub fn inspect(&self, ctx: &mut FileContext) -> Result<Inspection, IngestError> {
        let image = self.engine.decode(&ctx.bytes)?;
        let (width, height) = image.dimensions();
        ctx.aspect = Some(AspectInfo::new(width, height));
        ctx.thumbnail = Some(self.engine.thumbnail(&image)?);
        ctx.image = Some(image);
        debug!(width, height, "Image decoded");

        ctx.advance(FilePhase::Hashing)?;
        let digest = fingerprint(&ctx.bytes);
        debug!(fingerprint = %digest, "Fingerprint computed");

        ctx.advance(FilePhase::DuplicateCheck)?;
        let found = duplicates::find_match(self.store.as_ref(), &digest, &ctx.filename)?;
        ctx.fingerprint = Some(digest);

        let Some(found) = found else {
            return Ok(Inspection::Clear);
        };

        info!(
            existing_id = found.image.id,
            match_kind = ?found.kind,
            "Duplicate found"
        );
        let candidate = duplicates::build_candidate(self.store.as_ref(), &found, incoming_side(ctx));
        ctx.duplicate = Some(found);
        ctx.advance(FilePhase::AwaitingDuplicateResolution)?;
        Ok(Inspection::Duplicate(candidate))
    }

    /// Applies the user's duplicate decision. Returns false when the file is
    /// done (skipped).
    pub fn apply_duplicate_action(
        &self,
        ctx: &mut FileContext,
        action: DuplicateAction,
    ) -> Result<bool, IngestError> {
        if ctx.phase() != FilePhase::AwaitingDuplicateResolution {
            return Err(IngestError::StateMismatch {
                filename: ctx.filename.clone(),
                expected: FilePhase::AwaitingDuplicateResolution.as_str(),
                actual: ctx.phase().as_str().to_string(),
            });
        }

        info!(?action, "Duplicate resolved");
        ctx.action = Some(action);
        match action {
            DuplicateAction::Skip => {
                ctx.advance(FilePhase::Skipped)?;
                Ok(false)
            }
            DuplicateAction::Overwrite | DuplicateAction::ImportAnyway => Ok(true),
        }
    }

    /// AspectCheck.
    pub fn check_aspect(&self, ctx: &mut FileContext) -> Result<CropPlan, IngestError> {
        ctx.advance(FilePhase::AspectCheck)?;
        let aspect = ctx
            .aspect
            .ok_or_else(|| IngestError::InvalidImage("image was not decoded".to_string()))?;

        let target = self.engine.target_aspect();
        let within = (aspect.aspect - target).abs() <= self.config.aspect_tolerance;
        debug!(aspect = aspect.aspect, target, within, "Aspect checked");

        if within {
            Ok(CropPlan::CenterCrop)
        } else {
            ctx.advance(FilePhase::AwaitingCropPosition)?;
            Ok(CropPlan::NeedsPosition(self.config.default_crop_box))
        }
    }

    /// Transforming and Committing.
    pub fn transform_and_commit(
        &self,
        ctx: &mut FileContext,
        choice: CropChoice,
    ) -> Result<Committed, IngestError> {
        ctx.advance(FilePhase::Transforming)?;
        let image = ctx
            .image
            .as_ref()
            .ok_or_else(|| IngestError::InvalidImage("image was not decoded".to_string()))?;

        let (frame, applied) = match choice {
            CropChoice::Center => self
                .engine
                .center_crop_to_aspect(image, self.engine.target_aspect())?,
            CropChoice::Box(crop_box) => (self.engine.frame(image, &crop_box)?, crop_box),
        };
        let frame_jpeg = self.engine.encode_frame(&frame)?;
        drop(frame);

        ctx.advance(FilePhase::Committing)?;
        let digest = ctx
            .fingerprint
            .clone()
            .unwrap_or_else(|| fingerprint(&ctx.bytes));
        let aspect = ctx
            .aspect
            .ok_or_else(|| IngestError::InvalidImage("image was not decoded".to_string()))?;
        let thumbnail = ctx.thumbnail.as_deref().unwrap_or_default();

        let artifacts = ImageArtifacts {
            original_filename: &ctx.filename,
            original: &ctx.bytes,
            frame_jpeg: &frame_jpeg,
            thumbnail_jpeg: thumbnail,
            fingerprint: &digest,
            width: aspect.width,
            height: aspect.height,
        };

        let overwrite = ctx.overwrite_target();
        // Fingerprint first, then the overwritten row.
        let image = self.locks.with_lock(&digest, || match overwrite {
            Some(id) => self
                .locks
                .with_lock(&format!("image:{}", id), || self.store.update(id, &artifacts)),
            None => self.store.insert(&artifacts),
        })?;

        ctx.advance(FilePhase::Accepted)?;
        // Decoded pixels are no longer needed.
        ctx.image = None;

        Ok(Committed {
            image_id: image.id,
            crop_box: applied,
        })
    }
}

/// Incoming side of a duplicate comparison.
pub fn incoming_side(ctx: &FileContext) -> CandidateSide {
    let (width, height) = ctx.aspect.map(|a| (a.width, a.height)).unwrap_or((0, 0));
    CandidateSide {
        filename: ctx.filename.clone(),
        size_bytes: ctx.size_bytes(),
        width,
        height,
        thumbnail: ctx.thumbnail.as_deref().map(crate::transform::jpeg_data_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CanvasConfig;
    use crate::db::{image_repo, Database};
    use crate::library::SqliteLibrary;
    use image::imageops::FilterType;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        library: Arc<SqliteLibrary>,
        processor: FileProcessor,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let library = Arc::new(SqliteLibrary::new(
            Database::open_in_memory().unwrap(),
            dir.path(),
        ));
        let config = PipelineConfig {
            canvas: CanvasConfig {
                width: 160,
                height: 90,
            },
            aspect_tolerance: 0.05,
            default_crop_box: CropBox::DEFAULT,
            resample_filter: FilterType::Triangle,
            frame_jpeg_quality: 85,
            thumbnail_max_dimension: 32,
        };
        let processor = FileProcessor::new(config, library.clone());
        Fixture {
            dir,
            library,
            processor,
        }
    }

    fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
            Rgb([shade, (x % 256) as u8, 0])
        }));
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_inspect_rejects_corrupt_bytes() {
        let f = fixture();
        let mut ctx = FileContext::new("broken.jpg", b"\xFF\xD8garbage".to_vec());
        let err = f.processor.inspect(&mut ctx).unwrap_err();
        assert!(matches!(err, IngestError::InvalidImage(_)));
    }

    #[test]
    fn test_widescreen_file_commits_with_center_crop() {
        let f = fixture();
        let mut ctx = FileContext::new("a.png", png(192, 108, 10));

        assert!(matches!(f.processor.inspect(&mut ctx).unwrap(), Inspection::Clear));
        assert_eq!(f.processor.check_aspect(&mut ctx).unwrap(), CropPlan::CenterCrop);

        let committed = f
            .processor
            .transform_and_commit(&mut ctx, CropChoice::Center)
            .unwrap();
        assert_eq!(ctx.phase(), FilePhase::Accepted);
        assert_eq!(committed.crop_box, CropBox::FULL);

        let stored = f.library.get(committed.image_id).unwrap().unwrap();
        assert_eq!((stored.width, stored.height), (192, 108));
        let frame = image::load_from_memory(&f.library.frame_bytes(&stored).unwrap()).unwrap();
        assert_eq!(frame.dimensions(), (160, 90));
    }

    #[test]
    fn test_square_file_needs_position() {
        let f = fixture();
        let mut ctx = FileContext::new("d.png", png(80, 80, 20));
        f.processor.inspect(&mut ctx).unwrap();

        let plan = f.processor.check_aspect(&mut ctx).unwrap();
        assert_eq!(plan, CropPlan::NeedsPosition(CropBox::DEFAULT));
        assert_eq!(ctx.phase(), FilePhase::AwaitingCropPosition);

        let committed = f
            .processor
            .transform_and_commit(&mut ctx, CropChoice::Box(CropBox::new(0.0, 0.1, 1.0, 0.8)))
            .unwrap();
        let stored = f.library.get(committed.image_id).unwrap().unwrap();
        let frame = image::load_from_memory(&f.library.frame_bytes(&stored).unwrap()).unwrap();
        assert_eq!(frame.dimensions(), (160, 90));
    }

    #[test]
    fn test_duplicate_by_fingerprint_then_skip() {
        let f = fixture();
        let bytes = png(160, 90, 30);

        let mut first = FileContext::new("c.png", bytes.clone());
        f.processor.inspect(&mut first).unwrap();
        f.processor.check_aspect(&mut first).unwrap();
        f.processor
            .transform_and_commit(&mut first, CropChoice::Center)
            .unwrap();

        let mut second = FileContext::new("b.png", bytes);
        let Inspection::Duplicate(candidate) = f.processor.inspect(&mut second).unwrap() else {
            panic!("expected a duplicate");
        };
        assert_eq!(candidate.match_kind, duplicates::MatchKind::Fingerprint);
        assert_eq!(candidate.existing.filename, "c.png");
        assert_eq!(candidate.incoming.filename, "b.png");

        let proceed = f
            .processor
            .apply_duplicate_action(&mut second, DuplicateAction::Skip)
            .unwrap();
        assert!(!proceed);
        assert_eq!(second.phase(), FilePhase::Skipped);
        assert_eq!(image_repo::count(f.library.database()).unwrap(), 1);
    }

    #[test]
    fn test_overwrite_updates_matched_row() {
        let f = fixture();

        let mut first = FileContext::new("c.png", png(160, 90, 40));
        f.processor.inspect(&mut first).unwrap();
        f.processor.check_aspect(&mut first).unwrap();
        let original = f
            .processor
            .transform_and_commit(&mut first, CropChoice::Center)
            .unwrap();

        let mut second = FileContext::new("c.png", png(320, 180, 50));
        assert!(matches!(
            f.processor.inspect(&mut second).unwrap(),
            Inspection::Duplicate(_)
        ));
        f.processor
            .apply_duplicate_action(&mut second, DuplicateAction::Overwrite)
            .unwrap();
        f.processor.check_aspect(&mut second).unwrap();
        let replaced = f
            .processor
            .transform_and_commit(&mut second, CropChoice::Center)
            .unwrap();

        assert_eq!(replaced.image_id, original.image_id);
        let stored = f.library.get(original.image_id).unwrap().unwrap();
        assert_eq!(stored.width, 320);
        assert_eq!(image_repo::count(f.library.database()).unwrap(), 1);
    }

    #[test]
    fn test_concurrent_overwrites_leave_one_set_of_files() {
        let f = fixture();
        let mut first = FileContext::new("c.png", png(160, 90, 70));
        f.processor.inspect(&mut first).unwrap();
        f.processor.check_aspect(&mut first).unwrap();
        let original = f
            .processor
            .transform_and_commit(&mut first, CropChoice::Center)
            .unwrap();

        let mut pending: Vec<FileContext> = [80u8, 90]
            .into_iter()
            .map(|shade| {
                let mut ctx = FileContext::new("c.png", png(320, 180, shade));
                assert!(matches!(
                    f.processor.inspect(&mut ctx).unwrap(),
                    Inspection::Duplicate(_)
                ));
                f.processor
                    .apply_duplicate_action(&mut ctx, DuplicateAction::Overwrite)
                    .unwrap();
                f.processor.check_aspect(&mut ctx).unwrap();
                ctx
            })
            .collect();

        std::thread::scope(|scope| {
            for ctx in pending.iter_mut() {
                let processor = &f.processor;
                scope.spawn(move || {
                    let committed = processor
                        .transform_and_commit(ctx, CropChoice::Center)
                        .unwrap();
                    assert_eq!(committed.image_id, original.image_id);
                });
            }
        });

        let stored = f.library.get(original.image_id).unwrap().unwrap();
        for dir in [
            crate::library::storage::ORIGINALS_DIR,
            crate::library::storage::FRAMES_DIR,
            crate::library::storage::THUMBNAILS_DIR,
        ] {
            let files = std::fs::read_dir(f.dir.path().join(dir)).unwrap().count();
            assert_eq!(files, 1, "{} holds stale files", dir);
        }
        assert!(f.library.original_bytes(&stored).is_ok());
        assert!(f.library.frame_bytes(&stored).is_ok());
        assert_eq!(image_repo::count(f.library.database()).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_action_requires_pause() {
        let f = fixture();
        let mut ctx = FileContext::new("a.png", png(160, 90, 60));
        f.processor.inspect(&mut ctx).unwrap();

        let err = f
            .processor
            .apply_duplicate_action(&mut ctx, DuplicateAction::Skip)
            .unwrap_err();
        assert!(matches!(err, IngestError::StateMismatch { .. }));
    }
}
