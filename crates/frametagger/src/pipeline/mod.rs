pub mod config;
pub mod context;
pub mod duplicates;
pub mod locks;
pub mod processor;

pub use config::PipelineConfig;
pub use context::{FileContext, FilePhase};
pub use duplicates::{
    CandidateSide, DuplicateAction, DuplicateCandidate, DuplicateMatch, MatchKind,
};
pub use locks::CommitLocks;
pub use processor::{Committed, CropChoice, CropPlan, FileProcessor, Inspection};
