//! Synchronization and conflict resolution.
//!
//! `conflict` diffs local state against a decrypted remote snapshot,
//! `resolver` turns the diff into a new local state under a strategy, and
//! `engine` drives push/pull end to end.

pub mod conflict;
pub mod engine;
pub mod error;
pub mod prompt;
pub mod resolver;

pub use conflict::{
    detect_conflicts, field_conflicts, Conflict, ConflictReport, ConflictType, CurrentChange,
    DeletionCase, FieldConflict, MirrorField,
};
pub use engine::{SyncOptions, SyncOrchestrator, SyncOutcome, SyncStatus, DEFAULT_BLOB_NAME};
pub use error::SyncError;
pub use prompt::{mask_secret, ChoiceTag, ConflictPrompter, FieldChoice, ManualChoice, TerminalPrompter};
pub use resolver::{
    reselect_current, ConflictResolver, ParseStrategyError, PushStrategy, ResolutionStrategy,
};
