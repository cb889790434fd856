//! Database schemas for Questline
//!
//! Defines MongoDB document structures for task definitions, progress
//! records, badge definitions, and the user aggregate fields the engine
//! reads and writes.

mod badge;
mod metadata;
mod progress;
mod task;
mod user;

pub use badge::{
    BadgeCategory, BadgeDefinitionDoc, BadgeRarity, BadgeRequirements, BadgeTier, BADGE_COLLECTION,
};
pub use metadata::Metadata;
pub use progress::{
    AttemptEntry, ProgressRecordDoc, ProgressState, ProgressStatus, QuizAnswerResult, QuizProgress,
    RewardInstance, SubmissionState, PROGRESS_COLLECTION,
};
pub use task::{
    NftMetadata, ProofKind, QuizQuestion, RepeatInterval, RewardKind, RewardSpec, TaskDefinitionDoc,
    TaskDifficulty, TaskRequirements, TaskType, TimeConstraints, VerificationMode,
    VerificationSpec, TASK_COLLECTION,
};
pub use user::{ConnectedAccount, EarnedBadge, UserDoc, USER_COLLECTION};
