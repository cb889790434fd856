//! Progress record schema
//!
//! One document per (user, task) pair, enforced by a unique index. The record
//! is the engine's single source of truth for a user's journey through one
//! task: status, attempt history, working progress state, granted rewards,
//! and the completion streak. The engine is the sole mutator.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::task::{NftMetadata, ProofKind, RewardKind, RewardSpec};
use crate::db::schemas::Metadata;

/// Collection name for progress records
pub const PROGRESS_COLLECTION: &str = "task_progress";

/// Lifecycle status of a progress record.
///
/// The engine only ever persists `in_progress`, `submitted`, `rejected`, and
/// `completed`; `not_started` and `verified` exist for wire compatibility
/// with catalog listings that synthesize a status for untouched tasks.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[default]
    NotStarted,
    InProgress,
    Submitted,
    Verified,
    Rejected,
    Completed,
}

/// One logged start-to-resolution cycle
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AttemptEntry {
    pub started_at: DateTime,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime>,

    #[serde(default)]
    pub success: bool,

    /// Multiplier-adjusted points awarded for this attempt
    #[serde(default)]
    pub points: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl Default for AttemptEntry {
    fn default() -> Self {
        Self {
            started_at: DateTime::from_millis(0),
            completed_at: None,
            success: false,
            points: 0,
            feedback: None,
        }
    }
}

/// Per-question grading outcome
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct QuizAnswerResult {
    pub question_index: i32,
    pub selected: i32,
    pub correct: bool,
}

/// Graded quiz state
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct QuizProgress {
    pub results: Vec<QuizAnswerResult>,
    /// Percentage of questions answered correctly, 0-100
    pub percentage: f64,
    /// Sum of per-question points for correct answers
    pub earned_points: i64,
}

/// Submitted proof awaiting or carrying a verification verdict
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SubmissionState {
    pub content: String,
    pub proof_kind: ProofKind,
    pub submitted_at: DateTime,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<ObjectId>,
}

impl Default for SubmissionState {
    fn default() -> Self {
        Self {
            content: String::new(),
            proof_kind: ProofKind::default(),
            submitted_at: DateTime::from_millis(0),
            verified_at: None,
            verified_by: None,
        }
    }
}

/// Mode-specific working state
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProgressState {
    /// Step counter for milestone tasks; equals `total` once completed
    #[serde(default)]
    pub current: i32,

    #[serde(default)]
    pub total: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz: Option<QuizProgress>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionState>,
}

/// A reward copied from the task definition at grant time
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RewardInstance {
    pub kind: RewardKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nft_metadata: Option<NftMetadata>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_id: Option<ObjectId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,

    /// Absent until claimed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime>,

    /// Absent until a chain-settled reward is claimed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
}

impl RewardInstance {
    /// Copy a configured reward into an unclaimed instance
    pub fn from_spec(spec: &RewardSpec) -> Self {
        Self {
            kind: spec.kind,
            amount: spec.amount,
            token_address: spec.token_address.clone(),
            nft_metadata: spec.nft_metadata.clone(),
            badge_id: spec.badge_id,
            role_id: spec.role_id.clone(),
            claimed_at: None,
            transaction_hash: None,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed_at.is_some()
    }
}

/// Progress record document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProgressRecordDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    pub user_id: ObjectId,

    pub task_id: ObjectId,

    #[serde(default)]
    pub status: ProgressStatus,

    /// Base points credited to this record; 0 until a successful verify
    #[serde(default)]
    pub points: i64,

    #[serde(default)]
    pub progress: ProgressState,

    /// Append-only attempt history
    #[serde(default)]
    pub attempts: Vec<AttemptEntry>,

    #[serde(default)]
    pub rewards: Vec<RewardInstance>,

    /// Consecutive successful completions on this record; reset on failure
    #[serde(default)]
    pub streak_count: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime>,

    /// Optimistic-concurrency token; every mutation filters on the loaded
    /// value and increments it
    #[serde(default)]
    pub version: i64,
}

impl ProgressRecordDoc {
    /// Create a fresh record for a (user, task) pair
    pub fn new(user_id: ObjectId, task_id: ObjectId) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id,
            task_id,
            status: ProgressStatus::NotStarted,
            points: 0,
            progress: ProgressState::default(),
            attempts: Vec::new(),
            rewards: Vec::new(),
            streak_count: 0,
            last_activity_at: Some(DateTime::now()),
            version: 0,
        }
    }

    /// Update the activity timestamp
    pub fn touch(&mut self, now: DateTime) {
        self.last_activity_at = Some(now);
    }

    /// The attempt opened by start and not yet resolved by a verdict
    pub fn open_attempt_mut(&mut self) -> Option<&mut AttemptEntry> {
        self.attempts
            .iter_mut()
            .rev()
            .find(|a| a.completed_at.is_none())
    }

    /// Indices of rewards that have not been claimed yet, in grant order
    pub fn unclaimed_indices(&self) -> Vec<usize> {
        self.rewards
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_claimed())
            .map(|(i, _)| i)
            .collect()
    }
}

impl IntoIndexes for ProgressRecordDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One record per (user, task) pair
            (
                doc! { "user_id": 1, "task_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_task_unique".to_string())
                        .build(),
                ),
            ),
            // Per-user status listings (active tasks, completed tasks)
            (
                doc! { "user_id": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ProgressRecordDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
