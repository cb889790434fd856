//! Task definition schema
//!
//! A task definition is the reward catalog entry the engine reads: what the
//! task is, how completion is verified, what it pays out, and who may start
//! it. Definitions are edited by privileged actors and treated as read-only
//! input by the progress engine.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for task definitions
pub const TASK_COLLECTION: &str = "task_definitions";

/// Task flavor; drives which progress path a record takes
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Simple,
    Quiz,
    Submission,
    Feedback,
    Milestone,
}

/// How pass/fail is decided for a task
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// Dispatched to a named external-platform checker
    #[default]
    Automatic,
    /// A privileged human caller decides via the verify operation
    Manual,
    /// Deterministic grading against the configured question set
    Quiz,
}

/// Difficulty tier, informational for catalog display and sorting
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskDifficulty {
    #[default]
    Easy,
    Medium,
    Hard,
    Expert,
}

/// Kind of proof a manual/submission task expects
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    #[default]
    Text,
    Link,
    Image,
    Video,
}

/// One quiz question with its answer key
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer_index: i32,
    /// Quiz points earned for answering this question correctly
    #[serde(default)]
    pub points: i64,
}

/// Mode-specific verification configuration
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct VerificationSpec {
    pub mode: VerificationMode,

    /// Automatic mode: checker platform name (discord, twitter, github, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Quiz mode: ordered question list; must be non-empty for quiz tasks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<QuizQuestion>,

    /// Quiz mode: per-task passing percentage override (0-100)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passing_percent: Option<f64>,

    /// Manual mode: kind of proof the verifier expects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_kind: Option<ProofKind>,

    /// Manual mode: instructions shown to the submitter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Reward kinds a task may grant
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    #[default]
    Points,
    Nft,
    Token,
    Badge,
    Role,
}

/// NFT metadata carried by nft-kind rewards
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NftMetadata {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// One configured reward on a task definition
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RewardSpec {
    pub kind: RewardKind,

    /// Points or token amount, depending on kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,

    /// Token rewards: contract address of the token to transfer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,

    /// NFT rewards: metadata minted with the token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nft_metadata: Option<NftMetadata>,

    /// Badge rewards: badge definition granted on claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_id: Option<ObjectId>,

    /// Role rewards: external role identifier granted on claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
}

/// Gates a user must pass before starting a task
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TaskRequirements {
    /// Minimum user level
    #[serde(default)]
    pub min_level: i32,

    /// Role tags the user must hold, all of them
    #[serde(default)]
    pub required_roles: Vec<String>,

    /// Tasks that must all have a completed progress record for this user
    #[serde(default)]
    pub prerequisite_tasks: Vec<ObjectId>,
}

/// Re-attempt cadence after completion. `None` means a user may complete the
/// task at most once ever; any other value permits re-attempt.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepeatInterval {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

/// Optional availability window and repeat cadence
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TimeConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime>,

    #[serde(default)]
    pub repeat_interval: RepeatInterval,
}

/// Task definition document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TaskDefinitionDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    pub title: String,

    #[serde(default)]
    pub description: String,

    pub task_type: TaskType,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub difficulty: TaskDifficulty,

    /// Base reward magnitude, before streak multipliers
    pub points: i64,

    pub verification: VerificationSpec,

    #[serde(default)]
    pub rewards: Vec<RewardSpec>,

    #[serde(default)]
    pub requirements: TaskRequirements,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_constraints: Option<TimeConstraints>,

    /// Milestone tasks: number of steps tracked in progress state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<i32>,

    /// Gates visibility and availability
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl TaskDefinitionDoc {
    /// Validate the definition invariants: non-negative points, quiz tasks
    /// carry a non-empty question set, automatic tasks name a platform.
    pub fn validate(&self) -> Result<(), String> {
        if self.points < 0 {
            return Err("points must not be negative".to_string());
        }
        if self.task_type == TaskType::Quiz || self.verification.mode == VerificationMode::Quiz {
            if self.verification.questions.is_empty() {
                return Err("quiz tasks require at least one question".to_string());
            }
            for (i, q) in self.verification.questions.iter().enumerate() {
                if q.options.is_empty() {
                    return Err(format!("question {} has no options", i));
                }
                if q.correct_answer_index < 0 || q.correct_answer_index as usize >= q.options.len()
                {
                    return Err(format!("question {} answer index out of range", i));
                }
            }
        }
        if self.verification.mode == VerificationMode::Automatic
            && self.verification.platform.is_none()
        {
            return Err("automatic tasks require a checker platform".to_string());
        }
        Ok(())
    }

    /// The record ID, present once persisted
    pub fn id(&self) -> Option<ObjectId> {
        self._id
    }

    /// Repeat interval, `None` variant when no time constraints are set
    pub fn repeat_interval(&self) -> RepeatInterval {
        self.time_constraints
            .as_ref()
            .map(|tc| tc.repeat_interval)
            .unwrap_or(RepeatInterval::None)
    }
}

impl IntoIndexes for TaskDefinitionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "is_active": 1 },
                Some(
                    IndexOptions::builder()
                        .name("is_active_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "category": 1 },
                Some(
                    IndexOptions::builder()
                        .name("category_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for TaskDefinitionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz_task(questions: Vec<QuizQuestion>) -> TaskDefinitionDoc {
        TaskDefinitionDoc {
            title: "Protocol basics".into(),
            task_type: TaskType::Quiz,
            points: 100,
            verification: VerificationSpec {
                mode: VerificationMode::Quiz,
                questions,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_quiz_requires_questions() {
        let task = quiz_task(vec![]);
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_quiz_answer_index_must_be_in_range() {
        let task = quiz_task(vec![QuizQuestion {
            question: "2+2?".into(),
            options: vec!["3".into(), "4".into()],
            correct_answer_index: 5,
            points: 10,
        }]);
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_negative_points_rejected() {
        let mut task = quiz_task(vec![QuizQuestion {
            question: "2+2?".into(),
            options: vec!["3".into(), "4".into()],
            correct_answer_index: 1,
            points: 10,
        }]);
        task.points = -5;
        assert!(task.validate().is_err());
        task.points = 0;
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_automatic_requires_platform() {
        let task = TaskDefinitionDoc {
            title: "Join the server".into(),
            points: 50,
            verification: VerificationSpec {
                mode: VerificationMode::Automatic,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_repeat_interval_defaults_to_none() {
        let task = TaskDefinitionDoc::default();
        assert_eq!(task.repeat_interval(), RepeatInterval::None);
    }
}
