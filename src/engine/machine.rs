//! Progress state machine
//!
//! Pure transition functions over progress record values. Each operation
//! takes the current record (if any), the task definition, and a view of the
//! user, and returns the next record value plus, on a successful verdict,
//! the settlement plan the service layer executes against the user aggregate
//! and collaborators. Nothing in this module performs I/O.
//!
//! Status graph:
//!
//! ```text
//! (absent) ──start──▶ in_progress ──submit──▶ submitted
//!                        │                        │
//!                        │ verdict                │ verdict
//!                        ▼                        ▼
//!                 completed / rejected ◀──────────┘
//!                        │
//!   rejected ──start──▶ in_progress        (always retryable)
//!   completed ──start──▶ in_progress       (repeat_interval ≠ none only)
//! ```

use bson::{oid::ObjectId, DateTime};

use crate::config::EngineConfig;
use crate::db::schemas::{
    AttemptEntry, ProgressRecordDoc, ProgressStatus, ProofKind, RewardInstance, SubmissionState,
    TaskDefinitionDoc, TaskRequirements, TaskType, TimeConstraints, UserDoc,
};
use crate::types::{QuestlineError, Result};

/// A verification verdict to apply to an open attempt
#[derive(Debug, Clone)]
pub struct Verdict {
    pub success: bool,
    pub feedback: Option<String>,
    /// Reviewer identity for manual verification
    pub verified_by: Option<ObjectId>,
}

impl Verdict {
    pub fn passed(feedback: Option<String>) -> Self {
        Self {
            success: true,
            feedback,
            verified_by: None,
        }
    }

    pub fn failed(feedback: Option<String>) -> Self {
        Self {
            success: false,
            feedback,
            verified_by: None,
        }
    }
}

/// What the settlement step owes the user after a successful verdict
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementPlan {
    /// Streak-multiplied points credited to the user's lifetime total
    pub final_points: i64,
    pub multiplier: f64,
    /// Number of reward instances granted onto the record
    pub rewards_granted: usize,
}

/// Result of a start transition
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub record: ProgressRecordDoc,
    /// Whether a new document must be inserted (vs. CAS-updated)
    pub created: bool,
}

// ============================================================================
// Gating predicates
// ============================================================================

pub fn level_gate(user_level: i32, requirements: &TaskRequirements) -> bool {
    user_level >= requirements.min_level
}

pub fn role_gate(user: &UserDoc, requirements: &TaskRequirements) -> bool {
    requirements.required_roles.iter().all(|r| user.has_role(r))
}

/// Exact count match: every prerequisite must have a completed record
pub fn prerequisites_met(completed_count: usize, requirements: &TaskRequirements) -> bool {
    completed_count == requirements.prerequisite_tasks.len()
}

pub fn window_open(constraints: Option<&TimeConstraints>, now: DateTime) -> bool {
    let Some(tc) = constraints else {
        return true;
    };
    if let Some(start) = tc.starts_at {
        if now < start {
            return false;
        }
    }
    if let Some(end) = tc.ends_at {
        if now > end {
            return false;
        }
    }
    true
}

/// Whether a completed record may be re-attempted. Rejection is always
/// retryable; completion is gated by the repeat interval.
pub fn reattempt_allowed(task: &TaskDefinitionDoc) -> bool {
    task.repeat_interval() != crate::db::schemas::RepeatInterval::None
}

fn check_gates(
    task: &TaskDefinitionDoc,
    user: &UserDoc,
    completed_prerequisites: usize,
    now: DateTime,
) -> Result<()> {
    if !window_open(task.time_constraints.as_ref(), now) {
        return Err(QuestlineError::Validation(
            "task is outside its availability window".to_string(),
        ));
    }
    if !level_gate(user.level, &task.requirements) {
        return Err(QuestlineError::Authorization(format!(
            "level {} required",
            task.requirements.min_level
        )));
    }
    if !role_gate(user, &task.requirements) {
        return Err(QuestlineError::Authorization(
            "missing a required role".to_string(),
        ));
    }
    if !prerequisites_met(completed_prerequisites, &task.requirements) {
        return Err(QuestlineError::Authorization(format!(
            "{} of {} prerequisite tasks completed",
            completed_prerequisites,
            task.requirements.prerequisite_tasks.len()
        )));
    }
    Ok(())
}

// ============================================================================
// Transitions
// ============================================================================

/// Start (or re-enter) a task attempt.
///
/// Preconditions: gates pass. Effects: create the record if absent, append an
/// attempt entry, status in_progress. Starting while already in_progress or
/// submitted is an idempotent re-entry that touches the activity timestamp
/// without appending a duplicate attempt.
pub fn start(
    existing: Option<ProgressRecordDoc>,
    task: &TaskDefinitionDoc,
    user: &UserDoc,
    completed_prerequisites: usize,
    now: DateTime,
) -> Result<StartOutcome> {
    check_gates(task, user, completed_prerequisites, now)?;

    let user_id = user
        .id()
        .ok_or_else(|| QuestlineError::Internal("user has no id".to_string()))?;
    let task_id = task
        .id()
        .ok_or_else(|| QuestlineError::Internal("task has no id".to_string()))?;

    match existing {
        None => {
            let mut record = ProgressRecordDoc::new(user_id, task_id);
            begin_attempt(&mut record, task, now);
            Ok(StartOutcome {
                record,
                created: true,
            })
        }
        Some(mut record) => match record.status {
            ProgressStatus::InProgress | ProgressStatus::Submitted => {
                record.touch(now);
                Ok(StartOutcome {
                    record,
                    created: false,
                })
            }
            ProgressStatus::NotStarted | ProgressStatus::Rejected => {
                begin_attempt(&mut record, task, now);
                Ok(StartOutcome {
                    record,
                    created: false,
                })
            }
            ProgressStatus::Completed | ProgressStatus::Verified => {
                if !reattempt_allowed(task) {
                    return Err(QuestlineError::InvalidState(
                        "task already completed and is not repeatable".to_string(),
                    ));
                }
                begin_attempt(&mut record, task, now);
                Ok(StartOutcome {
                    record,
                    created: false,
                })
            }
        },
    }
}

/// Open a fresh attempt: reset working state, append the attempt entry
fn begin_attempt(record: &mut ProgressRecordDoc, task: &TaskDefinitionDoc, now: DateTime) {
    record.status = ProgressStatus::InProgress;
    record.progress.current = 0;
    record.progress.total = seed_total(task);
    record.progress.quiz = None;
    record.progress.submission = None;
    record.attempts.push(AttemptEntry {
        started_at: now,
        completed_at: None,
        success: false,
        points: 0,
        feedback: None,
    });
    record.touch(now);
}

fn seed_total(task: &TaskDefinitionDoc) -> i32 {
    match task.task_type {
        TaskType::Quiz => task.verification.questions.len() as i32,
        TaskType::Milestone => task.total_steps.unwrap_or(1),
        _ => 1,
    }
}

/// Attach proof to the record without leaving in_progress. Used by the
/// automatic path, where verification runs synchronously after submission.
pub fn attach_submission(
    mut record: ProgressRecordDoc,
    content: String,
    proof_kind: ProofKind,
    now: DateTime,
) -> Result<ProgressRecordDoc> {
    if record.status != ProgressStatus::InProgress {
        return Err(QuestlineError::InvalidState(format!(
            "cannot submit proof from status {:?}",
            record.status
        )));
    }
    if content.trim().is_empty() {
        return Err(QuestlineError::Validation(
            "proof content is required".to_string(),
        ));
    }

    record.progress.submission = Some(SubmissionState {
        content,
        proof_kind,
        submitted_at: now,
        verified_at: None,
        verified_by: None,
    });
    record.touch(now);
    Ok(record)
}

/// Submit proof for later manual review: in_progress → submitted
pub fn record_submission(
    record: ProgressRecordDoc,
    content: String,
    proof_kind: ProofKind,
    now: DateTime,
) -> Result<ProgressRecordDoc> {
    let mut record = attach_submission(record, content, proof_kind, now)?;
    record.status = ProgressStatus::Submitted;
    Ok(record)
}

/// Update milestone step counters. Informational; completion is still
/// decided by verification.
pub fn set_step_progress(
    mut record: ProgressRecordDoc,
    current: i32,
    now: DateTime,
) -> Result<ProgressRecordDoc> {
    if record.status != ProgressStatus::InProgress {
        return Err(QuestlineError::InvalidState(format!(
            "cannot update steps from status {:?}",
            record.status
        )));
    }
    record.progress.current = current.clamp(0, record.progress.total);
    record.touch(now);
    Ok(record)
}

/// Apply a verification verdict to the open attempt.
///
/// Success: status completed, base points on the record, streak advanced,
/// rewards copied from the task, attempt finalized with the multiplied
/// amount, and a settlement plan returned for the service layer.
/// Failure: status rejected, points zeroed, streak reset, no plan.
pub fn apply_verdict(
    mut record: ProgressRecordDoc,
    task: &TaskDefinitionDoc,
    verdict: Verdict,
    config: &EngineConfig,
    now: DateTime,
) -> Result<(ProgressRecordDoc, Option<SettlementPlan>)> {
    match record.status {
        ProgressStatus::InProgress | ProgressStatus::Submitted => {}
        _ => {
            return Err(QuestlineError::InvalidState(format!(
                "no attempt awaiting verification (status {:?})",
                record.status
            )));
        }
    }

    if let Some(submission) = &mut record.progress.submission {
        submission.verified_at = Some(now);
        submission.verified_by = verdict.verified_by;
    }

    let prior_streak = record.streak_count;

    let plan = if verdict.success {
        let multiplier = streak_multiplier(prior_streak, config);
        let final_points = multiplied_points(task.points, multiplier);

        finalize_attempt(&mut record, true, final_points, verdict.feedback, now)?;

        record.status = ProgressStatus::Completed;
        record.points = task.points;
        record.streak_count = prior_streak + 1;
        record.progress.current = record.progress.total;

        let granted = task.rewards.iter().map(RewardInstance::from_spec);
        record.rewards.extend(granted);

        Some(SettlementPlan {
            final_points,
            multiplier,
            rewards_granted: task.rewards.len(),
        })
    } else {
        finalize_attempt(&mut record, false, 0, verdict.feedback, now)?;

        record.status = ProgressStatus::Rejected;
        record.points = 0;
        record.streak_count = 0;

        None
    };

    record.touch(now);
    Ok((record, plan))
}

fn finalize_attempt(
    record: &mut ProgressRecordDoc,
    success: bool,
    points: i64,
    feedback: Option<String>,
    now: DateTime,
) -> Result<()> {
    let attempt = record.open_attempt_mut().ok_or_else(|| {
        QuestlineError::InvalidState("record has no open attempt".to_string())
    })?;
    attempt.completed_at = Some(now);
    attempt.success = success;
    attempt.points = points;
    attempt.feedback = feedback;
    Ok(())
}

// ============================================================================
// Points math
// ============================================================================

/// Streak multiplier: 1 + min(prior_streak, cap) × step
pub fn streak_multiplier(prior_streak: i32, config: &EngineConfig) -> f64 {
    let effective = prior_streak.clamp(0, config.streak_cap);
    1.0 + effective as f64 * config.streak_multiplier_step
}

/// Round the multiplied base points to the nearest whole point
pub fn multiplied_points(base: i64, multiplier: f64) -> i64 {
    (base as f64 * multiplier).round() as i64
}

/// Level for a lifetime point total: floor(points / per_level) + 1.
/// Callers persist it with $max so levels never decrease.
pub fn level_for(lifetime_points: i64, points_per_level: i64) -> i32 {
    (lifetime_points / points_per_level) as i32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{
        QuizQuestion, RepeatInterval, RewardKind, RewardSpec, TaskType, VerificationMode,
        VerificationSpec,
    };

    fn millis(ms: i64) -> DateTime {
        DateTime::from_millis(ms)
    }

    fn simple_task(points: i64) -> TaskDefinitionDoc {
        TaskDefinitionDoc {
            _id: Some(ObjectId::new()),
            title: "Join the community".into(),
            task_type: TaskType::Simple,
            points,
            verification: VerificationSpec {
                mode: VerificationMode::Automatic,
                platform: Some("discord".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn member(level: i32) -> UserDoc {
        UserDoc {
            _id: Some(ObjectId::new()),
            username: "ada".into(),
            level,
            ..Default::default()
        }
    }

    fn started_record(task: &TaskDefinitionDoc, user: &UserDoc) -> ProgressRecordDoc {
        start(None, task, user, 0, millis(1_000)).unwrap().record
    }

    // ------------------------------------------------------------------
    // Gates
    // ------------------------------------------------------------------

    #[test]
    fn test_level_gate_blocks_and_never_mutates() {
        let mut task = simple_task(50);
        task.requirements.min_level = 5;
        let user = member(3);

        let err = start(None, &task, &user, 0, millis(1_000)).unwrap_err();
        assert!(matches!(err, QuestlineError::Authorization(_)));
    }

    #[test]
    fn test_prerequisites_require_exact_count() {
        let mut task = simple_task(50);
        task.requirements.prerequisite_tasks = vec![ObjectId::new(), ObjectId::new()];
        let user = member(1);

        let err = start(None, &task, &user, 1, millis(1_000)).unwrap_err();
        assert!(matches!(err, QuestlineError::Authorization(_)));

        assert!(start(None, &task, &user, 2, millis(1_000)).is_ok());
    }

    #[test]
    fn test_missing_role_blocks() {
        let mut task = simple_task(50);
        task.requirements.required_roles = vec!["contributor".into()];
        let user = member(1);

        let err = start(None, &task, &user, 0, millis(1_000)).unwrap_err();
        assert!(matches!(err, QuestlineError::Authorization(_)));

        let mut privileged = member(1);
        privileged.roles = vec!["contributor".into()];
        assert!(start(None, &task, &privileged, 0, millis(1_000)).is_ok());
    }

    #[test]
    fn test_window_gates_start() {
        let mut task = simple_task(50);
        task.time_constraints = Some(TimeConstraints {
            starts_at: Some(millis(2_000)),
            ends_at: Some(millis(3_000)),
            repeat_interval: RepeatInterval::None,
        });
        let user = member(1);

        assert!(matches!(
            start(None, &task, &user, 0, millis(1_000)).unwrap_err(),
            QuestlineError::Validation(_)
        ));
        assert!(start(None, &task, &user, 0, millis(2_500)).is_ok());
        assert!(matches!(
            start(None, &task, &user, 0, millis(3_500)).unwrap_err(),
            QuestlineError::Validation(_)
        ));
    }

    // ------------------------------------------------------------------
    // Start transitions
    // ------------------------------------------------------------------

    #[test]
    fn test_first_start_creates_record_with_open_attempt() {
        let task = simple_task(50);
        let user = member(1);

        let outcome = start(None, &task, &user, 0, millis(1_000)).unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.record.status, ProgressStatus::InProgress);
        assert_eq!(outcome.record.attempts.len(), 1);
        assert!(outcome.record.attempts[0].completed_at.is_none());
    }

    #[test]
    fn test_restart_while_in_progress_is_idempotent() {
        let task = simple_task(50);
        let user = member(1);
        let record = started_record(&task, &user);

        let outcome = start(Some(record), &task, &user, 0, millis(2_000)).unwrap();
        assert!(!outcome.created);
        assert_eq!(outcome.record.attempts.len(), 1);
        assert_eq!(outcome.record.status, ProgressStatus::InProgress);
    }

    #[test]
    fn test_rejected_record_is_always_retryable() {
        let task = simple_task(50);
        let user = member(1);
        let record = started_record(&task, &user);

        let (rejected, _) = apply_verdict(
            record,
            &task,
            Verdict::failed(Some("not on the server".into())),
            &EngineConfig::default(),
            millis(2_000),
        )
        .unwrap();
        assert_eq!(rejected.status, ProgressStatus::Rejected);

        let outcome = start(Some(rejected), &task, &user, 0, millis(3_000)).unwrap();
        assert_eq!(outcome.record.status, ProgressStatus::InProgress);
        assert_eq!(outcome.record.attempts.len(), 2);
    }

    #[test]
    fn test_completed_nonrepeatable_blocks_restart() {
        let task = simple_task(50);
        let user = member(1);
        let record = started_record(&task, &user);

        let (completed, _) = apply_verdict(
            record,
            &task,
            Verdict::passed(None),
            &EngineConfig::default(),
            millis(2_000),
        )
        .unwrap();

        let err = start(Some(completed), &task, &user, 0, millis(3_000)).unwrap_err();
        assert!(matches!(err, QuestlineError::InvalidState(_)));
    }

    #[test]
    fn test_completed_repeatable_reopens() {
        let mut task = simple_task(50);
        task.time_constraints = Some(TimeConstraints {
            starts_at: None,
            ends_at: None,
            repeat_interval: RepeatInterval::Daily,
        });
        let user = member(1);
        let record = started_record(&task, &user);

        let (completed, _) = apply_verdict(
            record,
            &task,
            Verdict::passed(None),
            &EngineConfig::default(),
            millis(2_000),
        )
        .unwrap();

        let outcome = start(Some(completed), &task, &user, 0, millis(3_000)).unwrap();
        assert_eq!(outcome.record.status, ProgressStatus::InProgress);
        assert_eq!(outcome.record.attempts.len(), 2);
        // streak survives the reopen; it only resets on failed verification
        assert_eq!(outcome.record.streak_count, 1);
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    #[test]
    fn test_submission_moves_to_submitted() {
        let task = simple_task(50);
        let user = member(1);
        let record = started_record(&task, &user);

        let submitted =
            record_submission(record, "https://proof".into(), ProofKind::Link, millis(2_000))
                .unwrap();
        assert_eq!(submitted.status, ProgressStatus::Submitted);
        let sub = submitted.progress.submission.as_ref().unwrap();
        assert_eq!(sub.proof_kind, ProofKind::Link);
        assert!(sub.verified_at.is_none());
    }

    #[test]
    fn test_empty_proof_rejected() {
        let task = simple_task(50);
        let user = member(1);
        let record = started_record(&task, &user);

        let err =
            record_submission(record, "   ".into(), ProofKind::Text, millis(2_000)).unwrap_err();
        assert!(matches!(err, QuestlineError::Validation(_)));
    }

    #[test]
    fn test_submission_requires_in_progress() {
        let task = simple_task(50);
        let user = member(1);
        let record = started_record(&task, &user);
        let submitted =
            record_submission(record, "proof".into(), ProofKind::Text, millis(2_000)).unwrap();

        let err = record_submission(submitted, "again".into(), ProofKind::Text, millis(3_000))
            .unwrap_err();
        assert!(matches!(err, QuestlineError::InvalidState(_)));
    }

    // ------------------------------------------------------------------
    // Verdicts, streaks, and points
    // ------------------------------------------------------------------

    #[test]
    fn test_success_completes_and_advances_streak() {
        let mut task = simple_task(100);
        task.rewards = vec![RewardSpec {
            kind: RewardKind::Points,
            amount: Some(100),
            ..Default::default()
        }];
        let user = member(1);
        let record = started_record(&task, &user);

        let (next, plan) = apply_verdict(
            record,
            &task,
            Verdict::passed(None),
            &EngineConfig::default(),
            millis(2_000),
        )
        .unwrap();

        let plan = plan.expect("settlement plan on success");
        assert_eq!(next.status, ProgressStatus::Completed);
        assert_eq!(next.points, 100);
        assert_eq!(next.streak_count, 1);
        assert_eq!(next.rewards.len(), 1);
        assert!(!next.rewards[0].is_claimed());
        assert_eq!(plan.multiplier, 1.0);
        assert_eq!(plan.final_points, 100);
        assert_eq!(plan.rewards_granted, 1);

        let attempt = next.attempts.last().unwrap();
        assert!(attempt.success);
        assert_eq!(attempt.points, 100);
        assert!(attempt.completed_at.is_some());
    }

    #[test]
    fn test_failure_rejects_and_resets_streak() {
        let task = simple_task(100);
        let user = member(1);
        let mut record = started_record(&task, &user);
        record.streak_count = 5;

        let (next, plan) = apply_verdict(
            record,
            &task,
            Verdict::failed(Some("proof did not check out".into())),
            &EngineConfig::default(),
            millis(2_000),
        )
        .unwrap();

        assert!(plan.is_none());
        assert_eq!(next.status, ProgressStatus::Rejected);
        assert_eq!(next.points, 0);
        assert_eq!(next.streak_count, 0);
        let attempt = next.attempts.last().unwrap();
        assert!(!attempt.success);
        assert_eq!(attempt.points, 0);
        assert_eq!(attempt.feedback.as_deref(), Some("proof did not check out"));
    }

    #[test]
    fn test_streak_multiplier_uses_prior_streak() {
        let task = simple_task(100);
        let user = member(1);
        let mut record = started_record(&task, &user);
        record.streak_count = 3;

        let (next, plan) = apply_verdict(
            record,
            &task,
            Verdict::passed(None),
            &EngineConfig::default(),
            millis(2_000),
        )
        .unwrap();

        let plan = plan.unwrap();
        assert_eq!(plan.multiplier, 1.3);
        assert_eq!(plan.final_points, 130);
        assert_eq!(next.streak_count, 4);
        // base points on the record, multiplied points on the attempt
        assert_eq!(next.points, 100);
        assert_eq!(next.attempts.last().unwrap().points, 130);
    }

    #[test]
    fn test_verdict_requires_open_state() {
        let task = simple_task(100);
        let user = member(1);
        let record = started_record(&task, &user);

        let (completed, _) = apply_verdict(
            record,
            &task,
            Verdict::passed(None),
            &EngineConfig::default(),
            millis(2_000),
        )
        .unwrap();

        let err = apply_verdict(
            completed,
            &task,
            Verdict::passed(None),
            &EngineConfig::default(),
            millis(3_000),
        )
        .unwrap_err();
        assert!(matches!(err, QuestlineError::InvalidState(_)));
    }

    #[test]
    fn test_manual_verdict_stamps_reviewer() {
        let task = simple_task(100);
        let user = member(1);
        let record = started_record(&task, &user);
        let submitted =
            record_submission(record, "proof".into(), ProofKind::Text, millis(2_000)).unwrap();

        let reviewer = ObjectId::new();
        let verdict = Verdict {
            success: true,
            feedback: Some("looks good".into()),
            verified_by: Some(reviewer),
        };
        let (next, _) = apply_verdict(
            submitted,
            &task,
            verdict,
            &EngineConfig::default(),
            millis(3_000),
        )
        .unwrap();

        let sub = next.progress.submission.as_ref().unwrap();
        assert_eq!(sub.verified_by, Some(reviewer));
        assert!(sub.verified_at.is_some());
    }

    // ------------------------------------------------------------------
    // Math
    // ------------------------------------------------------------------

    #[test]
    fn test_multiplier_bounds() {
        let config = EngineConfig::default();
        assert_eq!(streak_multiplier(0, &config), 1.0);
        assert_eq!(streak_multiplier(3, &config), 1.3);
        assert_eq!(streak_multiplier(7, &config), 1.7);
        // capped at 7
        assert_eq!(streak_multiplier(20, &config), 1.7);

        for streak in 0..30 {
            let m = streak_multiplier(streak, &config);
            assert!((1.0..=1.7).contains(&m));
        }
    }

    #[test]
    fn test_multiplied_points_round() {
        assert_eq!(multiplied_points(100, 1.3), 130);
        assert_eq!(multiplied_points(55, 1.1), 61); // 60.5 rounds up
        assert_eq!(multiplied_points(0, 1.7), 0);
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level_for(0, 1000), 1);
        assert_eq!(level_for(999, 1000), 1);
        assert_eq!(level_for(1000, 1000), 2);
        assert_eq!(level_for(2500, 1000), 3);
    }

    #[test]
    fn test_quiz_task_seeds_total_from_questions() {
        let mut task = simple_task(100);
        task.task_type = TaskType::Quiz;
        task.verification.mode = VerificationMode::Quiz;
        task.verification.questions = vec![
            QuizQuestion {
                question: "q1".into(),
                options: vec!["a".into(), "b".into()],
                correct_answer_index: 0,
                points: 10,
            },
            QuizQuestion {
                question: "q2".into(),
                options: vec!["a".into(), "b".into()],
                correct_answer_index: 1,
                points: 10,
            },
        ];
        let user = member(1);

        let outcome = start(None, &task, &user, 0, millis(1_000)).unwrap();
        assert_eq!(outcome.record.progress.total, 2);
    }
}
