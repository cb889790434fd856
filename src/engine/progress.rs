//! Progress service
//!
//! The operation facade callers wire to their transport: start a task,
//! submit proof or quiz answers, deliver a manual verdict, claim rewards.
//! Each operation loads current state, runs the pure state machine, persists
//! the next value with a compare-and-swap, and hands successful verdicts to
//! settlement.

use bson::{oid::ObjectId, DateTime};
use std::sync::Arc;
use tracing::{debug, info};

use crate::collaborators::{ActivityDispatcher, ChainSettlement, CheckerRegistry, RoleGrant};
use crate::config::EngineConfig;
use crate::db::progress_repo::InsertOutcome;
use crate::db::schemas::{
    ProgressRecordDoc, ProgressStatus, ProofKind, TaskDefinitionDoc, VerificationMode,
};
use crate::db::{MongoClient, ProgressRepository, UserStore};
use crate::engine::badges::{BadgeEvaluator, BadgeEvaluatorConfig};
use crate::engine::catalog::{BadgeCatalog, TaskCatalog};
use crate::engine::machine::{self, Verdict};
use crate::engine::settlement::{ClaimOutcome, SettlementService};
use crate::engine::verification::{grade_quiz, VerificationEngine};
use crate::types::{QuestlineError, Result};

/// Proof payload for manual and automatic tasks
#[derive(Debug, Clone)]
pub struct ProofSubmission {
    pub content: String,
    pub proof_kind: ProofKind,
}

/// Result of a quiz submission
#[derive(Debug, Clone)]
pub struct QuizSubmissionOutcome {
    pub record: ProgressRecordDoc,
    /// Percentage of questions answered correctly, 0-100
    pub percentage: f64,
    pub passed: bool,
    /// Sum of per-question points for correct answers
    pub earned_points: i64,
}

/// Task progress operations
pub struct ProgressService {
    catalog: TaskCatalog,
    records: ProgressRepository,
    users: UserStore,
    verification: VerificationEngine,
    settlement: SettlementService,
    config: EngineConfig,
}

impl ProgressService {
    pub fn new(
        catalog: TaskCatalog,
        records: ProgressRepository,
        users: UserStore,
        verification: VerificationEngine,
        settlement: SettlementService,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            records,
            users,
            verification,
            settlement,
            config,
        }
    }

    /// Open all collections on a client and assemble the full engine with
    /// the given collaborators.
    pub async fn connect(
        client: &MongoClient,
        checkers: Arc<CheckerRegistry>,
        chain: Arc<dyn ChainSettlement>,
        roles: Arc<dyn RoleGrant>,
        dispatcher: Arc<dyn ActivityDispatcher>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate().map_err(QuestlineError::Config)?;

        let catalog = TaskCatalog::new(client).await?;
        let badges = BadgeCatalog::new(client).await?;
        let records = ProgressRepository::new(client).await?;
        let users = UserStore::new(client).await?;

        let evaluator = Arc::new(BadgeEvaluator::new(
            badges,
            users.clone(),
            dispatcher.clone(),
            BadgeEvaluatorConfig::from(&config),
        ));
        let verification = VerificationEngine::new(checkers, config.clone());
        let settlement = SettlementService::new(
            users.clone(),
            records.clone(),
            evaluator,
            chain,
            roles,
            dispatcher,
            config.clone(),
        );

        Ok(Self::new(
            catalog,
            records,
            users,
            verification,
            settlement,
            config,
        ))
    }

    /// Start (or re-enter) a task attempt. Gate failures never create or
    /// mutate a record. A concurrent first start loses the unique-index race
    /// and falls back to re-entering the winner's record.
    pub async fn start_task(
        &self,
        user_id: ObjectId,
        task_id: ObjectId,
    ) -> Result<ProgressRecordDoc> {
        let task = self.catalog.get_active(task_id).await?;
        let user = self.users.get(user_id).await?;
        let completed = self
            .records
            .count_completed(user_id, &task.requirements.prerequisite_tasks)
            .await?;
        let existing = self.records.find(user_id, task_id).await?;
        let now = DateTime::now();

        let outcome = machine::start(existing, &task, &user, completed, now)?;

        let record = if outcome.created {
            match self.records.insert_new(outcome.record.clone()).await? {
                InsertOutcome::Created(id) => {
                    let mut record = outcome.record;
                    record._id = Some(id);
                    record
                }
                InsertOutcome::AlreadyExists => {
                    debug!(user = %user_id, task = %task_id, "start raced, re-entering");
                    let existing = self.records.get(user_id, task_id).await?;
                    let outcome = machine::start(Some(existing), &task, &user, completed, now)?;
                    self.records.cas_replace(&outcome.record).await?
                }
            }
        } else {
            self.records.cas_replace(&outcome.record).await?
        };

        info!(user = %user_id, task = %task.title, "task started");
        Ok(record)
    }

    /// Submit proof. Manual-mode tasks park in `submitted` for review;
    /// automatic-mode tasks verify synchronously against the named platform
    /// checker. A checker outage propagates as retryable and leaves the
    /// record untouched; no attempt is consumed.
    pub async fn submit_proof(
        &self,
        user_id: ObjectId,
        task_id: ObjectId,
        submission: ProofSubmission,
    ) -> Result<ProgressRecordDoc> {
        let task = self.catalog.get_active(task_id).await?;
        let record = self.records.get(user_id, task_id).await?;
        let now = DateTime::now();

        match task.verification.mode {
            VerificationMode::Automatic => {
                let proof = submission.content.clone();
                // Validate the transition before touching the checker, and
                // run the checker before persisting anything: an outage must
                // leave the record in its prior state.
                let attached = machine::attach_submission(
                    record,
                    submission.content,
                    submission.proof_kind,
                    now,
                )?;
                let user = self.users.get(user_id).await?;
                let passed = self.verification.check_automatic(&task, &user, &proof).await?;

                let verdict = if passed {
                    Verdict::passed(None)
                } else {
                    Verdict::failed(Some("automatic verification failed".to_string()))
                };
                self.finish_verification(attached, &task, verdict).await
            }
            VerificationMode::Manual => {
                let next = machine::record_submission(
                    record,
                    submission.content,
                    submission.proof_kind,
                    now,
                )?;
                let persisted = self.records.cas_replace(&next).await?;
                info!(user = %user_id, task = %task.title, "proof submitted for review");
                Ok(persisted)
            }
            VerificationMode::Quiz => Err(QuestlineError::Validation(
                "quiz tasks are submitted with submit_quiz".to_string(),
            )),
        }
    }

    /// Grade quiz answers and drive the verify transition with the result
    pub async fn submit_quiz(
        &self,
        user_id: ObjectId,
        task_id: ObjectId,
        answers: &[i32],
    ) -> Result<QuizSubmissionOutcome> {
        let task = self.catalog.get_active(task_id).await?;
        if task.verification.mode != VerificationMode::Quiz {
            return Err(QuestlineError::Validation(
                "task is not a quiz".to_string(),
            ));
        }

        let mut record = self.records.get(user_id, task_id).await?;
        if record.status != ProgressStatus::InProgress {
            return Err(QuestlineError::InvalidState(format!(
                "cannot submit answers from status {:?}",
                record.status
            )));
        }

        let graded = grade_quiz(&task.verification.questions, answers)?;
        let percentage = graded.percentage;
        let earned_points = graded.earned_points;
        let passed = self.verification.quiz_passes(&task, &graded);
        record.progress.quiz = Some(graded);

        let feedback = format!("scored {:.0}%", percentage);
        let verdict = if passed {
            Verdict::passed(Some(feedback))
        } else {
            Verdict::failed(Some(feedback))
        };

        let record = self.finish_verification(record, &task, verdict).await?;
        Ok(QuizSubmissionOutcome {
            record,
            percentage,
            passed,
            earned_points,
        })
    }

    /// Deliver a manual verdict on a submitted record. Only manual-mode
    /// tasks accept this, and only from `submitted`.
    pub async fn verify_submission(
        &self,
        verifier_id: ObjectId,
        user_id: ObjectId,
        task_id: ObjectId,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<ProgressRecordDoc> {
        let task = self.catalog.get_active(task_id).await?;
        if task.verification.mode != VerificationMode::Manual {
            return Err(QuestlineError::Validation(
                "task is not manually verified".to_string(),
            ));
        }

        let record = self.records.get(user_id, task_id).await?;
        if record.status != ProgressStatus::Submitted {
            return Err(QuestlineError::InvalidState(
                "record is not awaiting review".to_string(),
            ));
        }

        let verdict = Verdict {
            success: approved,
            feedback,
            verified_by: Some(verifier_id),
        };
        self.finish_verification(record, &task, verdict).await
    }

    /// Update milestone step counters. Informational; completion is still
    /// decided by verification.
    pub async fn update_step_progress(
        &self,
        user_id: ObjectId,
        task_id: ObjectId,
        current: i32,
    ) -> Result<ProgressRecordDoc> {
        let record = self.records.get(user_id, task_id).await?;
        let next = machine::set_step_progress(record, current, DateTime::now())?;
        self.records.cas_replace(&next).await
    }

    /// Claim every unclaimed reward on a completed record
    pub async fn claim_rewards(
        &self,
        user_id: ObjectId,
        task_id: ObjectId,
    ) -> Result<ClaimOutcome> {
        self.settlement.claim(user_id, task_id).await
    }

    /// Load the progress record for a (user, task) pair
    pub async fn get_progress(
        &self,
        user_id: ObjectId,
        task_id: ObjectId,
    ) -> Result<ProgressRecordDoc> {
        self.records.get(user_id, task_id).await
    }

    /// Apply a verdict, persist, and settle on success. Settlement runs to
    /// completion before returning so the response reflects credited points
    /// and badges.
    async fn finish_verification(
        &self,
        record: ProgressRecordDoc,
        task: &TaskDefinitionDoc,
        verdict: Verdict,
    ) -> Result<ProgressRecordDoc> {
        let now = DateTime::now();
        let (next, plan) = machine::apply_verdict(record, task, verdict, &self.config, now)?;
        let persisted = self.records.cas_replace(&next).await?;

        match plan {
            Some(plan) => {
                self.settlement.settle_success(&persisted, task, &plan).await?;
            }
            None => {
                info!(
                    user = %persisted.user_id,
                    task = %task.title,
                    "task attempt rejected"
                );
            }
        }

        Ok(persisted)
    }
}

#[cfg(test)]
mod tests {
    // Service orchestration requires a running MongoDB instance. The
    // transition rules, grading, gating, and settlement dispatch it composes
    // are covered in engine::machine, engine::verification, and
    // engine::settlement.
}
