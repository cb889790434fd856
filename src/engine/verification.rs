//! Verification engine
//!
//! Decides pass/fail for the three verification modes:
//!
//! - **automatic**: proof is judged by the platform checker named in the
//!   task's verification config. Checker transport failures propagate as
//!   retryable errors and must not be recorded as failed attempts.
//! - **manual**: submission parks in `submitted`; a privileged caller
//!   delivers the verdict later through the verify operation.
//! - **quiz**: deterministic grading against the configured answer key,
//!   compared to the passing threshold.

use std::sync::Arc;
use tracing::debug;

use crate::collaborators::CheckerRegistry;
use crate::config::EngineConfig;
use crate::db::schemas::{QuizAnswerResult, QuizProgress, QuizQuestion, TaskDefinitionDoc, UserDoc};
use crate::types::{QuestlineError, Result};

/// Grade quiz answers against the question set.
///
/// Answer count must match the question count; an out-of-range selection is
/// simply wrong, not a validation error. Percentage is the fraction of
/// questions answered correctly; earned points sum the per-question points
/// of correct answers.
pub fn grade_quiz(questions: &[QuizQuestion], answers: &[i32]) -> Result<QuizProgress> {
    if questions.is_empty() {
        return Err(QuestlineError::Validation(
            "task has no quiz questions".to_string(),
        ));
    }
    if answers.len() != questions.len() {
        return Err(QuestlineError::Validation(format!(
            "expected {} answers, got {}",
            questions.len(),
            answers.len()
        )));
    }

    let mut results = Vec::with_capacity(questions.len());
    let mut correct_count = 0usize;
    let mut earned_points = 0i64;

    for (i, (question, &selected)) in questions.iter().zip(answers).enumerate() {
        let correct = selected == question.correct_answer_index;
        if correct {
            correct_count += 1;
            earned_points += question.points;
        }
        results.push(QuizAnswerResult {
            question_index: i as i32,
            selected,
            correct,
        });
    }

    let percentage = correct_count as f64 / questions.len() as f64 * 100.0;

    Ok(QuizProgress {
        results,
        percentage,
        earned_points,
    })
}

/// Verification service: checker registry plus threshold configuration
pub struct VerificationEngine {
    checkers: Arc<CheckerRegistry>,
    config: EngineConfig,
}

impl VerificationEngine {
    pub fn new(checkers: Arc<CheckerRegistry>, config: EngineConfig) -> Self {
        Self { checkers, config }
    }

    /// Passing percentage for a quiz task: per-task override, else the
    /// engine default.
    pub fn passing_percent(&self, task: &TaskDefinitionDoc) -> f64 {
        task.verification
            .passing_percent
            .unwrap_or(self.config.quiz_passing_percent)
    }

    /// Whether a graded quiz passes the task's threshold
    pub fn quiz_passes(&self, task: &TaskDefinitionDoc, graded: &QuizProgress) -> bool {
        graded.percentage >= self.passing_percent(task)
    }

    /// Run the automatic-mode checker for a task's platform against the
    /// submitted proof. An ordinary negative result is `Ok(false)`; a
    /// missing or unreachable checker is an external-dependency failure the
    /// caller surfaces without consuming the attempt.
    pub async fn check_automatic(
        &self,
        task: &TaskDefinitionDoc,
        user: &UserDoc,
        proof: &str,
    ) -> Result<bool> {
        let platform = task.verification.platform.as_deref().ok_or_else(|| {
            QuestlineError::Config(format!(
                "automatic task '{}' has no checker platform configured",
                task.title
            ))
        })?;

        let checker = self.checkers.get(platform).ok_or_else(|| {
            QuestlineError::ExternalDependency(format!(
                "no checker registered for platform '{}'",
                platform
            ))
        })?;

        let passed = checker.verify(user, proof).await?;
        debug!(platform = %platform, passed, "automatic verification");
        Ok(passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticChecker;
    use crate::db::schemas::{VerificationMode, VerificationSpec};

    fn questions(correct: &[i32]) -> Vec<QuizQuestion> {
        correct
            .iter()
            .enumerate()
            .map(|(i, &answer)| QuizQuestion {
                question: format!("q{}", i),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer_index: answer,
                points: 10,
            })
            .collect()
    }

    fn automatic_task(platform: &str) -> TaskDefinitionDoc {
        TaskDefinitionDoc {
            title: "Follow us".into(),
            points: 50,
            verification: VerificationSpec {
                mode: VerificationMode::Automatic,
                platform: Some(platform.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_grade_three_of_four_is_75_percent() {
        let graded = grade_quiz(&questions(&[0, 1, 2, 3]), &[0, 1, 2, 9]).unwrap();
        assert_eq!(graded.percentage, 75.0);
        assert_eq!(graded.earned_points, 30);
        assert!(!graded.results[3].correct);
    }

    #[test]
    fn test_default_threshold_passes_75_percent() {
        let engine = VerificationEngine::new(
            Arc::new(CheckerRegistry::new()),
            EngineConfig::default(),
        );
        let mut task = automatic_task("discord");
        task.verification.mode = VerificationMode::Quiz;
        task.verification.questions = questions(&[0, 1, 2, 3]);

        let graded = grade_quiz(&task.verification.questions, &[0, 1, 2, 9]).unwrap();
        assert!(engine.quiz_passes(&task, &graded));
    }

    #[test]
    fn test_per_task_threshold_override() {
        let engine = VerificationEngine::new(
            Arc::new(CheckerRegistry::new()),
            EngineConfig::default(),
        );
        let mut task = automatic_task("discord");
        task.verification.mode = VerificationMode::Quiz;
        task.verification.questions = questions(&[0, 1, 2, 3]);
        task.verification.passing_percent = Some(80.0);

        let graded = grade_quiz(&task.verification.questions, &[0, 1, 2, 9]).unwrap();
        assert!(!engine.quiz_passes(&task, &graded));
    }

    #[test]
    fn test_answer_count_mismatch_is_validation_error() {
        let err = grade_quiz(&questions(&[0, 1]), &[0]).unwrap_err();
        assert!(matches!(err, QuestlineError::Validation(_)));
    }

    #[test]
    fn test_out_of_range_answer_is_just_wrong() {
        let graded = grade_quiz(&questions(&[0]), &[17]).unwrap();
        assert_eq!(graded.percentage, 0.0);
    }

    #[tokio::test]
    async fn test_automatic_dispatches_to_registered_checker() {
        let registry = Arc::new(CheckerRegistry::new());
        registry.register("discord", Arc::new(StaticChecker::passing()));
        let engine = VerificationEngine::new(registry, EngineConfig::default());

        let passed = engine
            .check_automatic(&automatic_task("discord"), &UserDoc::default(), "joined")
            .await
            .unwrap();
        assert!(passed);
    }

    #[tokio::test]
    async fn test_unregistered_platform_is_external_dependency() {
        let engine = VerificationEngine::new(
            Arc::new(CheckerRegistry::new()),
            EngineConfig::default(),
        );

        let err = engine
            .check_automatic(&automatic_task("twitter"), &UserDoc::default(), "followed")
            .await
            .unwrap_err();
        assert!(matches!(err, QuestlineError::ExternalDependency(_)));
    }
}
