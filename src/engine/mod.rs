//! Engine layer for Questline
//!
//! The state machine and the services that drive it. The machine itself is
//! pure (values in, next value plus settlement plan out); all I/O, from store
//! persistence to user aggregate updates to collaborator calls, happens in
//! the services that wrap it.
//!
//! ## Services
//!
//! - **TaskCatalog** / **BadgeCatalog**: definition lookups and gating data
//! - **VerificationEngine**: checker dispatch, quiz grading, thresholds
//! - **SettlementService**: point awards, reward grants, claim dispatch
//! - **BadgeEvaluator**: fixed-point badge eligibility evaluation
//! - **ProgressService**: the operation facade (start / submit / verify /
//!   claim) callers wire to their transport

pub mod badges;
pub mod catalog;
pub mod machine;
pub mod progress;
pub mod settlement;
pub mod verification;

pub use badges::{BadgeEvaluator, BadgeEvaluatorConfig};
pub use catalog::{BadgeCatalog, TaskCatalog};
pub use machine::{SettlementPlan, StartOutcome, Verdict};
pub use progress::{ProgressService, ProofSubmission, QuizSubmissionOutcome};
pub use settlement::{ClaimOutcome, ClaimedReward, SettlementService};
pub use verification::{grade_quiz, VerificationEngine};
