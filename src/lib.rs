//! Questline - task progress and rewards engine
//!
//! Questline is the gamified-task core of a community backend. It owns the
//! per-(user, task) progress state machine, streak-based point multipliers,
//! badge eligibility evaluation, and reward settlement over MongoDB.
//!
//! ## Components
//!
//! - **Catalog**: task and badge definition lookups (gating rules, rewards,
//!   time constraints)
//! - **Progress**: the attempt state machine (start → submit → verify →
//!   complete/reject) with optimistic concurrency
//! - **Verification**: automatic platform checkers, manual review, quiz grading
//! - **Settlement**: multiplied point awards, reward granting and claiming
//! - **Badges**: fixed-point eligibility evaluation with unlock bonuses
//!
//! The crate exposes no transport of its own; the embedding application wires
//! `engine::ProgressService` to whatever surface it serves (REST, RPC, direct
//! calls) and installs its own tracing subscriber.

pub mod collaborators;
pub mod config;
pub mod db;
pub mod engine;
pub mod types;

pub use config::EngineConfig;
pub use engine::ProgressService;
pub use types::{QuestlineError, Result};
