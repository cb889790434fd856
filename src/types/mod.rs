//! Shared types for Questline

mod error;

pub use error::{QuestlineError, Result};
