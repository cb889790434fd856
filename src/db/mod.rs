//! Persistence layer for Questline
//!
//! MongoDB client wrapper, document schemas, and the typed stores the engine
//! mutates: progress records and user aggregates.

pub mod mongo;
pub mod progress_repo;
pub mod schemas;
pub mod user_store;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
pub use progress_repo::ProgressRepository;
pub use user_store::UserStore;
