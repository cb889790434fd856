//! User aggregate store
//!
//! The engine's window onto the user entity: reads, atomic point and
//! completion-count increments, high-water level writes, and duplicate-safe
//! badge grants. The user document is shared with unrelated flows, so every
//! mutation here is a single atomic update operator.

use bson::{doc, oid::ObjectId, DateTime};
use tracing::debug;

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{EarnedBadge, UserDoc, USER_COLLECTION};
use crate::types::{QuestlineError, Result};

/// Store for the user aggregate fields the engine touches
#[derive(Clone)]
pub struct UserStore {
    collection: MongoCollection<UserDoc>,
}

impl UserStore {
    /// Open the collection and apply its indexes
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection(USER_COLLECTION).await?;
        Ok(Self { collection })
    }

    /// Load a user, or NotFound
    pub async fn get(&self, user_id: ObjectId) -> Result<UserDoc> {
        self.collection
            .find_one(doc! { "_id": user_id })
            .await?
            .ok_or_else(|| QuestlineError::NotFound(format!("user {} not found", user_id)))
    }

    /// Atomically add points to the lifetime total
    pub async fn credit_points(&self, user_id: ObjectId, amount: i64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }

        self.collection
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$inc": { "points": amount },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await?;

        debug!(user = %user_id, amount, "credited points");
        Ok(())
    }

    /// Atomically bump the completed-task counter
    pub async fn increment_tasks_completed(&self, user_id: ObjectId) -> Result<()> {
        self.collection
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$inc": { "tasks_completed": 1 },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await?;

        Ok(())
    }

    /// Write a recomputed level with $max so levels never decrease,
    /// regardless of what any concurrent writer computed.
    pub async fn raise_level(&self, user_id: ObjectId, level: i32) -> Result<()> {
        self.collection
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$max": { "level": level },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await?;

        Ok(())
    }

    /// Grant a badge if the user does not already hold it, crediting the
    /// unlock bonus in the same atomic update. Returns whether the grant
    /// happened; a duplicate grant is a no-op, not an error.
    pub async fn grant_badge(
        &self,
        user_id: ObjectId,
        badge_id: ObjectId,
        date_earned: DateTime,
        bonus_points: i64,
    ) -> Result<bool> {
        let earned = bson::to_bson(&EarnedBadge {
            badge_id,
            date_earned,
        })?;

        let result = self
            .collection
            .update_one(
                doc! { "_id": user_id, "badges.badge_id": { "$ne": badge_id } },
                doc! {
                    "$push": { "badges": earned },
                    "$inc": { "points": bonus_points },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await?;

        Ok(result.modified_count == 1)
    }
}
