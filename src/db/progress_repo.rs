//! Progress record store
//!
//! Typed operations over the `task_progress` collection. All mutations are
//! race-safe: first inserts resolve through the unique (user, task) index,
//! and every update is a compare-and-swap filtered on the record's version.

use bson::{doc, oid::ObjectId, DateTime};
use tracing::debug;

use crate::db::mongo::{is_duplicate_key, MongoClient, MongoCollection};
use crate::db::schemas::{ProgressRecordDoc, ProgressStatus, PROGRESS_COLLECTION};
use crate::types::{QuestlineError, Result};

/// Outcome of an insert attempt on the unique (user, task) constraint
#[derive(Debug)]
pub enum InsertOutcome {
    Created(ObjectId),
    /// Another request created the record first; caller should reload
    AlreadyExists,
}

/// Store for per-(user, task) progress records
#[derive(Clone)]
pub struct ProgressRepository {
    collection: MongoCollection<ProgressRecordDoc>,
}

impl ProgressRepository {
    /// Open the collection and apply its indexes
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection(PROGRESS_COLLECTION).await?;
        Ok(Self { collection })
    }

    /// Find the record for a (user, task) pair
    pub async fn find(
        &self,
        user_id: ObjectId,
        task_id: ObjectId,
    ) -> Result<Option<ProgressRecordDoc>> {
        self.collection
            .find_one(doc! { "user_id": user_id, "task_id": task_id })
            .await
    }

    /// Load the record for a (user, task) pair, or NotFound
    pub async fn get(&self, user_id: ObjectId, task_id: ObjectId) -> Result<ProgressRecordDoc> {
        self.find(user_id, task_id).await?.ok_or_else(|| {
            QuestlineError::NotFound(format!("no progress record for task {}", task_id))
        })
    }

    /// Insert a fresh record. A duplicate-key violation on the (user, task)
    /// index is not an error: it means a concurrent start won the race.
    pub async fn insert_new(&self, mut record: ProgressRecordDoc) -> Result<InsertOutcome> {
        let metadata = crate::db::mongo::MutMetadata::mut_metadata(&mut record);
        metadata.is_deleted = false;
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        match self.collection.inner().insert_one(record).await {
            Ok(result) => {
                let id = result.inserted_id.as_object_id().ok_or_else(|| {
                    QuestlineError::Database("Failed to get inserted ID".into())
                })?;
                Ok(InsertOutcome::Created(id))
            }
            Err(e) if is_duplicate_key(&e) => {
                debug!("progress insert lost (user, task) race, falling back to update");
                Ok(InsertOutcome::AlreadyExists)
            }
            Err(e) => Err(QuestlineError::Database(format!("Insert failed: {}", e))),
        }
    }

    /// Compare-and-swap replace: match on the version the caller loaded,
    /// persist the next value with version + 1. A miss means the record
    /// changed underneath the caller and surfaces as Conflict.
    pub async fn cas_replace(&self, record: &ProgressRecordDoc) -> Result<ProgressRecordDoc> {
        let id = record
            ._id
            .ok_or_else(|| QuestlineError::Internal("cas_replace on unsaved record".into()))?;
        let loaded_version = record.version;

        let mut next = record.clone();
        next.version = loaded_version + 1;

        let matched = self
            .collection
            .replace_one(doc! { "_id": id, "version": loaded_version }, next.clone())
            .await?;

        if matched == 0 {
            return Err(QuestlineError::Conflict(format!(
                "progress record {} was modified concurrently",
                id
            )));
        }

        Ok(next)
    }

    /// Stamp one reward claimed, guarded so a reward is only ever claimed
    /// once: the filter requires the entry to still be unclaimed.
    pub async fn mark_reward_claimed(
        &self,
        record_id: ObjectId,
        reward_index: usize,
        claimed_at: DateTime,
        transaction_hash: Option<String>,
    ) -> Result<()> {
        let claimed_path = format!("rewards.{}.claimed_at", reward_index);

        let mut filter = doc! { "_id": record_id };
        filter.insert(claimed_path.clone(), bson::Bson::Null);

        let mut set = doc! {
            "last_activity_at": claimed_at,
            "metadata.updated_at": DateTime::now(),
        };
        set.insert(claimed_path, claimed_at);
        if let Some(hash) = transaction_hash {
            set.insert(format!("rewards.{}.transaction_hash", reward_index), hash);
        }

        let result = self
            .collection
            .update_one(filter, doc! { "$set": set, "$inc": { "version": 1 } })
            .await?;

        if result.modified_count == 0 {
            return Err(QuestlineError::Conflict(format!(
                "reward {} on record {} is already claimed",
                reward_index, record_id
            )));
        }

        Ok(())
    }

    /// How many of the given tasks this user has completed. Used by the
    /// prerequisite gate, which demands an exact count match.
    pub async fn count_completed(&self, user_id: ObjectId, task_ids: &[ObjectId]) -> Result<usize> {
        if task_ids.is_empty() {
            return Ok(0);
        }

        let completed: bson::Bson = bson::to_bson(&ProgressStatus::Completed)?;
        let count = self
            .collection
            .count(doc! {
                "user_id": user_id,
                "task_id": { "$in": task_ids.to_vec() },
                "status": completed,
            })
            .await?;

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    // Store operations require a running MongoDB instance; the transition
    // rules they persist are covered in engine::machine, and the claim
    // guard filter shape is exercised indirectly through settlement tests.
}
