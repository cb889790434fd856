//! Definition catalogs
//!
//! Read-only lookups over task and badge definitions. The progress engine
//! treats definitions as immutable input; editing them is a privileged
//! concern of the surrounding application.

use bson::{doc, oid::ObjectId, DateTime};

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{
    BadgeDefinitionDoc, TaskDefinitionDoc, BADGE_COLLECTION, TASK_COLLECTION,
};
use crate::types::{QuestlineError, Result};

/// Lookups over task definitions
#[derive(Clone)]
pub struct TaskCatalog {
    collection: MongoCollection<TaskDefinitionDoc>,
}

impl TaskCatalog {
    /// Open the collection and apply its indexes
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection(TASK_COLLECTION).await?;
        Ok(Self { collection })
    }

    /// Load an active task definition. Inactive and missing tasks are both
    /// NotFound: availability gating hides them from callers.
    pub async fn get_active(&self, task_id: ObjectId) -> Result<TaskDefinitionDoc> {
        let task = self
            .collection
            .find_one(doc! { "_id": task_id })
            .await?
            .filter(|t| t.is_active)
            .ok_or_else(|| QuestlineError::NotFound(format!("task {} not found", task_id)))?;

        Ok(task)
    }

    /// All active task definitions, for catalog listings
    pub async fn list_active(&self) -> Result<Vec<TaskDefinitionDoc>> {
        self.collection.find_many(doc! { "is_active": true }).await
    }
}

/// Lookups over badge definitions
#[derive(Clone)]
pub struct BadgeCatalog {
    collection: MongoCollection<BadgeDefinitionDoc>,
}

impl BadgeCatalog {
    /// Open the collection and apply its indexes
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection(BADGE_COLLECTION).await?;
        Ok(Self { collection })
    }

    /// Badge definitions grantable at `now`: active, and inside their
    /// season window when one is set.
    pub async fn grantable(&self, now: DateTime) -> Result<Vec<BadgeDefinitionDoc>> {
        let active = self.collection.find_many(doc! { "is_active": true }).await?;
        Ok(active.into_iter().filter(|b| b.in_season(now)).collect())
    }
}

#[cfg(test)]
mod tests {
    // Catalog lookups require a running MongoDB instance; the seasonal
    // filter they apply is covered by BadgeDefinitionDoc::in_season tests.
}
