//! User aggregate schema
//!
//! The user entity is owned by the surrounding application; this schema
//! covers the aggregate fields the engine reads and writes (lifetime points,
//! level, badges, completion count) plus the profile and social fields badge
//! eligibility evaluates. All engine mutations go through atomic update
//! operators, never read-modify-write.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// A badge held by a user
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EarnedBadge {
    pub badge_id: ObjectId,
    pub date_earned: DateTime,
}

impl Default for EarnedBadge {
    fn default() -> Self {
        Self {
            badge_id: ObjectId::default(),
            date_earned: DateTime::from_millis(0),
        }
    }
}

/// An external account connection (discord, twitter, github, wallet, ...)
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ConnectedAccount {
    pub platform: String,
    pub external_id: String,
}

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    pub username: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Lifetime points across all tasks
    #[serde(default)]
    pub points: i64,

    #[serde(default)]
    pub tasks_completed: i64,

    /// Derived from points; high-water mark, never decreases
    #[serde(default = "default_level")]
    pub level: i32,

    #[serde(default)]
    pub badges: Vec<EarnedBadge>,

    /// Role tags used by task requirement gates
    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub connected_accounts: Vec<ConnectedAccount>,

    /// Wallet address for chain-settled reward claims
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,

    /// Consecutive-day login counter, maintained by the session layer
    #[serde(default)]
    pub login_streak: i32,

    /// Maintained by the friend-graph feature
    #[serde(default)]
    pub friend_count: i64,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_level() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

impl UserDoc {
    /// The record ID, present once persisted
    pub fn id(&self) -> Option<ObjectId> {
        self._id
    }

    pub fn has_badge(&self, badge_id: &ObjectId) -> bool {
        self.badges.iter().any(|b| &b.badge_id == badge_id)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// External id for a connected platform, if linked
    pub fn connection(&self, platform: &str) -> Option<&str> {
        self.connected_accounts
            .iter()
            .find(|c| c.platform == platform)
            .map(|c| c.external_id.as_str())
    }

    /// Fraction of profile fields filled in, 0-100
    pub fn profile_completeness(&self) -> f64 {
        let fields = [
            self.display_name.is_some(),
            self.avatar_url.is_some(),
            self.bio.is_some(),
            self.location.is_some(),
        ];
        let filled = fields.iter().filter(|f| **f).count();
        filled as f64 / fields.len() as f64 * 100.0
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "username": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("username_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
