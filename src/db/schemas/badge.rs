//! Badge definition schema
//!
//! Read-only input to eligibility evaluation. A badge names its primary
//! requirement kind via `category` and may carry additional gates in the
//! `requirements` block; seasonal badges are only grantable inside their
//! season window.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for badge definitions
pub const BADGE_COLLECTION: &str = "badge_definitions";

/// Primary requirement kind tested by the eligibility evaluator
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCategory {
    /// Lifetime points threshold
    #[default]
    Points,
    /// Profile completeness threshold
    Profile,
    /// Named external-account connections all present
    Social,
    /// Login streak threshold
    Streak,
    /// Granted at account creation by the registration flow
    Registration,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BadgeTier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BadgeRarity {
    #[default]
    Common,
    Rare,
    Epic,
    Legendary,
}

/// Additional gates, all of which must hold alongside the category check
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct BadgeRequirements {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_level: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_completed: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub friend_count: Option<i64>,

    /// Profile completeness threshold, 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_completeness: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_streak: Option<i32>,

    /// Platforms that must all be connected (social badges)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<String>,
}

/// Badge definition document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct BadgeDefinitionDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub category: BadgeCategory,

    /// Points threshold for points-category badges
    #[serde(default)]
    pub points_required: i64,

    #[serde(default)]
    pub tier: BadgeTier,

    #[serde(default)]
    pub rarity: BadgeRarity,

    #[serde(default)]
    pub requirements: BadgeRequirements,

    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Seasonal window; when set, grants only happen inside it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_start: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_end: Option<DateTime>,
}

fn default_true() -> bool {
    true
}

impl BadgeDefinitionDoc {
    /// The record ID, present once persisted
    pub fn id(&self) -> Option<ObjectId> {
        self._id
    }

    /// Whether this badge is grantable at `now`: active, and inside the
    /// season window when bounds are set.
    pub fn in_season(&self, now: DateTime) -> bool {
        if !self.is_active {
            return false;
        }
        if let Some(start) = self.season_start {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.season_end {
            if now > end {
                return false;
            }
        }
        true
    }
}

impl IntoIndexes for BadgeDefinitionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "is_active": 1 },
                Some(
                    IndexOptions::builder()
                        .name("is_active_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "category": 1 },
                Some(
                    IndexOptions::builder()
                        .name("category_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for BadgeDefinitionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(ms: i64) -> DateTime {
        DateTime::from_millis(ms)
    }

    #[test]
    fn test_inactive_badge_never_in_season() {
        let badge = BadgeDefinitionDoc {
            is_active: false,
            ..Default::default()
        };
        assert!(!badge.in_season(millis(1_000)));
    }

    #[test]
    fn test_open_ended_badge_always_in_season() {
        let badge = BadgeDefinitionDoc {
            is_active: true,
            ..Default::default()
        };
        assert!(badge.in_season(millis(0)));
    }

    #[test]
    fn test_season_window_bounds() {
        let badge = BadgeDefinitionDoc {
            is_active: true,
            season_start: Some(millis(100)),
            season_end: Some(millis(200)),
            ..Default::default()
        };
        assert!(!badge.in_season(millis(50)));
        assert!(badge.in_season(millis(150)));
        assert!(!badge.in_season(millis(250)));
    }
}
