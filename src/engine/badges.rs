//! Badge eligibility evaluator
//!
//! After a points, streak, or profile change, recomputes which badges the
//! user newly qualifies for. Each grant awards the achievement-unlock point
//! bonus, which can itself make further point-threshold badges eligible, so
//! evaluation loops until no new badges are granted or the pass cap is hit.

use bson::{oid::ObjectId, DateTime};
use std::sync::Arc;
use tracing::{info, warn};

use crate::collaborators::{ActivityDispatcher, ActivityEvent};
use crate::db::UserStore;
use crate::db::schemas::{BadgeCategory, BadgeDefinitionDoc, UserDoc};
use crate::engine::catalog::BadgeCatalog;
use crate::types::Result;

/// Evaluator tunables
#[derive(Debug, Clone)]
pub struct BadgeEvaluatorConfig {
    /// Achievement-unlock bonus credited per grant
    pub bonus_points: i64,
    /// Maximum evaluation passes per trigger
    pub max_passes: u32,
}

impl Default for BadgeEvaluatorConfig {
    fn default() -> Self {
        Self {
            bonus_points: 50,
            max_passes: 4,
        }
    }
}

impl From<&crate::config::EngineConfig> for BadgeEvaluatorConfig {
    fn from(config: &crate::config::EngineConfig) -> Self {
        Self {
            bonus_points: config.badge_bonus_points,
            max_passes: config.badge_max_passes,
        }
    }
}

/// Whether a user currently satisfies a badge's requirements.
///
/// The category names the primary check; the requirements block carries
/// additional gates that must all hold. `registration` badges are normally
/// granted at account creation by the registration flow; the evaluator
/// treats them as always-eligible so a missed grant backfills idempotently.
pub fn eligible(user: &UserDoc, badge: &BadgeDefinitionDoc) -> bool {
    let primary = match badge.category {
        BadgeCategory::Points => user.points >= badge.points_required,
        BadgeCategory::Profile => {
            let threshold = badge
                .requirements
                .profile_completeness
                .unwrap_or(100.0);
            user.profile_completeness() >= threshold
        }
        BadgeCategory::Social => badge
            .requirements
            .connections
            .iter()
            .all(|platform| user.connection(platform).is_some()),
        BadgeCategory::Streak => {
            let threshold = badge.requirements.login_streak.unwrap_or(0);
            user.login_streak >= threshold
        }
        BadgeCategory::Registration => true,
    };
    if !primary {
        return false;
    }

    if let Some(min_level) = badge.requirements.min_level {
        if user.level < min_level {
            return false;
        }
    }
    if let Some(tasks) = badge.requirements.tasks_completed {
        if user.tasks_completed < tasks {
            return false;
        }
    }
    if let Some(friends) = badge.requirements.friend_count {
        if user.friend_count < friends {
            return false;
        }
    }

    true
}

/// Badge eligibility evaluator
pub struct BadgeEvaluator {
    catalog: BadgeCatalog,
    users: UserStore,
    dispatcher: Arc<dyn ActivityDispatcher>,
    config: BadgeEvaluatorConfig,
}

impl BadgeEvaluator {
    pub fn new(
        catalog: BadgeCatalog,
        users: UserStore,
        dispatcher: Arc<dyn ActivityDispatcher>,
        config: BadgeEvaluatorConfig,
    ) -> Self {
        Self {
            catalog,
            users,
            dispatcher,
            config,
        }
    }

    /// Grant every badge the user newly qualifies for, looping until stable
    /// or the pass cap. Returns the ids of newly granted badges.
    pub async fn evaluate(&self, user_id: ObjectId) -> Result<Vec<ObjectId>> {
        let now = DateTime::now();
        let definitions = self.catalog.grantable(now).await?;
        let mut granted = Vec::new();

        for pass in 0..self.config.max_passes {
            // Reload each pass: bonus points from the previous pass may have
            // pushed the user over further thresholds.
            let user = self.users.get(user_id).await?;
            let mut granted_this_pass = 0usize;

            for badge in &definitions {
                let Some(badge_id) = badge.id() else {
                    continue;
                };
                if user.has_badge(&badge_id) || granted.contains(&badge_id) {
                    continue;
                }
                if !eligible(&user, badge) {
                    continue;
                }

                let newly = self
                    .users
                    .grant_badge(user_id, badge_id, now, self.config.bonus_points)
                    .await?;
                if !newly {
                    // another evaluation run granted it concurrently
                    continue;
                }

                info!(user = %user_id, badge = %badge.name, pass, "badge earned");
                granted.push(badge_id);
                granted_this_pass += 1;

                let event = ActivityEvent::BadgeEarned {
                    user_id: user_id.to_hex(),
                    badge_id: badge_id.to_hex(),
                    name: badge.name.clone(),
                    at: now.to_chrono(),
                };
                if let Err(e) = self.dispatcher.publish(event).await {
                    warn!("badge event publish failed: {}", e);
                }
            }

            if granted_this_pass == 0 {
                break;
            }
        }

        Ok(granted)
    }
}
