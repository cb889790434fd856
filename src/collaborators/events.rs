//! Activity events and the dispatcher contract
//!
//! Events are fire-and-forget: the engine publishes them for peripheral
//! features (activity feeds, notifications) and never fails an operation
//! because a dispatch failed. The dispatcher is an injected dependency of
//! the settlement component, not a global handle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::types::Result;

/// An activity event emitted by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    TaskCompleted {
        user_id: String,
        task_id: String,
        title: String,
        points_awarded: i64,
        streak: i32,
        at: DateTime<Utc>,
    },
    BadgeEarned {
        user_id: String,
        badge_id: String,
        name: String,
        at: DateTime<Utc>,
    },
    RewardsClaimed {
        user_id: String,
        task_id: String,
        claimed: usize,
        at: DateTime<Utc>,
    },
}

impl ActivityEvent {
    /// Subject suffix for topic-based transports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TaskCompleted { .. } => "task_completed",
            Self::BadgeEarned { .. } => "badge_earned",
            Self::RewardsClaimed { .. } => "rewards_claimed",
        }
    }
}

/// Fire-and-forget event emission
#[async_trait::async_trait]
pub trait ActivityDispatcher: Send + Sync {
    async fn publish(&self, event: ActivityEvent) -> Result<()>;
}

/// In-memory dispatcher that buffers events, for tests and embedded use
#[derive(Default)]
pub struct InMemoryDispatcher {
    events: Mutex<Vec<ActivityEvent>>,
}

impl InMemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain and return all buffered events
    pub async fn drain(&self) -> Vec<ActivityEvent> {
        std::mem::take(&mut *self.events.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ActivityDispatcher for InMemoryDispatcher {
    async fn publish(&self, event: ActivityEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        let event = ActivityEvent::TaskCompleted {
            user_id: "u1".into(),
            task_id: "t1".into(),
            title: "First steps".into(),
            points_awarded: 50,
            streak: 1,
            at: Utc::now(),
        };
        assert_eq!(event.kind(), "task_completed");
    }

    #[tokio::test]
    async fn test_in_memory_dispatcher_buffers() {
        let dispatcher = InMemoryDispatcher::new();
        dispatcher
            .publish(ActivityEvent::RewardsClaimed {
                user_id: "u1".into(),
                task_id: "t1".into(),
                claimed: 2,
                at: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(dispatcher.len().await, 1);
        let events = dispatcher.drain().await;
        assert_eq!(events.len(), 1);
        assert!(dispatcher.is_empty().await);
    }

    #[test]
    fn test_events_serialize_tagged() {
        let event = ActivityEvent::BadgeEarned {
            user_id: "u1".into(),
            badge_id: "b1".into(),
            name: "Early Bird".into(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "badge_earned");
        assert_eq!(json["name"], "Early Bird");
    }
}
