//! NATS activity publisher
//!
//! Publishes engine activity events as JSON onto per-kind subjects
//! (`questline.events.task_completed`, ...). Connection management follows
//! the fail-fast pattern: no retry on initial connect, reconnection handled
//! by the client after a successful first connection.

use async_nats::ConnectOptions;
use std::time::Duration;
use tracing::{debug, info};

use crate::collaborators::events::{ActivityDispatcher, ActivityEvent};
use crate::types::{QuestlineError, Result};

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// NATS connection configuration
#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Subject prefix; event kind is appended per publish
    pub subject_prefix: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            user: None,
            password: None,
            subject_prefix: "questline.events".to_string(),
        }
    }
}

/// Activity dispatcher backed by NATS
pub struct NatsActivityPublisher {
    client: async_nats::Client,
    subject_prefix: String,
}

impl NatsActivityPublisher {
    /// Connect to NATS and return a publisher
    pub async fn connect(config: &NatsConfig, name: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&config.user, &config.password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options.connect(&config.url).await.map_err(|e| {
            QuestlineError::ExternalDependency(format!("NATS connect failed: {}", e))
        })?;

        info!("Connected to NATS at {}", config.url);

        Ok(Self {
            client,
            subject_prefix: config.subject_prefix.clone(),
        })
    }

    fn subject_for(&self, event: &ActivityEvent) -> String {
        format!("{}.{}", self.subject_prefix, event.kind())
    }
}

#[async_trait::async_trait]
impl ActivityDispatcher for NatsActivityPublisher {
    async fn publish(&self, event: ActivityEvent) -> Result<()> {
        let subject = self.subject_for(&event);
        let payload = serde_json::to_vec(&event)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| {
                QuestlineError::ExternalDependency(format!("NATS publish failed: {}", e))
            })?;

        debug!(subject = %subject, "published activity event");
        Ok(())
    }
}
