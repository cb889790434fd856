//! Role grant collaborator
//!
//! Best-effort assignment of an external role (a chat-platform role, a forum
//! group) when a role-kind reward is claimed.

use tracing::info;

use crate::types::Result;

/// External role assignment
#[async_trait::async_trait]
pub trait RoleGrant: Send + Sync {
    async fn grant_role(&self, external_user_id: &str, role_id: &str) -> Result<()>;
}

/// Shipped stub that records grants in the log
#[derive(Default)]
pub struct LoggingRoleGrant;

impl LoggingRoleGrant {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl RoleGrant for LoggingRoleGrant {
    async fn grant_role(&self, external_user_id: &str, role_id: &str) -> Result<()> {
        info!(user = %external_user_id, role = %role_id, "role granted");
        Ok(())
    }
}
