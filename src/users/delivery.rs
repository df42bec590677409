//! Invite delivery

use async_trait::async_trait;

use crate::models::User;

/// Hands a freshly issued invite token to whatever reaches the user
/// (mail, notifications, ...)
#[async_trait]
pub trait InviteDelivery: Send + Sync {
    async fn deliver(&self, user: &User, invite_token: &str) -> anyhow::Result<()>;
}

/// Delivery that only writes to the log. The token itself is logged at
/// debug level so it can be picked up in development.
#[derive(Debug, Clone, Default)]
pub struct LogInviteDelivery;

#[async_trait]
impl InviteDelivery for LogInviteDelivery {
    async fn deliver(&self, user: &User, invite_token: &str) -> anyhow::Result<()> {
        tracing::info!(user_id = %user.id, email = %user.email, "Invite issued");
        tracing::debug!(user_id = %user.id, invite_token = %invite_token, "Invite token");
        Ok(())
    }
}
