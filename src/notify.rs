// Fire-and-forget notification dispatch

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::database::DbPool;
use crate::error::LedgerError;
use crate::models::Notification;

#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub kind: &'static str,
    pub title: String,
    pub message: String,
    pub amount: Option<Decimal>,
    pub metadata: Value,
}

/// Advisory-only dispatcher. A committed ledger mutation must never block on
/// or be rolled back by notification delivery, so `notify` spawns the work
/// and swallows failures after logging them.
#[derive(Clone)]
pub struct Notifier {
    pool: DbPool,
    http_client: Client,
    push_url: Option<String>,
}

impl Notifier {
    pub fn new(pool: DbPool, push_url: Option<String>) -> Self {
        Self {
            pool,
            http_client: Client::new(),
            push_url,
        }
    }

    pub fn notify(&self, user_id: Uuid, payload: NotificationPayload) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.deliver(user_id, &payload).await {
                warn!(
                    "failed to deliver {} notification to {}: {}",
                    payload.kind, user_id, e
                );
            }
        });
    }

    async fn deliver(
        &self,
        user_id: Uuid,
        payload: &NotificationPayload,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO notifications (user_id, kind, title, message, amount, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user_id)
        .bind(payload.kind)
        .bind(&payload.title)
        .bind(&payload.message)
        .bind(payload.amount)
        .bind(&payload.metadata)
        .execute(&self.pool)
        .await?;

        if let Some(url) = &self.push_url {
            self.http_client
                .post(url)
                .json(&serde_json::json!({
                    "user_id": user_id,
                    "notification": payload,
                }))
                .send()
                .await?
                .error_for_status()?;
        }

        Ok(())
    }

    /// List a user's notifications, newest first.
    pub async fn list(
        pool: &DbPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, LedgerError> {
        let rows = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications
             WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn mark_read(
        pool: &DbPool,
        user_id: Uuid,
        notification_id: Uuid,
    ) -> Result<Notification, LedgerError> {
        let row = sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET read = TRUE
             WHERE id = $1 AND user_id = $2
             RETURNING *",
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        row.ok_or(LedgerError::NotFound("notification"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_metadata() {
        let payload = NotificationPayload {
            kind: "transfer_in",
            title: "You received a gift".into(),
            message: "250 BU from a friend".into(),
            amount: Some(Decimal::from(250)),
            metadata: serde_json::json!({ "transfer_id": "abc" }),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "transfer_in");
        assert_eq!(value["metadata"]["transfer_id"], "abc");
        assert_eq!(value["amount"], "250");
    }
}
