use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{conflict_or, PgStore};
use crate::database::models::WhatsAppMessage;
use crate::database::store::{MessageStore, StoreResult};

#[async_trait]
impl MessageStore for PgStore {
    async fn insert_message(&self, message: WhatsAppMessage) -> StoreResult<WhatsAppMessage> {
        let id = message.id.clone();
        sqlx::query_as::<_, WhatsAppMessage>(
            r#"INSERT INTO whatsapp_messages
                   (id, customer_id, loan_id, phone_number, direction, message_type, template_name,
                    content, status, sent_at, delivered_at, read_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
               RETURNING *"#,
        )
        .bind(message.id)
        .bind(message.customer_id)
        .bind(message.loan_id)
        .bind(message.phone_number)
        .bind(message.direction)
        .bind(message.message_type)
        .bind(message.template_name)
        .bind(message.content)
        .bind(message.status)
        .bind(message.sent_at)
        .bind(message.delivered_at)
        .bind(message.read_at)
        .fetch_one(self.pool())
        .await
        .map_err(|e| conflict_or(e, format!("message {} already stored", id)))
    }

    async fn update_message_status(
        &self,
        id: &str,
        status: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<WhatsAppMessage>> {
        let row = sqlx::query_as::<_, WhatsAppMessage>(
            r#"UPDATE whatsapp_messages
               SET status = $2,
                   delivered_at = CASE WHEN $2 = 'delivered' THEN $3 ELSE delivered_at END,
                   read_at = CASE WHEN $2 = 'read' THEN $3 ELSE read_at END
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(status)
        .bind(at)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    async fn customer_messages(&self, customer_id: Uuid) -> StoreResult<Vec<WhatsAppMessage>> {
        let rows = sqlx::query_as::<_, WhatsAppMessage>(
            "SELECT * FROM whatsapp_messages WHERE customer_id = $1 ORDER BY sent_at DESC",
        )
        .bind(customer_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn messages_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<WhatsAppMessage>> {
        let rows = sqlx::query_as::<_, WhatsAppMessage>(
            "SELECT * FROM whatsapp_messages WHERE sent_at >= $1 AND sent_at <= $2",
        )
        .bind(start)
        .bind(end)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
