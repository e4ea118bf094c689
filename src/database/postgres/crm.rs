use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::PgStore;
use crate::database::models::*;
use crate::database::store::{CrmStore, StoreResult};

#[async_trait]
impl CrmStore for PgStore {
    async fn open_journey_stage(&self, customer_id: Uuid) -> StoreResult<Option<JourneyStage>> {
        let row = sqlx::query_as::<_, JourneyStage>(
            r#"SELECT * FROM customer_journey
               WHERE customer_id = $1 AND stage_exit_date IS NULL
               ORDER BY stage_entry_date DESC
               LIMIT 1"#,
        )
        .bind(customer_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    async fn close_journey_stage(
        &self,
        id: Uuid,
        exit_date: DateTime<Utc>,
        time_in_stage_hours: Option<i64>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE customer_journey SET stage_exit_date = $2, time_in_stage_hours = $3 WHERE id = $1")
            .bind(id)
            .bind(exit_date)
            .bind(time_in_stage_hours)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn insert_journey_stage(&self, customer_id: Uuid, stage: &str, metrics: Value) -> StoreResult<JourneyStage> {
        let row = sqlx::query_as::<_, JourneyStage>(
            r#"INSERT INTO customer_journey (id, customer_id, stage, stage_entry_date, stage_metrics)
               VALUES ($1, $2, $3, NOW(), $4)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(stage)
        .bind(metrics)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    async fn list_journey(&self, customer_id: Uuid) -> StoreResult<Vec<JourneyStage>> {
        let rows = sqlx::query_as::<_, JourneyStage>(
            "SELECT * FROM customer_journey WHERE customer_id = $1 ORDER BY stage_entry_date",
        )
        .bind(customer_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn get_relationship(&self, customer_id: Uuid) -> StoreResult<Option<CustomerRelationship>> {
        let row = sqlx::query_as::<_, CustomerRelationship>(
            "SELECT * FROM customer_relationships WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    async fn upsert_relationship(&self, relationship: CustomerRelationship) -> StoreResult<CustomerRelationship> {
        let row = sqlx::query_as::<_, CustomerRelationship>(
            r#"INSERT INTO customer_relationships
                   (customer_id, relationship_stage, relationship_score, communication_preferences, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (customer_id) DO UPDATE
               SET relationship_stage = EXCLUDED.relationship_stage,
                   relationship_score = EXCLUDED.relationship_score,
                   communication_preferences = EXCLUDED.communication_preferences,
                   updated_at = EXCLUDED.updated_at
               RETURNING *"#,
        )
        .bind(relationship.customer_id)
        .bind(relationship.relationship_stage)
        .bind(relationship.relationship_score)
        .bind(relationship.communication_preferences)
        .bind(relationship.created_at)
        .bind(relationship.updated_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    async fn insert_communication(&self, new: NewCommunication) -> StoreResult<Communication> {
        let row = sqlx::query_as::<_, Communication>(
            r#"INSERT INTO communications
                   (id, customer_id, channel, direction, message_type, subject, message_content, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(new.customer_id)
        .bind(new.channel)
        .bind(new.direction)
        .bind(new.message_type)
        .bind(new.subject)
        .bind(new.message_content)
        .bind(new.status)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    async fn recent_communications(&self, limit: i64) -> StoreResult<Vec<Communication>> {
        let rows = sqlx::query_as::<_, Communication>(
            "SELECT * FROM communications ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn customer_communications(&self, customer_id: Uuid) -> StoreResult<Vec<Communication>> {
        let rows = sqlx::query_as::<_, Communication>(
            "SELECT * FROM communications WHERE customer_id = $1 ORDER BY created_at DESC",
        )
        .bind(customer_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn get_lead(&self, customer_id: Uuid) -> StoreResult<Option<Lead>> {
        let row = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    async fn update_lead_status(&self, customer_id: Uuid, status: &str) -> StoreResult<Option<Lead>> {
        let row = sqlx::query_as::<_, Lead>(
            "UPDATE leads SET status = $2, updated_at = NOW() WHERE customer_id = $1 RETURNING *",
        )
        .bind(customer_id)
        .bind(status)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    async fn insert_health_score(&self, record: HealthScoreRecord) -> StoreResult<HealthScoreRecord> {
        let row = sqlx::query_as::<_, HealthScoreRecord>(
            r#"INSERT INTO customer_health_scores (id, customer_id, health_score, score_components, calculated_at)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING *"#,
        )
        .bind(record.id)
        .bind(record.customer_id)
        .bind(record.health_score)
        .bind(record.score_components)
        .bind(record.calculated_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    async fn insert_partner_performance(&self, metrics: PartnerPerformance) -> StoreResult<PartnerPerformance> {
        let row = sqlx::query_as::<_, PartnerPerformance>(
            r#"INSERT INTO partner_performance_metrics
                   (id, partner_id, metric_period_start, metric_period_end, application_volume,
                    active_borrowers, approval_rate, total_loan_volume, average_loan_amount, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               RETURNING *"#,
        )
        .bind(metrics.id)
        .bind(metrics.partner_id)
        .bind(metrics.metric_period_start)
        .bind(metrics.metric_period_end)
        .bind(metrics.application_volume)
        .bind(metrics.active_borrowers)
        .bind(metrics.approval_rate)
        .bind(metrics.total_loan_volume)
        .bind(metrics.average_loan_amount)
        .bind(metrics.created_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM tasks WHERE TRUE");
        if let Some(project_id) = filter.project_id {
            qb.push(" AND project_id = ").push_bind(project_id);
        }
        if let Some(assignee_id) = filter.assignee_id {
            qb.push(" AND assignee_id = ").push_bind(assignee_id);
        }
        if let Some(customer_id) = filter.customer_id {
            qb.push(" AND customer_id = ").push_bind(customer_id);
        }
        if let Some(status) = &filter.status {
            qb.push(" AND status = ").push_bind(status.clone());
        }
        qb.push(" ORDER BY created_at DESC");
        let rows = qb.build_query_as::<Task>().fetch_all(self.pool()).await?;
        Ok(rows)
    }

    async fn create_task(&self, new: NewTask) -> StoreResult<Task> {
        let row = sqlx::query_as::<_, Task>(
            r#"INSERT INTO tasks (id, project_id, title, description, assignee_id, customer_id, status, due_date)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(new.project_id)
        .bind(new.title)
        .bind(new.description)
        .bind(new.assignee_id)
        .bind(new.customer_id)
        .bind(new.status)
        .bind(new.due_date)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    async fn update_task(&self, id: Uuid, update: TaskUpdate) -> StoreResult<Option<Task>> {
        let row = sqlx::query_as::<_, Task>(
            r#"UPDATE tasks
               SET title = COALESCE($2, title),
                   description = COALESCE($3, description),
                   assignee_id = COALESCE($4, assignee_id),
                   status = COALESCE($5, status),
                   due_date = COALESCE($6, due_date),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(update.title)
        .bind(update.description)
        .bind(update.assignee_id)
        .bind(update.status)
        .bind(update.due_date)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let rows = sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY created_at DESC")
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    async fn create_project(&self, name: &str, description: Option<&str>) -> StoreResult<Project> {
        let row = sqlx::query_as::<_, Project>(
            r#"INSERT INTO projects (id, name, description, status)
               VALUES ($1, $2, $3, 'active')
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }
}
