use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::PgStore;
use crate::database::models::*;
use crate::database::store::{DocumentStore, StoreResult};

fn push_document_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &DocumentFilter) {
    qb.push(" WHERE TRUE");
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(application_id) = filter.loan_application_id {
        qb.push(" AND loan_application_id = ").push_bind(application_id);
    }
    if let Some(status) = &filter.verification_status {
        qb.push(" AND verification_status = ").push_bind(status.clone());
    }
    if let Some(types) = &filter.document_types {
        qb.push(" AND document_type = ANY(").push_bind(types.clone()).push(")");
    }
    if let Some(from) = filter.uploaded_from {
        qb.push(" AND uploaded_at >= ").push_bind(from);
    }
    if let Some(to) = filter.uploaded_to {
        qb.push(" AND uploaded_at <= ").push_bind(to);
    }
}

fn push_activity_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ActivityFilter) {
    qb.push(" WHERE TRUE");
    if let Some(admin_id) = filter.admin_id {
        qb.push(" AND admin_id = ").push_bind(admin_id);
    }
    if let Some(target_type) = &filter.target_type {
        qb.push(" AND target_type = ").push_bind(target_type.clone());
    }
    if let Some(target_id) = &filter.target_id {
        qb.push(" AND target_id = ").push_bind(target_id.clone());
    }
    if let Some(action) = &filter.action {
        qb.push(" AND action = ").push_bind(action.clone());
    }
    if let Some(from) = filter.from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert_document(&self, new: NewDocument) -> StoreResult<Document> {
        let row = sqlx::query_as::<_, Document>(
            r#"INSERT INTO documents
                   (id, user_id, loan_application_id, file_name, file_type, file_size, checksum,
                    google_drive_file_id, google_drive_url, document_type, verification_status)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.loan_application_id)
        .bind(new.file_name)
        .bind(new.file_type)
        .bind(new.file_size)
        .bind(new.checksum)
        .bind(new.google_drive_file_id)
        .bind(new.google_drive_url)
        .bind(new.document_type)
        .bind(new.verification_status)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    async fn get_document(&self, id: Uuid) -> StoreResult<Option<Document>> {
        let row = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> StoreResult<Vec<Document>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM documents");
        push_document_filter(&mut qb, filter);
        qb.push(" ORDER BY uploaded_at DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(offset);
        }
        let rows = qb.build_query_as::<Document>().fetch_all(self.pool()).await?;
        Ok(rows)
    }

    async fn count_documents(&self, filter: &DocumentFilter) -> StoreResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM documents");
        push_document_filter(&mut qb, filter);
        let count = qb.build_query_scalar::<i64>().fetch_one(self.pool()).await?;
        Ok(count)
    }

    async fn review_document(&self, id: Uuid, review: DocumentReview) -> StoreResult<Option<Document>> {
        let row = sqlx::query_as::<_, Document>(
            r#"UPDATE documents
               SET verification_status = $2,
                   verified_at = $3,
                   verified_by = $4,
                   admin_notes = $5,
                   rejection_reason = $6
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(review.verification_status)
        .bind(review.verified_at)
        .bind(review.verified_by)
        .bind(review.admin_notes)
        .bind(review.rejection_reason)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    async fn insert_sync(&self, sync: DocumentSync) -> StoreResult<DocumentSync> {
        let row = sqlx::query_as::<_, DocumentSync>(
            r#"INSERT INTO document_syncs
                   (sync_id, user_id, sync_type, status, documents_synced, failed_documents, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING *"#,
        )
        .bind(sync.sync_id)
        .bind(sync.user_id)
        .bind(sync.sync_type)
        .bind(sync.status)
        .bind(sync.documents_synced)
        .bind(sync.failed_documents)
        .bind(sync.created_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    async fn get_sync(&self, sync_id: Uuid) -> StoreResult<Option<DocumentSync>> {
        let row = sqlx::query_as::<_, DocumentSync>("SELECT * FROM document_syncs WHERE sync_id = $1")
            .bind(sync_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    async fn list_syncs(&self, user_id: Uuid) -> StoreResult<Vec<DocumentSync>> {
        let rows = sqlx::query_as::<_, DocumentSync>(
            "SELECT * FROM document_syncs WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn log_admin_activity(&self, new: NewAdminActivity) -> StoreResult<AdminActivity> {
        let row = sqlx::query_as::<_, AdminActivity>(
            r#"INSERT INTO admin_activities
                   (id, admin_id, action, target_type, target_id, details, ip_address, user_agent)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(new.admin_id)
        .bind(new.action)
        .bind(new.target_type)
        .bind(new.target_id)
        .bind(new.details)
        .bind(new.ip_address)
        .bind(new.user_agent)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    async fn list_admin_activities(&self, filter: &ActivityFilter) -> StoreResult<Vec<AdminActivity>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM admin_activities");
        push_activity_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(offset);
        }
        let rows = qb.build_query_as::<AdminActivity>().fetch_all(self.pool()).await?;
        Ok(rows)
    }

    async fn count_admin_activities(&self, filter: &ActivityFilter) -> StoreResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM admin_activities");
        push_activity_filter(&mut qb, filter);
        let count = qb.build_query_scalar::<i64>().fetch_one(self.pool()).await?;
        Ok(count)
    }
}
