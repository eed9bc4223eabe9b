//! # Audit Repository
//!
//! Writes go through [`append`] inside the caller's transaction; the table
//! rejects UPDATE and DELETE by trigger.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use duka_core::{AuditEntry, EntityType, NewAuditEntry};

use super::new_id;
use crate::error::DbResult;

/// Appends one audit row on the caller's connection.
pub async fn append(conn: &mut SqliteConnection, entry: &NewAuditEntry) -> DbResult<()> {
    debug!(
        action = ?entry.action,
        entity_id = %entry.entity_id,
        "Writing audit entry"
    );

    sqlx::query(
        r#"
        INSERT INTO audit_logs (
            id, user_id, action, entity_type, entity_id,
            old_value, new_value, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(new_id())
    .bind(&entry.user_id)
    .bind(entry.action)
    .bind(entry.entity_type)
    .bind(&entry.entity_id)
    .bind(entry.old_value.as_ref().map(|v| v.to_string()))
    .bind(entry.new_value.as_ref().map(|v| v.to_string()))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Read access to the audit trail.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// All entries for one entity, oldest first.
    pub async fn trail(&self, entity_type: EntityType, entity_id: &str) -> DbResult<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, user_id, action, entity_type, entity_id, old_value, new_value, created_at
            FROM audit_logs
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY rowid
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Most recent entries across the ledger, newest first.
    pub async fn recent(&self, limit: i64) -> DbResult<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, user_id, action, entity_type, entity_id, old_value, new_value, created_at
            FROM audit_logs
            ORDER BY rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Total number of entries.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use crate::DbError;
    use duka_core::AuditAction;

    #[tokio::test]
    async fn test_append_and_read_trail() {
        let db = fixtures::seeded().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let entry = NewAuditEntry::new("u-1", AuditAction::ReversalRequested, EntityType::Sale, "s-1")
            .with_new(serde_json::json!({ "reason": "wrong item" }));
        append(&mut conn, &entry).await.unwrap();
        append(
            &mut conn,
            &NewAuditEntry::new("u-2", AuditAction::ReversalRejected, EntityType::Sale, "s-1"),
        )
        .await
        .unwrap();
        drop(conn);

        let trail = db.audit().trail(EntityType::Sale, "s-1").await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, AuditAction::ReversalRequested);
        assert_eq!(trail[0].new_json().unwrap()["reason"], "wrong item");
        assert_eq!(trail[1].user_id, "u-2");
    }

    #[tokio::test]
    async fn test_audit_is_append_only() {
        let db = fixtures::seeded().await;
        let mut conn = db.pool().acquire().await.unwrap();
        append(
            &mut conn,
            &NewAuditEntry::new("u-1", AuditAction::SaleCreated, EntityType::Sale, "s-1"),
        )
        .await
        .unwrap();

        let update: Result<_, DbError> = sqlx::query("UPDATE audit_logs SET user_id = 'forged'")
            .execute(&mut *conn)
            .await
            .map_err(DbError::from);
        assert!(update.is_err());

        let delete: Result<_, DbError> = sqlx::query("DELETE FROM audit_logs")
            .execute(&mut *conn)
            .await
            .map_err(DbError::from);
        assert!(delete.is_err());
        drop(conn);

        assert_eq!(db.audit().count().await.unwrap(), 1);
    }
}
