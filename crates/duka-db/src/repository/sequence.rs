//! # Document Number Sequences
//!
//! Receipt and transfer numbers come from a per-day counter row bumped inside
//! the owning transaction, so two concurrent sales can never draw the same
//! number; the UNIQUE constraints on `receipt_number`/`transfer_number` back
//! this up.
//!
//! ```text
//! RCP-20260131-000042     TRF-20260131-0007
//! │   │        │          │   │        │
//! │   │        └ seq      │   │        └ seq
//! │   └ UTC day           │   └ UTC day
//! └ receipt               └ transfer
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::DbResult;

/// Kinds of numbered documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Receipt,
    Transfer,
}

impl DocumentKind {
    const fn key(&self) -> &'static str {
        match self {
            DocumentKind::Receipt => "receipt",
            DocumentKind::Transfer => "transfer",
        }
    }

    /// Formats a sequence value as a document number.
    pub fn format(&self, day: &str, value: i64) -> String {
        match self {
            DocumentKind::Receipt => format!("RCP-{}-{:06}", day, value),
            DocumentKind::Transfer => format!("TRF-{}-{:04}", day, value),
        }
    }
}

/// Draws the next number for `kind` on the caller's transaction.
pub async fn next_number(
    conn: &mut SqliteConnection,
    kind: DocumentKind,
    now: DateTime<Utc>,
) -> DbResult<String> {
    let day = now.format("%Y%m%d").to_string();

    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sequences (name, day, last_value) VALUES (?1, ?2, 1)
        ON CONFLICT (name, day) DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(kind.key())
    .bind(&day)
    .fetch_one(&mut *conn)
    .await?;

    Ok(kind.format(&day, value))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use chrono::TimeZone;

    #[test]
    fn test_format() {
        assert_eq!(DocumentKind::Receipt.format("20260131", 42), "RCP-20260131-000042");
        assert_eq!(DocumentKind::Transfer.format("20260131", 7), "TRF-20260131-0007");
    }

    #[tokio::test]
    async fn test_numbers_increase_per_kind_and_day() {
        let db = fixtures::seeded().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let day1 = Utc.with_ymd_and_hms(2026, 1, 31, 9, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();

        let a = next_number(&mut conn, DocumentKind::Receipt, day1).await.unwrap();
        let b = next_number(&mut conn, DocumentKind::Receipt, day1).await.unwrap();
        let t = next_number(&mut conn, DocumentKind::Transfer, day1).await.unwrap();
        let c = next_number(&mut conn, DocumentKind::Receipt, day2).await.unwrap();

        assert_eq!(a, "RCP-20260131-000001");
        assert_eq!(b, "RCP-20260131-000002");
        assert_eq!(t, "TRF-20260131-0001");
        assert_eq!(c, "RCP-20260201-000001");
    }
}
