//! Durable pending session store backed by SQLite

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use super::PendingSessionStore;
use crate::error::Result;
use crate::types::{LeadId, PendingCallSession};

/// Pending session persisted in a single-row table, so it survives the
/// process being suspended or killed while the native dialer is in front
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table if needed
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pending_call (
                slot INTEGER PRIMARY KEY CHECK (slot = 1),
                phone_number TEXT NOT NULL,
                lead_id TEXT,
                start_time TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PendingSessionStore for SqliteSessionStore {
    async fn begin(&self, phone_number: &str, lead_id: Option<LeadId>) -> Result<PendingCallSession> {
        let session = PendingCallSession::new(phone_number, lead_id);

        let mut tx = self.pool.begin().await?;
        let previous: Option<String> = sqlx::query("SELECT phone_number FROM pending_call WHERE slot = 1")
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.get("phone_number"));
        sqlx::query(
            "INSERT OR REPLACE INTO pending_call (slot, phone_number, lead_id, start_time)
             VALUES (1, ?, ?, ?)",
        )
        .bind(&session.phone_number)
        .bind(session.lead_id.as_ref().map(|l| l.as_str()))
        .bind(session.start_time)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if let Some(previous) = previous {
            warn!(previous = %previous, next = %phone_number, "pending call superseded");
        }
        debug!(phone = %phone_number, "pending call persisted");
        Ok(session)
    }

    async fn peek(&self) -> Result<Option<PendingCallSession>> {
        let row = sqlx::query("SELECT phone_number, lead_id, start_time FROM pending_call WHERE slot = 1")
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let lead_id: Option<String> = row.try_get("lead_id")?;
        let start_time: DateTime<Utc> = row.try_get("start_time")?;
        Ok(Some(PendingCallSession {
            phone_number: row.try_get("phone_number")?,
            lead_id: lead_id.map(LeadId),
            start_time,
        }))
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM pending_call WHERE slot = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
