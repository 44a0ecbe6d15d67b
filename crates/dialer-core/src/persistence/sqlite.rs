//! SQLite call-log sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::CallLogSink;
use crate::error::{DialerError, Result};
use crate::types::{CallLogRecord, CallType, DispositionUpdate, LeadId, PersistedId, SubmitReceipt};

/// Reference implementation of the persistence endpoint on SQLite
pub struct SqliteCallLogStore {
    pool: SqlitePool,
}

impl SqliteCallLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS call_logs (
                id TEXT PRIMARY KEY,
                lead_id TEXT,
                phone_number TEXT NOT NULL,
                call_type TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                duration INTEGER NOT NULL,
                device_call_log_id TEXT UNIQUE,
                disposition TEXT,
                notes TEXT,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &PersistedId) -> Result<Option<CallLogRecord>> {
        let row = sqlx::query("SELECT * FROM call_logs WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| record_from_row(&row)).transpose()
    }

    /// All records, newest call first
    pub async fn list(&self) -> Result<Vec<CallLogRecord>> {
        let rows = sqlx::query("SELECT * FROM call_logs ORDER BY start_time DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn find_id_by_device_id(&self, device_id: &str) -> Result<Option<PersistedId>> {
        let row = sqlx::query("SELECT id FROM call_logs WHERE device_call_log_id = ?")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| PersistedId(row.get("id"))))
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CallLogRecord> {
    let call_type: String = row.try_get("call_type")?;
    let duration: i64 = row.try_get("duration")?;
    let lead_id: Option<String> = row.try_get("lead_id")?;
    let start_time: DateTime<Utc> = row.try_get("start_time")?;
    let end_time: DateTime<Utc> = row.try_get("end_time")?;

    Ok(CallLogRecord {
        lead_id: lead_id.map(LeadId),
        phone_number: row.try_get("phone_number")?,
        call_type: CallType::from_str(&call_type)
            .ok_or_else(|| DialerError::storage(format!("unknown call type '{}'", call_type)))?,
        start_time,
        end_time,
        duration_secs: duration.max(0) as u64,
        device_call_log_id: row.try_get("device_call_log_id")?,
        disposition: row.try_get("disposition")?,
        notes: row.try_get("notes")?,
    })
}

#[async_trait]
impl CallLogSink for SqliteCallLogStore {
    async fn log_call(&self, record: CallLogRecord) -> Result<SubmitReceipt> {
        let id = PersistedId::new(Uuid::new_v4().to_string());

        let inserted = sqlx::query(
            "INSERT INTO call_logs
                (id, lead_id, phone_number, call_type, start_time, end_time, duration,
                 device_call_log_id, disposition, notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(device_call_log_id) DO NOTHING",
        )
        .bind(id.as_str())
        .bind(record.lead_id.as_ref().map(|l| l.as_str()))
        .bind(&record.phone_number)
        .bind(record.call_type.as_str())
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.duration_secs as i64)
        .bind(record.device_call_log_id.as_deref())
        .bind(record.disposition.as_deref())
        .bind(record.notes.as_deref())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| DialerError::persistence(e.to_string()))?;

        if inserted.rows_affected() == 1 {
            return Ok(SubmitReceipt { id, duplicate: false });
        }

        let device_id = record.device_call_log_id.as_deref().unwrap_or_default();
        let existing = self
            .find_id_by_device_id(device_id)
            .await?
            .ok_or_else(|| DialerError::persistence(format!("insert ignored for device id '{}'", device_id)))?;
        Ok(SubmitReceipt {
            id: existing,
            duplicate: true,
        })
    }

    async fn update_disposition(&self, id: &PersistedId, update: &DispositionUpdate) -> Result<()> {
        let result = sqlx::query(
            "UPDATE call_logs
             SET disposition = COALESCE(?, disposition), notes = COALESCE(?, notes)
             WHERE id = ?",
        )
        .bind(update.disposition.as_deref())
        .bind(update.notes.as_deref())
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| DialerError::persistence(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(DialerError::NotFound(format!("call log {}", id)));
        }
        Ok(())
    }
}
