//! SQLite-backed audit store.

mod helpers;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::migrations;
use crate::models::{ActionCounters, AuditOutcome, AuditRecord, AuditSummary};
use crate::AuditSink;

const RECORD_COLUMNS: &str = "id, timestamp, url, category, confidence, degraded, action_kind, outcome,
     message, reasoning, timeout_seconds, encouragements, warnings, interventions, suppressed";

/// Audit log database
pub struct AuditStore {
    conn: Mutex<Connection>,
}

impl AuditStore {
    /// Open (or create) the audit database
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation, connection opening, or schema initialization fails
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = db_path.unwrap_or_else(Self::default_db_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&path).context("Failed to open database connection")?;
        migrations::init_schema(&conn)?;

        log::info!("Audit store initialized at: {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a throwaway store that lives only as long as the process
    ///
    /// # Errors
    ///
    /// Returns an error if schema initialization fails
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        migrations::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get default database path
    #[must_use]
    pub fn default_db_path() -> PathBuf {
        let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("studyguard");
        path.push("audit.db");
        path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert one audit record
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub fn insert_audit_record(&self, record: &AuditRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO audit_records (id, timestamp, url, category, confidence, degraded, action_kind,
                outcome, message, reasoning, timeout_seconds, encouragements, warnings, interventions, suppressed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                record.id.to_string(),
                record.timestamp.to_rfc3339(),
                record.url,
                record.category.as_str(),
                f64::from(record.confidence),
                i32::from(record.degraded),
                record.action_kind.as_str(),
                record.outcome.as_str(),
                record.message,
                record.reasoning,
                record.timeout_seconds,
                record.counters.encouragements,
                record.counters.warnings,
                record.counters.interventions,
                record.counters.suppressed,
            ],
        )?;
        Ok(())
    }

    /// Most recent records, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn recent_records(&self, limit: u32) -> Result<Vec<AuditRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM audit_records ORDER BY timestamp DESC LIMIT ?1"
        ))?;
        let records = stmt
            .query_map(params![limit], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Records in `[start, end)`, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn records_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM audit_records
             WHERE timestamp >= ?1 AND timestamp < ?2 ORDER BY timestamp ASC"
        ))?;
        let records = stmt
            .query_map(
                params![start.to_rfc3339(), end.to_rfc3339()],
                Self::row_to_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Summarize records in `[start, end)`
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn summary(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<AuditSummary> {
        let records = self.records_between(start, end)?;
        let mut summary = AuditSummary::default();

        for record in &records {
            summary.total_records += 1;
            match record.outcome {
                AuditOutcome::Classified => {
                    *summary.per_category.entry(record.category).or_insert(0) += 1;
                }
                AuditOutcome::Emitted => {
                    *summary.emitted.entry(record.action_kind).or_insert(0) += 1;
                }
                AuditOutcome::Suppressed => summary.suppressed += 1,
            }
            if record.degraded && record.outcome == AuditOutcome::Classified {
                summary.degraded += 1;
            }
        }

        summary.first_seen = records.first().map(|r| r.timestamp);
        summary.last_seen = records.last().map(|r| r.timestamp);
        Ok(summary)
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
        let id: String = row.get(0)?;
        let timestamp: String = row.get(1)?;
        let category: String = row.get(3)?;
        let confidence: f64 = row.get(4)?;
        let degraded: i32 = row.get(5)?;
        let action_kind: String = row.get(6)?;
        let outcome: String = row.get(7)?;

        #[allow(clippy::cast_possible_truncation)]
        let confidence = confidence as f32;

        Ok(AuditRecord {
            id: helpers::parse_uuid(&id)?,
            timestamp: helpers::parse_datetime(&timestamp)?,
            url: row.get(2)?,
            category: helpers::parse_enum(&category)?,
            confidence,
            degraded: degraded != 0,
            action_kind: helpers::parse_enum(&action_kind)?,
            outcome: helpers::parse_enum(&outcome)?,
            message: row.get(8)?,
            reasoning: row.get(9)?,
            timeout_seconds: row.get(10)?,
            counters: ActionCounters {
                encouragements: row.get(11)?,
                warnings: row.get(12)?,
                interventions: row.get(13)?,
                suppressed: row.get(14)?,
            },
        })
    }
}

impl AuditSink for AuditStore {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        self.insert_audit_record(record)
    }
}
