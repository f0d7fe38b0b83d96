pub mod db;
pub mod migrations;
pub mod models;

use anyhow::Result;

pub use db::AuditStore;
pub use models::{
    Action, ActionCounters, ActionKind, AiConfig, AiProvider, AuditOutcome, AuditRecord,
    AuditSummary, Category, Observation, Urgency,
};

/// Destination for audit records produced by the decision pipeline
pub trait AuditSink: Send + Sync {
    /// Persist one record
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be written
    fn record(&self, record: &AuditRecord) -> Result<()>;
}
