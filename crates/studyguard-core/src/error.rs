//! Error taxonomy of the decision pipeline

use studyguard_storage::{ActionKind, Category};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    /// The content analysis call timed out or failed; callers degrade to rule categories
    #[error("Content classification unavailable: {0}")]
    ClassificationUnavailable(String),

    /// The aggregation window holds no observations; callers use neutral defaults
    #[error("Aggregation window has no observations")]
    EmptyWindow,

    /// Policy decision, not a failure; logged as suppressed
    #[error("{kind} for {category} suppressed until {ready_at}")]
    ThrottleRejected {
        category: Category,
        kind: ActionKind,
        ready_at: chrono::DateTime<chrono::Utc>,
    },

    /// Only raised at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
