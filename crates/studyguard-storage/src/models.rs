use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One snapshot of browser state, recorded by the monitor at a fixed cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Monotonic position in the observation log, assigned on append
    #[serde(default)]
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub extracted_text: Option<String>,
    #[serde(default)]
    pub tab_count: u32,
}

impl Observation {
    #[must_use]
    pub fn new(url: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            sequence: 0,
            captured_at,
            url: url.into(),
            title: None,
            extracted_text: None,
            tab_count: 1,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.extracted_text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_tab_count(mut self, tab_count: u32) -> Self {
        self.tab_count = tab_count;
        self
    }
}

/// Classification label attached to an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Educational,
    Distracting,
    Inappropriate,
    Neutral,
}

impl Category {
    pub const ALL: [Self; 4] = [
        Self::Educational,
        Self::Distracting,
        Self::Inappropriate,
        Self::Neutral,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Educational => "educational",
            Self::Distracting => "distracting",
            Self::Inappropriate => "inappropriate",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "educational" => Ok(Self::Educational),
            "distracting" => Ok(Self::Distracting),
            "inappropriate" => Ok(Self::Inappropriate),
            "neutral" => Ok(Self::Neutral),
            other => anyhow::bail!("Unknown category: {other}"),
        }
    }
}

/// Kind of action the decision engine can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    None,
    Encourage,
    Warn,
    Intervene,
}

impl ActionKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Encourage => "encourage",
            Self::Warn => "warn",
            Self::Intervene => "intervene",
        }
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "encourage" => Ok(Self::Encourage),
            "warn" => Ok(Self::Warn),
            "intervene" => Ok(Self::Intervene),
            other => anyhow::bail!("Unknown action kind: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    /// Bucket a normalized urgency score in [0, 1]
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Output of one decision engine invocation, enacted by the browser-control side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub message: String,
    pub timeout_seconds: u32,
    pub reasoning: String,
    pub urgency: Urgency,
    /// Where to navigate on intervene
    pub redirect_url: Option<String>,
}

impl Action {
    #[must_use]
    pub fn none(reasoning: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::None,
            message: String::new(),
            timeout_seconds: 0,
            reasoning: reasoning.into(),
            urgency: Urgency::Low,
            redirect_url: None,
        }
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.kind.is_none()
    }
}

/// Session totals of emitted and suppressed actions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounters {
    pub encouragements: u32,
    pub warnings: u32,
    pub interventions: u32,
    pub suppressed: u32,
}

impl ActionCounters {
    pub fn record(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::Encourage => self.encouragements += 1,
            ActionKind::Warn => self.warnings += 1,
            ActionKind::Intervene => self.interventions += 1,
            ActionKind::None => {}
        }
    }
}

/// What happened to the record's action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Observation was classified, no action candidate
    Classified,
    Emitted,
    Suppressed,
}

impl AuditOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Classified => "classified",
            Self::Emitted => "emitted",
            Self::Suppressed => "suppressed",
        }
    }
}

impl FromStr for AuditOutcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classified" => Ok(Self::Classified),
            "emitted" => Ok(Self::Emitted),
            "suppressed" => Ok(Self::Suppressed),
            other => anyhow::bail!("Unknown audit outcome: {other}"),
        }
    }
}

/// Structured audit row for downstream reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub category: Category,
    pub confidence: f32,
    /// Set when the content analysis call was unavailable
    pub degraded: bool,
    pub action_kind: ActionKind,
    pub outcome: AuditOutcome,
    pub message: String,
    pub reasoning: String,
    pub timeout_seconds: u32,
    pub counters: ActionCounters,
}

impl AuditRecord {
    #[must_use]
    pub fn classified(
        timestamp: DateTime<Utc>,
        url: String,
        category: Category,
        confidence: f32,
        degraded: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            url,
            category,
            confidence,
            degraded,
            action_kind: ActionKind::None,
            outcome: AuditOutcome::Classified,
            message: String::new(),
            reasoning: String::new(),
            timeout_seconds: 0,
            counters: ActionCounters::default(),
        }
    }

    /// Attach an action decision to this record
    #[must_use]
    pub fn with_action(mut self, action: &Action, outcome: AuditOutcome) -> Self {
        self.action_kind = action.kind;
        self.outcome = outcome;
        self.message.clone_from(&action.message);
        self.reasoning.clone_from(&action.reasoning);
        self.timeout_seconds = action.timeout_seconds;
        self
    }

    #[must_use]
    pub fn with_counters(mut self, counters: ActionCounters) -> Self {
        self.counters = counters;
        self
    }
}

/// Aggregated view over stored audit records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditSummary {
    pub total_records: u32,
    pub per_category: BTreeMap<Category, u32>,
    pub emitted: BTreeMap<ActionKind, u32>,
    pub suppressed: u32,
    pub degraded: u32,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Supported content analysis providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    OpenAi,
    Ollama,
}

impl AiProvider {
    #[must_use]
    pub const fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::Ollama => "llama3.2",
        }
    }

    #[must_use]
    pub const fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }

    #[must_use]
    pub const fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Ollama => None,
        }
    }
}

/// Content analysis provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub enabled: bool,
    pub provider: AiProvider,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: AiProvider::default(),
            model: None,
            api_key: None,
            base_url: None,
            temperature: 0.3,
        }
    }
}

impl AiConfig {
    #[must_use]
    pub fn effective_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Configured key, falling back to the provider's environment variable
    #[must_use]
    pub fn effective_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.provider
                .api_key_env()
                .and_then(|var| std::env::var(var).ok())
                .filter(|key| !key.is_empty())
        })
    }

    #[must_use]
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_and_display() {
        for category in Category::ALL {
            let parsed: Category = category.to_string().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert!("spam".parse::<Category>().is_err());
    }

    #[test]
    fn test_observation_deserialize_defaults() {
        let json = r#"{"captured_at":"2024-01-01T10:00:00Z","url":"https://ixl.com"}"#;
        let obs: Observation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.sequence, 0);
        assert_eq!(obs.tab_count, 0);
        assert!(obs.title.is_none());
    }

    #[test]
    fn test_counters_record() {
        let mut counters = ActionCounters::default();
        counters.record(ActionKind::Warn);
        counters.record(ActionKind::Warn);
        counters.record(ActionKind::None);
        assert_eq!(counters.warnings, 2);
        assert_eq!(counters.encouragements, 0);
    }

    #[test]
    fn test_urgency_buckets() {
        assert_eq!(Urgency::from_score(0.1), Urgency::Low);
        assert_eq!(Urgency::from_score(0.5), Urgency::Medium);
        assert_eq!(Urgency::from_score(0.9), Urgency::High);
    }

    #[test]
    fn test_ai_config_effective_values() {
        let config = AiConfig {
            provider: AiProvider::Ollama,
            ..AiConfig::default()
        };
        assert_eq!(config.effective_model(), "llama3.2");
        assert_eq!(config.effective_base_url(), "http://localhost:11434");
        assert!(config.effective_api_key().is_none());
    }

    #[test]
    fn test_audit_record_with_action() {
        let action = Action {
            kind: ActionKind::Warn,
            message: "Stay focused".to_string(),
            timeout_seconds: 42,
            reasoning: "long visit".to_string(),
            urgency: Urgency::Medium,
            redirect_url: None,
        };
        let record = AuditRecord::classified(
            Utc::now(),
            "https://youtube.com".to_string(),
            Category::Distracting,
            0.9,
            false,
        )
        .with_action(&action, AuditOutcome::Suppressed);
        assert_eq!(record.action_kind, ActionKind::Warn);
        assert_eq!(record.outcome, AuditOutcome::Suppressed);
        assert_eq!(record.timeout_seconds, 42);
    }
}
