//! Helper utility functions for CLI commands

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use studyguard_ai::AiService;
use studyguard_core::{AiClassifier, GuardConfig, SiteClassifier};
use studyguard_storage::Observation;

/// Load and validate the configuration, defaulting when no file exists
pub fn load_config(path: Option<&Path>) -> Result<GuardConfig> {
    GuardConfig::load(path).context("Configuration rejected")
}

/// Site classifier with content analysis attached when AI is enabled
pub fn build_classifier(config: &GuardConfig) -> Result<SiteClassifier> {
    let classifier = SiteClassifier::new(config.sites.clone())?;
    if !config.ai.enabled {
        return Ok(classifier);
    }

    let service = AiService::new(config.ai.clone()).context("Failed to create AI provider")?;
    log::info!("Content analysis enabled with {}", service.model_name());
    let analyzer = AiClassifier::new(Arc::new(service), config.engine.cache_size);
    Ok(classifier.with_analyzer(
        Arc::new(analyzer),
        StdDuration::from_millis(config.engine.classifier_timeout_ms),
    ))
}

/// One observation as the monitor writes it; the timestamp may be omitted
#[derive(Debug, Deserialize)]
struct ObservationLine {
    captured_at: Option<DateTime<Utc>>,
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    extracted_text: Option<String>,
    #[serde(default)]
    tab_count: Option<u32>,
}

/// Parse one JSON line; blank lines yield `None`. A missing timestamp takes
/// `fallback_time` when given and is an error otherwise.
pub fn parse_observation_line(
    line: &str,
    fallback_time: Option<DateTime<Utc>>,
) -> Result<Option<Observation>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let raw: ObservationLine =
        serde_json::from_str(line).with_context(|| format!("Invalid observation: {line}"))?;
    let captured_at = raw
        .captured_at
        .or(fallback_time)
        .ok_or_else(|| anyhow::anyhow!("Observation without captured_at: {line}"))?;

    let mut observation = Observation::new(raw.url, captured_at);
    observation.title = raw.title;
    observation.extracted_text = raw.extracted_text;
    if let Some(tab_count) = raw.tab_count {
        observation.tab_count = tab_count;
    }
    Ok(Some(observation))
}

/// Start and end of a named reporting period
pub fn period_bounds(period: &str, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    match period {
        "today" => {
            let start = now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| anyhow::anyhow!("Invalid start of day"))?
                .and_utc();
            Ok((start, now))
        }
        "hour" => Ok((now - Duration::hours(1), now)),
        "week" => Ok((now - Duration::days(7), now)),
        "month" => Ok((now - Duration::days(30), now)),
        other => anyhow::bail!("Unknown period: {other}. Use 'hour', 'today', 'week', or 'month'"),
    }
}

/// Safely truncate a string to a maximum number of characters (not bytes).
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}
