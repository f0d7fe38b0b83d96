//! Feed a recorded observation stream through the pipeline
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use studyguard_core::{Daemon, GuardConfig, ObservationLog, PatternSnapshot};
use studyguard_storage::{Action, ActionCounters, AuditStore};
use tabled::{Table, Tabled};
use tokio::sync::mpsc;

use super::helpers::{build_classifier, load_config, parse_observation_line, truncate_str};

#[derive(Debug, Tabled)]
struct DecisionRow {
    #[tabled(rename = "At (s)")]
    offset_seconds: i64,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Timeout")]
    timeout: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Debug)]
pub struct ReplayOutcome {
    rows: Vec<DecisionRow>,
    emitted: Vec<Action>,
    counters: ActionCounters,
    pattern: PatternSnapshot,
}

pub async fn handle_replay(
    file: &Path,
    config_path: Option<&Path>,
    use_ai: bool,
    json: bool,
    db_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if !use_ai {
        config.ai.enabled = false;
    }
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let store = match db_path {
        Some(path) => AuditStore::new(Some(path))?,
        None => AuditStore::open_in_memory()?,
    };

    let outcome = replay_lines(&config, &text, Arc::new(store)).await?;

    if json {
        for action in &outcome.emitted {
            println!("{}", serde_json::to_string(action)?);
        }
        return Ok(());
    }

    if outcome.rows.is_empty() {
        println!("No actions proposed for {}", file.display());
    } else {
        println!("{}", Table::new(&outcome.rows));
    }
    let c = outcome.counters;
    println!(
        "\nEmitted: {} encouragements, {} warnings, {} interventions ({} suppressed)",
        c.encouragements, c.warnings, c.interventions, c.suppressed
    );
    let p = &outcome.pattern;
    println!(
        "Final window: focus {:.1}/10, {} ({}), {} site switches across {} sites",
        p.focus_score, p.pattern, p.trend, p.site_switch_count, p.unique_site_count
    );
    Ok(())
}

/// Replay JSON lines, ticking the engine at each observation's own timestamp
pub async fn replay_lines(
    config: &GuardConfig,
    text: &str,
    store: Arc<AuditStore>,
) -> Result<ReplayOutcome> {
    let classifier = build_classifier(config)?;
    let log = ObservationLog::new();
    let (tx, mut rx) = mpsc::channel(4);
    let mut daemon = Daemon::new(config, log.clone(), classifier, store, tx);

    let mut rows = Vec::new();
    let mut emitted = Vec::new();
    let mut started: Option<DateTime<Utc>> = None;
    let mut last_time = None;

    for (idx, line) in text.lines().enumerate() {
        let observation = parse_observation_line(line, None)
            .with_context(|| format!("Line {}", idx + 1))?;
        let Some(observation) = observation else {
            continue;
        };
        let now = observation.captured_at;
        let start = *started.get_or_insert(now);
        last_time = Some(now);
        let observation = log.append(observation);

        let Some(decision) = daemon.tick(now).await? else {
            continue;
        };
        while let Ok(action) = rx.try_recv() {
            emitted.push(action);
        }
        if decision.candidate.is_none() {
            continue;
        }

        let candidate = &decision.candidate;
        rows.push(DecisionRow {
            offset_seconds: (now - start).num_seconds(),
            url: truncate_str(&observation.url, 40),
            category: decision.category.to_string(),
            action: candidate.kind.to_string(),
            outcome: if decision.emitted {
                String::from("emitted")
            } else {
                String::from("suppressed")
            },
            timeout: format!("{}s", candidate.timeout_seconds),
            message: candidate.message.clone(),
        });
    }

    Ok(ReplayOutcome {
        rows,
        emitted,
        counters: daemon.session().counters,
        pattern: daemon.pattern(last_time.unwrap_or_else(Utc::now)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyguard_storage::ActionKind;

    fn stream(url: &str, seconds: &[i64]) -> String {
        seconds
            .iter()
            .map(|s| {
                let at = chrono::DateTime::parse_from_rfc3339("2024-05-20T16:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc)
                    + chrono::Duration::seconds(*s);
                format!(r#"{{"captured_at":"{}","url":"{url}"}}"#, at.to_rfc3339())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn test_replay_educational_stream() {
        let text = stream("https://www.khanacademy.org/math", &[0, 75, 150, 225, 300, 301]);
        let store = Arc::new(AuditStore::open_in_memory().unwrap());
        let outcome = replay_lines(&GuardConfig::default(), &text, store)
            .await
            .unwrap();

        assert_eq!(outcome.emitted.len(), 1);
        assert_eq!(outcome.emitted[0].kind, ActionKind::Encourage);
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.rows[1].outcome, "suppressed");
        assert_eq!(outcome.counters.encouragements, 1);
        assert!(outcome.pattern.focus_score > 9.0);
    }

    #[tokio::test]
    async fn test_replay_rejects_bad_lines() {
        let store = Arc::new(AuditStore::open_in_memory().unwrap());
        let err = replay_lines(&GuardConfig::default(), "{\"url\": 5}", store)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Line 1"));
    }

    #[tokio::test]
    async fn test_replay_file_with_audit_db() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("session.jsonl");
        std::fs::write(&file, stream("https://tinder.com/app", &[0, 15, 30])).unwrap();
        let db = dir.path().join("audit.db");

        handle_replay(&file, Some(&dir.path().join("none.toml")), false, true, Some(db.clone()))
            .await
            .unwrap();

        let store = AuditStore::new(Some(db)).unwrap();
        let records = store.recent_records(10).unwrap();
        assert!(records
            .iter()
            .any(|r| r.action_kind == ActionKind::Intervene));
    }
}
