//! Progress report over the audit log
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use studyguard_ai::AiService;
use studyguard_core::{
    Classification, ClassificationSource, ClassifiedObservation, PatternAggregator, PatternSnapshot,
};
use studyguard_storage::{
    ActionKind, AiConfig, AuditOutcome, AuditRecord, AuditStore, AuditSummary, Category,
    Observation,
};
use tabled::{Table, Tabled};

use super::helpers::{load_config, period_bounds};

#[derive(Tabled)]
struct CategoryStats {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Observations")]
    count: u32,
    #[tabled(rename = "Percentage")]
    percentage: String,
}

#[derive(Tabled)]
struct ActionStats {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Emitted")]
    count: u32,
}

pub async fn handle_report(
    period: &str,
    db_path: Option<PathBuf>,
    narrative: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = AuditStore::new(db_path)?;
    let (start, end) = period_bounds(period, Utc::now())?;

    let summary = store.summary(start, end)?;
    if summary.total_records == 0 {
        println!("No activity recorded for period: {period}");
        return Ok(());
    }

    let records = store.records_between(start, end)?;
    let aggregator = PatternAggregator::from_config(&config.pattern);
    let focus = recent_focus(&aggregator, &records);

    println!("\nStudy Activity Report: {period}");
    println!("{}", "=".repeat(32));
    println!("{}", Table::new(category_rows(&summary)));
    println!("{}", Table::new(action_rows(&summary)));
    println!(
        "\nSuppressed by cooldown: {}   Degraded classifications: {}",
        summary.suppressed, summary.degraded
    );
    println!(
        "Current focus: {:.1}/10 ({}, trend {})",
        focus.focus_score, focus.pattern, focus.trend
    );

    if narrative {
        write_narrative(&config.ai, &summary, &focus).await?;
    }
    Ok(())
}

fn category_rows(summary: &AuditSummary) -> Vec<CategoryStats> {
    let total: u32 = summary.per_category.values().sum();
    Category::ALL
        .iter()
        .map(|category| {
            let count = summary.per_category.get(category).copied().unwrap_or(0);
            let percentage = if total > 0 {
                format!("{:.1}%", f64::from(count) / f64::from(total) * 100.0)
            } else {
                String::from("0%")
            };
            CategoryStats {
                category: category.to_string(),
                count,
                percentage,
            }
        })
        .collect()
}

fn action_rows(summary: &AuditSummary) -> Vec<ActionStats> {
    [ActionKind::Encourage, ActionKind::Warn, ActionKind::Intervene]
        .iter()
        .map(|kind| ActionStats {
            action: kind.to_string(),
            count: summary.emitted.get(kind).copied().unwrap_or(0),
        })
        .collect()
}

/// Pattern over the last aggregation window of recorded classifications
fn recent_focus(aggregator: &PatternAggregator, records: &[AuditRecord]) -> PatternSnapshot {
    let history: Vec<ClassifiedObservation> = records
        .iter()
        .filter(|r| r.outcome == AuditOutcome::Classified)
        .map(|r| {
            ClassifiedObservation::new(
                Arc::new(Observation::new(r.url.clone(), r.timestamp)),
                Classification {
                    category: r.category,
                    confidence: r.confidence,
                    source: ClassificationSource::Default,
                    reason: String::from("recorded"),
                    analysis: None,
                    degraded: r.degraded,
                },
            )
        })
        .collect();
    let Some(last) = history.last() else {
        return PatternSnapshot::empty();
    };
    aggregator.aggregate(&history, last.observation.captured_at)
}

async fn write_narrative(
    ai: &AiConfig,
    summary: &AuditSummary,
    focus: &PatternSnapshot,
) -> Result<()> {
    if !ai.enabled {
        println!("\nAI is disabled; enable [ai] in the config for a written summary.");
        return Ok(());
    }
    let service = AiService::new(ai.clone()).context("Failed to create AI provider")?;

    let count = |c: Category| summary.per_category.get(&c).copied().unwrap_or(0);
    let emitted = |k: ActionKind| summary.emitted.get(&k).copied().unwrap_or(0);
    let facts = format!(
        "Educational pages: {}\nDistracting pages: {}\nInappropriate pages: {}\nOther pages: {}\n\
         Encouragements: {}\nWarnings: {}\nInterventions: {}\n\
         Current focus score: {:.1}/10, browsing pattern: {}, trend: {}",
        count(Category::Educational),
        count(Category::Distracting),
        count(Category::Inappropriate),
        count(Category::Neutral),
        emitted(ActionKind::Encourage),
        emitted(ActionKind::Warn),
        emitted(ActionKind::Intervene),
        focus.focus_score,
        focus.pattern,
        focus.trend
    );

    match service.write_progress_note(&facts).await {
        Ok(note) => println!("\n{note}"),
        Err(e) => log::warn!("Could not write progress note: {e:#}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(minute: i64, url: &str, category: Category) -> AuditRecord {
        AuditRecord::classified(
            Utc.with_ymd_and_hms(2024, 6, 3, 17, 0, 0).unwrap() + Duration::minutes(minute),
            url.to_string(),
            category,
            0.9,
            false,
        )
    }

    #[test]
    fn test_category_rows_percentages() {
        let store = AuditStore::open_in_memory().unwrap();
        for (i, category) in [Category::Educational, Category::Educational, Category::Distracting]
            .into_iter()
            .enumerate()
        {
            store
                .insert_audit_record(&record(i as i64, "https://ixl.com", category))
                .unwrap();
        }
        let start = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
        let summary = store.summary(start, start + Duration::days(1)).unwrap();
        let rows = category_rows(&summary);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].percentage, "66.7%");
        assert_eq!(rows[3].percentage, "0.0%");
    }

    #[test]
    fn test_recent_focus_uses_classified_rows() {
        let records: Vec<_> = (0..4)
            .map(|m| record(m, "https://www.khanacademy.org", Category::Educational))
            .collect();
        let focus = recent_focus(&PatternAggregator::default(), &records);
        assert_eq!(focus.total_entries, 4);
        assert!(focus.focus_score > 9.0);

        assert_eq!(
            recent_focus(&PatternAggregator::default(), &[]),
            PatternSnapshot::empty()
        );
    }
}
