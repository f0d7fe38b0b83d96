#[cfg(test)]
mod tests;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use studyguard_storage::{Category, Observation};

use crate::classifier::{host_of, Classification};
use crate::config::{seconds, PatternConfig};
use crate::error::GuardError;

/// An observation together with the category attached to it
#[derive(Debug, Clone)]
pub struct ClassifiedObservation {
    pub observation: Arc<Observation>,
    pub classification: Classification,
}

impl ClassifiedObservation {
    #[must_use]
    pub fn new(observation: Arc<Observation>, classification: Classification) -> Self {
        Self {
            observation,
            classification,
        }
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.classification.category
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowsingPattern {
    FocusedStudy,
    HeavyDistraction,
    ScatteredBrowsing,
    MixedActivity,
    NoData,
}

impl BrowsingPattern {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FocusedStudy => "focused_study",
            Self::HeavyDistraction => "heavy_distraction",
            Self::ScatteredBrowsing => "scattered_browsing",
            Self::MixedActivity => "mixed_activity",
            Self::NoData => "no_data",
        }
    }
}

impl fmt::Display for BrowsingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of focus between the older and newer half of the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

impl Trend {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
            Self::Stable => "stable",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Browsing metrics over the rolling window; recomputed, never stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSnapshot {
    /// 0 to 10
    pub focus_score: f64,
    pub educational_ratio: f64,
    pub distraction_ratio: f64,
    pub site_switch_count: usize,
    pub unique_site_count: usize,
    pub total_entries: usize,
    pub pattern: BrowsingPattern,
    pub trend: Trend,
}

impl PatternSnapshot {
    /// Neutral defaults for a window without observations
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            focus_score: 5.0,
            educational_ratio: 0.0,
            distraction_ratio: 0.0,
            site_switch_count: 0,
            unique_site_count: 0,
            total_entries: 0,
            pattern: BrowsingPattern::NoData,
            trend: Trend::Stable,
        }
    }
}

impl Default for PatternSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Focus on a 0-10 scale; 10 for a fully educational window with no site switches
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn focus_score(site_switches: usize, total_entries: usize, educational_ratio: f64) -> f64 {
    if total_entries == 0 {
        return PatternSnapshot::empty().focus_score;
    }
    let switch_penalty = (site_switches as f64 / total_entries as f64).clamp(0.0, 1.0);
    let educational_ratio = educational_ratio.clamp(0.0, 1.0);
    (10.0 * (1.0 - switch_penalty) * (0.5 + 0.5 * educational_ratio)).clamp(0.0, 10.0)
}

struct WindowCounts {
    switches: usize,
    unique_sites: usize,
    educational: usize,
    distracting: usize,
}

fn count(entries: &[ClassifiedObservation]) -> WindowCounts {
    let hosts: Vec<String> = entries
        .iter()
        .map(|e| host_of(&e.observation.url))
        .collect();
    let switches = hosts.windows(2).filter(|pair| pair[0] != pair[1]).count();
    let unique_sites = hosts.iter().collect::<HashSet<_>>().len();
    let educational = entries
        .iter()
        .filter(|e| e.category() == Category::Educational)
        .count();
    let distracting = entries
        .iter()
        .filter(|e| e.category() == Category::Distracting)
        .count();

    WindowCounts {
        switches,
        unique_sites,
        educational,
        distracting,
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

fn focus_of(entries: &[ClassifiedObservation]) -> f64 {
    let counts = count(entries);
    focus_score(
        counts.switches,
        entries.len(),
        ratio(counts.educational, entries.len()),
    )
}

/// Rolling-window aggregation of classified observations
#[derive(Debug, Clone)]
pub struct PatternAggregator {
    window: Duration,
    trend_epsilon: f64,
}

impl Default for PatternAggregator {
    fn default() -> Self {
        Self::from_config(&PatternConfig::default())
    }
}

impl PatternAggregator {
    #[must_use]
    pub const fn new(window: Duration, trend_epsilon: f64) -> Self {
        Self {
            window,
            trend_epsilon,
        }
    }

    #[must_use]
    pub fn from_config(config: &PatternConfig) -> Self {
        Self::new(seconds(config.window_seconds), config.trend_epsilon)
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Snapshot of the entries captured in `(now - window, now]`; empty windows
    /// yield the neutral defaults
    #[must_use]
    pub fn aggregate(
        &self,
        history: &[ClassifiedObservation],
        now: DateTime<Utc>,
    ) -> PatternSnapshot {
        let cutoff = now
            .checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let in_window: Vec<ClassifiedObservation> = history
            .iter()
            .filter(|e| e.observation.captured_at > cutoff && e.observation.captured_at <= now)
            .cloned()
            .collect();

        match self.summarize(&in_window) {
            Ok(snapshot) => snapshot,
            Err(GuardError::EmptyWindow) => PatternSnapshot::empty(),
            Err(e) => {
                log::warn!("Pattern aggregation failed: {e}");
                PatternSnapshot::empty()
            }
        }
    }

    /// Metrics over exactly these entries, oldest first
    ///
    /// # Errors
    ///
    /// Returns `GuardError::EmptyWindow` when there is nothing to summarize
    pub fn summarize(
        &self,
        entries: &[ClassifiedObservation],
    ) -> Result<PatternSnapshot, GuardError> {
        if entries.is_empty() {
            return Err(GuardError::EmptyWindow);
        }

        let total = entries.len();
        let counts = count(entries);
        let educational_ratio = ratio(counts.educational, total);
        let distraction_ratio = ratio(counts.distracting, total);

        let pattern = if educational_ratio > 0.7 {
            BrowsingPattern::FocusedStudy
        } else if distraction_ratio > 0.6 {
            BrowsingPattern::HeavyDistraction
        } else if counts.switches * 2 > total {
            BrowsingPattern::ScatteredBrowsing
        } else {
            BrowsingPattern::MixedActivity
        };

        Ok(PatternSnapshot {
            focus_score: focus_score(counts.switches, total, educational_ratio),
            educational_ratio,
            distraction_ratio,
            site_switch_count: counts.switches,
            unique_site_count: counts.unique_sites,
            total_entries: total,
            pattern,
            trend: self.trend(entries),
        })
    }

    fn trend(&self, entries: &[ClassifiedObservation]) -> Trend {
        if entries.len() < 2 {
            return Trend::Stable;
        }
        let (older, newer) = entries.split_at(entries.len() / 2);
        let delta = focus_of(newer) - focus_of(older);
        if delta > self.trend_epsilon {
            Trend::Improving
        } else if delta < -self.trend_epsilon {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }
}
