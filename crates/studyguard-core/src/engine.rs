#[cfg(test)]
mod tests;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use studyguard_storage::{Action, ActionCounters, ActionKind, Category, Observation, Urgency};

use crate::classifier::{host_of, Classification};
use crate::config::{seconds, GuardConfig, Thresholds, TimeoutRange, TimeoutRanges};
use crate::error::GuardError;
use crate::pattern::{PatternSnapshot, Trend};
use crate::throttle::{CooldownPolicy, InterventionThrottle};

pub const ENCOURAGE_MESSAGE: &str = "Great job staying focused on your studies!";
pub const WARN_MESSAGE: &str = "Remember to stay focused on your learning goals!";
pub const REFOCUS_MESSAGE: &str = "Time to refocus! Let's get back to productive learning.";
pub const INAPPROPRIATE_MESSAGE: &str =
    "Inappropriate content detected. Redirecting to educational resources.";

/// Urgency used when the classification carries no content signals
const NEUTRAL_URGENCY: f64 = 0.5;
const TREND_ADJUSTMENT: f64 = 0.2;

/// Engine lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineState {
    /// No observation seen yet
    #[default]
    Idle,
    Observing,
    /// An action was just emitted; reverts to observing once `until` passes
    CoolingDown {
        category: Category,
        until: DateTime<Utc>,
    },
}

/// Per-session bookkeeping, owned by the engine and mutated only through it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub started_at: Option<DateTime<Utc>>,
    pub current_url: Option<String>,
    pub time_entered_current_url: Option<DateTime<Utc>>,
    pub counters: ActionCounters,
    /// Warnings emitted since the student arrived on the current URL
    pub warnings_on_current_url: u32,
}

/// Thresholds and timeout ranges the engine decides with
#[derive(Debug, Clone, PartialEq)]
pub struct EnginePolicy {
    pub inappropriate_threshold: Duration,
    pub distraction_threshold: Duration,
    pub encouragement_threshold: Duration,
    pub timeouts: TimeoutRanges,
    pub redirect_url: String,
    pub escalate_after_warnings: Option<u32>,
}

impl EnginePolicy {
    #[must_use]
    pub fn from_config(config: &GuardConfig) -> Self {
        let Thresholds {
            inappropriate_seconds,
            distraction_seconds,
            encouragement_seconds,
        } = config.thresholds;
        Self {
            inappropriate_threshold: seconds(inappropriate_seconds),
            distraction_threshold: seconds(distraction_seconds),
            encouragement_threshold: seconds(encouragement_seconds),
            timeouts: config.timeouts.clone(),
            redirect_url: config.engine.redirect_url.clone(),
            escalate_after_warnings: config.engine.escalate_after_warnings,
        }
    }
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self::from_config(&GuardConfig::default())
    }
}

/// Everything one decision looks at
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub observation: &'a Observation,
    pub classification: &'a Classification,
    pub pattern: &'a PatternSnapshot,
}

/// Result of one engine invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub category: Category,
    /// Action the rules asked for, before the throttle
    pub candidate: Action,
    pub emitted: bool,
    /// Set when the throttle rejected the candidate
    pub suppressed_until: Option<DateTime<Utc>>,
    pub time_on_site: Duration,
    pub state: EngineState,
}

impl Decision {
    /// The single action produced by this invocation
    #[must_use]
    pub fn action(&self) -> Action {
        if self.is_suppressed() {
            Action::none(format!(
                "{} suppressed by cooldown: {}",
                self.candidate.kind, self.candidate.reasoning
            ))
        } else {
            self.candidate.clone()
        }
    }

    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        !self.emitted && !self.candidate.is_none()
    }
}

/// Map an urgency in [0, 1] onto the range: 0 gives the maximum, 1 the minimum
#[must_use]
pub fn dynamic_timeout(range: TimeoutRange, urgency: f64) -> u32 {
    let urgency = if urgency.is_finite() {
        urgency.clamp(0.0, 1.0)
    } else {
        NEUTRAL_URGENCY
    };
    let span = f64::from(range.max_seconds.saturating_sub(range.min_seconds));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let reduction = (urgency * span).round() as u32;
    range.max_seconds.saturating_sub(reduction).max(range.min_seconds)
}

/// Decision state machine for one monitoring session
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    policy: EnginePolicy,
    throttle: InterventionThrottle,
    session: SessionState,
    state: EngineState,
}

impl DecisionEngine {
    #[must_use]
    pub fn new(policy: EnginePolicy, cooldowns: CooldownPolicy) -> Self {
        Self {
            policy,
            throttle: InterventionThrottle::new(cooldowns),
            session: SessionState::default(),
            state: EngineState::Idle,
        }
    }

    #[must_use]
    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(
            EnginePolicy::from_config(config),
            CooldownPolicy::from(&config.cooldowns),
        )
    }

    #[must_use]
    pub const fn session(&self) -> &SessionState {
        &self.session
    }

    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    #[must_use]
    pub const fn throttle(&self) -> &InterventionThrottle {
        &self.throttle
    }

    #[must_use]
    pub const fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    /// Time spent on the current URL, never negative
    #[must_use]
    pub fn time_on_site(&self, now: DateTime<Utc>) -> Duration {
        self.session
            .time_entered_current_url
            .map_or_else(Duration::zero, |entered| (now - entered).max(Duration::zero()))
    }

    /// Track URL changes without deciding anything
    pub fn observe(&mut self, observation: &Observation) {
        if self.session.started_at.is_none() {
            self.session.started_at = Some(observation.captured_at);
        }
        if self.session.current_url.as_deref() != Some(observation.url.as_str()) {
            log::debug!("Now on {}", host_of(&observation.url));
            self.session.current_url = Some(observation.url.clone());
            self.session.time_entered_current_url = Some(observation.captured_at);
            self.session.warnings_on_current_url = 0;
        }
        if self.state == EngineState::Idle {
            self.state = EngineState::Observing;
        }
    }

    /// Candidate action for the current session state; no side effects
    #[must_use]
    pub fn propose(&self, input: &DecisionInput<'_>, now: DateTime<Utc>) -> Action {
        let category = input.classification.category;
        let time_on_site = self.time_on_site(now);
        let host = host_of(&input.observation.url);
        let secs = time_on_site.num_seconds();

        match category {
            Category::Inappropriate if time_on_site >= self.policy.inappropriate_threshold => {
                Action {
                    kind: ActionKind::Intervene,
                    message: INAPPROPRIATE_MESSAGE.to_string(),
                    timeout_seconds: self.policy.timeouts.intervene.min_seconds,
                    reasoning: format!(
                        "Inappropriate content on {host} for {secs}s ({})",
                        input.classification.reason
                    ),
                    urgency: Urgency::High,
                    redirect_url: Some(self.policy.redirect_url.clone()),
                }
            }
            Category::Distracting if time_on_site >= self.policy.distraction_threshold => {
                let escalate = self
                    .policy
                    .escalate_after_warnings
                    .is_some_and(|n| self.session.warnings_on_current_url >= n);
                if escalate {
                    self.timed_action(
                        ActionKind::Intervene,
                        REFOCUS_MESSAGE,
                        input,
                        format!(
                            "Still on distracting site {host} for {secs}s after {} warnings",
                            self.session.warnings_on_current_url
                        ),
                    )
                } else {
                    self.timed_action(
                        ActionKind::Warn,
                        WARN_MESSAGE,
                        input,
                        format!("On distracting site {host} for {secs}s"),
                    )
                }
            }
            Category::Educational if time_on_site >= self.policy.encouragement_threshold => self
                .timed_action(
                    ActionKind::Encourage,
                    ENCOURAGE_MESSAGE,
                    input,
                    format!("Studying on {host} for {secs}s"),
                ),
            _ => Action::none(format!("{category} on {host} for {secs}s")),
        }
    }

    fn timed_action(
        &self,
        kind: ActionKind,
        message: &str,
        input: &DecisionInput<'_>,
        reasoning: String,
    ) -> Action {
        let urgency = Self::urgency_score(kind, input);
        let range = self
            .policy
            .timeouts
            .for_kind(kind)
            .unwrap_or(self.policy.timeouts.warn);
        let redirect_url = (kind == ActionKind::Intervene).then(|| self.policy.redirect_url.clone());

        Action {
            kind,
            message: message.to_string(),
            timeout_seconds: dynamic_timeout(range, urgency),
            reasoning: format!(
                "{reasoning}; focus {:.1}, trend {}",
                input.pattern.focus_score, input.pattern.trend
            ),
            urgency: Urgency::from_score(urgency),
            redirect_url,
        }
    }

    /// Content signals scaled to [0, 1], nudged by the focus trend
    fn urgency_score(kind: ActionKind, input: &DecisionInput<'_>) -> f64 {
        let signal = match kind {
            ActionKind::Encourage => input.classification.educational_value(),
            _ => input.classification.distraction_level(),
        };
        let base = signal.map_or(NEUTRAL_URGENCY, |v| f64::from(v) / 10.0);

        // Falling focus makes a correction more urgent and praise less so
        let adjustment = match (kind == ActionKind::Encourage, input.pattern.trend) {
            (_, Trend::Stable) => 0.0,
            (true, Trend::Improving) | (false, Trend::Declining) => TREND_ADJUSTMENT,
            (true, Trend::Declining) | (false, Trend::Improving) => -TREND_ADJUSTMENT,
        };
        (base + adjustment).clamp(0.0, 1.0)
    }

    /// Observe, propose, and pass the candidate through the throttle
    pub fn decide(&mut self, input: &DecisionInput<'_>, now: DateTime<Utc>) -> Decision {
        self.observe(input.observation);
        if let EngineState::CoolingDown { until, .. } = self.state {
            if now >= until {
                self.state = EngineState::Observing;
            }
        }

        let category = input.classification.category;
        let time_on_site = self.time_on_site(now);
        let candidate = self.propose(input, now);

        if candidate.is_none() {
            return Decision {
                category,
                candidate,
                emitted: false,
                suppressed_until: None,
                time_on_site,
                state: self.state,
            };
        }

        let check = self.throttle.check(category, candidate.kind, now);
        if let Err(GuardError::ThrottleRejected { ready_at, .. }) = check {
            log::info!(
                "Suppressed {} for {category} until {ready_at}: {}",
                candidate.kind,
                candidate.reasoning
            );
            self.session.counters.suppressed += 1;
            self.state = EngineState::Observing;
            return Decision {
                category,
                candidate,
                emitted: false,
                suppressed_until: Some(ready_at),
                time_on_site,
                state: self.state,
            };
        }

        self.throttle.record(category, candidate.kind, now);
        self.session.counters.record(candidate.kind);
        match candidate.kind {
            ActionKind::Warn => self.session.warnings_on_current_url += 1,
            ActionKind::Intervene => {
                self.session.time_entered_current_url = Some(now);
                self.session.warnings_on_current_url = 0;
            }
            ActionKind::Encourage | ActionKind::None => {}
        }
        self.state = EngineState::CoolingDown {
            category,
            until: now
                .checked_add_signed(self.throttle.cooldown(candidate.kind))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        log::info!(
            "Emitted {} ({}s timeout, {:?} urgency): {}",
            candidate.kind,
            candidate.timeout_seconds,
            candidate.urgency,
            candidate.reasoning
        );

        Decision {
            category,
            candidate,
            emitted: true,
            suppressed_until: None,
            time_on_site,
            state: self.state,
        }
    }
}
