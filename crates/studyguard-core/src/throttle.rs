use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use studyguard_storage::{ActionKind, Category};

use crate::config::{seconds, Cooldowns};
use crate::error::GuardError;

/// Minimum spacing between approved actions of each kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub encourage: Duration,
    pub warn: Duration,
    pub intervene: Duration,
    pub bypass_inappropriate_after_first: bool,
}

impl From<&Cooldowns> for CooldownPolicy {
    fn from(cooldowns: &Cooldowns) -> Self {
        Self {
            encourage: seconds(cooldowns.encourage_seconds),
            warn: seconds(cooldowns.warn_seconds),
            intervene: seconds(cooldowns.intervene_seconds),
            bypass_inappropriate_after_first: cooldowns.bypass_inappropriate_after_first,
        }
    }
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self::from(&Cooldowns::default())
    }
}

/// Per-category cool-downs; the last approval time is kept per category
#[derive(Debug, Clone, Default)]
pub struct InterventionThrottle {
    policy: CooldownPolicy,
    last_action: HashMap<Category, DateTime<Utc>>,
    inappropriate_interventions: u32,
}

impl InterventionThrottle {
    #[must_use]
    pub fn new(policy: CooldownPolicy) -> Self {
        Self {
            policy,
            last_action: HashMap::new(),
            inappropriate_interventions: 0,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    #[must_use]
    pub fn cooldown(&self, kind: ActionKind) -> Duration {
        match kind {
            ActionKind::Encourage => self.policy.encourage,
            ActionKind::Warn => self.policy.warn,
            ActionKind::Intervene => self.policy.intervene,
            ActionKind::None => Duration::zero(),
        }
    }

    #[must_use]
    pub fn last_action(&self, category: Category) -> Option<DateTime<Utc>> {
        self.last_action.get(&category).copied()
    }

    /// Earliest time an action of `kind` for `category` would be approved
    #[must_use]
    pub fn ready_at(&self, category: Category, kind: ActionKind) -> Option<DateTime<Utc>> {
        if self.bypasses(category, kind) {
            return None;
        }
        self.last_action(category)
            .map(|last| {
                last.checked_add_signed(self.cooldown(kind))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            })
    }

    fn bypasses(&self, category: Category, kind: ActionKind) -> bool {
        self.policy.bypass_inappropriate_after_first
            && category == Category::Inappropriate
            && kind == ActionKind::Intervene
            && self.inappropriate_interventions > 0
    }

    /// Check without recording anything
    ///
    /// # Errors
    ///
    /// Returns `GuardError::ThrottleRejected` while the cooldown is running
    pub fn check(
        &self,
        category: Category,
        kind: ActionKind,
        now: DateTime<Utc>,
    ) -> Result<(), GuardError> {
        match self.ready_at(category, kind) {
            Some(ready_at) if now < ready_at => Err(GuardError::ThrottleRejected {
                category,
                kind,
                ready_at,
            }),
            _ => Ok(()),
        }
    }

    /// Approve and record the action, or reject it while the cooldown is running
    pub fn approve(&mut self, category: Category, kind: ActionKind, now: DateTime<Utc>) -> bool {
        if kind.is_none() {
            return true;
        }
        if let Err(e) = self.check(category, kind, now) {
            log::debug!("{e}");
            return false;
        }
        self.record(category, kind, now);
        true
    }

    /// Record an action that already passed `check`
    pub fn record(&mut self, category: Category, kind: ActionKind, now: DateTime<Utc>) {
        debug_assert!(
            kind.is_none() || self.check(category, kind, now).is_ok(),
            "recording {kind} for {category} inside its cooldown"
        );
        if kind.is_none() {
            return;
        }
        self.last_action.insert(category, now);
        if category == Category::Inappropriate && kind == ActionKind::Intervene {
            self.inappropriate_interventions += 1;
        }
    }
}
