use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use studyguard_storage::{AiConfig, ActionKind};

use crate::classifier::SiteLists;
use crate::error::GuardError;

/// Get the local data directory for studyguard.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("studyguard");
    Ok(path)
}

/// Default location of the TOML configuration file.
///
/// # Errors
///
/// Returns an error if the config directory cannot be determined.
pub fn default_config_path() -> Result<PathBuf> {
    let mut path =
        dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Failed to get config dir"))?;
    path.push("studyguard");
    path.push("config.toml");
    Ok(path)
}

/// Upper bound for every duration read from the configuration (one year)
pub const MAX_CONFIG_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Configured seconds as a `Duration`, capped at `MAX_CONFIG_SECONDS`
#[must_use]
pub fn seconds(value: u64) -> Duration {
    let capped = i64::try_from(value.min(MAX_CONFIG_SECONDS)).unwrap_or(i64::MAX);
    Duration::try_seconds(capped).unwrap_or(Duration::MAX)
}

/// Minimum time on a page before each category triggers a candidate action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub inappropriate_seconds: u64,
    pub distraction_seconds: u64,
    pub encouragement_seconds: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            inappropriate_seconds: 30,
            distraction_seconds: 600,
            encouragement_seconds: 300,
        }
    }
}

/// Inclusive range a dynamic timeout is clamped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutRange {
    pub min_seconds: u32,
    pub max_seconds: u32,
}

impl TimeoutRange {
    #[must_use]
    pub const fn new(min_seconds: u32, max_seconds: u32) -> Self {
        Self {
            min_seconds,
            max_seconds,
        }
    }

    #[must_use]
    pub const fn contains(&self, seconds: u32) -> bool {
        seconds >= self.min_seconds && seconds <= self.max_seconds
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutRanges {
    pub encourage: TimeoutRange,
    pub warn: TimeoutRange,
    pub intervene: TimeoutRange,
}

impl Default for TimeoutRanges {
    fn default() -> Self {
        Self {
            encourage: TimeoutRange::new(30, 300),
            warn: TimeoutRange::new(10, 120),
            intervene: TimeoutRange::new(5, 30),
        }
    }
}

impl TimeoutRanges {
    #[must_use]
    pub const fn for_kind(&self, kind: ActionKind) -> Option<TimeoutRange> {
        match kind {
            ActionKind::Encourage => Some(self.encourage),
            ActionKind::Warn => Some(self.warn),
            ActionKind::Intervene => Some(self.intervene),
            ActionKind::None => None,
        }
    }
}

/// Minimum spacing between approved actions, per action kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cooldowns {
    pub encourage_seconds: u64,
    pub warn_seconds: u64,
    pub intervene_seconds: u64,
    /// Inappropriate interventions skip the cooldown after the first one in a session
    pub bypass_inappropriate_after_first: bool,
}

impl Default for Cooldowns {
    fn default() -> Self {
        Self {
            encourage_seconds: 600,
            warn_seconds: 300,
            intervene_seconds: 60,
            bypass_inappropriate_after_first: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub window_seconds: u64,
    /// Minimum focus difference between window halves to report a trend
    pub trend_epsilon: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            window_seconds: 600,
            trend_epsilon: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub tick_interval_seconds: u64,
    pub classifier_timeout_ms: u64,
    pub cache_size: usize,
    /// Navigation target attached to interventions
    pub redirect_url: String,
    /// Escalate a distracting page to intervene after this many warnings on it
    pub escalate_after_warnings: Option<u32>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 15,
            classifier_timeout_ms: 5000,
            cache_size: 100,
            redirect_url: String::from("https://www.khanacademy.org"),
            escalate_after_warnings: None,
        }
    }
}

/// Complete runtime configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub thresholds: Thresholds,
    pub timeouts: TimeoutRanges,
    pub cooldowns: Cooldowns,
    pub pattern: PatternConfig,
    pub engine: EngineSettings,
    pub sites: SiteLists,
    pub ai: AiConfig,
}

impl GuardConfig {
    /// Load configuration from a TOML file, falling back to defaults when it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if validation fails
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };

        let config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = Self::from_toml_str(&text)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            log::info!("Loaded configuration from {}", path.display());
            config
        } else {
            log::info!("No config at {}, using defaults", path.display());
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this structure
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the configuration, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        std::fs::write(path, self.to_toml_string()?)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Reject out-of-range values; meant to run once at startup
    ///
    /// # Errors
    ///
    /// Returns `GuardError::InvalidConfiguration` describing the first invalid value
    pub fn validate(&self) -> Result<(), GuardError> {
        let invalid = |msg: String| Err(GuardError::InvalidConfiguration(msg));

        let too_long = [
            ("thresholds.inappropriate_seconds", self.thresholds.inappropriate_seconds),
            ("thresholds.distraction_seconds", self.thresholds.distraction_seconds),
            ("thresholds.encouragement_seconds", self.thresholds.encouragement_seconds),
            ("cooldowns.encourage_seconds", self.cooldowns.encourage_seconds),
            ("cooldowns.warn_seconds", self.cooldowns.warn_seconds),
            ("cooldowns.intervene_seconds", self.cooldowns.intervene_seconds),
            ("pattern.window_seconds", self.pattern.window_seconds),
            ("engine.tick_interval_seconds", self.engine.tick_interval_seconds),
            ("engine.classifier_timeout_ms", self.engine.classifier_timeout_ms / 1000),
        ]
        .into_iter()
        .find(|(_, value)| *value > MAX_CONFIG_SECONDS);
        if let Some((name, value)) = too_long {
            return invalid(format!(
                "{name} is too large ({value}s, at most {MAX_CONFIG_SECONDS}s)"
            ));
        }

        if self.thresholds.distraction_seconds == 0 || self.thresholds.encouragement_seconds == 0 {
            return invalid(String::from(
                "distraction and encouragement thresholds must be positive",
            ));
        }

        for (name, range) in [
            ("encourage", self.timeouts.encourage),
            ("warn", self.timeouts.warn),
            ("intervene", self.timeouts.intervene),
        ] {
            if range.min_seconds > range.max_seconds {
                return invalid(format!(
                    "{name} timeout range is empty ({}..{})",
                    range.min_seconds, range.max_seconds
                ));
            }
        }

        let c = &self.cooldowns;
        if !(c.intervene_seconds <= c.warn_seconds && c.warn_seconds <= c.encourage_seconds) {
            return invalid(format!(
                "cooldowns must satisfy intervene <= warn <= encourage (got {} / {} / {})",
                c.intervene_seconds, c.warn_seconds, c.encourage_seconds
            ));
        }

        if self.pattern.window_seconds == 0 {
            return invalid(String::from("pattern window must be positive"));
        }
        if !self.pattern.trend_epsilon.is_finite() || self.pattern.trend_epsilon < 0.0 {
            return invalid(String::from("trend epsilon must be a non-negative number"));
        }

        if self.engine.tick_interval_seconds == 0 {
            return invalid(String::from("tick interval must be positive"));
        }
        if self.engine.classifier_timeout_ms == 0 {
            return invalid(String::from("classifier timeout must be positive"));
        }
        if !(self.engine.redirect_url.starts_with("http://")
            || self.engine.redirect_url.starts_with("https://"))
        {
            return invalid(format!(
                "redirect url must be http(s): {}",
                self.engine.redirect_url
            ));
        }
        if self.engine.escalate_after_warnings == Some(0) {
            return invalid(String::from("escalate_after_warnings must be at least 1"));
        }

        self.sites.validate()
    }
}
