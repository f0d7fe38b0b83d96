pub mod ai_classifier;
pub mod classifier;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod observation_log;
pub mod pattern;
pub mod throttle;

pub use ai_classifier::{AiClassifier, ContentAnalyzer};
pub use classifier::{host_of, Classification, ClassificationSource, SiteClassifier, SiteLists};
pub use config::GuardConfig;
pub use daemon::Daemon;
pub use engine::{Decision, DecisionEngine, DecisionInput, EngineState, SessionState};
pub use error::GuardError;
pub use observation_log::ObservationLog;
pub use pattern::{BrowsingPattern, ClassifiedObservation, PatternAggregator, PatternSnapshot, Trend};
pub use throttle::{CooldownPolicy, InterventionThrottle};
