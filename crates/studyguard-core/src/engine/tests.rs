use super::*;
use crate::classifier::{ClassificationSource, SiteClassifier, SiteLists};
use crate::pattern::{ClassifiedObservation, PatternAggregator};
use chrono::TimeZone;
use std::sync::Arc;
use studyguard_ai::{ContentAnalysis, ContentType};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 7, 14, 0, 0).unwrap() + Duration::seconds(secs)
}

fn classification(category: Category) -> Classification {
    Classification {
        category,
        confidence: 0.9,
        source: ClassificationSource::Rule,
        reason: format!("{category} rule"),
        analysis: None,
        degraded: false,
    }
}

/// Feed a stream through classifier, aggregator and engine the way the daemon does
struct Harness {
    classifier: SiteClassifier,
    aggregator: PatternAggregator,
    engine: DecisionEngine,
    history: Vec<ClassifiedObservation>,
}

impl Harness {
    fn new(engine: DecisionEngine) -> Self {
        Self {
            classifier: SiteClassifier::new(SiteLists::default()).unwrap(),
            aggregator: PatternAggregator::default(),
            engine,
            history: Vec::new(),
        }
    }

    fn step(&mut self, url: &str, secs: i64) -> Decision {
        let observation = Arc::new(Observation::new(url, at(secs)));
        let classification = self.classifier.classify_rules(&observation);
        self.history.push(ClassifiedObservation::new(
            observation.clone(),
            classification.clone(),
        ));
        let pattern = self.aggregator.aggregate(&self.history, at(secs));
        self.engine.decide(
            &DecisionInput {
                observation: &observation,
                classification: &classification,
                pattern: &pattern,
            },
            at(secs),
        )
    }
}

#[test]
fn test_dynamic_timeout_bounds() {
    let range = TimeoutRange::new(10, 120);
    assert_eq!(dynamic_timeout(range, 0.0), 120);
    assert_eq!(dynamic_timeout(range, 1.0), 10);
    assert_eq!(dynamic_timeout(range, 0.5), 65);
    assert_eq!(dynamic_timeout(range, 7.0), 10);
    assert_eq!(dynamic_timeout(range, -1.0), 120);
    assert!(range.contains(dynamic_timeout(range, f64::NAN)));
    assert_eq!(dynamic_timeout(TimeoutRange::new(30, 30), 0.3), 30);
}

#[test]
fn test_distracting_session_warns_once() {
    let mut harness = Harness::new(DecisionEngine::default());
    let url = "https://www.youtube.com/watch?v=abc";

    for secs in [0, 200, 400] {
        let decision = harness.step(url, secs);
        assert!(decision.candidate.is_none());
        assert_eq!(decision.category, Category::Distracting);
    }

    let decision = harness.step(url, 605);
    assert!(decision.emitted);
    let action = decision.action();
    assert_eq!(action.kind, ActionKind::Warn);
    assert_eq!(action.message, WARN_MESSAGE);
    assert!(TimeoutRange::new(10, 120).contains(action.timeout_seconds));
    assert!(action.redirect_url.is_none());
    assert_eq!(harness.engine.session().counters.warnings, 1);
    assert!(matches!(
        decision.state,
        EngineState::CoolingDown {
            category: Category::Distracting,
            ..
        }
    ));
}

#[test]
fn test_inappropriate_url_intervenes_after_threshold() {
    let mut harness = Harness::new(DecisionEngine::default());
    let url = "https://tinder.com/app/recs";

    assert!(harness.step(url, 0).candidate.is_none());
    let early = harness.step(url, 29);
    assert_eq!(early.category, Category::Inappropriate);
    assert!(early.candidate.is_none());

    let decision = harness.step(url, 30);
    assert!(decision.emitted);
    assert_eq!(decision.candidate.kind, ActionKind::Intervene);
    assert_eq!(decision.candidate.timeout_seconds, 5);
    assert_eq!(decision.candidate.urgency, Urgency::High);
    assert_eq!(decision.candidate.message, INAPPROPRIATE_MESSAGE);
    assert_eq!(
        decision.candidate.redirect_url.as_deref(),
        Some("https://www.khanacademy.org")
    );
    assert_eq!(harness.engine.session().counters.interventions, 1);
    // Intervening restarts the clock on the page
    assert_eq!(harness.engine.session().time_entered_current_url, Some(at(30)));
}

#[test]
fn test_educational_session_encourages_once() {
    let mut harness = Harness::new(DecisionEngine::default());
    let url = "https://www.khanacademy.org/math/algebra";

    for secs in [0, 75, 150, 225] {
        assert!(harness.step(url, secs).candidate.is_none());
    }
    let decision = harness.step(url, 300);
    assert!(decision.emitted);
    assert_eq!(decision.candidate.kind, ActionKind::Encourage);
    assert_eq!(decision.candidate.message, ENCOURAGE_MESSAGE);

    let again = harness.step(url, 301);
    assert_eq!(again.candidate.kind, ActionKind::Encourage);
    assert!(!again.emitted);
    assert!(again.is_suppressed());
    assert!(again.action().is_none());
    assert_eq!(again.suppressed_until, Some(at(900)));
    assert_eq!(again.state, EngineState::Observing);

    let counters = harness.engine.session().counters;
    assert_eq!(counters.encouragements, 1);
    assert_eq!(counters.suppressed, 1);
}

#[test]
fn test_thresholds_are_inclusive() {
    let mut engine = DecisionEngine::default();
    let observation = Observation::new("https://ixl.com/math", at(0));
    let classification = classification(Category::Educational);
    let pattern = PatternSnapshot::empty();
    let input = DecisionInput {
        observation: &observation,
        classification: &classification,
        pattern: &pattern,
    };
    engine.observe(&observation);

    assert!(engine.propose(&input, at(299)).is_none());
    assert_eq!(engine.propose(&input, at(300)).kind, ActionKind::Encourage);
}

#[test]
fn test_propose_is_repeatable() {
    let mut engine = DecisionEngine::default();
    let observation = Observation::new("https://reddit.com/r/all", at(0));
    let classification = classification(Category::Distracting);
    let pattern = PatternSnapshot::empty();
    let input = DecisionInput {
        observation: &observation,
        classification: &classification,
        pattern: &pattern,
    };
    engine.observe(&observation);

    let first = engine.propose(&input, at(700));
    let second = engine.propose(&input, at(700));
    assert_eq!(first, second);
    assert_eq!(first.kind, ActionKind::Warn);
}

#[test]
fn test_url_change_resets_time_on_site() {
    let mut engine = DecisionEngine::default();
    engine.observe(&Observation::new("https://youtube.com/a", at(0)));
    assert_eq!(engine.time_on_site(at(500)), Duration::seconds(500));

    engine.observe(&Observation::new("https://youtube.com/b", at(500)));
    assert_eq!(engine.time_on_site(at(700)), Duration::seconds(200));
    assert_eq!(engine.session().started_at, Some(at(0)));
}

#[test]
fn test_state_transitions() {
    let mut harness = Harness::new(DecisionEngine::default());
    assert_eq!(harness.engine.state(), EngineState::Idle);

    let url = "https://ixl.com/ela";
    assert_eq!(harness.step(url, 0).state, EngineState::Observing);
    let emitted = harness.step(url, 300);
    assert_eq!(
        emitted.state,
        EngineState::CoolingDown {
            category: Category::Educational,
            until: at(900),
        }
    );
    // Still cooling down while nothing new is proposed for another site
    let other = harness.step("https://example.org", 400);
    assert!(matches!(other.state, EngineState::CoolingDown { .. }));
    assert_eq!(harness.step("https://example.org", 900).state, EngineState::Observing);
}

#[test]
fn test_escalation_after_repeated_warnings() {
    let mut config = GuardConfig::default();
    config.engine.escalate_after_warnings = Some(1);
    let mut harness = Harness::new(DecisionEngine::from_config(&config));
    let url = "https://www.tiktok.com/foryou";

    let warn = harness.step(url, 600);
    assert!(warn.candidate.is_none());
    let warn = harness.step(url, 1200);
    assert_eq!(warn.candidate.kind, ActionKind::Warn);
    assert!(warn.emitted);

    // Next eligible distracting action on the same page escalates
    let escalated = harness.step(url, 1500);
    assert_eq!(escalated.candidate.kind, ActionKind::Intervene);
    assert_eq!(escalated.candidate.message, REFOCUS_MESSAGE);
    assert!(escalated.emitted);
    assert!(TimeoutRange::new(5, 30).contains(escalated.candidate.timeout_seconds));
    assert_eq!(harness.engine.session().warnings_on_current_url, 0);
}

#[test]
fn test_urgency_follows_content_signals_and_trend() {
    let mut engine = DecisionEngine::default();
    let observation = Observation::new("https://youtube.com/shorts", at(0));
    engine.observe(&observation);

    let mut classification = classification(Category::Distracting);
    classification.analysis = Some(ContentAnalysis {
        content_type: ContentType::Entertainment,
        educational_value: 1,
        distraction_level: 9,
        description: String::from("short videos"),
    });
    let mut pattern = PatternSnapshot::empty();
    let input = DecisionInput {
        observation: &observation,
        classification: &classification,
        pattern: &pattern,
    };
    let stable = engine.propose(&input, at(600));
    assert_eq!(stable.urgency, Urgency::High);
    assert_eq!(stable.timeout_seconds, dynamic_timeout(TimeoutRange::new(10, 120), 0.9));

    pattern.trend = Trend::Improving;
    let input = DecisionInput {
        observation: &observation,
        classification: &classification,
        pattern: &pattern,
    };
    let improving = engine.propose(&input, at(600));
    assert!(improving.timeout_seconds > stable.timeout_seconds);
}

#[test]
fn test_neutral_never_acts() {
    let mut harness = Harness::new(DecisionEngine::default());
    for secs in (0..3600).step_by(15) {
        let decision = harness.step("https://weather.example.com", secs);
        assert!(decision.action().is_none());
    }
    assert_eq!(harness.engine.session().counters, ActionCounters::default());
}

#[test]
fn test_oversized_durations_never_overflow() {
    let mut config = GuardConfig::default();
    config.thresholds.distraction_seconds = u64::MAX / 2;
    config.cooldowns.encourage_seconds = 10_000_000_000_000;
    let mut harness = Harness::new(DecisionEngine::from_config(&config));

    let url = "https://www.khanacademy.org/math";
    harness.step(url, 0);
    let decision = harness.step(url, 300);
    assert!(decision.emitted);
    let year = Duration::seconds(i64::try_from(crate::config::MAX_CONFIG_SECONDS).unwrap());
    assert_eq!(
        decision.state,
        EngineState::CoolingDown {
            category: Category::Educational,
            until: at(300) + year,
        }
    );
    assert!(harness.step(url, 301).is_suppressed());

    let distracting = harness.step("https://www.youtube.com/watch?v=abc", 400);
    assert!(distracting.candidate.is_none());
}
