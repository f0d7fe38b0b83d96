use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use studyguard_storage::{Action, ActionKind, AuditOutcome, AuditRecord, AuditSink, Observation};
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::classifier::{Classification, SiteClassifier};
use crate::config::GuardConfig;
use crate::engine::{Decision, DecisionEngine, DecisionInput, SessionState};
use crate::observation_log::ObservationLog;
use crate::pattern::{ClassifiedObservation, PatternAggregator, PatternSnapshot};

/// Engine task: reads the observation log on a fixed cadence and emits actions
pub struct Daemon {
    log: ObservationLog,
    classifier: SiteClassifier,
    aggregator: PatternAggregator,
    engine: DecisionEngine,
    audit: Arc<dyn AuditSink>,
    actions: mpsc::Sender<Action>,
    history: Vec<ClassifiedObservation>,
    last_sequence: u64,
    tick_interval_seconds: u64,
    shutdown_signal: Arc<AtomicBool>,
}

impl Daemon {
    #[must_use]
    pub fn new(
        config: &GuardConfig,
        log: ObservationLog,
        classifier: SiteClassifier,
        audit: Arc<dyn AuditSink>,
        actions: mpsc::Sender<Action>,
    ) -> Self {
        Self {
            log,
            classifier,
            aggregator: PatternAggregator::from_config(&config.pattern),
            engine: DecisionEngine::from_config(config),
            audit,
            actions,
            history: Vec::new(),
            last_sequence: 0,
            tick_interval_seconds: config.engine.tick_interval_seconds,
            shutdown_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops `run` after the current tick
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown_signal.clone()
    }

    #[must_use]
    pub const fn session(&self) -> &SessionState {
        self.engine.session()
    }

    #[must_use]
    pub const fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Current pattern over the retained history
    #[must_use]
    pub fn pattern(&self, now: DateTime<Utc>) -> PatternSnapshot {
        self.aggregator.aggregate(&self.history, now)
    }

    /// Tick until ctrl-c, the shutdown flag, or the action receiver going away
    ///
    /// # Errors
    ///
    /// Only returns an error if shutting down fails; tick failures are logged
    pub async fn run(&mut self) -> Result<()> {
        let mut interval = interval(Duration::from_secs(self.tick_interval_seconds));
        log::info!(
            "Decision engine started, ticking every {}s",
            self.tick_interval_seconds
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        log::error!("Engine tick failed: {e:#}");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received Ctrl-C, shutting down...");
                    self.shutdown_signal.store(true, Ordering::SeqCst);
                }
            }

            if self.actions.is_closed() {
                log::info!("Action receiver closed, shutting down...");
                self.shutdown_signal.store(true, Ordering::SeqCst);
            }
            if self.shutdown_signal.load(Ordering::SeqCst) {
                break;
            }
        }

        let counters = self.engine.session().counters;
        log::info!(
            "Engine stopped: {} encouragements, {} warnings, {} interventions, {} suppressed",
            counters.encouragements,
            counters.warnings,
            counters.interventions,
            counters.suppressed
        );
        Ok(())
    }

    /// One engine pass: classify what the monitor appended since the last pass,
    /// then decide on the most recent observation
    ///
    /// # Errors
    ///
    /// Returns an error if an emitted action cannot be delivered
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<Option<Decision>> {
        let fresh = self.log.since(self.last_sequence);
        if let Some((latest, earlier)) = fresh.split_last() {
            // Catch-up entries get the rule stage only
            for observation in earlier {
                let classification = self.classifier.classify_rules(observation);
                self.record_classified(observation, &classification);
                self.engine.observe(observation);
                self.history
                    .push(ClassifiedObservation::new(observation.clone(), classification));
            }

            let classification = self.classifier.classify(latest).await;
            self.record_classified(latest, &classification);
            self.history
                .push(ClassifiedObservation::new(latest.clone(), classification));
            self.last_sequence = latest.sequence;
        }

        let Some(current) = self.history.last().cloned() else {
            return Ok(None);
        };
        self.trim_history(now);

        let pattern = self.aggregator.aggregate(&self.history, now);
        let mut decision = self.engine.decide(
            &DecisionInput {
                observation: &current.observation,
                classification: &current.classification,
                pattern: &pattern,
            },
            now,
        );

        if decision.emitted && decision.candidate.kind == ActionKind::Intervene {
            if let Some(url) = self.classifier.suggest_alternative(&current.observation).await {
                log::info!("Redirecting to suggested {url}");
                decision.candidate.redirect_url = Some(url);
            }
        }

        if !decision.candidate.is_none() {
            let outcome = if decision.emitted {
                AuditOutcome::Emitted
            } else {
                AuditOutcome::Suppressed
            };
            let record = Self::base_record(now, &current.observation, &current.classification)
                .with_action(&decision.candidate, outcome)
                .with_counters(self.engine.session().counters);
            self.write_audit(&record);
        }

        if decision.emitted {
            self.actions
                .send(decision.candidate.clone())
                .await
                .context("Action receiver closed")?;
        }

        Ok(Some(decision))
    }

    fn base_record(
        timestamp: DateTime<Utc>,
        observation: &Observation,
        classification: &Classification,
    ) -> AuditRecord {
        AuditRecord::classified(
            timestamp,
            observation.url.clone(),
            classification.category,
            classification.confidence,
            classification.degraded,
        )
    }

    fn record_classified(&self, observation: &Observation, classification: &Classification) {
        let record = Self::base_record(observation.captured_at, observation, classification)
            .with_counters(self.engine.session().counters);
        self.write_audit(&record);
    }

    fn write_audit(&self, record: &AuditRecord) {
        if let Err(e) = self.audit.record(record) {
            log::error!("Failed to write audit record for {}: {e:#}", record.url);
        }
    }

    /// Drop entries older than the aggregation window, keeping the current one
    fn trim_history(&mut self, now: DateTime<Utc>) {
        let cutoff = now
            .checked_sub_signed(self.aggregator.window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let keep_from = self
            .history
            .iter()
            .position(|e| e.observation.captured_at > cutoff)
            .unwrap_or(self.history.len())
            .min(self.history.len().saturating_sub(1));
        self.history.drain(..keep_from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_classifier::ContentAnalyzer;
    use crate::classifier::SiteLists;
    use studyguard_ai::{parse_suggested_url, ContentAnalysis, PageContext};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use studyguard_storage::{ActionKind, AuditStore, Category};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 4, 10, 0, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    fn daemon(store: Arc<AuditStore>) -> (Daemon, ObservationLog, mpsc::Receiver<Action>) {
        daemon_with(store, SiteClassifier::new(SiteLists::default()).unwrap())
    }

    fn daemon_with(
        store: Arc<AuditStore>,
        classifier: SiteClassifier,
    ) -> (Daemon, ObservationLog, mpsc::Receiver<Action>) {
        let config = GuardConfig::default();
        let log = ObservationLog::new();
        let (tx, rx) = mpsc::channel(16);
        let daemon = Daemon::new(&config, log.clone(), classifier, store, tx);
        (daemon, log, rx)
    }

    /// Analyzer whose only opinion is where to redirect
    struct Redirector(&'static str);

    #[async_trait::async_trait]
    impl ContentAnalyzer for Redirector {
        async fn analyze(&self, _page: &PageContext) -> anyhow::Result<ContentAnalysis> {
            anyhow::bail!("no analysis")
        }

        async fn suggest_alternative(&self, _page: &PageContext) -> anyhow::Result<Option<String>> {
            Ok(parse_suggested_url(self.0))
        }
    }

    async fn intervene_with(analyzer: Option<Redirector>) -> Action {
        let mut classifier = SiteClassifier::new(SiteLists::default()).unwrap();
        if let Some(analyzer) = analyzer {
            classifier = classifier.with_analyzer(Arc::new(analyzer), Duration::from_millis(50));
        }
        let store = Arc::new(AuditStore::open_in_memory().unwrap());
        let (mut daemon, log, mut rx) = daemon_with(store, classifier);
        log.append(Observation::new("https://tinder.com/app", at(0)));
        daemon.tick(at(0)).await.unwrap();
        log.append(Observation::new("https://tinder.com/app", at(30)));
        daemon.tick(at(30)).await.unwrap();
        rx.try_recv().unwrap()
    }

    #[tokio::test]
    async fn test_tick_without_observations() {
        let store = Arc::new(AuditStore::open_in_memory().unwrap());
        let (mut daemon, _log, _rx) = daemon(store);
        assert!(daemon.tick(at(0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_distracting_stream_emits_warning() {
        let store = Arc::new(AuditStore::open_in_memory().unwrap());
        let (mut daemon, log, mut rx) = daemon(store.clone());

        for secs in [0, 200, 400, 605] {
            log.append(Observation::new("https://www.youtube.com/watch?v=abc", at(secs)));
            daemon.tick(at(secs)).await.unwrap();
        }

        let action = rx.try_recv().unwrap();
        assert_eq!(action.kind, ActionKind::Warn);
        assert!((10..=120).contains(&action.timeout_seconds));
        assert!(rx.try_recv().is_err());
        assert_eq!(daemon.session().counters.warnings, 1);

        let records = store.recent_records(100).unwrap();
        let classified = records
            .iter()
            .filter(|r| r.outcome == AuditOutcome::Classified)
            .count();
        let emitted: Vec<_> = records
            .iter()
            .filter(|r| r.outcome == AuditOutcome::Emitted)
            .collect();
        assert_eq!(classified, 4);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].category, Category::Distracting);
        assert_eq!(emitted[0].counters.warnings, 1);
    }

    #[tokio::test]
    async fn test_batch_appends_are_all_classified() {
        let store = Arc::new(AuditStore::open_in_memory().unwrap());
        let (mut daemon, log, mut rx) = daemon(store.clone());

        log.append(Observation::new("https://tinder.com/app", at(0)));
        log.append(Observation::new("https://tinder.com/app", at(15)));
        log.append(Observation::new("https://tinder.com/app", at(30)));
        let decision = daemon.tick(at(30)).await.unwrap().unwrap();

        assert!(decision.emitted);
        assert_eq!(decision.candidate.kind, ActionKind::Intervene);
        assert_eq!(rx.try_recv().unwrap().kind, ActionKind::Intervene);
        assert_eq!(store.recent_records(100).unwrap().len(), 4);

        // Nothing new: the engine still decides on the latest observation
        let idle = daemon.tick(at(45)).await.unwrap().unwrap();
        assert!(idle.candidate.is_none());
    }

    #[tokio::test]
    async fn test_intervention_uses_suggested_redirect() {
        let action = intervene_with(Some(Redirector("https://www.ixl.com/math"))).await;
        assert_eq!(action.kind, ActionKind::Intervene);
        assert_eq!(action.redirect_url.as_deref(), Some("https://www.ixl.com/math"));
    }

    #[tokio::test]
    async fn test_intervention_falls_back_to_configured_redirect() {
        let fallback = GuardConfig::default().engine.redirect_url;

        let unusable = intervene_with(Some(Redirector("Maybe try a math site"))).await;
        assert_eq!(unusable.redirect_url.as_deref(), Some(fallback.as_str()));

        let without_analyzer = intervene_with(None).await;
        assert_eq!(without_analyzer.redirect_url.as_deref(), Some(fallback.as_str()));
    }

    #[tokio::test]
    async fn test_suppressed_actions_are_audited() {
        let store = Arc::new(AuditStore::open_in_memory().unwrap());
        let (mut daemon, log, mut rx) = daemon(store.clone());

        for secs in [0, 75, 150, 225, 300, 301] {
            log.append(Observation::new("https://www.khanacademy.org/math", at(secs)));
            daemon.tick(at(secs)).await.unwrap();
        }

        assert_eq!(rx.try_recv().unwrap().kind, ActionKind::Encourage);
        assert!(rx.try_recv().is_err());
        let summary = store.summary(at(0), at(400)).unwrap();
        assert_eq!(summary.suppressed, 1);
        assert_eq!(summary.emitted.get(&ActionKind::Encourage), Some(&1));
    }

    #[tokio::test]
    async fn test_history_trimmed_to_window() {
        let store = Arc::new(AuditStore::open_in_memory().unwrap());
        let (mut daemon, log, _rx) = daemon(store);

        for secs in (0..2000).step_by(100) {
            log.append(Observation::new("https://ixl.com/math", at(secs)));
            daemon.tick(at(secs)).await.unwrap();
        }
        assert!(daemon.history.len() <= 7);
        assert!(daemon.pattern(at(1900)).total_entries > 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_flag() {
        let store = Arc::new(AuditStore::open_in_memory().unwrap());
        let (mut daemon, _log, _rx) = daemon(store);
        daemon.shutdown_handle().store(true, Ordering::SeqCst);
        daemon.run().await.unwrap();
    }
}
