use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use studyguard_storage::Observation;

#[derive(Debug, Default)]
struct LogInner {
    entries: Vec<Arc<Observation>>,
    last_sequence: u64,
}

/// Append-only, ordered log of observations
///
/// The monitor is the single writer; every reader works on snapshot copies so
/// appends never wait on an aggregation pass. Cloning the handle shares the log.
#[derive(Debug, Clone, Default)]
pub struct ObservationLog {
    inner: Arc<RwLock<LogInner>>,
}

impl ObservationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, LogInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an observation, assigning the next sequence number
    pub fn append(&self, mut observation: Observation) -> Arc<Observation> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = inner.entries.last() {
            if observation.captured_at < last.captured_at {
                log::warn!(
                    "Observation for {} is older than the previous one ({} < {})",
                    observation.url,
                    observation.captured_at,
                    last.captured_at
                );
            }
        }
        inner.last_sequence += 1;
        observation.sequence = inner.last_sequence;
        let entry = Arc::new(observation);
        inner.entries.push(entry.clone());
        entry
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    #[must_use]
    pub fn latest(&self) -> Option<Arc<Observation>> {
        self.read().entries.last().cloned()
    }

    /// Copy of the whole log at read time
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Observation>> {
        self.read().entries.clone()
    }

    /// Observations appended after `sequence`
    #[must_use]
    pub fn since(&self, sequence: u64) -> Vec<Arc<Observation>> {
        let inner = self.read();
        // Sequences are dense and start at 1, so the index is sequence itself
        let start = usize::try_from(sequence).unwrap_or(usize::MAX);
        inner.entries.get(start..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Observations captured in `(now - window, now]`
    #[must_use]
    pub fn window(&self, now: DateTime<Utc>, window: Duration) -> Vec<Arc<Observation>> {
        let cutoff = now
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.read()
            .entries
            .iter()
            .filter(|o| o.captured_at > cutoff && o.captured_at <= now)
            .cloned()
            .collect()
    }
}
