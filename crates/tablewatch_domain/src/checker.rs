use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    browse::{BrowseError, Observation, PageSource, ResponseFilter},
    config::CheckConfig,
    extract::{CandidateSet, TimeExtractor},
    ledger::{LedgerStore, MemoryStore},
    notifications::{NotificationRequest, NotificationSink, TracingSink},
    time::{NotifiedKey, TimeOfDay},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Loading,
    Observing,
    Deciding,
    Notifying,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus {
    Notified,
    AlreadyNotified,
    SendFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDecision {
    pub time: TimeOfDay,
    pub key: NotifiedKey,
    pub status: SlotStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Notified(usize),
    /// Matching slots exist but every send failed.
    Undelivered(usize),
    NothingNew,
    NothingFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// One entry per matching time, ascending.
    pub decisions: Vec<SlotDecision>,
    pub attempts: u32,
    pub observations: usize,
    /// Date-confirmed candidates before window filtering.
    pub candidates: usize,
    pub persist_failures: usize,
}

impl RunReport {
    pub fn outcome(&self) -> RunOutcome {
        let sent = self.notified_times().len();
        let failed = self
            .decisions
            .iter()
            .filter(|decision| matches!(decision.status, SlotStatus::SendFailed(_)))
            .count();
        if sent > 0 {
            RunOutcome::Notified(sent)
        } else if failed > 0 {
            RunOutcome::Undelivered(failed)
        } else if self.decisions.is_empty() {
            RunOutcome::NothingFound
        } else {
            RunOutcome::NothingNew
        }
    }

    pub fn notified_times(&self) -> Vec<TimeOfDay> {
        self.decisions
            .iter()
            .filter(|decision| decision.status == SlotStatus::Notified)
            .map(|decision| decision.time)
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("availability check failed after retry: {second} (first attempt: {first})")]
    RetryExhausted {
        first: BrowseError,
        #[source]
        second: BrowseError,
    },
}

pub struct AvailabilityChecker {
    config: CheckConfig,
    extractor: TimeExtractor,
    filter: ResponseFilter,
    sink: Box<dyn NotificationSink>,
    store: Box<dyn LedgerStore>,
    state: RunState,
}

pub struct AvailabilityCheckerBuilder {
    config: CheckConfig,
    sink: Option<Box<dyn NotificationSink>>,
    store: Option<Box<dyn LedgerStore>>,
    trust_dated_text: bool,
}

impl AvailabilityCheckerBuilder {
    pub fn new(config: CheckConfig) -> Self {
        Self {
            config,
            sink: None,
            store: None,
            trust_dated_text: false,
        }
    }

    pub fn with_notification_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_ledger_store(mut self, store: Box<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn trust_dated_text(mut self, trust: bool) -> Self {
        self.trust_dated_text = trust;
        self
    }

    /// Missing collaborators fall back to a logging sink and an in-memory ledger.
    pub fn build(self) -> AvailabilityChecker {
        let sink = self.sink.unwrap_or_else(|| {
            debug!("no notification sink configured, logging only");
            Box::new(TracingSink)
        });
        let store = self.store.unwrap_or_else(|| {
            debug!("no ledger store configured, keeping ledger in memory");
            Box::new(MemoryStore::new())
        });
        let extractor =
            TimeExtractor::new(self.config.target_date()).trust_dated_text(self.trust_dated_text);
        AvailabilityChecker {
            config: self.config,
            extractor,
            filter: ResponseFilter,
            sink,
            store,
            state: RunState::Idle,
        }
    }
}

impl AvailabilityChecker {
    pub fn builder(config: CheckConfig) -> AvailabilityCheckerBuilder {
        AvailabilityCheckerBuilder::new(config)
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// State reached by the most recent run.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs one check. A failure while loading or observing restarts the
    /// whole run once; a second failure is returned.
    #[instrument(skip_all, fields(date = %self.config.target_date(), window = %self.config.window()))]
    pub fn run(&mut self, source: &mut dyn PageSource) -> Result<RunReport, CheckError> {
        let first = match self.attempt(source) {
            Ok(report) => return Ok(report),
            Err(err) => err,
        };
        warn!(err = %first, "check failed, restarting run");
        match self.attempt(source) {
            Ok(mut report) => {
                report.attempts = 2;
                Ok(report)
            }
            Err(second) => {
                error!(err = %second, "check failed twice, giving up");
                Err(CheckError::RetryExhausted { first, second })
            }
        }
    }

    /// Union of candidates across observations.
    pub fn candidates(&self, observations: &[Observation]) -> CandidateSet {
        let mut all = CandidateSet::new();
        for observation in observations {
            all.merge(self.extractor.extract(observation));
        }
        all
    }

    /// Date-confirmed times inside the window, ascending.
    pub fn evaluate(&self, observations: &[Observation]) -> Vec<TimeOfDay> {
        self.matching_times(&self.candidates(observations))
    }

    fn matching_times(&self, candidates: &CandidateSet) -> Vec<TimeOfDay> {
        let window = self.config.window();
        candidates
            .confirmed()
            .map(|slot| slot.time)
            .filter(|time| window.contains(*time))
            .collect()
    }

    fn attempt(&mut self, source: &mut dyn PageSource) -> Result<RunReport, BrowseError> {
        self.transition(RunState::Idle);
        self.transition(RunState::Loading);
        let mut ledger = self.store.load();
        debug!(known = ledger.len(), "ledger loaded");

        let observations = match self.observe(source) {
            Ok(observations) => observations,
            Err(err) => {
                self.transition(RunState::Failed);
                return Err(err);
            }
        };

        self.transition(RunState::Deciding);
        let candidates = self.candidates(&observations);
        let confirmed = candidates.confirmed().count();
        let matching = self.matching_times(&candidates);
        debug!(
            observations = observations.len(),
            found = candidates.len(),
            confirmed,
            matching = matching.len(),
            "candidates evaluated"
        );

        self.transition(RunState::Notifying);
        let date = self.config.target_date();
        let mut decisions = Vec::with_capacity(matching.len());
        let mut persist_failures = 0;
        for time in matching {
            let key = NotifiedKey::new(date, time);
            if ledger.is_notified(&key) {
                debug!(%key, "already notified");
                decisions.push(SlotDecision {
                    time,
                    key,
                    status: SlotStatus::AlreadyNotified,
                });
                continue;
            }

            let request = NotificationRequest::slot_available(time, date, self.config.party_size());
            let status = match self.sink.send(&request) {
                Ok(ack) => {
                    info!(%time, %key, ack = ?ack.id, "notification sent");
                    ledger.mark_notified(key.clone());
                    if let Err(err) = self.store.save(&ledger) {
                        warn!(%key, %err, "ledger not persisted, slot may be notified again");
                        persist_failures += 1;
                    }
                    SlotStatus::Notified
                }
                Err(err) => {
                    warn!(%time, %err, "notification failed, will retry next run");
                    SlotStatus::SendFailed(err.to_string())
                }
            };
            decisions.push(SlotDecision { time, key, status });
        }

        self.transition(RunState::Done);
        let report = RunReport {
            decisions,
            attempts: 1,
            observations: observations.len(),
            candidates: confirmed,
            persist_failures,
        };
        info!(outcome = ?report.outcome(), "run complete");
        Ok(report)
    }

    fn observe(&mut self, source: &mut dyn PageSource) -> Result<Vec<Observation>, BrowseError> {
        let mut page = source.load_page(self.config.target_url(), self.config.page_load_timeout())?;
        self.transition(RunState::Observing);

        let deadline = Instant::now() + self.config.observation_window();
        let mut observations = Vec::new();
        let mut skipped = 0usize;
        while Instant::now() < deadline {
            let Some(response) = page.next_response(deadline)? else {
                break;
            };
            if !self.filter.accepts(&response) {
                skipped += 1;
                continue;
            }
            if let Some(observation) = Observation::from_response(&response) {
                observations.push(observation);
            }
        }

        let text = page.read_visible_text()?;
        if !text.trim().is_empty() {
            observations.push(Observation::Text(text));
        }
        debug!(buffered = observations.len(), skipped, "observation window closed");
        Ok(observations)
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "run state");
        self.state = next;
    }
}
