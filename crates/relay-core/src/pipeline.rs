//! The fetch → filter → format → deliver run loop.
//!
//! One pipeline serves one (source, destination) pair. A pipeline without a
//! destination only answers on-demand requests. Cycles never overlap;
//! the only suspension points are the fetch, each delivery, and the wait
//! between cycles.

use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    cursor::{self, CursorStore},
    delivery::{DeliveryAgent, DeliveryOutcome},
    domain::{Destination, Item, ItemId},
    filter::{qualifies, FilterCriteria},
    formatting::Formatter,
    source::{ContentSource, FetchError},
};

pub const FETCH_APOLOGY: &str =
    "Sorry, I couldn't fetch any news at the moment. Please try again later.";
pub const SEND_APOLOGY: &str =
    "Sorry, I encountered an error while sending the news. Please try again later.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Filtering,
    Delivering,
}

/// What one cycle produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleMode {
    /// One message per qualifying item, oldest first.
    PerItem,
    /// One digest message for the whole batch.
    Digest,
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineSettings {
    pub poll_interval: Duration,
    /// Consecutive destination failures before escalating to `FatalError`.
    pub fatal_after: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            fatal_after: 3,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub qualified: usize,
    pub delivered: usize,
    pub fetch_error: Option<FetchError>,
    /// The outcome that ended delivery early, if any.
    pub stopped_on: Option<DeliveryOutcome>,
    pub cursor: Option<ItemId>,
}

#[derive(Debug)]
struct LoopState {
    phase: Phase,
    destination_failures: u32,
    degraded: bool,
}

pub struct Pipeline {
    source: Arc<dyn ContentSource>,
    agent: Arc<DeliveryAgent>,
    cursors: Arc<dyn CursorStore>,
    formatter: Formatter,
    criteria: FilterCriteria,
    destination: Option<Destination>,
    settings: PipelineSettings,
    state: std::sync::Mutex<LoopState>,
    cycle_lock: tokio::sync::Mutex<()>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn ContentSource>,
        agent: Arc<DeliveryAgent>,
        cursors: Arc<dyn CursorStore>,
        formatter: Formatter,
        criteria: FilterCriteria,
        destination: Option<Destination>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            agent,
            cursors,
            formatter,
            criteria,
            destination,
            settings,
            state: std::sync::Mutex::new(LoopState {
                phase: Phase::Idle,
                destination_failures: 0,
                degraded: false,
            }),
            cycle_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    fn destination_label(&self) -> String {
        self.destination
            .as_ref()
            .map_or_else(|| "(none)".to_string(), |d| d.to_string())
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    pub fn agent(&self) -> &Arc<DeliveryAgent> {
        &self.agent
    }

    pub fn cursor_key(&self) -> String {
        cursor::cursor_key(self.source.name(), &self.destination_label())
    }

    pub fn phase(&self) -> Phase {
        self.lock_state().phase
    }

    pub fn is_degraded(&self) -> bool {
        self.lock_state().degraded
    }

    /// Continuous mode: run a cycle every `poll_interval` until `cancel` fires.
    pub async fn run(&self, mode: CycleMode, cancel: CancellationToken) {
        info!(
            source = self.source.name(),
            destination = %self.destination_label(),
            interval_secs = self.settings.poll_interval.as_secs(),
            ?mode,
            "relay loop started"
        );
        loop {
            self.run_cycle(mode).await;

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(source = self.source.name(), "relay loop stopping");
                    break;
                }
                _ = sleep(self.settings.poll_interval) => {}
            }
        }
    }

    pub async fn run_cycle(&self, mode: CycleMode) -> CycleReport {
        let report = match mode {
            CycleMode::PerItem => self.run_per_item_cycle().await,
            CycleMode::Digest => self.run_digest_cycle().await,
        };
        info!(
            source = self.source.name(),
            destination = %self.destination_label(),
            fetched = report.fetched,
            qualified = report.qualified,
            delivered = report.delivered,
            cursor = ?report.cursor.map(|c| c.0),
            stopped_on = ?report.stopped_on,
            "cycle complete"
        );
        if self.is_degraded() {
            error!(
                destination = %self.destination_label(),
                "destination is degraded; operator action required"
            );
        }
        report
    }

    /// Deliver each new qualifying item oldest-first, advancing the cursor
    /// after every successful send. The first failed delivery ends the cycle
    /// so later items keep their order.
    pub async fn run_per_item_cycle(&self) -> CycleReport {
        let Some(dest) = self.destination.clone() else {
            warn!("no destination configured; skipping cycle");
            return CycleReport::default();
        };
        let _cycle = self.cycle_lock.lock().await;
        let key = self.cursor_key();
        let mut report = CycleReport::default();

        let Some(mut items) = self.fetch_new(&key, &mut report).await else {
            return report;
        };
        items.sort_by_key(|it| it.id);

        self.set_phase(Phase::Filtering);
        let marked: Vec<(Item, bool)> = items
            .into_iter()
            .map(|it| {
                let ok = qualifies(&it, &self.criteria);
                (it, ok)
            })
            .collect();
        report.qualified = marked.iter().filter(|(_, ok)| *ok).count();

        self.set_phase(Phase::Delivering);
        for (item, ok) in marked {
            if !ok {
                debug!(id = item.id.0, "item does not qualify; skipping");
                self.advance_cursor(&key, item.id);
                continue;
            }

            let msg = self.formatter.format_single(&item, &dest);
            let outcome = self.record_outcome(self.agent.deliver(&msg).await);
            if !outcome.is_sent() {
                report.stopped_on = Some(outcome);
                break;
            }
            report.delivered += 1;
            self.advance_cursor(&key, item.id);
        }

        self.set_phase(Phase::Idle);
        report.cursor = self.cursors.get(&key);
        report
    }

    /// Deliver the oldest `max_items` new qualifying items as one digest. The
    /// cursor moves to the newest included item only if the digest was sent;
    /// overflow is picked up by the next cycle.
    pub async fn run_digest_cycle(&self) -> CycleReport {
        let Some(dest) = self.destination.clone() else {
            warn!("no destination configured; skipping cycle");
            return CycleReport::default();
        };
        let _cycle = self.cycle_lock.lock().await;
        let key = self.cursor_key();
        let mut report = CycleReport::default();

        let Some(mut items) = self.fetch_new(&key, &mut report).await else {
            return report;
        };
        // Everything up to the newest included id counts as processed, so the
        // cap must keep the oldest items.
        items.sort_by_key(|it| it.id);

        self.set_phase(Phase::Filtering);
        let selected = self.select_for_digest(items);
        report.qualified = selected.len();

        if selected.is_empty() {
            self.set_phase(Phase::Idle);
            report.cursor = self.cursors.get(&key);
            return report;
        }

        self.set_phase(Phase::Delivering);
        let msg = self.formatter.format_digest(&selected, &dest);
        let outcome = self.record_outcome(self.agent.deliver(&msg).await);
        if outcome.is_sent() {
            report.delivered = selected.len();
            if let Some(newest) = selected.iter().map(|it| it.id).max() {
                self.advance_cursor(&key, newest);
            }
        } else {
            report.stopped_on = Some(outcome);
        }

        self.set_phase(Phase::Idle);
        report.cursor = self.cursors.get(&key);
        report
    }

    /// Digest for an interactive request: unbounded by the cursor and never
    /// advancing it. Failures turn into a plain apology for the requester.
    pub async fn digest_on_demand(&self, dest: &Destination) -> DeliveryOutcome {
        let items = match self.source.fetch(None).await {
            Ok(items) => items,
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "on-demand fetch failed");
                let notice = self.formatter.notice(FETCH_APOLOGY, dest);
                return self.agent.deliver(&notice).await;
            }
        };

        let selected = self.select_for_digest(items);
        let msg = self.formatter.format_digest(&selected, dest);
        let outcome = self.agent.deliver(&msg).await;
        if !outcome.is_sent() && !outcome.is_destination_problem() {
            let notice = self.formatter.notice(SEND_APOLOGY, dest);
            let apology = self.agent.deliver(&notice).await;
            if !apology.is_sent() {
                warn!(destination = %dest, class = apology.class(), "apology not delivered");
            }
        }
        outcome
    }

    /// Forget the cursor; the next cycle fetches an unbounded window.
    pub fn reset_cursor(&self) -> crate::Result<()> {
        let key = self.cursor_key();
        self.cursors.reset(&key)?;
        info!(cursor = %key, "cursor reset");
        Ok(())
    }

    fn select_for_digest(&self, items: Vec<Item>) -> Vec<Item> {
        items
            .into_iter()
            .filter(|it| qualifies(it, &self.criteria))
            .take(self.formatter.digest.max_items)
            .collect()
    }

    /// Fetch items newer than the cursor, in provider order.
    async fn fetch_new(&self, key: &str, report: &mut CycleReport) -> Option<Vec<Item>> {
        let since = self.cursors.get(key);
        report.cursor = since;

        self.set_phase(Phase::Fetching);
        let mut items = match self.source.fetch(since).await {
            Ok(items) => items,
            Err(e) => {
                warn!(source = self.source.name(), since = ?since.map(|c| c.0), error = %e, "fetch failed; retrying next cycle");
                report.fetch_error = Some(e);
                self.set_phase(Phase::Idle);
                return None;
            }
        };
        report.fetched = items.len();

        // Providers should not return old ids, but the cursor must never
        // move backward if they do.
        items.retain(|it| since.map_or(true, |cur| it.id > cur));
        Some(items)
    }

    fn advance_cursor(&self, key: &str, id: ItemId) {
        if let Err(e) = cursor::advance(self.cursors.as_ref(), key, id) {
            error!(cursor = key, id = id.0, error = %e, "failed to persist cursor");
        }
    }

    /// Track destination health and escalate repeated destination failures.
    fn record_outcome(&self, outcome: DeliveryOutcome) -> DeliveryOutcome {
        let mut st = self.lock_state();
        match outcome {
            DeliveryOutcome::Sent => {
                if st.degraded {
                    info!(destination = %self.destination_label(), "destination recovered");
                }
                st.destination_failures = 0;
                st.degraded = false;
                outcome
            }
            o if o.is_destination_problem() => {
                st.destination_failures += 1;
                if st.destination_failures >= self.settings.fatal_after {
                    st.degraded = true;
                    error!(
                        destination = %self.destination_label(),
                        class = o.class(),
                        failures = st.destination_failures,
                        "destination failing repeatedly; marking degraded"
                    );
                    DeliveryOutcome::FatalError
                } else {
                    o
                }
            }
            DeliveryOutcome::FatalError => {
                st.degraded = true;
                error!(destination = %self.destination_label(), "fatal delivery error; marking degraded");
                outcome
            }
            other => other,
        }
    }

    fn set_phase(&self, phase: Phase) {
        self.lock_state().phase = phase;
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
