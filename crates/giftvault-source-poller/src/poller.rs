//! The reconciliation task: timer, identity check, fetch, merge.

use std::time::Duration;

use chrono::Utc;
use giftvault_botapi::{FailureKind, GiftsApi};
use giftvault_store::SharedVault;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::reconcile::{ReconcileSummary, reconcile_gifts};
use crate::schedule::{PollPhase, PollSchedule, TickDecision};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub first_delay: Duration,
    /// Upper bound on gifts fetched per cycle.
    pub limit: u32,
    /// Backoff cap in ticks; 0 retries on every tick.
    pub max_backoff_ticks: u32,
    /// Consecutive unauthorized failures before the identity is reported as
    /// possibly stale; 0 disables the report.
    pub stale_identity_threshold: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            first_delay: Duration::from_secs(10),
            limit: 1000,
            max_backoff_ticks: 8,
            stale_identity_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// No connection id known yet.
    NoIdentity,
    Backoff { remaining_ticks: u32 },
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleReport {
    Skipped(SkipReason),
    Synced(ReconcileSummary),
    Failed { kind: FailureKind, error: String },
}

/// Published on the status channel after every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollerStatus {
    pub phase: PollPhase,
    pub consecutive_failures: u32,
    pub backoff_remaining_ticks: u32,
    /// The connection id has been rejected often enough to look stale.
    pub identity_suspect: bool,
    pub cycles: u64,
    pub total_inserted: u64,
    pub last_cycle: Option<CycleReport>,
    pub last_cycle_at_ms: Option<i64>,
}

pub struct ReconciliationPoller<A> {
    api: A,
    vault: SharedVault,
    config: PollerConfig,
    schedule: PollSchedule,
    status_tx: watch::Sender<PollerStatus>,
}

impl<A: GiftsApi + 'static> ReconciliationPoller<A> {
    pub fn new(api: A, vault: SharedVault, config: PollerConfig) -> Self {
        let schedule = PollSchedule::new(
            config.interval,
            config.max_backoff_ticks,
            config.stale_identity_threshold,
        );
        let (status_tx, _) = watch::channel(PollerStatus::default());
        Self {
            api,
            vault,
            config,
            schedule,
            status_tx,
        }
    }

    /// Subscribe to status updates. Take this before [`Self::spawn`].
    pub fn status(&self) -> watch::Receiver<PollerStatus> {
        self.status_tx.subscribe()
    }

    /// Run one tick. Never fails; failures are reported and logged.
    ///
    /// The vault lock is released while the upstream call is in flight.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let report = self.cycle().await;
        self.publish(&report);
        report
    }

    async fn cycle(&mut self) -> CycleReport {
        if let TickDecision::Wait { remaining_ticks } = self.schedule.on_tick() {
            tracing::debug!(remaining_ticks, "gift sync backing off");
            return CycleReport::Skipped(SkipReason::Backoff { remaining_ticks });
        }

        let identity = self
            .vault
            .lock()
            .await
            .identity
            .get()
            .map(str::to_owned);
        let Some(identity) = identity else {
            self.schedule.record_skipped();
            tracing::debug!("gift sync skipped: no business connection id yet");
            return CycleReport::Skipped(SkipReason::NoIdentity);
        };

        match self.api.list_owned_gifts(&identity, self.config.limit).await {
            Ok(gifts) => {
                let now_ms = Utc::now().timestamp_millis();
                let summary = {
                    let mut vault = self.vault.lock().await;
                    reconcile_gifts(&mut vault.records, &gifts, now_ms)
                };
                self.schedule.record_success();
                if summary.inserted > 0 {
                    tracing::info!(
                        fetched = summary.fetched,
                        "synced {} new gifts",
                        summary.inserted
                    );
                } else {
                    tracing::debug!(fetched = summary.fetched, "gift sync: nothing new");
                }
                CycleReport::Synced(summary)
            }
            Err(e) => {
                let kind = e.failure_kind();
                let verdict = self.schedule.record_failure(kind, e.retry_after());
                tracing::warn!(
                    kind = kind.as_str(),
                    consecutive_failures = self.schedule.consecutive_failures(),
                    skip_ticks = verdict.skip_ticks,
                    "gift sync failed: {e}"
                );
                if verdict.stale_identity {
                    tracing::error!(
                        connection_id = %identity,
                        consecutive_failures = self.schedule.consecutive_failures(),
                        "business connection id keeps being rejected and may be stale; \
                         set BUSINESS_CONNECTION_ID or remove the cached id and restart"
                    );
                }
                CycleReport::Failed {
                    kind,
                    error: e.to_string(),
                }
            }
        }
    }

    fn publish(&self, report: &CycleReport) {
        let inserted = match report {
            CycleReport::Synced(summary) => summary.inserted as u64,
            _ => 0,
        };
        self.status_tx.send_modify(|status| {
            status.phase = self.schedule.phase();
            status.consecutive_failures = self.schedule.consecutive_failures();
            status.backoff_remaining_ticks = self.schedule.skip_remaining();
            status.identity_suspect = self.schedule.identity_suspect();
            status.cycles += 1;
            status.total_inserted += inserted;
            status.last_cycle = Some(report.clone());
            status.last_cycle_at_ms = Some(Utc::now().timestamp_millis());
        });
    }

    /// Tick until `cancel` fires. A cycle already running when cancellation
    /// arrives completes before this returns.
    pub async fn run(mut self, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("gift sync cancelled before first run");
                return;
            }
            _ = tokio::time::sleep(self.config.first_delay) => {}
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.run_cycle().await;
        }
        tracing::info!("gift sync stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
