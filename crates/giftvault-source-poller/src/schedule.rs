//! Poll schedule state machine: `Idle → Polling → (Idle | Backoff)`.
//!
//! Pure and tick-driven; the caller owns the timer. After `k` consecutive
//! failures the schedule skips `min(2^(k-1) - 1, max_backoff_ticks)` ticks,
//! or more when a rate limit asks for a longer wait.

use std::time::Duration;

use giftvault_botapi::FailureKind;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    #[default]
    Idle,
    Polling,
    Backoff,
}

impl PollPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Backoff => "backoff",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Poll,
    /// Tick consumed by backoff; `remaining_ticks` more will be skipped.
    Wait { remaining_ticks: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureVerdict {
    pub skip_ticks: u32,
    /// Set exactly once per run of unauthorized failures, when the run
    /// reaches the stale-identity threshold.
    pub stale_identity: bool,
}

#[derive(Debug, Clone)]
pub struct PollSchedule {
    interval: Duration,
    max_backoff_ticks: u32,
    stale_identity_threshold: u32,
    phase: PollPhase,
    consecutive_failures: u32,
    consecutive_unauthorized: u32,
    skip_remaining: u32,
}

impl PollSchedule {
    pub fn new(interval: Duration, max_backoff_ticks: u32, stale_identity_threshold: u32) -> Self {
        Self {
            interval,
            max_backoff_ticks,
            stale_identity_threshold,
            phase: PollPhase::Idle,
            consecutive_failures: 0,
            consecutive_unauthorized: 0,
            skip_remaining: 0,
        }
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// The current run of unauthorized failures has reached the threshold.
    pub fn identity_suspect(&self) -> bool {
        self.stale_identity_threshold > 0
            && self.consecutive_unauthorized >= self.stale_identity_threshold
    }

    pub fn skip_remaining(&self) -> u32 {
        self.skip_remaining
    }

    /// Advance one timer tick.
    pub fn on_tick(&mut self) -> TickDecision {
        if self.skip_remaining > 0 {
            self.skip_remaining -= 1;
            return TickDecision::Wait {
                remaining_ticks: self.skip_remaining,
            };
        }
        self.phase = PollPhase::Polling;
        TickDecision::Poll
    }

    /// A polling tick that had nothing to poll with. Not a failure: the
    /// failure count and backoff are left as they were.
    pub fn record_skipped(&mut self) {
        self.phase = if self.consecutive_failures > 0 {
            PollPhase::Backoff
        } else {
            PollPhase::Idle
        };
    }

    pub fn record_success(&mut self) {
        self.phase = PollPhase::Idle;
        self.consecutive_failures = 0;
        self.consecutive_unauthorized = 0;
        self.skip_remaining = 0;
    }

    pub fn record_failure(
        &mut self,
        kind: FailureKind,
        retry_after: Option<Duration>,
    ) -> FailureVerdict {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let mut skip = backoff_ticks(self.consecutive_failures, self.max_backoff_ticks);
        if let Some(wait) = retry_after {
            skip = skip.max(ticks_to_cover(wait, self.interval));
        }
        self.skip_remaining = skip;
        self.phase = PollPhase::Backoff;

        let stale_identity = if kind == FailureKind::Unauthorized {
            self.consecutive_unauthorized = self.consecutive_unauthorized.saturating_add(1);
            self.stale_identity_threshold > 0
                && self.consecutive_unauthorized == self.stale_identity_threshold
        } else {
            self.consecutive_unauthorized = 0;
            false
        };

        FailureVerdict {
            skip_ticks: skip,
            stale_identity,
        }
    }
}

/// Ticks to skip after `failures` consecutive failures, capped at `max`.
/// A cap of zero disables backoff.
pub fn backoff_ticks(failures: u32, max: u32) -> u32 {
    if failures == 0 || max == 0 {
        return 0;
    }
    1u32.checked_shl(failures - 1)
        .map_or(u32::MAX, |n| n - 1)
        .min(max)
}

/// Ticks to skip so the next poll lands at least `wait` from now.
pub fn ticks_to_cover(wait: Duration, interval: Duration) -> u32 {
    if interval.is_zero() {
        return 0;
    }
    let intervals = wait.as_nanos().div_ceil(interval.as_nanos());
    u32::try_from(intervals.saturating_sub(1)).unwrap_or(u32::MAX)
}
