//! Update pump: long-polls the Bot API and feeds every update to the
//! ingestor.

use std::time::Duration;

use giftvault_botapi::UpdateSource;
use giftvault_source_events::EventIngestor;
use giftvault_store::SharedVault;
use tokio_util::sync::CancellationToken;

const DEBUG_LOG_THRESHOLD: u32 = 10;

#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Server-side long-poll timeout.
    pub long_poll_secs: u64,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            long_poll_secs: 30,
            initial_backoff: Duration::from_secs(3),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Pull updates until `cancel` fires.
///
/// The offset advances past every delivered update, gift or not. Fetch
/// errors back off exponentially (doubling, capped at `max_backoff`); a
/// rate limit waits at least its `retry_after`. After 10 consecutive
/// failures errors are logged at debug instead of warn.
pub async fn run_update_pump<S: UpdateSource>(
    source: S,
    ingestor: EventIngestor,
    vault: SharedVault,
    cancel: CancellationToken,
    config: PumpConfig,
) {
    let mut offset: i64 = 0;
    let mut backoff = config.initial_backoff;
    let mut consecutive_failures: u32 = 0;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = source.get_updates(offset, config.long_poll_secs) => result,
        };

        let err = match result {
            Ok(updates) => {
                if consecutive_failures > 0 {
                    tracing::info!(consecutive_failures, "update stream recovered");
                }
                backoff = config.initial_backoff;
                consecutive_failures = 0;
                for update in &updates {
                    offset = offset.max(update.update_id.saturating_add(1));
                    ingestor.ingest_shared(update, &vault).await;
                }
                continue;
            }
            Err(e) => e,
        };

        consecutive_failures = consecutive_failures.saturating_add(1);
        if consecutive_failures >= DEBUG_LOG_THRESHOLD {
            tracing::debug!(consecutive_failures, kind = %err.failure_kind(), "getUpdates failed: {err}");
        } else {
            tracing::warn!(consecutive_failures, kind = %err.failure_kind(), "getUpdates failed: {err}");
        }

        let wait = err.retry_after().map_or(backoff, |ra| ra.max(backoff));
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        backoff = (backoff * 2).min(config.max_backoff);
    }

    tracing::info!(offset, "update pump stopped");
}
