//! Daemon wiring: vault, update pump, reconciliation poller, ack worker and
//! status server, all stopped by one cancellation token.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use giftvault_botapi::HttpBotApi;
use giftvault_source_events::EventIngestor;
use giftvault_source_poller::{PollerStatus, ReconciliationPoller};
use giftvault_store::{SharedVault, Vault};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cli::DaemonOpts;
use crate::pump::{PumpConfig, run_update_pump};
use crate::{ack, server};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Read-only view handed to the status server.
pub struct DaemonState {
    pub vault: SharedVault,
    pub poller_status: watch::Receiver<PollerStatus>,
    pub started_at: DateTime<Utc>,
    pub acks_enabled: bool,
}

pub async fn run_daemon(opts: DaemonOpts, socket_path: &str) -> anyhow::Result<()> {
    let token = opts
        .bot_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| anyhow::anyhow!("GIFTS_BOT_TOKEN is not set (use --bot-token or the env var)"))?;

    let vault = Vault::open(&opts.data_dir, opts.connection_id.as_deref())?;
    tracing::info!(
        data_dir = %opts.data_dir.display(),
        owners = vault.records.owner_count(),
        items = vault.records.item_count(),
        identity = vault.identity.source().map_or("none", |s| s.as_str()),
        "vault loaded"
    );
    let vault = vault.into_shared();

    let api = Arc::new(HttpBotApi::new(token, opts.api_base_url.as_str())?);
    let cancel = CancellationToken::new();
    let ingestor = EventIngestor::default();

    // Subscribe before the pump starts so no notice is missed.
    let ack_handle = if opts.no_ack {
        tracing::info!("acknowledgments disabled");
        None
    } else {
        let notices = ingestor.subscribe();
        Some(tokio::spawn(ack::run_ack_worker(
            Arc::clone(&api),
            notices,
            cancel.child_token(),
        )))
    };

    let poller = ReconciliationPoller::new(Arc::clone(&api), Arc::clone(&vault), opts.poller_config());
    let poller_status = poller.status();
    let mut poll_handle = poller.spawn(cancel.child_token());

    let mut pump_handle = tokio::spawn(run_update_pump(
        Arc::clone(&api),
        ingestor,
        Arc::clone(&vault),
        cancel.child_token(),
        PumpConfig::default(),
    ));

    let state = Arc::new(DaemonState {
        vault,
        poller_status,
        started_at: Utc::now(),
        acks_enabled: !opts.no_ack,
    });
    let listener = match server::bind_socket(socket_path).await {
        Ok(listener) => listener,
        Err(e) => {
            cancel.cancel();
            return Err(e);
        }
    };
    let server_cancel = cancel.child_token();
    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, server_cancel).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    let finished = tokio::select! {
        () = shutdown_signal() => None,
        res = &mut poll_handle => {
            log_join("poller", res);
            Some("poller")
        }
        res = &mut pump_handle => {
            log_join("update pump", res);
            Some("update pump")
        }
        res = &mut server_handle => {
            log_join("server", res);
            Some("server")
        }
    };
    if let Some(name) = finished {
        tracing::warn!("{name} exited unexpectedly");
    }

    cancel.cancel();
    let handles = [
        ("poller", poll_handle),
        ("update pump", pump_handle),
        ("server", server_handle),
    ]
    .into_iter()
    .chain(ack_handle.map(|h| ("ack worker", h)));
    for (name, handle) in handles {
        if finished != Some(name) {
            drain(name, handle).await;
        }
    }

    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}

/// Wait for ctrl-c or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("received ctrl-c, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => tracing::warn!("cannot register SIGTERM handler: {e}"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("received ctrl-c, shutting down");
}

async fn drain(name: &str, handle: JoinHandle<()>) {
    match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
        Ok(res) => log_join(name, res),
        Err(_) => tracing::warn!("{name} did not stop within {SHUTDOWN_GRACE:?}"),
    }
}

fn log_join(name: &str, res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        tracing::error!("{name} task failed: {e}");
    }
}
