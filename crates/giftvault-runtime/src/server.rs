//! UDS JSON-RPC status server.
//! Connection-per-request, newline-delimited JSON.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use giftvault_source_poller::PollerStatus;
use giftvault_store::Vault;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::daemon::DaemonState;

const METHOD_NOT_FOUND: i64 = -32601;
const PARSE_ERROR: i64 = -32700;

/// Create the socket directory (0700), clear a stale socket and bind (0600).
///
/// Fails when another daemon is already answering on `socket_path`.
pub async fn bind_socket(socket_path: &str) -> anyhow::Result<UnixListener> {
    let socket_dir = Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    if Path::new(socket_path).exists() {
        if UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");
    Ok(listener)
}

/// Accept connections until `cancel` fires.
pub async fn serve(
    listener: UnixListener,
    state: Arc<DaemonState>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let (stream, _) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<DaemonState>) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response = match serde_json::from_str::<Value>(line.trim()) {
        Ok(request) => {
            let id = request["id"].clone();
            let method = request["method"].as_str().unwrap_or("");
            match dispatch(&state, method, &request["params"]).await {
                Some(result) => json!({"jsonrpc": "2.0", "result": result, "id": id}),
                None => error_response(METHOD_NOT_FOUND, "method not found", id),
            }
        }
        Err(_) => error_response(PARSE_ERROR, "parse error", Value::Null),
    };

    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;
    Ok(())
}

fn error_response(code: i64, message: &str, id: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {"code": code, "message": message},
        "id": id,
    })
}

async fn dispatch(state: &DaemonState, method: &str, params: &Value) -> Option<Value> {
    let result = match method {
        "status" => {
            let poller = state.poller_status.borrow().clone();
            let vault = state.vault.lock().await;
            build_status(&vault, &poller, state.started_at, state.acks_enabled, Utc::now())
        }
        "list_owners" => build_owner_list(&*state.vault.lock().await),
        "list_gifts" => {
            let owner = params["owner"].as_str();
            build_gift_list(&*state.vault.lock().await, owner)
        }
        _ => return None,
    };
    Some(result)
}

/// Daemon summary. Never includes the connection id itself.
pub(crate) fn build_status(
    vault: &Vault,
    poller: &PollerStatus,
    started_at: DateTime<Utc>,
    acks_enabled: bool,
    now: DateTime<Utc>,
) -> Value {
    json!({
        "identity": vault.identity.describe(),
        "owners": vault.records.owner_count(),
        "items": vault.records.item_count(),
        "snapshot_writes": vault.records.writes(),
        "poller": poller,
        "acks_enabled": acks_enabled,
        "started_at": started_at.to_rfc3339(),
        "uptime_secs": (now - started_at).num_seconds().max(0),
    })
}

pub(crate) fn build_owner_list(vault: &Vault) -> Value {
    let owners: Vec<Value> = vault
        .records
        .owners()
        .map(|(owner, count)| json!({"owner": owner, "count": count}))
        .collect();
    Value::Array(owners)
}

/// `[{owner, items}]`, restricted to `owner` when given. An unknown owner
/// yields an empty list.
pub(crate) fn build_gift_list(vault: &Vault, owner: Option<&str>) -> Value {
    let groups: Vec<Value> = vault
        .records
        .snapshot()
        .iter()
        .filter(|(o, _)| owner.is_none_or(|want| want == o.as_str()))
        .map(|(o, items)| json!({"owner": o, "items": items}))
        .collect();
    Value::Array(groups)
}
