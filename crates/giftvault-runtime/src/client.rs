//! UDS JSON-RPC client for CLI subcommands.

use std::fmt::Write as _;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub(crate) async fn rpc_call(
    socket_path: &str,
    method: &str,
    params: Value,
) -> anyhow::Result<Value> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to daemon at {socket_path}: {e}"))?;

    let (reader, mut writer) = stream.into_split();

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        anyhow::bail!("RPC error: {error}");
    }

    Ok(response["result"].clone())
}

/// `giftvault status`
pub async fn cmd_status(socket_path: &str, json: bool) -> anyhow::Result<()> {
    let status = rpc_call(socket_path, "status", serde_json::json!({})).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", format_status(&status));
    }
    Ok(())
}

/// `giftvault gifts [--owner ID]`
pub async fn cmd_gifts(socket_path: &str, owner: Option<&str>, json: bool) -> anyhow::Result<()> {
    let params = match owner {
        Some(o) => serde_json::json!({"owner": o}),
        None => serde_json::json!({}),
    };
    let groups = rpc_call(socket_path, "list_gifts", params).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
    } else {
        print!("{}", format_gifts(&groups));
    }
    Ok(())
}

pub(crate) fn format_status(status: &Value) -> String {
    let identity = match (
        status["identity"]["known"].as_bool(),
        status["identity"]["source"].as_str(),
    ) {
        (Some(true), Some(source)) => format!("known ({source})"),
        (Some(true), None) => "known".to_string(),
        _ => "not yet captured".to_string(),
    };

    let poller = &status["poller"];
    let mut out = String::new();
    let _ = writeln!(out, "connection: {identity}");
    let _ = writeln!(
        out,
        "gifts:      {} across {} owners",
        status["items"].as_u64().unwrap_or(0),
        status["owners"].as_u64().unwrap_or(0),
    );
    let _ = writeln!(
        out,
        "poller:     {} (cycles {}, synced {} new, failures {})",
        poller["phase"].as_str().unwrap_or("?"),
        poller["cycles"].as_u64().unwrap_or(0),
        poller["total_inserted"].as_u64().unwrap_or(0),
        poller["consecutive_failures"].as_u64().unwrap_or(0),
    );
    if poller["identity_suspect"].as_bool() == Some(true) {
        let _ = writeln!(out, "warning:    connection id keeps being rejected, it may be stale");
    }
    if let Some(last) = describe_cycle(&poller["last_cycle"]) {
        let _ = writeln!(out, "last cycle: {last}");
    }
    let _ = writeln!(
        out,
        "acks:       {}",
        if status["acks_enabled"].as_bool() == Some(true) { "on" } else { "off" }
    );
    let _ = writeln!(out, "uptime:     {}s", status["uptime_secs"].as_i64().unwrap_or(0));
    out
}

fn describe_cycle(cycle: &Value) -> Option<String> {
    let text = match cycle["outcome"].as_str()? {
        "synced" => format!(
            "synced {} fetched, {} new",
            cycle["fetched"].as_u64().unwrap_or(0),
            cycle["inserted"].as_u64().unwrap_or(0),
        ),
        "skipped" => match cycle["reason"].as_str() {
            Some("backoff") => format!(
                "backing off ({} ticks left)",
                cycle["remaining_ticks"].as_u64().unwrap_or(0)
            ),
            _ => "waiting for a business connection".to_string(),
        },
        "failed" => format!(
            "failed [{}] {}",
            cycle["kind"].as_str().unwrap_or("?"),
            cycle["error"].as_str().unwrap_or(""),
        ),
        other => other.to_string(),
    };
    Some(text)
}

pub(crate) fn format_gifts(groups: &Value) -> String {
    let Some(groups) = groups.as_array().filter(|g| !g.is_empty()) else {
        return "no gifts stored\n".to_string();
    };

    let mut out = String::new();
    for group in groups {
        let items = group["items"].as_array().map_or(&[][..], Vec::as_slice);
        let _ = writeln!(
            out,
            "{} ({} gifts)",
            group["owner"].as_str().unwrap_or("?"),
            items.len()
        );
        for item in items {
            let mut line = format!(
                "  {}  {}",
                item["ownedId"].as_str().unwrap_or("-"),
                item["displayName"].as_str().unwrap_or("-"),
            );
            if let Some(serial) = item["serialNumber"].as_u64() {
                let _ = write!(line, " #{serial}");
            }
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}
