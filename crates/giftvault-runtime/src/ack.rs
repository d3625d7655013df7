//! Acknowledgment worker: marks each newly stored realtime gift's message
//! as read and replies in the same chat.

use giftvault_botapi::Acknowledger;
use giftvault_source_events::NewGiftNotice;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

pub const ACK_TEXT: &str = "🥳 Gift saved!";

pub async fn run_ack_worker<A: Acknowledger>(
    api: A,
    mut notices: broadcast::Receiver<NewGiftNotice>,
    cancel: CancellationToken,
) {
    loop {
        let notice = tokio::select! {
            _ = cancel.cancelled() => break,
            received = notices.recv() => match received {
                Ok(notice) => notice,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "ack worker fell behind; notices dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };
        acknowledge(&api, &notice).await;
    }
    tracing::debug!("ack worker stopped");
}

/// Fire-and-forget. Failures are logged at debug and never retried.
pub async fn acknowledge<A: Acknowledger>(api: &A, notice: &NewGiftNotice) {
    let Some(conn) = notice.connection_id.as_deref() else {
        tracing::debug!(owner = %notice.owner, "no connection id; skipping acknowledgment");
        return;
    };
    if let Err(e) = api
        .read_business_message(conn, notice.chat_id, notice.message_id)
        .await
    {
        tracing::debug!(chat_id = notice.chat_id, "readBusinessMessage failed: {e}");
    }
    if let Err(e) = api.send_message(conn, notice.chat_id, ACK_TEXT).await {
        tracing::debug!(chat_id = notice.chat_id, "sendMessage failed: {e}");
    }
}
