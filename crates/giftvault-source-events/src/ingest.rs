//! Realtime ingestion: one update in, at most one upsert out.

use chrono::Utc;
use giftvault_botapi::Update;
use giftvault_core::Item;
use giftvault_store::{SharedVault, Vault};
use tokio::sync::broadcast;

use crate::translate::{connection_ids, extract_gift};

/// Default capacity of the new-gift broadcast channel.
pub const DEFAULT_NOTICE_CAPACITY: usize = 64;

/// Emitted once per newly stored gift, never for a duplicate.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGiftNotice {
    pub owner: String,
    pub item: Item,
    pub unique: bool,
    pub chat_id: i64,
    pub message_id: i64,
    /// Connection to acknowledge through: the message's own, else the cached
    /// identity at ingest time.
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// No gift in the update.
    Ignored,
    Duplicate { owner: String, key: String },
    Inserted { owner: String, key: String },
}

impl IngestOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted { .. })
    }
}

#[derive(Debug, Clone)]
pub struct EventIngestor {
    notify_tx: broadcast::Sender<NewGiftNotice>,
}

impl Default for EventIngestor {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_CAPACITY)
    }
}

impl EventIngestor {
    pub fn new(capacity: usize) -> Self {
        let (notify_tx, _) = broadcast::channel(capacity.max(1));
        Self { notify_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NewGiftNotice> {
        self.notify_tx.subscribe()
    }

    /// Apply one update to `vault`. Never fails: updates without a gift are
    /// ignored and missing fields fall back to defaults.
    ///
    /// Connection ids in the envelope are offered to the identity cache
    /// before the gift is handled.
    pub fn ingest(&self, update: &Update, vault: &mut Vault, now_ms: i64) -> IngestOutcome {
        for id in connection_ids(update) {
            vault.identity.set_if_absent(id);
        }

        let Some(event) = extract_gift(update, now_ms) else {
            tracing::debug!(update_id = update.update_id, "update carries no gift");
            return IngestOutcome::Ignored;
        };

        let key = event.candidate.dedup_key();
        let item = event.candidate.clone().into_item();
        if !vault.records.upsert_if_absent(&event.owner, event.candidate) {
            tracing::debug!(owner = %event.owner, key = %key, "realtime gift already stored");
            return IngestOutcome::Duplicate {
                owner: event.owner,
                key,
            };
        }

        tracing::info!(
            owner = %event.owner,
            key = %key,
            item_id = item.item_id.as_deref().unwrap_or("-"),
            unique = event.unique,
            "realtime gift stored"
        );

        let notice = NewGiftNotice {
            owner: event.owner.clone(),
            item,
            unique: event.unique,
            chat_id: event.chat_id,
            message_id: event.message_id,
            connection_id: event
                .connection_id
                .or_else(|| vault.identity.get().map(str::to_owned)),
        };
        // No subscriber is fine; acknowledgments may be disabled.
        let _ = self.notify_tx.send(notice);

        IngestOutcome::Inserted {
            owner: event.owner,
            key,
        }
    }

    /// [`Self::ingest`] against the shared vault, stamped with the current
    /// time. The lock is held only for the in-memory update and the
    /// snapshot write.
    pub async fn ingest_shared(&self, update: &Update, vault: &SharedVault) -> IngestOutcome {
        let now_ms = Utc::now().timestamp_millis();
        let mut guard = vault.lock().await;
        self.ingest(update, &mut guard, now_ms)
    }
}
