use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::gift::fallback_key;
use crate::serde_helpers::{lenient, lenient_i64, lenient_string, lenient_u64, non_blank};

/// Owner key used when the origin user cannot be determined.
pub const UNKNOWN_OWNER: &str = "unknown";

/// Owner key for an optional user id: the decimal id, or [`UNKNOWN_OWNER`].
pub fn owner_key(user_id: Option<i64>) -> String {
    user_id.map_or_else(|| UNKNOWN_OWNER.to_owned(), |id| id.to_string())
}

// ─── Media ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Sticker,
    Symbol,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sticker => "sticker",
            Self::Symbol => "symbol",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the visual asset of a gift.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub kind: MediaKind,
    pub file_id: String,
}

impl MediaRef {
    pub fn sticker(file_id: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Sticker,
            file_id: file_id.into(),
        }
    }

    pub fn symbol(file_id: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Symbol,
            file_id: file_id.into(),
        }
    }
}

// ─── Item ─────────────────────────────────────────────────────────

/// One stored gift instance. Immutable once stored.
///
/// `owned_id` always holds the canonical dedup key: the owned-instance id when
/// the source reported one, otherwise the fallback key derived from the
/// descriptive fields (see [`crate::gift::GiftCandidate::dedup_key`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ItemRecord")]
pub struct Item {
    pub item_id: Option<String>,
    pub owned_id: String,
    pub display_name: Option<String>,
    pub serial_number: Option<u64>,
    pub observed_at_ms: i64,
    pub media_ref: Option<MediaRef>,
}

impl Item {
    /// Key used by the record store to detect duplicates.
    pub fn dedup_key(&self) -> &str {
        &self.owned_id
    }
}

/// On-disk record shape. Every field may be null or wrongly typed; a
/// missing `ownedId` is replaced by the fallback key so loaded items obey the
/// same dedup rule as freshly ingested ones.
///
/// Files written by the earlier bot use `gift_id`, `owned_id`, `name`, `ts`
/// (milliseconds) and a bare `file_id`; those names are accepted too.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    #[serde(default, alias = "item_id", alias = "gift_id", deserialize_with = "lenient_string")]
    item_id: Option<String>,
    #[serde(default, alias = "owned_id", deserialize_with = "lenient_string")]
    owned_id: Option<String>,
    #[serde(default, alias = "name", deserialize_with = "lenient_string")]
    display_name: Option<String>,
    #[serde(default, alias = "number", deserialize_with = "lenient_u64")]
    serial_number: Option<u64>,
    #[serde(default, alias = "ts", deserialize_with = "lenient_i64")]
    observed_at_ms: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    media_ref: Option<MediaRef>,
    /// Legacy media reference without a kind.
    #[serde(default, rename = "file_id", deserialize_with = "lenient_string")]
    file_id: Option<String>,
}

impl From<ItemRecord> for Item {
    fn from(rec: ItemRecord) -> Self {
        let owned_id = match non_blank(rec.owned_id.as_deref()) {
            Some(id) => id.to_owned(),
            None => fallback_key(
                rec.item_id.as_deref(),
                rec.display_name.as_deref(),
                rec.serial_number,
            ),
        };
        Self {
            item_id: rec.item_id,
            owned_id,
            display_name: rec.display_name,
            serial_number: rec.serial_number,
            observed_at_ms: rec.observed_at_ms.unwrap_or(0),
            media_ref: rec.media_ref.or_else(|| rec.file_id.map(MediaRef::sticker)),
        }
    }
}

// ─── Snapshot ─────────────────────────────────────────────────────

/// Full owner → items mapping; the unit of persistence.
///
/// A `BTreeMap` keeps the serialized file stable across writes.
pub type Snapshot = BTreeMap<String, Vec<Item>>;
