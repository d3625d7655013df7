//! Bot API wire types, restricted to the fields the ingestion paths read.
//!
//! Every field except `update_id` is optional and lenient: a value of the
//! wrong shape degrades to a missing field instead of failing the enclosing
//! update or gift.

use giftvault_core::serde_helpers::{lenient, lenient_i64, lenient_or_default, lenient_string};
use giftvault_core::{GiftPayload, RegularGift, UniqueGift, WrappedGift, owner_key};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope around every Bot API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default = "Option::default")]
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseParameters {
    #[serde(default)]
    pub retry_after: Option<u64>,
}

// ─── Updates ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<Message>,
    #[serde(default, deserialize_with = "lenient")]
    pub edited_message: Option<Message>,
    #[serde(default, deserialize_with = "lenient")]
    pub business_connection: Option<BusinessConnection>,
    #[serde(default, deserialize_with = "lenient")]
    pub business_message: Option<Message>,
}

impl Update {
    /// The message carried by this update, in lookup order:
    /// business message, plain message, edited message.
    pub fn first_message(&self) -> Option<&Message> {
        self.business_message
            .as_ref()
            .or(self.message.as_ref())
            .or(self.edited_message.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub message_id: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub date: Option<i64>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub chat: Chat,
    #[serde(default, deserialize_with = "lenient")]
    pub from: Option<User>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub business_connection_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub gift: Option<RegularGift>,
    #[serde(default, deserialize_with = "lenient")]
    pub unique_gift: Option<UniqueGift>,
}

impl Message {
    /// Gift carried by the message; a unique gift wins over a regular one.
    pub fn gift_payload(&self) -> Option<GiftPayload> {
        match (&self.unique_gift, &self.gift) {
            (Some(unique), _) => Some(GiftPayload::Unique(unique.clone())),
            (None, Some(regular)) => Some(GiftPayload::Regular(regular.clone())),
            (None, None) => None,
        }
    }

    /// Owner key of the sender.
    pub fn owner(&self) -> String {
        owner_key(self.from.as_ref().and_then(|u| u.id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Absent or unusable ids leave the owner unknown.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessConnection {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub user_chat_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub is_enabled: Option<bool>,
}

// ─── Owned gifts ──────────────────────────────────────────────────

/// One entry of `getBusinessAccountGifts`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnedGift {
    /// `"regular"` or `"unique"`.
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub owned_gift_id: Option<String>,
    #[serde(default, alias = "from_user", deserialize_with = "lenient")]
    pub sender_user: Option<User>,
    /// Unix seconds.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub send_date: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub gift: Option<WrappedGift>,
}

impl OwnedGift {
    pub fn is_unique(&self) -> bool {
        self.kind.as_deref() == Some("unique")
    }

    /// The entry as a two-shape payload. Anything not tagged `"unique"` is
    /// treated as regular.
    pub fn payload(&self) -> GiftPayload {
        if self.is_unique() {
            GiftPayload::Unique(UniqueGift {
                owned_gift_id: self.owned_gift_id.clone(),
                gift: self.gift.clone(),
                ..Default::default()
            })
        } else {
            GiftPayload::Regular(RegularGift {
                owned_gift_id: self.owned_gift_id.clone(),
                gift: self.gift.clone(),
                ..Default::default()
            })
        }
    }

    pub fn owner(&self) -> String {
        owner_key(self.sender_user.as_ref().and_then(|u| u.id))
    }

    /// Server-reported send time in ms, or `now_ms` when absent.
    pub fn observed_at_ms(&self, now_ms: i64) -> i64 {
        self.send_date
            .filter(|&secs| secs > 0)
            .map_or(now_ms, |secs| secs.saturating_mul(1000))
    }
}

/// Result of `getBusinessAccountGifts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwnedGifts {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub gifts: Vec<Value>,
    #[serde(default)]
    pub next_offset: Option<String>,
}

impl OwnedGifts {
    pub fn into_gifts(self) -> Vec<OwnedGift> {
        parse_each(self.gifts, "owned gift")
    }
}

/// Parse a list element by element. Field-level leniency means only entries
/// that are not objects at all are skipped.
pub fn parse_each<T: DeserializeOwned>(values: Vec<Value>, what: &str) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("skipping malformed {what}: {e}");
                None
            }
        })
        .collect()
}

/// Parse a `getUpdates` batch. An update that fails to parse still yields its
/// `update_id` so the offset moves past it.
pub fn parse_updates(values: Vec<Value>) -> Vec<Update> {
    values
        .into_iter()
        .filter_map(|v| {
            let update_id = v.get("update_id").and_then(Value::as_i64);
            match serde_json::from_value::<Update>(v) {
                Ok(update) => Some(update),
                Err(e) => {
                    tracing::warn!(?update_id, "skipping malformed update: {e}");
                    update_id.map(|update_id| Update {
                        update_id,
                        ..Default::default()
                    })
                }
            }
        })
        .collect()
}
