//! Update → gift event translation. Pure; no store access.

use giftvault_botapi::Update;
use giftvault_core::GiftCandidate;
use giftvault_core::serde_helpers::non_blank;

/// A gift found in an update, ready to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct GiftEvent {
    pub owner: String,
    pub candidate: GiftCandidate,
    pub unique: bool,
    pub chat_id: i64,
    pub message_id: i64,
    /// Connection the message arrived through, if the envelope said.
    pub connection_id: Option<String>,
}

/// Connection identifiers carried by the update envelope, in capture order:
/// the business connection itself, then the business message's connection.
pub fn connection_ids(update: &Update) -> impl Iterator<Item = &str> {
    let from_connection = update
        .business_connection
        .as_ref()
        .and_then(|c| non_blank(c.id.as_deref()));
    let from_message = update
        .business_message
        .as_ref()
        .and_then(|m| non_blank(m.business_connection_id.as_deref()));
    from_connection.into_iter().chain(from_message)
}

/// Extract the gift carried by `update`, stamped with `now_ms`.
///
/// Returns `None` for updates without a gift, which is most traffic.
pub fn extract_gift(update: &Update, now_ms: i64) -> Option<GiftEvent> {
    let message = update.first_message()?;
    let payload = message.gift_payload()?;
    Some(GiftEvent {
        owner: message.owner(),
        candidate: payload.to_candidate(now_ms),
        unique: payload.is_unique(),
        chat_id: message.chat.id,
        message_id: message.message_id,
        connection_id: non_blank(message.business_connection_id.as_deref()).map(str::to_owned),
    })
}
