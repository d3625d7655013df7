//! Collaborator traits and the reqwest-backed Bot API client.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::BotApiError;
use crate::types::{ApiResponse, OwnedGift, OwnedGifts, Update, parse_updates};

/// Inbound update stream (long polling).
pub trait UpdateSource: Send + Sync {
    fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> impl Future<Output = Result<Vec<Update>, BotApiError>> + Send;
}

/// The "list owned items" operation.
pub trait GiftsApi: Send + Sync {
    fn list_owned_gifts(
        &self,
        connection_id: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<OwnedGift>, BotApiError>> + Send;
}

/// Acknowledgment side effects sent on behalf of the business account.
pub trait Acknowledger: Send + Sync {
    fn read_business_message(
        &self,
        connection_id: &str,
        chat_id: i64,
        message_id: i64,
    ) -> impl Future<Output = Result<(), BotApiError>> + Send;

    fn send_message(
        &self,
        connection_id: &str,
        chat_id: i64,
        text: &str,
    ) -> impl Future<Output = Result<(), BotApiError>> + Send;
}

impl<T: UpdateSource> UpdateSource for Arc<T> {
    fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> impl Future<Output = Result<Vec<Update>, BotApiError>> + Send {
        (**self).get_updates(offset, timeout_secs)
    }
}

impl<T: GiftsApi> GiftsApi for Arc<T> {
    fn list_owned_gifts(
        &self,
        connection_id: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<OwnedGift>, BotApiError>> + Send {
        (**self).list_owned_gifts(connection_id, limit)
    }
}

impl<T: Acknowledger> Acknowledger for Arc<T> {
    fn read_business_message(
        &self,
        connection_id: &str,
        chat_id: i64,
        message_id: i64,
    ) -> impl Future<Output = Result<(), BotApiError>> + Send {
        (**self).read_business_message(connection_id, chat_id, message_id)
    }

    fn send_message(
        &self,
        connection_id: &str,
        chat_id: i64,
        text: &str,
    ) -> impl Future<Output = Result<(), BotApiError>> + Send {
        (**self).send_message(connection_id, chat_id, text)
    }
}

// ─── HTTP client ──────────────────────────────────────────────────

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Request timeout for short calls; long polls add their own wait on top.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upstream caps one `getBusinessAccountGifts` page at 100 entries.
const GIFTS_PAGE_SIZE: u32 = 100;

const ALLOWED_UPDATES: [&str; 4] = [
    "message",
    "edited_message",
    "business_connection",
    "business_message",
];

/// Bot API over HTTPS. Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct HttpBotApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for HttpBotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBotApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpBotApi {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self, BotApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token)
    }

    /// POST `params` to `method` and unwrap the response envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<T, BotApiError> {
        let mut request = self.client.post(self.method_url(method)).json(&params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        let status = response.status();
        let header_retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.bytes().await?;

        let envelope: ApiResponse<Value> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(BotApiError::Malformed(format!("{method}: {e}")));
            }
            Err(_) => {
                return Err(BotApiError::from_code(
                    i64::from(status.as_u16()),
                    status.to_string(),
                    header_retry_after,
                ));
            }
        };

        if !envelope.ok {
            let code = envelope
                .error_code
                .unwrap_or_else(|| i64::from(status.as_u16()));
            let retry_after = envelope
                .parameters
                .and_then(|p| p.retry_after)
                .or(header_retry_after);
            return Err(BotApiError::from_code(
                code,
                envelope.description.unwrap_or_default(),
                retry_after,
            ));
        }

        let result = envelope
            .result
            .ok_or_else(|| BotApiError::Malformed(format!("{method}: missing result")))?;
        serde_json::from_value(result).map_err(|e| BotApiError::Malformed(format!("{method}: {e}")))
    }
}

impl UpdateSource for HttpBotApi {
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, BotApiError> {
        let params = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ALLOWED_UPDATES,
        });
        let raw: Vec<Value> = self
            .call(
                "getUpdates",
                params,
                Some(REQUEST_TIMEOUT + Duration::from_secs(timeout_secs)),
            )
            .await?;
        Ok(parse_updates(raw))
    }
}

impl GiftsApi for HttpBotApi {
    /// Fetch up to `limit` gifts, following `next_offset` page by page.
    async fn list_owned_gifts(
        &self,
        connection_id: &str,
        limit: u32,
    ) -> Result<Vec<OwnedGift>, BotApiError> {
        let mut gifts = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let remaining = limit.saturating_sub(u32::try_from(gifts.len()).unwrap_or(u32::MAX));
            if remaining == 0 {
                break;
            }
            let mut params = json!({
                "business_connection_id": connection_id,
                "limit": remaining.min(GIFTS_PAGE_SIZE),
            });
            if let Some(ref offset) = offset {
                params["offset"] = json!(offset);
            }
            let page: OwnedGifts = self.call("getBusinessAccountGifts", params, None).await?;
            let next = page.next_offset.clone().filter(|o| !o.is_empty());
            let batch = page.into_gifts();
            let empty = batch.is_empty();
            gifts.extend(batch);
            match next {
                Some(next) if !empty && offset.as_deref() != Some(next.as_str()) => {
                    offset = Some(next);
                }
                _ => break,
            }
        }
        gifts.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(gifts)
    }
}

impl Acknowledger for HttpBotApi {
    async fn read_business_message(
        &self,
        connection_id: &str,
        chat_id: i64,
        message_id: i64,
    ) -> Result<(), BotApiError> {
        let params = json!({
            "business_connection_id": connection_id,
            "chat_id": chat_id,
            "message_id": message_id,
        });
        self.call::<Value>("readBusinessMessage", params, None)
            .await
            .map(drop)
    }

    async fn send_message(
        &self,
        connection_id: &str,
        chat_id: i64,
        text: &str,
    ) -> Result<(), BotApiError> {
        let params = json!({
            "business_connection_id": connection_id,
            "chat_id": chat_id,
            "text": text,
        });
        self.call::<Value>("sendMessage", params, None)
            .await
            .map(drop)
    }
}
