//! giftvault-botapi: Bot API IO boundary.
//! Wire types for updates and owned gifts, the collaborator traits the
//! ingestion paths depend on, and an HTTP implementation over reqwest.

pub mod client;
pub mod error;
pub mod types;

pub use client::{Acknowledger, DEFAULT_BASE_URL, GiftsApi, HttpBotApi, UpdateSource};
pub use error::{BotApiError, FailureKind};
pub use types::{
    ApiResponse, BusinessConnection, Chat, Message, OwnedGift, OwnedGifts, ResponseParameters,
    Update, User,
};
