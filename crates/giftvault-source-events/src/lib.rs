//! giftvault-source-events: realtime ingestion path.
//! Turns Bot API updates into store upserts, captures the business
//! connection id, and signals newly stored gifts.

pub mod ingest;
pub mod translate;

pub use ingest::{EventIngestor, IngestOutcome, NewGiftNotice};
pub use translate::{GiftEvent, connection_ids, extract_gift};
