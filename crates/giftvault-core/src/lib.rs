//! giftvault-core: data model for the gift reconciliation cache.
//! Items, the two-shape gift payload, and the canonical dedup key.
//! Pure library: no IO, no async.

pub mod gift;
pub mod serde_helpers;
pub mod types;

pub use gift::{AssetRef, GiftCandidate, GiftPayload, RegularGift, UniqueGift, WrappedGift};
pub use types::{Item, MediaKind, MediaRef, Snapshot, UNKNOWN_OWNER, owner_key};
