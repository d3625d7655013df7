//! Two-shape gift payloads and the canonical dedup key.
//!
//! Upstream reports gifts in two shapes, regular and unique. Both carry the
//! same logical fields under different paths, some of them nested inside a
//! wrapped `gift` object. [`GiftPayload`] hides the difference behind uniform
//! accessors so that the realtime path and the poll path derive identical
//! candidates (and identical dedup keys) from identical data.

use serde::{Deserialize, Serialize};

use crate::serde_helpers::{lenient, lenient_string, lenient_u64, non_blank};
use crate::types::{Item, MediaKind, MediaRef};

/// Prefix of keys derived when no owned-instance id is available.
pub const FALLBACK_KEY_PREFIX: &str = "fallback:";

const MISSING_PART: &str = "-";

/// Fallback dedup key: `fallback:{item_id}:{display_name}:{serial_number}`,
/// with `-` standing in for each absent part.
pub fn fallback_key(
    item_id: Option<&str>,
    display_name: Option<&str>,
    serial_number: Option<u64>,
) -> String {
    let serial = serial_number.map(|n| n.to_string());
    format!(
        "{FALLBACK_KEY_PREFIX}{}:{}:{}",
        non_blank(item_id).unwrap_or(MISSING_PART),
        non_blank(display_name).unwrap_or(MISSING_PART),
        serial.as_deref().unwrap_or(MISSING_PART),
    )
}

// ─── Wire shapes ──────────────────────────────────────────────────

/// Sticker file handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerRef {
    #[serde(default, deserialize_with = "lenient_string")]
    pub file_id: Option<String>,
}

/// A media field as upstream sends it: either a sticker (`{file_id}`) or a
/// symbol/model object that nests its sticker (`{name, sticker: {file_id}}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    #[serde(default, deserialize_with = "lenient_string")]
    pub file_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub sticker: Option<StickerRef>,
}

impl AssetRef {
    pub fn file_id(&self) -> Option<&str> {
        non_blank(self.file_id.as_deref()).or_else(|| {
            self.sticker
                .as_ref()
                .and_then(|s| non_blank(s.file_id.as_deref()))
        })
    }
}

/// Gift definition nested under a `gift` key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedGift {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gift_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub base_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub number: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub sticker: Option<AssetRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub symbol: Option<AssetRef>,
}

/// Regular (non-upgraded) gift.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegularGift {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub unique_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub sticker: Option<AssetRef>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub owned_gift_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub gift: Option<WrappedGift>,
}

/// Unique (upgraded, numbered) gift.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueGift {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gift_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub base_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub number: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub sticker: Option<AssetRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub symbol: Option<AssetRef>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub owned_gift_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub gift: Option<WrappedGift>,
}

// ─── Payload ──────────────────────────────────────────────────────

/// A gift as reported by either channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GiftPayload {
    Regular(RegularGift),
    Unique(UniqueGift),
}

impl GiftPayload {
    fn wrapped(&self) -> Option<&WrappedGift> {
        match self {
            Self::Regular(g) => g.gift.as_ref(),
            Self::Unique(g) => g.gift.as_ref(),
        }
    }

    pub fn is_unique(&self) -> bool {
        matches!(self, Self::Unique(_))
    }

    /// Identifier of the gift definition.
    pub fn item_id(&self) -> Option<&str> {
        let own = match self {
            Self::Regular(g) => {
                non_blank(g.unique_id.as_deref()).or_else(|| non_blank(g.id.as_deref()))
            }
            Self::Unique(g) => {
                non_blank(g.id.as_deref()).or_else(|| non_blank(g.gift_id.as_deref()))
            }
        };
        own.or_else(|| {
            self.wrapped()
                .and_then(|w| non_blank(w.id.as_deref()).or_else(|| non_blank(w.gift_id.as_deref())))
        })
    }

    /// Identifier of this owned instance, if the source reported one.
    pub fn owned_id(&self) -> Option<&str> {
        match self {
            Self::Regular(g) => non_blank(g.owned_gift_id.as_deref()),
            Self::Unique(g) => non_blank(g.owned_gift_id.as_deref()),
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        let own = match self {
            Self::Regular(g) => non_blank(g.name.as_deref()),
            Self::Unique(g) => {
                non_blank(g.name.as_deref()).or_else(|| non_blank(g.base_name.as_deref()))
            }
        };
        own.or_else(|| {
            self.wrapped().and_then(|w| {
                non_blank(w.name.as_deref()).or_else(|| non_blank(w.base_name.as_deref()))
            })
        })
    }

    /// Serial number; only unique gifts are numbered.
    pub fn serial_number(&self) -> Option<u64> {
        match self {
            Self::Regular(_) => None,
            Self::Unique(g) => g.number.or_else(|| g.gift.as_ref().and_then(|w| w.number)),
        }
    }

    /// Media reference resolved by priority: own sticker, own symbol,
    /// wrapped sticker, wrapped symbol.
    pub fn media_ref(&self) -> Option<MediaRef> {
        let (own_sticker, own_symbol) = match self {
            Self::Regular(g) => (g.sticker.as_ref(), None),
            Self::Unique(g) => (g.sticker.as_ref(), g.symbol.as_ref()),
        };
        let wrapped = self.wrapped();
        let priority = [
            (own_sticker, MediaKind::Sticker),
            (own_symbol, MediaKind::Symbol),
            (wrapped.and_then(|w| w.sticker.as_ref()), MediaKind::Sticker),
            (wrapped.and_then(|w| w.symbol.as_ref()), MediaKind::Symbol),
        ];
        priority.into_iter().find_map(|(asset, kind)| {
            asset.and_then(AssetRef::file_id).map(|file_id| MediaRef {
                kind,
                file_id: file_id.to_owned(),
            })
        })
    }

    /// Extract a store candidate observed at `observed_at_ms`.
    pub fn to_candidate(&self, observed_at_ms: i64) -> GiftCandidate {
        GiftCandidate {
            item_id: self.item_id().map(str::to_owned),
            owned_id: self.owned_id().map(str::to_owned),
            display_name: self.display_name().map(str::to_owned),
            serial_number: self.serial_number(),
            media_ref: self.media_ref(),
            observed_at_ms,
        }
    }
}

// ─── Candidate ────────────────────────────────────────────────────

/// A gift extracted from either channel, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiftCandidate {
    pub item_id: Option<String>,
    pub owned_id: Option<String>,
    pub display_name: Option<String>,
    pub serial_number: Option<u64>,
    pub media_ref: Option<MediaRef>,
    pub observed_at_ms: i64,
}

impl GiftCandidate {
    /// Canonical dedup key, shared by every producer: the trimmed owned id,
    /// or [`fallback_key`] when the owned id is absent or blank.
    pub fn dedup_key(&self) -> String {
        match non_blank(self.owned_id.as_deref()) {
            Some(id) => id.to_owned(),
            None => fallback_key(
                self.item_id.as_deref(),
                self.display_name.as_deref(),
                self.serial_number,
            ),
        }
    }

    /// Freeze the candidate into a stored item keyed by [`Self::dedup_key`].
    pub fn into_item(self) -> Item {
        let owned_id = self.dedup_key();
        Item {
            item_id: self.item_id,
            owned_id,
            display_name: self.display_name,
            serial_number: self.serial_number,
            observed_at_ms: self.observed_at_ms,
            media_ref: self.media_ref,
        }
    }
}
