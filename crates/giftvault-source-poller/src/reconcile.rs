//! Merge one poll result into the record store.

use giftvault_botapi::OwnedGift;
use giftvault_store::RecordStore;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

/// Upsert every gift in `gifts` as one batch with a single snapshot write.
/// Items without a send date are stamped with `now_ms`. Known keys are left
/// untouched, so a realtime record observed first keeps its metadata.
pub fn reconcile_gifts(records: &mut RecordStore, gifts: &[OwnedGift], now_ms: i64) -> ReconcileSummary {
    let inserted = records.upsert_all(gifts.iter().map(|gift| {
        let candidate = gift.payload().to_candidate(gift.observed_at_ms(now_ms));
        (gift.owner(), candidate)
    }));
    ReconcileSummary {
        fetched: gifts.len(),
        inserted,
        duplicates: gifts.len() - inserted,
    }
}
