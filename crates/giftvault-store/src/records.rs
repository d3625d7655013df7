//! Per-owner deduplicated gift records with whole-file JSON persistence.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use giftvault_core::serde_helpers::non_blank;
use giftvault_core::{GiftCandidate, Item, Snapshot, UNKNOWN_OWNER};

use crate::atomic::{self, StagedFile};
use crate::error::StoreError;

/// Owner → gift records, unique by dedup key within each owner.
///
/// All mutation goes through [`RecordStore::upsert_if_absent`] or
/// [`RecordStore::upsert_all`]. Every call that inserts something rewrites
/// the snapshot file once before returning.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    snapshot: Snapshot,
    /// Dedup keys per owner, mirroring `snapshot`.
    keys: HashMap<String, HashSet<String>>,
    /// Snapshot writes committed since open.
    writes: u64,
}

impl RecordStore {
    /// Load the snapshot at `path`, or start empty if it is absent or unusable.
    ///
    /// A file whose records collapse onto each other on load keeps a copy
    /// aside as `<name>.corrupt-<unix_ms>` before anything can overwrite it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = load_snapshot(&path);
        let (store, dropped) = Self::build(path, snapshot);
        if dropped > 0 {
            preserve_copy(&store.path);
        }
        store
    }

    /// Build a store from an in-memory snapshot. Duplicate keys within an
    /// owner are dropped, first occurrence kept.
    pub fn from_snapshot(path: impl Into<PathBuf>, snapshot: Snapshot) -> Self {
        Self::build(path.into(), snapshot).0
    }

    fn build(path: PathBuf, snapshot: Snapshot) -> (Self, usize) {
        let mut store = Self {
            path,
            snapshot: Snapshot::new(),
            keys: HashMap::new(),
            writes: 0,
        };
        let mut dropped = 0usize;
        for (owner, items) in snapshot {
            for item in items {
                if !store.insert_item(&owner, item) {
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            tracing::warn!(
                path = %store.path.display(),
                dropped,
                "snapshot contained duplicate records, kept first occurrence"
            );
        }
        (store, dropped)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `candidate` to `owner`'s collection unless an item with the same
    /// dedup key is already there. Returns `true` when inserted.
    ///
    /// An insert is persisted before returning. A failed write is logged and
    /// the in-memory insert is kept; the next successful write catches up.
    pub fn upsert_if_absent(&mut self, owner: &str, candidate: GiftCandidate) -> bool {
        let owner = non_blank(Some(owner)).unwrap_or(UNKNOWN_OWNER);
        if !self.insert_item(owner, candidate.into_item()) {
            return false;
        }
        self.write_out(1);
        true
    }

    /// Batch form of [`Self::upsert_if_absent`]: insert every new candidate,
    /// then write the snapshot once. Returns how many were inserted.
    pub fn upsert_all<I>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, GiftCandidate)>,
    {
        let mut inserted = 0;
        for (owner, candidate) in entries {
            let owner = non_blank(Some(owner.as_str())).unwrap_or(UNKNOWN_OWNER);
            if self.insert_item(owner, candidate.into_item()) {
                inserted += 1;
            }
        }
        if inserted > 0 {
            self.write_out(inserted);
        }
        inserted
    }

    /// Persist, logging a failure instead of returning it.
    fn write_out(&mut self, pending: usize) {
        match self.persist() {
            Ok(()) => self.writes += 1,
            Err(e) => tracing::warn!(pending, "snapshot write failed, keeping in-memory state: {e}"),
        }
    }

    fn insert_item(&mut self, owner: &str, item: Item) -> bool {
        let keys = self.keys.entry(owner.to_owned()).or_default();
        if !keys.insert(item.dedup_key().to_owned()) {
            return false;
        }
        self.snapshot.entry(owner.to_owned()).or_default().push(item);
        true
    }

    /// Serialize the current snapshot into a temp file beside the target.
    /// Nothing is visible at the target until the returned file is committed.
    pub fn stage(&self) -> Result<StagedFile, StoreError> {
        let bytes = serde_json::to_vec_pretty(&self.snapshot)?;
        atomic::stage(&self.path, &bytes)
    }

    /// Atomically replace the snapshot file with the current state.
    pub fn persist(&self) -> Result<(), StoreError> {
        self.stage()?.commit()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Items of one owner in discovery order.
    pub fn owner_items(&self, owner: &str) -> &[Item] {
        self.snapshot
            .get(owner)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `(owner, item count)` pairs in owner order.
    pub fn owners(&self) -> impl Iterator<Item = (&str, usize)> {
        self.snapshot
            .iter()
            .map(|(owner, items)| (owner.as_str(), items.len()))
    }

    pub fn contains(&self, owner: &str, dedup_key: &str) -> bool {
        self.keys
            .get(owner)
            .is_some_and(|keys| keys.contains(dedup_key))
    }

    pub fn owner_count(&self) -> usize {
        self.snapshot.len()
    }

    pub fn item_count(&self) -> usize {
        self.snapshot.values().map(Vec::len).sum()
    }

    /// Snapshot writes committed since this store was opened.
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

/// Read a persisted snapshot.
///
/// Never fails: an absent or empty file yields an empty snapshot; an
/// unreadable or malformed one is logged, moved aside as
/// `<name>.corrupt-<unix_ms>` when possible, and also yields an empty
/// snapshot.
pub fn load_snapshot(path: &Path) -> Snapshot {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no snapshot yet, starting empty");
            return Snapshot::new();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "cannot read snapshot, starting empty: {e}");
            return Snapshot::new();
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Snapshot::new();
    }

    match serde_json::from_slice::<Snapshot>(&bytes) {
        Ok(snapshot) => {
            tracing::info!(
                path = %path.display(),
                owners = snapshot.len(),
                items = snapshot.values().map(Vec::len).sum::<usize>(),
                "snapshot loaded"
            );
            snapshot
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "malformed snapshot, starting empty: {e}");
            quarantine(path);
            Snapshot::new()
        }
    }
}

fn aside_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".corrupt-{}", Utc::now().timestamp_millis()));
    PathBuf::from(name)
}

fn quarantine(path: &Path) {
    let aside = aside_path(path);
    match std::fs::rename(path, &aside) {
        Ok(()) => tracing::warn!(path = %aside.display(), "moved malformed snapshot aside"),
        Err(e) => tracing::warn!(path = %path.display(), "cannot move malformed snapshot aside: {e}"),
    }
}

/// Copy a loaded but lossy snapshot aside; the original stays in place.
fn preserve_copy(path: &Path) {
    let aside = aside_path(path);
    match std::fs::copy(path, &aside) {
        Ok(_) => tracing::warn!(path = %aside.display(), "kept a copy of the snapshot as loaded"),
        Err(e) => tracing::warn!(path = %path.display(), "cannot copy snapshot aside: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use giftvault_core::MediaRef;

    fn candidate(owned_id: Option<&str>, name: &str) -> GiftCandidate {
        GiftCandidate {
            item_id: Some("5170145012310081615".to_owned()),
            owned_id: owned_id.map(str::to_owned),
            display_name: Some(name.to_owned()),
            serial_number: None,
            media_ref: Some(MediaRef::sticker("STK")),
            observed_at_ms: 1_700_000_000_000,
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> RecordStore {
        RecordStore::open(dir.path().join("gifts.json"))
    }

    #[test]
    fn first_insert_is_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store_in(&dir);

        assert!(store.upsert_if_absent("1", candidate(Some("A"), "Heart")));

        let on_disk = load_snapshot(store.path());
        assert_eq!(&on_disk, store.snapshot());
        assert_eq!(on_disk["1"].len(), 1);
        assert_eq!(on_disk["1"][0].owned_id, "A");
    }

    #[test]
    fn replayed_key_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store_in(&dir);

        assert!(store.upsert_if_absent("1", candidate(Some("A"), "Heart")));
        assert!(!store.upsert_if_absent("1", candidate(Some("A"), "Heart")));
        assert_eq!(store.item_count(), 1);
    }

    #[test]
    fn first_observed_version_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store_in(&dir);

        assert!(store.upsert_if_absent("1", candidate(Some("A"), "first")));
        assert!(!store.upsert_if_absent("1", candidate(Some("A"), "second")));

        let items = store.owner_items("1");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].display_name.as_deref(), Some("first"));
    }

    #[test]
    fn same_key_under_different_owners_is_kept_twice() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store_in(&dir);

        assert!(store.upsert_if_absent("1", candidate(Some("A"), "Heart")));
        assert!(store.upsert_if_absent("2", candidate(Some("A"), "Heart")));
        assert_eq!(store.owner_count(), 2);
        assert!(store.contains("1", "A"));
        assert!(store.contains("2", "A"));
    }

    #[test]
    fn blank_owner_maps_to_unknown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store_in(&dir);

        assert!(store.upsert_if_absent("  ", candidate(Some("A"), "Heart")));
        assert_eq!(store.owner_items(UNKNOWN_OWNER).len(), 1);
    }

    #[test]
    fn fallback_keys_dedup_without_owned_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store_in(&dir);

        assert!(store.upsert_if_absent("1", candidate(None, "Heart")));
        assert!(!store.upsert_if_absent("1", candidate(Some("   "), "Heart")));
        assert!(store.upsert_if_absent("1", candidate(None, "Rose")));
        assert_eq!(store.owner_items("1").len(), 2);
    }

    #[test]
    fn insertion_order_is_discovery_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store_in(&dir);

        for id in ["C", "A", "B"] {
            store.upsert_if_absent("1", candidate(Some(id), "x"));
        }
        let order: Vec<&str> = store
            .owner_items("1")
            .iter()
            .map(|i| i.owned_id.as_str())
            .collect();
        assert_eq!(order, ["C", "A", "B"]);
    }

    #[test]
    fn reopen_restores_dedup_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut store = store_in(&dir);
            store.upsert_if_absent("1", candidate(Some("A"), "Heart"));
        }
        let mut reopened = store_in(&dir);
        assert!(!reopened.upsert_if_absent("1", candidate(Some("A"), "Heart")));
        assert!(reopened.upsert_if_absent("1", candidate(Some("B"), "Heart")));
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        assert_eq!(store.item_count(), 0);
        assert!(!store.path().exists());
    }

    #[test]
    fn empty_file_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gifts.json");
        std::fs::write(&path, "\n").expect("write");
        assert!(load_snapshot(&path).is_empty());
        assert!(path.exists(), "empty file is not treated as corrupt");
    }

    #[test]
    fn malformed_file_is_moved_aside() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gifts.json");
        std::fs::write(&path, "{ not json").expect("write");

        let store = RecordStore::open(&path);
        assert_eq!(store.item_count(), 0);
        assert!(!path.exists());

        let quarantined: Vec<String> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("gifts.json.corrupt-"))
            .collect();
        assert_eq!(quarantined.len(), 1);
    }

    fn corrupt_copies(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("gifts.json.corrupt-"))
            .count()
    }

    #[test]
    fn legacy_records_load_one_per_gift() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gifts.json");
        std::fs::write(
            &path,
            r#"{"1": [
                {"gift_id": "g", "owned_id": "A", "name": "Rose", "ts": 1, "file_id": "F1"},
                {"gift_id": "g", "owned_id": "B", "name": "Rose", "ts": 2, "file_id": "F2"},
                {"gift_id": "g", "owned_id": "C", "name": "Rose", "ts": 3, "file_id": null}
            ]}"#,
        )
        .expect("write");

        let mut store = RecordStore::open(&path);
        let keys: Vec<&str> = store.owner_items("1").iter().map(Item::dedup_key).collect();
        assert_eq!(keys, ["A", "B", "C"]);
        assert_eq!(store.owner_items("1")[1].media_ref, Some(MediaRef::sticker("F2")));
        assert_eq!(corrupt_copies(&dir), 0);

        assert!(store.upsert_if_absent("1", candidate(Some("D"), "Rose")));
        assert_eq!(load_snapshot(&path)["1"].len(), 4);
    }

    #[test]
    fn collapsing_load_keeps_a_copy_of_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gifts.json");
        let original = r#"{"1": [{"id": 1}, {"id": 2}, {"id": 3}]}"#;
        std::fs::write(&path, original).expect("write");

        let mut store = RecordStore::open(&path);
        assert_eq!(store.item_count(), 1);
        assert_eq!(corrupt_copies(&dir), 1);

        store.upsert_if_absent("1", candidate(Some("A"), "Rose"));
        let copy = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .find(|e| e.file_name().to_string_lossy().starts_with("gifts.json.corrupt-"))
            .expect("copy");
        assert_eq!(std::fs::read_to_string(copy.path()).expect("read copy"), original);
    }

    #[test]
    fn batch_upsert_writes_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store_in(&dir);
        store.upsert_if_absent("1", candidate(Some("A"), "Heart"));
        assert_eq!(store.writes(), 1);

        let batch = (0..50).map(|n| ("1".to_owned(), candidate(Some(format!("N{n}").as_str()), "Rose")));
        let replay = [("1".to_owned(), candidate(Some("A"), "Heart"))];
        assert_eq!(store.upsert_all(batch.chain(replay)), 50);
        assert_eq!(store.writes(), 2);
        assert_eq!(load_snapshot(store.path())["1"].len(), 51);

        // Nothing new, nothing written.
        assert_eq!(store.upsert_all([("1".to_owned(), candidate(Some("A"), "x"))]), 0);
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn batch_upsert_maps_blank_owner_to_unknown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store_in(&dir);
        assert_eq!(store.upsert_all([(" ".to_owned(), candidate(Some("A"), "x"))]), 1);
        assert_eq!(store.owner_items(UNKNOWN_OWNER).len(), 1);
    }

    #[test]
    fn duplicates_in_loaded_file_are_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gifts.json");
        std::fs::write(
            &path,
            r#"{"1": [
                {"ownedId": "A", "displayName": "first", "observedAtMs": 1},
                {"ownedId": "A", "displayName": "second", "observedAtMs": 2}
            ]}"#,
        )
        .expect("write");

        let store = RecordStore::open(&path);
        let items = store.owner_items("1");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].display_name.as_deref(), Some("first"));
    }

    #[test]
    fn interrupted_write_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store_in(&dir);
        store.upsert_if_absent("1", candidate(Some("A"), "Heart"));
        let committed = store.snapshot().clone();

        // Mutate in memory only, stage, then "crash" before the rename:
        // forgetting the staged file skips its cleanup like a dead process.
        store.insert_item("1", candidate(Some("B"), "Rose").into_item());
        let staged = store.stage().expect("stage");
        assert!(staged.temp_path().exists());
        std::mem::forget(staged);

        assert_eq!(load_snapshot(store.path()), committed);
    }

    #[test]
    fn persist_failure_keeps_memory_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = RecordStore::open(dir.path().join("missing").join("gifts.json"));

        assert!(store.upsert_if_absent("1", candidate(Some("A"), "Heart")));
        assert!(store.contains("1", "A"));
        assert!(!store.upsert_if_absent("1", candidate(Some("A"), "Heart")));
        assert_eq!(store.writes(), 0);
    }

    mod proptests {
        use super::*;
        use giftvault_core::{GiftCandidate, Item};
        use proptest::prelude::*;
        use std::collections::HashSet;

        fn arb_candidate() -> impl Strategy<Value = GiftCandidate> {
            (
                proptest::option::of("[A-Z]{1,3}"),
                proptest::option::of("[a-z]{1,6}"),
                proptest::option::of(0u64..50),
            )
                .prop_map(|(owned_id, display_name, serial_number)| GiftCandidate {
                    item_id: None,
                    owned_id,
                    display_name,
                    serial_number,
                    media_ref: None,
                    observed_at_ms: 0,
                })
        }

        proptest! {
            /// Upserting the same candidate twice stores it once.
            #[test]
            fn upsert_is_idempotent(owner in "[0-9]{1,4}", c in arb_candidate()) {
                let dir = tempfile::tempdir().expect("tempdir");
                let mut store = store_in(&dir);
                prop_assert!(store.upsert_if_absent(&owner, c.clone()));
                prop_assert!(!store.upsert_if_absent(&owner, c));
                prop_assert_eq!(store.owner_items(&owner).len(), 1);
            }

            /// No owner collection ever holds two items with the same key.
            #[test]
            fn keys_stay_unique(
                ops in proptest::collection::vec(("[0-2]", arb_candidate()), 0..40),
            ) {
                let dir = tempfile::tempdir().expect("tempdir");
                let mut store = store_in(&dir);
                for (owner, c) in ops {
                    store.upsert_if_absent(&owner, c);
                }
                for items in store.snapshot().values() {
                    let keys: HashSet<&str> = items.iter().map(Item::dedup_key).collect();
                    prop_assert_eq!(keys.len(), items.len());
                }
            }
        }
    }
}
