//! Durability of the record store across restarts and interrupted writes.

use giftvault_core::{GiftCandidate, Item, MediaRef, Snapshot};
use giftvault_store::{RecordStore, SNAPSHOT_FILE, Vault, load_snapshot};

fn candidate(owned_id: &str, name: &str, observed_at_ms: i64) -> GiftCandidate {
    GiftCandidate {
        item_id: Some("5170145012310081615".to_owned()),
        owned_id: Some(owned_id.to_owned()),
        display_name: Some(name.to_owned()),
        serial_number: None,
        media_ref: Some(MediaRef::sticker("STK-1")),
        observed_at_ms,
    }
}

#[test]
fn fresh_instance_sees_persisted_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(SNAPSHOT_FILE);

    let mut store = RecordStore::open(&path);
    assert!(store.upsert_if_absent("42", candidate("A", "Rose", 1)));
    assert!(store.upsert_if_absent("42", candidate("B", "Bear", 2)));
    assert!(store.upsert_if_absent("7", candidate("A", "Rose", 3)));
    let before = store.snapshot().clone();
    drop(store);

    let reopened = RecordStore::open(&path);
    assert_eq!(reopened.snapshot(), &before);
    assert_eq!(reopened.item_count(), 3);
    assert_eq!(reopened.owner_items("42")[1].owned_id, "B");
}

#[test]
fn new_gift_event_persists_expected_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut vault = Vault::open(dir.path(), None).expect("open");

    assert!(
        vault
            .records
            .upsert_if_absent("42", candidate("A", "Rose", 1_700_000_000_000))
    );

    let raw = std::fs::read_to_string(dir.path().join(SNAPSHOT_FILE)).expect("read");
    let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
    let items = json["42"].as_array().expect("owner array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["ownedId"], "A");
    assert_eq!(items[0]["itemId"], "5170145012310081615");
    assert_eq!(items[0]["displayName"], "Rose");
    assert_eq!(items[0]["observedAtMs"], 1_700_000_000_000_i64);
    assert_eq!(items[0]["mediaRef"]["kind"], "sticker");
    assert_eq!(items[0]["mediaRef"]["fileId"], "STK-1");
}

#[test]
fn interrupted_write_keeps_previous_snapshot_readable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(SNAPSHOT_FILE);

    let mut store = RecordStore::open(&path);
    store.upsert_if_absent("42", candidate("A", "Rose", 1));
    let committed = load_snapshot(&path);

    // Stage a newer snapshot but never commit it, as if the process died
    // between writing the temp file and renaming it.
    let mut pending: Snapshot = store.snapshot().clone();
    pending.entry("42".to_owned()).or_default().push(Item {
        item_id: None,
        owned_id: "B".to_owned(),
        display_name: None,
        serial_number: None,
        observed_at_ms: 2,
        media_ref: None,
    });
    let staged = RecordStore::from_snapshot(&path, pending).stage().expect("stage");
    std::mem::forget(staged);

    let after = load_snapshot(&path);
    assert_eq!(after, committed);
    assert_eq!(after["42"].len(), 1);
}

#[test]
fn corrupt_snapshot_is_moved_aside_and_store_starts_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(SNAPSHOT_FILE);
    std::fs::write(&path, b"{\"42\": [").expect("write");

    let mut store = RecordStore::open(&path);
    assert_eq!(store.item_count(), 0);
    assert!(store.upsert_if_absent("42", candidate("A", "Rose", 1)));

    let aside: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read_dir")
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("gifts.json.corrupt-"))
        .collect();
    assert_eq!(aside.len(), 1, "entries: {aside:?}");
    assert_eq!(RecordStore::open(&path).item_count(), 1);
}

#[test]
fn identity_and_records_reload_together() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let mut vault = Vault::open(dir.path(), None).expect("open");
        vault.identity.set_if_absent("BC-1");
        vault.records.upsert_if_absent("42", candidate("A", "Rose", 1));
    }
    let vault = Vault::open(dir.path(), None).expect("reopen");
    assert_eq!(vault.identity.get(), Some("BC-1"));
    assert!(vault.records.contains("42", "A"));
}
