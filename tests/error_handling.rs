//! Error handling and edge case tests.

use diffchain::{
    FaultPolicy, HistoryError, MemoryStore, SaveOutcome, Store, StoreConfig, StructuralCodec,
    VersionId,
};
use serde_json::json;
use std::sync::Arc;

type SharedStore = Store<Arc<MemoryStore>>;

fn open(memory: &Arc<MemoryStore>, policy: FaultPolicy) -> SharedStore {
    Store::open(
        Arc::clone(memory),
        StructuralCodec,
        StoreConfig {
            fault_policy: policy,
            ..Default::default()
        },
    )
    .unwrap()
}

fn test_store(policy: FaultPolicy) -> (Arc<MemoryStore>, SharedStore) {
    let memory = Arc::new(MemoryStore::new());
    let store = open(&memory, policy);
    (memory, store)
}

fn saved_id(outcome: SaveOutcome) -> VersionId {
    outcome.version().expect("expected a saved version").id
}

fn record_path(id: VersionId) -> String {
    format!("history/v{}.diff", id)
}

// --- Head Pointer Faults ---

#[test]
fn test_malformed_head_is_none_when_lenient() {
    let (memory, store) = test_store(FaultPolicy::Lenient);
    store.save_new_version(json!({"a": 1})).unwrap();

    memory.put_raw("head.json", "{not json");

    assert_eq!(store.current_version().unwrap(), None);
    assert_eq!(store.previous().unwrap(), None);
    assert_eq!(store.next().unwrap(), None);
}

#[test]
fn test_malformed_head_is_error_when_strict() {
    let (memory, store) = test_store(FaultPolicy::Strict);
    store.save_new_version(json!({"a": 1})).unwrap();

    memory.put_raw("head.json", "{not json");

    assert!(matches!(
        store.current_version(),
        Err(HistoryError::Deserialization(_))
    ));
}

#[test]
fn test_head_with_non_numeric_id() {
    let (memory, store) = test_store(FaultPolicy::Lenient);
    memory.put_raw("head.json", r#"{"version": "latest"}"#);
    assert_eq!(store.current_version().unwrap(), None);

    let strict = open(&memory, FaultPolicy::Strict);
    assert!(strict.current_version().is_err());
}

#[test]
fn test_head_outside_history_has_no_neighbors() {
    let (memory, store) = test_store(FaultPolicy::Strict);
    store.save_new_version(json!({"a": 1})).unwrap();
    store.save_new_version(json!({"a": 2})).unwrap();

    memory.put_raw("head.json", r#"{"version": "5"}"#);

    assert_eq!(store.current_version().unwrap(), Some(VersionId(5)));
    assert_eq!(store.previous().unwrap(), None);
    assert_eq!(store.next().unwrap(), None);
    assert!(store.apply_previous().unwrap().is_none());
}

#[test]
fn test_set_current_version_rejects_unknown_id() {
    let (_, store) = test_store(FaultPolicy::Strict);
    let v1 = saved_id(store.save_new_version(json!({"a": 1})).unwrap());

    assert!(!store.set_current_version(VersionId(v1.0 + 1000)).unwrap());
    assert_eq!(store.current_version().unwrap(), Some(v1));
}

// --- Snapshot Faults ---

#[test]
fn test_malformed_snapshot_is_empty_when_lenient() {
    let (memory, store) = test_store(FaultPolicy::Lenient);
    memory.put_raw("document.json", "[[[");

    assert_eq!(store.snapshot().unwrap(), json!({}));
}

#[test]
fn test_malformed_snapshot_is_error_when_strict() {
    let (memory, store) = test_store(FaultPolicy::Strict);
    memory.put_raw("document.json", "[[[");

    assert!(store.snapshot().is_err());
    assert!(store.save_new_version(json!({"a": 1})).is_err());
}

#[test]
fn test_save_rebuilds_from_history_when_snapshot_is_malformed() {
    let (memory, store) = test_store(FaultPolicy::Lenient);
    store.save_new_version(json!({"a": 1})).unwrap();

    memory.put_raw("document.json", "oops");

    let v2 = saved_id(store.save_new_version(json!({"a": 1, "b": 2})).unwrap());
    assert_eq!(store.reconstruct(v2).unwrap(), Some(json!({"a": 1, "b": 2})));
    assert_eq!(store.snapshot().unwrap(), json!({"a": 1, "b": 2}));
}

#[test]
fn test_save_rebuilds_from_history_when_snapshot_is_missing() {
    let (memory, store) = test_store(FaultPolicy::Strict);
    store.save_new_version(json!({"a": 1, "b": 2})).unwrap();

    assert!(memory.remove("document.json"));

    let v2 = saved_id(store.save_new_version(json!({"b": 2})).unwrap());
    assert_eq!(store.reconstruct(v2).unwrap(), Some(json!({"b": 2})));
}

#[test]
fn test_empty_target_resets_stale_snapshot_without_history() {
    let (memory, store) = test_store(FaultPolicy::Strict);
    memory.put_raw("document.json", r#"{"stale": 1}"#);

    let outcome = store.save_new_version(json!({})).unwrap();

    assert!(outcome.is_no_change());
    assert_eq!(store.snapshot().unwrap(), json!({}));
    assert!(store.list_versions().unwrap().is_empty());
    assert_eq!(store.current_version().unwrap(), None);
}

// --- Listing Faults ---

#[test]
fn test_listing_fault_is_empty_history_when_lenient() {
    let (memory, store) = test_store(FaultPolicy::Lenient);
    let v1 = saved_id(store.save_new_version(json!({"a": 1})).unwrap());

    memory.fail_listing(true);

    assert!(store.list_versions().unwrap().is_empty());
    assert_eq!(store.latest().unwrap(), None);
    assert_eq!(store.reconstruct(v1).unwrap(), None);
    assert_eq!(store.previous().unwrap(), None);
}

#[test]
fn test_listing_fault_is_error_when_strict() {
    let (memory, store) = test_store(FaultPolicy::Strict);
    store.save_new_version(json!({"a": 1})).unwrap();

    memory.fail_listing(true);

    assert!(matches!(store.list_versions(), Err(HistoryError::Store(_))));
    assert!(store.latest().is_err());
}

#[test]
fn test_listing_fault_aborts_mutations_under_any_policy() {
    let (memory, store) = test_store(FaultPolicy::Lenient);
    let v1 = saved_id(store.save_new_version(json!({"a": 1})).unwrap());

    memory.fail_listing(true);

    assert!(store.save_new_version(json!({"a": 2})).is_err());
    assert!(store.apply_version(v1).is_err());
    assert!(store.set_current_version(v1).is_err());

    memory.fail_listing(false);
    assert_eq!(store.list_versions().unwrap(), vec![v1]);
    assert_eq!(store.snapshot().unwrap(), json!({"a": 1}));
}

// --- Record Faults ---

#[test]
fn test_corrupt_middle_record_fails_later_reconstruction() {
    let (memory, store) = test_store(FaultPolicy::Lenient);
    let v1 = saved_id(store.save_new_version(json!({"a": 1})).unwrap());
    let v2 = saved_id(store.save_new_version(json!({"a": 1, "b": 2})).unwrap());
    let v3 = saved_id(store.save_new_version(json!({"c": 3})).unwrap());
    drop(store);

    memory.put_raw(record_path(v2), "null");
    let store = open(&memory, FaultPolicy::Lenient);

    assert_eq!(store.reconstruct(v1).unwrap(), Some(json!({"a": 1})));
    assert!(matches!(
        store.reconstruct(v3),
        Err(HistoryError::Corruption(_))
    ));
}

#[test]
fn test_removed_record_drops_out_of_listing() {
    let (memory, store) = test_store(FaultPolicy::Strict);
    let v1 = saved_id(store.save_new_version(json!({"a": 1})).unwrap());
    let v2 = saved_id(store.save_new_version(json!({"a": 1, "b": 2})).unwrap());
    drop(store);

    assert!(memory.remove(record_path(v1)));
    let store = open(&memory, FaultPolicy::Strict);

    assert_eq!(store.list_versions().unwrap(), vec![v2]);
    // v2 alone replays onto an empty object, where its nested key is absent
    assert_eq!(store.reconstruct(v2).unwrap(), Some(json!({"b": 2})));
}

#[test]
fn test_corrupt_record_is_corruption() {
    let (memory, store) = test_store(FaultPolicy::Lenient);
    let v1 = saved_id(store.save_new_version(json!({"a": 1})).unwrap());
    drop(store);

    memory.put_raw(record_path(v1), r#"{"op": "shuffle"}"#);
    let store = open(&memory, FaultPolicy::Lenient);

    assert!(matches!(
        store.reconstruct(v1),
        Err(HistoryError::Corruption(_))
    ));
    assert!(store.apply_version(v1).is_err());
}

#[test]
fn test_unparseable_record_fails_reconstruction() {
    let (memory, store) = test_store(FaultPolicy::Lenient);
    let v1 = saved_id(store.save_new_version(json!({"a": 1})).unwrap());
    drop(store);

    memory.put_raw(record_path(v1), "{{{{");
    let store = open(&memory, FaultPolicy::Lenient);

    assert!(matches!(
        store.reconstruct(v1),
        Err(HistoryError::Deserialization(_))
    ));
}

#[test]
fn test_zero_padded_record_name_is_ignored() {
    let (memory, store) = test_store(FaultPolicy::Strict);
    let v1 = saved_id(store.save_new_version(json!({"a": 1})).unwrap());

    memory.put_raw("history/v0007.diff", r#"{"op": "replace", "value": 7}"#);

    assert_eq!(store.list_versions().unwrap(), vec![v1]);
    assert!(!store.set_current_version(VersionId(7)).unwrap());
    assert_eq!(store.reconstruct(VersionId(7)).unwrap(), None);
    assert!(store.verify().unwrap().is_healthy());
}

#[test]
fn test_verify_reports_unreadable_records() {
    let (memory, store) = test_store(FaultPolicy::Lenient);
    store.save_new_version(json!({"a": 1})).unwrap();
    let v2 = saved_id(store.save_new_version(json!({"a": 2})).unwrap());
    drop(store);

    memory.put_raw(record_path(v2), "garbage");
    let store = open(&memory, FaultPolicy::Lenient);

    let report = store.verify().unwrap();
    assert_eq!(report.unreadable, vec![v2]);
    assert!(!report.snapshot_matches_head);
    assert!(!report.is_healthy());
}

// --- Write Faults ---

#[test]
fn test_failed_record_write_leaves_history_unchanged() {
    let (memory, store) = test_store(FaultPolicy::Strict);
    let v1 = saved_id(store.save_new_version(json!({"a": 1})).unwrap());

    memory.fail_writes_to(".diff");
    assert!(store.save_new_version(json!({"a": 2})).is_err());
    memory.clear_faults();

    assert_eq!(store.list_versions().unwrap(), vec![v1]);
    assert_eq!(store.current_version().unwrap(), Some(v1));
    assert_eq!(store.snapshot().unwrap(), json!({"a": 1}));
}

// --- Boundary Conditions ---

#[test]
fn test_empty_history_navigation() {
    let (_, store) = test_store(FaultPolicy::Strict);

    assert_eq!(store.previous().unwrap(), None);
    assert_eq!(store.next().unwrap(), None);
    assert_eq!(store.initial().unwrap(), None);
    assert_eq!(store.latest().unwrap(), None);
    assert_eq!(store.apply_latest().unwrap(), None);
    assert_eq!(store.reconstruct(VersionId(1)).unwrap(), None);
}

#[test]
fn test_non_object_documents() {
    let (_, store) = test_store(FaultPolicy::Strict);

    let v1 = saved_id(store.save_new_version(json!([1, 2, 3])).unwrap());
    let v2 = saved_id(store.save_new_version(json!("plain string")).unwrap());
    let v3 = saved_id(store.save_new_version(json!(null)).unwrap());

    assert_eq!(store.reconstruct(v1).unwrap(), Some(json!([1, 2, 3])));
    assert_eq!(store.reconstruct(v2).unwrap(), Some(json!("plain string")));
    assert_eq!(store.reconstruct(v3).unwrap(), Some(json!(null)));
}

#[test]
fn test_unicode_keys_and_values() {
    let (_, store) = test_store(FaultPolicy::Strict);

    let doc = json!({"名前": "値", "emoji": "🦀", "nested": {"ключ": ["α", "β"]}});
    let id = saved_id(store.save_new_version(doc.clone()).unwrap());

    assert_eq!(store.reconstruct(id).unwrap(), Some(doc));
}
