//! Edge case tests for hearth-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use hearth_engine::{
    Blob, Codec, Lz4Codec, MemoryStorage, RecordStore, SetOutcome, Snapshot, Storage,
};
use serde_json::json;

fn create_test_store() -> RecordStore<MemoryStorage> {
    RecordStore::open(MemoryStorage::new(), Lz4Codec).unwrap()
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn empty_string_value() {
    let mut store = create_test_store();
    assert_eq!(store.set("name", &"", 1000).unwrap(), SetOutcome::Written);
    assert_eq!(store.get("name"), Some(json!("")));
}

#[test]
fn empty_key() {
    let mut store = create_test_store();
    store.set("", &1, 1000).unwrap();
    assert_eq!(store.get(""), Some(json!(1)));
    assert_eq!(store.keys(), [String::new()]);
}

#[test]
fn unicode_values_and_keys() {
    let mut store = create_test_store();

    let values = vec![
        "日本語テスト",
        "Привет мир",
        "مرحبا بالعالم",
        "🎉🚀💯",
        "Ω≈ç√∫",
        "Hello\nWorld\tTab",
        "Null\0Test",
    ];

    for (i, value) in values.iter().enumerate() {
        let key = format!("note_{i}_{value}");
        store.set(&key, value, 1000 + i as u64).unwrap();
        assert_eq!(store.get(&key), Some(json!(value)), "Failed for: {value}");
    }
    assert_eq!(store.len(), values.len());
}

#[test]
fn keys_that_look_like_metadata() {
    let mut store = create_test_store();
    store.set("meta:age", &"user data", 1000).unwrap();
    store.set("meta:keys", &["x"], 1001).unwrap();

    assert_eq!(store.age(), 1001);
    assert_eq!(store.get("meta:age"), Some(json!("user data")));

    let reopened = RecordStore::open(store.into_storage(), Lz4Codec).unwrap();
    assert_eq!(reopened.age(), 1001);
    assert_eq!(reopened.len(), 2);
}

#[test]
fn very_long_strings() {
    let mut store = create_test_store();

    // 1MB string
    let long_string = "x".repeat(1024 * 1024);
    store.set("big", &long_string, 1000).unwrap();

    let raw = store.raw("big").unwrap();
    assert!(raw.as_str().len() < long_string.len());
    assert_eq!(
        store.get("big").unwrap().as_str().unwrap().len(),
        1024 * 1024
    );
}

// ============================================================================
// Numeric Edge Cases
// ============================================================================

#[test]
fn integer_boundaries() {
    let mut store = create_test_store();

    let values = vec![i64::MIN, i64::MAX, 0i64, -1i64, 1i64];
    for (i, value) in values.iter().enumerate() {
        let key = format!("n{i}");
        store.set(&key, value, 1000).unwrap();
        assert_eq!(store.get(&key), Some(json!(value)));
    }
}

#[test]
fn age_at_upper_bound() {
    let mut store = create_test_store();
    store.set("a", &1, u64::MAX).unwrap();
    store.set("a", &2, 0).unwrap();
    assert_eq!(store.age(), u64::MAX);
}

// ============================================================================
// JSON Edge Cases
// ============================================================================

#[test]
fn deeply_nested_json() {
    let mut store = create_test_store();

    let mut nested = json!("leaf");
    for _ in 0..50 {
        nested = json!({"child": nested});
    }
    store.set("tree", &nested, 1000).unwrap();
    assert_eq!(store.get("tree"), Some(nested));
}

#[test]
fn json_with_all_types() {
    let mut store = create_test_store();
    let value = json!({
        "string": "text",
        "int": 42,
        "float": 1.5,
        "bool": true,
        "null": null,
        "array": [1, "two", null, {"three": 3}],
        "object": {"nested": {"deep": []}}
    });
    store.set("all", &value, 1000).unwrap();
    assert_eq!(store.get("all"), Some(value));
}

#[test]
fn falsy_but_not_null_values_are_stored() {
    let mut store = create_test_store();
    for (key, value) in [
        ("zero", json!(0)),
        ("false", json!(false)),
        ("empty_list", json!([])),
        ("empty_object", json!({})),
    ] {
        assert_eq!(store.set(key, &value, 1000).unwrap(), SetOutcome::Written);
        assert_eq!(store.get(key), Some(value));
    }
}

#[test]
fn rapid_updates_same_key() {
    let mut store = create_test_store();
    for i in 0..100u64 {
        store.set("counter", &i, 1000).unwrap();
    }
    assert_eq!(store.get("counter"), Some(json!(99)));
    // One age bump per distinct write, even with a frozen wall clock
    assert_eq!(store.age(), 1099);
}

// ============================================================================
// Snapshot Edge Cases
// ============================================================================

#[test]
fn snapshot_empty_store() {
    let store = create_test_store();
    let text = store.export(false, 0).unwrap();
    let snapshot = store.import(&text);

    assert!(snapshot.is_sentinel());
    assert_eq!(snapshot, Snapshot::sentinel());
}

#[test]
fn snapshot_after_remove_all() {
    let mut store = create_test_store();
    store.set("a", &1, 1000).unwrap();
    store.remove_all(2000).unwrap();

    let snapshot = store.import(&store.export(false, 0).unwrap());
    assert!(snapshot.keys.is_empty());
    assert_eq!(snapshot.age, 2000);
}

#[test]
fn apply_empty_newer_snapshot_clears_store() {
    let mut store = create_test_store();
    store.set("a", &1, 1000).unwrap();
    store.set("b", &2, 1001).unwrap();

    let empty = Snapshot {
        keys: vec![],
        values: vec![],
        age: 5000,
    };
    store.apply(&empty).unwrap();

    assert!(store.is_empty());
    assert_eq!(store.age(), 5000);
    assert_eq!(store.storage().len(), 2); // only index and age slots
}

#[test]
fn apply_corrupt_blob_reads_as_absent() {
    let mut store = create_test_store();
    let snapshot = Snapshot {
        keys: vec!["bad".into()],
        values: vec![Some(Blob::from_encoded("%%%"))],
        age: 10,
    };
    store.apply(&snapshot).unwrap();

    assert!(store.contains("bad"));
    assert_eq!(store.get("bad"), None);
}

#[test]
fn truncated_payload_is_sentinel() {
    let mut store = create_test_store();
    store.set("tasks", &json!(["T1", "T2"]), 1000).unwrap();
    let text = store.export(false, 0).unwrap();

    let truncated = &text[..text.len() / 2];
    assert!(store.import(truncated).is_sentinel());
}

#[test]
fn payload_from_other_codec_is_sentinel() {
    let store = create_test_store();
    let plain = r#"{"keys":["a"],"values":[null],"age":99}"#;
    assert!(store.import(plain).is_sentinel());
    // Same JSON through the codec is accepted
    let encoded = Lz4Codec.compress(plain);
    assert_eq!(store.import(encoded.as_str()).age, 99);
}

// ============================================================================
// Storage Edge Cases
// ============================================================================

#[test]
fn many_keys() {
    let mut store = create_test_store();
    for i in 0..1000u64 {
        store.set(&format!("task_{i}"), &json!({"i": i}), 1000 + i).unwrap();
    }
    assert_eq!(store.len(), 1000);

    let snapshot = store.import(&store.export(false, 0).unwrap());
    assert_eq!(snapshot.keys.len(), 1000);
    assert_eq!(snapshot.age, 1999);
}

#[test]
fn index_and_blobs_stay_consistent() {
    let mut store = create_test_store();
    store.set("a", &1, 1).unwrap();
    store.set("b", &2, 2).unwrap();
    store.remove("a", 3).unwrap();
    store.set("c", &3, 4).unwrap();

    let storage = store.storage();
    for key in store.keys() {
        assert!(storage.get_item(&format!("record:{key}")).unwrap().is_some());
    }
    assert!(storage.get_item("record:a").unwrap().is_none());
}
