//! Property tests for the store and the merge rule.

use hearth_engine::{
    InboundOutcome, LocalIdentity, Lz4Codec, MemoryStorage, MemoryTransport, PeerDirectory,
    RecordStore, SyncCoordinator,
};
use proptest::prelude::*;
use serde_json::Value;

type Device = SyncCoordinator<MemoryStorage, MemoryStorage, MemoryTransport>;

fn device() -> Device {
    SyncCoordinator::new(
        LocalIdentity::new("self"),
        RecordStore::open(MemoryStorage::new(), Lz4Codec).unwrap(),
        PeerDirectory::open(MemoryStorage::new()).unwrap(),
        MemoryTransport::new(),
    )
}

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        ".{0,24}".prop_map(Value::from),
    ];
    leaf.prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn entries() -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::vec(("[a-z]{1,6}", json_value()), 1..8)
}

proptest! {
    #[test]
    fn get_returns_what_was_set(key in ".{0,16}", value in json_value()) {
        let mut store = RecordStore::open(MemoryStorage::new(), Lz4Codec).unwrap();
        store.set(&key, &value, 1000).unwrap();
        prop_assert_eq!(store.get(&key), Some(value));
    }

    #[test]
    fn repeated_set_bumps_age_once(value in json_value(), t1 in 1u64..1_000_000, dt in 0u64..1_000_000) {
        let mut store = RecordStore::open(MemoryStorage::new(), Lz4Codec).unwrap();
        store.set("k", &value, t1).unwrap();
        let age = store.age();
        store.set("k", &value, t1 + dt).unwrap();
        prop_assert_eq!(store.age(), age);
    }

    #[test]
    fn snapshot_roundtrip_is_identity(entries in entries(), now in 0u64..u64::MAX) {
        let mut store = RecordStore::open(MemoryStorage::new(), Lz4Codec).unwrap();
        for (i, (key, value)) in entries.iter().enumerate() {
            store.set(key, value, 1000 + i as u64).unwrap();
        }
        let keys = store.keys().to_vec();
        let values: Vec<_> = keys.iter().map(|k| store.get(k)).collect();
        let age = store.age();

        let snapshot = store.import(&store.export(false, now).unwrap());
        store.apply(&snapshot).unwrap();

        prop_assert_eq!(store.keys(), &keys[..]);
        prop_assert_eq!(keys.iter().map(|k| store.get(k)).collect::<Vec<_>>(), values);
        prop_assert_eq!(store.age(), age);
    }

    #[test]
    fn merge_is_last_writer_wins(
        local in entries(),
        remote in entries(),
        local_age in 1u64..10_000,
        remote_age in 1u64..10_000,
    ) {
        let mut local_dev = device();
        for (key, value) in &local {
            local_dev.set(key, value, local_age).unwrap();
        }
        let mut remote_dev = device();
        for (key, value) in &remote {
            remote_dev.set(key, value, remote_age).unwrap();
        }

        let local_state = local_dev.store().snapshot(false, 0);
        let remote_state = remote_dev.store().snapshot(false, 0);
        let payload = remote_dev.store().export(false, 0).unwrap();

        let outcome = local_dev.on_inbound_message("remote", &payload).unwrap();
        let after = local_dev.store().snapshot(false, 0);

        if remote_state.age > local_state.age {
            prop_assert!(matches!(outcome, InboundOutcome::Merged(_)));
            prop_assert_eq!(after, remote_state);
        } else {
            prop_assert!(matches!(outcome, InboundOutcome::Stale { .. }), "unexpected merge");
            prop_assert_eq!(after, local_state);
        }
    }

    #[test]
    fn arbitrary_text_never_wins(text in ".*") {
        let mut dev = device();
        dev.set("k", &1, 1).unwrap();
        let outcome = dev.on_inbound_message("remote", &text).unwrap();
        prop_assert!(matches!(outcome, InboundOutcome::Stale { .. }), "garbage merged");
        prop_assert_eq!(dev.store().get("k"), Some(Value::from(1)));
    }
}
