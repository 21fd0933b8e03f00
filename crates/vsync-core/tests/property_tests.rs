//! Property tests: after a flush the store mirrors the collection

use std::sync::Arc;

use proptest::prelude::*;
use vsync_core::{ChangeKind, Handle, ObservedCollection, RegistrySyncBus, ShutdownSignal};
use vsync_meta::SyncConfig;
use vsync_test_utils::{RecordingStore, key};

#[derive(Debug, Clone)]
enum Op {
    Insert(u64),
    Remove(u64),
    Flush,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u64..16).prop_map(Op::Insert),
        2 => (0u64..16).prop_map(Op::Remove),
        1 => Just(Op::Flush),
    ]
}

proptest! {
    #[test]
    fn store_mirrors_collection_after_flush(ops in prop::collection::vec(op(), 0..64)) {
        let store = Arc::new(RecordingStore::new());
        let signal = ShutdownSignal::new();
        let bus = RegistrySyncBus::with_store(store.clone(), Arc::new(SyncConfig::new()), &signal)
            .unwrap();
        let collection = ObservedCollection::new();
        bus.bootstrap(&collection).unwrap();

        let mut expected_records = Vec::new();
        for op in &ops {
            match *op {
                Op::Insert(handle) => {
                    collection.insert(key(handle));
                    expected_records.push((Handle(handle), ChangeKind::Set));
                }
                Op::Remove(handle) => {
                    if collection.remove(Handle(handle)).is_some() {
                        expected_records.push((Handle(handle), ChangeKind::Remove));
                    }
                }
                Op::Flush => {
                    bus.flush().unwrap();
                }
            }
        }
        bus.flush().unwrap();

        prop_assert_eq!(store.handles(), collection.handles());
        let applied: Vec<_> = store.records().iter().map(|r| (r.handle(), r.kind())).collect();
        prop_assert_eq!(applied, expected_records);
        prop_assert!(store.batches().iter().all(|batch| !batch.is_empty()));
    }
}
