//! Behavioral tests for the synchronization bus

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use rstest::rstest;
use vsync_core::{
    ChangeKind, Error, Handle, ObservedCollection, RegistrySyncBus, SchedulerState,
    ShutdownSignal, VirtualRegistryKey,
};
use vsync_meta::{SyncConfig, SyncSettings};
use vsync_test_utils::{FailureMode, RecordingStore, key, keys};

type Store = RecordingStore<VirtualRegistryKey>;

struct Harness {
    store: Arc<Store>,
    signal: ShutdownSignal,
    bus: RegistrySyncBus,
    collection: ObservedCollection<VirtualRegistryKey>,
}

fn harness(store: Store) -> Harness {
    let store = Arc::new(store);
    let signal = ShutdownSignal::new();
    let bus =
        RegistrySyncBus::with_store(store.clone(), Arc::new(SyncConfig::new()), &signal).unwrap();
    let collection = ObservedCollection::new();
    bus.bootstrap(&collection).unwrap();
    Harness {
        store,
        signal,
        bus,
        collection,
    }
}

/// Poll `condition` until it holds or five seconds pass.
fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn bootstrap_then_add_then_flush() {
    let a = key(1);
    let b = key(2);
    let c = key(3);
    let h = harness(RecordingStore::seeded([a.clone(), b.clone()]));

    assert_eq!(h.collection.snapshot(), vec![a, b]);
    assert_eq!(h.bus.pending_len(), 0);

    h.collection.insert(c.clone());
    assert_eq!(h.bus.pending_len(), 1);

    let report = h.bus.flush().unwrap();
    assert_eq!(report.sets, 1);
    assert_eq!(h.store.records().len(), 1);
    assert_eq!(h.store.records()[0].kind(), ChangeKind::Set);
    assert_eq!(h.store.records()[0].payload(), &c);
    assert_eq!(h.store.handles(), vec![Handle(1), Handle(2), Handle(3)]);
    assert_eq!(h.bus.pending_len(), 0);
}

#[test]
fn remove_then_immediate_flush_deletes_from_store() {
    let h = harness(RecordingStore::seeded(keys(1..=2)));

    h.collection.remove(Handle(1));
    h.bus.flush().unwrap();

    assert!(h.store.get(Handle(1)).is_none());
    assert!(h.store.get(Handle(2)).is_some());
}

#[test]
fn bootstrap_replaces_collection_contents() {
    let store = Arc::new(RecordingStore::seeded(keys([4, 5])));
    let signal = ShutdownSignal::new();
    let bus = RegistrySyncBus::with_store(store.clone(), Arc::new(SyncConfig::new()), &signal)
        .unwrap();
    let collection = ObservedCollection::new();
    collection.insert(key(99));

    assert_eq!(bus.bootstrap(&collection).unwrap(), 2);
    assert_eq!(collection.handles(), vec![Handle(4), Handle(5)]);
    // Loading is not a change
    assert_eq!(bus.pending_len(), 0);
    assert_eq!(store.initialize_calls(), 1);
}

#[test]
fn failed_bootstrap_leaves_collection_and_bus_untouched() {
    let store = Arc::new(RecordingStore::seeded(keys([1, 2])));
    store.set_read_failure(FailureMode::Error);
    let signal = ShutdownSignal::new();
    let bus = RegistrySyncBus::with_store(store.clone(), Arc::new(SyncConfig::new()), &signal)
        .unwrap();
    let collection = ObservedCollection::new();
    collection.insert(key(9));

    let err = bus.bootstrap(&collection).unwrap_err();

    assert!(matches!(err, Error::Store { .. }));
    assert_eq!(collection.handles(), vec![Handle(9)]);
    assert!(!bus.is_bridged());
    assert_eq!(collection.observer_count(), 0);

    store.set_read_failure(FailureMode::None);
    assert_eq!(bus.bootstrap(&collection).unwrap(), 2);
    assert!(bus.is_bridged());
    assert_eq!(collection.handles(), vec![Handle(1), Handle(2)]);
}

#[test]
fn records_keep_mutation_order_within_a_batch() {
    let h = harness(RecordingStore::new());

    h.collection.insert(key(1));
    h.collection
        .insert(key(1).with_value("Extra", vsync_core::RegistryValue::DWord(7)));
    h.collection.remove(Handle(1));
    h.collection.insert(key(2));

    h.bus.flush().unwrap();

    let batches = h.store.batches();
    assert_eq!(batches.len(), 1);
    let kinds: Vec<(Handle, ChangeKind)> =
        batches[0].iter().map(|r| (r.handle(), r.kind())).collect();
    assert_eq!(
        kinds,
        vec![
            (Handle(1), ChangeKind::Set),
            (Handle(1), ChangeKind::Set),
            (Handle(1), ChangeKind::Remove),
            (Handle(2), ChangeKind::Set),
        ]
    );
    assert_eq!(h.store.handles(), vec![Handle(2)]);
}

#[test]
fn empty_flush_never_reaches_store() {
    let h = harness(RecordingStore::new());

    let report = h.bus.flush().unwrap();
    assert!(report.is_empty());
    h.bus.flush().unwrap();

    assert_eq!(h.store.attempts(), 0);
    assert_eq!(h.bus.status().flushes, 0);
}

#[test]
fn concurrent_mutations_and_flushes_lose_nothing() {
    const WRITERS: u64 = 4;
    const PER_WRITER: u64 = 250;

    let h = Arc::new(harness(RecordingStore::new()));
    let barrier = Arc::new(Barrier::new(WRITERS as usize + 1));

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let h = Arc::clone(&h);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_WRITER {
                    h.collection.insert(key(w * PER_WRITER + i));
                }
            })
        })
        .collect();

    let flusher = {
        let h = Arc::clone(&h);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for _ in 0..50 {
                h.bus.flush().unwrap();
                thread::yield_now();
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    flusher.join().unwrap();
    h.bus.flush().unwrap();

    let records = h.store.records();
    assert_eq!(records.len() as u64, WRITERS * PER_WRITER);
    let unique: BTreeSet<Handle> = records.iter().map(|r| r.handle()).collect();
    assert_eq!(unique.len() as u64, WRITERS * PER_WRITER);
    assert_eq!(h.bus.pending_len(), 0);
}

#[test]
fn change_made_during_flush_lands_in_next_batch() {
    let h = Arc::new(harness(RecordingStore::new()));
    h.store.set_apply_delay(Duration::from_millis(200));
    h.collection.insert(key(1));

    let flusher = {
        let h = Arc::clone(&h);
        thread::spawn(move || h.bus.flush().unwrap())
    };
    // The store is inside apply_batch, so the batch has been drained
    assert!(wait_until(|| h.store.attempts() == 1));
    h.collection.insert(key(2));

    assert_eq!(flusher.join().unwrap().sets, 1);
    assert_eq!(h.bus.pending_len(), 1);

    h.store.set_apply_delay(Duration::ZERO);
    h.bus.flush().unwrap();

    let batches = h.store.batches();
    assert_eq!(batches.len(), 2);
    let handles = |batch: &[vsync_core::ChangeRecord<VirtualRegistryKey>]| {
        batch.iter().map(|r| r.handle()).collect::<Vec<_>>()
    };
    assert_eq!(handles(&batches[0]), vec![Handle(1)]);
    assert_eq!(handles(&batches[1]), vec![Handle(2)]);
    assert_eq!(h.bus.pending_len(), 0);
}

#[rstest]
#[case(-1)]
#[case(i64::MIN)]
fn negative_interval_is_rejected(#[case] millis: i64) {
    let h = harness(RecordingStore::new());
    h.bus.set_flush_interval(250).unwrap();

    let err = h.bus.set_flush_interval(millis).unwrap_err();

    assert!(matches!(err, Error::InvalidArgument { .. }));
    assert_eq!(h.bus.flush_interval_ms(), 250);
}

#[test]
fn zero_interval_is_accepted() {
    let h = harness(RecordingStore::new());
    h.bus.set_flush_interval(0).unwrap();
    assert_eq!(h.bus.flush_interval(), Duration::ZERO);
}

#[test]
fn enabling_twice_runs_one_loop_and_disabling_stops_it() {
    let h = harness(RecordingStore::new());
    h.bus.set_flush_interval(10).unwrap();

    h.bus.set_auto_flush(true).unwrap();
    h.bus.set_auto_flush(true).unwrap();
    assert_eq!(h.bus.status().scheduler, SchedulerState::Running);

    h.collection.insert(key(1));
    assert!(wait_until(|| h.store.len() == 1));

    h.bus.set_auto_flush(false).unwrap();
    assert!(wait_until(|| h.bus.status().scheduler == SchedulerState::Stopped));

    h.collection.insert(key(2));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(h.bus.pending_len(), 1);
    assert!(h.store.get(Handle(2)).is_none());
}

#[test]
fn auto_flush_can_be_restarted() {
    let h = harness(RecordingStore::new());
    h.bus.set_flush_interval(10).unwrap();

    h.bus.set_auto_flush(true).unwrap();
    h.bus.set_auto_flush(false).unwrap();
    assert!(wait_until(|| h.bus.status().scheduler == SchedulerState::Stopped));

    h.bus.set_auto_flush(true).unwrap();
    h.collection.insert(key(1));
    assert!(wait_until(|| h.store.len() == 1));
}

#[test]
fn exit_signal_flushes_pending_changes() {
    const N: u64 = 25;
    let h = harness(RecordingStore::new());
    // Long enough that only the exit flush can persist what follows
    h.bus.set_flush_interval(60_000).unwrap();
    h.bus.set_auto_flush(true).unwrap();

    for handle in 0..N {
        h.collection.insert(key(handle));
    }

    assert!(h.signal.fire());

    assert_eq!(h.store.len() as u64, N);
    assert_eq!(h.bus.pending_len(), 0);
    assert_eq!(h.bus.status().scheduler, SchedulerState::Stopped);

    // The bus is closed for business after exit
    h.collection.insert(key(N));
    assert_eq!(h.bus.pending_len(), 0);
    assert!(!h.bus.is_bridged());
    assert!(matches!(h.bus.set_auto_flush(true), Err(Error::Disposed)));
}

#[test]
fn change_racing_the_exit_flush_is_never_accepted_and_lost() {
    let h = Arc::new(harness(RecordingStore::new()));
    h.bus.set_flush_interval(60_000).unwrap();
    h.collection.insert(key(1));
    h.bus.set_auto_flush(true).unwrap();
    // The loop's first pass persists key 1, then it sleeps for a minute
    assert!(wait_until(|| h.store.get(Handle(1)).is_some()));

    h.collection.insert(key(3));
    h.store.set_apply_delay(Duration::from_millis(300));

    let guest = {
        let h = Arc::clone(&h);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            h.collection.insert(key(2));
        })
    };
    h.signal.fire();
    guest.join().unwrap();

    // The late change stays in the guest's view but was never queued
    assert!(h.collection.contains(Handle(2)));
    assert_eq!(h.bus.pending_len(), 0);
    let persisted: Vec<Handle> = h.store.records().iter().map(|r| r.handle()).collect();
    assert_eq!(persisted, vec![Handle(1), Handle(3)]);
}

#[test]
fn exit_signal_without_auto_flush_leaves_store_alone() {
    let h = harness(RecordingStore::new());
    h.collection.insert(key(1));

    h.signal.fire();

    assert_eq!(h.store.attempts(), 0);
    assert_eq!(h.bus.pending_len(), 1);
}

#[test]
fn disposed_bus_ignores_exit_signal() {
    let h = harness(RecordingStore::new());
    h.bus.set_auto_flush(true).unwrap();
    h.bus.set_auto_flush(false).unwrap();

    h.bus.dispose();
    h.bus.dispose();

    assert_eq!(h.signal.handler_count(), 0);
    assert!(h.bus.is_disposed());
    assert_eq!(h.collection.observer_count(), 0);
}

#[test]
fn dropping_the_bus_releases_collection_and_signal() {
    let store = Arc::new(Store::new());
    let signal = ShutdownSignal::new();
    let collection = ObservedCollection::new();
    {
        let bus =
            RegistrySyncBus::with_store(store, Arc::new(SyncConfig::new()), &signal).unwrap();
        bus.bootstrap(&collection).unwrap();
        bus.set_auto_flush(true).unwrap();
        assert_eq!(signal.handler_count(), 1);
    }
    assert_eq!(signal.handler_count(), 0);
    assert_eq!(collection.observer_count(), 0);
}

#[test]
fn failed_flush_drops_batch_and_reports() {
    let h = harness(RecordingStore::new());
    h.store.set_failure(FailureMode::Error);
    h.collection.insert(key(1));

    let err = h.bus.flush().unwrap_err();
    assert!(matches!(err, Error::Store { .. }));
    assert_eq!(h.bus.pending_len(), 0);

    let status = h.bus.status();
    assert_eq!(status.failed_flushes, 1);
    assert!(status.last_error.is_some());

    h.store.set_failure(FailureMode::None);
    h.collection.insert(key(2));
    h.bus.flush().unwrap();
    assert_eq!(h.store.handles(), vec![Handle(2)]);
}

#[test]
fn panicking_store_becomes_store_error() {
    let h = harness(RecordingStore::new());
    h.store.set_failure(FailureMode::Panic);
    h.collection.insert(key(1));

    assert!(matches!(h.bus.flush(), Err(Error::Store { .. })));

    // The bus stays usable
    h.store.set_failure(FailureMode::None);
    h.collection.insert(key(2));
    assert_eq!(h.bus.flush().unwrap().sets, 1);
}

#[test]
fn scheduled_flush_survives_store_failures() {
    let h = harness(RecordingStore::new());
    h.store.set_failure(FailureMode::Error);
    h.bus.set_flush_interval(10).unwrap();
    h.bus.set_auto_flush(true).unwrap();

    h.collection.insert(key(1));
    assert!(wait_until(|| h.bus.status().failed_flushes >= 1));
    assert_eq!(h.bus.status().scheduler, SchedulerState::Running);

    h.store.set_failure(FailureMode::None);
    h.collection.insert(key(2));
    assert!(wait_until(|| h.store.get(Handle(2)).is_some()));
    assert!(h.store.get(Handle(1)).is_none());
}

#[test]
fn status_tracks_successful_flushes() {
    let h = harness(RecordingStore::new());
    h.collection.insert(key(1));
    h.collection.insert(key(2));
    h.bus.flush().unwrap();
    h.collection.remove(Handle(1));
    h.bus.flush().unwrap();

    let status = h.bus.status();
    assert_eq!(status.flushes, 2);
    assert_eq!(status.records_persisted, 3);
    assert_eq!(status.failed_flushes, 0);
    assert!(status.last_flush.is_some());
    assert!(status.bridged);
    assert!(!status.disposed);
}

#[test]
fn apply_settings_sets_interval_then_auto_flush() {
    let h = harness(RecordingStore::new());
    h.bus
        .apply_settings(&SyncSettings {
            auto_flush: true,
            flush_interval_ms: 20,
        })
        .unwrap();

    assert_eq!(h.bus.flush_interval_ms(), 20);
    assert!(h.bus.auto_flush());

    h.collection.insert(key(7));
    assert!(wait_until(|| h.store.get(Handle(7)).is_some()));
}
