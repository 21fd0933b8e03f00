//! End-to-end lifecycle of a virtualized application's registry
//!
//! Exercises the complete flow: configuration on disk -> connect -> bootstrap
//! -> guest mutations under auto-flush -> process exit -> restart.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use vsync_core::{
    Handle, ObservedCollection, RegistrySyncBus, RegistryValue, SchedulerState, ShutdownSignal,
    VirtualRegistryKey,
};
use vsync_meta::{ConfigurationProvider, ResourceKind, SyncConfig, VirtualizationType};
use vsync_test_utils::{TestWorkspace, key};

/// One run of the guest process: returns what the collection held at startup.
fn run_guest(
    config: &SyncConfig,
    mutate: impl FnOnce(&ObservedCollection<VirtualRegistryKey>),
) -> Vec<VirtualRegistryKey> {
    let signal = ShutdownSignal::new();
    let bus =
        RegistrySyncBus::connect(Arc::new(config.clone()), ResourceKind::Registry, &signal).unwrap();
    bus.apply_settings(&config.settings()).unwrap();

    let keys = ObservedCollection::new();
    bus.bootstrap(&keys).unwrap();
    let loaded = keys.snapshot();

    mutate(&keys);

    // Host process exiting
    signal.fire();
    assert_eq!(bus.status().scheduler, SchedulerState::Stopped);
    loaded
}

#[test]
fn registry_state_survives_restarts() {
    let _ = vsync_core::logging::init();
    let workspace = TestWorkspace::new();
    let config_path = workspace.write_config_with_file_store("state/registry.json", true, 25);
    let config = SyncConfig::load(&config_path).unwrap();

    let first = run_guest(&config, |keys| {
        // Three guest threads mutating concurrently
        thread::scope(|scope| {
            for guest in 0..3u64 {
                scope.spawn(move || {
                    for i in 0..10 {
                        keys.insert(key(guest * 10 + i));
                    }
                });
            }
        });
        keys.remove(Handle(0));
    });
    assert!(first.is_empty());

    let second = run_guest(&config, |keys| {
        let mut updated = keys.get(Handle(1)).unwrap();
        updated.set_value("Name", RegistryValue::ExpandString("%APPDATA%".into()));
        keys.insert(updated);
    });
    assert_eq!(second.len(), 29);
    assert!(second.iter().all(|k| k.handle != Handle(0)));

    let third = run_guest(&config, |_| {});
    let updated = third.iter().find(|k| k.handle == Handle(1)).unwrap();
    assert_eq!(
        updated.value("name"),
        Some(&RegistryValue::ExpandString("%APPDATA%".into()))
    );

    let raw: serde_json::Value =
        serde_json::from_str(&workspace.read("state/registry.json")).unwrap();
    assert_eq!(raw["version"], "1.0");
    assert_eq!(raw["entries"].as_array().unwrap().len(), 29);
}

#[test]
fn auto_flush_persists_without_explicit_flush() {
    let workspace = TestWorkspace::new();
    let config =
        SyncConfig::load(&workspace.write_config_with_file_store("registry.yaml", true, 10))
            .unwrap();
    let signal = ShutdownSignal::new();
    let bus =
        RegistrySyncBus::connect(Arc::new(config.clone()), ResourceKind::Registry, &signal).unwrap();
    bus.apply_settings(&config.settings()).unwrap();

    let keys = ObservedCollection::new();
    bus.bootstrap(&keys).unwrap();
    keys.insert(key(42));

    let deadline = Instant::now() + Duration::from_secs(5);
    while bus.status().records_persisted == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(bus.status().records_persisted, 1);
    assert!(workspace.read("registry.yaml").contains("Key42"));
}

#[test]
fn virtualization_rules_resolve_through_the_bus() {
    let workspace = TestWorkspace::new();
    let config =
        SyncConfig::load(&workspace.write_config_with_file_store("registry.json", false, 1000))
            .unwrap();
    assert!(config.connection_descriptor(ResourceKind::Registry).is_some());

    let signal = ShutdownSignal::new();
    let bus =
        RegistrySyncBus::connect(Arc::new(config), ResourceKind::Registry, &signal).unwrap();
    let rules = bus.registry_rules();

    assert_eq!(
        rules.resolve(r"HKEY_CURRENT_USER\Software\Test\Key1"),
        VirtualizationType::Virtual
    );
    assert_eq!(
        rules.resolve(r"HKEY_CURRENT_USER\Software\Other"),
        VirtualizationType::Transparent
    );
}
