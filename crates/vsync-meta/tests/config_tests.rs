use pretty_assertions::assert_eq;
use tempfile::TempDir;
use vsync_fs::NormalizedPath;
use vsync_meta::{
    ConfigurationProvider, ConnectionDescriptor, Error, ResourceKind, RuleSet, SyncConfig,
    SyncSettings, VirtualizationType,
};

const SAMPLE_TOML: &str = r#"
[sync]
auto_flush = true
flush_interval_ms = 250

[stores.registry]
backend = "file"
path = "data/registry.json"

[stores.filesystem]
backend = "memory"

[rules.filesystem]
default_access = "transparent"

[[rules.filesystem.rules]]
pattern = 'C:\Users\Guest\AppData'
access = "virtual"

[[rules.registry.rules]]
pattern = 'HKEY_CURRENT_USER\Software\Vendor'
access = "transparent-read"
"#;

fn write_config(temp: &TempDir, name: &str, content: &str) -> NormalizedPath {
    let path = NormalizedPath::new(temp.path().join(name));
    std::fs::write(path.to_native(), content).unwrap();
    path
}

#[test]
fn load_toml_document() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "vsync.toml", SAMPLE_TOML);

    let config = SyncConfig::load(&path).unwrap();

    assert_eq!(
        config.settings(),
        SyncSettings {
            auto_flush: true,
            flush_interval_ms: 250,
        }
    );
    assert_eq!(
        config.connection_descriptor(ResourceKind::FileSystem),
        Some(ConnectionDescriptor::Memory)
    );

    let fs_rules = config.file_system_rules();
    assert_eq!(fs_rules.default_access, VirtualizationType::Transparent);
    assert_eq!(
        fs_rules.resolve(r"C:\Users\Guest\AppData\Roaming\app.ini"),
        VirtualizationType::Virtual
    );
    assert_eq!(
        config
            .registry_rules()
            .resolve(r"HKEY_CURRENT_USER\Software\Vendor\Product"),
        VirtualizationType::TransparentRead
    );
}

#[test]
fn relative_store_path_resolves_next_to_document() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "vsync.toml", SAMPLE_TOML);

    let config = SyncConfig::load(&path).unwrap();
    let expected = NormalizedPath::new(temp.path()).join("data/registry.json");

    assert_eq!(
        config.connection_descriptor(ResourceKind::Registry),
        Some(ConnectionDescriptor::file(expected.as_str()))
    );
}

#[test]
fn missing_sections_use_defaults() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "vsync.toml", "");

    let config = SyncConfig::load(&path).unwrap();

    assert_eq!(config.settings(), SyncSettings::default());
    assert!(config.connection_descriptor(ResourceKind::Registry).is_none());
    assert_eq!(config.registry_rules(), RuleSet::default());
}

#[test]
fn save_then_load_preserves_document() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("vsync.yaml"));

    let config = SyncConfig::new()
        .with_settings(SyncSettings {
            auto_flush: true,
            flush_interval_ms: 50,
        })
        .with_store(
            ResourceKind::Registry,
            ConnectionDescriptor::file("/var/lib/vsync/registry.json"),
        )
        .with_file_system_rules(
            RuleSet::new(VirtualizationType::TransparentRead)
                .with_rule("C:/Windows", VirtualizationType::Transparent),
        );
    config.save(&path).unwrap();

    let loaded = SyncConfig::load(&path).unwrap();
    assert_eq!(loaded.settings(), config.settings());
    assert_eq!(loaded.file_system_rules(), config.file_system_rules());
    assert_eq!(
        loaded.connection_descriptor(ResourceKind::Registry),
        Some(ConnectionDescriptor::file("/var/lib/vsync/registry.json"))
    );
}

#[test]
fn empty_rule_pattern_fails_to_load() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        &temp,
        "vsync.toml",
        r#"
[[rules.registry.rules]]
pattern = ""
access = "virtual"
"#,
    );

    let err = SyncConfig::load(&path).unwrap_err();
    assert!(matches!(err, Error::InvalidRule { .. }), "got {:?}", err);
}

#[test]
fn malformed_document_reports_parse_error() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "vsync.toml", "[sync\nauto_flush = ");

    let err = SyncConfig::load(&path).unwrap_err();
    assert!(
        matches!(err, Error::Fs(vsync_fs::Error::ConfigParse { .. })),
        "got {:?}",
        err
    );
}
