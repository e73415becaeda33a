//! The OS-backed loader against real files on disk.

use hotbind_core::prelude::*;
use hotbind_core::ModuleStatus;

#[test]
fn test_native_loader_reports_missing_and_garbage_modules() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(format!("broken.{}", std::env::consts::DLL_EXTENSION)),
        b"definitely not a shared library",
    )
    .unwrap();

    let registry = hotbind_core::manifest::build_registry(&[
        PluginEntry::new("absent").with_symbol("get_color"),
        PluginEntry::new("broken").with_symbol("get_color"),
    ])
    .unwrap();

    let mut loader = PluginLoader::native(registry);
    let report = loader.init(dir.path()).unwrap();

    assert!(matches!(
        report.plugin("absent").unwrap().status,
        ModuleStatus::NotLoaded {
            error: LoadError::ModuleNotFound { .. }
        }
    ));
    assert!(matches!(
        report.plugin("broken").unwrap().status,
        ModuleStatus::NotLoaded {
            error: LoadError::OsLoadFailed { .. }
        }
    ));
    assert!(loader.loaded_modules().is_empty());

    // Failed opens leave the directory as it was.
    assert!(dir
        .path()
        .join(format!("broken.{}", std::env::consts::DLL_EXTENSION))
        .exists());
    assert!(loader.dispose().is_empty());
}

#[test]
fn test_host_config_drives_loader() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("hotbind.toml");
    std::fs::write(
        &config_path,
        r#"
        base_directory = "bin"
        extension = "plugin"

        [[plugins]]
        name = "geo"
        symbols = ["get_position", "get_color"]
        "#,
    )
    .unwrap();

    let config = HostConfig::from_file(&config_path).unwrap();
    let registry = hotbind_core::manifest::build_registry(&config.plugins).unwrap();
    let mut loader = PluginLoader::native(registry);
    let report = loader.init_with_config(&config.loader).unwrap();

    let geo = report.plugin("geo").unwrap();
    assert_eq!(geo.path, dir.path().join("bin").join("geo.plugin"));
    assert!(!geo.is_loaded());
    assert_eq!(geo.slots.len(), 2);
}
