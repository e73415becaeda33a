//! Watches the plugin directory for rebuilt module files.
//!
//! notify delivers events on its own thread; they are forwarded over an
//! unbounded tokio channel so the task that owns the loader is the only one
//! that ever touches it.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use anyhow::{Context, Result};
use hotbind_core::ModuleLocator;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Debounced stream of "these declared modules changed on disk".
pub struct ModuleWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<Event>,
    locator: ModuleLocator,
    declared: HashSet<String>,
    debounce: Duration,
}

impl ModuleWatcher {
    pub fn new(
        locator: ModuleLocator,
        declared: impl IntoIterator<Item = String>,
        debounce: Duration,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => tracing::warn!("File watcher error: {}", e),
            },
            notify::Config::default(),
        )
        .context("failed to create file watcher")?;

        watcher
            .watch(locator.base_directory(), RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", locator.base_directory().display()))?;

        tracing::info!("Watching {} for plugin changes", locator.base_directory().display());

        Ok(Self {
            _watcher: watcher,
            rx,
            locator,
            declared: declared.into_iter().collect(),
            debounce,
        })
    }

    /// Wait for at least one declared module to change, then keep collecting
    /// until no event arrives for one debounce window.
    ///
    /// Returns `None` once the watcher has shut down.
    pub async fn next_change(&mut self) -> Option<BTreeSet<String>> {
        let mut changed = BTreeSet::new();
        while changed.is_empty() {
            let event = self.rx.recv().await?;
            changed.extend(changed_modules(&event, &self.locator, &self.declared));
        }

        while let Ok(Some(event)) = tokio::time::timeout(self.debounce, self.rx.recv()).await {
            changed.extend(changed_modules(&event, &self.locator, &self.declared));
        }

        Some(changed)
    }
}

/// Declared modules whose files an event created or modified.
pub fn changed_modules(
    event: &Event,
    locator: &ModuleLocator,
    declared: &HashSet<String>,
) -> Vec<String> {
    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter_map(|path| locator.logical_name_of(path))
        .filter(|name| declared.contains(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    fn declared() -> HashSet<String> {
        ["geo".to_string()].into_iter().collect()
    }

    #[test]
    fn test_modified_module_is_reported() {
        let locator = ModuleLocator::new("/plugins", "so");
        let event = Event::new(EventKind::Modify(ModifyKind::Any)).add_path("/plugins/geo.so".into());

        assert_eq!(changed_modules(&event, &locator, &declared()), vec!["geo"]);
    }

    #[test]
    fn test_created_module_is_reported() {
        let locator = ModuleLocator::new("/plugins", "so");
        let event = Event::new(EventKind::Create(CreateKind::File)).add_path("/plugins/geo.so".into());

        assert_eq!(changed_modules(&event, &locator, &declared()), vec!["geo"]);
    }

    #[test]
    fn test_irrelevant_events_are_ignored() {
        let locator = ModuleLocator::new("/plugins", "so");

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path("/plugins/geo.so".into());
        assert!(changed_modules(&removed, &locator, &declared()).is_empty());

        let undeclared = Event::new(EventKind::Modify(ModifyKind::Any)).add_path("/plugins/other.so".into());
        assert!(changed_modules(&undeclared, &locator, &declared()).is_empty());

        let wrong_ext = Event::new(EventKind::Modify(ModifyKind::Any)).add_path("/plugins/geo.d".into());
        assert!(changed_modules(&wrong_ext, &locator, &declared()).is_empty());
    }

    #[tokio::test]
    async fn test_watcher_sees_new_module() {
        let dir = tempfile::tempdir().unwrap();
        let locator = ModuleLocator::new(dir.path(), "so");
        let mut watcher =
            ModuleWatcher::new(locator, ["geo".to_string()], Duration::from_millis(50)).unwrap();

        std::fs::write(dir.path().join("geo.so"), b"stub").unwrap();

        let changed = tokio::time::timeout(Duration::from_secs(10), watcher.next_change())
            .await
            .expect("change within timeout")
            .unwrap();
        assert!(changed.contains("geo"));
    }
}
