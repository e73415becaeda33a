//! Binding engine: opens declared modules, resolves their slots, and tears
//! them down again in the only safe order (clear slots, then close).

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::LoadError;
use crate::platform::{ModuleLocator, PlatformLoader};
use crate::registry::{DeclarationRegistry, PluginDescriptor};
use crate::report::{
    LoadReport, ModuleStatus, PluginReport, SlotReport, SlotStatus, UnloadReport,
};

/// Modules currently open, keyed by logical name, and the descriptors that
/// have at least one bound slot.
///
/// Invariant: every name in `bound` is also a key of `modules`.
#[derive(Debug)]
pub struct ModuleTable<H> {
    modules: BTreeMap<String, H>,
    bound: BTreeSet<String>,
}

impl<H> ModuleTable<H> {
    pub fn new() -> Self {
        Self {
            modules: BTreeMap::new(),
            bound: BTreeSet::new(),
        }
    }

    pub fn is_loaded(&self, logical_name: &str) -> bool {
        self.modules.contains_key(logical_name)
    }

    pub fn is_bound(&self, logical_name: &str) -> bool {
        self.bound.contains(logical_name)
    }

    pub fn loaded(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn bound(&self) -> impl Iterator<Item = &str> {
        self.bound.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    fn mark_bound(&mut self, logical_name: &str) {
        debug_assert!(self.modules.contains_key(logical_name));
        if self.modules.contains_key(logical_name) {
            self.bound.insert(logical_name.to_string());
        }
    }

    /// Take a module out of the table. The bound mark goes first so the
    /// invariant holds at every step.
    fn take(&mut self, logical_name: &str) -> Option<H> {
        self.bound.remove(logical_name);
        self.modules.remove(logical_name)
    }
}

impl<H> Default for ModuleTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Open and bind every declared plugin that is not loaded yet.
///
/// Per-plugin and per-slot failures are recorded in the report and never
/// abort the pass. Modules already in `table` are not reopened; their
/// still-unbound slots are resolved again.
pub fn load_all<P: PlatformLoader>(
    platform: &P,
    locator: &ModuleLocator,
    registry: &DeclarationRegistry,
    table: &mut ModuleTable<P::Handle>,
) -> LoadReport {
    let plugins = registry
        .descriptors()
        .iter()
        .map(|descriptor| load_one(platform, locator, descriptor, table))
        .collect();

    LoadReport { plugins }
}

fn load_one<P: PlatformLoader>(
    platform: &P,
    locator: &ModuleLocator,
    descriptor: &PluginDescriptor,
    table: &mut ModuleTable<P::Handle>,
) -> PluginReport {
    let name = descriptor.logical_name();
    let path = locator.module_path(name);

    let mut opened = false;
    let handle: &P::Handle = match table.modules.entry(name.to_string()) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => match platform.open(&path) {
            Ok(handle) => {
                tracing::info!("Loaded plugin {} from {}", name, path.display());
                opened = true;
                entry.insert(handle)
            }
            Err(e) => {
                tracing::error!("Failed to load plugin {}: {}", name, e);
                return PluginReport {
                    logical_name: name.to_string(),
                    path,
                    status: ModuleStatus::NotLoaded { error: e },
                    opened,
                    slots: descriptor
                        .slots()
                        .map(|slot| SlotReport {
                            symbol_name: slot.symbol_name().to_string(),
                            signature: slot.signature().to_string(),
                            status: SlotStatus::Unbound { error: None },
                        })
                        .collect(),
                };
            }
        },
    };

    let mut slots = Vec::with_capacity(descriptor.cells().len());
    for slot in descriptor.cells() {
        let status = if slot.is_bound() {
            SlotStatus::Bound
        } else {
            match platform.resolve(handle, slot.symbol_name()) {
                Ok(addr) => {
                    // SAFETY: `addr` comes from the handle now stored in the
                    // table for this descriptor; the declared signature is the
                    // caller's contract (see `signature::NativeFn`).
                    unsafe { slot.bind(addr) };
                    tracing::debug!("Bound {}::{}", name, slot.symbol_name());
                    SlotStatus::Bound
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to find function {} in plugin {}: {}",
                        slot.symbol_name(),
                        name,
                        e
                    );
                    SlotStatus::Unbound { error: Some(e) }
                }
            }
        };

        slots.push(SlotReport {
            symbol_name: slot.symbol_name().to_string(),
            signature: slot.signature().to_string(),
            status,
        });
    }

    if slots.iter().any(SlotReport::is_bound) {
        table.mark_bound(name);
    }

    PluginReport {
        logical_name: name.to_string(),
        path,
        status: ModuleStatus::Loaded,
        opened,
        slots,
    }
}

/// Clear every slot of one module, then close it.
///
/// Returns an empty report when the module is not loaded.
pub fn unload<P: PlatformLoader>(
    platform: &P,
    registry: &DeclarationRegistry,
    table: &mut ModuleTable<P::Handle>,
    logical_name: &str,
) -> UnloadReport {
    let mut report = UnloadReport::default();

    if !table.is_loaded(logical_name) {
        return report;
    }

    // Callables must be gone before their module is.
    if let Some(descriptor) = registry.get(logical_name) {
        for slot in descriptor.cells() {
            slot.unbind();
        }
    }

    let Some(handle) = table.take(logical_name) else {
        return report;
    };

    match platform.close(handle) {
        Ok(()) => {
            tracing::info!("Unloaded plugin {}", logical_name);
            report.closed.push(logical_name.to_string());
        }
        Err(e) => {
            let e = with_logical_name(e, logical_name);
            tracing::warn!("{}; the module handle may have leaked", e);
            report.failures.push(e);
        }
    }

    report
}

/// Clear and close every loaded module.
pub fn unload_all<P: PlatformLoader>(
    platform: &P,
    registry: &DeclarationRegistry,
    table: &mut ModuleTable<P::Handle>,
) -> UnloadReport {
    let names: Vec<String> = table.loaded().map(str::to_string).collect();

    let mut report = UnloadReport::default();
    for name in names {
        report.merge(unload(platform, registry, table, &name));
    }
    report
}

fn with_logical_name(err: LoadError, logical_name: &str) -> LoadError {
    match err {
        LoadError::OsUnloadFailed { code, message, .. } => LoadError::OsUnloadFailed {
            logical_name: logical_name.to_string(),
            code,
            message,
        },
        other => other,
    }
}
