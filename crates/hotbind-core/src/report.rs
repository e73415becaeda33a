//! Diagnostics produced by binding and unloading passes.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::LoadError;

/// Outcome of opening a plugin's module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModuleStatus {
    Loaded,
    NotLoaded { error: LoadError },
}

/// Outcome of binding one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlotStatus {
    Bound,
    /// `error` is `None` when the slot was never attempted because its module
    /// did not load.
    Unbound { error: Option<LoadError> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotReport {
    pub symbol_name: String,
    pub signature: String,
    pub status: SlotStatus,
}

impl SlotReport {
    pub fn is_bound(&self) -> bool {
        self.status == SlotStatus::Bound
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginReport {
    pub logical_name: String,
    pub path: PathBuf,
    pub status: ModuleStatus,
    /// True when this pass opened the module; false when it was already open.
    pub opened: bool,
    pub slots: Vec<SlotReport>,
}

impl PluginReport {
    pub fn is_loaded(&self) -> bool {
        self.status == ModuleStatus::Loaded
    }

    pub fn slot(&self, symbol_name: &str) -> Option<&SlotReport> {
        self.slots.iter().find(|s| s.symbol_name == symbol_name)
    }

    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_bound()).count()
    }
}

/// Result of a full `load_all` pass, one entry per declared plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub plugins: Vec<PluginReport>,
}

impl LoadReport {
    pub fn plugin(&self, logical_name: &str) -> Option<&PluginReport> {
        self.plugins.iter().find(|p| p.logical_name == logical_name)
    }

    pub fn slot(&self, logical_name: &str, symbol_name: &str) -> Option<&SlotReport> {
        self.plugin(logical_name).and_then(|p| p.slot(symbol_name))
    }

    pub fn loaded_count(&self) -> usize {
        self.plugins.iter().filter(|p| p.is_loaded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.plugins.len() - self.loaded_count()
    }

    pub fn opened_count(&self) -> usize {
        self.plugins.iter().filter(|p| p.opened).count()
    }

    /// Every module loaded and every slot bound.
    pub fn is_complete(&self) -> bool {
        self.plugins
            .iter()
            .all(|p| p.is_loaded() && p.slots.iter().all(SlotReport::is_bound))
    }

    /// `(logical_name, slot)` for every slot left unbound.
    pub fn unbound_slots(&self) -> impl Iterator<Item = (&str, &SlotReport)> {
        self.plugins.iter().flat_map(|p| {
            p.slots
                .iter()
                .filter(|s| !s.is_bound())
                .map(move |s| (p.logical_name.as_str(), s))
        })
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for plugin in &self.plugins {
            match &plugin.status {
                ModuleStatus::Loaded => {
                    writeln!(f, "{}: loaded ({})", plugin.logical_name, plugin.path.display())?
                }
                ModuleStatus::NotLoaded { error } => {
                    writeln!(f, "{}: not loaded ({})", plugin.logical_name, error)?
                }
            }
            for slot in &plugin.slots {
                match &slot.status {
                    SlotStatus::Bound => writeln!(f, "  {:<24} bound", slot.symbol_name)?,
                    SlotStatus::Unbound { error: Some(error) } => {
                        writeln!(f, "  {:<24} unbound: {}", slot.symbol_name, error)?
                    }
                    SlotStatus::Unbound { error: None } => {
                        writeln!(f, "  {:<24} unbound", slot.symbol_name)?
                    }
                }
            }
        }
        Ok(())
    }
}

/// Result of clearing and closing modules.
///
/// Failures are reported, not retried: the bookkeeping for a module is
/// dropped even when the OS refused to unload it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnloadReport {
    pub closed: Vec<String>,
    pub failures: Vec<LoadError>,
}

impl UnloadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.closed.is_empty() && self.failures.is_empty()
    }

    pub(crate) fn merge(&mut self, other: UnloadReport) {
        self.closed.extend(other.closed);
        self.failures.extend(other.failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LoadReport {
        LoadReport {
            plugins: vec![
                PluginReport {
                    logical_name: "geo".to_string(),
                    path: PathBuf::from("plugins/geo.so"),
                    status: ModuleStatus::Loaded,
                    opened: true,
                    slots: vec![
                        SlotReport {
                            symbol_name: "get_position".to_string(),
                            signature: "fn(f32, f32, f32)".to_string(),
                            status: SlotStatus::Unbound {
                                error: Some(LoadError::SymbolNotFound {
                                    symbol: "get_position".to_string(),
                                    message: "undefined symbol".to_string(),
                                }),
                            },
                        },
                        SlotReport {
                            symbol_name: "get_color".to_string(),
                            signature: "fn()".to_string(),
                            status: SlotStatus::Bound,
                        },
                    ],
                },
                PluginReport {
                    logical_name: "other".to_string(),
                    path: PathBuf::from("plugins/other.so"),
                    status: ModuleStatus::NotLoaded {
                        error: LoadError::ModuleNotFound {
                            path: PathBuf::from("plugins/other.so"),
                        },
                    },
                    opened: false,
                    slots: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_counts() {
        let report = sample();
        assert_eq!(report.loaded_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.opened_count(), 1);
        assert!(!report.is_complete());
        assert_eq!(report.plugin("geo").unwrap().bound_count(), 1);
    }

    #[test]
    fn test_unbound_slots() {
        let report = sample();
        let unbound: Vec<_> = report
            .unbound_slots()
            .map(|(plugin, slot)| (plugin, slot.symbol_name.as_str()))
            .collect();
        assert_eq!(unbound, vec![("geo", "get_position")]);
    }

    #[test]
    fn test_display_lists_every_slot() {
        let text = sample().to_string();
        assert!(text.contains("geo: loaded"));
        assert!(text.contains("get_color"));
        assert!(text.contains("other: not loaded"));
        assert!(text.contains("unbound: Symbol not found"));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["plugins"][0]["status"]["status"], "loaded");
        assert_eq!(json["plugins"][0]["slots"][1]["status"]["status"], "bound");
        assert_eq!(
            json["plugins"][1]["status"]["error"]["kind"],
            "module_not_found"
        );
    }
}
