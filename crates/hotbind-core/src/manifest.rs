//! Plugin declarations supplied from outside the program.
//!
//! A manifest only knows symbol names, not signatures, so its slots use the
//! opaque [`OpaqueFn`] type. They exist to check that modules load and export
//! what they should; nothing calls through them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};
use crate::registry::{DeclarationRegistry, FunctionSlot, PluginDescriptor};

/// Placeholder signature for manifest-declared slots. Never called.
pub type OpaqueFn = unsafe extern "C" fn();

/// One `[[plugins]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl PluginEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbols: Vec::new(),
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbols.push(symbol.into());
        self
    }

    pub fn descriptor(&self) -> PluginDescriptor {
        self.symbols
            .iter()
            .fold(PluginDescriptor::new(&self.name), |descriptor, symbol| {
                descriptor.with_slot(Arc::new(FunctionSlot::<OpaqueFn>::new(symbol.as_str())))
            })
    }
}

/// Build a registry from manifest entries.
pub fn build_registry(entries: &[PluginEntry]) -> Result<Arc<DeclarationRegistry>> {
    let mut builder = DeclarationRegistry::builder();
    for entry in entries {
        if let Some(dup) = first_duplicate(&entry.symbols) {
            return Err(LoadError::config(format!(
                "plugin '{}' lists symbol '{}' more than once",
                entry.name, dup
            )));
        }
        builder.register(entry.descriptor());
    }
    builder.build()
}

fn first_duplicate(symbols: &[String]) -> Option<&str> {
    symbols
        .iter()
        .enumerate()
        .find(|(i, s)| symbols[..*i].contains(s))
        .map(|(_, s)| s.as_str())
}
