//! Plugin declaration registry.
//!
//! Declarations are plain values built once at startup: each
//! [`PluginDescriptor`] names a module by its logical name and lists the
//! exports (slots) that must be resolved from it. Consumers keep typed
//! handles to their slots and read them; only the loader writes them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{LoadError, Result};
use crate::signature::NativeFn;

pub mod slot;

pub use slot::{FunctionSlot, SlotBinding};

use slot::SlotCell;

/// A module and the exports declared against it.
///
/// Identity is the logical name. Slot order is insertion order and is kept in
/// reports.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    logical_name: String,
    slots: Vec<Arc<dyn SlotCell>>,
}

impl PluginDescriptor {
    pub fn new(logical_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            slots: Vec::new(),
        }
    }

    /// Add an existing slot.
    pub fn with_slot<F: NativeFn>(mut self, slot: Arc<FunctionSlot<F>>) -> Self {
        self.slots.push(slot);
        self
    }

    /// Declare a new slot and return the typed handle consumers call through.
    pub fn declare<F: NativeFn>(&mut self, symbol_name: impl Into<String>) -> Arc<FunctionSlot<F>> {
        let slot = Arc::new(FunctionSlot::<F>::new(symbol_name));
        self.slots.push(slot.clone());
        slot
    }

    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    pub fn slots(&self) -> impl ExactSizeIterator<Item = &dyn SlotBinding> + '_ {
        self.slots.iter().map(|s| s.as_binding())
    }

    pub fn slot(&self, symbol_name: &str) -> Option<&dyn SlotBinding> {
        self.slots().find(|s| s.symbol_name() == symbol_name)
    }

    /// Slots with write access, for the binding engine.
    pub(crate) fn cells(&self) -> &[Arc<dyn SlotCell>] {
        &self.slots
    }

    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_bound()).count()
    }
}

/// Implemented by generated binding groups (see [`declare_plugin!`](crate::declare_plugin)).
pub trait PluginBindings {
    /// Descriptor sharing this group's slots.
    fn descriptor(&self) -> PluginDescriptor;
}

/// The complete, stable set of declarations a loader binds against.
///
/// The registry owns the claim that lets exactly one live loader write its
/// slots at a time.
#[derive(Debug)]
pub struct DeclarationRegistry {
    descriptors: Vec<PluginDescriptor>,
    claimed: AtomicBool,
}

impl DeclarationRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, logical_name: &str) -> Option<&PluginDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.logical_name == logical_name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn is_bound(&self, logical_name: &str, symbol_name: &str) -> bool {
        self.get(logical_name)
            .and_then(|d| d.slot(symbol_name))
            .map(|s| s.is_bound())
            .unwrap_or(false)
    }

    /// True while a loader holds this registry.
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    pub(crate) fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release(&self) {
        self.claimed.store(false, Ordering::Release);
    }
}

/// Collects descriptors before the first binding pass.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: Vec<PluginDescriptor>,
}

impl RegistryBuilder {
    /// Add a descriptor. A descriptor for a logical name that is already
    /// present has its slots appended to the existing one.
    pub fn register(&mut self, descriptor: PluginDescriptor) -> &mut Self {
        match self
            .descriptors
            .iter_mut()
            .find(|d| d.logical_name == descriptor.logical_name)
        {
            Some(existing) => existing.slots.extend(descriptor.slots),
            None => self.descriptors.push(descriptor),
        }
        self
    }

    pub fn with_plugin(mut self, descriptor: PluginDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn with_bindings<B: PluginBindings>(mut self, bindings: &B) -> Self {
        self.register(bindings.descriptor());
        self
    }

    /// Validate and freeze the declarations.
    ///
    /// A slot belongs to exactly one descriptor; sharing one slot between
    /// two plugins is rejected.
    pub fn build(self) -> Result<Arc<DeclarationRegistry>> {
        let mut seen = HashSet::new();
        for descriptor in &self.descriptors {
            validate_logical_name(&descriptor.logical_name)?;

            for slot in &descriptor.slots {
                if slot.symbol_name().is_empty() {
                    return Err(LoadError::config(format!(
                        "plugin '{}' declares a slot with an empty symbol name",
                        descriptor.logical_name
                    )));
                }
                if !seen.insert(Arc::as_ptr(slot) as *const ()) {
                    return Err(LoadError::config(format!(
                        "slot '{}' is registered more than once (seen again in plugin '{}')",
                        slot.symbol_name(),
                        descriptor.logical_name
                    )));
                }
            }
        }

        Ok(Arc::new(DeclarationRegistry {
            descriptors: self.descriptors,
            claimed: AtomicBool::new(false),
        }))
    }
}

/// Logical names become file names, so they must not walk out of the base
/// directory.
fn validate_logical_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LoadError::config("plugin logical name is empty"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(LoadError::config(format!(
            "plugin logical name '{}' is not a plain file name",
            name
        )));
    }
    Ok(())
}
