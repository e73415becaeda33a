//! Function slots: one declared export of a plugin and its bound callable.

use std::fmt;

use parking_lot::RwLock;

use crate::signature::{NativeFn, RawAddress};

/// Read-only view of a slot, as handed out by a
/// [`PluginDescriptor`](super::PluginDescriptor).
///
/// Consumers can inspect a slot but never bind or clear it; write access is
/// crate-private.
///
/// ```compile_fail
/// use hotbind_core::registry::{DeclarationRegistry, PluginDescriptor};
///
/// let mut geo = PluginDescriptor::new("geo");
/// geo.declare::<extern "C" fn() -> u32>("get_color");
/// let registry = DeclarationRegistry::builder().with_plugin(geo).build().unwrap();
///
/// registry.get("geo").unwrap().slots().next().unwrap().unbind();
/// ```
///
/// ```compile_fail
/// use hotbind_core::registry::FunctionSlot;
///
/// let slot = FunctionSlot::<extern "C" fn() -> u32>::new("get_color");
/// slot.unbind();
/// ```
pub trait SlotBinding: fmt::Debug + Send + Sync {
    fn symbol_name(&self) -> &str;

    /// Declared signature, for diagnostics.
    fn signature(&self) -> &'static str;

    fn is_bound(&self) -> bool;
}

/// A declared export with signature `F`, either unbound or bound to the
/// function resolved from the plugin's module.
///
/// The callable is only reachable through [`with`](Self::with), which holds a
/// read lock for the duration of the call. Unloading takes the write lock,
/// so a module is never closed underneath a call in progress.
pub struct FunctionSlot<F: NativeFn> {
    symbol_name: String,
    cell: RwLock<Option<F>>,
}

impl<F: NativeFn> FunctionSlot<F> {
    pub fn new(symbol_name: impl Into<String>) -> Self {
        Self {
            symbol_name: symbol_name.into(),
            cell: RwLock::new(None),
        }
    }

    pub fn symbol_name(&self) -> &str {
        &self.symbol_name
    }

    pub fn is_bound(&self) -> bool {
        self.cell.read().is_some()
    }

    /// Run `f` with the bound function, or return `None` when the slot is
    /// unbound ("feature unavailable").
    ///
    /// Do not copy the function pointer out of the closure: it is only valid
    /// while the slot stays bound.
    pub fn with<T>(&self, f: impl FnOnce(F) -> T) -> Option<T> {
        let guard = self.cell.read();
        (*guard).map(f)
    }
}

/// Write access to a slot, used only by the binding engine.
pub(crate) trait SlotCell: SlotBinding {
    /// # Safety
    ///
    /// `addr` must come from the module currently open for the owning
    /// descriptor and implement the slot's declared signature.
    unsafe fn bind(&self, addr: RawAddress);

    fn unbind(&self);

    fn as_binding(&self) -> &dyn SlotBinding;
}

impl<F: NativeFn> SlotCell for FunctionSlot<F> {
    unsafe fn bind(&self, addr: RawAddress) {
        let callable = F::from_raw(addr);
        *self.cell.write() = Some(callable);
    }

    fn unbind(&self) {
        *self.cell.write() = None;
    }

    fn as_binding(&self) -> &dyn SlotBinding {
        self
    }
}

impl<F: NativeFn> SlotBinding for FunctionSlot<F> {
    fn symbol_name(&self) -> &str {
        &self.symbol_name
    }

    fn signature(&self) -> &'static str {
        F::signature()
    }

    fn is_bound(&self) -> bool {
        FunctionSlot::is_bound(self)
    }
}

impl<F: NativeFn> fmt::Debug for FunctionSlot<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSlot")
            .field("symbol_name", &self.symbol_name)
            .field("signature", &F::signature())
            .field("bound", &self.is_bound())
            .finish()
    }
}
