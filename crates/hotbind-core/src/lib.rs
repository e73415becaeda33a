//! Native plugin loading and binding with hot reload.
//!
//! A host declares which plugin modules it wants and which exported functions
//! it expects from each ([`declare_plugin!`] or a TOML manifest). A
//! [`PluginLoader`] opens the modules, resolves the symbols into typed slots,
//! and tears everything down again in an order that never leaves a callable
//! pointing into a closed module.
//!
//! ```rust,no_run
//! use hotbind_core::prelude::*;
//!
//! declare_plugin! {
//!     pub struct Geo for "geo" {
//!         get_color: extern "C" fn() -> u32,
//!     }
//! }
//!
//! # fn main() -> hotbind_core::Result<()> {
//! let geo = Geo::new();
//! let registry = DeclarationRegistry::builder().with_bindings(&geo).build()?;
//!
//! let mut loader = PluginLoader::native(registry);
//! let report = loader.init("target/debug")?;
//! println!("{}", report);
//!
//! if let Some(color) = geo.get_color.with(|f| f()) {
//!     println!("color: {:#010x}", color);
//! }
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod macros;
pub mod manifest;
pub mod platform;
pub mod registry;
pub mod report;
pub mod signature;

pub use error::{LoadError, Result};
pub use events::{Event, SubscriptionId};
pub use lifecycle::{LoaderSnapshot, LoaderState, PluginLoader};
pub use platform::{ModuleLocator, NativeLoader, PlatformLoader};
pub use registry::{
    DeclarationRegistry, FunctionSlot, PluginBindings, PluginDescriptor, RegistryBuilder,
    SlotBinding,
};
pub use report::{LoadReport, ModuleStatus, PluginReport, SlotReport, SlotStatus, UnloadReport};
pub use signature::{NativeFn, RawAddress};

/// Re-exports commonly used types.
pub mod prelude {
    // Configuration
    pub use crate::config::{HostConfig, LoaderConfig, defaults, env_vars};
    pub use crate::manifest::PluginEntry;

    // Error handling
    pub use crate::error::{LoadError, Result};

    // Declarations
    pub use crate::declare_plugin;
    pub use crate::registry::{
        DeclarationRegistry, FunctionSlot, PluginBindings, PluginDescriptor, SlotBinding,
    };

    // Loading
    pub use crate::lifecycle::{LoaderState, PluginLoader};
    pub use crate::platform::{NativeLoader, PlatformLoader};
    pub use crate::report::{LoadReport, UnloadReport};
}
