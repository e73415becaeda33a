//! Lifecycle manager.
//!
//! [`PluginLoader`] owns the open module handles and sequences every
//! transition of the loader state machine:
//!
//! ```text
//! Uninitialized --init--> Ready --dispose--> Disposed
//!                           |  ^
//!   prepare_for_serialization  resume_after_deserialization
//! ```
//!
//! Unloading always clears slots before closing the module behind them.
//! Only one loader may be `Ready` against a given [`DeclarationRegistry`] at a
//! time; a second one is rejected and disposes itself.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::binding::{self, ModuleTable};
use crate::config::LoaderConfig;
use crate::error::{LoadError, Result};
use crate::events::Event;
use crate::platform::{ModuleLocator, NativeLoader, PlatformLoader};
use crate::registry::DeclarationRegistry;
use crate::report::{LoadReport, UnloadReport};

/// Loader state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderState {
    Uninitialized,
    Ready,
    /// Terminal. A new loader must be created and initialized.
    Disposed,
}

/// What survives a serialization boundary. Carries no native handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSnapshot {
    pub state: LoaderState,
    pub base_directory: Option<PathBuf>,
    pub extension: Option<String>,
    /// Modules were open when the snapshot was taken and must be loaded
    /// again after restore.
    pub reload_pending: bool,
}

/// Owns loaded modules for one [`DeclarationRegistry`].
///
/// Not internally synchronized. Hosts with several threads route every call
/// through a single owner.
pub struct PluginLoader<P: PlatformLoader = NativeLoader> {
    platform: P,
    registry: Arc<DeclarationRegistry>,
    extension: Option<String>,
    locator: Option<ModuleLocator>,
    modules: ModuleTable<P::Handle>,
    state: LoaderState,
    reload_owed: bool,
    claimed: bool,
    on_bound: Event<()>,
}

impl PluginLoader<NativeLoader> {
    /// Loader backed by the OS dynamic linker.
    pub fn native(registry: Arc<DeclarationRegistry>) -> Self {
        Self::new(NativeLoader, registry)
    }
}

impl<P: PlatformLoader> PluginLoader<P> {
    pub fn new(platform: P, registry: Arc<DeclarationRegistry>) -> Self {
        Self {
            platform,
            registry,
            extension: None,
            locator: None,
            modules: ModuleTable::new(),
            state: LoaderState::Uninitialized,
            reload_owed: false,
            claimed: false,
            on_bound: Event::new(),
        }
    }

    /// Use `extension` instead of the platform's library extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Bind everything under `base_directory`.
    ///
    /// Per-plugin failures end up in the report. Errors are returned only for
    /// contract violations: `AlreadyInitialized` when this loader is already
    /// `Ready` (nothing changes) or when another loader holds the registry
    /// (this loader becomes `Disposed`), and `Disposed` on a terminal loader.
    pub fn init(&mut self, base_directory: impl Into<PathBuf>) -> Result<LoadReport> {
        let extension = self.extension.clone();
        self.init_at(base_directory.into(), extension)
    }

    /// [`init`](Self::init) with the directory taken from `config`. The
    /// config's extension wins over [`with_extension`](Self::with_extension)
    /// when both are set.
    pub fn init_with_config(&mut self, config: &LoaderConfig) -> Result<LoadReport> {
        let extension = config.extension.clone().or_else(|| self.extension.clone());
        self.init_at(config.base_directory.clone(), extension)
    }

    /// Directory and extension are stored only once the state check and the
    /// claim have passed.
    fn init_at(
        &mut self,
        base_directory: PathBuf,
        extension: Option<String>,
    ) -> Result<LoadReport> {
        match self.state {
            LoaderState::Ready => return Err(LoadError::AlreadyInitialized),
            LoaderState::Disposed => return Err(LoadError::Disposed),
            LoaderState::Uninitialized => {}
        }

        if !self.registry.try_claim() {
            tracing::warn!("Another plugin loader is already active for this registry");
            self.dispose();
            return Err(LoadError::AlreadyInitialized);
        }
        self.claimed = true;

        tracing::info!("Initializing plugin loader at {}", base_directory.display());
        self.locator = Some(locator_for(base_directory, extension.as_deref()));
        self.extension = extension;
        self.reload_owed = false;
        self.state = LoaderState::Ready;

        self.load_pass()
    }

    /// Open and bind anything not loaded yet. Already-open modules are not
    /// reopened, but their unbound slots are tried again.
    pub fn load_all(&mut self) -> Result<LoadReport> {
        self.ensure_ready()?;
        self.load_pass()
    }

    fn load_pass(&mut self) -> Result<LoadReport> {
        let Some(locator) = self.locator.as_ref() else {
            return Err(LoadError::NotInitialized);
        };

        let report = binding::load_all(&self.platform, locator, &self.registry, &mut self.modules);
        self.reload_owed = false;

        tracing::info!(
            "Plugin load pass finished: {}/{} modules loaded, {} failed",
            report.loaded_count(),
            report.plugins.len(),
            report.failed_count()
        );
        self.on_bound.emit(&());

        Ok(report)
    }

    /// Clear every slot, close every module, and release the registry.
    ///
    /// Safe to call repeatedly; later calls return an empty report.
    pub fn dispose(&mut self) -> UnloadReport {
        if self.state == LoaderState::Disposed {
            return UnloadReport::default();
        }

        let report = binding::unload_all(&self.platform, &self.registry, &mut self.modules);
        if self.claimed {
            self.registry.release();
            self.claimed = false;
        }
        if self.state == LoaderState::Ready {
            tracing::info!("Plugin loader disposed");
        }

        self.locator = None;
        self.reload_owed = false;
        self.state = LoaderState::Disposed;
        report
    }

    /// Unload everything, then load everything again.
    pub fn reload(&mut self) -> Result<(UnloadReport, LoadReport)> {
        self.ensure_ready()?;
        tracing::info!("Reloading all plugins");
        let unloaded = binding::unload_all(&self.platform, &self.registry, &mut self.modules);
        let loaded = self.load_pass()?;
        Ok((unloaded, loaded))
    }

    /// Unload one module, then run a load pass. Only that module is reopened.
    pub fn reload_plugin(&mut self, logical_name: &str) -> Result<(UnloadReport, LoadReport)> {
        self.ensure_ready()?;
        tracing::info!("Reloading plugin {}", logical_name);
        let unloaded = binding::unload(
            &self.platform,
            &self.registry,
            &mut self.modules,
            logical_name,
        );
        let loaded = self.load_pass()?;
        Ok((unloaded, loaded))
    }

    /// Drop all native state before the host persists this loader.
    ///
    /// If anything was loaded it is unloaded and a reload is owed; the state
    /// stays `Ready`.
    pub fn prepare_for_serialization(&mut self) -> UnloadReport {
        if self.state != LoaderState::Ready || self.modules.is_empty() {
            return UnloadReport::default();
        }

        tracing::debug!("Unloading plugins before serialization");
        let report = binding::unload_all(&self.platform, &self.registry, &mut self.modules);
        self.reload_owed = true;
        report
    }

    /// Replay the owed load pass, if any.
    pub fn resume_after_deserialization(&mut self) -> Result<Option<LoadReport>> {
        if !self.reload_owed || self.state != LoaderState::Ready {
            return Ok(None);
        }
        tracing::debug!("Reloading plugins after deserialization");
        self.load_pass().map(Some)
    }

    pub fn snapshot(&self) -> LoaderSnapshot {
        LoaderSnapshot {
            state: self.state,
            base_directory: self.base_directory().map(Path::to_path_buf),
            extension: self.extension.clone(),
            reload_pending: self.reload_owed || !self.modules.is_empty(),
        }
    }

    /// Recreate a loader from a snapshot.
    ///
    /// A `Ready` snapshot claims the registry again and replays the load
    /// pass if one was pending. The previous owner must be disposed or
    /// dropped first, otherwise this fails with `AlreadyInitialized`.
    pub fn restore(
        platform: P,
        registry: Arc<DeclarationRegistry>,
        snapshot: &LoaderSnapshot,
    ) -> Result<(Self, Option<LoadReport>)> {
        let mut loader = Self::new(platform, registry);
        loader.extension = snapshot.extension.clone();

        match (snapshot.state, &snapshot.base_directory) {
            (LoaderState::Ready, Some(base_directory)) => {
                if !loader.registry.try_claim() {
                    loader.dispose();
                    return Err(LoadError::AlreadyInitialized);
                }
                loader.claimed = true;
                loader.locator = Some(locator_for(base_directory, snapshot.extension.as_deref()));
                loader.state = LoaderState::Ready;
                loader.reload_owed = snapshot.reload_pending;

                let report = loader.resume_after_deserialization()?;
                Ok((loader, report))
            }
            (LoaderState::Ready, None) => Err(LoadError::config(
                "snapshot is marked ready but has no base directory",
            )),
            (LoaderState::Disposed, _) => {
                loader.state = LoaderState::Disposed;
                Ok((loader, None))
            }
            (LoaderState::Uninitialized, _) => Ok((loader, None)),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            LoaderState::Ready => Ok(()),
            LoaderState::Uninitialized => Err(LoadError::NotInitialized),
            LoaderState::Disposed => Err(LoadError::Disposed),
        }
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LoaderState::Ready
    }

    pub fn base_directory(&self) -> Option<&Path> {
        self.locator.as_ref().map(ModuleLocator::base_directory)
    }

    pub fn locator(&self) -> Option<&ModuleLocator> {
        self.locator.as_ref()
    }

    pub fn registry(&self) -> &Arc<DeclarationRegistry> {
        &self.registry
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Whether `symbol_name` of `logical_name` currently holds a callable.
    pub fn is_bound(&self, logical_name: &str, symbol_name: &str) -> bool {
        self.modules.is_loaded(logical_name) && self.registry.is_bound(logical_name, symbol_name)
    }

    /// Whether the module is open with at least one slot bound.
    pub fn is_available(&self, logical_name: &str) -> bool {
        self.modules.is_bound(logical_name)
    }

    pub fn is_loaded(&self, logical_name: &str) -> bool {
        self.modules.is_loaded(logical_name)
    }

    pub fn loaded_modules(&self) -> Vec<String> {
        self.modules.loaded().map(str::to_string).collect()
    }

    pub fn bound_descriptors(&self) -> Vec<String> {
        self.modules.bound().map(str::to_string).collect()
    }

    /// Whether a load pass is owed after a serialization round trip.
    pub fn reload_pending(&self) -> bool {
        self.reload_owed
    }

    /// Fired once at the end of every load pass.
    pub fn on_bound(&self) -> &Event<()> {
        &self.on_bound
    }
}

fn locator_for(base_directory: impl Into<PathBuf>, extension: Option<&str>) -> ModuleLocator {
    match extension {
        Some(ext) => ModuleLocator::new(base_directory, ext),
        None => ModuleLocator::native(base_directory),
    }
}

impl<P: PlatformLoader> Drop for PluginLoader<P> {
    fn drop(&mut self) {
        let report = self.dispose();
        if !report.is_clean() {
            tracing::warn!(
                "{} plugin module(s) failed to close while dropping the loader",
                report.failures.len()
            );
        }
    }
}

impl<P: PlatformLoader> fmt::Debug for PluginLoader<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLoader")
            .field("state", &self.state)
            .field("base_directory", &self.base_directory())
            .field("loaded", &self.loaded_modules())
            .field("bound", &self.bound_descriptors())
            .field("reload_owed", &self.reload_owed)
            .finish()
    }
}
