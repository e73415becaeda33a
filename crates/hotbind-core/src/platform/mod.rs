//! Platform loader adapter.
//!
//! [`PlatformLoader`] is the only seam where platform differences live:
//! opening a module file, looking up a symbol, and closing the module again.
//! Every call goes straight to the OS loader; nothing is cached here.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::signature::RawAddress;

pub mod native;

pub use native::{NativeLoader, NativeModule};

/// Thin contract over the OS dynamic-library API.
pub trait PlatformLoader {
    /// Opaque token for one open module. Deliberately not `Copy`:
    /// [`close`](Self::close) consumes it, so a handle cannot be freed twice.
    type Handle;

    /// Open the module at `path`.
    ///
    /// Fails with `ModuleNotFound` when the file is missing and
    /// `OsLoadFailed` when the OS loader rejects it.
    fn open(&self, path: &Path) -> Result<Self::Handle>;

    /// Look up `symbol` in an open module. Fails with `SymbolNotFound`.
    fn resolve(&self, handle: &Self::Handle, symbol: &str) -> Result<RawAddress>;

    /// Close a module. Fails with `OsUnloadFailed`; the handle is gone either way.
    fn close(&self, handle: Self::Handle) -> Result<()>;
}

/// Maps logical plugin names to module files on disk.
///
/// The file name is the logical name with the native library extension
/// appended; nothing else about the name is changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLocator {
    base_directory: PathBuf,
    extension: String,
}

impl ModuleLocator {
    pub fn new(base_directory: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            base_directory: base_directory.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Locator using this platform's library extension (`so`, `dylib`, `dll`).
    pub fn native(base_directory: impl Into<PathBuf>) -> Self {
        Self::new(base_directory, std::env::consts::DLL_EXTENSION)
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn file_name(&self, logical_name: &str) -> String {
        if self.extension.is_empty() {
            logical_name.to_string()
        } else {
            format!("{}.{}", logical_name, self.extension)
        }
    }

    /// Expected path of the module for `logical_name`.
    pub fn module_path(&self, logical_name: &str) -> PathBuf {
        self.base_directory.join(self.file_name(logical_name))
    }

    /// Reverse mapping used by file watchers: the logical name a path would
    /// belong to, if it carries the expected extension.
    pub fn logical_name_of(&self, path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        if self.extension.is_empty() {
            return Some(file_name.to_string());
        }
        file_name
            .strip_suffix(&self.extension)
            .and_then(|stem| stem.strip_suffix('.'))
            .filter(|stem| !stem.is_empty())
            .map(str::to_string)
    }
}
