//! Native loader for .so/.dylib/.dll files, backed by `libloading`.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use super::PlatformLoader;
use crate::error::{LoadError, Result};
use crate::signature::RawAddress;

/// [`PlatformLoader`] over the operating system's dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        Self
    }
}

/// An open native library.
#[derive(Debug)]
pub struct NativeModule {
    library: Library,
    path: PathBuf,
}

impl NativeModule {
    /// File the module was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PlatformLoader for NativeLoader {
    type Handle = NativeModule;

    fn open(&self, path: &Path) -> Result<NativeModule> {
        if !path.is_file() {
            return Err(LoadError::ModuleNotFound {
                path: path.to_path_buf(),
            });
        }

        // SAFETY: running the module's initialisers is the point of loading
        // it; the host trusts whatever it placed in the plugin directory.
        let library = unsafe { Library::new(path) }.map_err(|e| LoadError::os_load(path, &e))?;

        Ok(NativeModule {
            library,
            path: path.to_path_buf(),
        })
    }

    fn resolve(&self, handle: &NativeModule, symbol: &str) -> Result<RawAddress> {
        // SAFETY: the symbol is read as an opaque address and never
        // dereferenced here; typing it is the binding engine's job.
        let address: Symbol<*const c_void> = unsafe { handle.library.get(symbol.as_bytes()) }
            .map_err(|e| LoadError::symbol_not_found(symbol, &e))?;

        RawAddress::new(*address).ok_or_else(|| LoadError::SymbolNotFound {
            symbol: symbol.to_string(),
            message: "symbol resolved to a null address".to_string(),
        })
    }

    fn close(&self, handle: NativeModule) -> Result<()> {
        let NativeModule { library, path } = handle;
        library.close().map_err(|e| {
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            LoadError::os_unload(name, &e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.so");

        match NativeLoader::new().open(&path) {
            Err(LoadError::ModuleNotFound { path: reported }) => assert_eq!(reported, path),
            other => panic!("expected ModuleNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_open_directory_is_not_a_module() {
        let dir = tempfile::tempdir().unwrap();
        let result = NativeLoader::new().open(dir.path());
        assert!(matches!(result, Err(LoadError::ModuleNotFound { .. })));
    }

    #[test]
    fn test_open_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir
            .path()
            .join(format!("garbage.{}", std::env::consts::DLL_EXTENSION));
        std::fs::write(&path, b"definitely not a shared library").unwrap();

        match NativeLoader::new().open(&path) {
            Err(LoadError::OsLoadFailed { path: reported, message, .. }) => {
                assert_eq!(reported, path);
                assert!(!message.is_empty());
            }
            other => panic!("expected OsLoadFailed, got {:?}", other.map(|_| ())),
        }
    }
}
