//! Error taxonomy for loading, binding, and unloading native plugins.
//!
//! A declared signature that does not match what a symbol actually
//! implements has no variant here. The mismatch cannot be observed from the
//! host side of the FFI boundary, so it stays a caller obligation (see
//! [`crate::signature::NativeFn`]).

use std::path::PathBuf;

use serde::Serialize;

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors raised by the platform adapter and the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadError {
    /// No module file exists at the expected path.
    #[error("Module not found: {}", .path.display())]
    ModuleNotFound { path: PathBuf },

    /// The OS loader rejected the file (bad format, unresolved dependency).
    #[error("Failed to load module {}: {message}{}", .path.display(), fmt_code(.code))]
    OsLoadFailed {
        path: PathBuf,
        code: Option<i32>,
        message: String,
    },

    /// The module is open but does not export the symbol.
    #[error("Symbol not found: {symbol} ({message})")]
    SymbolNotFound { symbol: String, message: String },

    /// The OS refused to unload a module. Its handle may have leaked.
    #[error("Failed to unload module {logical_name}: {message}{}", fmt_code(.code))]
    OsUnloadFailed {
        logical_name: String,
        code: Option<i32>,
        message: String,
    },

    /// A loader is already live for this declaration registry.
    #[error("Plugin loader already initialized")]
    AlreadyInitialized,

    /// The operation needs a loader that went through `init` first.
    #[error("Plugin loader not initialized")]
    NotInitialized,

    /// The loader was disposed; build a fresh one instead.
    #[error("Plugin loader disposed")]
    Disposed,

    /// Invalid configuration or manifest.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

fn fmt_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (os error {})", code),
        None => String::new(),
    }
}

impl LoadError {
    /// Build an `OsLoadFailed` from a libloading error, keeping the OS code when
    /// the platform reports one.
    pub fn os_load(path: impl Into<PathBuf>, err: &libloading::Error) -> Self {
        Self::OsLoadFailed {
            path: path.into(),
            code: os_error_code(err),
            message: err.to_string(),
        }
    }

    pub fn symbol_not_found(symbol: impl Into<String>, err: &libloading::Error) -> Self {
        Self::SymbolNotFound {
            symbol: symbol.into(),
            message: err.to_string(),
        }
    }

    pub fn os_unload(logical_name: impl Into<String>, err: &libloading::Error) -> Self {
        Self::OsUnloadFailed {
            logical_name: logical_name.into(),
            code: os_error_code(err),
            message: err.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// True for errors that only concern a single slot.
    pub fn is_slot_error(&self) -> bool {
        matches!(self, Self::SymbolNotFound { .. })
    }
}

/// Walk the source chain looking for an `io::Error` carrying a raw OS code.
///
/// Windows loader errors wrap the `GetLastError` value this way; `dlerror`
/// only yields a description, so Unix platforms report `None`.
fn os_error_code(err: &libloading::Error) -> Option<i32> {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(err);
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            return io.raw_os_error();
        }
        source = current.source();
    }
    None
}
