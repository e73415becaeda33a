//! Scripted platform loader for integration tests.
//!
//! Modules are keyed by logical name (the file stem of the opened path) and
//! export real `extern "C"` functions from this test binary, so bound slots
//! can actually be called.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hotbind_core::prelude::*;
use hotbind_core::RawAddress;
use parking_lot::Mutex;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color32 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

pub type GetPosition = extern "C" fn(f32, f32, f32) -> Vector2;
pub type GetColor = extern "C" fn() -> Color32;
pub type Run = extern "C" fn() -> i32;

pub extern "C" fn get_position(time: f32, amplitude: f32, frequency: f32) -> Vector2 {
    Vector2 {
        x: (time * frequency).cos() * amplitude,
        y: (time * frequency).sin() * amplitude,
    }
}

pub extern "C" fn get_color() -> Color32 {
    Color32 {
        r: 45,
        g: 45,
        b: 45,
        a: 255,
    }
}

pub extern "C" fn run() -> i32 {
    7
}

pub extern "C" fn run_v2() -> i32 {
    8
}

pub fn addr(ptr: *const c_void) -> RawAddress {
    RawAddress::new(ptr).expect("function pointers are never null")
}

declare_plugin! {
    pub struct GeoBindings for "geo" {
        get_position: GetPosition,
        get_color: GetColor,
    }
}

declare_plugin! {
    pub struct OtherBindings for "other" {
        run: Run,
    }
}

/// Handle returned by [`MockPlatform::open`]. Not `Clone`.
#[derive(Debug)]
pub struct MockHandle {
    pub id: u64,
    pub name: String,
}

#[derive(Default)]
struct MockState {
    exports: HashMap<String, HashMap<String, RawAddress>>,
    opens: HashMap<String, usize>,
    closes: HashMap<String, usize>,
    live: HashSet<u64>,
    next_id: u64,
    fail_close: HashSet<String>,
    opened_paths: Vec<PathBuf>,
    /// `(id, symbol)` for every resolve, so tests can check which handle
    /// produced a callable.
    resolved_from: Vec<(u64, String)>,
    /// When set, `close` checks that the module's slots are already clear.
    tracked: Option<Arc<DeclarationRegistry>>,
    checked_closes: usize,
}

/// Clones share state, so a test can keep one copy while the loader owns
/// another.
#[derive(Clone, Default)]
pub struct MockPlatform {
    state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` openable with the given exports.
    pub fn with_module(self, name: &str, exports: &[(&str, RawAddress)]) -> Self {
        self.set_module(name, exports);
        self
    }

    pub fn set_module(&self, name: &str, exports: &[(&str, RawAddress)]) {
        let exports = exports
            .iter()
            .map(|(symbol, addr)| (symbol.to_string(), *addr))
            .collect();
        self.state.lock().exports.insert(name.to_string(), exports);
    }

    pub fn remove_module(&self, name: &str) {
        self.state.lock().exports.remove(name);
    }

    /// Check on every close that the closing module's slots in `registry`
    /// were cleared first. Returns the registry for chaining.
    pub fn track(&self, registry: Arc<DeclarationRegistry>) -> Arc<DeclarationRegistry> {
        self.state.lock().tracked = Some(registry.clone());
        registry
    }

    /// Closes that went through the slot check.
    pub fn checked_closes(&self) -> usize {
        self.state.lock().checked_closes
    }

    pub fn fail_close(&self, name: &str) {
        self.state.lock().fail_close.insert(name.to_string());
    }

    pub fn opens(&self, name: &str) -> usize {
        self.state.lock().opens.get(name).copied().unwrap_or(0)
    }

    pub fn closes(&self, name: &str) -> usize {
        self.state.lock().closes.get(name).copied().unwrap_or(0)
    }

    pub fn live_handles(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn opened_paths(&self) -> Vec<PathBuf> {
        self.state.lock().opened_paths.clone()
    }

    pub fn resolved_from(&self) -> Vec<(u64, String)> {
        self.state.lock().resolved_from.clone()
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl PlatformLoader for MockPlatform {
    type Handle = MockHandle;

    fn open(&self, path: &Path) -> hotbind_core::Result<MockHandle> {
        let mut state = self.state.lock();
        state.opened_paths.push(path.to_path_buf());

        let name = stem(path);
        if !state.exports.contains_key(&name) {
            return Err(LoadError::ModuleNotFound {
                path: path.to_path_buf(),
            });
        }

        *state.opens.entry(name.clone()).or_default() += 1;
        state.next_id += 1;
        let id = state.next_id;
        state.live.insert(id);
        Ok(MockHandle { id, name })
    }

    fn resolve(&self, handle: &MockHandle, symbol: &str) -> hotbind_core::Result<RawAddress> {
        let mut state = self.state.lock();
        assert!(
            state.live.contains(&handle.id),
            "resolve through closed handle {}",
            handle.id
        );

        let addr = state
            .exports
            .get(&handle.name)
            .and_then(|exports| exports.get(symbol))
            .copied()
            .ok_or_else(|| LoadError::SymbolNotFound {
                symbol: symbol.to_string(),
                message: format!("{} does not export {}", handle.name, symbol),
            })?;
        state.resolved_from.push((handle.id, symbol.to_string()));
        Ok(addr)
    }

    fn close(&self, handle: MockHandle) -> hotbind_core::Result<()> {
        let mut state = self.state.lock();
        assert!(state.live.remove(&handle.id), "double close of handle {}", handle.id);

        if let Some(registry) = state.tracked.clone() {
            if let Some(descriptor) = registry.get(&handle.name) {
                for slot in descriptor.slots() {
                    assert!(
                        !slot.is_bound(),
                        "{}::{} still bound when its module was closed",
                        handle.name,
                        slot.symbol_name()
                    );
                }
            }
            state.checked_closes += 1;
        }
        *state.closes.entry(handle.name.clone()).or_default() += 1;

        if state.fail_close.contains(&handle.name) {
            return Err(LoadError::OsUnloadFailed {
                logical_name: handle.name,
                code: Some(5),
                message: "access denied".to_string(),
            });
        }
        Ok(())
    }
}

/// `geo` exporting both functions and `other` exporting `run`.
pub fn full_platform() -> MockPlatform {
    MockPlatform::new()
        .with_module(
            "geo",
            &[
                ("get_position", addr(get_position as *const c_void)),
                ("get_color", addr(get_color as *const c_void)),
            ],
        )
        .with_module("other", &[("run", addr(run as *const c_void))])
}

pub fn registry(geo: &GeoBindings, other: &OtherBindings) -> Arc<DeclarationRegistry> {
    DeclarationRegistry::builder()
        .with_bindings(geo)
        .with_bindings(other)
        .build()
        .expect("valid declarations")
}

/// Every name in `bound_descriptors` is also loaded.
pub fn assert_bound_subset_of_loaded<P: PlatformLoader>(loader: &PluginLoader<P>) {
    let loaded = loader.loaded_modules();
    for name in loader.bound_descriptors() {
        assert!(loaded.contains(&name), "{} bound but not loaded", name);
    }
}
