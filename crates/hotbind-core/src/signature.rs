//! Conversion of resolved symbol addresses into typed function pointers.
//!
//! This is the only place in the crate where a raw address becomes
//! something callable. Nothing here can verify that the native code behind
//! an address really has the declared parameter types, return type, and
//! calling convention: that is a trust boundary, the same one every FFI
//! declaration crosses. Declaring a slot with the wrong signature and then
//! calling it is undefined behavior; the host owns that obligation.

use std::ffi::c_void;
use std::ptr::NonNull;

/// Address of an exported symbol inside an open module.
///
/// Produced by a [`PlatformLoader`](crate::platform::PlatformLoader) and
/// consumed by the binding engine. Slots never hand it out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAddress(NonNull<c_void>);

impl RawAddress {
    /// Wrap a symbol address. Returns `None` for a null pointer.
    pub fn new(ptr: *const c_void) -> Option<Self> {
        NonNull::new(ptr as *mut c_void).map(Self)
    }

    pub fn as_ptr(self) -> *const c_void {
        self.0.as_ptr()
    }
}

/// A function pointer type that a symbol address can be bound to.
///
/// Implemented for `extern "C"` and `extern "system"` function pointers (safe
/// and `unsafe`) taking up to eight arguments.
///
/// # Safety
///
/// Implementors must be plain function pointer types, the same size as a
/// data pointer.
pub unsafe trait NativeFn: Copy + Send + Sync + 'static {
    /// Reinterpret `addr` as this function pointer type.
    ///
    /// # Safety
    ///
    /// `addr` must point to a function with exactly this signature and
    /// calling convention, and the module that exports it must stay open for
    /// as long as the returned pointer is used.
    unsafe fn from_raw(addr: RawAddress) -> Self;

    /// Human readable signature, used in diagnostics.
    fn signature() -> &'static str {
        std::any::type_name::<Self>()
    }
}

macro_rules! impl_native_fn {
    ($($arg:ident),*) => {
        impl_native_fn!(@abi "C"; $($arg),*);
        impl_native_fn!(@abi "system"; $($arg),*);
    };
    (@abi $abi:tt; $($arg:ident),*) => {
        unsafe impl<R: 'static, $($arg: 'static),*> NativeFn for extern $abi fn($($arg),*) -> R {
            unsafe fn from_raw(addr: RawAddress) -> Self {
                let ptr = addr.as_ptr();
                std::mem::transmute_copy::<*const c_void, Self>(&ptr)
            }
        }

        unsafe impl<R: 'static, $($arg: 'static),*> NativeFn for unsafe extern $abi fn($($arg),*) -> R {
            unsafe fn from_raw(addr: RawAddress) -> Self {
                let ptr = addr.as_ptr();
                std::mem::transmute_copy::<*const c_void, Self>(&ptr)
            }
        }
    };
}

impl_native_fn!();
impl_native_fn!(A1);
impl_native_fn!(A1, A2);
impl_native_fn!(A1, A2, A3);
impl_native_fn!(A1, A2, A3, A4);
impl_native_fn!(A1, A2, A3, A4, A5);
impl_native_fn!(A1, A2, A3, A4, A5, A6);
impl_native_fn!(A1, A2, A3, A4, A5, A6, A7);
impl_native_fn!(A1, A2, A3, A4, A5, A6, A7, A8);

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    #[test]
    fn test_null_address_rejected() {
        assert!(RawAddress::new(std::ptr::null()).is_none());
    }

    #[test]
    fn test_round_trip_through_raw_address() {
        let addr = RawAddress::new(add as *const c_void).unwrap();
        let f = unsafe { <extern "C" fn(i32, i32) -> i32 as NativeFn>::from_raw(addr) };
        assert_eq!(f(2, 3), 5);
    }

    #[test]
    fn test_signature_names_argument_types() {
        let name = <unsafe extern "C" fn(f32, f32) -> u8 as NativeFn>::signature();
        assert!(name.contains("f32"));
        assert!(name.contains("u8"));
    }
}
