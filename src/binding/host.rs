//! Raw allocator primitives resolved from the host module
//!
//! Windows exposes `GlobalAlloc`/`GlobalFree` from `kernel32.dll`; other hosts
//! export `calloc`/`free` from the process image. Both are looked up by name
//! at bind time, never linked.

use std::ffi::c_void;
use std::ptr::NonNull;

/// Host module attached when the configuration names none
#[cfg(windows)]
pub const DEFAULT_HOST_MODULE: &str = "kernel32.dll";

#[cfg(windows)]
mod imp {
    use super::{c_void, NonNull};

    /// `GMEM_FIXED | GMEM_ZEROINIT`
    const GPTR: u32 = 0x0040;

    entry_points! {
        /// Allocator entry points exported by `kernel32.dll`
        pub struct HostEntryPoints {
            global_alloc: "GlobalAlloc" => unsafe extern "system" fn(u32, usize) -> *mut c_void,
            global_free: "GlobalFree" => unsafe extern "system" fn(*mut c_void) -> *mut c_void,
        }
    }

    impl HostEntryPoints {
        pub(crate) fn alloc_zeroed(&self, size: usize) -> Option<NonNull<u8>> {
            // Safety: GPTR returns a fixed, zeroed block or null.
            NonNull::new(unsafe { (self.global_alloc)(GPTR, size) }.cast())
        }

        pub(crate) unsafe fn free(&self, block: NonNull<u8>) {
            // GlobalFree returns the handle back on failure; nothing to unwind.
            (self.global_free)(block.as_ptr().cast());
        }
    }
}

#[cfg(not(windows))]
mod imp {
    use super::{c_void, NonNull};

    entry_points! {
        /// Allocator entry points exported by the C runtime in the process image
        pub struct HostEntryPoints {
            calloc: "calloc" => unsafe extern "C" fn(usize, usize) -> *mut c_void,
            free: "free" => unsafe extern "C" fn(*mut c_void),
        }
    }

    impl HostEntryPoints {
        pub(crate) fn alloc_zeroed(&self, size: usize) -> Option<NonNull<u8>> {
            // Safety: calloc has no preconditions beyond a valid size.
            NonNull::new(unsafe { (self.calloc)(1, size) }.cast())
        }

        pub(crate) unsafe fn free(&self, block: NonNull<u8>) {
            (self.free)(block.as_ptr().cast());
        }
    }
}

pub use imp::HostEntryPoints;
