//! Dynamic binding to the imaging library
//!
//! Nothing here is linked at build time. The host module, the raw allocator
//! and every imaging entry point are looked up by name when the first caller
//! acquires the process-wide [`BindingEnvironment`], and released again when
//! the last caller lets go.
//!
//! The traits in this module are the seams between the lifecycle code and the
//! native library:
//! - [`Binder`] produces a session (resolution, no startup)
//! - [`ImagingApi`] is the imaging library's entry point set
//! - [`HostAllocator`] is the host's raw zeroed allocator

use std::ffi::c_void;
use std::path::Path;
use std::ptr::NonNull;

use crate::error::{BindingError, Status};

/// Declare a table of entry points resolved by name from one module
///
/// Resolution is eager and all-or-nothing: the first missing export fails the
/// whole table.
macro_rules! entry_points {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $field:ident : $symbol:literal => $ty:ty, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy)]
        $vis struct $name {
            $( $field: $ty, )*
        }

        impl $name {
            /// Exported names in resolution order
            pub const SYMBOLS: &'static [&'static str] = &[$( $symbol ),*];

            /// # Safety
            /// The declared signatures must match the module's exports, and
            /// the table must not be used after `module` is dropped.
            pub(crate) unsafe fn resolve(
                module: &$crate::binding::module::Module,
            ) -> Result<Self, $crate::error::BindingError> {
                Ok(Self {
                    $( $field: module.entry::<$ty>($symbol)?, )*
                })
            }
        }
    };
}

mod environment;
mod ffi;
mod gdiplus;
mod host;
mod module;

pub use environment::{environment, BindingEnvironment};
pub use ffi::{BitmapData, LockMode, PixelFormat, Rect, StartupInput};
pub use gdiplus::{GdiplusEntryPoints, NativeSession, SystemBinder};
pub use host::HostEntryPoints;

/// Opaque handle to a decoded image owned by the imaging library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeImage(NonNull<c_void>);

impl NativeImage {
    /// Wrap a raw handle
    ///
    /// # Safety
    /// `raw` must be a live handle produced by the same [`ImagingApi`] it
    /// will be passed back to.
    #[must_use]
    pub unsafe fn from_raw(raw: NonNull<c_void>) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Token issued by library startup and consumed by shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupToken(pub usize);

/// Entry points of the imaging library
///
/// Every call returns the library's [`Status`]; wrappers translate that to a
/// `Result`. Handles passed in are only ever ones this same implementation
/// returned.
pub trait ImagingApi {
    /// Initialise the library for this process
    ///
    /// # Errors
    /// The status reported by the library
    fn startup(&self, input: &StartupInput) -> Result<StartupToken, Status>;

    /// Shut the library down; the token is spent afterwards
    fn shutdown(&self, token: StartupToken);

    /// Decode the file at `path` into a new bitmap
    ///
    /// # Errors
    /// The status reported by the library (missing file, unknown format, ...)
    fn create_bitmap_from_file(&self, path: &Path) -> Result<NativeImage, Status>;

    /// Release a bitmap created by [`Self::create_bitmap_from_file`]
    ///
    /// # Errors
    /// The status reported by the library
    fn dispose_image(&self, image: NativeImage) -> Result<(), Status>;

    /// # Errors
    /// The status reported by the library
    fn image_width(&self, image: NativeImage) -> Result<u32, Status>;

    /// # Errors
    /// The status reported by the library
    fn image_height(&self, image: NativeImage) -> Result<u32, Status>;

    /// Lock `rect` of `image`, binding it to the buffer described by `data`
    ///
    /// # Safety
    /// With [`LockMode::USER_INPUT_BUF`], `data.scan0` must point to at least
    /// `data.stride * rect.height` writable bytes that stay valid until the
    /// matching [`Self::unlock_bits`].
    ///
    /// # Errors
    /// The status reported by the library
    unsafe fn lock_bits(
        &self,
        image: NativeImage,
        rect: &Rect,
        mode: LockMode,
        format: PixelFormat,
        data: &mut BitmapData,
    ) -> Result<(), Status>;

    /// Undo a successful [`Self::lock_bits`]
    ///
    /// # Safety
    /// `data` must be the descriptor the lock filled in.
    ///
    /// # Errors
    /// The status reported by the library
    unsafe fn unlock_bits(&self, image: NativeImage, data: &mut BitmapData) -> Result<(), Status>;
}

/// Raw zeroed allocator provided by the host
pub trait HostAllocator {
    /// Allocate `size` zeroed bytes, or `None` when the host is exhausted
    fn alloc_zeroed(&self, size: usize) -> Option<NonNull<u8>>;

    /// # Safety
    /// `block` must come from [`Self::alloc_zeroed`] on this allocator and
    /// must not be used afterwards.
    unsafe fn free(&self, block: NonNull<u8>);
}

/// Resolves a complete session of entry points
///
/// `bind` performs only resolution; startup and shutdown are driven by the
/// [`BindingEnvironment`]. Dropping the session releases whatever modules it
/// loaded.
pub trait Binder {
    type Session: ImagingApi + HostAllocator;

    /// # Errors
    /// `ModuleNotFound` or `SymbolNotFound`; nothing stays loaded on failure
    fn bind(&mut self) -> Result<Self::Session, BindingError>;
}
