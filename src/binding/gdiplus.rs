//! The GDI+ flat API, resolved at runtime
//!
//! Works against `gdiplus.dll` on Windows and against any library exporting
//! the same flat entry points (for example `libgdiplus`) elsewhere.

use std::ffi::c_void;
use std::path::Path;
use std::ptr::{self, NonNull};

use tracing::debug;

use super::ffi::{BitmapData, LockMode, PixelFormat, Rect, StartupInput};
use super::host::HostEntryPoints;
use super::module::Module;
use super::{Binder, HostAllocator, ImagingApi, NativeImage, StartupToken};
use crate::config::LibraryConfig;
use crate::error::{BindingError, Status};

entry_points! {
    /// Entry points resolved from the imaging library
    pub struct GdiplusEntryPoints {
        startup: "GdiplusStartup"
            => unsafe extern "system" fn(*mut usize, *const StartupInput, *mut c_void) -> u32,
        shutdown: "GdiplusShutdown" => unsafe extern "system" fn(usize),
        create_bitmap_from_file: "GdipCreateBitmapFromFile"
            => unsafe extern "system" fn(*const u16, *mut *mut c_void) -> u32,
        dispose_image: "GdipDisposeImage" => unsafe extern "system" fn(*mut c_void) -> u32,
        get_image_width: "GdipGetImageWidth"
            => unsafe extern "system" fn(*mut c_void, *mut u32) -> u32,
        get_image_height: "GdipGetImageHeight"
            => unsafe extern "system" fn(*mut c_void, *mut u32) -> u32,
        bitmap_lock_bits: "GdipBitmapLockBits"
            => unsafe extern "system" fn(*mut c_void, *const Rect, u32, u32, *mut BitmapData) -> u32,
        bitmap_unlock_bits: "GdipBitmapUnlockBits"
            => unsafe extern "system" fn(*mut c_void, *mut BitmapData) -> u32,
    }
}

/// Binds to the system imaging library named in the configuration
#[derive(Debug, Clone, Default)]
pub struct SystemBinder {
    config: LibraryConfig,
}

impl SystemBinder {
    #[must_use]
    pub fn new(config: LibraryConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }
}

impl Binder for SystemBinder {
    type Session = NativeSession;

    fn bind(&mut self) -> Result<NativeSession, BindingError> {
        let host = Module::attach(self.config.host_module.as_deref())?;
        // Safety: the tables declare the documented signatures and are stored
        // next to the module they came from.
        let allocator = unsafe { HostEntryPoints::resolve(&host)? };
        let imaging = Module::load(&self.config.imaging_library)?;
        let api = unsafe { GdiplusEntryPoints::resolve(&imaging)? };

        debug!(
            "Resolved {} entry points from {} and {} from {}",
            HostEntryPoints::SYMBOLS.len(),
            host.name(),
            GdiplusEntryPoints::SYMBOLS.len(),
            imaging.name()
        );

        Ok(NativeSession {
            api,
            allocator,
            imaging,
            host,
        })
    }
}

/// Live entry points together with the modules that own them
///
/// Dropping the session releases the imaging library, then the host module.
pub struct NativeSession {
    api: GdiplusEntryPoints,
    allocator: HostEntryPoints,
    // Only held so the tables above stay valid
    #[allow(dead_code)]
    imaging: Module,
    #[allow(dead_code)]
    host: Module,
}

/// NUL-terminated UTF-16 form of `path`, or `None` if it embeds a NUL
fn wide_path(path: &Path) -> Option<Vec<u16>> {
    #[cfg(windows)]
    let mut units: Vec<u16> = {
        use std::os::windows::ffi::OsStrExt;
        path.as_os_str().encode_wide().collect()
    };
    #[cfg(not(windows))]
    let mut units: Vec<u16> = path.to_string_lossy().encode_utf16().collect();

    if units.contains(&0) {
        return None;
    }
    units.push(0);
    Some(units)
}

impl ImagingApi for NativeSession {
    fn startup(&self, input: &StartupInput) -> Result<StartupToken, Status> {
        let mut token = 0usize;
        // Safety: both pointers are valid for the call; no output struct is
        // needed while the background thread is enabled.
        Status(unsafe { (self.api.startup)(&mut token, input, ptr::null_mut()) }).ok()?;
        Ok(StartupToken(token))
    }

    fn shutdown(&self, token: StartupToken) {
        unsafe { (self.api.shutdown)(token.0) };
    }

    fn create_bitmap_from_file(&self, path: &Path) -> Result<NativeImage, Status> {
        let wide = wide_path(path).ok_or(Status::INVALID_PARAMETER)?;
        let mut bitmap: *mut c_void = ptr::null_mut();
        Status(unsafe { (self.api.create_bitmap_from_file)(wide.as_ptr(), &mut bitmap) }).ok()?;
        let bitmap = NonNull::new(bitmap).ok_or(Status::GENERIC_ERROR)?;
        // Safety: the library just handed us this handle.
        Ok(unsafe { NativeImage::from_raw(bitmap) })
    }

    fn dispose_image(&self, image: NativeImage) -> Result<(), Status> {
        Status(unsafe { (self.api.dispose_image)(image.as_ptr()) }).ok()
    }

    fn image_width(&self, image: NativeImage) -> Result<u32, Status> {
        let mut width = 0;
        Status(unsafe { (self.api.get_image_width)(image.as_ptr(), &mut width) }).ok()?;
        Ok(width)
    }

    fn image_height(&self, image: NativeImage) -> Result<u32, Status> {
        let mut height = 0;
        Status(unsafe { (self.api.get_image_height)(image.as_ptr(), &mut height) }).ok()?;
        Ok(height)
    }

    unsafe fn lock_bits(
        &self,
        image: NativeImage,
        rect: &Rect,
        mode: LockMode,
        format: PixelFormat,
        data: &mut BitmapData,
    ) -> Result<(), Status> {
        Status((self.api.bitmap_lock_bits)(
            image.as_ptr(),
            rect,
            mode.bits(),
            format.0,
            data,
        ))
        .ok()
    }

    unsafe fn unlock_bits(&self, image: NativeImage, data: &mut BitmapData) -> Result<(), Status> {
        Status((self.api.bitmap_unlock_bits)(image.as_ptr(), data)).ok()
    }
}

impl HostAllocator for NativeSession {
    fn alloc_zeroed(&self, size: usize) -> Option<NonNull<u8>> {
        self.allocator.alloc_zeroed(size)
    }

    unsafe fn free(&self, block: NonNull<u8>) {
        self.allocator.free(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point_table() {
        assert_eq!(
            GdiplusEntryPoints::SYMBOLS,
            &[
                "GdiplusStartup",
                "GdiplusShutdown",
                "GdipCreateBitmapFromFile",
                "GdipDisposeImage",
                "GdipGetImageWidth",
                "GdipGetImageHeight",
                "GdipBitmapLockBits",
                "GdipBitmapUnlockBits",
            ]
        );
    }

    #[test]
    fn test_wide_path_is_nul_terminated() {
        let wide = wide_path(Path::new("ünï.png")).unwrap();
        assert_eq!(wide.last(), Some(&0));
        assert_eq!(String::from_utf16(&wide[..wide.len() - 1]).unwrap(), "ünï.png");
    }

    #[cfg(unix)]
    #[test]
    fn test_wide_path_rejects_interior_nul() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"bad\0name.png"));
        assert!(wide_path(path).is_none());
    }

    #[test]
    fn test_missing_imaging_library_fails_bind() {
        let mut binder = SystemBinder::new(LibraryConfig {
            imaging_library: "leanloader-no-such-imaging-library".to_string(),
            host_module: None,
        });
        match binder.bind() {
            Err(BindingError::ModuleNotFound { module, .. }) => {
                assert_eq!(module, "leanloader-no-such-imaging-library");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("library should not exist"),
        }
    }
}
