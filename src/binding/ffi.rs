//! C layouts shared with the imaging library

use std::ffi::c_void;
use std::ptr;

use bitflags::bitflags;

/// Pixel format tag understood by the imaging library
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat(pub u32);

impl PixelFormat {
    /// 32 bits per pixel, 8 bits each for alpha, red, green and blue
    pub const ARGB32: Self = Self(0x0026_200A);

    /// Bits per pixel encoded in the tag
    #[must_use]
    pub fn bits_per_pixel(self) -> u32 {
        (self.0 >> 8) & 0xFF
    }
}

bitflags! {
    /// Access requested when locking a region of a bitmap
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LockMode: u32 {
        const READ = 0x0001;
        const WRITE = 0x0002;
        /// The caller supplies the buffer through `BitmapData::scan0`
        const USER_INPUT_BUF = 0x0004;
    }
}

/// Startup descriptor passed to `GdiplusStartup`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StartupInput {
    pub version: u32,
    pub debug_event_callback: *const c_void,
    pub suppress_background_thread: i32,
    pub suppress_external_codecs: i32,
}

impl Default for StartupInput {
    fn default() -> Self {
        Self {
            version: 1,
            debug_event_callback: ptr::null(),
            suppress_background_thread: 0,
            suppress_external_codecs: 0,
        }
    }
}

/// Integer rectangle, `x`/`y` origin plus extent
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Locked bitmap descriptor
///
/// With [`LockMode::USER_INPUT_BUF`] the caller fills `scan0` and `stride`
/// before locking and the library decodes straight into that memory. The
/// library keeps its own bookkeeping in `reserved`, so the same descriptor
/// must be handed back when unlocking.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BitmapData {
    pub width: u32,
    pub height: u32,
    pub stride: i32,
    pub pixel_format: PixelFormat,
    pub scan0: *mut c_void,
    pub reserved: usize,
}

impl Default for BitmapData {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            stride: 0,
            pixel_format: PixelFormat(0),
            scan0: ptr::null_mut(),
            reserved: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argb_is_32_bits() {
        assert_eq!(PixelFormat::ARGB32.bits_per_pixel(), 32);
    }

    #[test]
    fn test_startup_input_defaults() {
        let input = StartupInput::default();
        assert_eq!(input.version, 1);
        assert!(input.debug_event_callback.is_null());
        assert_eq!(input.suppress_background_thread, 0);
        assert_eq!(input.suppress_external_codecs, 0);
    }

    #[test]
    fn test_lock_mode_bits() {
        let mode = LockMode::READ | LockMode::WRITE | LockMode::USER_INPUT_BUF;
        assert_eq!(mode.bits(), 7);
    }
}
