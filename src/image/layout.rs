//! Pixel buffer geometry
//!
//! Buffers are sized up to a multiple of 64 bytes so that vector code as wide
//! as AVX-512 can read a full lane past the last pixel without leaving the
//! allocation.

/// Granularity of every pixel buffer allocation
pub const ALLOCATION_ALIGNMENT: usize = 64;

/// Packed 32-bit pixels
pub const BYTES_PER_PIXEL: usize = 4;

/// Round `len` up to a multiple of `align` (a power of two)
///
/// Returns `None` on overflow.
#[must_use]
pub fn align_up(len: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    Some(len.checked_add(align - 1)? & !(align - 1))
}

/// Why a set of dimensions cannot be laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// Width or height is zero
    Empty,
    /// The buffer size does not fit the address space or the row stride
    /// does not fit the library's signed 32-bit fields
    TooLarge,
}

/// Geometry of a locked 32bpp buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    width: u32,
    height: u32,
    stride: usize,
    len: usize,
    alloc_size: usize,
}

impl PixelLayout {
    /// # Errors
    /// `Empty` for a zero dimension, `TooLarge` when the sizes overflow
    pub fn new(width: u32, height: u32) -> Result<Self, LayoutError> {
        if width == 0 || height == 0 {
            return Err(LayoutError::Empty);
        }
        // Both end up in the library's i32 fields
        if i32::try_from(height).is_err() {
            return Err(LayoutError::TooLarge);
        }
        let stride = usize::try_from(width)
            .ok()
            .and_then(|w| w.checked_mul(BYTES_PER_PIXEL))
            .filter(|&s| i32::try_from(s).is_ok())
            .ok_or(LayoutError::TooLarge)?;
        let len = usize::try_from(height)
            .ok()
            .and_then(|h| h.checked_mul(stride))
            .ok_or(LayoutError::TooLarge)?;
        let alloc_size = align_up(len, ALLOCATION_ALIGNMENT).ok_or(LayoutError::TooLarge)?;

        Ok(Self {
            width,
            height,
            stride,
            len,
            alloc_size,
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes between consecutive rows, always `width * 4`
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes covered by pixels
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes to request from the allocator
    #[must_use]
    pub fn alloc_size(&self) -> usize {
        self.alloc_size
    }
}
