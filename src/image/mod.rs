//! Image lifecycle
//!
//! An [`ImageHandle`] walks the imaging library through
//! create → measure → allocate → lock on load, and back down on dispose.
//! Every intermediate step is recorded as a stage; failures and disposal
//! share one teardown routine that steps down from wherever the handle is.

pub mod layout;

use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use tracing::{debug, trace, warn};

use crate::binding::{
    environment, BindingEnvironment, Binder, BitmapData, HostAllocator, ImagingApi, LockMode,
    NativeImage, PixelFormat, Rect, SystemBinder,
};
use crate::error::{LoadError, Status};
use layout::{LayoutError, PixelLayout};

/// Where a handle is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    /// Holds nothing, not even a binding reference
    Empty,
    /// Holds a binding reference only
    Bound,
    /// Holds a native image
    Created,
    /// Dimensions known
    Decoded,
    /// Pixel buffer allocated, not yet bound to the image
    Allocated,
    /// Pixels decoded into the buffer and ready to use
    Locked,
}

impl fmt::Display for ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Description of a locked pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelDescriptor {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, always `width * 4`
    pub stride: usize,
    pub pixel_format: PixelFormat,
    /// First byte of the top row
    pub scan0: NonNull<u8>,
    /// Bytes actually allocated, a multiple of 64 no smaller than `stride * height`
    pub alloc_size: usize,
}

/// Resources held at each point of the acquisition sequence
enum Stage {
    Empty,
    Bound,
    Created {
        image: NativeImage,
    },
    Decoded {
        image: NativeImage,
        layout: PixelLayout,
    },
    Allocated {
        image: NativeImage,
        layout: PixelLayout,
        block: NonNull<u8>,
    },
    Locked {
        image: NativeImage,
        layout: PixelLayout,
        block: NonNull<u8>,
        data: BitmapData,
    },
}

impl Stage {
    fn state(&self) -> ImageState {
        match self {
            Stage::Empty => ImageState::Empty,
            Stage::Bound => ImageState::Bound,
            Stage::Created { .. } => ImageState::Created,
            Stage::Decoded { .. } => ImageState::Decoded,
            Stage::Allocated { .. } => ImageState::Allocated,
            Stage::Locked { .. } => ImageState::Locked,
        }
    }
}

/// One image loaded through the imaging library
///
/// A handle starts empty. [`load`](Self::load) either leaves it fully locked
/// or, on any failure, back at empty with every partial resource released.
/// [`dispose`](Self::dispose) (also run on drop) returns it to empty and may be
/// called any number of times.
///
/// Not `Send`: the handle owns raw pointers into memory that the imaging
/// library writes to.
pub struct ImageHandle<'env, B: Binder = SystemBinder> {
    env: &'env BindingEnvironment<B>,
    path: PathBuf,
    stage: Stage,
}

impl ImageHandle<'static, SystemBinder> {
    /// Handle for `path` bound to the process-wide environment
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_environment(environment(), path)
    }
}

impl<'env, B: Binder> ImageHandle<'env, B> {
    pub fn with_environment(env: &'env BindingEnvironment<B>, path: impl Into<PathBuf>) -> Self {
        Self {
            env,
            path: path.into(),
            stage: Stage::Empty,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn state(&self) -> ImageState {
        self.stage.state()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.stage, Stage::Locked { .. })
    }

    /// Decode the image into a freshly allocated, locked pixel buffer
    ///
    /// A handle that is already loaded is disposed first.
    ///
    /// # Errors
    /// One [`LoadError`] variant per acquisition step; the handle is empty
    /// again when any of them is returned.
    pub fn load(&mut self) -> Result<PixelDescriptor, LoadError> {
        self.dispose();

        self.env.acquire()?;
        self.stage = Stage::Bound;

        match self.acquire_pixels() {
            Ok(descriptor) => {
                debug!(
                    "Loaded {} ({}x{}, {} bytes)",
                    self.path.display(),
                    descriptor.width,
                    descriptor.height,
                    descriptor.alloc_size
                );
                Ok(descriptor)
            }
            Err(err) => {
                warn!(
                    "Failed to load {} at {}: {}",
                    self.path.display(),
                    self.stage.state(),
                    err
                );
                self.unwind();
                Err(err)
            }
        }
    }

    fn acquire_pixels(&mut self) -> Result<PixelDescriptor, LoadError> {
        let image = self
            .env
            .with_session(|api| api.create_bitmap_from_file(&self.path))?
            .map_err(|status| LoadError::DecodeFailed {
                path: self.path.clone(),
                status,
            })?;
        self.stage = Stage::Created { image };

        let (width, height) = self
            .env
            .with_session(|api| {
                Ok::<_, Status>((api.image_width(image)?, api.image_height(image)?))
            })?
            .map_err(LoadError::MetadataUnavailable)?;
        let layout = PixelLayout::new(width, height).map_err(|err| match err {
            LayoutError::Empty => LoadError::MetadataUnavailable(Status::INVALID_PARAMETER),
            LayoutError::TooLarge => LoadError::OutOfMemory { width, height },
        })?;
        self.stage = Stage::Decoded { image, layout };

        let block = self
            .env
            .with_session(|api| api.alloc_zeroed(layout.alloc_size()))?
            .ok_or(LoadError::OutOfMemory { width, height })?;
        self.stage = Stage::Allocated {
            image,
            layout,
            block,
        };

        let mut data = BitmapData {
            width,
            height,
            stride: layout.stride() as i32,
            pixel_format: PixelFormat::ARGB32,
            scan0: block.as_ptr().cast(),
            reserved: 0,
        };
        let rect = Rect {
            x: 0,
            y: 0,
            width: width as i32,
            height: height as i32,
        };
        let mode = LockMode::READ | LockMode::WRITE | LockMode::USER_INPUT_BUF;
        self.env
            .with_session(|api| {
                // Safety: `block` holds `alloc_size >= stride * height` bytes
                // and is only freed after the matching unlock.
                unsafe { api.lock_bits(image, &rect, mode, PixelFormat::ARGB32, &mut data) }
            })?
            .map_err(LoadError::LockFailed)?;
        self.stage = Stage::Locked {
            image,
            layout,
            block,
            data,
        };

        Ok(PixelDescriptor {
            width,
            height,
            stride: layout.stride(),
            pixel_format: PixelFormat::ARGB32,
            scan0: block,
            alloc_size: layout.alloc_size(),
        })
    }

    /// Release everything the handle holds
    ///
    /// Never fails; teardown calls that the library rejects are logged and
    /// skipped. Disposing an empty handle does nothing.
    pub fn dispose(&mut self) {
        self.unwind();
    }

    /// Step down from the current stage to `Empty`, in reverse acquisition order
    fn unwind(&mut self) {
        loop {
            let stage = std::mem::replace(&mut self.stage, Stage::Empty);
            if !matches!(stage, Stage::Empty) {
                trace!("Unwinding {} from {}", self.path.display(), stage.state());
            }
            self.stage = match stage {
                Stage::Empty => break,
                Stage::Locked {
                    image,
                    layout,
                    block,
                    mut data,
                } => {
                    // Safety: `data` is the descriptor filled in by the lock.
                    let unlocked = self
                        .env
                        .with_session(|api| unsafe { api.unlock_bits(image, &mut data) });
                    match unlocked {
                        Ok(Ok(())) => {}
                        Ok(Err(status)) => warn!("Failed to unlock pixel buffer: {}", status),
                        Err(err) => warn!("Cannot unlock pixel buffer: {}", err),
                    }
                    Stage::Allocated {
                        image,
                        layout,
                        block,
                    }
                }
                Stage::Allocated { image, layout, block } => {
                    // Safety: the block came from this session's allocator
                    // and no lock refers to it any more.
                    if let Err(err) = self.env.with_session(|api| unsafe { api.free(block) }) {
                        warn!("Cannot free pixel buffer: {}", err);
                    }
                    Stage::Decoded { image, layout }
                }
                Stage::Decoded { image, .. } => Stage::Created { image },
                Stage::Created { image } => {
                    match self.env.with_session(|api| api.dispose_image(image)) {
                        Ok(Ok(())) => {}
                        Ok(Err(status)) => warn!("Failed to dispose image: {}", status),
                        Err(err) => warn!("Cannot dispose image: {}", err),
                    }
                    Stage::Bound
                }
                Stage::Bound => {
                    self.env.release();
                    Stage::Empty
                }
            };
        }
    }

    /// Descriptor of the locked buffer, if loaded
    #[must_use]
    pub fn descriptor(&self) -> Option<PixelDescriptor> {
        match &self.stage {
            Stage::Locked { layout, block, .. } => Some(PixelDescriptor {
                width: layout.width(),
                height: layout.height(),
                stride: layout.stride(),
                pixel_format: PixelFormat::ARGB32,
                scan0: *block,
                alloc_size: layout.alloc_size(),
            }),
            _ => None,
        }
    }

    /// Pixel bytes, `stride * height` long, rows top to bottom
    #[must_use]
    pub fn pixels(&self) -> Option<&[u8]> {
        match &self.stage {
            // Safety: the block is live and at least `len` bytes while locked.
            Stage::Locked { layout, block, .. } => {
                Some(unsafe { std::slice::from_raw_parts(block.as_ptr(), layout.len()) })
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn pixels_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.stage {
            Stage::Locked { layout, block, .. } => {
                Some(unsafe { std::slice::from_raw_parts_mut(block.as_ptr(), layout.len()) })
            }
            _ => None,
        }
    }

    /// Pixels as packed `0xAARRGGBB` words
    ///
    /// `None` when not loaded, or if the host returned a block not aligned
    /// for `u32`.
    #[must_use]
    pub fn argb(&self) -> Option<&[u32]> {
        bytemuck::try_cast_slice(self.pixels()?).ok()
    }

    /// Bytes of row `y`
    #[must_use]
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        let stride = self.descriptor()?.stride;
        let start = usize::try_from(y).ok()?.checked_mul(stride)?;
        self.pixels()?.get(start..start.checked_add(stride)?)
    }
}

impl<B: Binder> Drop for ImageHandle<'_, B> {
    fn drop(&mut self) {
        self.unwind();
    }
}

impl<B: Binder> fmt::Debug for ImageHandle<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}
