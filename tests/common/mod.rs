//! Call-counting stand-in for the imaging library and host allocator
//!
//! Every entry point bumps a counter in a shared [`Ledger`], live images and
//! blocks are tracked so leaks and double releases show up, and any step can
//! be made to fail with [`Ledger::inject`].

#![allow(dead_code)]

use std::alloc::{self, Layout};
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use leanloader::binding::{
    BitmapData, LockMode, NativeImage, PixelFormat, Rect, StartupInput, StartupToken,
};
use leanloader::{Binder, BindingEnvironment, BindingError, HostAllocator, ImagingApi, Status};

const STUB_TOKEN: StartupToken = StartupToken(0x00C0_FFEE);
const LOCK_COOKIE: usize = 0x10CC;
const BLOCK_ALIGN: usize = 64;

/// Step at which the stub can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Bind,
    Startup,
    Create,
    Width,
    Height,
    Alloc,
    Lock,
    Unlock,
    Dispose,
}

#[derive(Debug, Default)]
pub struct Counter(AtomicUsize);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct Ledger {
    pub binds: Counter,
    pub unbinds: Counter,
    pub startups: Counter,
    pub shutdowns: Counter,
    pub creates: Counter,
    pub image_disposals: Counter,
    pub allocations: Counter,
    pub frees: Counter,
    pub locks: Counter,
    pub unlocks: Counter,
    /// Calls with a handle or block the stub never issued or already released
    pub invalid_calls: Counter,

    next_image: AtomicUsize,
    faults: Mutex<HashSet<Fault>>,
    files: Mutex<HashMap<PathBuf, (u32, u32)>>,
    live_images: Mutex<HashMap<usize, (u32, u32)>>,
    locked_images: Mutex<HashSet<usize>>,
    live_blocks: Mutex<HashMap<usize, usize>>,
    requested_sizes: Mutex<Vec<usize>>,
}

impl Ledger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `path` decodable as a `width` x `height` image
    pub fn add_image(&self, path: impl Into<PathBuf>, width: u32, height: u32) {
        self.files.lock().unwrap().insert(path.into(), (width, height));
    }

    pub fn inject(&self, fault: Fault) {
        self.faults.lock().unwrap().insert(fault);
    }

    pub fn clear(&self, fault: Fault) {
        self.faults.lock().unwrap().remove(&fault);
    }

    fn fails(&self, fault: Fault) -> bool {
        self.faults.lock().unwrap().contains(&fault)
    }

    pub fn live_images(&self) -> usize {
        self.live_images.lock().unwrap().len()
    }

    pub fn live_blocks(&self) -> usize {
        self.live_blocks.lock().unwrap().len()
    }

    pub fn locked_images(&self) -> usize {
        self.locked_images.lock().unwrap().len()
    }

    /// Sizes passed to the allocator, including requests it refused
    pub fn requested_sizes(&self) -> Vec<usize> {
        self.requested_sizes.lock().unwrap().clone()
    }

    pub fn last_requested_size(&self) -> Option<usize> {
        self.requested_sizes.lock().unwrap().last().copied()
    }

    /// Nothing issued by the stub is still outstanding
    pub fn assert_no_leaks(&self) {
        assert_eq!(self.live_images(), 0, "leaked native images");
        assert_eq!(self.live_blocks(), 0, "leaked pixel buffers");
        assert_eq!(self.locked_images(), 0, "images left locked");
        assert_eq!(self.invalid_calls.get(), 0, "invalid or repeated teardown calls");
    }
}

pub struct StubBinder {
    ledger: Arc<Ledger>,
}

pub struct StubSession {
    ledger: Arc<Ledger>,
}

/// Fresh environment backed by `ledger`
pub fn stub_environment(ledger: &Arc<Ledger>) -> BindingEnvironment<StubBinder> {
    BindingEnvironment::new(StubBinder {
        ledger: Arc::clone(ledger),
    })
}

impl Binder for StubBinder {
    type Session = StubSession;

    fn bind(&mut self) -> Result<StubSession, BindingError> {
        self.ledger.binds.bump();
        if self.ledger.fails(Fault::Bind) {
            return Err(BindingError::ModuleNotFound {
                module: "stub-imaging".to_string(),
                reason: "injected".to_string(),
            });
        }
        Ok(StubSession {
            ledger: Arc::clone(&self.ledger),
        })
    }
}

impl Drop for StubSession {
    fn drop(&mut self) {
        self.ledger.unbinds.bump();
    }
}

impl StubSession {
    fn dimensions(&self, image: NativeImage) -> Option<(u32, u32)> {
        self.ledger
            .live_images
            .lock()
            .unwrap()
            .get(&(image.as_ptr() as usize))
            .copied()
    }
}

impl ImagingApi for StubSession {
    fn startup(&self, input: &StartupInput) -> Result<StartupToken, Status> {
        self.ledger.startups.bump();
        if input.version != 1 || !input.debug_event_callback.is_null() {
            self.ledger.invalid_calls.bump();
        }
        if self.ledger.fails(Fault::Startup) {
            return Err(Status::GENERIC_ERROR);
        }
        Ok(STUB_TOKEN)
    }

    fn shutdown(&self, token: StartupToken) {
        self.ledger.shutdowns.bump();
        if token != STUB_TOKEN {
            self.ledger.invalid_calls.bump();
        }
    }

    fn create_bitmap_from_file(&self, path: &Path) -> Result<NativeImage, Status> {
        self.ledger.creates.bump();
        if self.ledger.fails(Fault::Create) {
            return Err(Status::UNKNOWN_IMAGE_FORMAT);
        }
        let dims = *self
            .ledger
            .files
            .lock()
            .unwrap()
            .get(path)
            .ok_or(Status::FILE_NOT_FOUND)?;

        let id = self.ledger.next_image.fetch_add(1, Ordering::SeqCst) + 1;
        self.ledger.live_images.lock().unwrap().insert(id, dims);
        let raw = NonNull::new(id as *mut c_void).ok_or(Status::GENERIC_ERROR)?;
        Ok(unsafe { NativeImage::from_raw(raw) })
    }

    fn dispose_image(&self, image: NativeImage) -> Result<(), Status> {
        self.ledger.image_disposals.bump();
        let id = image.as_ptr() as usize;
        if self.ledger.locked_images.lock().unwrap().contains(&id) {
            self.ledger.invalid_calls.bump();
        }
        if self.ledger.live_images.lock().unwrap().remove(&id).is_none() {
            self.ledger.invalid_calls.bump();
            return Err(Status::INVALID_PARAMETER);
        }
        if self.ledger.fails(Fault::Dispose) {
            return Err(Status::GENERIC_ERROR);
        }
        Ok(())
    }

    fn image_width(&self, image: NativeImage) -> Result<u32, Status> {
        if self.ledger.fails(Fault::Width) {
            return Err(Status::GENERIC_ERROR);
        }
        self.dimensions(image)
            .map(|(width, _)| width)
            .ok_or(Status::INVALID_PARAMETER)
    }

    fn image_height(&self, image: NativeImage) -> Result<u32, Status> {
        if self.ledger.fails(Fault::Height) {
            return Err(Status::GENERIC_ERROR);
        }
        self.dimensions(image)
            .map(|(_, height)| height)
            .ok_or(Status::INVALID_PARAMETER)
    }

    unsafe fn lock_bits(
        &self,
        image: NativeImage,
        rect: &Rect,
        mode: LockMode,
        format: PixelFormat,
        data: &mut BitmapData,
    ) -> Result<(), Status> {
        self.ledger.locks.bump();
        if self.ledger.fails(Fault::Lock) {
            return Err(Status::WRONG_STATE);
        }

        let Some((width, height)) = self.dimensions(image) else {
            self.ledger.invalid_calls.bump();
            return Err(Status::INVALID_PARAMETER);
        };
        let expected_mode = LockMode::READ | LockMode::WRITE | LockMode::USER_INPUT_BUF;
        let block_size = self
            .ledger
            .live_blocks
            .lock()
            .unwrap()
            .get(&(data.scan0 as usize))
            .copied();
        let needed = data.stride as usize * height as usize;
        let valid = mode == expected_mode
            && format == PixelFormat::ARGB32
            && data.pixel_format == PixelFormat::ARGB32
            && *rect
                == (Rect {
                    x: 0,
                    y: 0,
                    width: width as i32,
                    height: height as i32,
                })
            && data.stride == width as i32 * 4
            && block_size.is_some_and(|size| size >= needed);
        if !valid {
            self.ledger.invalid_calls.bump();
            return Err(Status::INVALID_PARAMETER);
        }

        // "Decode": opaque pixels numbered in raster order
        let pixels = data.scan0.cast::<u32>();
        for i in 0..(width as usize * height as usize) {
            pixels.add(i).write_unaligned(0xFF00_0000 | i as u32);
        }
        data.reserved = LOCK_COOKIE;
        self.ledger
            .locked_images
            .lock()
            .unwrap()
            .insert(image.as_ptr() as usize);
        Ok(())
    }

    unsafe fn unlock_bits(&self, image: NativeImage, data: &mut BitmapData) -> Result<(), Status> {
        self.ledger.unlocks.bump();
        let was_locked = self
            .ledger
            .locked_images
            .lock()
            .unwrap()
            .remove(&(image.as_ptr() as usize));
        if !was_locked || data.reserved != LOCK_COOKIE {
            self.ledger.invalid_calls.bump();
            return Err(Status::WRONG_STATE);
        }
        if self.ledger.fails(Fault::Unlock) {
            return Err(Status::GENERIC_ERROR);
        }
        Ok(())
    }
}

impl HostAllocator for StubSession {
    fn alloc_zeroed(&self, size: usize) -> Option<NonNull<u8>> {
        self.ledger.allocations.bump();
        self.ledger.requested_sizes.lock().unwrap().push(size);
        if self.ledger.fails(Fault::Alloc) || size == 0 {
            return None;
        }
        let layout = Layout::from_size_align(size, BLOCK_ALIGN).ok()?;
        let block = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })?;
        self.ledger
            .live_blocks
            .lock()
            .unwrap()
            .insert(block.as_ptr() as usize, size);
        Some(block)
    }

    unsafe fn free(&self, block: NonNull<u8>) {
        self.ledger.frees.bump();
        let size = self
            .ledger
            .live_blocks
            .lock()
            .unwrap()
            .remove(&(block.as_ptr() as usize));
        match size {
            Some(size) => alloc::dealloc(block.as_ptr(), Layout::from_size_align_unchecked(size, BLOCK_ALIGN)),
            None => self.ledger.invalid_calls.bump(),
        }
    }
}
