//! leanloader - load an image through the system imaging library, bound at runtime
//!
//! The crate links against nothing image related. On first use it attaches to
//! the host module, resolves a raw allocator and the GDI+ flat API by name,
//! starts the library, and decodes files straight into a caller-owned 32bpp
//! ARGB buffer padded to a multiple of 64 bytes.
//!
//! ```no_run
//! use leanloader::ImageHandle;
//!
//! let mut image = ImageHandle::new("photo.png");
//! let pixels = image.load()?;
//! println!("{}x{}, {} bytes per row", pixels.width, pixels.height, pixels.stride);
//! image.dispose();
//! # Ok::<(), leanloader::LoadError>(())
//! ```
//!
//! # Modules
//!
//! - [`binding`]: runtime symbol resolution and the reference-counted environment
//! - [`image`]: the per-image acquire/release state machine
//! - [`config`]: library names and logging defaults
//! - [`error`]: binding and load errors
//!
//! # Threads
//!
//! The shared environment is internally locked, so handles on different
//! threads can load and dispose concurrently. A single handle is neither
//! `Send` nor `Sync`.

pub mod binding;
pub mod config;
pub mod error;
pub mod image;

pub use binding::{environment, Binder, BindingEnvironment, HostAllocator, ImagingApi, SystemBinder};
pub use error::{BindingError, ErrorKind, LoadError, Status};
pub use image::{ImageHandle, ImageState, PixelDescriptor};
