//! Error types for binding and image loading
//!
//! Library code reports failures through the two enums here; the binary and
//! the configuration loader wrap them with `anyhow` context.

use std::fmt;
use std::path::PathBuf;

/// Status code returned by every imaging library entry point (`0` is success)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub u32);

impl Status {
    pub const OK: Self = Self(0);
    pub const GENERIC_ERROR: Self = Self(1);
    pub const INVALID_PARAMETER: Self = Self(2);
    pub const OUT_OF_MEMORY: Self = Self(3);
    pub const WRONG_STATE: Self = Self(8);
    pub const FILE_NOT_FOUND: Self = Self(10);
    pub const VALUE_OVERFLOW: Self = Self(11);
    pub const UNKNOWN_IMAGE_FORMAT: Self = Self(13);
    pub const NOT_INITIALIZED: Self = Self(18);

    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    /// Convert into a `Result`, treating anything but `OK` as an error
    ///
    /// # Errors
    /// Returns `Err(self)` for every non-zero status
    pub fn ok(self) -> Result<(), Status> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Symbolic name of the status, if it is one the imaging library defines
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0 => "Ok",
            1 => "GenericError",
            2 => "InvalidParameter",
            3 => "OutOfMemory",
            4 => "ObjectBusy",
            5 => "InsufficientBuffer",
            6 => "NotImplemented",
            7 => "Win32Error",
            8 => "WrongState",
            9 => "Aborted",
            10 => "FileNotFound",
            11 => "ValueOverflow",
            12 => "AccessDenied",
            13 => "UnknownImageFormat",
            14 => "FontFamilyNotFound",
            15 => "FontStyleNotFound",
            16 => "NotTrueTypeFont",
            17 => "UnsupportedGdiplusVersion",
            18 => "GdiplusNotInitialized",
            19 => "PropertyNotFound",
            20 => "PropertyNotSupported",
            21 => "ProfileNotFound",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "status {}", self.0),
        }
    }
}

/// Failure to establish or use the dynamic binding
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("failed to open module `{module}`: {reason}")]
    ModuleNotFound { module: String, reason: String },

    #[error("module `{module}` does not export `{symbol}`: {reason}")]
    SymbolNotFound {
        module: String,
        symbol: String,
        reason: String,
    },

    #[error("imaging library startup rejected: {0}")]
    StartupFailed(Status),

    #[error("imaging library is not bound (no active references)")]
    NotAcquired,

    #[error("binding environment is in use ({0} active references)")]
    Busy(u32),
}

impl BindingError {
    pub(crate) fn module(module: &str, err: impl fmt::Display) -> Self {
        Self::ModuleNotFound {
            module: module.to_owned(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn symbol(module: &str, symbol: &str, err: impl fmt::Display) -> Self {
        Self::SymbolNotFound {
            module: module.to_owned(),
            symbol: symbol.to_owned(),
            reason: err.to_string(),
        }
    }
}

/// Failure of [`ImageHandle::load`](crate::ImageHandle::load)
///
/// Whatever the variant, the handle has already been unwound to its empty
/// state when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("imaging library unavailable: {0}")]
    BindingUnavailable(#[from] BindingError),

    #[error("failed to decode `{}`: {status}", path.display())]
    DecodeFailed { path: PathBuf, status: Status },

    #[error("image dimensions unavailable: {0}")]
    MetadataUnavailable(Status),

    #[error("host allocator could not provide a {width}x{height} pixel buffer")]
    OutOfMemory { width: u32, height: u32 },

    #[error("failed to lock pixel buffer: {0}")]
    LockFailed(Status),
}

/// Coarse classification of a [`LoadError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BindingUnavailable,
    DecodeFailed,
    MetadataUnavailable,
    OutOfMemory,
    LockFailed,
}

impl LoadError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BindingUnavailable(_) => ErrorKind::BindingUnavailable,
            Self::DecodeFailed { .. } => ErrorKind::DecodeFailed,
            Self::MetadataUnavailable(_) => ErrorKind::MetadataUnavailable,
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::LockFailed(_) => ErrorKind::LockFailed,
        }
    }
}
