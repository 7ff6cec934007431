use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use super::ffi::StartupInput;
use super::{Binder, ImagingApi, StartupToken, SystemBinder};
use crate::error::BindingError;

static ENVIRONMENT: Lazy<BindingEnvironment<SystemBinder>> =
    Lazy::new(|| BindingEnvironment::new(SystemBinder::default()));

/// The process-wide binding to the system imaging library
#[must_use]
pub fn environment() -> &'static BindingEnvironment<SystemBinder> {
    &ENVIRONMENT
}

/// Reference-counted session with an imaging library
///
/// The first [`acquire`](Self::acquire) resolves and starts the library; the
/// last matching [`release`](Self::release) shuts it down and unloads it.
/// State is kept behind a mutex, so acquire and release may race freely.
pub struct BindingEnvironment<B: Binder> {
    state: Mutex<EnvironmentState<B>>,
}

struct EnvironmentState<B: Binder> {
    binder: B,
    active: Option<ActiveSession<B::Session>>,
}

/// Exists only while at least one reference is held
struct ActiveSession<S> {
    session: S,
    token: StartupToken,
    references: u32,
}

impl<B: Binder> BindingEnvironment<B> {
    pub fn new(binder: B) -> Self {
        Self {
            state: Mutex::new(EnvironmentState {
                binder,
                active: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EnvironmentState<B>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a reference, binding and starting the library on the first one
    ///
    /// # Errors
    /// Any resolution or startup failure; the count stays at zero and nothing
    /// remains loaded.
    pub fn acquire(&self) -> Result<u32, BindingError> {
        let mut state = self.lock();

        if let Some(active) = state.active.as_mut() {
            active.references += 1;
            debug!("Imaging library reference acquired ({})", active.references);
            return Ok(active.references);
        }

        let session = state.binder.bind()?;
        let token = match session.startup(&StartupInput::default()) {
            Ok(token) => token,
            Err(status) => {
                warn!("Imaging library startup failed: {}", status);
                drop(session);
                return Err(BindingError::StartupFailed(status));
            }
        };

        info!("Imaging library started");
        state.active = Some(ActiveSession {
            session,
            token,
            references: 1,
        });
        Ok(1)
    }

    /// Drop a reference, shutting the library down when it was the last
    ///
    /// Releasing with no references held does nothing.
    pub fn release(&self) -> u32 {
        let mut state = self.lock();

        let Some(active) = state.active.as_mut() else {
            debug!("Release with no active references ignored");
            return 0;
        };

        active.references -= 1;
        let remaining = active.references;
        debug!("Imaging library reference released ({})", remaining);

        if remaining == 0 {
            if let Some(active) = state.active.take() {
                active.session.shutdown(active.token);
                drop(active.session);
                info!("Imaging library shut down");
            }
        }
        remaining
    }

    #[must_use]
    pub fn reference_count(&self) -> u32 {
        self.lock().active.as_ref().map_or(0, |active| active.references)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().active.is_some()
    }

    /// Run `f` against the live entry points
    ///
    /// The environment stays locked for the duration of `f`, so `f` must not
    /// call back into [`acquire`](Self::acquire) or [`release`](Self::release).
    ///
    /// # Errors
    /// `NotAcquired` when no reference is held
    pub fn with_session<R>(&self, f: impl FnOnce(&B::Session) -> R) -> Result<R, BindingError> {
        let state = self.lock();
        let active = state.active.as_ref().ok_or(BindingError::NotAcquired)?;
        Ok(f(&active.session))
    }

    /// Replace the binder used by the next initialisation
    ///
    /// # Errors
    /// `Busy` while any reference is held
    pub fn configure(&self, binder: B) -> Result<(), BindingError> {
        let mut state = self.lock();
        if let Some(active) = state.active.as_ref() {
            return Err(BindingError::Busy(active.references));
        }
        state.binder = binder;
        Ok(())
    }

    /// Inspect the current binder
    pub fn with_binder<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        f(&self.lock().binder)
    }
}

impl<B: Binder + Default> Default for BindingEnvironment<B> {
    fn default() -> Self {
        Self::new(B::default())
    }
}
