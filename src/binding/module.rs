use libloading::{Library, Symbol};
use tracing::debug;

use crate::error::BindingError;

/// A module mapped into the process, addressed by name
pub struct Module {
    name: String,
    library: Library,
}

impl Module {
    /// Attach to a module that the host has already mapped
    ///
    /// With no name this is the host loader module itself: `kernel32.dll` on
    /// Windows, the process image elsewhere.
    ///
    /// # Errors
    /// Returns `ModuleNotFound` if the module is not mapped
    pub fn attach(name: Option<&str>) -> Result<Self, BindingError> {
        #[cfg(windows)]
        {
            let name = name.unwrap_or(super::host::DEFAULT_HOST_MODULE);
            let library = libloading::os::windows::Library::open_already_loaded(name)
                .map_err(|e| BindingError::module(name, e))?;
            debug!("Attached to host module {}", name);
            Ok(Self {
                name: name.to_owned(),
                library: library.into(),
            })
        }

        #[cfg(unix)]
        {
            match name {
                Some(name) => Self::load(name),
                None => {
                    debug!("Attached to the process image");
                    Ok(Self {
                        name: "<process>".to_owned(),
                        library: libloading::os::unix::Library::this().into(),
                    })
                }
            }
        }

        #[cfg(not(any(windows, unix)))]
        {
            Err(BindingError::module(
                name.unwrap_or("<host>"),
                "no module loader on this platform",
            ))
        }
    }

    /// Load a module by name, following the host's search path convention
    ///
    /// # Errors
    /// Returns `ModuleNotFound` if the loader cannot find or map the module
    pub fn load(name: &str) -> Result<Self, BindingError> {
        // Safety: running the module's initialisers is the point of loading
        // it; the modules we load are system libraries.
        let library = unsafe { Library::new(name) }.map_err(|e| BindingError::module(name, e))?;
        debug!("Loaded module {}", name);
        Ok(Self {
            name: name.to_owned(),
            library,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve an exported entry point and copy out its address
    ///
    /// # Safety
    /// `T` must match the real signature of `symbol`, and the returned value
    /// must not be used after this module is dropped.
    ///
    /// # Errors
    /// Returns `SymbolNotFound` if the module does not export `symbol`
    pub unsafe fn entry<T: Copy>(&self, symbol: &str) -> Result<T, BindingError> {
        let resolved: Symbol<T> = self
            .library
            .get(symbol.as_bytes())
            .map_err(|e| BindingError::symbol(&self.name, symbol, e))?;
        Ok(*resolved)
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        debug!("Releasing module {}", self.name);
    }
}
