//! Errors raised while resolving the native library.

use thiserror::Error;

/// Failure to load `libejdb` or one of its entry points.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The shared library could not be opened.
    #[error("failed to open native library {path}: {source}")]
    Library {
        /// Path or name that was tried.
        path: String,
        /// Underlying loader error.
        #[source]
        source: libloading::Error,
    },

    /// A required symbol is missing from the library.
    #[error("native library is missing symbol `{name}`: {source}")]
    Symbol {
        /// Symbol name.
        name: &'static str,
        /// Underlying loader error.
        #[source]
        source: libloading::Error,
    },
}

impl LoadError {
    /// Returns the library path or symbol name the error refers to.
    pub fn subject(&self) -> &str {
        match self {
            Self::Library { path, .. } => path,
            Self::Symbol { name, .. } => name,
        }
    }
}
