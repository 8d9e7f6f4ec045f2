//! Error types for the EJDB binding.

use std::ffi::NulError;
use thiserror::Error;

/// Result type for binding operations.
pub type EjdbResult<T> = Result<T, EjdbError>;

/// Errors surfaced by the binding.
///
/// Everything the engine itself rejects (malformed queries, reserved
/// characters in field names, I/O failures) arrives as [`EjdbError::Native`]
/// carrying the engine's own code and message. The remaining variants are
/// raised on the Rust side before a native call is made.
#[derive(Debug, Error)]
pub enum EjdbError {
    /// Error reported by the native engine's last-error state.
    #[error("ejdb error {code}: {message}")]
    Native {
        /// Native error code (`ejdbecode`).
        code: i32,
        /// Native error message (`ejdberrmsg`).
        message: String,
    },

    /// The native library or one of its symbols could not be resolved.
    #[error("cannot load native library ({subject}): {message}")]
    LibraryLoad {
        /// Library path or symbol name.
        subject: String,
        /// Loader message.
        message: String,
    },

    /// A document could not be marshaled to or from BSON.
    #[error("invalid document: {message}")]
    InvalidDocument {
        /// Description of the problem.
        message: String,
    },

    /// A string is not a valid object identifier.
    #[error("invalid object id: {value:?}")]
    InvalidOid {
        /// The rejected string.
        value: String,
    },

    /// A path or name contains an interior NUL byte.
    #[error("string contains an interior NUL byte: {0}")]
    Nul(#[from] NulError),

    /// A native constructor returned NULL without reporting an error code.
    #[error("native allocation failed: {what}")]
    Allocation {
        /// What was being allocated.
        what: &'static str,
    },

    /// A collection and a query from different database handles were mixed.
    #[error("collection and query belong to different database handles")]
    ForeignHandle,
}

impl EjdbError {
    /// Creates a native error.
    pub fn native(code: i32, message: impl Into<String>) -> Self {
        Self::Native {
            code,
            message: message.into(),
        }
    }

    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates an invalid OID error.
    pub fn invalid_oid(value: impl Into<String>) -> Self {
        Self::InvalidOid {
            value: value.into(),
        }
    }

    /// Returns the native error code, if this error came from the engine.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Native { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this error was reported by the native engine.
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native { .. })
    }
}

impl From<ejdb_sys::LoadError> for EjdbError {
    fn from(err: ejdb_sys::LoadError) -> Self {
        Self::LibraryLoad {
            subject: err.subject().to_owned(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn native_error_display() {
        let err = EjdbError::native(9001, "Invalid bson object");
        assert_eq!(err.to_string(), "ejdb error 9001: Invalid bson object");
        assert_eq!(err.code(), Some(9001));
        assert!(err.is_native());
    }

    #[test]
    fn non_native_errors_have_no_code() {
        let err = EjdbError::invalid_oid("xyz");
        assert_eq!(err.code(), None);
        assert!(!err.is_native());
        assert_eq!(err.to_string(), "invalid object id: \"xyz\"");
    }

    #[test]
    fn nul_error_converts() {
        let nul = CString::new("a\0b").unwrap_err();
        let err: EjdbError = nul.into();
        assert!(matches!(err, EjdbError::Nul(_)));
    }
}
