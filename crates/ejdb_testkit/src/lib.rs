//! # EJDB Testkit
//!
//! Test utilities for the EJDB binding.
//!
//! This crate provides:
//! - An in-process engine exporting the `libejdb` C entry points, with
//!   per-thread counters of live native handles
//! - Temporary database directories
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ejdb::{Ejdb, OpenMode};
//! use ejdb_testkit::prelude::*;
//!
//! #[test]
//! fn saves_a_record() {
//!     let dir = TestDir::new();
//!     let db = Ejdb::open_with_api(fake_api(), dir.db_path(), OpenMode::default()).unwrap();
//!     let coll = db.create_coll("things", None).unwrap();
//!     coll.save_json(r#"{"a": 1}"#).unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod fake;
pub mod fixtures;
pub mod generators;

use ejdb_sys::EjdbApi;
use std::sync::{Arc, OnceLock};
use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fake::leaks;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::{fake_api, init_tracing};
}

pub use fixtures::*;
pub use generators::*;

/// Returns a shared entry point table backed by the in-process engine.
pub fn fake_api() -> Arc<EjdbApi> {
    static API: OnceLock<Arc<EjdbApi>> = OnceLock::new();
    Arc::clone(API.get_or_init(|| Arc::new(EjdbApi::from_fns(fake::fns()))))
}

/// Installs a test-friendly tracing subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use ejdb_sys::ApiSource;

    #[test]
    fn fake_api_is_static() {
        assert_eq!(fake_api().source(), &ApiSource::Static);
        assert!(Arc::ptr_eq(&fake_api(), &fake_api()));
    }
}
