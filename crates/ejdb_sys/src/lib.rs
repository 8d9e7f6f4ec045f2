//! # ejdb_sys
//!
//! Raw C ABI surface of the EJDB 1.x embedded document store.
//!
//! This crate provides:
//! - Opaque handle types (`EJDB`, `EJCOLL`, `EJQ`, `bson`)
//! - C-compatible value types (`bson_oid_t`, `EJCOLLOPTS`)
//! - Open mode, index, query and error code constants
//! - [`EjdbApi`], a table of native entry points resolved from `libejdb`
//!   at runtime, or supplied directly from function pointers
//!
//! Nothing here is safe to call directly. The `ejdb` crate wraps it.

#![warn(missing_docs)]
#![allow(non_camel_case_types)]

mod api;
mod consts;
mod error;
mod types;

pub use api::{ApiSource, EjdbApi, EjdbFns, LIBRARY_PATH_ENV};
pub use consts::*;
pub use error::LoadError;
pub use types::*;
