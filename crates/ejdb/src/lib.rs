//! # ejdb
//!
//! Safe binding for the EJDB 1.x embedded document store.
//!
//! This crate provides:
//! - [`Ejdb`], an owned database handle, closed exactly once
//! - [`EjColl`], a collection handle borrowing its database
//! - [`EjQuery`], a query object released on drop
//! - Document marshaling between JSON text, BSON bytes and [`bson::Document`]
//! - Structured errors carrying the engine's own codes and messages
//!
//! The native library is resolved at runtime. Set `EJDB_LIBRARY_PATH` to
//! point at a specific `libejdb`, or pass an explicit table with
//! [`Ejdb::open_with_api`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use ejdb::{Ejdb, IndexFlags, OpenMode};
//!
//! let db = Ejdb::open("zoo", OpenMode::WRITER | OpenMode::CREATE)?;
//! let parrots = db.create_coll("parrots", None)?;
//! parrots.save_json(r#"{"name": "Grenny", "type": "African Grey", "age": 1}"#)?;
//! parrots.set_index("name", IndexFlags::STR)?;
//!
//! let greys = parrots.count(r#"{"type": {"$begin": "African"}}"#, &[])?;
//! assert_eq!(greys, 1);
//! db.close()?;
//! ```

#![warn(missing_docs)]

mod collection;
mod config;
mod database;
mod error;
mod flags;
pub mod marshal;
mod query;

pub use collection::EjColl;
pub use config::{CollOptions, Config};
pub use database::{native_api, Ejdb};
pub use error::{EjdbError, EjdbResult};
pub use flags::{IndexFlags, OpenMode, QueryFlags};
pub use marshal::{bson_to_document, bson_to_json, oid_from_str, oid_to_string, Doc};
pub use query::{EjQuery, QueryHints, SortOrder};

pub use bson;
pub use ejdb_sys;
