//! Shared helpers for integration tests.

#![allow(dead_code)]

use ejdb::bson::{Bson, Document};
use ejdb::{Ejdb, OpenMode};
use ejdb_testkit::{fake_api, init_tracing, TestDir};

/// Opens a writable database in `dir` on top of the in-process engine.
pub fn open(dir: &TestDir) -> Ejdb {
    open_with_mode(dir, OpenMode::default())
}

/// Opens the database in `dir` with an explicit mode.
pub fn open_with_mode(dir: &TestDir, mode: OpenMode) -> Ejdb {
    init_tracing();
    Ejdb::open_with_api(fake_api(), dir.db_path(), mode).unwrap()
}

/// Decodes a record returned by the binding.
pub fn decode(bytes: &[u8]) -> Document {
    ejdb::bson_to_document(bytes).unwrap()
}

/// Decodes every record and returns the string values of `field`.
pub fn strings(records: &[Vec<u8>], field: &str) -> Vec<String> {
    records
        .iter()
        .map(|r| decode(r).get_str(field).unwrap().to_owned())
        .collect()
}

/// Reads an integer field regardless of its stored width.
pub fn int(doc: &Document, field: &str) -> i64 {
    match doc.get(field) {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        other => panic!("{field} is not an integer: {other:?}"),
    }
}
