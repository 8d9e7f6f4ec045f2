//! Document and OID marshaling across the native boundary.
//!
//! Every API that accepts a document takes `impl Into<Doc>`, so JSON text,
//! raw BSON bytes and `bson::Document` values are interchangeable. Buffers
//! owned by the engine are deep-copied into `Vec<u8>` before the native
//! object is released.

use crate::error::{EjdbError, EjdbResult};
use bson::oid::ObjectId;
use bson::{Bson, Document, RawDocument};
use ejdb_sys::{bson as native_bson, bson_oid_t, EjdbApi};
use std::borrow::Cow;
use std::ffi::c_int;
use std::ptr::NonNull;

/// Name of the primary key field.
pub const ID_FIELD: &str = "_id";

/// A document in any of the accepted host representations.
#[derive(Debug, Clone, Copy)]
pub enum Doc<'a> {
    /// JSON text. Must be an object.
    Json(&'a str),
    /// A serialized BSON document.
    Bson(&'a [u8]),
    /// A decoded BSON document.
    Document(&'a Document),
}

impl<'a> Doc<'a> {
    /// Serializes the document into BSON bytes.
    ///
    /// Raw BSON input is validated and borrowed; the other forms are encoded.
    pub fn to_bson(self) -> EjdbResult<Cow<'a, [u8]>> {
        match self {
            Doc::Json(text) => {
                let doc = json_to_document(text)?;
                encode_document(&doc).map(Cow::Owned)
            }
            Doc::Bson(bytes) => {
                RawDocument::from_bytes(bytes)
                    .map_err(|e| EjdbError::invalid_document(e.to_string()))?;
                Ok(Cow::Borrowed(bytes))
            }
            Doc::Document(doc) => encode_document(doc).map(Cow::Owned),
        }
    }
}

impl<'a> From<&'a str> for Doc<'a> {
    fn from(text: &'a str) -> Self {
        Doc::Json(text)
    }
}

impl<'a> From<&'a String> for Doc<'a> {
    fn from(text: &'a String) -> Self {
        Doc::Json(text)
    }
}

impl<'a> From<&'a [u8]> for Doc<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Doc::Bson(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for Doc<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Doc::Bson(bytes)
    }
}

impl<'a> From<&'a Document> for Doc<'a> {
    fn from(doc: &'a Document) -> Self {
        Doc::Document(doc)
    }
}

/// Parses JSON text into a BSON document.
///
/// Extended JSON forms such as `{"$oid": "..."}` are honored, and a
/// top-level `_id` holding a 24-character hex string becomes an ObjectId.
/// Wrapper keys like `$date` or `$numberLong` are consumed here and turned
/// into typed values, so they never reach the engine's reserved field name
/// check. Any other `$` key is passed through and rejected by the engine.
pub fn json_to_document(text: &str) -> EjdbResult<Document> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| EjdbError::invalid_document(format!("malformed JSON: {e}")))?;
    if !value.is_object() {
        return Err(EjdbError::invalid_document("JSON document must be an object"));
    }

    let mut doc = match Bson::try_from(value) {
        Ok(Bson::Document(doc)) => doc,
        Ok(other) => {
            return Err(EjdbError::invalid_document(format!(
                "expected a document, got {:?}",
                other.element_type()
            )))
        }
        Err(e) => return Err(EjdbError::invalid_document(e.to_string())),
    };

    let promoted = match doc.get(ID_FIELD) {
        Some(Bson::String(id)) => ObjectId::parse_str(id).ok(),
        _ => None,
    };
    if let Some(oid) = promoted {
        doc.insert(ID_FIELD, oid);
    }
    Ok(doc)
}

/// Encodes a document into BSON bytes.
pub fn encode_document(doc: &Document) -> EjdbResult<Vec<u8>> {
    let mut buf = Vec::new();
    doc.to_writer(&mut buf)
        .map_err(|e| EjdbError::invalid_document(e.to_string()))?;
    Ok(buf)
}

/// Decodes BSON bytes into a document.
pub fn bson_to_document(bytes: &[u8]) -> EjdbResult<Document> {
    let mut reader = bytes;
    Document::from_reader(&mut reader).map_err(|e| EjdbError::invalid_document(e.to_string()))
}

/// Decodes BSON bytes into relaxed extended JSON.
pub fn bson_to_json(bytes: &[u8]) -> EjdbResult<serde_json::Value> {
    bson_to_document(bytes).map(|doc| Bson::Document(doc).into_relaxed_extjson())
}

/// Formats an OID as its 24-character lowercase hex string.
pub fn oid_to_string(oid: &bson_oid_t) -> String {
    ObjectId::from_bytes(oid.bytes).to_hex()
}

/// Parses a 24-character hex string into an OID.
pub fn oid_from_str(value: &str) -> EjdbResult<bson_oid_t> {
    ObjectId::parse_str(value)
        .map(|oid| bson_oid_t::from_bytes(oid.bytes()))
        .map_err(|_| EjdbError::invalid_oid(value))
}

/// Copies a native buffer into host memory.
///
/// # Safety
///
/// `data` must be null or valid for reads of `size` bytes.
pub(crate) unsafe fn copy_native_buffer(data: *const u8, size: c_int) -> Vec<u8> {
    if data.is_null() || size <= 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(data, size as usize).to_vec()
}

/// Owner of a native `bson*`, released with `bson_del` on drop.
pub(crate) struct NativeBson<'api> {
    api: &'api EjdbApi,
    ptr: NonNull<native_bson>,
}

impl<'api> NativeBson<'api> {
    /// Creates a native BSON object holding a copy of `bytes`.
    pub(crate) fn from_bytes(api: &'api EjdbApi, bytes: &[u8]) -> EjdbResult<Self> {
        let len = c_int::try_from(bytes.len())
            .map_err(|_| EjdbError::invalid_document("document exceeds the native size limit"))?;
        // Safety: the buffer is valid for `len` bytes and is copied by the callee.
        let raw = unsafe { (api.bson_create_from_buffer)(bytes.as_ptr().cast(), len) };
        NonNull::new(raw)
            .map(|ptr| Self { api, ptr })
            .ok_or(EjdbError::Allocation { what: "bson" })
    }

    /// Takes ownership of a `bson*` returned by the engine.
    ///
    /// # Safety
    ///
    /// `raw` must be null or a live `bson*` that nobody else will release.
    pub(crate) unsafe fn from_raw(api: &'api EjdbApi, raw: *mut native_bson) -> Option<Self> {
        NonNull::new(raw).map(|ptr| Self { api, ptr })
    }

    pub(crate) fn as_ptr(&self) -> *mut native_bson {
        self.ptr.as_ptr()
    }

    /// Copies the serialized document out of native memory.
    pub(crate) fn to_vec(&self) -> Vec<u8> {
        // Safety: ptr is a live bson object; data/size describe its buffer.
        unsafe {
            let data = (self.api.bson_data)(self.ptr.as_ptr());
            let size = (self.api.bson_size)(self.ptr.as_ptr());
            copy_native_buffer(data.cast(), size)
        }
    }
}

impl Drop for NativeBson<'_> {
    fn drop(&mut self) {
        // Safety: we own the object and release it exactly once.
        unsafe { (self.api.bson_del)(self.ptr.as_ptr()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn json_becomes_bson() {
        let bytes = Doc::from(r#"{"name": "Bruce", "age": 42}"#).to_bson().unwrap();
        let doc = bson_to_document(&bytes).unwrap();
        assert_eq!(doc.get_str("name").unwrap(), "Bruce");
        assert!(matches!(doc.get("age"), Some(Bson::Int32(42) | Bson::Int64(42))));
    }

    #[test]
    fn string_id_is_promoted_to_oid() {
        let doc = json_to_document(r#"{"_id": "5f1b0c3a9d1e8a0012345678", "a": 1}"#).unwrap();
        assert_eq!(
            doc.get_object_id(ID_FIELD).unwrap().to_hex(),
            "5f1b0c3a9d1e8a0012345678"
        );
    }

    #[test]
    fn non_hex_id_stays_string() {
        let doc = json_to_document(r#"{"_id": "custom"}"#).unwrap();
        assert_eq!(doc.get_str(ID_FIELD).unwrap(), "custom");
    }

    #[test]
    fn query_operators_survive_extended_json() {
        let doc = json_to_document(r#"{"age": {"$gt": 3}, "tags": {"$in": ["a", "b"]}}"#).unwrap();
        let age = doc.get_document("age").unwrap();
        assert!(matches!(age.get("$gt"), Some(Bson::Int32(3) | Bson::Int64(3))));
        assert_eq!(doc.get_document("tags").unwrap().get_array("$in").unwrap().len(), 2);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = Doc::from("{not json").to_bson().unwrap_err();
        assert!(matches!(err, EjdbError::InvalidDocument { .. }));
    }

    #[test]
    fn json_array_is_rejected() {
        let err = json_to_document("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, EjdbError::InvalidDocument { .. }));
    }

    #[test]
    fn raw_bson_is_borrowed() {
        let bytes = encode_document(&doc! { "x": 1 }).unwrap();
        let out = Doc::from(&bytes).to_bson().unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, bytes.as_slice());
    }

    #[test]
    fn truncated_bson_is_rejected() {
        let err = Doc::Bson(&[5, 0, 0]).to_bson().unwrap_err();
        assert!(matches!(err, EjdbError::InvalidDocument { .. }));
    }

    #[test]
    fn bson_to_json_uses_relaxed_form() {
        let bytes = encode_document(&doc! { "n": 7_i64, "s": "x" }).unwrap();
        let json = bson_to_json(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({ "n": 7, "s": "x" }));
    }

    #[test]
    fn oid_string_conversion() {
        let oid = oid_from_str("5f1b0c3a9d1e8a0012345678").unwrap();
        assert_eq!(oid_to_string(&oid), "5f1b0c3a9d1e8a0012345678");

        assert!(matches!(oid_from_str("xyz"), Err(EjdbError::InvalidOid { .. })));
        assert!(oid_from_str("5f1b0c3a9d1e8a001234567").is_err());
    }

    #[test]
    fn copy_null_buffer_is_empty() {
        let out = unsafe { copy_native_buffer(std::ptr::null(), 10) };
        assert!(out.is_empty());
    }
}
