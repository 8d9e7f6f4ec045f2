//! Property-based test generators using proptest.
//!
//! Provides strategies for generating documents, field names and object
//! identifiers.

use bson::{Bson, Document};
use proptest::prelude::*;

/// Strategy for field names the engine accepts.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for field names the engine rejects: a leading `$` or an
/// embedded `.`.
pub fn invalid_field_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("\\$[a-z]{1,8}").expect("Invalid regex"),
        prop::string::string_regex("[a-z]{1,5}\\.[a-z]{1,5}").expect("Invalid regex"),
    ]
}

/// Strategy for valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for raw 12-byte object identifiers.
pub fn oid_bytes_strategy() -> impl Strategy<Value = [u8; 12]> {
    prop::array::uniform12(any::<u8>())
}

/// Strategy for object identifiers in their 24-character hex form.
pub fn oid_hex_strategy() -> impl Strategy<Value = String> {
    oid_bytes_strategy().prop_map(|bytes| bytes.iter().map(|b| format!("{b:02x}")).collect())
}

/// Strategy for scalar values that survive a BSON round trip unchanged.
pub fn scalar_strategy() -> impl Strategy<Value = Bson> {
    prop_oneof![
        any::<i32>().prop_map(Bson::Int32),
        any::<i64>().prop_map(Bson::Int64),
        (-1.0e9f64..1.0e9).prop_map(Bson::Double),
        any::<bool>().prop_map(Bson::Boolean),
        prop::string::string_regex("[ -~]{0,24}")
            .expect("Invalid regex")
            .prop_map(Bson::String),
        Just(Bson::Null),
    ]
}

/// Strategy for field values: scalars, arrays of scalars and small
/// embedded documents.
pub fn value_strategy() -> impl Strategy<Value = Bson> {
    prop_oneof![
        4 => scalar_strategy(),
        1 => prop::collection::vec(scalar_strategy(), 0..4).prop_map(Bson::Array),
        1 => prop::collection::vec((field_name_strategy(), scalar_strategy()), 0..4)
            .prop_map(|pairs| Bson::Document(pairs.into_iter().collect())),
    ]
}

/// Strategy for documents without an `_id` field.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::vec((field_name_strategy(), value_strategy()), 0..8)
        .prop_map(|pairs| pairs.into_iter().collect())
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
