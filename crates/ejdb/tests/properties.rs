//! Property-based tests for the collection API.

mod common;

use common::{decode, open};
use ejdb::bson::{doc, oid::ObjectId, Bson};
use ejdb::ejdb_sys::JBEINVALIDBSON;
use ejdb_testkit::generators::{
    document_strategy, field_name_strategy, invalid_field_name_strategy, oid_hex_strategy,
    value_strategy, PropTestConfig,
};
use ejdb_testkit::TestDir;
use proptest::prelude::*;

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn saved_documents_load_back(doc in document_strategy()) {
        let dir = TestDir::new();
        let db = open(&dir);
        let coll = db.create_coll("things", None).unwrap();

        let oid = coll.save(&doc).unwrap();
        let mut loaded = decode(&coll.load_bson(&oid).unwrap().unwrap());

        prop_assert_eq!(loaded.get_object_id("_id").unwrap().to_hex(), oid);
        loaded.remove("_id");
        prop_assert_eq!(loaded, doc);
    }

    #[test]
    fn every_save_gets_a_distinct_oid(docs in prop::collection::vec(document_strategy(), 1..16)) {
        let dir = TestDir::new();
        let db = open(&dir);
        let coll = db.create_coll("things", None).unwrap();

        let mut oids: Vec<String> = docs.iter().map(|d| coll.save(d).unwrap()).collect();
        for oid in &oids {
            prop_assert!(coll.load_bson(oid).unwrap().is_some());
        }
        oids.sort();
        oids.dedup();
        prop_assert_eq!(oids.len(), docs.len());
        prop_assert_eq!(coll.count("{}", &[]).unwrap() as usize, docs.len());
    }

    #[test]
    fn given_id_is_returned(hex in oid_hex_strategy(), doc in document_strategy()) {
        let dir = TestDir::new();
        let db = open(&dir);
        let coll = db.create_coll("things", None).unwrap();

        let mut doc = doc;
        doc.insert("_id", ObjectId::parse_str(&hex).unwrap());
        prop_assert_eq!(coll.save(&doc).unwrap(), hex);
    }

    #[test]
    fn reserved_names_never_stored(
        name in invalid_field_name_strategy(),
        value in value_strategy(),
        nested in any::<bool>(),
    ) {
        let dir = TestDir::new();
        let db = open(&dir);
        let coll = db.create_coll("things", None).unwrap();
        coll.save(&doc! { "seed": 1 }).unwrap();

        let mut bad = doc! {};
        bad.insert(name, value);
        let bad = if nested { doc! { "outer": bad } } else { bad };

        let err = coll.save(&bad).unwrap_err();
        prop_assert_eq!(err.code(), Some(JBEINVALIDBSON));
        prop_assert_eq!(coll.count("{}", &[]).unwrap(), 1);
    }

    #[test]
    fn count_matches_find(values in prop::collection::vec(-50i32..50, 0..40), bound in -60i32..60) {
        let dir = TestDir::new();
        let db = open(&dir);
        let coll = db.create_coll("numbers", None).unwrap();
        for n in &values {
            coll.save(&doc! { "n": *n }).unwrap();
        }

        let filter = doc! { "n": { "$gte": bound } };
        let found = coll.find(&filter, &[]).unwrap();
        let expected = values.iter().filter(|n| **n >= bound).count();

        prop_assert_eq!(found.len(), expected);
        prop_assert_eq!(coll.count(&filter, &[]).unwrap() as usize, expected);
        for record in &found {
            prop_assert!(decode(record).get_i32("n").unwrap() >= bound);
        }
    }

    #[test]
    fn equality_finds_saved_value(field in field_name_strategy(), text in "[a-z]{1,12}") {
        let dir = TestDir::new();
        let db = open(&dir);
        let coll = db.create_coll("things", None).unwrap();

        let mut target = doc! {};
        target.insert(field.clone(), Bson::String(text.clone()));
        let oid = coll.save(&target).unwrap();
        coll.save(&doc! { "other": 1 }).unwrap();

        let one = coll.find_one(&target, &[]).unwrap().unwrap();
        prop_assert_eq!(decode(&one).get_object_id("_id").unwrap().to_hex(), oid);
    }
}
