//! Record, index and transaction tests for collections.

mod common;

use common::{decode, int, open};
use ejdb::bson::{doc, oid::ObjectId, Bson, DateTime};
use ejdb::ejdb_sys::{JBEINVALIDBSON, JBEINVALIDBSONPK, TCEINVALID};
use ejdb::{marshal, EjdbError, IndexFlags};
use ejdb_testkit::fake::leaks;
use ejdb_testkit::TestDir;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[test]
fn save_and_load_document() {
    let dir = TestDir::new();
    let db = open(&dir);
    let contacts = db.create_coll("contacts", None).unwrap();

    let oid = contacts
        .save(&doc! { "name": "Bruce", "phone": "333-222-333", "age": 58 })
        .unwrap();
    assert_eq!(oid.len(), 24);

    let loaded = decode(&contacts.load_bson(&oid).unwrap().unwrap());
    assert_eq!(loaded.get_object_id("_id").unwrap().to_hex(), oid);
    assert_eq!(loaded.get_str("name").unwrap(), "Bruce");
    assert_eq!(loaded.get_i32("age").unwrap(), 58);
}

#[test]
fn save_and_load_json() {
    let dir = TestDir::new();
    let db = open(&dir);
    let contacts = db.create_coll("contacts", None).unwrap();

    let oid = contacts
        .save_json(r#"{"name": "Bruce", "tags": ["a", "b"], "address": {"city": "Gotham"}}"#)
        .unwrap();
    let value = contacts.load_json(&oid).unwrap().unwrap();

    assert_eq!(value["_id"], json!({ "$oid": oid }));
    assert_eq!(value["name"], "Bruce");
    assert_eq!(value["tags"], json!(["a", "b"]));
    assert_eq!(value["address"]["city"], "Gotham");
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Contact {
    name: String,
    phone: Option<String>,
    age: i32,
}

#[test]
fn typed_records_round_trip() {
    let dir = TestDir::new();
    let db = open(&dir);
    let contacts = db.create_coll("contacts", None).unwrap();
    let bruce = Contact {
        name: "Bruce".into(),
        phone: Some("333-222-333".into()),
        age: 58,
    };

    let oid = contacts.save(&ejdb::bson::to_document(&bruce).unwrap()).unwrap();
    let loaded: Contact = ejdb::bson::from_slice(&contacts.load_bson(&oid).unwrap().unwrap()).unwrap();
    assert_eq!(loaded, bruce);
}

#[test]
fn save_serialized_bson() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("raw", None).unwrap();

    let bytes = marshal::encode_document(&doc! { "n": 7_i64 }).unwrap();
    let oid = coll.save_bson(&bytes).unwrap();

    let loaded = decode(&coll.load_bson(&oid).unwrap().unwrap());
    assert_eq!(loaded.get_i64("n").unwrap(), 7);
}

#[test]
fn truncated_bson_never_reaches_the_engine() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("raw", None).unwrap();
    let before = leaks::snapshot();

    let err = coll.save_bson(&[0x10, 0x00, 0x00]).unwrap_err();
    assert!(matches!(err, EjdbError::InvalidDocument { .. }));
    assert_eq!(leaks::snapshot(), before);
    assert_eq!(coll.count("{}", &[]).unwrap(), 0);
}

#[test]
fn malformed_json_is_rejected() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("things", None).unwrap();

    let err = coll.save_json(r#"{"name": "#).unwrap_err();
    assert!(matches!(err, EjdbError::InvalidDocument { .. }));

    let err = coll.save_json("[1, 2, 3]").unwrap_err();
    assert!(matches!(err, EjdbError::InvalidDocument { .. }));
}

#[test]
fn generated_oids_are_unique() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("things", None).unwrap();

    let mut oids: Vec<String> = (0..50)
        .map(|i| coll.save(&doc! { "i": i }).unwrap())
        .collect();
    oids.sort();
    oids.dedup();
    assert_eq!(oids.len(), 50);
}

#[test]
fn explicit_id_is_kept() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("things", None).unwrap();

    let id = ObjectId::parse_str("5f1b0c3a9d1e8a0012345678").unwrap();
    let oid = coll.save(&doc! { "_id": id, "v": 1 }).unwrap();
    assert_eq!(oid, "5f1b0c3a9d1e8a0012345678");

    // Saving again with the same id replaces the record.
    coll.save(&doc! { "_id": id, "v": 2 }).unwrap();
    assert_eq!(coll.count("{}", &[]).unwrap(), 1);
    let loaded = decode(&coll.load_bson(&oid).unwrap().unwrap());
    assert_eq!(loaded.get_i32("v").unwrap(), 2);
}

#[test]
fn extended_json_id_is_kept() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("things", None).unwrap();

    let oid = coll
        .save_json(r#"{"_id": {"$oid": "5f1b0c3a9d1e8a0012345678"}, "v": 1}"#)
        .unwrap();
    assert_eq!(oid, "5f1b0c3a9d1e8a0012345678");
}

#[test]
fn non_oid_id_is_rejected() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("things", None).unwrap();

    let err = coll.save(&doc! { "_id": "custom" }).unwrap_err();
    assert_eq!(err.code(), Some(JBEINVALIDBSONPK));
    assert_eq!(coll.count("{}", &[]).unwrap(), 0);
}

#[test]
fn reserved_field_names_are_rejected() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("things", None).unwrap();
    coll.save_json(r#"{"ok": true}"#).unwrap();

    for bad in [
        doc! { "$bad": 1 },
        doc! { "a.b": 1 },
        doc! { "outer": { "in.ner": 1 } },
        doc! { "list": [ { "$x": 1 } ] },
    ] {
        let err = coll.save(&bad).unwrap_err();
        assert_eq!(err.code(), Some(JBEINVALIDBSON), "accepted {bad}");
    }
    assert_eq!(coll.count("{}", &[]).unwrap(), 1);

    // A dollar sign that is not leading is fine.
    coll.save(&doc! { "price$": 3 }).unwrap();
}

#[test]
fn extended_json_wrappers_become_values() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("events", None).unwrap();

    let oid = coll
        .save_json(r#"{"when": {"$date": {"$numberLong": "0"}}, "big": {"$numberLong": "5"}}"#)
        .unwrap();
    let loaded = decode(&coll.load_bson(&oid).unwrap().unwrap());
    assert_eq!(loaded.get_datetime("when").unwrap(), &DateTime::from_millis(0));
    assert_eq!(loaded.get_i64("big").unwrap(), 5);

    // Unknown dollar keys are not wrappers and stay reserved.
    assert!(coll.save_json(r#"{"when": {"$bogus": 1}}"#).is_err());
    assert_eq!(coll.count("{}", &[]).unwrap(), 1);
}

#[test]
fn load_missing_record() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("things", None).unwrap();

    assert!(coll.load_bson("5f1b0c3a9d1e8a0012345678").unwrap().is_none());
    assert!(coll.load_json("5f1b0c3a9d1e8a0012345678").unwrap().is_none());
}

#[test]
fn invalid_oid_strings() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("things", None).unwrap();

    for bad in ["", "xyz", "5f1b0c3a9d1e8a001234567g", "5f1b0c3a9d1e8a00123456789"] {
        let err = coll.load_bson(bad).unwrap_err();
        assert!(matches!(err, EjdbError::InvalidOid { .. }), "accepted {bad:?}");
        assert!(coll.rm_bson(bad).is_err());
    }
}

#[test]
fn remove_record() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("things", None).unwrap();
    let keep = coll.save_json(r#"{"k": 1}"#).unwrap();
    let gone = coll.save_json(r#"{"k": 2}"#).unwrap();

    assert!(coll.rm_bson(&gone).unwrap());
    assert!(coll.load_bson(&gone).unwrap().is_none());
    assert!(coll.load_bson(&keep).unwrap().is_some());

    // Removing twice reports the record as absent.
    assert!(!coll.rm_bson(&gone).unwrap());
}

#[test]
fn merge_into_existing_record() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("things", None).unwrap();
    let id = ObjectId::new();
    coll.save(&doc! { "_id": id, "a": 1, "b": 1 }).unwrap();

    let oid = coll.save_merge(&doc! { "_id": id, "b": 2, "c": 3 }).unwrap();
    assert_eq!(oid, id.to_hex());

    let merged = decode(&coll.load_bson(&oid).unwrap().unwrap());
    assert_eq!(merged.get_i32("a").unwrap(), 1);
    assert_eq!(merged.get_i32("b").unwrap(), 2);
    assert_eq!(merged.get_i32("c").unwrap(), 3);

    // Without an existing record the merge inserts.
    let fresh = coll.save_merge(&doc! { "z": true }).unwrap();
    assert!(coll.load_bson(&fresh).unwrap().is_some());
}

#[test]
fn index_lifecycle_keeps_results() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("albums", None).unwrap();
    for n in 0..10 {
        coll.save(&doc! { "number": n, "title": format!("t{n}") }).unwrap();
    }
    let filter = r#"{"number": {"$gte": 5}}"#;
    assert_eq!(coll.count(filter, &[]).unwrap(), 5);

    coll.set_index("number", IndexFlags::NUM | IndexFlags::STR).unwrap();
    assert_eq!(coll.count(filter, &[]).unwrap(), 5);

    coll.set_index("number", IndexFlags::NUM | IndexFlags::REBUILD).unwrap();
    coll.set_index("number", IndexFlags::NUM | IndexFlags::OPTIMIZE).unwrap();
    coll.set_index("number", IndexFlags::DROP | IndexFlags::STR).unwrap();
    assert_eq!(coll.count(filter, &[]).unwrap(), 5);

    coll.set_index("number", IndexFlags::DROP_ALL).unwrap();
    assert_eq!(coll.count(filter, &[]).unwrap(), 5);

    let meta = db.meta().unwrap();
    let albums = meta.get_array("collections").unwrap()[0].as_document().unwrap();
    assert!(albums.get_array("indexes").unwrap().is_empty());
}

#[test]
fn index_needs_a_type() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("albums", None).unwrap();

    let err = coll.set_index("number", IndexFlags::REBUILD).unwrap_err();
    assert_eq!(err.code(), Some(TCEINVALID));

    let err = coll.set_index("bad\0path", IndexFlags::STR).unwrap_err();
    assert!(matches!(err, EjdbError::Nul(_)));
}

#[test]
fn abort_restores_collection() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("ledger", None).unwrap();
    let kept = coll.save_json(r#"{"amount": 10}"#).unwrap();

    assert!(!coll.is_transaction_active().unwrap());
    coll.begin_transaction().unwrap();
    assert!(coll.is_transaction_active().unwrap());

    coll.save_json(r#"{"amount": 20}"#).unwrap();
    coll.rm_bson(&kept).unwrap();
    assert_eq!(coll.count("{}", &[]).unwrap(), 1);

    coll.abort_transaction().unwrap();
    assert!(!coll.is_transaction_active().unwrap());
    assert_eq!(coll.count("{}", &[]).unwrap(), 1);
    assert!(coll.load_bson(&kept).unwrap().is_some());
}

#[test]
fn commit_keeps_changes() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("ledger", None).unwrap();

    coll.begin_transaction().unwrap();
    let oid = coll.save_json(r#"{"amount": 20}"#).unwrap();
    coll.commit_transaction().unwrap();

    assert!(!coll.is_transaction_active().unwrap());
    assert!(coll.load_bson(&oid).unwrap().is_some());
}

#[test]
fn transaction_misuse_is_reported() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("ledger", None).unwrap();

    assert_eq!(coll.commit_transaction().unwrap_err().code(), Some(TCEINVALID));
    assert_eq!(coll.abort_transaction().unwrap_err().code(), Some(TCEINVALID));

    coll.begin_transaction().unwrap();
    assert_eq!(coll.begin_transaction().unwrap_err().code(), Some(TCEINVALID));
    coll.abort_transaction().unwrap();
}

#[test]
fn update_operators() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("contacts", None).unwrap();
    let bruce = coll.save_json(r#"{"name": "Bruce", "visits": 1, "tags": ["a"]}"#).unwrap();
    coll.save_json(r#"{"name": "Alfred", "visits": 5}"#).unwrap();

    let n = coll
        .update(r#"{"name": "Bruce", "$set": {"phone": "333"}, "$inc": {"visits": 2}}"#, &[])
        .unwrap();
    assert_eq!(n, 1);

    let n = coll
        .update(r#"{"name": "Bruce", "$addToSet": {"tags": "b"}}"#, &[])
        .unwrap();
    assert_eq!(n, 1);
    coll.update(r#"{"name": "Bruce", "$addToSet": {"tags": "a"}}"#, &[])
        .unwrap();

    let record = decode(&coll.load_bson(&bruce).unwrap().unwrap());
    assert_eq!(record.get_str("phone").unwrap(), "333");
    assert_eq!(int(&record, "visits"), 3);
    assert_eq!(
        record.get_array("tags").unwrap(),
        &vec![Bson::String("a".into()), Bson::String("b".into())]
    );

    let n = coll
        .update(r#"{"name": "Bruce", "$pull": {"tags": "a"}}"#, &[])
        .unwrap();
    assert_eq!(n, 1);
    let record = decode(&coll.load_bson(&bruce).unwrap().unwrap());
    assert_eq!(record.get_array("tags").unwrap().len(), 1);
}

#[test]
fn update_upsert_inserts_when_nothing_matches() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("contacts", None).unwrap();

    let n = coll
        .update(r#"{"name": "Dick", "$upsert": {"name": "Dick", "age": 25}}"#, &[])
        .unwrap();
    assert_eq!(n, 1);

    let found = coll.find_one(r#"{"name": "Dick"}"#, &[]).unwrap().unwrap();
    assert_eq!(int(&decode(&found), "age"), 25);

    // A second upsert updates the existing record.
    coll.update(r#"{"name": "Dick", "$upsert": {"name": "Dick", "age": 26}}"#, &[])
        .unwrap();
    assert_eq!(coll.count(r#"{"name": "Dick"}"#, &[]).unwrap(), 1);
}

#[test]
fn update_dropall_removes_matches() {
    let dir = TestDir::new();
    let db = open(&dir);
    let coll = db.create_coll("contacts", None).unwrap();
    for age in [10, 20, 30, 40] {
        coll.save(&doc! { "age": age }).unwrap();
    }

    let n = coll
        .update(r#"{"age": {"$gt": 15}, "$dropall": true}"#, &[])
        .unwrap();
    assert_eq!(n, 3);
    assert_eq!(coll.count("{}", &[]).unwrap(), 1);
}

#[test]
fn update_on_reader_is_rejected() {
    let dir = TestDir::new();
    {
        let db = open(&dir);
        db.create_coll("contacts", None).unwrap().save_json(r#"{"a": 1}"#).unwrap();
    }
    let db = common::open_with_mode(&dir, ejdb::OpenMode::READER);
    let coll = db.get_coll("contacts").unwrap().unwrap();

    let err = coll.update(r#"{"$set": {"a": 2}}"#, &[]).unwrap_err();
    assert!(err.is_native());
}
