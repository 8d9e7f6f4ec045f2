//! Engine state and the exported entry points.
//!
//! Handles are boxed Rust values cast to the opaque native types. Each
//! database keeps its last-error code in a cell shared with its
//! collections, and every entry point that takes a handle resets it first.

use super::leaks::{self, Handle};
use super::matcher::{self, Query};
use bson::oid::ObjectId;
use bson::{Bson, Document};
use ejdb_sys::{
    bson as native_bson, bson_oid_t, EJCOLL, EJCOLLOPTS, EJDB, EJQ, EJQRESULT, JBEEI,
    JBEEJSONPARSE, JBEFPATHINVALID, JBEINVALIDBSON, JBEINVALIDBSONPK, JBEINVALIDCMD,
    JBEINVALIDCOLNAME, JBEMAXNUMCOLS, JBEMETANVALID, JBEQACTKEY, JBEQERROR, JBEQINCEXCL,
    JBEQINOPNOTARRAY, JBEQINVALIDQCONTROL, JBEQINVALIDQRX, JBEQONEEMATCH, JBEQRSSORTING,
    JBEQUPDFAILED, JBETOOBIGBSON, JBIDXARR, JBIDXDROP, JBIDXDROPALL, JBIDXISTR, JBIDXNUM,
    JBIDXSTR, JBMAXCOLNAMELEN, JBOCREAT, JBOREADER, JBOTRUNC, JBOWRITER, JBQRYCOUNT,
    JBQRYFINDONE, TCECLOSE, TCEINVALID, TCEKEEP, TCEMETA, TCEMISC, TCENOFILE, TCENOPERM,
    TCENOREC, TCEOPEN, TCESUCCESS, TCESYNC, TCETHREAD, TCXSTR,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Maximum number of collections per database.
const MAX_COLLECTIONS: usize = 1024;

thread_local! {
    /// Database files written by `ejdbclose`/`ejdbsyncdb`, keyed by path.
    static FILES: RefCell<HashMap<String, BTreeMap<String, CollData>>> =
        RefCell::new(HashMap::new());
}

#[derive(Debug, Clone, Default)]
struct CollData {
    records: Vec<Document>,
    indexes: BTreeMap<String, c_int>,
    options: EJCOLLOPTS,
}

#[derive(Debug, Clone, Default)]
struct ErrorSlot(Arc<AtomicI32>);

impl ErrorSlot {
    fn reset(&self) {
        self.set(TCESUCCESS);
    }

    fn set(&self, code: c_int) {
        self.0.store(code, Ordering::Relaxed);
    }

    fn get(&self) -> c_int {
        self.0.load(Ordering::Relaxed)
    }

    /// Records `code` and returns false, for bool-returning entry points.
    fn fail(&self, code: c_int) -> bool {
        self.set(code);
        false
    }

    /// Records `code` and returns null, for pointer-returning entry points.
    fn fail_null<T>(&self, code: c_int) -> *mut T {
        self.set(code);
        ptr::null_mut()
    }
}

#[derive(Debug, Default)]
struct FakeDb {
    ecode: ErrorSlot,
    open: bool,
    path: String,
    mode: c_int,
    colls: BTreeMap<String, Box<FakeColl>>,
}

impl FakeDb {
    fn writable(&self) -> bool {
        self.mode & JBOWRITER != 0
    }

    fn new_coll(&self, name: &str, data: CollData) -> Box<FakeColl> {
        Box::new(FakeColl {
            ecode: self.ecode.clone(),
            writable: self.writable(),
            name: name.to_owned(),
            data,
            snapshot: None,
        })
    }

    fn persist(&self) {
        let colls = self
            .colls
            .iter()
            .map(|(name, coll)| (name.clone(), coll.committed().clone()))
            .collect();
        FILES.with(|files| files.borrow_mut().insert(self.path.clone(), colls));
    }

    fn close(&mut self) {
        self.persist();
        self.colls.clear();
        self.open = false;
    }
}

#[derive(Debug)]
struct FakeColl {
    ecode: ErrorSlot,
    writable: bool,
    name: String,
    data: CollData,
    snapshot: Option<CollData>,
}

impl FakeColl {
    /// Data as of the last commit.
    fn committed(&self) -> &CollData {
        self.snapshot.as_ref().unwrap_or(&self.data)
    }

    fn position(&self, oid: &bson_oid_t) -> Option<usize> {
        let id = ObjectId::from_bytes(oid.bytes);
        self.data
            .records
            .iter()
            .position(|rec| rec.get_object_id("_id").is_ok_and(|rid| rid == id))
    }
}

#[derive(Debug, Default)]
struct FakeQuery {
    query: Query,
    ors: Vec<Query>,
    hints: Hints,
}

impl FakeQuery {
    fn matches(&self, doc: &Document) -> bool {
        self.query.matches(doc) && (self.ors.is_empty() || self.ors.iter().any(|q| q.matches(doc)))
    }
}

#[derive(Debug, Default)]
struct Hints {
    order_by: Vec<(String, bool)>,
    max: Option<usize>,
    skip: usize,
    fields: Option<(bool, Vec<String>)>,
}

impl Hints {
    fn parse(doc: &Document) -> Result<Self, c_int> {
        let mut hints = Hints::default();
        for (key, value) in doc {
            match key.as_str() {
                "$orderby" => {
                    let Bson::Document(order) = value else {
                        return Err(JBEQERROR);
                    };
                    for (field, dir) in order {
                        let dir = matcher::number(dir).ok_or(JBEQERROR)?;
                        hints.order_by.push((field.clone(), dir >= 0.0));
                    }
                }
                "$max" => hints.max = Some(count(value)?),
                "$skip" => hints.skip = count(value)?,
                "$fields" => {
                    let Bson::Document(fields) = value else {
                        return Err(JBEQERROR);
                    };
                    let mut mode = None;
                    let mut names = Vec::new();
                    for (field, flag) in fields {
                        let include = match flag {
                            Bson::Boolean(b) => *b,
                            other => matcher::number(other).ok_or(JBEQERROR)? != 0.0,
                        };
                        if field != "_id" {
                            if mode.is_some_and(|m| m != include) {
                                return Err(JBEQINCEXCL);
                            }
                            mode = Some(include);
                        }
                        names.push(field.clone());
                    }
                    hints.fields = mode.map(|include| (include, names));
                }
                _ => {}
            }
        }
        Ok(hints)
    }

    fn project(&self, doc: &Document) -> Document {
        let Some((include, names)) = &self.fields else {
            return doc.clone();
        };
        let root = |name: &String| name.split('.').next().unwrap_or(name).to_owned();
        if *include {
            let mut keep: Vec<String> = names.iter().map(root).collect();
            keep.extend(self.order_by.iter().map(|(f, _)| root(f)));
            doc.iter()
                .filter(|(k, _)| *k == "_id" || keep.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else {
            doc.iter()
                .filter(|(k, _)| !names.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        }
    }
}

fn count(value: &Bson) -> Result<usize, c_int> {
    match matcher::number(value) {
        Some(n) if n >= 0.0 => Ok(n as usize),
        _ => Err(JBEQERROR),
    }
}

#[derive(Debug)]
struct FakeResult {
    docs: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct FakeBson {
    data: Vec<u8>,
}

// Handle casts.

unsafe fn db_mut<'a>(jb: *mut EJDB) -> Option<&'a mut FakeDb> {
    jb.cast::<FakeDb>().as_mut()
}

unsafe fn coll_mut<'a>(coll: *mut EJCOLL) -> Option<&'a mut FakeColl> {
    coll.cast::<FakeColl>().as_mut()
}

unsafe fn query_mut<'a>(q: *mut EJQ) -> Option<&'a mut FakeQuery> {
    q.cast::<FakeQuery>().as_mut()
}

unsafe fn bson_ref<'a>(b: *const native_bson) -> Option<&'a FakeBson> {
    b.cast::<FakeBson>().as_ref()
}

fn new_bson(data: Vec<u8>) -> *mut native_bson {
    leaks::acquired(Handle::Bson);
    Box::into_raw(Box::new(FakeBson { data })).cast()
}

/// Reads a serialized document given only its start, as the engine does
/// for `ejdbqueryaddor` and `ejdbqueryhints`.
unsafe fn raw_document<'a>(data: *const c_void) -> Option<&'a [u8]> {
    if data.is_null() {
        return None;
    }
    let head = std::slice::from_raw_parts(data.cast::<u8>(), 4);
    let len = i32::from_le_bytes(head.try_into().ok()?);
    if len < 5 {
        return None;
    }
    Some(std::slice::from_raw_parts(data.cast::<u8>(), len as usize))
}

fn decode(bytes: &[u8]) -> Option<Document> {
    let mut reader = bytes;
    Document::from_reader(&mut reader).ok()
}

fn encode(doc: &Document) -> Vec<u8> {
    let mut buf = Vec::new();
    // Writing into a Vec only fails for documents the decoder rejected.
    let _ = doc.to_writer(&mut buf);
    buf
}

/// Field names may not start with `$` or contain `.`, at any depth.
fn valid_field_names(doc: &Document) -> bool {
    doc.iter().all(|(key, value)| {
        !key.starts_with('$') && !key.contains('.') && valid_value(value)
    })
}

fn valid_value(value: &Bson) -> bool {
    match value {
        Bson::Document(inner) => valid_field_names(inner),
        Bson::Array(items) => items.iter().all(valid_value),
        _ => true,
    }
}

fn valid_coll_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= JBMAXCOLNAMELEN
        && !name.contains(['$', '/', '\\'])
        && !name.chars().any(char::is_control)
}

/// Moves (or inserts) `_id` to the front of the document.
fn with_id_first(id: ObjectId, doc: Document) -> Document {
    let mut out = Document::new();
    out.insert("_id", id);
    for (key, value) in doc {
        if key != "_id" {
            out.insert(key, value);
        }
    }
    out
}

fn c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // Safety: callers pass NUL terminated strings.
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

// Database.

pub(super) unsafe extern "C" fn ejdbversion() -> *const c_char {
    c"1.2.12-testkit".as_ptr()
}

pub(super) unsafe extern "C" fn ejdberrmsg(ecode: c_int) -> *const c_char {
    let msg: &'static CStr = match ecode {
        TCESUCCESS => c"success",
        TCETHREAD => c"threading error",
        TCEINVALID => c"invalid operation",
        TCENOFILE => c"file not found",
        TCENOPERM => c"no permission",
        TCEMETA => c"invalid meta data",
        TCEOPEN => c"open error",
        TCECLOSE => c"close error",
        TCESYNC => c"sync error",
        TCEKEEP => c"existing record",
        TCENOREC => c"no record found",
        TCEMISC => c"miscellaneous error",
        JBEINVALIDCOLNAME => c"invalid collection name",
        JBEINVALIDBSON => c"invalid bson object",
        JBEINVALIDBSONPK => c"invalid bson object id",
        JBEQINVALIDQCONTROL => c"invalid query control field starting with '$'",
        JBEQINOPNOTARRAY => c"$strand, $stror, $in, $nin, $bt keys require not empty array value",
        JBEMETANVALID => c"inconsistent database metadata",
        JBEFPATHINVALID => c"invalid field path value",
        JBEQINVALIDQRX => c"invalid query regexp value",
        JBEQRSSORTING => c"result set sorting error",
        JBEQERROR => c"query generic error",
        JBEQUPDFAILED => c"bson record update failed",
        JBEQONEEMATCH => c"only one $elemMatch allowed in the fieldpath",
        JBEQINCEXCL => c"$fields hint cannot mix include and exclude fields",
        JBEQACTKEY => c"action key in $do block can only be one of: $join",
        JBEMAXNUMCOLS => c"exceeded the maximum number of collections per database",
        JBEEI => c"export/import error",
        JBEEJSONPARSE => c"JSON parsing failed",
        JBETOOBIGBSON => c"BSON size is too big",
        JBEINVALIDCMD => c"invalid ejdb command specified",
        _ => c"unknown error",
    };
    msg.as_ptr()
}

pub(super) unsafe extern "C" fn ejdbecode(jb: *mut EJDB) -> c_int {
    db_mut(jb).map_or(TCEINVALID, |db| db.ecode.get())
}

pub(super) unsafe extern "C" fn ejdbnew() -> *mut EJDB {
    leaks::acquired(Handle::Database);
    Box::into_raw(Box::<FakeDb>::default()).cast()
}

pub(super) unsafe extern "C" fn ejdbdel(jb: *mut EJDB) {
    if jb.is_null() {
        return;
    }
    let mut db = Box::from_raw(jb.cast::<FakeDb>());
    if db.open {
        db.close();
    }
    leaks::released(Handle::Database);
}

pub(super) unsafe extern "C" fn ejdbopen(jb: *mut EJDB, path: *const c_char, mode: c_int) -> bool {
    let Some(db) = db_mut(jb) else {
        return false;
    };
    db.ecode.reset();
    if db.open || mode & (JBOREADER | JBOWRITER) == 0 {
        return db.ecode.fail(TCEINVALID);
    }
    let Some(path) = c_str(path) else {
        return db.ecode.fail(TCEINVALID);
    };

    let writer = mode & JBOWRITER != 0;
    let stored = FILES.with(|files| files.borrow().get(&path).cloned());
    if stored.is_none() && !Path::new(&path).exists() {
        if !(writer && mode & JBOCREAT != 0) {
            return db.ecode.fail(TCENOFILE);
        }
        if std::fs::File::create(&path).is_err() {
            return db.ecode.fail(TCEOPEN);
        }
    }
    let colls = if writer && mode & JBOTRUNC != 0 {
        BTreeMap::new()
    } else {
        stored.unwrap_or_default()
    };

    db.mode = mode;
    db.path = path;
    db.colls = colls
        .into_iter()
        .map(|(name, data)| {
            let coll = db.new_coll(&name, data);
            (name, coll)
        })
        .collect();
    db.open = true;
    db.persist();
    true
}

pub(super) unsafe extern "C" fn ejdbclose(jb: *mut EJDB) -> bool {
    let Some(db) = db_mut(jb) else {
        return false;
    };
    db.ecode.reset();
    if !db.open {
        return db.ecode.fail(TCEINVALID);
    }
    db.close();
    true
}

pub(super) unsafe extern "C" fn ejdbisopen(jb: *mut EJDB) -> bool {
    db_mut(jb).is_some_and(|db| db.open)
}

pub(super) unsafe extern "C" fn ejdbsyncdb(jb: *mut EJDB) -> bool {
    let Some(db) = db_mut(jb) else {
        return false;
    };
    db.ecode.reset();
    if !db.open {
        return db.ecode.fail(TCEINVALID);
    }
    db.persist();
    true
}

pub(super) unsafe extern "C" fn ejdbmeta(jb: *mut EJDB) -> *mut native_bson {
    let Some(db) = db_mut(jb) else {
        return ptr::null_mut();
    };
    db.ecode.reset();
    if !db.open {
        return db.ecode.fail_null(TCEINVALID);
    }

    let collections: Vec<Bson> = db
        .colls
        .values()
        .map(|coll| {
            let opts = &coll.data.options;
            let indexes: Vec<Bson> = coll
                .data
                .indexes
                .iter()
                .flat_map(|(field, flags)| {
                    [
                        (JBIDXSTR, 's', "lexical"),
                        (JBIDXNUM, 'n', "decimal"),
                        (JBIDXARR, 'a', "token"),
                        (JBIDXISTR, 'i', "ilexical"),
                    ]
                    .into_iter()
                    .filter(move |(bit, _, _)| flags & bit != 0)
                    .map(move |(_, prefix, kind)| {
                        Bson::Document(bson::doc! {
                            "field": field.as_str(),
                            "iname": format!("{prefix}{field}"),
                            "type": kind,
                        })
                    })
                })
                .collect();
            Bson::Document(bson::doc! {
                "name": coll.name.as_str(),
                "file": format!("{}_{}", db.path, coll.name),
                "records": coll.data.records.len() as i64,
                "options": {
                    "buckets": opts.records * 2,
                    "cachedrecords": opts.cachedrecords,
                    "large": opts.large,
                    "compressed": opts.compressed,
                },
                "indexes": indexes,
            })
        })
        .collect();

    let meta = bson::doc! { "file": db.path.as_str(), "collections": collections };
    new_bson(encode(&meta))
}

pub(super) unsafe extern "C" fn ejdbisvalidoidstr(oid: *const c_char) -> bool {
    c_str(oid).is_some_and(|s| s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit()))
}

// Collections.

pub(super) unsafe extern "C" fn ejdbgetcoll(jb: *mut EJDB, colname: *const c_char) -> *mut EJCOLL {
    let Some(db) = db_mut(jb) else {
        return ptr::null_mut();
    };
    db.ecode.reset();
    if !db.open {
        return db.ecode.fail_null(TCEINVALID);
    }
    let Some(name) = c_str(colname) else {
        return db.ecode.fail_null(JBEINVALIDCOLNAME);
    };
    match db.colls.get_mut(&name) {
        Some(coll) => ptr::from_mut::<FakeColl>(coll).cast(),
        None => ptr::null_mut(),
    }
}

pub(super) unsafe extern "C" fn ejdbcreatecoll(
    jb: *mut EJDB,
    colname: *const c_char,
    opts: *mut EJCOLLOPTS,
) -> *mut EJCOLL {
    let Some(db) = db_mut(jb) else {
        return ptr::null_mut();
    };
    db.ecode.reset();
    if !db.open {
        return db.ecode.fail_null(TCEINVALID);
    }
    let Some(name) = c_str(colname).filter(|n| valid_coll_name(n)) else {
        return db.ecode.fail_null(JBEINVALIDCOLNAME);
    };
    if !db.colls.contains_key(&name) {
        if !db.writable() {
            return db.ecode.fail_null(TCENOPERM);
        }
        if db.colls.len() >= MAX_COLLECTIONS {
            return db.ecode.fail_null(JBEMAXNUMCOLS);
        }
        let data = CollData {
            options: opts.as_ref().copied().unwrap_or_default(),
            ..CollData::default()
        };
        let coll = db.new_coll(&name, data);
        db.colls.insert(name.clone(), coll);
    }
    match db.colls.get_mut(&name) {
        Some(coll) => ptr::from_mut::<FakeColl>(coll).cast(),
        None => db.ecode.fail_null(TCEMISC),
    }
}

pub(super) unsafe extern "C" fn ejdbrmcoll(jb: *mut EJDB, colname: *const c_char, _unlinkfile: bool) -> bool {
    let Some(db) = db_mut(jb) else {
        return false;
    };
    db.ecode.reset();
    if !db.open {
        return db.ecode.fail(TCEINVALID);
    }
    if !db.writable() {
        return db.ecode.fail(TCENOPERM);
    }
    let Some(name) = c_str(colname) else {
        return db.ecode.fail(JBEINVALIDCOLNAME);
    };
    db.colls.remove(&name);
    true
}

pub(super) unsafe extern "C" fn ejdbsyncoll(coll: *mut EJCOLL) -> bool {
    let Some(coll) = coll_mut(coll) else {
        return false;
    };
    coll.ecode.reset();
    true
}

// Records.

pub(super) unsafe extern "C" fn ejdbsavebson(coll: *mut EJCOLL, bs: *mut native_bson, oid: *mut bson_oid_t) -> bool {
    save(coll, bs, oid, false)
}

pub(super) unsafe extern "C" fn ejdbsavebson2(
    coll: *mut EJCOLL,
    bs: *mut native_bson,
    oid: *mut bson_oid_t,
    merge: bool,
) -> bool {
    save(coll, bs, oid, merge)
}

unsafe fn save(coll: *mut EJCOLL, bs: *mut native_bson, oid: *mut bson_oid_t, merge: bool) -> bool {
    let Some(coll) = coll_mut(coll) else {
        return false;
    };
    coll.ecode.reset();
    if !coll.writable {
        return coll.ecode.fail(TCENOPERM);
    }
    let Some(doc) = bson_ref(bs).and_then(|b| decode(&b.data)) else {
        return coll.ecode.fail(JBEINVALIDBSON);
    };
    if !valid_field_names(&doc) {
        return coll.ecode.fail(JBEINVALIDBSON);
    }
    let id = match doc.get("_id") {
        Some(Bson::ObjectId(id)) => *id,
        Some(_) => return coll.ecode.fail(JBEINVALIDBSONPK),
        None => ObjectId::new(),
    };
    let doc = with_id_first(id, doc);
    let c_oid = bson_oid_t::from_bytes(id.bytes());

    match coll.position(&c_oid) {
        Some(pos) if merge => {
            let existing = &mut coll.data.records[pos];
            for (key, value) in doc {
                existing.insert(key, value);
            }
        }
        Some(pos) => coll.data.records[pos] = doc,
        None => coll.data.records.push(doc),
    }

    if let Some(out) = oid.as_mut() {
        *out = c_oid;
    }
    true
}

pub(super) unsafe extern "C" fn ejdbrmbson(coll: *mut EJCOLL, oid: *mut bson_oid_t) -> bool {
    let Some(coll) = coll_mut(coll) else {
        return false;
    };
    coll.ecode.reset();
    if !coll.writable {
        return coll.ecode.fail(TCENOPERM);
    }
    let Some(oid) = oid.as_ref() else {
        return coll.ecode.fail(JBEINVALIDBSONPK);
    };
    match coll.position(oid) {
        Some(pos) => {
            coll.data.records.remove(pos);
            true
        }
        None => coll.ecode.fail(TCENOREC),
    }
}

pub(super) unsafe extern "C" fn ejdbloadbson(coll: *mut EJCOLL, oid: *const bson_oid_t) -> *mut native_bson {
    let Some(coll) = coll_mut(coll) else {
        return ptr::null_mut();
    };
    coll.ecode.reset();
    let Some(oid) = oid.as_ref() else {
        return coll.ecode.fail_null(JBEINVALIDBSONPK);
    };
    match coll.position(oid) {
        Some(pos) => new_bson(encode(&coll.data.records[pos])),
        None => ptr::null_mut(),
    }
}

// Queries.

pub(super) unsafe extern "C" fn ejdbcreatequery(
    jb: *mut EJDB,
    qobj: *mut native_bson,
    orqobjs: *mut native_bson,
    orqobjsnum: c_int,
    hints: *mut native_bson,
) -> *mut EJQ {
    let Some(db) = db_mut(jb) else {
        return ptr::null_mut();
    };
    db.ecode.reset();
    if !db.open {
        return db.ecode.fail_null(TCEINVALID);
    }
    // OR objects arrive as a packed array of native structs, which this
    // engine cannot index. They must be added with `ejdbqueryaddor`.
    if !orqobjs.is_null() && orqobjsnum > 0 {
        return db.ecode.fail_null(TCEINVALID);
    }
    let Some(filter) = bson_ref(qobj).and_then(|b| decode(&b.data)) else {
        return db.ecode.fail_null(JBEINVALIDBSON);
    };
    let query = match Query::compile(&filter) {
        Ok(query) => query,
        Err(code) => return db.ecode.fail_null(code),
    };
    let hints = match bson_ref(hints).map(|b| decode(&b.data)) {
        None => Hints::default(),
        Some(None) => return db.ecode.fail_null(JBEINVALIDBSON),
        Some(Some(doc)) => match Hints::parse(&doc) {
            Ok(hints) => hints,
            Err(code) => return db.ecode.fail_null(code),
        },
    };

    leaks::acquired(Handle::Query);
    Box::into_raw(Box::new(FakeQuery {
        query,
        ors: Vec::new(),
        hints,
    }))
    .cast()
}

pub(super) unsafe extern "C" fn ejdbqueryaddor(jb: *mut EJDB, q: *mut EJQ, orbsdata: *const c_void) -> *mut EJQ {
    let Some(db) = db_mut(jb) else {
        return ptr::null_mut();
    };
    db.ecode.reset();
    let Some(query) = query_mut(q) else {
        return db.ecode.fail_null(TCEINVALID);
    };
    let Some(filter) = raw_document(orbsdata).and_then(decode) else {
        return db.ecode.fail_null(JBEINVALIDBSON);
    };
    match Query::compile(&filter) {
        Ok(or) => {
            query.ors.push(or);
            q
        }
        Err(code) => db.ecode.fail_null(code),
    }
}

pub(super) unsafe extern "C" fn ejdbqueryhints(jb: *mut EJDB, q: *mut EJQ, hintsbsdata: *const c_void) -> *mut EJQ {
    let Some(db) = db_mut(jb) else {
        return ptr::null_mut();
    };
    db.ecode.reset();
    let Some(query) = query_mut(q) else {
        return db.ecode.fail_null(TCEINVALID);
    };
    let Some(doc) = raw_document(hintsbsdata).and_then(decode) else {
        return db.ecode.fail_null(JBEINVALIDBSON);
    };
    match Hints::parse(&doc) {
        Ok(hints) => {
            query.hints = hints;
            q
        }
        Err(code) => db.ecode.fail_null(code),
    }
}

pub(super) unsafe extern "C" fn ejdbquerydel(q: *mut EJQ) {
    if q.is_null() {
        return;
    }
    drop(Box::from_raw(q.cast::<FakeQuery>()));
    leaks::released(Handle::Query);
}

pub(super) unsafe extern "C" fn ejdbqryexecute(
    coll: *mut EJCOLL,
    q: *const EJQ,
    count: *mut u32,
    qflags: c_int,
    _log: *mut TCXSTR,
) -> EJQRESULT {
    let Some(coll) = coll_mut(coll) else {
        return ptr::null_mut();
    };
    coll.ecode.reset();
    let Some(query) = q.cast::<FakeQuery>().as_ref() else {
        return coll.ecode.fail_null(TCEINVALID);
    };

    let update = &query.query.update;
    let (n, docs) = if update.is_empty() {
        let mut matched: Vec<&Document> = coll
            .data
            .records
            .iter()
            .filter(|rec| query.matches(rec))
            .collect();
        for (field, asc) in query.hints.order_by.iter().rev() {
            matched.sort_by(|a, b| {
                let ord = matcher::compare(
                    matcher::lookup(a, field).first().copied(),
                    matcher::lookup(b, field).first().copied(),
                );
                if *asc {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        let mut max = query.hints.max.unwrap_or(usize::MAX);
        if qflags & JBQRYFINDONE != 0 {
            max = max.min(1);
        }
        let selected: Vec<&Document> = matched
            .into_iter()
            .skip(query.hints.skip)
            .take(max)
            .collect();
        let docs = if qflags & JBQRYCOUNT != 0 {
            Vec::new()
        } else {
            selected
                .iter()
                .map(|doc| encode(&query.hints.project(doc)))
                .collect()
        };
        (selected.len(), docs)
    } else {
        if !coll.writable {
            return coll.ecode.fail_null(TCENOPERM);
        }
        match apply_update(coll, query) {
            Ok(n) => (n, Vec::new()),
            Err(code) => return coll.ecode.fail_null(code),
        }
    };

    if let Some(out) = count.as_mut() {
        *out = u32::try_from(n).unwrap_or(u32::MAX);
    }
    leaks::acquired(Handle::Result);
    Box::into_raw(Box::new(FakeResult { docs })).cast()
}

fn apply_update(coll: &mut FakeColl, query: &FakeQuery) -> Result<usize, c_int> {
    let update = &query.query.update;
    let matched: Vec<usize> = coll
        .data
        .records
        .iter()
        .enumerate()
        .filter(|(_, rec)| query.matches(rec))
        .map(|(pos, _)| pos)
        .collect();

    if update.dropall {
        for pos in matched.iter().rev() {
            coll.data.records.remove(*pos);
        }
        return Ok(matched.len());
    }

    if matched.is_empty() {
        if update.upsert.is_some() {
            let mut doc = Document::new();
            update.apply(&mut doc);
            let doc = with_id_first(ObjectId::new(), doc);
            if !valid_field_names(&doc) {
                return Err(JBEQUPDFAILED);
            }
            coll.data.records.push(doc);
            return Ok(1);
        }
    }

    for pos in &matched {
        let rec = &mut coll.data.records[*pos];
        update.apply(rec);
        if !valid_field_names(rec) {
            return Err(JBEQUPDFAILED);
        }
    }
    Ok(matched.len())
}

pub(super) unsafe extern "C" fn ejdbqresultnum(qr: EJQRESULT) -> c_int {
    qr.cast::<FakeResult>()
        .as_ref()
        .map_or(0, |r| c_int::try_from(r.docs.len()).unwrap_or(c_int::MAX))
}

pub(super) unsafe extern "C" fn ejdbqresultbsondata(qr: EJQRESULT, pos: c_int, size: *mut c_int) -> *const c_void {
    let doc = qr
        .cast::<FakeResult>()
        .as_ref()
        .zip(usize::try_from(pos).ok())
        .and_then(|(r, pos)| r.docs.get(pos));
    if let Some(out) = size.as_mut() {
        *out = doc.map_or(0, |d| d.len() as c_int);
    }
    doc.map_or(ptr::null(), |d| d.as_ptr().cast())
}

pub(super) unsafe extern "C" fn ejdbqresultdispose(qr: EJQRESULT) {
    if qr.is_null() {
        return;
    }
    drop(Box::from_raw(qr.cast::<FakeResult>()));
    leaks::released(Handle::Result);
}

// Indexes and transactions.

pub(super) unsafe extern "C" fn ejdbsetindex(coll: *mut EJCOLL, ipath: *const c_char, flags: c_int) -> bool {
    let Some(coll) = coll_mut(coll) else {
        return false;
    };
    coll.ecode.reset();
    if !coll.writable {
        return coll.ecode.fail(TCENOPERM);
    }
    let Some(path) = c_str(ipath).filter(|p| !p.is_empty()) else {
        return coll.ecode.fail(JBEFPATHINVALID);
    };

    let types = flags & (JBIDXNUM | JBIDXSTR | JBIDXARR | JBIDXISTR);
    if flags & JBIDXDROPALL != 0 {
        coll.data.indexes.remove(&path);
        return true;
    }
    if types == 0 {
        return coll.ecode.fail(TCEINVALID);
    }
    if flags & JBIDXDROP != 0 {
        if let Some(current) = coll.data.indexes.get_mut(&path) {
            *current &= !types;
            if *current == 0 {
                coll.data.indexes.remove(&path);
            }
        }
    } else {
        *coll.data.indexes.entry(path).or_insert(0) |= types;
    }
    true
}

pub(super) unsafe extern "C" fn ejdbtranbegin(coll: *mut EJCOLL) -> bool {
    let Some(coll) = coll_mut(coll) else {
        return false;
    };
    coll.ecode.reset();
    if !coll.writable {
        return coll.ecode.fail(TCENOPERM);
    }
    if coll.snapshot.is_some() {
        return coll.ecode.fail(TCEINVALID);
    }
    coll.snapshot = Some(coll.data.clone());
    true
}

pub(super) unsafe extern "C" fn ejdbtrancommit(coll: *mut EJCOLL) -> bool {
    let Some(coll) = coll_mut(coll) else {
        return false;
    };
    coll.ecode.reset();
    match coll.snapshot.take() {
        Some(_) => true,
        None => coll.ecode.fail(TCEINVALID),
    }
}

pub(super) unsafe extern "C" fn ejdbtranabort(coll: *mut EJCOLL) -> bool {
    let Some(coll) = coll_mut(coll) else {
        return false;
    };
    coll.ecode.reset();
    match coll.snapshot.take() {
        Some(saved) => {
            coll.data = saved;
            true
        }
        None => coll.ecode.fail(TCEINVALID),
    }
}

pub(super) unsafe extern "C" fn ejdbtranstatus(coll: *mut EJCOLL, txactive: *mut bool) -> bool {
    let Some(coll) = coll_mut(coll) else {
        return false;
    };
    coll.ecode.reset();
    let Some(out) = txactive.as_mut() else {
        return coll.ecode.fail(TCEINVALID);
    };
    *out = coll.snapshot.is_some();
    true
}

// BSON objects.

pub(super) unsafe extern "C" fn bson_create_from_buffer(buf: *const c_void, bufsz: c_int) -> *mut native_bson {
    if buf.is_null() || bufsz < 0 {
        return ptr::null_mut();
    }
    let data = std::slice::from_raw_parts(buf.cast::<u8>(), bufsz as usize).to_vec();
    new_bson(data)
}

pub(super) unsafe extern "C" fn bson_del(b: *mut native_bson) {
    if b.is_null() {
        return;
    }
    drop(Box::from_raw(b.cast::<FakeBson>()));
    leaks::released(Handle::Bson);
}

pub(super) unsafe extern "C" fn bson_data(b: *const native_bson) -> *const c_char {
    bson_ref(b).map_or(ptr::null(), |b| b.data.as_ptr().cast())
}

pub(super) unsafe extern "C" fn bson_size(b: *const native_bson) -> c_int {
    bson_ref(b).map_or(0, |b| b.data.len() as c_int)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_name_rules() {
        assert!(valid_field_names(&bson::doc! { "a": { "b": [ { "c": 1 } ] }, "x$": 1 }));
        assert!(!valid_field_names(&bson::doc! { "$a": 1 }));
        assert!(!valid_field_names(&bson::doc! { "a.b": 1 }));
        assert!(!valid_field_names(&bson::doc! { "a": [ { "$b": 1 } ] }));
    }

    #[test]
    fn collection_name_rules() {
        assert!(valid_coll_name("contacts"));
        assert!(!valid_coll_name(""));
        assert!(!valid_coll_name("a/b"));
        assert!(!valid_coll_name(&"x".repeat(JBMAXCOLNAMELEN + 1)));
    }

    #[test]
    fn id_moves_to_front() {
        let id = ObjectId::new();
        let doc = with_id_first(id, bson::doc! { "a": 1, "_id": id });
        assert_eq!(doc.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn hints_reject_mixed_projection() {
        let err = Hints::parse(&bson::doc! { "$fields": { "a": 1, "b": 0 } }).unwrap_err();
        assert_eq!(err, JBEQINCEXCL);
        assert!(Hints::parse(&bson::doc! { "$fields": { "_id": 0, "a": 1 } }).is_ok());
    }

    #[test]
    fn include_projection_keeps_id_and_sort_keys() {
        let hints = Hints::parse(&bson::doc! {
            "$fields": { "name": 1 },
            "$orderby": { "age": -1 },
        })
        .unwrap();
        let doc = bson::doc! { "_id": 1, "name": "a", "age": 2, "secret": true };
        assert_eq!(hints.project(&doc), bson::doc! { "_id": 1, "name": "a", "age": 2 });
    }
}
