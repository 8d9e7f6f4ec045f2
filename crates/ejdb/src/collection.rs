//! Collection handle.

use crate::database::Ejdb;
use crate::error::EjdbResult;
use crate::flags::IndexFlags;
use crate::marshal::{bson_to_json, oid_from_str, oid_to_string, Doc, NativeBson};
use ejdb_sys::{bson_oid_t, EjdbApi, EJCOLL, TCEINVALID, TCEMISC, TCENOREC};
use std::ffi::CString;
use std::ptr::NonNull;
use tracing::{debug, trace};

/// A collection inside an open database.
///
/// The handle borrows its [`Ejdb`]; the borrow is used for error lookup and
/// call serialization only, never to extend the database's lifetime.
pub struct EjColl<'db> {
    db: &'db Ejdb,
    ptr: NonNull<EJCOLL>,
    name: String,
}

// Safety: every native call goes through the database handle's lock.
unsafe impl Send for EjColl<'_> {}
unsafe impl Sync for EjColl<'_> {}

impl<'db> EjColl<'db> {
    pub(crate) fn new(db: &'db Ejdb, ptr: NonNull<EJCOLL>, name: &str) -> Self {
        Self {
            db,
            ptr,
            name: name.to_owned(),
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning database.
    pub fn db(&self) -> &'db Ejdb {
        self.db
    }

    pub(crate) fn as_ptr(&self) -> *mut EJCOLL {
        self.ptr.as_ptr()
    }

    /// Persists a document and returns its OID.
    ///
    /// If the document has an `_id` field its value is returned, otherwise
    /// the engine generates one. Field names containing `$` or `.` are
    /// rejected by the engine.
    pub fn save<'a>(&self, doc: impl Into<Doc<'a>>) -> EjdbResult<String> {
        self.save_doc(doc.into(), false)
    }

    /// Persists a serialized BSON document. See [`EjColl::save`].
    pub fn save_bson(&self, bson: &[u8]) -> EjdbResult<String> {
        self.save_doc(Doc::Bson(bson), false)
    }

    /// Persists a JSON document. See [`EjColl::save`].
    ///
    /// Extended JSON wrappers (`{"$date": ...}`, `{"$oid": ...}`) are stored
    /// as the values they describe.
    pub fn save_json(&self, json: &str) -> EjdbResult<String> {
        self.save_doc(Doc::Json(json), false)
    }

    /// Merges a document into the stored record with the same `_id`,
    /// inserting it when no such record exists.
    pub fn save_merge<'a>(&self, doc: impl Into<Doc<'a>>) -> EjdbResult<String> {
        self.save_doc(doc.into(), true)
    }

    fn save_doc(&self, doc: Doc<'_>, merge: bool) -> EjdbResult<String> {
        let bytes = doc.to_bson()?;
        let bs = NativeBson::from_bytes(self.db.api(), &bytes)?;
        let mut oid = bson_oid_t::zero();

        let native = self.db.native();
        let api = native.api();
        // Safety: collection and bson are live; oid is a valid out pointer.
        let saved = unsafe {
            if merge {
                (api.ejdbsavebson2)(self.as_ptr(), bs.as_ptr(), &mut oid, true)
            } else {
                (api.ejdbsavebson)(self.as_ptr(), bs.as_ptr(), &mut oid)
            }
        };
        if !saved {
            return Err(native.failure(TCEMISC, "ejdbsavebson"));
        }

        let oid = oid_to_string(&oid);
        trace!(collection = %self.name, %oid, merge, "saved record");
        Ok(oid)
    }

    /// Loads a record by OID, returning its BSON bytes or `None`.
    pub fn load_bson(&self, oid: &str) -> EjdbResult<Option<Vec<u8>>> {
        let c_oid = oid_from_str(oid)?;

        let native = self.db.native();
        let api = native.api();
        // Safety: collection live; the returned object is owned by us and
        // freed when `loaded` drops, after the copy below.
        let loaded = unsafe { NativeBson::from_raw(api, (api.ejdbloadbson)(self.as_ptr(), &c_oid)) };
        match native.check() {
            Ok(()) => {}
            Err(err) if loaded.is_none() && err.code() == Some(TCENOREC) => return Ok(None),
            Err(err) => return Err(err),
        }

        trace!(collection = %self.name, %oid, found = loaded.is_some(), "loaded record");
        Ok(loaded.map(|bs| bs.to_vec()))
    }

    /// Loads a record by OID as relaxed extended JSON.
    pub fn load_json(&self, oid: &str) -> EjdbResult<Option<serde_json::Value>> {
        self.load_bson(oid)?
            .map(|bytes| bson_to_json(&bytes))
            .transpose()
    }

    /// Removes a record by OID. Returns whether the record existed.
    pub fn rm_bson(&self, oid: &str) -> EjdbResult<bool> {
        let mut c_oid = oid_from_str(oid)?;

        let native = self.db.native();
        // Safety: collection live; oid is valid for the call.
        let removed = unsafe { (native.api().ejdbrmbson)(self.as_ptr(), &mut c_oid) };
        match native.check() {
            Ok(()) => {}
            Err(err) if err.code() == Some(TCENOREC) => return Ok(false),
            Err(err) => return Err(err),
        }

        trace!(collection = %self.name, %oid, removed, "removed record");
        Ok(removed)
    }

    /// Returns every record matching `filter` or any of `or_filters`.
    ///
    /// The query object is created, executed and released within the call.
    pub fn find<'a, D>(&self, filter: D, or_filters: &[D]) -> EjdbResult<Vec<Vec<u8>>>
    where
        D: Into<Doc<'a>> + Copy,
    {
        let query = self.db.create_query(filter, or_filters)?;
        query.execute(self)
    }

    /// Returns the first record matching `filter` or any of `or_filters`.
    pub fn find_one<'a, D>(&self, filter: D, or_filters: &[D]) -> EjdbResult<Option<Vec<u8>>>
    where
        D: Into<Doc<'a>> + Copy,
    {
        let query = self.db.create_query(filter, or_filters)?;
        query.execute_one(self)
    }

    /// Counts records matching `filter` or any of `or_filters`.
    pub fn count<'a, D>(&self, filter: D, or_filters: &[D]) -> EjdbResult<u32>
    where
        D: Into<Doc<'a>> + Copy,
    {
        let query = self.db.create_query(filter, or_filters)?;
        query.count(self)
    }

    /// Applies the update operators embedded in `filter` (`$set`, `$inc`,
    /// `$addToSet`, `$dropall`, ...) to every matching record.
    ///
    /// Returns the number of affected records. Runs as a count-mode query
    /// rather than through `ejdbupdate`, whose OR filters must be a packed
    /// array of native `bson` structs; the engine applies the operators the
    /// same way in both paths.
    pub fn update<'a, D>(&self, filter: D, or_filters: &[D]) -> EjdbResult<u32>
    where
        D: Into<Doc<'a>> + Copy,
    {
        let query = self.db.create_query(filter, or_filters)?;
        let updated = query.count(self)?;
        debug!(collection = %self.name, updated, "updated records");
        Ok(updated)
    }

    /// Creates, drops, rebuilds or optimizes an index on a field path.
    ///
    /// ```rust,ignore
    /// coll.set_index("album.number", IndexFlags::STR | IndexFlags::NUM)?;
    /// coll.set_index("album.tags", IndexFlags::ARR | IndexFlags::REBUILD)?;
    /// coll.set_index("album.number", IndexFlags::DROP | IndexFlags::NUM)?;
    /// ```
    pub fn set_index(&self, path: &str, flags: IndexFlags) -> EjdbResult<()> {
        let c_path = CString::new(path)?;
        let native = self.db.native();
        // Safety: collection live, path NUL terminated.
        let ok = unsafe { (native.api().ejdbsetindex)(self.as_ptr(), c_path.as_ptr(), flags.bits()) };
        if !ok {
            return Err(native.failure(TCEINVALID, "ejdbsetindex"));
        }
        debug!(collection = %self.name, path, ?flags, "set index");
        Ok(())
    }

    /// Begins a transaction on this collection.
    pub fn begin_transaction(&self) -> EjdbResult<()> {
        self.transaction_call("ejdbtranbegin", |api, coll| unsafe { (api.ejdbtranbegin)(coll) })
    }

    /// Commits the active transaction.
    pub fn commit_transaction(&self) -> EjdbResult<()> {
        self.transaction_call("ejdbtrancommit", |api, coll| unsafe { (api.ejdbtrancommit)(coll) })
    }

    /// Aborts the active transaction, discarding its changes.
    pub fn abort_transaction(&self) -> EjdbResult<()> {
        self.transaction_call("ejdbtranabort", |api, coll| unsafe { (api.ejdbtranabort)(coll) })
    }

    fn transaction_call(
        &self,
        call: &'static str,
        f: impl FnOnce(&EjdbApi, *mut EJCOLL) -> bool,
    ) -> EjdbResult<()> {
        let native = self.db.native();
        if !f(native.api(), self.as_ptr()) {
            return Err(native.failure(TCEINVALID, call));
        }
        debug!(collection = %self.name, call, "transaction control");
        Ok(())
    }

    /// Returns true if a transaction is active on this collection.
    pub fn is_transaction_active(&self) -> EjdbResult<bool> {
        let mut active = false;
        let native = self.db.native();
        // Safety: collection live; `active` is a valid out pointer.
        let ok = unsafe { (native.api().ejdbtranstatus)(self.as_ptr(), &mut active) };
        if !ok {
            return Err(native.failure(TCEINVALID, "ejdbtranstatus"));
        }
        Ok(active)
    }

    /// Flushes the collection to the storage device.
    pub fn sync(&self) -> EjdbResult<()> {
        let native = self.db.native();
        // Safety: collection live.
        if unsafe { (native.api().ejdbsyncoll)(self.as_ptr()) } {
            Ok(())
        } else {
            Err(native.failure(TCEMISC, "ejdbsyncoll"))
        }
    }
}

impl std::fmt::Debug for EjColl<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EjColl").field("name", &self.name).finish()
    }
}
