//! Query objects and result sets.

use crate::collection::EjColl;
use crate::database::Ejdb;
use crate::error::{EjdbError, EjdbResult};
use crate::flags::QueryFlags;
use crate::marshal::{copy_native_buffer, Doc, NativeBson};
use bson::{Bson, Document};
use ejdb_sys::{EjdbApi, EJQ, EJQRESULT, JBEQERROR};
use std::ffi::c_int;
use std::ptr::{self, NonNull};
use tracing::{debug, trace};

impl Ejdb {
    /// Creates a query from a filter document and optional OR alternatives.
    ///
    /// The returned query must not outlive the database; it is released on
    /// drop or with [`EjQuery::del`]. If any OR filter is rejected, the
    /// partially built query is released before the error is returned.
    ///
    /// Supported filter operators are those of the engine: field equality,
    /// `$not`, `$begin`, `$gt`/`$gte`/`$lt`/`$lte`, `$bt`, `$in`/`$nin`,
    /// `$strand`/`$stror`, `$exists`, `$icase`, `$elemMatch`, the update
    /// operators `$set`, `$upsert`, `$inc`, `$dropall`, `$addToSet`,
    /// `$addToSetAll`, `$pull`, `$pullAll`, and joins through
    /// `{"$do": {"fpath": {"$join": "collection"}}}`.
    ///
    /// `$not` and `$nin` never use an index, and at most one index is used
    /// per query.
    pub fn create_query<'a, D>(&self, filter: D, or_filters: &[D]) -> EjdbResult<EjQuery<'_>>
    where
        D: Into<Doc<'a>> + Copy,
    {
        let filter = filter.into().to_bson()?;
        let qobj = NativeBson::from_bytes(self.api(), &filter)?;

        let mut query = {
            let native = self.native();
            // Safety: handle and qobj are live; the engine copies qobj.
            let raw = unsafe {
                (native.api().ejdbcreatequery)(
                    native.db_ptr(),
                    qobj.as_ptr(),
                    ptr::null_mut(),
                    0,
                    ptr::null_mut(),
                )
            };
            match NonNull::new(raw) {
                Some(ptr) => EjQuery { db: self, ptr },
                None => return Err(native.failure(JBEQERROR, "ejdbcreatequery")),
            }
        };
        drop(qobj);

        for or_filter in or_filters {
            query.add_or(*or_filter)?;
        }

        trace!(or_filters = or_filters.len(), "created query");
        Ok(query)
    }
}

/// A native query object.
///
/// Lifecycle: created by [`Ejdb::create_query`], optionally configured with
/// [`EjQuery::add_or`] and [`EjQuery::set_hints`], executed any number of
/// times, then released exactly once by [`EjQuery::del`] or on drop.
pub struct EjQuery<'db> {
    db: &'db Ejdb,
    ptr: NonNull<EJQ>,
}

// Safety: the query is only touched under its database handle's lock.
unsafe impl Send for EjQuery<'_> {}

impl<'db> EjQuery<'db> {
    /// Adds an OR alternative to the query.
    pub fn add_or<'a>(&mut self, filter: impl Into<Doc<'a>>) -> EjdbResult<()> {
        let bytes = filter.into().to_bson()?;
        let native = self.db.native();
        // Safety: handle and query live; the engine copies the document.
        let raw = unsafe {
            (native.api().ejdbqueryaddor)(native.db_ptr(), self.ptr.as_ptr(), bytes.as_ptr().cast())
        };
        if raw.is_null() {
            return Err(native.failure(JBEQERROR, "ejdbqueryaddor"));
        }
        Ok(())
    }

    /// Installs a hints document (`$orderby`, `$max`, `$skip`, `$fields`).
    ///
    /// ```rust,ignore
    /// query.set_hints(r#"{"$orderby": {"field1": 1, "field2": -1}, "$fields": {"field1": 1}}"#)?;
    /// ```
    pub fn set_hints<'a>(&mut self, hints: impl Into<Doc<'a>>) -> EjdbResult<()> {
        let bytes = hints.into().to_bson()?;
        let native = self.db.native();
        // Safety: handle and query live; the engine copies the document.
        let raw = unsafe {
            (native.api().ejdbqueryhints)(native.db_ptr(), self.ptr.as_ptr(), bytes.as_ptr().cast())
        };
        if raw.is_null() {
            return Err(native.failure(JBEQERROR, "ejdbqueryhints"));
        }
        Ok(())
    }

    /// Installs hints built with [`QueryHints`].
    pub fn apply_hints(&mut self, hints: &QueryHints) -> EjdbResult<()> {
        self.set_hints(&hints.to_document())
    }

    /// Runs the query and returns every matching record.
    pub fn execute(&self, coll: &EjColl<'_>) -> EjdbResult<Vec<Vec<u8>>> {
        let (result, _) = self.run(coll, QueryFlags::empty())?;
        Ok(result.into_vec())
    }

    /// Runs the query and returns the first matching record, if any.
    pub fn execute_one(&self, coll: &EjColl<'_>) -> EjdbResult<Option<Vec<u8>>> {
        let (result, count) = self.run(coll, QueryFlags::FIND_ONE)?;
        if count == 0 {
            return Ok(None);
        }
        Ok(result.get(0))
    }

    /// Runs the query in count-only mode.
    ///
    /// Update operators in the query are applied, and the count is the
    /// number of affected records.
    pub fn count(&self, coll: &EjColl<'_>) -> EjdbResult<u32> {
        let (_, count) = self.run(coll, QueryFlags::COUNT)?;
        Ok(count)
    }

    fn run(&self, coll: &EjColl<'_>, flags: QueryFlags) -> EjdbResult<(QueryResult<'db>, u32)> {
        if !ptr::eq(coll.db(), self.db) {
            return Err(EjdbError::ForeignHandle);
        }

        let native = self.db.native();
        let api = native.api();
        let mut count: u32 = 0;
        // Safety: collection and query are live; count is a valid out pointer.
        let raw = unsafe {
            (api.ejdbqryexecute)(
                coll.as_ptr(),
                self.ptr.as_ptr(),
                &mut count,
                flags.bits(),
                ptr::null_mut(),
            )
        };
        // Take ownership first so the set is disposed on the error path too.
        let result = QueryResult { api, raw };
        native.check()?;

        trace!(collection = coll.name(), ?flags, count, "executed query");
        Ok((result, count))
    }

    /// Releases the native query.
    pub fn del(self) {
        drop(self);
    }
}

impl Drop for EjQuery<'_> {
    fn drop(&mut self) {
        let _guard = self.db.native();
        // Safety: we own the query and release it exactly once.
        unsafe { (self.db.api().ejdbquerydel)(self.ptr.as_ptr()) };
        debug!("released query");
    }
}

impl std::fmt::Debug for EjQuery<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EjQuery").field("ptr", &self.ptr).finish()
    }
}

/// A native result set, disposed on drop.
struct QueryResult<'api> {
    api: &'api EjdbApi,
    raw: EJQRESULT,
}

impl QueryResult<'_> {
    fn len(&self) -> usize {
        if self.raw.is_null() {
            return 0;
        }
        // Safety: raw is a live result set.
        let n = unsafe { (self.api.ejdbqresultnum)(self.raw) };
        usize::try_from(n).unwrap_or(0)
    }

    /// Copies the record at `pos` into host memory.
    fn get(&self, pos: usize) -> Option<Vec<u8>> {
        if pos >= self.len() {
            return None;
        }
        let mut size: c_int = 0;
        // Safety: pos is in bounds; the returned buffer lives until dispose.
        unsafe {
            let data = (self.api.ejdbqresultbsondata)(self.raw, pos as c_int, &mut size);
            if data.is_null() {
                return None;
            }
            Some(copy_native_buffer(data.cast(), size))
        }
    }

    fn into_vec(self) -> Vec<Vec<u8>> {
        (0..self.len()).filter_map(|pos| self.get(pos)).collect()
    }
}

impl Drop for QueryResult<'_> {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            // Safety: we own the result set and dispose it exactly once.
            unsafe { (self.api.ejdbqresultdispose)(self.raw) };
        }
    }
}

/// Sort direction for `$orderby`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// Typed builder for a query hints document.
///
/// ```rust,ignore
/// let hints = QueryHints::new()
///     .order_by("field1", SortOrder::Asc)
///     .order_by("field2", SortOrder::Desc)
///     .include("field1")
///     .max(10);
/// query.apply_hints(&hints)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryHints {
    order_by: Vec<(String, SortOrder)>,
    fields: Vec<(String, bool)>,
    max: Option<u32>,
    skip: Option<u32>,
}

impl QueryHints {
    /// Creates empty hints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sort key. Keys apply in insertion order.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push((field.into(), order));
        self
    }

    /// Limits the result set to `max` records.
    #[must_use]
    pub fn max(mut self, max: u32) -> Self {
        self.max = Some(max);
        self
    }

    /// Skips the first `skip` records.
    #[must_use]
    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Includes `field` in fetched records.
    #[must_use]
    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), true));
        self
    }

    /// Excludes `field` from fetched records.
    #[must_use]
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), false));
        self
    }

    /// Builds the hints document.
    pub fn to_document(&self) -> Document {
        let mut hints = Document::new();
        if !self.order_by.is_empty() {
            let order: Document = self
                .order_by
                .iter()
                .map(|(field, order)| {
                    let dir = match order {
                        SortOrder::Asc => 1,
                        SortOrder::Desc => -1,
                    };
                    (field.clone(), Bson::Int32(dir))
                })
                .collect();
            hints.insert("$orderby", order);
        }
        if let Some(max) = self.max {
            hints.insert("$max", i64::from(max));
        }
        if let Some(skip) = self.skip {
            hints.insert("$skip", i64::from(skip));
        }
        if !self.fields.is_empty() {
            let fields: Document = self
                .fields
                .iter()
                .map(|(field, include)| (field.clone(), Bson::Int32(i32::from(*include))))
                .collect();
            hints.insert("$fields", fields);
        }
        hints
    }
}

impl From<&QueryHints> for Document {
    fn from(hints: &QueryHints) -> Self {
        hints.to_document()
    }
}
