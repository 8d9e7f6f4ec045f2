//! Native entry point table.
//!
//! The engine is resolved at runtime rather than linked with `-lejdb`, so a
//! build never requires the native library to be installed. A missing
//! library is reported when a database is opened.

use crate::error::LoadError;
use crate::types::{bson, bson_oid_t, EJCOLL, EJCOLLOPTS, EJDB, EJQ, EJQRESULT, TCXSTR};
use libloading::Library;
use std::ffi::{c_char, c_int, c_void, OsStr};
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;

/// Environment variable overriding the native library location.
pub const LIBRARY_PATH_ENV: &str = "EJDB_LIBRARY_PATH";

macro_rules! native_fns {
    ($(
        $(#[$meta:meta])*
        fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;
    )*) => {
        /// Function pointers for every native entry point the binding uses.
        ///
        /// Field names match the C symbol names.
        #[derive(Clone, Copy)]
        pub struct EjdbFns {
            $(
                $(#[$meta])*
                pub $name: unsafe extern "C" fn($($ty),*) $(-> $ret)?,
            )*
        }

        impl EjdbFns {
            /// Resolves every entry point from an opened library.
            unsafe fn resolve(library: &Library) -> Result<Self, LoadError> {
                Ok(Self {
                    $(
                        $name: *library
                            .get::<unsafe extern "C" fn($($ty),*) $(-> $ret)?>(
                                concat!(stringify!($name), "\0").as_bytes(),
                            )
                            .map_err(|source| LoadError::Symbol {
                                name: stringify!($name),
                                source,
                            })?,
                    )*
                })
            }
        }
    };
}

native_fns! {
    /// `const char *ejdbversion(void)`
    fn ejdbversion() -> *const c_char;
    /// `const char *ejdberrmsg(int ecode)`
    fn ejdberrmsg(ecode: c_int) -> *const c_char;
    /// `int ejdbecode(EJDB *jb)`
    fn ejdbecode(jb: *mut EJDB) -> c_int;
    /// `EJDB *ejdbnew(void)`
    fn ejdbnew() -> *mut EJDB;
    /// `void ejdbdel(EJDB *jb)`
    fn ejdbdel(jb: *mut EJDB);
    /// `bool ejdbopen(EJDB *jb, const char *path, int mode)`
    fn ejdbopen(jb: *mut EJDB, path: *const c_char, mode: c_int) -> bool;
    /// `bool ejdbclose(EJDB *jb)`
    fn ejdbclose(jb: *mut EJDB) -> bool;
    /// `bool ejdbisopen(EJDB *jb)`
    fn ejdbisopen(jb: *mut EJDB) -> bool;
    /// `EJCOLL *ejdbgetcoll(EJDB *jb, const char *colname)`
    fn ejdbgetcoll(jb: *mut EJDB, colname: *const c_char) -> *mut EJCOLL;
    /// `EJCOLL *ejdbcreatecoll(EJDB *jb, const char *colname, EJCOLLOPTS *opts)`
    fn ejdbcreatecoll(jb: *mut EJDB, colname: *const c_char, opts: *mut EJCOLLOPTS) -> *mut EJCOLL;
    /// `bool ejdbrmcoll(EJDB *jb, const char *colname, bool unlinkfile)`
    fn ejdbrmcoll(jb: *mut EJDB, colname: *const c_char, unlinkfile: bool) -> bool;
    /// `bool ejdbsavebson(EJCOLL *coll, bson *bs, bson_oid_t *oid)`
    fn ejdbsavebson(coll: *mut EJCOLL, bs: *mut bson, oid: *mut bson_oid_t) -> bool;
    /// `bool ejdbsavebson2(EJCOLL *coll, bson *bs, bson_oid_t *oid, bool merge)`
    fn ejdbsavebson2(coll: *mut EJCOLL, bs: *mut bson, oid: *mut bson_oid_t, merge: bool) -> bool;
    /// `bool ejdbrmbson(EJCOLL *coll, bson_oid_t *oid)`
    fn ejdbrmbson(coll: *mut EJCOLL, oid: *mut bson_oid_t) -> bool;
    /// `bson *ejdbloadbson(EJCOLL *coll, const bson_oid_t *oid)`
    fn ejdbloadbson(coll: *mut EJCOLL, oid: *const bson_oid_t) -> *mut bson;
    /// `EJQ *ejdbcreatequery(EJDB *jb, bson *qobj, bson *orqobjs, int orqobjsnum, bson *hints)`
    fn ejdbcreatequery(
        jb: *mut EJDB,
        qobj: *mut bson,
        orqobjs: *mut bson,
        orqobjsnum: c_int,
        hints: *mut bson,
    ) -> *mut EJQ;
    /// `EJQ *ejdbqueryaddor(EJDB *jb, EJQ *q, const void *orbsdata)`
    fn ejdbqueryaddor(jb: *mut EJDB, q: *mut EJQ, orbsdata: *const c_void) -> *mut EJQ;
    /// `EJQ *ejdbqueryhints(EJDB *jb, EJQ *q, const void *hintsbsdata)`
    fn ejdbqueryhints(jb: *mut EJDB, q: *mut EJQ, hintsbsdata: *const c_void) -> *mut EJQ;
    /// `void ejdbquerydel(EJQ *q)`
    fn ejdbquerydel(q: *mut EJQ);
    /// `bool ejdbsetindex(EJCOLL *coll, const char *ipath, int flags)`
    fn ejdbsetindex(coll: *mut EJCOLL, ipath: *const c_char, flags: c_int) -> bool;
    /// `EJQRESULT ejdbqryexecute(EJCOLL *coll, const EJQ *q, uint32_t *count, int qflags, TCXSTR *log)`
    fn ejdbqryexecute(
        coll: *mut EJCOLL,
        q: *const EJQ,
        count: *mut u32,
        qflags: c_int,
        log: *mut TCXSTR,
    ) -> EJQRESULT;
    /// `int ejdbqresultnum(EJQRESULT qr)`
    fn ejdbqresultnum(qr: EJQRESULT) -> c_int;
    /// `const void *ejdbqresultbsondata(EJQRESULT qr, int pos, int *size)`
    fn ejdbqresultbsondata(qr: EJQRESULT, pos: c_int, size: *mut c_int) -> *const c_void;
    /// `void ejdbqresultdispose(EJQRESULT qr)`
    fn ejdbqresultdispose(qr: EJQRESULT);
    /// `bool ejdbsyncoll(EJCOLL *coll)`
    fn ejdbsyncoll(coll: *mut EJCOLL) -> bool;
    /// `bool ejdbsyncdb(EJDB *jb)`
    fn ejdbsyncdb(jb: *mut EJDB) -> bool;
    /// `bool ejdbtranbegin(EJCOLL *coll)`
    fn ejdbtranbegin(coll: *mut EJCOLL) -> bool;
    /// `bool ejdbtrancommit(EJCOLL *coll)`
    fn ejdbtrancommit(coll: *mut EJCOLL) -> bool;
    /// `bool ejdbtranabort(EJCOLL *coll)`
    fn ejdbtranabort(coll: *mut EJCOLL) -> bool;
    /// `bool ejdbtranstatus(EJCOLL *coll, bool *txactive)`
    fn ejdbtranstatus(coll: *mut EJCOLL, txactive: *mut bool) -> bool;
    /// `bson *ejdbmeta(EJDB *jb)`
    fn ejdbmeta(jb: *mut EJDB) -> *mut bson;
    /// `bool ejdbisvalidoidstr(const char *oid)`
    fn ejdbisvalidoidstr(oid: *const c_char) -> bool;
    /// `bson *bson_create_from_buffer(const void *buf, int bufsz)`
    fn bson_create_from_buffer(buf: *const c_void, bufsz: c_int) -> *mut bson;
    /// `void bson_del(bson *b)`
    fn bson_del(b: *mut bson);
    /// `const char *bson_data(const bson *b)`
    fn bson_data(b: *const bson) -> *const c_char;
    /// `int bson_size(const bson *b)`
    fn bson_size(b: *const bson) -> c_int;
}

/// Where an [`EjdbApi`] table came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiSource {
    /// Resolved from a shared library at this path.
    Library(PathBuf),
    /// Built from function pointers supplied by the caller.
    Static,
}

/// A resolved table of native entry points.
///
/// When loaded from a shared library the library stays mapped for as long
/// as the table lives, so the function pointers never dangle.
pub struct EjdbApi {
    fns: EjdbFns,
    source: ApiSource,
    _library: Option<Library>,
}

impl EjdbApi {
    /// Loads `libejdb` from `path` and resolves every entry point.
    pub fn load(path: impl AsRef<OsStr>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        // Safety: loading runs the library's initializers; libejdb has no
        // initializers with preconditions.
        let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Library {
            path: path.to_string_lossy().into_owned(),
            source,
        })?;
        // Safety: the symbol signatures above mirror ejdb.h for EJDB 1.x.
        let fns = unsafe { EjdbFns::resolve(&library)? };

        Ok(Self {
            fns,
            source: ApiSource::Library(PathBuf::from(path)),
            _library: Some(library),
        })
    }

    /// Loads the library named by `EJDB_LIBRARY_PATH`, falling back to the
    /// platform library name (`libejdb.so`, `libejdb.dylib`, `ejdb.dll`).
    pub fn load_default() -> Result<Self, LoadError> {
        match std::env::var_os(LIBRARY_PATH_ENV) {
            Some(path) => Self::load(path),
            None => Self::load(libloading::library_filename("ejdb")),
        }
    }

    /// Builds a table from function pointers, e.g. a statically linked
    /// engine or an in-process test double.
    pub fn from_fns(fns: EjdbFns) -> Self {
        Self {
            fns,
            source: ApiSource::Static,
            _library: None,
        }
    }

    /// Returns where the entry points were resolved from.
    pub fn source(&self) -> &ApiSource {
        &self.source
    }
}

impl Deref for EjdbApi {
    type Target = EjdbFns;

    fn deref(&self) -> &Self::Target {
        &self.fns
    }
}

impl fmt::Debug for EjdbApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EjdbApi")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
