//! Database handle.

use crate::collection::EjColl;
use crate::config::{CollOptions, Config};
use crate::error::{EjdbError, EjdbResult};
use crate::flags::OpenMode;
use crate::marshal::{bson_to_document, NativeBson};
use ejdb_sys::{EjdbApi, EJCOLLOPTS, EJDB, TCEMISC, TCEOPEN, TCESUCCESS};
use parking_lot::{Mutex, MutexGuard};
use std::ffi::{c_int, CStr, CString};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

static NATIVE_API: OnceLock<Result<Arc<EjdbApi>, (String, String)>> = OnceLock::new();

/// Returns the process-wide native entry point table, loading `libejdb`
/// on first use.
pub fn native_api() -> EjdbResult<Arc<EjdbApi>> {
    let loaded = NATIVE_API.get_or_init(|| {
        EjdbApi::load_default()
            .map(Arc::new)
            .map_err(|e| (e.subject().to_owned(), e.to_string()))
    });

    match loaded {
        Ok(api) => Ok(Arc::clone(api)),
        Err((subject, message)) => Err(EjdbError::LibraryLoad {
            subject: subject.clone(),
            message: message.clone(),
        }),
    }
}

/// An open EJDB database.
///
/// `Ejdb` owns one native `EJDB*`. It is released exactly once, by
/// [`Ejdb::close`] or on drop. Collections and queries borrow the handle,
/// so none of them can outlive it.
///
/// The engine keeps a single last-error slot per handle. Every native call
/// made through this handle, together with the error read that follows it,
/// runs under one lock, so concurrent callers never observe each other's
/// error codes.
///
/// # Example
///
/// ```rust,ignore
/// use ejdb::{Ejdb, OpenMode};
///
/// let db = Ejdb::open("addressbook", OpenMode::WRITER | OpenMode::CREATE)?;
/// let contacts = db.create_coll("contacts", None)?;
/// let oid = contacts.save_json(r#"{"name": "Bruce", "phone": "333-222-333"}"#)?;
/// let found = contacts.find(r#"{"name": {"$begin": "Bru"}}"#, &[])?;
/// db.close()?;
/// ```
pub struct Ejdb {
    api: Arc<EjdbApi>,
    ptr: NonNull<EJDB>,
    path: PathBuf,
    mode: OpenMode,
    coll_options: Option<CollOptions>,
    lock: Mutex<()>,
    released: bool,
}

// Safety: every call through `ptr` is serialized by `lock`.
unsafe impl Send for Ejdb {}
unsafe impl Sync for Ejdb {}

impl Ejdb {
    /// Opens a database using the process-wide native library.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> EjdbResult<Self> {
        Self::open_with_config(path, &Config::new().mode(mode))
    }

    /// Opens a database with explicit configuration.
    pub fn open_with_config(path: impl AsRef<Path>, config: &Config) -> EjdbResult<Self> {
        let api = match &config.library_path {
            Some(library) => Arc::new(EjdbApi::load(library)?),
            None => native_api()?,
        };
        Self::open_inner(api, path.as_ref(), config)
    }

    /// Opens a database through a caller-supplied entry point table.
    pub fn open_with_api(
        api: Arc<EjdbApi>,
        path: impl AsRef<Path>,
        mode: OpenMode,
    ) -> EjdbResult<Self> {
        Self::open_inner(api, path.as_ref(), &Config::new().mode(mode))
    }

    fn open_inner(api: Arc<EjdbApi>, path: &Path, config: &Config) -> EjdbResult<Self> {
        let c_path = path_to_cstring(path)?;

        // Safety: ejdbnew has no preconditions.
        let raw = unsafe { (api.ejdbnew)() };
        let ptr = NonNull::new(raw).ok_or(EjdbError::Allocation {
            what: "database handle",
        })?;

        // From here on the handle is owned by `db`, so any early return
        // releases it through Drop.
        let db = Self {
            api,
            ptr,
            path: path.to_path_buf(),
            mode: config.mode,
            coll_options: config.coll_options,
            lock: Mutex::new(()),
            released: false,
        };

        let native = db.native();
        // Safety: the handle is live and the path is NUL terminated.
        let opened = unsafe { (db.api.ejdbopen)(ptr.as_ptr(), c_path.as_ptr(), config.mode.bits()) };
        if !opened {
            let err = native.failure(TCEOPEN, "ejdbopen");
            drop(native);
            return Err(err);
        }
        drop(native);

        debug!(path = %db.path.display(), mode = ?db.mode, "opened database");
        Ok(db)
    }

    /// Closes the database and releases the native handle.
    pub fn close(mut self) -> EjdbResult<()> {
        let result = self.release();
        debug!(path = %self.path.display(), ok = result.is_ok(), "closed database");
        result
    }

    fn release(&mut self) -> EjdbResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let ptr = self.ptr.as_ptr();
        // Safety: the handle is live until ejdbdel below, and this runs once.
        unsafe {
            let result = if (self.api.ejdbisopen)(ptr) && !(self.api.ejdbclose)(ptr) {
                Err(self.last_error_or(TCEMISC, "ejdbclose"))
            } else {
                Ok(())
            };
            (self.api.ejdbdel)(ptr);
            result
        }
    }

    /// Returns true if the native database is open.
    pub fn is_open(&self) -> bool {
        let _guard = self.lock.lock();
        // Safety: the handle is live while `self` exists.
        unsafe { (self.api.ejdbisopen)(self.ptr.as_ptr()) }
    }

    /// Returns the path this database was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the mode this database was opened with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Returns the native entry point table.
    pub fn api(&self) -> &EjdbApi {
        &self.api
    }

    /// Gets or creates a collection.
    ///
    /// `options` only apply when the collection is created; when `None`,
    /// the defaults from [`Config::coll_options`] are used.
    pub fn create_coll(&self, name: &str, options: Option<&CollOptions>) -> EjdbResult<EjColl<'_>> {
        let c_name = CString::new(name)?;
        let mut native_opts = options
            .copied()
            .or(self.coll_options)
            .map(CollOptions::to_native);
        let opts_ptr: *mut EJCOLLOPTS = match native_opts.as_mut() {
            Some(opts) => opts,
            None => ptr::null_mut(),
        };

        let native = self.native();
        // Safety: handle live, name NUL terminated, opts null or valid.
        let raw = unsafe { (self.api.ejdbcreatecoll)(native.db_ptr(), c_name.as_ptr(), opts_ptr) };
        match NonNull::new(raw) {
            Some(coll) => {
                debug!(collection = name, "opened collection");
                Ok(EjColl::new(self, coll, name))
            }
            None => Err(native.failure(TCEMISC, "ejdbcreatecoll")),
        }
    }

    /// Gets an existing collection, or `None` if it does not exist.
    pub fn get_coll(&self, name: &str) -> EjdbResult<Option<EjColl<'_>>> {
        let c_name = CString::new(name)?;
        let native = self.native();
        // Safety: handle live, name NUL terminated.
        let raw = unsafe { (self.api.ejdbgetcoll)(native.db_ptr(), c_name.as_ptr()) };
        native.check()?;
        Ok(NonNull::new(raw).map(|coll| EjColl::new(self, coll, name)))
    }

    /// Removes a collection, optionally unlinking its files.
    ///
    /// Takes `&mut self` so no collection handle can be alive while the
    /// native collection is freed.
    pub fn rm_coll(&mut self, name: &str, unlink_file: bool) -> EjdbResult<()> {
        let c_name = CString::new(name)?;
        let native = self.native();
        // Safety: handle live, name NUL terminated.
        let removed = unsafe { (self.api.ejdbrmcoll)(native.db_ptr(), c_name.as_ptr(), unlink_file) };
        if !removed {
            return Err(native.failure(TCEMISC, "ejdbrmcoll"));
        }
        debug!(collection = name, unlink_file, "removed collection");
        Ok(())
    }

    /// Flushes every collection to the storage device.
    pub fn sync(&self) -> EjdbResult<()> {
        let native = self.native();
        // Safety: handle live.
        if unsafe { (self.api.ejdbsyncdb)(native.db_ptr()) } {
            Ok(())
        } else {
            Err(native.failure(TCEMISC, "ejdbsyncdb"))
        }
    }

    /// Returns the database metadata document (file, collections, indexes).
    pub fn meta(&self) -> EjdbResult<bson::Document> {
        let native = self.native();
        // Safety: handle live; the returned object is owned by us.
        let meta = unsafe { NativeBson::from_raw(&self.api, (self.api.ejdbmeta)(native.db_ptr())) };
        let Some(meta) = meta else {
            return Err(native.failure(ejdb_sys::JBEMETANVALID, "ejdbmeta"));
        };
        let bytes = meta.to_vec();
        drop(meta);
        drop(native);
        bson_to_document(&bytes)
    }

    /// Returns the engine's version string.
    pub fn version(&self) -> String {
        // Safety: ejdbversion returns a static string.
        unsafe { c_string_or((self.api.ejdbversion)(), "unknown") }
    }

    /// Asks the engine whether `oid` is a valid OID string.
    pub fn is_valid_oid_str(&self, oid: &str) -> bool {
        let Ok(c_oid) = CString::new(oid) else {
            return false;
        };
        // Safety: NUL terminated string.
        unsafe { (self.api.ejdbisvalidoidstr)(c_oid.as_ptr()) }
    }

    /// Converts the engine's last error into a structured error.
    ///
    /// Returns `Ok(())` when the last call on this handle succeeded.
    pub fn check_error(&self) -> EjdbResult<()> {
        self.native().check()
    }

    /// Locks the handle for one native call and its error read.
    pub(crate) fn native(&self) -> NativeCall<'_> {
        NativeCall {
            db: self,
            _guard: self.lock.lock(),
        }
    }

    /// Reads the last-error slot. Callers must hold the handle lock.
    fn last_error(&self) -> EjdbResult<()> {
        // Safety: the handle is live while `self` exists.
        let code = unsafe { (self.api.ejdbecode)(self.ptr.as_ptr()) };
        if code == TCESUCCESS {
            return Ok(());
        }
        Err(EjdbError::native(code, self.error_message(code)))
    }

    fn last_error_or(&self, fallback: c_int, call: &str) -> EjdbError {
        match self.last_error() {
            Err(err) => err,
            Ok(()) => EjdbError::native(fallback, format!("{call} failed")),
        }
    }

    fn error_message(&self, code: c_int) -> String {
        // Safety: ejdberrmsg returns a static string for any code.
        unsafe { c_string_or((self.api.ejdberrmsg)(code), "unknown error") }
    }
}

impl Drop for Ejdb {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(path = %self.path.display(), error = %err, "failed to close database on drop");
        }
    }
}

impl std::fmt::Debug for Ejdb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ejdb")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

/// A locked section around one native call on a database handle.
pub(crate) struct NativeCall<'db> {
    db: &'db Ejdb,
    _guard: MutexGuard<'db, ()>,
}

impl<'db> NativeCall<'db> {
    pub(crate) fn api(&self) -> &'db EjdbApi {
        &self.db.api
    }

    pub(crate) fn db_ptr(&self) -> *mut EJDB {
        self.db.ptr.as_ptr()
    }

    /// Converts the last error of the call just made, if any.
    pub(crate) fn check(&self) -> EjdbResult<()> {
        self.db.last_error()
    }

    /// Builds the error for a call that signalled failure through its
    /// return value, falling back to `code` when the engine left no error.
    pub(crate) fn failure(&self, code: c_int, call: &str) -> EjdbError {
        self.db.last_error_or(code, call)
    }
}

/// Copies a static C string, or returns `fallback` when it is null.
unsafe fn c_string_or(ptr: *const std::ffi::c_char, fallback: &str) -> String {
    if ptr.is_null() {
        fallback.to_owned()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

#[cfg(unix)]
fn path_to_cstring(path: &Path) -> EjdbResult<CString> {
    use std::os::unix::ffi::OsStrExt;
    Ok(CString::new(path.as_os_str().as_bytes())?)
}

#[cfg(not(unix))]
fn path_to_cstring(path: &Path) -> EjdbResult<CString> {
    Ok(CString::new(path.to_string_lossy().as_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_with_nul_is_rejected() {
        let err = path_to_cstring(Path::new("db\0name")).unwrap_err();
        assert!(matches!(err, EjdbError::Nul(_)));
    }

    #[test]
    fn plain_path_converts() {
        let c_path = path_to_cstring(Path::new("/tmp/addressbook")).unwrap();
        assert_eq!(c_path.to_str().unwrap(), "/tmp/addressbook");
    }

    #[test]
    fn null_c_string_uses_fallback() {
        let s = unsafe { c_string_or(std::ptr::null(), "unknown") };
        assert_eq!(s, "unknown");
    }
}
