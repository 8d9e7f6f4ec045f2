//! Database and collection configuration.

use crate::flags::OpenMode;
use ejdb_sys::{EJCOLLOPTS, LIBRARY_PATH_ENV};
use std::ffi::c_int;
use std::path::PathBuf;

/// Configuration for opening a database.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Open mode passed to the engine.
    pub mode: OpenMode,

    /// Explicit path of the native library. `None` uses the process-wide
    /// default resolution (`EJDB_LIBRARY_PATH`, then the platform name).
    pub library_path: Option<PathBuf>,

    /// Options applied by `create_coll` when none are given explicitly.
    pub coll_options: Option<CollOptions>,
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration whose library path comes from
    /// `EJDB_LIBRARY_PATH`, if set.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            library_path: std::env::var_os(LIBRARY_PATH_ENV).map(PathBuf::from),
            ..Self::default()
        }
    }

    /// Sets the open mode.
    #[must_use]
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the native library path.
    #[must_use]
    pub fn library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Sets default collection options.
    #[must_use]
    pub fn coll_options(mut self, options: CollOptions) -> Self {
        self.coll_options = Some(options);
        self
    }
}

/// Tuning options for a newly created collection.
///
/// Ignored by the engine when the collection already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollOptions {
    /// Collection may grow beyond 2GB.
    pub large: bool,
    /// Compress records with DEFLATE.
    pub compressed: bool,
    /// Expected number of records.
    pub records: i64,
    /// Maximum number of cached records.
    pub cached_records: c_int,
}

impl Default for CollOptions {
    fn default() -> Self {
        let native = EJCOLLOPTS::default();
        Self {
            large: native.large,
            compressed: native.compressed,
            records: native.records,
            cached_records: native.cachedrecords,
        }
    }
}

impl CollOptions {
    /// Creates options with engine defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the large collection flag.
    #[must_use]
    pub const fn large(mut self, value: bool) -> Self {
        self.large = value;
        self
    }

    /// Sets record compression.
    #[must_use]
    pub const fn compressed(mut self, value: bool) -> Self {
        self.compressed = value;
        self
    }

    /// Sets the expected record count.
    #[must_use]
    pub const fn records(mut self, records: i64) -> Self {
        self.records = records;
        self
    }

    /// Sets the record cache size.
    #[must_use]
    pub const fn cached_records(mut self, count: c_int) -> Self {
        self.cached_records = count;
        self
    }

    pub(crate) fn to_native(self) -> EJCOLLOPTS {
        EJCOLLOPTS {
            large: self.large,
            compressed: self.compressed,
            records: self.records,
            cachedrecords: self.cached_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.mode, OpenMode::WRITER | OpenMode::CREATE);
        assert!(config.library_path.is_none());
        assert!(config.coll_options.is_none());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .mode(OpenMode::READER)
            .library_path("/opt/ejdb/lib/libejdb.so")
            .coll_options(CollOptions::new().large(true));

        assert_eq!(config.mode, OpenMode::READER);
        assert_eq!(
            config.library_path.as_deref(),
            Some(std::path::Path::new("/opt/ejdb/lib/libejdb.so"))
        );
        assert!(config.coll_options.unwrap().large);
    }

    #[test]
    fn coll_options_to_native() {
        let native = CollOptions::new()
            .compressed(true)
            .records(1_000)
            .cached_records(64)
            .to_native();

        assert!(!native.large);
        assert!(native.compressed);
        assert_eq!(native.records, 1_000);
        assert_eq!(native.cachedrecords, 64);
    }
}
