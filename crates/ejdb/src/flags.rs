//! Open mode, index and query flag sets.

use bitflags::bitflags;
use std::ffi::c_int;

bitflags! {
    /// Database open mode passed to `ejdbopen`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenMode: c_int {
        /// Open as a reader.
        const READER = ejdb_sys::JBOREADER;
        /// Open as a writer.
        const WRITER = ejdb_sys::JBOWRITER;
        /// Create the database if it does not exist.
        const CREATE = ejdb_sys::JBOCREAT;
        /// Truncate an existing database.
        const TRUNCATE = ejdb_sys::JBOTRUNC;
        /// Open without file locking.
        const NO_LOCK = ejdb_sys::JBONOLCK;
        /// Lock without blocking.
        const LOCK_NB = ejdb_sys::JBOLCKNB;
        /// Sync every transaction to the device.
        const SYNC = ejdb_sys::JBOTSYNC;
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::WRITER | Self::CREATE
    }
}

bitflags! {
    /// Index types and operations passed to `ejdbsetindex`.
    ///
    /// A field path may carry several index types at once. Combine a type
    /// with an operation to act on that index only, e.g.
    /// `IndexFlags::DROP | IndexFlags::NUM` drops the number index.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IndexFlags: c_int {
        /// Drop the index of the given type.
        const DROP = ejdb_sys::JBIDXDROP;
        /// Drop indexes of every type.
        const DROP_ALL = ejdb_sys::JBIDXDROPALL;
        /// Optimize the index B+ tree file.
        const OPTIMIZE = ejdb_sys::JBIDXOP;
        /// Rebuild the index.
        const REBUILD = ejdb_sys::JBIDXREBLD;
        /// Index for number values.
        const NUM = ejdb_sys::JBIDXNUM;
        /// Index for string values.
        const STR = ejdb_sys::JBIDXSTR;
        /// Token index for arrays and string values.
        const ARR = ejdb_sys::JBIDXARR;
        /// Case insensitive string index.
        const ISTR = ejdb_sys::JBIDXISTR;
    }
}

impl IndexFlags {
    /// The index type bits of this set.
    pub fn index_types(self) -> Self {
        self & (Self::NUM | Self::STR | Self::ARR | Self::ISTR)
    }

    /// The operation bits of this set.
    pub fn operations(self) -> Self {
        self & (Self::DROP | Self::DROP_ALL | Self::OPTIMIZE | Self::REBUILD)
    }
}

bitflags! {
    /// Search mode flags passed to `ejdbqryexecute`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueryFlags: c_int {
        /// Only count matching records.
        const COUNT = ejdb_sys::JBQRYCOUNT;
        /// Stop at the first match.
        const FIND_ONE = ejdb_sys::JBQRYFINDONE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_open_mode() {
        let mode = OpenMode::default();
        assert!(mode.contains(OpenMode::WRITER));
        assert!(mode.contains(OpenMode::CREATE));
        assert!(!mode.contains(OpenMode::TRUNCATE));
        assert_eq!(mode.bits(), ejdb_sys::JBOWRITER | ejdb_sys::JBOCREAT);
    }

    #[test]
    fn index_flags_split() {
        let flags = IndexFlags::DROP | IndexFlags::NUM | IndexFlags::STR;
        assert_eq!(flags.index_types(), IndexFlags::NUM | IndexFlags::STR);
        assert_eq!(flags.operations(), IndexFlags::DROP);
        assert_eq!(flags.bits(), ejdb_sys::JBIDXDROP | ejdb_sys::JBIDXNUM | ejdb_sys::JBIDXSTR);
    }

    #[test]
    fn query_flags_bits() {
        assert_eq!(QueryFlags::COUNT.bits(), 1);
        assert_eq!(QueryFlags::FIND_ONE.bits(), 2);
        assert_eq!(QueryFlags::empty().bits(), 0);
    }
}
