//! Type definitions for the native ABI.

use std::fmt;

/// An opaque database handle (`EJDB*`).
///
/// Never dereference or modify directly.
#[repr(C)]
pub struct EJDB {
    _private: [u8; 0],
}

/// An opaque collection handle (`EJCOLL*`).
#[repr(C)]
pub struct EJCOLL {
    _private: [u8; 0],
}

/// An opaque query handle (`EJQ*`).
#[repr(C)]
pub struct EJQ {
    _private: [u8; 0],
}

/// An opaque native BSON object (`bson*`).
///
/// The binding only ever handles it through pointers returned by the
/// native library and reads it through `bson_data`/`bson_size`.
#[repr(C)]
pub struct bson {
    _private: [u8; 0],
}

/// Opaque Tokyo Cabinet list backing a query result set.
#[repr(C)]
pub struct TCLIST {
    _private: [u8; 0],
}

/// Opaque Tokyo Cabinet extensible string, used for query logs.
#[repr(C)]
pub struct TCXSTR {
    _private: [u8; 0],
}

/// A query result set (`EJQRESULT`).
pub type EJQRESULT = *mut TCLIST;

/// Object identifier: 12 raw bytes.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct bson_oid_t {
    /// The raw OID bytes.
    pub bytes: [u8; 12],
}

impl bson_oid_t {
    /// Creates an OID from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self { bytes }
    }

    /// Creates an all-zero OID.
    pub const fn zero() -> Self {
        Self { bytes: [0; 12] }
    }

    /// Returns true if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }
}

impl fmt::Debug for bson_oid_t {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bson_oid_t(")?;
        for b in &self.bytes {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// Collection tuning options passed to `ejdbcreatecoll`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EJCOLLOPTS {
    /// Large collection, may grow beyond 2GB.
    pub large: bool,
    /// Compress records with DEFLATE.
    pub compressed: bool,
    /// Expected number of records.
    pub records: i64,
    /// Maximum number of cached records.
    pub cachedrecords: std::ffi::c_int,
}

impl Default for EJCOLLOPTS {
    fn default() -> Self {
        Self {
            large: false,
            compressed: false,
            records: 128 * 1024,
            cachedrecords: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_layout() {
        assert_eq!(std::mem::size_of::<bson_oid_t>(), 12);
        assert!(bson_oid_t::zero().is_zero());
        assert!(!bson_oid_t::from_bytes([1u8; 12]).is_zero());
    }

    #[test]
    fn oid_debug_is_hex() {
        let oid = bson_oid_t::from_bytes([0xab; 12]);
        assert_eq!(format!("{oid:?}"), format!("bson_oid_t({})", "ab".repeat(12)));
    }

    #[test]
    fn collopts_default() {
        let opts = EJCOLLOPTS::default();
        assert!(!opts.large);
        assert!(!opts.compressed);
        assert_eq!(opts.records, 128 * 1024);
        assert_eq!(opts.cachedrecords, 0);
    }
}
