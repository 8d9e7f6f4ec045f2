//! Flag and error code constants from `ejdb.h` and Tokyo Cabinet.

use std::ffi::c_int;

// Open modes for `ejdbopen`.

/// Open as a reader.
pub const JBOREADER: c_int = 1 << 0;
/// Open as a writer.
pub const JBOWRITER: c_int = 1 << 1;
/// Create the database if it does not exist.
pub const JBOCREAT: c_int = 1 << 2;
/// Truncate the database on open.
pub const JBOTRUNC: c_int = 1 << 3;
/// Open without file locking.
pub const JBONOLCK: c_int = 1 << 4;
/// Lock without blocking.
pub const JBOLCKNB: c_int = 1 << 5;
/// Synchronize every transaction with the storage device.
pub const JBOTSYNC: c_int = 1 << 6;

// Index modes and types for `ejdbsetindex`.

/// Drop the index of the given type.
pub const JBIDXDROP: c_int = 1 << 0;
/// Drop indexes of all types.
pub const JBIDXDROPALL: c_int = 1 << 1;
/// Optimize the index.
pub const JBIDXOP: c_int = 1 << 2;
/// Rebuild the index.
pub const JBIDXREBLD: c_int = 1 << 3;
/// Number index.
pub const JBIDXNUM: c_int = 1 << 4;
/// String index.
pub const JBIDXSTR: c_int = 1 << 5;
/// Array token index.
pub const JBIDXARR: c_int = 1 << 6;
/// Case insensitive string index.
pub const JBIDXISTR: c_int = 1 << 7;

// Query search mode flags for `ejdbqryexecute`.

/// Only count matching records.
pub const JBQRYCOUNT: c_int = 1;
/// Fetch the first matching record only.
pub const JBQRYFINDONE: c_int = 1 << 1;

// Tokyo Cabinet error codes shared by the engine.

/// Success.
pub const TCESUCCESS: c_int = 0;
/// Threading error.
pub const TCETHREAD: c_int = 1;
/// Invalid operation.
pub const TCEINVALID: c_int = 2;
/// File not found.
pub const TCENOFILE: c_int = 3;
/// No permission.
pub const TCENOPERM: c_int = 4;
/// Invalid meta data.
pub const TCEMETA: c_int = 5;
/// Open error.
pub const TCEOPEN: c_int = 7;
/// Close error.
pub const TCECLOSE: c_int = 8;
/// Sync error.
pub const TCESYNC: c_int = 10;
/// Existing record.
pub const TCEKEEP: c_int = 21;
/// No record found.
pub const TCENOREC: c_int = 22;
/// Miscellaneous error.
pub const TCEMISC: c_int = 9999;

// EJDB specific error codes.

/// Invalid collection name.
pub const JBEINVALIDCOLNAME: c_int = 9000;
/// Invalid BSON object.
pub const JBEINVALIDBSON: c_int = 9001;
/// Invalid BSON `_id` field.
pub const JBEINVALIDBSONPK: c_int = 9002;
/// Invalid query control field starting with `$`.
pub const JBEQINVALIDQCONTROL: c_int = 9003;
/// `$in`, `$nin`, `$bt` or `$strand`/`$stror` argument is not an array.
pub const JBEQINOPNOTARRAY: c_int = 9004;
/// Inconsistent database metadata.
pub const JBEMETANVALID: c_int = 9005;
/// Invalid field path value.
pub const JBEFPATHINVALID: c_int = 9006;
/// Invalid query regexp value.
pub const JBEQINVALIDQRX: c_int = 9007;
/// Result set sorting error.
pub const JBEQRSSORTING: c_int = 9008;
/// Query generic error.
pub const JBEQERROR: c_int = 9009;
/// Updating failed.
pub const JBEQUPDFAILED: c_int = 9010;
/// Only one `$elemMatch` allowed per field.
pub const JBEQONEEMATCH: c_int = 9011;
/// `$fields` hint cannot mix include and exclude.
pub const JBEQINCEXCL: c_int = 9012;
/// Action key in `$do` block can only be one of `$join`.
pub const JBEQACTKEY: c_int = 9013;
/// Exceeded the maximum number of collections.
pub const JBEMAXNUMCOLS: c_int = 9014;
/// EJDB export/import error.
pub const JBEEI: c_int = 9015;
/// JSON parsing failed.
pub const JBEEJSONPARSE: c_int = 9016;
/// BSON size is too big.
pub const JBETOOBIGBSON: c_int = 9017;
/// Invalid ejdb command specified.
pub const JBEINVALIDCMD: c_int = 9018;

/// Maximum length of a collection name.
pub const JBMAXCOLNAMELEN: usize = 128;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_type_bits_do_not_overlap_operations() {
        let ops = JBIDXDROP | JBIDXDROPALL | JBIDXOP | JBIDXREBLD;
        let types = JBIDXNUM | JBIDXSTR | JBIDXARR | JBIDXISTR;
        assert_eq!(ops & types, 0);
        assert_eq!(ops | types, 0xff);
    }

    #[test]
    fn query_flags_distinct() {
        assert_ne!(JBQRYCOUNT, JBQRYFINDONE);
        assert_eq!(JBQRYCOUNT & JBQRYFINDONE, 0);
    }
}
