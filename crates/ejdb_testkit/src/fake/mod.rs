//! In-process stand-in for `libejdb`.
//!
//! Exports the same C entry points as the native library, so the binding
//! runs unchanged on top of it. Records live in memory; closing a database
//! stores its collections under the database path for the rest of the
//! calling thread, so reopening the same path sees the same data.
//!
//! Supported: collections and options, `_id` generation and validation,
//! field name checks, the filter operators (joins are accepted but not
//! resolved), OR alternatives, hints, update operators, per-collection
//! transactions, index bookkeeping and metadata.

mod engine;
pub mod leaks;
mod matcher;
mod update;

use ejdb_sys::EjdbFns;

/// Returns the entry point table of the in-process engine.
pub fn fns() -> EjdbFns {
    EjdbFns {
        ejdbversion: engine::ejdbversion,
        ejdberrmsg: engine::ejdberrmsg,
        ejdbecode: engine::ejdbecode,
        ejdbnew: engine::ejdbnew,
        ejdbdel: engine::ejdbdel,
        ejdbopen: engine::ejdbopen,
        ejdbclose: engine::ejdbclose,
        ejdbisopen: engine::ejdbisopen,
        ejdbgetcoll: engine::ejdbgetcoll,
        ejdbcreatecoll: engine::ejdbcreatecoll,
        ejdbrmcoll: engine::ejdbrmcoll,
        ejdbsavebson: engine::ejdbsavebson,
        ejdbsavebson2: engine::ejdbsavebson2,
        ejdbrmbson: engine::ejdbrmbson,
        ejdbloadbson: engine::ejdbloadbson,
        ejdbcreatequery: engine::ejdbcreatequery,
        ejdbqueryaddor: engine::ejdbqueryaddor,
        ejdbqueryhints: engine::ejdbqueryhints,
        ejdbquerydel: engine::ejdbquerydel,
        ejdbsetindex: engine::ejdbsetindex,
        ejdbqryexecute: engine::ejdbqryexecute,
        ejdbqresultnum: engine::ejdbqresultnum,
        ejdbqresultbsondata: engine::ejdbqresultbsondata,
        ejdbqresultdispose: engine::ejdbqresultdispose,
        ejdbsyncoll: engine::ejdbsyncoll,
        ejdbsyncdb: engine::ejdbsyncdb,
        ejdbtranbegin: engine::ejdbtranbegin,
        ejdbtrancommit: engine::ejdbtrancommit,
        ejdbtranabort: engine::ejdbtranabort,
        ejdbtranstatus: engine::ejdbtranstatus,
        ejdbmeta: engine::ejdbmeta,
        ejdbisvalidoidstr: engine::ejdbisvalidoidstr,
        bson_create_from_buffer: engine::bson_create_from_buffer,
        bson_del: engine::bson_del,
        bson_data: engine::bson_data,
        bson_size: engine::bson_size,
    }
}
