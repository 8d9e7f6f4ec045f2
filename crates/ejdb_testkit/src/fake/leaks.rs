//! Live native handle counters.
//!
//! Counters are thread local. The test harness runs every test on its own
//! thread, so parallel tests never see each other's handles.

use std::cell::Cell;

thread_local! {
    static DATABASES: Cell<i64> = const { Cell::new(0) };
    static QUERIES: Cell<i64> = const { Cell::new(0) };
    static RESULTS: Cell<i64> = const { Cell::new(0) };
    static BSONS: Cell<i64> = const { Cell::new(0) };
}

/// Kinds of handle the fake engine hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handle {
    Database,
    Query,
    Result,
    Bson,
}

impl Handle {
    fn with<R>(self, f: impl FnOnce(&Cell<i64>) -> R) -> R {
        match self {
            Handle::Database => DATABASES.with(f),
            Handle::Query => QUERIES.with(f),
            Handle::Result => RESULTS.with(f),
            Handle::Bson => BSONS.with(f),
        }
    }
}

pub(crate) fn acquired(handle: Handle) {
    handle.with(|c| c.set(c.get() + 1));
}

pub(crate) fn released(handle: Handle) {
    handle.with(|c| c.set(c.get() - 1));
}

/// Handles currently alive on this thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveHandles {
    /// `ejdbnew` minus `ejdbdel`.
    pub databases: i64,
    /// `ejdbcreatequery` minus `ejdbquerydel`.
    pub queries: i64,
    /// `ejdbqryexecute` minus `ejdbqresultdispose`.
    pub results: i64,
    /// Native BSON objects minus `bson_del`.
    pub bsons: i64,
}

impl LiveHandles {
    /// Returns true when nothing is alive.
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Takes a snapshot of this thread's live handle counts.
pub fn snapshot() -> LiveHandles {
    LiveHandles {
        databases: DATABASES.with(Cell::get),
        queries: QUERIES.with(Cell::get),
        results: RESULTS.with(Cell::get),
        bsons: BSONS.with(Cell::get),
    }
}
