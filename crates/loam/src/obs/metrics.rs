use serde::Serialize;
use std::cell::RefCell;

///
/// Counters
///
/// Accessor-layer counter state. Snapshot with [`report`], clear with
/// [`reset`]. All counters saturate rather than wrap.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Counters {
    pub scalar_reads: u64,
    pub scalar_writes: u64,
    pub list_mutations: u64,
    pub links_resolved: u64,
    pub rows_created: u64,
    pub rows_updated: u64,
    pub rows_deleted: u64,
    pub rows_promoted: u64,
    pub notify_pairs: u64,
    pub coercion_failures: u64,
}

thread_local! {
    static STATE: RefCell<Counters> = RefCell::new(Counters::default());
}

pub(crate) fn with_state_mut<T>(f: impl FnOnce(&mut Counters) -> T) -> T {
    STATE.with(|cell| f(&mut cell.borrow_mut()))
}

/// Snapshot the current counter state.
#[must_use]
pub fn report() -> Counters {
    STATE.with(|cell| cell.borrow().clone())
}

/// Reset all counters to zero.
pub fn reset() {
    STATE.with(|cell| *cell.borrow_mut() = Counters::default());
}

///
/// TESTS
///
