//! Observer registration and the will/did notification scope.
//!
//! Observers attach per row and are dispatched synchronously, inline,
//! on the owning thread. Every mutating accessor runs inside
//! [`notified`]: `will_change` fires before storage is touched, the
//! mutation executes, and `did_change` fires afterward even when the
//! mutation fails, so observers always see a matched pair.

use crate::{
    error::AccessError,
    obs::{self, ObsEvent},
    store::{Store, StoreInner},
    types::{RowId, TableIx},
};
use std::{
    collections::HashMap,
    rc::Rc,
    sync::Weak,
};

///
/// Observer
///

pub trait Observer {
    fn will_change(&self, event: &ChangeEvent);
    fn did_change(&self, event: &ChangeEvent);
}

///
/// ChangeEvent
///
/// Describes one logical mutation. Collection events carry the
/// affected index set, computed before storage was touched.
///

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub row: RowId,
    pub property: String,
    pub kind: ChangeKind,
}

///
/// ChangeKind
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChangeKind {
    Scalar,
    List(ListChange),
}

///
/// ListChange
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ListChange {
    Insert { index: usize, count: usize },
    Remove { index: usize, count: usize },
    Replace { indices: Vec<usize> },
    Clear { count: usize },
    Assign { old_len: usize, new_len: usize },
}

///
/// ObservationRegistry
///
/// Per-row listener lists for one store. An entry exists only while at
/// least one listener is attached; it is dropped when the last token
/// releases or the row is deleted.
///

#[derive(Default)]
pub(crate) struct ObservationRegistry {
    next_token: u64,
    rows: HashMap<(TableIx, RowId), Vec<Registration>>,
}

struct Registration {
    token: u64,
    observer: Rc<dyn Observer>,
}

impl ObservationRegistry {
    pub(crate) fn attach(
        &mut self,
        table: TableIx,
        row: RowId,
        observer: Rc<dyn Observer>,
    ) -> u64 {
        let token = self.next_token;
        self.next_token += 1;

        self.rows
            .entry((table, row))
            .or_default()
            .push(Registration { token, observer });

        token
    }

    pub(crate) fn detach(&mut self, table: TableIx, row: RowId, token: u64) {
        if let Some(list) = self.rows.get_mut(&(table, row)) {
            list.retain(|reg| reg.token != token);
            if list.is_empty() {
                self.rows.remove(&(table, row));
            }
        }
    }

    /// Snapshot of the listeners for one row. Dispatch iterates the
    /// snapshot, so a listener detaching mid-callback is tolerated.
    pub(crate) fn snapshot(&self, table: TableIx, row: RowId) -> Vec<Rc<dyn Observer>> {
        self.rows
            .get(&(table, row))
            .map(|list| list.iter().map(|reg| reg.observer.clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn remove_row(&mut self, table: TableIx, row: RowId) {
        self.rows.remove(&(table, row));
    }

    #[cfg(test)]
    pub(crate) fn is_observed(&self, table: TableIx, row: RowId) -> bool {
        self.rows.contains_key(&(table, row))
    }
}

///
/// ObserverToken
///
/// Deregistration handle returned by `Store::observe`. Dropping it (or
/// calling [`release`](Self::release)) detaches the listener.
///

pub struct ObserverToken {
    store: Weak<StoreInner>,
    table: TableIx,
    row: RowId,
    token: u64,
}

impl ObserverToken {
    pub(crate) const fn new(store: Weak<StoreInner>, table: TableIx, row: RowId, token: u64) -> Self {
        Self {
            store,
            table,
            row,
            token,
        }
    }

    /// Detach the listener now.
    pub fn release(self) {}
}

impl Drop for ObserverToken {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner
                .observers
                .borrow_mut()
                .detach(self.table, self.row, self.token);
        }
    }
}

///
/// NOTIFICATION SCOPE
///

/// Run a mutation inside a will/did pair for the given row.
///
/// With no listener registered this degrades to calling `f` directly.
/// `did_change` fires before a failure propagates, so a pair is
/// matched on both the success and the failure path.
pub(crate) fn notified<T>(
    store: &Store,
    table: TableIx,
    row: RowId,
    event: &ChangeEvent,
    f: impl FnOnce() -> Result<T, AccessError>,
) -> Result<T, AccessError> {
    let observers = store.observers_snapshot(table, row);
    if observers.is_empty() {
        return f();
    }

    for observer in &observers {
        observer.will_change(event);
    }

    let out = f();

    for observer in &observers {
        observer.did_change(event);
    }
    obs::record(ObsEvent::NotifyPair);

    out
}

///
/// TESTS
///
