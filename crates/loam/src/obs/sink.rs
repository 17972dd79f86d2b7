//! Event sink boundary.
//!
//! Accessor logic MUST NOT touch obs::metrics directly. All
//! instrumentation flows through ObsEvent and ObsSink, so tests can
//! observe events without global state and embedders can redirect them.

use crate::obs::metrics;
use std::{cell::RefCell, rc::Rc};

///
/// ObsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObsEvent {
    ScalarRead,
    ScalarWrite,
    ListMutation,
    LinkResolved,
    RowCreated,
    RowUpdated,
    RowDeleted,
    RowPromoted,
    NotifyPair,
    CoercionFailure,
}

///
/// ObsSink
///

pub trait ObsSink {
    fn record(&self, event: ObsEvent);
}

///
/// GlobalSink
/// Default sink that writes into the thread-local counter state.
/// Acts as the concrete sink when no scoped override is installed.
///

struct GlobalSink;

impl ObsSink for GlobalSink {
    fn record(&self, event: ObsEvent) {
        metrics::with_state_mut(|c| {
            let slot = match event {
                ObsEvent::ScalarRead => &mut c.scalar_reads,
                ObsEvent::ScalarWrite => &mut c.scalar_writes,
                ObsEvent::ListMutation => &mut c.list_mutations,
                ObsEvent::LinkResolved => &mut c.links_resolved,
                ObsEvent::RowCreated => &mut c.rows_created,
                ObsEvent::RowUpdated => &mut c.rows_updated,
                ObsEvent::RowDeleted => &mut c.rows_deleted,
                ObsEvent::RowPromoted => &mut c.rows_promoted,
                ObsEvent::NotifyPair => &mut c.notify_pairs,
                ObsEvent::CoercionFailure => &mut c.coercion_failures,
            };
            *slot = slot.saturating_add(1);
        });
    }
}

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn ObsSink>>> = const { RefCell::new(None) };
}

pub(crate) fn record(event: ObsEvent) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GlobalSink.record(event),
    }
}

/// Run a closure with a temporary sink override.
///
/// The previous sink is restored on all exits, including unwind.
pub fn with_sink<T>(sink: Rc<dyn ObsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn ObsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = self.0.take();
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// TESTS
///
