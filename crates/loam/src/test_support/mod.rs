//! Shared fixtures for core tests: a small person/pet schema set, an
//! account schema with a primary key, and a recording observer that
//! asserts will/did pairing.

use crate::{
    notify::{ChangeEvent, ChangeKind, Observer},
    schema::{IntWidth, ObjectSchema, PropertyDescriptor, PropertyKind},
    store::Store,
    value::Value,
};
use std::cell::RefCell;

///
/// SCHEMAS
///

/// Person: name, age, score (optional), pets (link-list of Pet), dog
/// (optional link to Pet).
pub(crate) fn person_schema() -> ObjectSchema {
    ObjectSchema::new(
        "Person",
        vec![
            PropertyDescriptor::new("name", PropertyKind::Text),
            PropertyDescriptor::new("age", PropertyKind::Int(IntWidth::W64)),
            PropertyDescriptor::new("score", PropertyKind::Float64).optional(),
            PropertyDescriptor::new(
                "pets",
                PropertyKind::List {
                    target: "Pet".into(),
                },
            ),
            PropertyDescriptor::new(
                "dog",
                PropertyKind::Object {
                    target: "Pet".into(),
                },
            )
            .optional(),
        ],
    )
    .unwrap()
    .with_default("name", Value::Text("anon".into()))
    .unwrap()
    .with_default("age", Value::Int(0))
    .unwrap()
}

/// Pet: name plus a linking-objects view over Person.pets.
pub(crate) fn pet_schema() -> ObjectSchema {
    ObjectSchema::new(
        "Pet",
        vec![
            PropertyDescriptor::new("name", PropertyKind::Text),
            PropertyDescriptor::new(
                "owners",
                PropertyKind::LinkingObjects {
                    target: "Person".into(),
                    origin_property: "pets".into(),
                },
            ),
        ],
    )
    .unwrap()
    .with_default("name", Value::Text("".into()))
    .unwrap()
}

/// Account: integer primary key plus a balance and an optional note.
pub(crate) fn account_schema() -> ObjectSchema {
    ObjectSchema::new(
        "Account",
        vec![
            PropertyDescriptor::new("id", PropertyKind::Int(IntWidth::W64)).primary_key(),
            PropertyDescriptor::new("balance", PropertyKind::Int(IntWidth::W64)),
            PropertyDescriptor::new("note", PropertyKind::Text).optional(),
        ],
    )
    .unwrap()
    .with_default("balance", Value::Int(0))
    .unwrap()
}

/// Open an in-memory store with the full fixture schema set.
pub(crate) fn open_store() -> Store {
    Store::open_in_memory(vec![person_schema(), pet_schema(), account_schema()]).unwrap()
}

///
/// RecordingObserver
///
/// Captures each will/did callback and checks pairing: every `did`
/// must close the `will` that preceded it for the same event.
///

#[derive(Default)]
pub(crate) struct RecordingObserver {
    pub(crate) events: RefCell<Vec<(Phase, ChangeEvent)>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Phase {
    Will,
    Did,
}

impl RecordingObserver {
    /// Number of completed will/did pairs.
    pub(crate) fn pair_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|(phase, _)| *phase == Phase::Did)
            .count()
    }

    /// Assert the log is a sequence of matched will/did pairs over
    /// identical events.
    pub(crate) fn assert_paired(&self) {
        let events = self.events.borrow();
        assert!(events.len() % 2 == 0, "unmatched will/did: {events:?}");

        for pair in events.chunks(2) {
            assert_eq!(pair[0].0, Phase::Will, "pair must open with will: {pair:?}");
            assert_eq!(pair[1].0, Phase::Did, "pair must close with did: {pair:?}");
            assert_eq!(pair[0].1, pair[1].1, "will/did event mismatch: {pair:?}");
        }
    }

    pub(crate) fn kinds(&self) -> Vec<ChangeKind> {
        self.events
            .borrow()
            .iter()
            .filter(|(phase, _)| *phase == Phase::Did)
            .map(|(_, event)| event.kind.clone())
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn will_change(&self, event: &ChangeEvent) {
        self.events.borrow_mut().push((Phase::Will, event.clone()));
    }

    fn did_change(&self, event: &ChangeEvent) {
        self.events.borrow_mut().push((Phase::Did, event.clone()));
    }
}
