//! Link-list collections and the derived linking-objects view.
//!
//! A `LinkCollection` is a transient view bound to one (row, column)
//! pair; it holds no storage of its own and can be re-created on
//! demand. Mutations run under the same thread/transaction discipline
//! as scalar writes, with the affected index set computed before
//! storage is touched.

use crate::{
    access,
    error::AccessError,
    lifecycle::{GraphContext, ResolveMode, resolve_link},
    notify::{ChangeEvent, ChangeKind, ListChange, notified},
    obs::{self, ObsEvent},
    object::RecordInstance,
    schema::ObjectSchema,
    store::Store,
    types::{ColIx, RowId, TableIx},
    value::Value,
};
use std::{ops::Range, sync::Arc};

///
/// LinkCollection
///

#[derive(Debug)]
pub struct LinkCollection {
    store: Store,
    schema: Arc<ObjectSchema>,
    prop_index: usize,
    table: TableIx,
    row: RowId,
    col: ColIx,
    target: TableIx,
}

impl LinkCollection {
    pub(crate) const fn new(
        store: Store,
        schema: Arc<ObjectSchema>,
        prop_index: usize,
        table: TableIx,
        row: RowId,
        col: ColIx,
        target: TableIx,
    ) -> Self {
        Self {
            store,
            schema,
            prop_index,
            table,
            row,
            col,
            target,
        }
    }

    fn prop_name(&self) -> &str {
        self.schema.property_at(self.prop_index).name()
    }

    fn check_read(&self) -> Result<(), AccessError> {
        self.store.check_thread()?;
        if !self.store.is_attached(self.table, self.row) {
            return Err(AccessError::invalidated(self.schema.name()));
        }

        Ok(())
    }

    fn check_write(&self) -> Result<(), AccessError> {
        self.store.check_thread()?;
        self.store.check_write(self.schema.name())?;
        if !self.store.is_attached(self.table, self.row) {
            return Err(AccessError::invalidated(self.schema.name()));
        }

        Ok(())
    }

    fn event(&self, change: ListChange) -> ChangeEvent {
        ChangeEvent {
            row: self.row,
            property: self.prop_name().to_string(),
            kind: ChangeKind::List(change),
        }
    }

    fn engine_len(&self) -> Result<usize, AccessError> {
        self.store
            .with_engine(|e| e.list_len(self.table, self.row, self.col))
            .map_err(|e| AccessError::from_engine(self.schema.name(), self.prop_name(), &e))
    }

    fn out_of_range(&self, index: usize, len: usize) -> AccessError {
        AccessError::index_out_of_range(self.schema.name(), self.prop_name(), index, len)
    }

    /// Resolve one element to a row of the target table. Null is not a
    /// valid list element.
    fn resolve_one(
        &self,
        value: &Value,
        mode: ResolveMode,
        ctx: &mut GraphContext,
    ) -> Result<RowId, AccessError> {
        resolve_link(&self.store, self.target, value, mode, ctx)?.ok_or_else(|| {
            AccessError::type_mismatch(self.schema.name(), self.prop_name(), "object", "null")
        })
    }

    ///
    /// READ SURFACE
    ///

    pub fn len(&self) -> Result<usize, AccessError> {
        self.check_read()?;
        self.engine_len()
    }

    pub fn is_empty(&self) -> Result<bool, AccessError> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, index: usize) -> Result<RecordInstance, AccessError> {
        self.check_read()?;

        let len = self.engine_len()?;
        if index >= len {
            return Err(self.out_of_range(index, len));
        }

        let target_row = self
            .store
            .with_engine(|e| e.list_get(self.table, self.row, self.col, index))
            .map_err(|e| AccessError::from_engine(self.schema.name(), self.prop_name(), &e))?;

        Ok(access::managed_target(&self.store, self.target, target_row))
    }

    /// Snapshot the collection into instances, in order.
    pub fn to_vec(&self) -> Result<Vec<RecordInstance>, AccessError> {
        self.check_read()?;

        let len = self.engine_len()?;
        let mut out = Vec::with_capacity(len);
        for index in 0..len {
            let target_row = self
                .store
                .with_engine(|e| e.list_get(self.table, self.row, self.col, index))
                .map_err(|e| AccessError::from_engine(self.schema.name(), self.prop_name(), &e))?;
            out.push(access::managed_target(&self.store, self.target, target_row));
        }

        Ok(out)
    }

    ///
    /// MUTATION SURFACE
    ///

    /// Append, equivalent to inserting at `len()`.
    pub fn add(&self, value: Value) -> Result<(), AccessError> {
        self.check_write()?;
        let len = self.engine_len()?;
        self.insert_at(value, len)
    }

    /// Insert at `index`, valid for `0 <= index <= len()`.
    pub fn insert(&self, value: Value, index: usize) -> Result<(), AccessError> {
        self.check_write()?;
        let len = self.engine_len()?;
        if index > len {
            return Err(self.out_of_range(index, len));
        }

        self.insert_at(value, index)
    }

    fn insert_at(&self, value: Value, index: usize) -> Result<(), AccessError> {
        let event = self.event(ListChange::Insert { index, count: 1 });

        notified(&self.store, self.table, self.row, &event, || {
            let mut ctx = GraphContext::default();
            let target = self.resolve_one(&value, ResolveMode::Promote, &mut ctx)?;
            self.store
                .with_engine_mut(|e| e.list_insert(self.table, self.row, self.col, index, target))
                .map_err(|e| AccessError::from_engine(self.schema.name(), self.prop_name(), &e))
        })?;

        obs::record(ObsEvent::ListMutation);
        Ok(())
    }

    pub fn remove(&self, index: usize) -> Result<(), AccessError> {
        self.check_write()?;
        let len = self.engine_len()?;
        if index >= len {
            return Err(self.out_of_range(index, len));
        }

        let event = self.event(ListChange::Remove { index, count: 1 });
        notified(&self.store, self.table, self.row, &event, || {
            self.store
                .with_engine_mut(|e| e.list_erase(self.table, self.row, self.col, index))
                .map_err(|e| AccessError::from_engine(self.schema.name(), self.prop_name(), &e))
        })?;

        obs::record(ObsEvent::ListMutation);
        Ok(())
    }

    /// Remove a contiguous range, reported as one removal.
    pub fn remove_range(&self, range: Range<usize>) -> Result<(), AccessError> {
        self.check_write()?;
        let len = self.engine_len()?;
        if range.start > range.end || range.end > len {
            return Err(self.out_of_range(range.end, len));
        }

        let count = range.end - range.start;
        let event = self.event(ListChange::Remove {
            index: range.start,
            count,
        });

        notified(&self.store, self.table, self.row, &event, || {
            for _ in 0..count {
                self.store
                    .with_engine_mut(|e| {
                        e.list_erase(self.table, self.row, self.col, range.start)
                    })
                    .map_err(|e| {
                        AccessError::from_engine(self.schema.name(), self.prop_name(), &e)
                    })?;
            }
            Ok(())
        })?;

        obs::record(ObsEvent::ListMutation);
        Ok(())
    }

    pub fn remove_all(&self) -> Result<(), AccessError> {
        self.check_write()?;
        let len = self.engine_len()?;

        let event = self.event(ListChange::Clear { count: len });
        notified(&self.store, self.table, self.row, &event, || {
            self.store
                .with_engine_mut(|e| e.list_clear(self.table, self.row, self.col))
                .map_err(|e| AccessError::from_engine(self.schema.name(), self.prop_name(), &e))
        })?;

        obs::record(ObsEvent::ListMutation);
        Ok(())
    }

    /// Remove-and-insert at one index, reported as a single
    /// replacement.
    pub fn replace(&self, index: usize, value: Value) -> Result<(), AccessError> {
        self.check_write()?;
        let len = self.engine_len()?;
        if index >= len {
            return Err(self.out_of_range(index, len));
        }

        let event = self.event(ListChange::Replace {
            indices: vec![index],
        });

        notified(&self.store, self.table, self.row, &event, || {
            let mut ctx = GraphContext::default();
            let target = self.resolve_one(&value, ResolveMode::Promote, &mut ctx)?;
            self.store
                .with_engine_mut(|e| e.list_set(self.table, self.row, self.col, index, target))
                .map_err(|e| AccessError::from_engine(self.schema.name(), self.prop_name(), &e))
        })?;

        obs::record(ObsEvent::ListMutation);
        Ok(())
    }

    /// Swap two entries, reported as one replacement covering both
    /// indices.
    pub fn exchange(&self, left: usize, right: usize) -> Result<(), AccessError> {
        self.check_write()?;
        let len = self.engine_len()?;
        if left >= len || right >= len {
            return Err(self.out_of_range(left.max(right), len));
        }

        let event = self.event(ListChange::Replace {
            indices: vec![left, right],
        });

        notified(&self.store, self.table, self.row, &event, || {
            self.store
                .with_engine_mut(|e| e.list_swap(self.table, self.row, self.col, left, right))
                .map_err(|e| AccessError::from_engine(self.schema.name(), self.prop_name(), &e))
        })?;

        obs::record(ObsEvent::ListMutation);
        Ok(())
    }

    /// Replace every entry with the same resolved value, as one
    /// replacement covering the whole index set.
    pub fn set_all(&self, value: Value) -> Result<(), AccessError> {
        self.check_write()?;
        let len = self.engine_len()?;

        let event = self.event(ListChange::Replace {
            indices: (0..len).collect(),
        });

        notified(&self.store, self.table, self.row, &event, || {
            let mut ctx = GraphContext::default();
            let target = self.resolve_one(&value, ResolveMode::Promote, &mut ctx)?;
            for index in 0..len {
                self.store
                    .with_engine_mut(|e| {
                        e.list_set(self.table, self.row, self.col, index, target)
                    })
                    .map_err(|e| {
                        AccessError::from_engine(self.schema.name(), self.prop_name(), &e)
                    })?;
            }
            Ok(())
        })?;

        obs::record(ObsEvent::ListMutation);
        Ok(())
    }

    /// Replace the whole collection from a foreign sequence.
    ///
    /// All-or-nothing: every element is resolved before the collection
    /// is cleared, so a failing element leaves it untouched.
    pub fn assign(&self, values: Vec<Value>) -> Result<(), AccessError> {
        let mut ctx = GraphContext::default();
        self.assign_with_mode(values, ResolveMode::Promote, &mut ctx)
    }

    pub(crate) fn assign_with_mode(
        &self,
        values: Vec<Value>,
        mode: ResolveMode,
        ctx: &mut GraphContext,
    ) -> Result<(), AccessError> {
        self.check_write()?;

        let mut resolved = Vec::with_capacity(values.len());
        for value in &values {
            resolved.push(self.resolve_one(value, mode, ctx)?);
        }

        self.assign_resolved(resolved)
    }

    pub(crate) fn assign_resolved(&self, rows: Vec<RowId>) -> Result<(), AccessError> {
        self.check_write()?;
        let old_len = self.engine_len()?;

        let event = self.event(ListChange::Assign {
            old_len,
            new_len: rows.len(),
        });

        notified(&self.store, self.table, self.row, &event, || {
            self.store
                .with_engine_mut(|e| e.list_clear(self.table, self.row, self.col))
                .map_err(|e| AccessError::from_engine(self.schema.name(), self.prop_name(), &e))?;

            for (index, target) in rows.iter().enumerate() {
                self.store
                    .with_engine_mut(|e| {
                        e.list_insert(self.table, self.row, self.col, index, *target)
                    })
                    .map_err(|e| {
                        AccessError::from_engine(self.schema.name(), self.prop_name(), &e)
                    })?;
            }

            Ok(())
        })?;

        obs::record(ObsEvent::ListMutation);
        Ok(())
    }
}

///
/// ReverseLinkView
///
/// Derived, read-only, lazily materialized set of rows holding a
/// forward link to the current row. No independent storage: every
/// call asks the engine's backlink surface afresh.
///

pub struct ReverseLinkView {
    store: Store,
    schema: Arc<ObjectSchema>,
    origin_table: TableIx,
    origin_col: ColIx,
    row: RowId,
}

impl ReverseLinkView {
    pub(crate) const fn new(
        store: Store,
        schema: Arc<ObjectSchema>,
        origin_table: TableIx,
        origin_col: ColIx,
        row: RowId,
    ) -> Self {
        Self {
            store,
            schema,
            origin_table,
            origin_col,
            row,
        }
    }

    fn rows(&self) -> Result<Vec<RowId>, AccessError> {
        self.store.check_thread()?;

        self.store
            .with_engine(|e| e.backlinks(self.origin_table, self.origin_col, self.row))
            .map_err(|e| AccessError::from_engine(self.schema.name(), "", &e))
    }

    pub fn len(&self) -> Result<usize, AccessError> {
        Ok(self.rows()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, AccessError> {
        Ok(self.rows()?.is_empty())
    }

    pub fn to_vec(&self) -> Result<Vec<RecordInstance>, AccessError> {
        Ok(self
            .rows()?
            .into_iter()
            .map(|row| access::managed_target(&self.store, self.origin_table, row))
            .collect())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AccessErrorKind,
        test_support::{RecordingObserver, open_store},
    };
    use std::rc::Rc;

    fn person_with_pets(store: &Store, names: &[&str]) -> RecordInstance {
        store
            .write(|| {
                let pets = names
                    .iter()
                    .map(|n| Value::record([("name", Value::Text((*n).to_string()))]))
                    .collect();
                store.create(
                    "Person",
                    Value::record([
                        ("name", Value::Text("Ada".into())),
                        ("pets", Value::List(pets)),
                    ]),
                    false,
                )
            })
            .unwrap()
    }

    fn pet_names(person: &RecordInstance) -> Vec<String> {
        person
            .list("pets")
            .unwrap()
            .to_vec()
            .unwrap()
            .iter()
            .map(|pet| match pet.get("name").unwrap() {
                Value::Text(s) => s,
                other => panic!("pet name should be text, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn insert_at_len_is_append() {
        let store = open_store();
        let person = person_with_pets(&store, &["a"]);
        let pets = person.list("pets").unwrap();

        store
            .write(|| pets.insert(Value::record([("name", Value::Text("b".into()))]), 1))
            .unwrap();

        assert_eq!(pet_names(&person), vec!["a", "b"]);
    }

    #[test]
    fn insert_past_len_fails_and_leaves_collection_unchanged() {
        let store = open_store();
        let person = person_with_pets(&store, &["a"]);
        let pets = person.list("pets").unwrap();

        let err = store
            .write(|| pets.insert(Value::record([("name", Value::Text("x".into()))]), 5))
            .unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::IndexOutOfRange);

        assert_eq!(pet_names(&person), vec!["a"]);
    }

    #[test]
    fn remove_and_remove_range_shift_left() {
        let store = open_store();
        let person = person_with_pets(&store, &["a", "b", "c", "d"]);
        let pets = person.list("pets").unwrap();

        store.write(|| pets.remove(0)).unwrap();
        assert_eq!(pet_names(&person), vec!["b", "c", "d"]);

        store.write(|| pets.remove_range(1..3)).unwrap();
        assert_eq!(pet_names(&person), vec!["b"]);

        let err = store.write(|| pets.remove(1)).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::IndexOutOfRange);
    }

    #[test]
    fn replace_and_exchange_report_single_replacements() {
        let store = open_store();
        let person = person_with_pets(&store, &["a", "b"]);
        let pets = person.list("pets").unwrap();

        let observer = Rc::new(RecordingObserver::default());
        let _token = store.observe(&person, observer.clone()).unwrap();

        store
            .write(|| pets.replace(0, Value::record([("name", Value::Text("z".into()))])))
            .unwrap();
        store.write(|| pets.exchange(0, 1)).unwrap();

        assert_eq!(pet_names(&person), vec!["b", "z"]);

        observer.assert_paired();
        assert_eq!(
            observer.kinds(),
            vec![
                ChangeKind::List(ListChange::Replace { indices: vec![0] }),
                ChangeKind::List(ListChange::Replace { indices: vec![0, 1] }),
            ]
        );
    }

    #[test]
    fn set_all_replaces_every_index_with_one_pair() {
        let store = open_store();
        let person = person_with_pets(&store, &["a", "b", "c"]);
        let pets = person.list("pets").unwrap();
        let first = pets.get(0).unwrap();

        let observer = Rc::new(RecordingObserver::default());
        let _token = store.observe(&person, observer.clone()).unwrap();

        store
            .write(|| pets.set_all(Value::Object(first.clone())))
            .unwrap();

        assert_eq!(pet_names(&person), vec!["a", "a", "a"]);
        observer.assert_paired();
        assert_eq!(observer.pair_count(), 1);
    }

    #[test]
    fn remove_all_clears_with_one_pair() {
        let store = open_store();
        let person = person_with_pets(&store, &["a", "b"]);
        let pets = person.list("pets").unwrap();

        let observer = Rc::new(RecordingObserver::default());
        let _token = store.observe(&person, observer.clone()).unwrap();

        store.write(|| pets.remove_all()).unwrap();

        assert_eq!(pets.len().unwrap(), 0);
        assert_eq!(
            observer.kinds(),
            vec![ChangeKind::List(ListChange::Clear { count: 2 })]
        );
    }

    #[test]
    fn assign_replaces_contents_in_source_order() {
        let store = open_store();
        let person = person_with_pets(&store, &["a", "b"]);
        let pets = person.list("pets").unwrap();

        store
            .write(|| {
                pets.assign(vec![
                    Value::record([("name", Value::Text("x".into()))]),
                    Value::record([("name", Value::Text("y".into()))]),
                    Value::record([("name", Value::Text("z".into()))]),
                ])
            })
            .unwrap();

        assert_eq!(pet_names(&person), vec!["x", "y", "z"]);
    }

    #[test]
    fn assign_is_all_or_nothing_on_bad_elements() {
        let store = open_store();
        let person = person_with_pets(&store, &["a", "b"]);
        let pets = person.list("pets").unwrap();

        let err = store
            .write(|| {
                pets.assign(vec![
                    Value::record([("name", Value::Text("x".into()))]),
                    Value::Int(42),
                ])
            })
            .unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::TypeMismatch);

        // the failing element aborted before the collection was touched
        assert_eq!(pet_names(&person), vec!["a", "b"]);
    }

    #[test]
    fn list_mutations_require_a_write_transaction() {
        let store = open_store();
        let person = person_with_pets(&store, &[]);
        let pets = person.list("pets").unwrap();

        let err = pets
            .add(Value::record([("name", Value::Text("x".into()))]))
            .unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::NotInWriteTransaction);
    }

    #[test]
    fn reverse_link_view_tracks_forward_links_lazily() {
        let store = open_store();
        let person = person_with_pets(&store, &["rex"]);
        let pets = person.list("pets").unwrap();
        let rex = pets.get(0).unwrap();

        let owners = rex.backlinks("owners").unwrap();
        assert_eq!(owners.len().unwrap(), 1);
        assert_eq!(owners.to_vec().unwrap()[0], person);

        // removing the forward link empties the derived view
        store.write(|| pets.remove(0)).unwrap();
        assert!(owners.is_empty().unwrap());
    }

    #[test]
    fn insert_events_carry_precomputed_indices() {
        let store = open_store();
        let person = person_with_pets(&store, &["a"]);
        let pets = person.list("pets").unwrap();

        let observer = Rc::new(RecordingObserver::default());
        let _token = store.observe(&person, observer.clone()).unwrap();

        store
            .write(|| pets.add(Value::record([("name", Value::Text("b".into()))])))
            .unwrap();

        assert_eq!(
            observer.kinds(),
            vec![ChangeKind::List(ListChange::Insert { index: 1, count: 1 })]
        );
    }
}
