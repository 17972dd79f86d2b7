pub mod engine;
pub mod memory;

pub use engine::{ColumnSpec, ColumnValue, EngineError, StorageEngine};
pub use memory::MemoryEngine;

use crate::{
    error::{AccessError, SchemaError},
    lifecycle::{self, GraphContext, ResolveMode},
    notify::{ObservationRegistry, Observer, ObserverToken},
    obs::{self, ObsEvent},
    object::{InstanceState, RecordInstance},
    schema::{ObjectSchema, SchemaRegistry},
    types::{RowId, StoreId, TableIx},
    value::Value,
};
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
    sync::Arc,
    thread::{self, ThreadId},
};

///
/// StoreInner
///

pub(crate) struct StoreInner {
    id: StoreId,
    owner: ThreadId,
    engine: RefCell<Box<dyn StorageEngine>>,
    registry: SchemaRegistry,
    write_depth: Cell<u32>,
    pub(crate) observers: RefCell<ObservationRegistry>,
}

///
/// Store
///
/// Handle to one open store: the schema registry, the engine, the
/// write-transaction flag, and the per-row observer registrations.
/// Handles clone cheaply and all share the same open store.
///

#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

// SAFETY:
// Preconditions:
// - Every public entry point calls `check_thread` before touching any
//   interior cell, and fails with `WrongThread` on a mismatch, so the
//   non-Sync interior state is only ever reached from the owner thread.
// - The only fields read before that check are `id` and `owner`, both
//   immutable after construction.
//
// What would break this:
// - Any entry point that borrows `engine`, `observers`, or
//   `write_depth` before the thread check.
// - Handing out references to interior state that outlive a call.
unsafe impl Send for Store {}
unsafe impl Sync for Store {}

impl Store {
    /// Open a store over the given engine, registering one table per
    /// schema in declaration order.
    pub fn open(
        mut engine: Box<dyn StorageEngine>,
        schemas: Vec<ObjectSchema>,
    ) -> Result<Self, SchemaError> {
        let registry = SchemaRegistry::build(schemas)?;

        for index in 0..registry.len() {
            let table = TableIx::new(u32::try_from(index).unwrap_or(u32::MAX));
            engine.add_table(registry.column_specs(table));
        }

        Ok(Self {
            inner: Arc::new(StoreInner {
                id: StoreId::mint(),
                owner: thread::current().id(),
                engine: RefCell::new(engine),
                registry,
                write_depth: Cell::new(0),
                observers: RefCell::new(ObservationRegistry::default()),
            }),
        })
    }

    /// Open a store backed by the in-memory reference engine.
    pub fn open_in_memory(schemas: Vec<ObjectSchema>) -> Result<Self, SchemaError> {
        Self::open(Box::new(MemoryEngine::new()), schemas)
    }

    #[must_use]
    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn schema(&self, name: &str) -> Option<Arc<ObjectSchema>> {
        self.inner.registry.schema_by_name(name).cloned()
    }

    ///
    /// THREAD & TRANSACTION CHECKS
    ///

    /// Verify the calling thread is the one that opened the store.
    pub(crate) fn check_thread(&self) -> Result<(), AccessError> {
        if thread::current().id() == self.inner.owner {
            Ok(())
        } else {
            Err(AccessError::wrong_thread())
        }
    }

    #[must_use]
    pub fn is_in_write_transaction(&self) -> bool {
        self.check_thread().is_ok() && self.inner.write_depth.get() > 0
    }

    /// Open the store's write scope. Nesting is not supported.
    pub fn begin_write(&self) -> Result<(), AccessError> {
        self.check_thread()?;
        if self.inner.write_depth.get() > 0 {
            return Err(AccessError::unsupported(
                "store is already in a write transaction",
            ));
        }

        self.inner.write_depth.set(1);
        Ok(())
    }

    /// Close the store's write scope.
    pub fn commit_write(&self) -> Result<(), AccessError> {
        self.check_thread()?;
        if self.inner.write_depth.get() == 0 {
            return Err(AccessError::not_in_write_transaction("store"));
        }

        self.inner.write_depth.set(0);
        Ok(())
    }

    /// Run a closure inside a write scope. The scope closes on all
    /// exits, including unwind; rollback of partially applied work is
    /// the transaction manager's concern, not this layer's.
    pub fn write<R>(
        &self,
        f: impl FnOnce() -> Result<R, AccessError>,
    ) -> Result<R, AccessError> {
        self.begin_write()?;

        struct Guard<'a>(&'a Store);

        impl Drop for Guard<'_> {
            fn drop(&mut self) {
                self.0.inner.write_depth.set(0);
            }
        }

        let _guard = Guard(self);
        f()
    }

    pub(crate) fn check_write(&self, schema: &str) -> Result<(), AccessError> {
        self.check_thread()?;
        if self.inner.write_depth.get() == 0 {
            return Err(AccessError::not_in_write_transaction(schema));
        }

        Ok(())
    }

    ///
    /// ENGINE PLUMBING
    ///
    /// Engine borrows are scoped to a single call; nothing re-enters
    /// the store while a borrow is held.
    ///

    pub(crate) fn with_engine<T>(&self, f: impl FnOnce(&dyn StorageEngine) -> T) -> T {
        f(self.inner.engine.borrow().as_ref())
    }

    pub(crate) fn with_engine_mut<T>(&self, f: impl FnOnce(&mut dyn StorageEngine) -> T) -> T {
        f(self.inner.engine.borrow_mut().as_mut())
    }

    pub(crate) fn is_attached(&self, table: TableIx, row: RowId) -> bool {
        self.with_engine(|e| e.is_attached(table, row))
    }

    ///
    /// OBSERVATION
    ///

    pub(crate) fn observers_snapshot(
        &self,
        table: TableIx,
        row: RowId,
    ) -> Vec<Rc<dyn Observer>> {
        self.inner.observers.borrow().snapshot(table, row)
    }

    /// Attach a listener to a managed instance's row. The returned
    /// token detaches on drop.
    pub fn observe(
        &self,
        instance: &RecordInstance,
        observer: Rc<dyn Observer>,
    ) -> Result<ObserverToken, AccessError> {
        self.check_thread()?;

        let InstanceState::Managed { store, table, row, schema } = instance.state() else {
            return Err(AccessError::unsupported(
                "only managed objects can be observed",
            ));
        };

        if store.id() != self.id() {
            return Err(AccessError::cross_store_link(schema.name()));
        }
        if !self.is_attached(table, row) {
            return Err(AccessError::invalidated(schema.name()));
        }

        let token = self.inner.observers.borrow_mut().attach(table, row, observer);
        Ok(ObserverToken::new(
            Arc::downgrade(&self.inner),
            table,
            row,
            token,
        ))
    }

    ///
    /// OBJECT SURFACE
    ///

    /// All managed objects of one schema, in row allocation order.
    pub fn objects(&self, schema: &str) -> Result<Vec<RecordInstance>, AccessError> {
        self.check_thread()?;

        let table = self.require_table(schema)?;
        let target = self.inner.registry.schema_by_table(table).clone();

        let rows = self
            .with_engine(|e| e.rows(table))
            .map_err(|e| AccessError::from_engine(schema, "", &e))?;

        Ok(rows
            .into_iter()
            .map(|row| RecordInstance::managed(self.clone(), table, row, target.clone()))
            .collect())
    }

    /// Construct a managed object from a dynamic value, deep-copying
    /// linked values. With `update`, an existing row with the same
    /// primary key is overwritten instead of rejected.
    pub fn create(
        &self,
        schema: &str,
        value: Value,
        update: bool,
    ) -> Result<RecordInstance, AccessError> {
        let table = self.require_table(schema)?;
        self.check_write(schema)?;

        let mut ctx = GraphContext::default();
        let row = lifecycle::resolve_link(self, table, &value, ResolveMode::Create { update }, &mut ctx)?
            .ok_or_else(|| {
                AccessError::type_mismatch(schema, "", "record or object", value.type_name())
            })?;

        let target = self.inner.registry.schema_by_table(table).clone();
        Ok(RecordInstance::managed(self.clone(), table, row, target))
    }

    /// Adopt an unmanaged instance (and its reachable graph) into this
    /// store in place. A no-op for instances already managed here;
    /// instances managed by a different store fail `CrossStoreLink`.
    pub fn promote(&self, instance: &RecordInstance) -> Result<(), AccessError> {
        self.check_thread()?;

        match instance.state() {
            InstanceState::Managed { store, schema, .. } => {
                if store.id() == self.id() {
                    Ok(())
                } else {
                    Err(AccessError::cross_store_link(schema.name()))
                }
            }
            InstanceState::Unmanaged { schema } => {
                let table = self.require_table(schema.name())?;
                self.check_write(schema.name())?;

                let mut ctx = GraphContext::default();
                lifecycle::resolve_link(
                    self,
                    table,
                    &Value::Object(instance.clone()),
                    ResolveMode::Promote,
                    &mut ctx,
                )?;

                Ok(())
            }
        }
    }

    /// Resolve a dynamic value to an existing managed object without
    /// creating anything.
    pub fn resolve_existing(
        &self,
        schema: &str,
        value: Value,
    ) -> Result<RecordInstance, AccessError> {
        self.check_thread()?;
        let table = self.require_table(schema)?;

        let mut ctx = GraphContext::default();
        let row = lifecycle::resolve_link(self, table, &value, ResolveMode::Require, &mut ctx)?
            .ok_or_else(|| {
                AccessError::type_mismatch(schema, "", "record or object", value.type_name())
            })?;

        let target = self.inner.registry.schema_by_table(table).clone();
        Ok(RecordInstance::managed(self.clone(), table, row, target))
    }

    /// Delete a managed object's row. Forward links to it are cleared
    /// engine-side; its observer registration is removed. The handle
    /// survives but every further access fails `InvalidatedAccess`.
    pub fn delete(&self, instance: &RecordInstance) -> Result<(), AccessError> {
        let InstanceState::Managed { store, table, row, schema } = instance.state() else {
            return Err(AccessError::unsupported(
                "cannot delete an unmanaged object",
            ));
        };

        if store.id() != self.id() {
            return Err(AccessError::cross_store_link(schema.name()));
        }
        self.check_write(schema.name())?;
        if !self.is_attached(table, row) {
            return Err(AccessError::invalidated(schema.name()));
        }

        self.with_engine_mut(|e| e.delete_row(table, row))
            .map_err(|e| AccessError::from_engine(schema.name(), "", &e))?;
        self.inner.observers.borrow_mut().remove_row(table, row);
        obs::record(ObsEvent::RowDeleted);

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn is_observed(&self, table: TableIx, row: RowId) -> bool {
        self.inner.observers.borrow().is_observed(table, row)
    }

    fn require_table(&self, schema: &str) -> Result<TableIx, AccessError> {
        self.inner
            .registry
            .table_ix(schema)
            .ok_or_else(|| AccessError::unsupported(format!("store has no schema named '{schema}'")))
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("schemas", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Store {}

///
/// TESTS
///
