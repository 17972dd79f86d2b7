//! Record instances: the dynamic object handles.
//!
//! An instance is either unmanaged (values held in in-memory slots,
//! no row binding) or managed (bound to one row of one open store).
//! Promotion rewrites the shared core in place, so every clone of the
//! handle redirects to the new row.

use crate::{
    access,
    collection::{LinkCollection, ReverseLinkView},
    error::AccessError,
    schema::{ObjectSchema, PropertyKind},
    store::Store,
    types::{RowId, TableIx},
    value::{Value, coerce},
};
use std::{cell::RefCell, fmt, rc::Rc, sync::Arc};

///
/// ObjectCore
///

enum ObjectCore {
    Unmanaged {
        schema: Arc<ObjectSchema>,
        slots: Vec<Value>,
    },
    Managed {
        store: Store,
        table: TableIx,
        row: RowId,
        schema: Arc<ObjectSchema>,
    },
}

///
/// InstanceState
/// Cloned-out snapshot of an instance's binding, so callers never hold
/// the core borrow across store calls.
///

pub(crate) enum InstanceState {
    Unmanaged {
        schema: Arc<ObjectSchema>,
    },
    Managed {
        store: Store,
        table: TableIx,
        row: RowId,
        schema: Arc<ObjectSchema>,
    },
}

///
/// RecordInstance
///

#[derive(Clone)]
pub struct RecordInstance {
    core: Rc<RefCell<ObjectCore>>,
}

impl RecordInstance {
    /// Construct a free-standing instance. Slots start from the
    /// schema's default table; lists start empty.
    #[must_use]
    pub fn new(schema: &Arc<ObjectSchema>) -> Self {
        let slots = schema
            .properties()
            .iter()
            .map(|prop| match schema.default_for(prop.name()) {
                Some(default) => default.clone(),
                None if prop.kind().is_list() || prop.kind().is_backlink() => {
                    Value::List(Vec::new())
                }
                None => Value::Null,
            })
            .collect();

        Self {
            core: Rc::new(RefCell::new(ObjectCore::Unmanaged {
                schema: schema.clone(),
                slots,
            })),
        }
    }

    pub(crate) fn managed(
        store: Store,
        table: TableIx,
        row: RowId,
        schema: Arc<ObjectSchema>,
    ) -> Self {
        Self {
            core: Rc::new(RefCell::new(ObjectCore::Managed {
                store,
                table,
                row,
                schema,
            })),
        }
    }

    ///
    /// STATE
    ///

    pub(crate) fn state(&self) -> InstanceState {
        match &*self.core.borrow() {
            ObjectCore::Unmanaged { schema, .. } => InstanceState::Unmanaged {
                schema: schema.clone(),
            },
            ObjectCore::Managed {
                store,
                table,
                row,
                schema,
            } => InstanceState::Managed {
                store: store.clone(),
                table: *table,
                row: *row,
                schema: schema.clone(),
            },
        }
    }

    #[must_use]
    pub fn schema(&self) -> Arc<ObjectSchema> {
        match &*self.core.borrow() {
            ObjectCore::Unmanaged { schema, .. } | ObjectCore::Managed { schema, .. } => {
                schema.clone()
            }
        }
    }

    #[must_use]
    pub fn is_managed(&self) -> bool {
        matches!(&*self.core.borrow(), ObjectCore::Managed { .. })
    }

    /// The owning store, for managed instances.
    #[must_use]
    pub fn store(&self) -> Option<Store> {
        match &*self.core.borrow() {
            ObjectCore::Managed { store, .. } => Some(store.clone()),
            ObjectCore::Unmanaged { .. } => None,
        }
    }

    /// The bound row, for managed instances.
    #[must_use]
    pub fn row(&self) -> Option<RowId> {
        match &*self.core.borrow() {
            ObjectCore::Managed { row, .. } => Some(*row),
            ObjectCore::Unmanaged { .. } => None,
        }
    }

    /// Unmanaged instances are always attached; managed ones only
    /// while their row exists.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        match self.state() {
            InstanceState::Unmanaged { .. } => true,
            InstanceState::Managed {
                store, table, row, ..
            } => store.check_thread().is_ok() && store.is_attached(table, row),
        }
    }

    /// Identity key for graph deduplication of unmanaged instances.
    pub(crate) fn core_ptr(&self) -> usize {
        Rc::as_ptr(&self.core) as usize
    }

    /// Rebind this instance to a freshly created row. All clones of
    /// the handle redirect from here on.
    pub(crate) fn promote_in_place(&self, store: Store, table: TableIx, row: RowId) {
        let schema = self.schema();
        *self.core.borrow_mut() = ObjectCore::Managed {
            store,
            table,
            row,
            schema,
        };
    }

    /// Raw unmanaged slot value by property index, for graph copies.
    pub(crate) fn slot_value(&self, index: usize) -> Option<Value> {
        match &*self.core.borrow() {
            ObjectCore::Unmanaged { slots, .. } => slots.get(index).cloned(),
            ObjectCore::Managed { .. } => None,
        }
    }

    ///
    /// DYNAMIC ACCESS
    ///
    /// By-name entry points re-validate the property name and value on
    /// every call.
    ///

    pub fn get(&self, property: &str) -> Result<Value, AccessError> {
        match self.state() {
            InstanceState::Managed {
                store,
                table,
                row,
                schema,
            } => {
                let (index, _) = schema
                    .property(property)
                    .ok_or_else(|| AccessError::unknown_property(schema.name(), property))?;

                access::read_property(&store, &schema, table, row, index)
            }
            InstanceState::Unmanaged { schema } => {
                let (index, prop) = schema
                    .property(property)
                    .ok_or_else(|| AccessError::unknown_property(schema.name(), property))?;

                let value = self
                    .slot_value(index)
                    .ok_or_else(|| AccessError::invalidated(schema.name()))?;

                // readers narrow integers to the declared width
                Ok(match (prop.kind(), value) {
                    (PropertyKind::Int(width), Value::Int(i)) => Value::Int(width.narrow(i)),
                    (_, value) => value,
                })
            }
        }
    }

    pub fn set(&self, property: &str, value: Value) -> Result<(), AccessError> {
        match self.state() {
            InstanceState::Managed {
                store,
                table,
                row,
                schema,
            } => {
                let (index, _) = schema
                    .property(property)
                    .ok_or_else(|| AccessError::unknown_property(schema.name(), property))?;

                access::write_property(&store, &schema, table, row, index, value)
            }
            InstanceState::Unmanaged { schema } => {
                let (index, prop) = schema
                    .property(property)
                    .ok_or_else(|| AccessError::unknown_property(schema.name(), property))?;

                let validated = coerce::validate_slot(schema.name(), prop, value)?;

                let mut core = self.core.borrow_mut();
                if let ObjectCore::Unmanaged { slots, .. } = &mut *core {
                    slots[index] = validated;
                }

                Ok(())
            }
        }
    }

    /// Add a delta to an integer property in place.
    pub fn increment(&self, property: &str, delta: i64) -> Result<(), AccessError> {
        match self.state() {
            InstanceState::Managed {
                store,
                table,
                row,
                schema,
            } => {
                let (index, _) = schema
                    .property(property)
                    .ok_or_else(|| AccessError::unknown_property(schema.name(), property))?;

                access::increment_property(&store, &schema, table, row, index, delta)
            }
            InstanceState::Unmanaged { schema } => {
                let (index, prop) = schema
                    .property(property)
                    .ok_or_else(|| AccessError::unknown_property(schema.name(), property))?;

                if !matches!(prop.kind(), PropertyKind::Int(_)) {
                    return Err(AccessError::type_mismatch(
                        schema.name(),
                        property,
                        "int",
                        prop.kind().type_name(),
                    ));
                }

                let mut core = self.core.borrow_mut();
                if let ObjectCore::Unmanaged { slots, .. } = &mut *core {
                    let current = slots[index].as_int().unwrap_or_default();
                    slots[index] = Value::Int(current.wrapping_add(delta));
                }

                Ok(())
            }
        }
    }

    /// Live mutable view of a link-list property.
    pub fn list(&self, property: &str) -> Result<LinkCollection, AccessError> {
        match self.state() {
            InstanceState::Managed {
                store,
                table,
                row,
                schema,
            } => {
                let (index, prop) = schema
                    .property(property)
                    .ok_or_else(|| AccessError::unknown_property(schema.name(), property))?;

                let accessor = store.registry().accessors(table).accessor(index).clone();
                match accessor.kind {
                    access::AccessorKind::List { target } => {
                        access::list_collection(&store, &schema, table, row, index, target)
                    }
                    _ => Err(AccessError::type_mismatch(
                        schema.name(),
                        property,
                        "list",
                        prop.kind().type_name(),
                    )),
                }
            }
            InstanceState::Unmanaged { schema } => Err(AccessError::unsupported(format!(
                "list view on '{}.{property}' requires a managed object; set the field value instead",
                schema.name()
            ))),
        }
    }

    /// Read-only linking-objects view of a backlink property.
    pub fn backlinks(&self, property: &str) -> Result<ReverseLinkView, AccessError> {
        match self.state() {
            InstanceState::Managed {
                store,
                table,
                row,
                schema,
            } => {
                let (index, prop) = schema
                    .property(property)
                    .ok_or_else(|| AccessError::unknown_property(schema.name(), property))?;

                let accessor = store.registry().accessors(table).accessor(index).clone();
                match accessor.kind {
                    access::AccessorKind::Backlink {
                        origin_table,
                        origin_col,
                    } => Ok(ReverseLinkView::new(
                        store, schema, origin_table, origin_col, row,
                    )),
                    _ => Err(AccessError::type_mismatch(
                        schema.name(),
                        property,
                        "linking objects",
                        prop.kind().type_name(),
                    )),
                }
            }
            InstanceState::Unmanaged { schema } => Err(AccessError::unsupported(format!(
                "linking objects on '{}.{property}' require a managed object",
                schema.name()
            ))),
        }
    }

}

impl PartialEq for RecordInstance {
    fn eq(&self, other: &Self) -> bool {
        match (self.state(), other.state()) {
            (
                InstanceState::Managed {
                    store: a,
                    table: at,
                    row: ar,
                    ..
                },
                InstanceState::Managed {
                    store: b,
                    table: bt,
                    row: br,
                    ..
                },
            ) => a.id() == b.id() && at == bt && ar == br,
            (InstanceState::Unmanaged { .. }, InstanceState::Unmanaged { .. }) => {
                Rc::ptr_eq(&self.core, &other.core)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for RecordInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state() {
            InstanceState::Unmanaged { schema } => f
                .debug_struct("RecordInstance")
                .field("schema", &schema.name())
                .field("managed", &false)
                .finish_non_exhaustive(),
            InstanceState::Managed { row, schema, .. } => f
                .debug_struct("RecordInstance")
                .field("schema", &schema.name())
                .field("row", &row)
                .finish_non_exhaustive(),
        }
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
        schema::{IntWidth, PropertyDescriptor},
    };

    fn person_schema() -> Arc<ObjectSchema> {
        Arc::new(
            ObjectSchema::new(
                "Person",
                vec![
                    PropertyDescriptor::new("name", PropertyKind::Text),
                    PropertyDescriptor::new("age", PropertyKind::Int(IntWidth::W8)),
                    PropertyDescriptor::new("score", PropertyKind::Float64).optional(),
                ],
            )
            .unwrap()
            .with_default("name", Value::Text("anon".into()))
            .unwrap(),
        )
    }

    #[test]
    fn unmanaged_slots_start_from_defaults() {
        let person = RecordInstance::new(&person_schema());
        assert_eq!(person.get("name").unwrap(), Value::Text("anon".into()));
        assert_eq!(person.get("score").unwrap(), Value::Null);
        assert!(!person.is_managed());
        assert!(person.is_attached());
    }

    #[test]
    fn unmanaged_set_validates_types() {
        let person = RecordInstance::new(&person_schema());

        let err = person.set("age", Value::Text("old".into())).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::TypeMismatch);

        // null into a non-optional slot is a type mismatch too
        let err = person.set("name", Value::Null).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::TypeMismatch);

        person.set("score", Value::Null).unwrap();
        assert_eq!(person.get("score").unwrap(), Value::Null);
    }

    #[test]
    fn unknown_property_names_are_rejected_per_call() {
        let person = RecordInstance::new(&person_schema());
        let err = person.get("nickname").unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::UnknownProperty);
        assert!(err.message.contains("nickname"));
    }

    #[test]
    fn unmanaged_reads_narrow_to_declared_width() {
        let person = RecordInstance::new(&person_schema());
        person.set("age", Value::Int(300)).unwrap();
        assert_eq!(person.get("age").unwrap(), Value::Int(300_i64 as i8 as i64));
    }

    #[test]
    fn unmanaged_increment_requires_int_property() {
        let person = RecordInstance::new(&person_schema());
        person.set("age", Value::Int(30)).unwrap();
        person.increment("age", 5).unwrap();
        assert_eq!(person.get("age").unwrap(), Value::Int(35));

        let err = person.increment("name", 1).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::TypeMismatch);
    }

    #[test]
    fn unmanaged_equality_is_handle_identity() {
        let a = RecordInstance::new(&person_schema());
        let b = RecordInstance::new(&person_schema());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn list_view_requires_managed_instance() {
        let person = RecordInstance::new(&person_schema());
        let err = person.list("name").unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::UnsupportedOperation);
    }
}
