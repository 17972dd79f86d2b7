//! Object lifecycle: resolving dynamic values to rows.
//!
//! Three modes govern how a value becomes a row of the target store:
//! `Require` never creates, `Promote` adopts unmanaged instances in
//! place, and `Create` always constructs (deep-copying across stores,
//! create-or-update on primary key). A per-call graph context dedups
//! already-visited sources so cycles and shared sub-objects resolve to
//! one row instead of recursing forever.

use crate::{
    access,
    error::AccessError,
    obs::{self, ObsEvent},
    object::{InstanceState, RecordInstance},
    schema::ObjectSchema,
    store::{ColumnValue, Store},
    types::{RowId, StoreId, TableIx},
    value::{Value, coerce},
};
use std::{collections::HashMap, sync::Arc};

///
/// ResolveMode
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ResolveMode {
    /// No implicit creation; the value must resolve to an existing row.
    Require,
    /// Adopt unmanaged instances into the store in place.
    Promote,
    /// Always construct a new row; with `update`, overwrite an
    /// existing row sharing the same primary key.
    Create { update: bool },
}

///
/// GraphContext
///
/// Dedup state for one resolution call chain. Unmanaged sources key by
/// handle identity, managed sources by (store, table, row).
///

#[derive(Default)]
pub(crate) struct GraphContext {
    seen: HashMap<GraphKey, RowId>,
}

#[derive(Clone, Copy, Eq, Hash, PartialEq)]
enum GraphKey {
    Ptr(usize),
    Row(StoreId, TableIx, RowId),
}

///
/// FieldSource
/// Where a new row's field values come from.
///

enum FieldSource<'a> {
    /// A `Value::Record` field literal.
    Literal(&'a Value),
    /// The slots of an unmanaged instance.
    Instance(&'a RecordInstance),
    /// A managed instance of a different store, read through its own
    /// accessors.
    Foreign(&'a RecordInstance),
}

impl FieldSource<'_> {
    fn field(&self, name: &str, index: usize) -> Result<Option<Value>, AccessError> {
        match self {
            Self::Literal(value) => Ok(value.record_field(name).cloned()),
            Self::Instance(instance) => Ok(instance.slot_value(index)),
            Self::Foreign(instance) => instance.get(name).map(Some),
        }
    }

    const fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

///
/// RESOLUTION
///

/// Resolve a dynamic value to a row of `target_table`, or `None` for
/// null. This is the single entry point for link writes, list
/// elements, and the store's promote/create surface.
pub(crate) fn resolve_link(
    store: &Store,
    target_table: TableIx,
    value: &Value,
    mode: ResolveMode,
    ctx: &mut GraphContext,
) -> Result<Option<RowId>, AccessError> {
    match value {
        Value::Null => Ok(None),

        Value::Object(instance) => {
            resolve_instance(store, target_table, instance, mode, ctx).map(Some)
        }

        Value::Record(_) => match mode {
            ResolveMode::Require => {
                lookup_literal(store, target_table, value).map(Some)
            }
            ResolveMode::Promote | ResolveMode::Create { .. } => {
                create_row(store, target_table, &FieldSource::Literal(value), mode, ctx, None)
                    .map(Some)
            }
        },

        other => {
            let target = store.registry().schema_by_table(target_table);
            Err(AccessError::new(
                crate::error::AccessErrorKind::TypeMismatch,
                format!(
                    "expected a '{}' object, record, or null, got {}",
                    target.name(),
                    other.type_name()
                ),
            ))
        }
    }
}

fn resolve_instance(
    store: &Store,
    target_table: TableIx,
    instance: &RecordInstance,
    mode: ResolveMode,
    ctx: &mut GraphContext,
) -> Result<RowId, AccessError> {
    let target_schema = store.registry().schema_by_table(target_table).clone();

    match instance.state() {
        InstanceState::Managed {
            store: src,
            table,
            row,
            schema,
        } => {
            if src.id() == store.id() {
                if table != target_table {
                    return Err(type_mismatch_object(&target_schema, schema.name()));
                }
                if !store.is_attached(table, row) {
                    return Err(AccessError::invalidated(schema.name()));
                }

                obs::record(ObsEvent::LinkResolved);
                Ok(row)
            } else {
                match mode {
                    ResolveMode::Require | ResolveMode::Promote => {
                        Err(AccessError::cross_store_link(schema.name()))
                    }
                    ResolveMode::Create { .. } => {
                        if schema.name() != target_schema.name() {
                            return Err(type_mismatch_object(&target_schema, schema.name()));
                        }
                        if !src.is_attached(table, row) {
                            return Err(AccessError::invalidated(schema.name()));
                        }

                        let key = GraphKey::Row(src.id(), table, row);
                        if let Some(existing) = ctx.seen.get(&key) {
                            return Ok(*existing);
                        }

                        create_row(
                            store,
                            target_table,
                            &FieldSource::Foreign(instance),
                            mode,
                            ctx,
                            Some(key),
                        )
                    }
                }
            }
        }

        InstanceState::Unmanaged { schema } => {
            if schema.name() != target_schema.name() {
                return Err(type_mismatch_object(&target_schema, schema.name()));
            }

            let key = GraphKey::Ptr(instance.core_ptr());
            if let Some(existing) = ctx.seen.get(&key) {
                return Ok(*existing);
            }

            match mode {
                ResolveMode::Require => Err(AccessError::new(
                    crate::error::AccessErrorKind::TypeMismatch,
                    format!(
                        "value for '{}' must resolve to an existing managed object",
                        target_schema.name()
                    ),
                )),
                ResolveMode::Promote => {
                    let row = create_row(
                        store,
                        target_table,
                        &FieldSource::Instance(instance),
                        mode,
                        ctx,
                        Some(key),
                    )?;

                    instance.promote_in_place(store.clone(), target_table, row);
                    obs::record(ObsEvent::RowPromoted);
                    Ok(row)
                }
                ResolveMode::Create { .. } => create_row(
                    store,
                    target_table,
                    &FieldSource::Instance(instance),
                    mode,
                    ctx,
                    Some(key),
                ),
            }
        }
    }
}

fn type_mismatch_object(expected: &Arc<ObjectSchema>, actual: &str) -> AccessError {
    AccessError::new(
        crate::error::AccessErrorKind::TypeMismatch,
        format!("expected a '{}' object, got '{actual}'", expected.name()),
    )
}

/// `Require` resolution of a record literal: look up the existing row
/// by the target schema's primary key.
fn lookup_literal(
    store: &Store,
    target_table: TableIx,
    value: &Value,
) -> Result<RowId, AccessError> {
    let schema = store.registry().schema_by_table(target_table).clone();

    let Some(pk_index) = schema.primary_key_index() else {
        return Err(AccessError::new(
            crate::error::AccessErrorKind::TypeMismatch,
            format!(
                "'{}' has no primary key; a record literal cannot resolve to an existing row",
                schema.name()
            ),
        ));
    };

    let pk_prop = schema.property_at(pk_index);
    let Some(pk_value) = value.record_field(pk_prop.name()) else {
        return Err(AccessError::type_mismatch(
            schema.name(),
            pk_prop.name(),
            pk_prop.kind().type_name(),
            "missing value",
        ));
    };

    let needle = coerce::unbox_scalar(schema.name(), pk_prop, pk_value)?;
    find_by_primary_key(store, target_table, &schema, pk_index, &needle)?.ok_or_else(|| {
        AccessError::new(
            crate::error::AccessErrorKind::TypeMismatch,
            format!(
                "no existing '{}' row with primary key {pk_value:?}",
                schema.name()
            ),
        )
    })
}

///
/// CREATION
///

/// Construct (or update) a row of `target_table` from a field source.
/// The dedup key, when present, is registered before any field is
/// applied so cyclic graphs terminate.
fn create_row(
    store: &Store,
    target_table: TableIx,
    source: &FieldSource<'_>,
    mode: ResolveMode,
    ctx: &mut GraphContext,
    seen_key: Option<GraphKey>,
) -> Result<RowId, AccessError> {
    store.check_write(store.registry().schema_by_table(target_table).name())?;

    let schema = store.registry().schema_by_table(target_table).clone();

    // primary-key handling decides between insert and overwrite
    let pk = match schema.primary_key_index() {
        Some(pk_index) => {
            let pk_prop = schema.property_at(pk_index);
            let pk_value = match source.field(pk_prop.name(), pk_index)? {
                Some(v) if !v.is_null() => v,
                _ => match schema.default_for(pk_prop.name()) {
                    Some(d) => d.clone(),
                    None => {
                        return Err(AccessError::type_mismatch(
                            schema.name(),
                            pk_prop.name(),
                            pk_prop.kind().type_name(),
                            "missing value",
                        ));
                    }
                },
            };

            let needle = coerce::unbox_scalar(schema.name(), pk_prop, &pk_value)?;
            let existing = find_by_primary_key(store, target_table, &schema, pk_index, &needle)?;
            Some((pk_index, needle, existing))
        }
        None => None,
    };

    if let Some((_, needle, Some(existing))) = &pk {
        return match mode {
            ResolveMode::Create { update: true } => {
                if let Some(key) = seen_key {
                    ctx.seen.insert(key, *existing);
                }

                apply_fields(store, &schema, target_table, *existing, source, mode, ctx, true)?;
                obs::record(ObsEvent::RowUpdated);
                Ok(*existing)
            }
            _ => Err(AccessError::duplicate_primary_key(
                schema.name(),
                format_args!("{needle:?}"),
            )),
        };
    }

    let row = store
        .with_engine_mut(|e| e.insert_row(target_table))
        .map_err(|e| AccessError::from_engine(schema.name(), "", &e))?;

    if let Some(key) = seen_key {
        ctx.seen.insert(key, row);
    }

    if let Some((pk_index, needle, _)) = pk {
        let pk_prop = schema.property_at(pk_index);
        let Some(col) = pk_prop.column() else {
            return Err(AccessError::internal("primary key is not column-bound"));
        };

        store
            .with_engine_mut(|e| e.set(target_table, row, col, needle))
            .map_err(|e| AccessError::from_engine(schema.name(), pk_prop.name(), &e))?;
    }

    apply_fields(store, &schema, target_table, row, source, mode, ctx, false)?;
    obs::record(ObsEvent::RowCreated);

    Ok(row)
}

/// Copy every non-key field from the source onto the row. When
/// updating, fields absent from the source keep their stored values;
/// when creating, absent fields fall back to the schema's defaults.
#[allow(clippy::too_many_arguments)]
fn apply_fields(
    store: &Store,
    schema: &Arc<ObjectSchema>,
    table: TableIx,
    row: RowId,
    source: &FieldSource<'_>,
    mode: ResolveMode,
    ctx: &mut GraphContext,
    updating: bool,
) -> Result<(), AccessError> {
    for (index, prop) in schema.properties().iter().enumerate() {
        if prop.is_primary_key() || prop.kind().is_backlink() {
            continue;
        }

        let value = match source.field(prop.name(), index)? {
            Some(v) => v,
            None if updating => continue,
            None => match schema.default_for(prop.name()) {
                Some(d) => d.clone(),
                None if prop.kind().is_list() => Value::List(Vec::new()),
                None if prop.is_optional() || prop.kind().is_link() => Value::Null,
                None if source.is_literal() => {
                    return Err(AccessError::type_mismatch(
                        schema.name(),
                        prop.name(),
                        prop.kind().type_name(),
                        "missing value",
                    ));
                }
                None => Value::Null,
            },
        };

        access::apply_property(store, schema, table, row, index, &value, mode, ctx)?;
    }

    Ok(())
}

/// Scan the table for a row whose primary-key column equals `needle`.
fn find_by_primary_key(
    store: &Store,
    table: TableIx,
    schema: &Arc<ObjectSchema>,
    pk_index: usize,
    needle: &ColumnValue,
) -> Result<Option<RowId>, AccessError> {
    let pk_prop = schema.property_at(pk_index);
    let Some(col) = pk_prop.column() else {
        return Err(AccessError::internal("primary key is not column-bound"));
    };

    let rows = store
        .with_engine(|e| e.rows(table))
        .map_err(|e| AccessError::from_engine(schema.name(), pk_prop.name(), &e))?;

    for row in rows {
        let stored = store
            .with_engine(|e| e.get(table, row, col))
            .map_err(|e| AccessError::from_engine(schema.name(), pk_prop.name(), &e))?;
        if stored == *needle {
            return Ok(Some(row));
        }
    }

    Ok(None)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AccessErrorKind,
        test_support::{open_store, pet_schema, person_schema},
    };

    #[test]
    fn promote_binds_the_instance_and_copies_fields() {
        let store = open_store();
        let person = RecordInstance::new(&store.schema("Person").unwrap());
        person.set("name", Value::Text("Alice".into())).unwrap();
        person.set("age", Value::Int(30)).unwrap();

        store.write(|| store.promote(&person)).unwrap();

        assert!(person.is_managed());
        assert_eq!(person.get("name").unwrap(), Value::Text("Alice".into()));
        assert_eq!(person.get("age").unwrap(), Value::Int(30));
    }

    #[test]
    fn promoting_twice_in_one_graph_creates_a_single_row() {
        let store = open_store();
        let person_type = store.schema("Person").unwrap();
        let pet_type = store.schema("Pet").unwrap();

        let rex = RecordInstance::new(&pet_type);
        rex.set("name", Value::Text("Rex".into())).unwrap();

        // the same pet is both the dog link and a list element
        let person = RecordInstance::new(&person_type);
        person.set("dog", Value::Object(rex.clone())).unwrap();
        person
            .set("pets", Value::List(vec![Value::Object(rex.clone())]))
            .unwrap();

        store.write(|| store.promote(&person)).unwrap();

        assert_eq!(store.objects("Pet").unwrap().len(), 1);

        let dog = person.get("dog").unwrap();
        let first_pet = person.list("pets").unwrap().get(0).unwrap();
        assert_eq!(dog, Value::Object(first_pet));
    }

    #[test]
    fn promotion_handles_cyclic_graphs() {
        let schemas = vec![
            crate::schema::ObjectSchema::new(
                "Node",
                vec![
                    crate::schema::PropertyDescriptor::new(
                        "label",
                        crate::schema::PropertyKind::Text,
                    ),
                    crate::schema::PropertyDescriptor::new(
                        "next",
                        crate::schema::PropertyKind::Object {
                            target: "Node".into(),
                        },
                    )
                    .optional(),
                ],
            )
            .unwrap(),
        ];
        let store = crate::store::Store::open_in_memory(schemas).unwrap();

        let a = RecordInstance::new(&store.schema("Node").unwrap());
        let b = RecordInstance::new(&store.schema("Node").unwrap());
        a.set("label", Value::Text("a".into())).unwrap();
        b.set("label", Value::Text("b".into())).unwrap();
        a.set("next", Value::Object(b.clone())).unwrap();
        b.set("next", Value::Object(a.clone())).unwrap();

        store.write(|| store.promote(&a)).unwrap();

        assert!(a.is_managed());
        assert!(b.is_managed());
        assert_eq!(store.objects("Node").unwrap().len(), 2);

        // the cycle survives promotion
        let a_next = a.get("next").unwrap();
        assert_eq!(a_next, Value::Object(b.clone()));
        let b_next = b.get("next").unwrap();
        assert_eq!(b_next, Value::Object(a));
    }

    #[test]
    fn promote_rejects_instances_of_a_different_store() {
        let store_a = open_store();
        let store_b = open_store();

        let person = store_a
            .write(|| store_a.create("Person", Value::record([("name", Value::Text("Ada".into()))]), false))
            .unwrap();

        let err = store_b.write(|| store_b.promote(&person)).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::CrossStoreLink);
        assert!(err.message.contains("use create instead"));
    }

    #[test]
    fn create_deep_copies_across_stores() {
        let store_a = open_store();
        let store_b = open_store();

        let person = store_a
            .write(|| {
                store_a.create(
                    "Person",
                    Value::record([
                        ("name", Value::Text("Ada".into())),
                        (
                            "pets",
                            Value::List(vec![Value::record([(
                                "name",
                                Value::Text("Rex".into()),
                            )])]),
                        ),
                    ]),
                    false,
                )
            })
            .unwrap();

        let copy = store_b
            .write(|| store_b.create("Person", Value::Object(person.clone()), false))
            .unwrap();

        assert_eq!(copy.store().unwrap().id(), store_b.id());
        assert_eq!(copy.get("name").unwrap(), Value::Text("Ada".into()));

        let copied_pets = copy.list("pets").unwrap();
        assert_eq!(copied_pets.len().unwrap(), 1);
        assert_eq!(
            copied_pets.get(0).unwrap().get("name").unwrap(),
            Value::Text("Rex".into())
        );

        // the original is untouched and still lives in store A
        assert_eq!(person.store().unwrap().id(), store_a.id());
        assert_eq!(store_a.objects("Pet").unwrap().len(), 1);
        assert_eq!(store_b.objects("Pet").unwrap().len(), 1);
    }

    #[test]
    fn create_or_update_overwrites_all_but_the_key() {
        let store = open_store();

        store
            .write(|| {
                store.create(
                    "Account",
                    Value::record([
                        ("id", Value::Int(1)),
                        ("balance", Value::Int(100)),
                        ("note", Value::Text("first".into())),
                    ]),
                    false,
                )
            })
            .unwrap();

        let updated = store
            .write(|| {
                store.create(
                    "Account",
                    Value::record([("id", Value::Int(1)), ("balance", Value::Int(250))]),
                    true,
                )
            })
            .unwrap();

        assert_eq!(updated.get("id").unwrap(), Value::Int(1));
        assert_eq!(updated.get("balance").unwrap(), Value::Int(250));
        // fields absent from the update keep their stored values
        assert_eq!(updated.get("note").unwrap(), Value::Text("first".into()));
        assert_eq!(store.objects("Account").unwrap().len(), 1);
    }

    #[test]
    fn create_without_update_rejects_duplicate_keys() {
        let store = open_store();

        store
            .write(|| {
                store.create(
                    "Account",
                    Value::record([("id", Value::Int(1)), ("balance", Value::Int(100))]),
                    false,
                )
            })
            .unwrap();

        let err = store
            .write(|| {
                store.create(
                    "Account",
                    Value::record([("id", Value::Int(1)), ("balance", Value::Int(9))]),
                    false,
                )
            })
            .unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::DuplicatePrimaryKey);

        // the existing row is unchanged
        let account = store
            .resolve_existing("Account", Value::record([("id", Value::Int(1))]))
            .unwrap();
        assert_eq!(account.get("balance").unwrap(), Value::Int(100));
    }

    #[test]
    fn create_requires_a_value_for_missing_non_optional_fields() {
        let store = crate::store::Store::open_in_memory(vec![
            crate::schema::ObjectSchema::new(
                "Strict",
                vec![crate::schema::PropertyDescriptor::new(
                    "required",
                    crate::schema::PropertyKind::Text,
                )],
            )
            .unwrap(),
        ])
        .unwrap();

        let err = store
            .write(|| store.create("Strict", Value::record([("other", Value::Int(1))]), false))
            .unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::TypeMismatch);
        assert!(err.message.contains("missing value"));
    }

    #[test]
    fn require_mode_resolves_literals_by_primary_key_only() {
        let store = open_store();

        store
            .write(|| {
                store.create(
                    "Account",
                    Value::record([("id", Value::Int(5)), ("balance", Value::Int(1))]),
                    false,
                )
            })
            .unwrap();

        let found = store
            .resolve_existing("Account", Value::record([("id", Value::Int(5))]))
            .unwrap();
        assert_eq!(found.get("balance").unwrap(), Value::Int(1));

        let err = store
            .resolve_existing("Account", Value::record([("id", Value::Int(6))]))
            .unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::TypeMismatch);

        // schemas without a primary key cannot resolve literals
        let err = store
            .resolve_existing("Person", Value::record([("name", Value::Text("x".into()))]))
            .unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::TypeMismatch);
    }

    #[test]
    fn require_mode_rejects_unmanaged_instances() {
        let store = open_store();
        let person = RecordInstance::new(&store.schema("Person").unwrap());

        let err = store
            .resolve_existing("Person", Value::Object(person))
            .unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::TypeMismatch);
    }

    #[test]
    fn link_resolution_rejects_schema_mismatches() {
        let store = open_store();
        let person = store
            .write(|| store.create("Person", Value::record([("name", Value::Text("Ada".into()))]), false))
            .unwrap();

        // a Person is not a Pet
        let err = store
            .write(|| person.set("dog", Value::Object(person.clone())))
            .unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::TypeMismatch);
    }

    #[test]
    fn deleted_instances_never_resolve() {
        let store = open_store();
        let pet = store
            .write(|| store.create("Pet", Value::record([("name", Value::Text("Rex".into()))]), false))
            .unwrap();
        let person = store
            .write(|| store.create("Person", Value::record([("name", Value::Text("Ada".into()))]), false))
            .unwrap();

        store.write(|| store.delete(&pet)).unwrap();

        let err = store
            .write(|| person.set("dog", Value::Object(pet.clone())))
            .unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::InvalidatedAccess);
    }

    #[test]
    fn fixture_schemas_compose() {
        // fixtures are shared across test modules; keep their shapes honest
        assert_eq!(person_schema().name(), "Person");
        assert_eq!(pet_schema().name(), "Pet");
    }
}
