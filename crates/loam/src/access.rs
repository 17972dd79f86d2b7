//! Property accessor synthesis and dispatch.
//!
//! Accessors are resolved once, when the schema registry is built: each
//! property gets a bound column index and a tagged kind with link
//! targets already lowered to table indices. Row access dispatches on
//! the tag; nothing is looked up by name on the hot path.

use crate::{
    collection::LinkCollection,
    error::{AccessError, SchemaError},
    lifecycle::{GraphContext, ResolveMode, resolve_link},
    notify::{ChangeEvent, ChangeKind, notified},
    obs::{self, ObsEvent},
    object::RecordInstance,
    schema::{IntWidth, ObjectSchema, PropertyKind},
    store::Store,
    types::{ColIx, RowId, TableIx},
    value::{Value, coerce},
};
use std::{collections::BTreeMap, sync::Arc};

///
/// ScalarKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ScalarKind {
    Bool,
    Int(IntWidth),
    Float32,
    Float64,
    Text,
    Blob,
    Timestamp,
}

///
/// AccessorKind
///
/// Dispatch tag for one property, with link targets pre-resolved.
///

#[derive(Clone, Debug)]
pub(crate) enum AccessorKind {
    Scalar(ScalarKind),
    Link { target: TableIx },
    List { target: TableIx },
    Backlink { origin_table: TableIx, origin_col: ColIx },
}

///
/// PropertyAccessor
///

#[derive(Clone, Debug)]
pub(crate) struct PropertyAccessor {
    pub(crate) col: Option<ColIx>,
    pub(crate) kind: AccessorKind,
}

///
/// AccessorTable
///
/// Per-schema dispatch table, one accessor per declared property in
/// declaration order.
///

#[derive(Clone, Debug)]
pub(crate) struct AccessorTable {
    accessors: Vec<PropertyAccessor>,
}

impl AccessorTable {
    pub(crate) fn accessor(&self, prop_index: usize) -> &PropertyAccessor {
        &self.accessors[prop_index]
    }

    /// Resolve one schema's accessors against the full schema set.
    /// Columns must already be bound on every schema.
    pub(crate) fn bind(
        schema: &ObjectSchema,
        by_name: &BTreeMap<String, TableIx>,
        all: &[ObjectSchema],
    ) -> Result<Self, SchemaError> {
        let mut accessors = Vec::with_capacity(schema.properties().len());

        for prop in schema.properties() {
            let kind = match prop.kind() {
                PropertyKind::Bool => AccessorKind::Scalar(ScalarKind::Bool),
                PropertyKind::Int(width) => AccessorKind::Scalar(ScalarKind::Int(*width)),
                PropertyKind::Float32 => AccessorKind::Scalar(ScalarKind::Float32),
                PropertyKind::Float64 => AccessorKind::Scalar(ScalarKind::Float64),
                PropertyKind::Text => AccessorKind::Scalar(ScalarKind::Text),
                PropertyKind::Blob => AccessorKind::Scalar(ScalarKind::Blob),
                PropertyKind::Timestamp => AccessorKind::Scalar(ScalarKind::Timestamp),

                PropertyKind::Object { target } => AccessorKind::Link {
                    target: resolve_target(schema, prop.name(), target, by_name)?,
                },
                PropertyKind::List { target } => AccessorKind::List {
                    target: resolve_target(schema, prop.name(), target, by_name)?,
                },

                PropertyKind::LinkingObjects {
                    target,
                    origin_property,
                } => {
                    let origin_table = resolve_target(schema, prop.name(), target, by_name)?;
                    let origin_schema = &all[origin_table.as_usize()];

                    let origin_col = origin_schema
                        .property(origin_property)
                        .filter(|(_, origin)| match origin.kind() {
                            PropertyKind::Object { target } | PropertyKind::List { target } => {
                                target == schema.name()
                            }
                            _ => false,
                        })
                        .and_then(|(_, origin)| origin.column());

                    let Some(origin_col) = origin_col else {
                        return Err(SchemaError::InvalidBacklinkOrigin {
                            schema: schema.name().to_string(),
                            property: prop.name().to_string(),
                            target: target.clone(),
                            origin: origin_property.clone(),
                        });
                    };

                    AccessorKind::Backlink {
                        origin_table,
                        origin_col,
                    }
                }

                // rejected by ObjectSchema::new
                PropertyKind::Any => {
                    return Err(SchemaError::UnsupportedAny {
                        schema: schema.name().to_string(),
                        property: prop.name().to_string(),
                    });
                }
            };

            accessors.push(PropertyAccessor {
                col: prop.column(),
                kind,
            });
        }

        Ok(Self { accessors })
    }
}

fn bound_col(accessor: &PropertyAccessor) -> Result<ColIx, AccessError> {
    accessor
        .col
        .ok_or_else(|| AccessError::internal("accessor is not column-bound"))
}

fn resolve_target(
    schema: &ObjectSchema,
    property: &str,
    target: &str,
    by_name: &BTreeMap<String, TableIx>,
) -> Result<TableIx, SchemaError> {
    by_name
        .get(target)
        .copied()
        .ok_or_else(|| SchemaError::UnknownLinkTarget {
            schema: schema.name().to_string(),
            property: property.to_string(),
            target: target.to_string(),
        })
}

///
/// READ PATH
///

/// Read one property of a managed row into the dynamic representation.
pub(crate) fn read_property(
    store: &Store,
    schema: &Arc<ObjectSchema>,
    table: TableIx,
    row: RowId,
    prop_index: usize,
) -> Result<Value, AccessError> {
    store.check_thread()?;
    if !store.is_attached(table, row) {
        return Err(AccessError::invalidated(schema.name()));
    }

    let prop = schema.property_at(prop_index);
    let accessor = store.registry().accessors(table).accessor(prop_index).clone();

    match accessor.kind {
        AccessorKind::Scalar(_) => {
            let col = bound_col(&accessor)?;
            let raw = store
                .with_engine(|e| e.get(table, row, col))
                .map_err(|e| AccessError::from_engine(schema.name(), prop.name(), &e))?;

            obs::record(ObsEvent::ScalarRead);
            Ok(coerce::box_scalar(prop, raw))
        }

        AccessorKind::Link { target } => {
            let col = bound_col(&accessor)?;
            let raw = store
                .with_engine(|e| e.get(table, row, col))
                .map_err(|e| AccessError::from_engine(schema.name(), prop.name(), &e))?;

            Ok(match raw {
                crate::store::ColumnValue::Row(target_row) => {
                    Value::Object(managed_target(store, target, target_row))
                }
                _ => Value::Null,
            })
        }

        // snapshot of the live collection, in order
        AccessorKind::List { target } => {
            let list = list_collection(store, schema, table, row, prop_index, target)?;
            let items = list
                .to_vec()?
                .into_iter()
                .map(Value::Object)
                .collect();
            Ok(Value::List(items))
        }

        AccessorKind::Backlink {
            origin_table,
            origin_col,
        } => {
            let rows = store
                .with_engine(|e| e.backlinks(origin_table, origin_col, row))
                .map_err(|e| AccessError::from_engine(schema.name(), prop.name(), &e))?;

            Ok(Value::List(
                rows.into_iter()
                    .map(|r| Value::Object(managed_target(store, origin_table, r)))
                    .collect(),
            ))
        }
    }
}

pub(crate) fn managed_target(store: &Store, table: TableIx, row: RowId) -> RecordInstance {
    let schema = store.registry().schema_by_table(table).clone();
    RecordInstance::managed(store.clone(), table, row, schema)
}

pub(crate) fn list_collection(
    store: &Store,
    schema: &Arc<ObjectSchema>,
    table: TableIx,
    row: RowId,
    prop_index: usize,
    target: TableIx,
) -> Result<LinkCollection, AccessError> {
    let col = bound_col(store.registry().accessors(table).accessor(prop_index))?;

    Ok(LinkCollection::new(
        store.clone(),
        schema.clone(),
        prop_index,
        table,
        row,
        col,
        target,
    ))
}

///
/// WRITE PATH
///

/// Write one property of a managed row. Plain accessor writes use
/// promote semantics for link values; creation paths pass their own
/// mode through [`apply_property`].
pub(crate) fn write_property(
    store: &Store,
    schema: &Arc<ObjectSchema>,
    table: TableIx,
    row: RowId,
    prop_index: usize,
    value: Value,
) -> Result<(), AccessError> {
    check_mutable(store, schema, table, row, prop_index)?;

    let mut ctx = GraphContext::default();
    apply_property(
        store,
        schema,
        table,
        row,
        prop_index,
        &value,
        ResolveMode::Promote,
        &mut ctx,
    )
}

/// Shared write body used by the accessor surface and the lifecycle
/// manager. Callers have already performed thread/transaction/attached
/// checks and the primary-key guard.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_property(
    store: &Store,
    schema: &Arc<ObjectSchema>,
    table: TableIx,
    row: RowId,
    prop_index: usize,
    value: &Value,
    mode: ResolveMode,
    ctx: &mut GraphContext,
) -> Result<(), AccessError> {
    let prop = schema.property_at(prop_index);
    let accessor = store.registry().accessors(table).accessor(prop_index).clone();

    match accessor.kind {
        AccessorKind::Scalar(_) => {
            let col = bound_col(&accessor)?;
            let event = ChangeEvent::scalar(row, prop.name());

            notified(store, table, row, &event, || {
                let raw = coerce::unbox_scalar(schema.name(), prop, value)?;
                store
                    .with_engine_mut(|e| e.set(table, row, col, raw))
                    .map_err(|e| AccessError::from_engine(schema.name(), prop.name(), &e))
            })?;

            obs::record(ObsEvent::ScalarWrite);
            Ok(())
        }

        AccessorKind::Link { target } => {
            let col = bound_col(&accessor)?;
            let event = ChangeEvent::scalar(row, prop.name());

            notified(store, table, row, &event, || {
                let resolved = resolve_link(store, target, value, mode, ctx)?;
                let raw = resolved.map_or(crate::store::ColumnValue::Null, |r| {
                    crate::store::ColumnValue::Row(r)
                });

                if !prop.is_optional() && raw.is_null() {
                    return Err(AccessError::type_mismatch(
                        schema.name(),
                        prop.name(),
                        "object",
                        "null",
                    ));
                }

                store
                    .with_engine_mut(|e| e.set(table, row, col, raw))
                    .map_err(|e| AccessError::from_engine(schema.name(), prop.name(), &e))
            })
        }

        AccessorKind::List { target } => {
            let list = list_collection(store, schema, table, row, prop_index, target)?;
            match value {
                // assigning null empties the collection
                Value::Null => list.assign_resolved(Vec::new()),
                Value::List(items) => list.assign_with_mode(items.clone(), mode, ctx),
                other => Err(AccessError::type_mismatch(
                    schema.name(),
                    prop.name(),
                    "list",
                    other.type_name(),
                )),
            }
        }

        AccessorKind::Backlink { .. } => Err(AccessError::unsupported(format!(
            "'{}.{}' is a derived linking-objects view and cannot be written",
            schema.name(),
            prop.name()
        ))),
    }
}

/// Add a delta to an integer property in place via the engine's
/// add-int op, under the same discipline as any other write.
pub(crate) fn increment_property(
    store: &Store,
    schema: &Arc<ObjectSchema>,
    table: TableIx,
    row: RowId,
    prop_index: usize,
    delta: i64,
) -> Result<(), AccessError> {
    check_mutable(store, schema, table, row, prop_index)?;

    let prop = schema.property_at(prop_index);
    let accessor = store.registry().accessors(table).accessor(prop_index).clone();

    if !matches!(accessor.kind, AccessorKind::Scalar(ScalarKind::Int(_))) {
        return Err(AccessError::type_mismatch(
            schema.name(),
            prop.name(),
            "int",
            prop.kind().type_name(),
        ));
    }

    let col = bound_col(&accessor)?;
    let event = ChangeEvent::scalar(row, prop.name());

    notified(store, table, row, &event, || {
        store
            .with_engine_mut(|e| e.add_int(table, row, col, delta))
            .map(|_| ())
            .map_err(|e| AccessError::from_engine(schema.name(), prop.name(), &e))
    })?;

    obs::record(ObsEvent::ScalarWrite);
    Ok(())
}

/// Thread, transaction, attachment, and primary-key checks shared by
/// every mutating accessor. All of these fail before any notification
/// fires and before storage is touched.
pub(crate) fn check_mutable(
    store: &Store,
    schema: &Arc<ObjectSchema>,
    table: TableIx,
    row: RowId,
    prop_index: usize,
) -> Result<(), AccessError> {
    store.check_thread()?;
    store.check_write(schema.name())?;
    if !store.is_attached(table, row) {
        return Err(AccessError::invalidated(schema.name()));
    }

    let prop = schema.property_at(prop_index);
    if prop.is_primary_key() {
        return Err(AccessError::immutable_primary_key(schema.name(), prop.name()));
    }

    Ok(())
}

///
/// ChangeEvent helpers
///

impl ChangeEvent {
    pub(crate) fn scalar(row: RowId, property: &str) -> Self {
        Self {
            row,
            property: property.to_string(),
            kind: ChangeKind::Scalar,
        }
    }
}

///
/// TESTS
///
