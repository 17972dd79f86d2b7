use crate::{
    access::{AccessorKind, AccessorTable},
    error::SchemaError,
    schema::ObjectSchema,
    store::engine::ColumnSpec,
    types::{ColIx, TableIx},
};
use std::{collections::BTreeMap, sync::Arc};

///
/// SchemaRegistry
///
/// Explicit name→schema mapping for one open store. Built once at
/// store open — assigning every property its column index and
/// resolving every link target to a table index — and immutable for
/// the lifetime of the store. There is no process-global registry;
/// the owning store passes this by reference.
///

#[derive(Clone, Debug)]
pub struct SchemaRegistry {
    schemas: Vec<Arc<ObjectSchema>>,
    tables: Vec<AccessorTable>,
    by_name: BTreeMap<String, TableIx>,
}

impl SchemaRegistry {
    /// Validate the schema set, bind columns, and resolve accessors.
    pub(crate) fn build(mut defs: Vec<ObjectSchema>) -> Result<Self, SchemaError> {
        let mut by_name = BTreeMap::new();
        for (index, def) in defs.iter().enumerate() {
            let table = TableIx::new(u32::try_from(index).unwrap_or(u32::MAX));
            if by_name.insert(def.name().to_string(), table).is_some() {
                return Err(SchemaError::DuplicateSchema {
                    schema: def.name().to_string(),
                });
            }
        }

        // pass 1: bind column indices in declaration order
        for def in &mut defs {
            let mut next = 0_u32;
            for index in 0..def.properties().len() {
                if def.property_at(index).kind().has_column() {
                    def.property_at_mut(index).bind_column(ColIx::new(next));
                    next += 1;
                }
            }
        }

        // pass 2: resolve link targets and backlink origins
        let tables = defs
            .iter()
            .map(|def| AccessorTable::bind(def, &by_name, &defs))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            schemas: defs.into_iter().map(Arc::new).collect(),
            tables,
            by_name,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Arc<ObjectSchema>> {
        self.schemas.iter()
    }

    #[must_use]
    pub fn schema_by_name(&self, name: &str) -> Option<&Arc<ObjectSchema>> {
        let table = self.by_name.get(name)?;
        Some(&self.schemas[table.as_usize()])
    }

    #[must_use]
    pub fn schema_by_table(&self, table: TableIx) -> &Arc<ObjectSchema> {
        &self.schemas[table.as_usize()]
    }

    #[must_use]
    pub(crate) fn table_ix(&self, name: &str) -> Option<TableIx> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn accessors(&self, table: TableIx) -> &AccessorTable {
        &self.tables[table.as_usize()]
    }

    /// Column shapes for one table, in column-index order. Used to
    /// register tables with the engine at store open.
    pub(crate) fn column_specs(&self, table: TableIx) -> Vec<ColumnSpec> {
        let schema = &self.schemas[table.as_usize()];
        let accessors = &self.tables[table.as_usize()];

        let mut specs = Vec::new();
        for index in 0..schema.properties().len() {
            let accessor = accessors.accessor(index);
            if accessor.col.is_none() {
                continue;
            }

            specs.push(match accessor.kind {
                AccessorKind::Scalar(_) => ColumnSpec::Value,
                AccessorKind::Link { target } => ColumnSpec::Link { target },
                AccessorKind::List { target } => ColumnSpec::LinkList { target },
                AccessorKind::Backlink { .. } => continue,
            });
        }

        specs
    }
}

///
/// TESTS
///
