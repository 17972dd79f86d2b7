use crate::{
    store::engine::{ColumnSpec, ColumnValue, EngineError, StorageEngine},
    types::{ColIx, RowId, TableIx},
};
use std::collections::BTreeMap;

///
/// Cell
/// One stored cell: a typed value or a link list.
///

#[derive(Clone, Debug)]
enum Cell {
    Value(ColumnValue),
    Links(Vec<RowId>),
}

impl Cell {
    const fn empty_for(spec: ColumnSpec) -> Self {
        match spec {
            ColumnSpec::Value | ColumnSpec::Link { .. } => Self::Value(ColumnValue::Null),
            ColumnSpec::LinkList { .. } => Self::Links(Vec::new()),
        }
    }
}

///
/// MemTable
///

#[derive(Debug, Default)]
struct MemTable {
    columns: Vec<ColumnSpec>,
    rows: BTreeMap<RowId, Vec<Cell>>,
    next_row: u64,
}

impl MemTable {
    fn check_col(&self, table: TableIx, col: ColIx) -> Result<ColumnSpec, EngineError> {
        self.columns
            .get(col.as_usize())
            .copied()
            .ok_or(EngineError::UnknownColumn { table, col })
    }

    fn cells(&self, table: TableIx, row: RowId) -> Result<&Vec<Cell>, EngineError> {
        self.rows
            .get(&row)
            .ok_or(EngineError::RowDetached { table, row })
    }

    fn cells_mut(&mut self, table: TableIx, row: RowId) -> Result<&mut Vec<Cell>, EngineError> {
        self.rows
            .get_mut(&row)
            .ok_or(EngineError::RowDetached { table, row })
    }
}

///
/// MemoryEngine
///
/// Reference in-memory row store implementing the engine seam over
/// plain BTreeMaps. No durability, no isolation, no indexing; rows
/// live exactly as long as the engine value.
///

#[derive(Debug, Default)]
pub struct MemoryEngine {
    tables: Vec<MemTable>,
}

impl MemoryEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, table: TableIx) -> Result<&MemTable, EngineError> {
        self.tables
            .get(table.as_usize())
            .ok_or(EngineError::UnknownTable { table })
    }

    fn table_mut(&mut self, table: TableIx) -> Result<&mut MemTable, EngineError> {
        self.tables
            .get_mut(table.as_usize())
            .ok_or(EngineError::UnknownTable { table })
    }

    fn value_cell(&self, table: TableIx, row: RowId, col: ColIx) -> Result<&ColumnValue, EngineError> {
        let t = self.table(table)?;
        t.check_col(table, col)?;
        match &t.cells(table, row)?[col.as_usize()] {
            Cell::Value(v) => Ok(v),
            Cell::Links(_) => Err(EngineError::CellKindMismatch {
                col,
                expected: "value",
                found: "link list",
            }),
        }
    }

    fn links(&self, table: TableIx, row: RowId, col: ColIx) -> Result<&Vec<RowId>, EngineError> {
        let t = self.table(table)?;
        t.check_col(table, col)?;
        match &t.cells(table, row)?[col.as_usize()] {
            Cell::Links(links) => Ok(links),
            Cell::Value(v) => Err(EngineError::CellKindMismatch {
                col,
                expected: "link list",
                found: v.kind_label(),
            }),
        }
    }

    fn links_mut(
        &mut self,
        table: TableIx,
        row: RowId,
        col: ColIx,
    ) -> Result<&mut Vec<RowId>, EngineError> {
        let t = self.table_mut(table)?;
        t.check_col(table, col)?;
        match &mut t.cells_mut(table, row)?[col.as_usize()] {
            Cell::Links(links) => Ok(links),
            Cell::Value(v) => Err(EngineError::CellKindMismatch {
                col,
                expected: "link list",
                found: v.kind_label(),
            }),
        }
    }

    /// Clear every forward reference to a deleted row.
    fn scrub_links_to(&mut self, target_table: TableIx, target: RowId) {
        for t in &mut self.tables {
            let specs = t.columns.clone();
            for cells in t.rows.values_mut() {
                for (ix, spec) in specs.iter().enumerate() {
                    match spec {
                        ColumnSpec::Link { target: tt } if *tt == target_table => {
                            if let Cell::Value(v) = &mut cells[ix]
                                && *v == ColumnValue::Row(target)
                            {
                                *v = ColumnValue::Null;
                            }
                        }
                        ColumnSpec::LinkList { target: tt } if *tt == target_table => {
                            if let Cell::Links(links) = &mut cells[ix] {
                                links.retain(|r| *r != target);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

impl StorageEngine for MemoryEngine {
    fn add_table(&mut self, columns: Vec<ColumnSpec>) -> TableIx {
        let ix = TableIx::new(u32::try_from(self.tables.len()).unwrap_or(u32::MAX));
        self.tables.push(MemTable {
            columns,
            rows: BTreeMap::new(),
            next_row: 0,
        });

        ix
    }

    fn insert_row(&mut self, table: TableIx) -> Result<RowId, EngineError> {
        let t = self.table_mut(table)?;
        let row = RowId::new(t.next_row);
        t.next_row += 1;

        let cells = t.columns.iter().map(|spec| Cell::empty_for(*spec)).collect();
        t.rows.insert(row, cells);

        Ok(row)
    }

    fn delete_row(&mut self, table: TableIx, row: RowId) -> Result<(), EngineError> {
        let t = self.table_mut(table)?;
        if t.rows.remove(&row).is_none() {
            return Err(EngineError::RowDetached { table, row });
        }

        self.scrub_links_to(table, row);
        Ok(())
    }

    fn is_attached(&self, table: TableIx, row: RowId) -> bool {
        self.table(table)
            .is_ok_and(|t| t.rows.contains_key(&row))
    }

    fn rows(&self, table: TableIx) -> Result<Vec<RowId>, EngineError> {
        Ok(self.table(table)?.rows.keys().copied().collect())
    }

    fn get(&self, table: TableIx, row: RowId, col: ColIx) -> Result<ColumnValue, EngineError> {
        self.value_cell(table, row, col).cloned()
    }

    fn set(
        &mut self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        value: ColumnValue,
    ) -> Result<(), EngineError> {
        let t = self.table_mut(table)?;
        t.check_col(table, col)?;
        match &mut t.cells_mut(table, row)?[col.as_usize()] {
            Cell::Value(slot) => {
                *slot = value;
                Ok(())
            }
            Cell::Links(_) => Err(EngineError::CellKindMismatch {
                col,
                expected: "value",
                found: "link list",
            }),
        }
    }

    fn add_int(
        &mut self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        delta: i64,
    ) -> Result<i64, EngineError> {
        let t = self.table_mut(table)?;
        t.check_col(table, col)?;
        match &mut t.cells_mut(table, row)?[col.as_usize()] {
            Cell::Value(ColumnValue::Int(v)) => {
                *v = v.wrapping_add(delta);
                Ok(*v)
            }
            Cell::Value(v) => Err(EngineError::CellKindMismatch {
                col,
                expected: "int",
                found: v.kind_label(),
            }),
            Cell::Links(_) => Err(EngineError::CellKindMismatch {
                col,
                expected: "int",
                found: "link list",
            }),
        }
    }

    fn list_len(&self, table: TableIx, row: RowId, col: ColIx) -> Result<usize, EngineError> {
        Ok(self.links(table, row, col)?.len())
    }

    fn list_get(
        &self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        index: usize,
    ) -> Result<RowId, EngineError> {
        let links = self.links(table, row, col)?;
        links
            .get(index)
            .copied()
            .ok_or(EngineError::IndexOutOfRange {
                index,
                len: links.len(),
            })
    }

    fn list_insert(
        &mut self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        index: usize,
        target: RowId,
    ) -> Result<(), EngineError> {
        let links = self.links_mut(table, row, col)?;
        if index > links.len() {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: links.len(),
            });
        }

        links.insert(index, target);
        Ok(())
    }

    fn list_set(
        &mut self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        index: usize,
        target: RowId,
    ) -> Result<(), EngineError> {
        let links = self.links_mut(table, row, col)?;
        let len = links.len();
        let slot = links
            .get_mut(index)
            .ok_or(EngineError::IndexOutOfRange { index, len })?;

        *slot = target;
        Ok(())
    }

    fn list_erase(
        &mut self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        index: usize,
    ) -> Result<(), EngineError> {
        let links = self.links_mut(table, row, col)?;
        if index >= links.len() {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: links.len(),
            });
        }

        links.remove(index);
        Ok(())
    }

    fn list_swap(
        &mut self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        left: usize,
        right: usize,
    ) -> Result<(), EngineError> {
        let links = self.links_mut(table, row, col)?;
        let len = links.len();
        if left >= len || right >= len {
            return Err(EngineError::IndexOutOfRange {
                index: left.max(right),
                len,
            });
        }

        links.swap(left, right);
        Ok(())
    }

    fn list_clear(&mut self, table: TableIx, row: RowId, col: ColIx) -> Result<(), EngineError> {
        self.links_mut(table, row, col)?.clear();
        Ok(())
    }

    fn backlinks(
        &self,
        origin_table: TableIx,
        origin_col: ColIx,
        target: RowId,
    ) -> Result<Vec<RowId>, EngineError> {
        let t = self.table(origin_table)?;
        let spec = t.check_col(origin_table, origin_col)?;

        let mut out = Vec::new();
        for (row, cells) in &t.rows {
            let links_here = match (spec, &cells[origin_col.as_usize()]) {
                (ColumnSpec::Link { .. }, Cell::Value(v)) => *v == ColumnValue::Row(target),
                (ColumnSpec::LinkList { .. }, Cell::Links(links)) => links.contains(&target),
                _ => false,
            };
            if links_here {
                out.push(*row);
            }
        }

        Ok(out)
    }
}

///
/// TESTS
///
