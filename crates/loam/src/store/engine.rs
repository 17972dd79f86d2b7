use crate::types::{ColIx, Float32, Float64, RowId, TableIx, Timestamp};
use thiserror::Error as ThisError;

///
/// ColumnValue
///
/// Engine-native typed value for one cell. This is the narrow seam
/// between the coercion layer and the engine; the dynamic `Value`
/// representation never crosses it.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    Int(i64),
    Float32(Float32),
    Float64(Float64),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(Timestamp),
    /// Reference to a row of the column's declared target table.
    Row(RowId),
}

impl ColumnValue {
    /// Stable label used in error messages.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Timestamp(_) => "timestamp",
            Self::Row(_) => "row ref",
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

///
/// ColumnSpec
///
/// Shape of one table column, declared at table registration. Link
/// columns carry their target table so the engine can maintain
/// referential hygiene on row deletion and answer backlink queries.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnSpec {
    Value,
    Link { target: TableIx },
    LinkList { target: TableIx },
}

///
/// EngineError
///
/// Failures below the accessor boundary. Always translated into the
/// domain taxonomy before reaching a caller.
///

#[derive(Clone, Debug, ThisError)]
pub enum EngineError {
    #[error("table {table} is not registered")]
    UnknownTable { table: TableIx },

    #[error("column {col} is not declared on table {table}")]
    UnknownColumn { table: TableIx, col: ColIx },

    #[error("row {row} of table {table} is detached")]
    RowDetached { table: TableIx, row: RowId },

    #[error("column {col} holds {found}, not {expected}")]
    CellKindMismatch {
        col: ColIx,
        expected: &'static str,
        found: &'static str,
    },

    #[error("link-list index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

///
/// StorageEngine
///
/// The narrow interface this layer consumes from the storage engine:
/// table registration at open, row allocation, per-column typed
/// get/set, in-place integer add, link-list operations, and backlink
/// enumeration. Transactions, durability, and layout are the engine's
/// own concern and are invisible here.
///

pub trait StorageEngine {
    /// Register a table with the given column shapes. Called once per
    /// schema at store open, in registry order.
    fn add_table(&mut self, columns: Vec<ColumnSpec>) -> TableIx;

    /// Allocate a fresh row with all cells null / empty.
    fn insert_row(&mut self, table: TableIx) -> Result<RowId, EngineError>;

    /// Delete a row. Forward links and link-list entries pointing at it
    /// are cleared engine-side.
    fn delete_row(&mut self, table: TableIx, row: RowId) -> Result<(), EngineError>;

    /// Whether the row currently exists.
    fn is_attached(&self, table: TableIx, row: RowId) -> bool;

    /// All live rows of a table, in allocation order.
    fn rows(&self, table: TableIx) -> Result<Vec<RowId>, EngineError>;

    fn get(&self, table: TableIx, row: RowId, col: ColIx) -> Result<ColumnValue, EngineError>;

    fn set(
        &mut self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        value: ColumnValue,
    ) -> Result<(), EngineError>;

    /// Add `delta` to an integer cell in place, returning the new value.
    fn add_int(
        &mut self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        delta: i64,
    ) -> Result<i64, EngineError>;

    fn list_len(&self, table: TableIx, row: RowId, col: ColIx) -> Result<usize, EngineError>;

    fn list_get(
        &self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        index: usize,
    ) -> Result<RowId, EngineError>;

    fn list_insert(
        &mut self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        index: usize,
        target: RowId,
    ) -> Result<(), EngineError>;

    fn list_set(
        &mut self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        index: usize,
        target: RowId,
    ) -> Result<(), EngineError>;

    fn list_erase(
        &mut self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        index: usize,
    ) -> Result<(), EngineError>;

    fn list_swap(
        &mut self,
        table: TableIx,
        row: RowId,
        col: ColIx,
        left: usize,
        right: usize,
    ) -> Result<(), EngineError>;

    fn list_clear(&mut self, table: TableIx, row: RowId, col: ColIx) -> Result<(), EngineError>;

    /// Rows of `origin_table` whose `origin_col` currently links to
    /// `target`, covering both single-link and link-list columns.
    fn backlinks(
        &self,
        origin_table: TableIx,
        origin_col: ColIx,
        target: RowId,
    ) -> Result<Vec<RowId>, EngineError>;
}
