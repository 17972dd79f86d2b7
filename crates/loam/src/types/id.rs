use derive_more::Display;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

///
/// RowId
///
/// Stable identifier of one row within one table of an open store.
/// Allocated by the storage engine on insert and never reused while
/// the store is open.
///

#[repr(transparent)]
#[derive(
    Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
pub struct RowId(u64);

impl RowId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

///
/// TableIx
///
/// Position of a table inside an open store, assigned at store open
/// in schema-registration order.
///

#[repr(transparent)]
#[derive(
    Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
pub struct TableIx(u32);

impl TableIx {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    pub(crate) const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

///
/// ColIx
///
/// Bound column index of a property. Assigned once when the schema
/// registry is built and immutable afterward.
///

#[repr(transparent)]
#[derive(
    Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
pub struct ColIx(u32);

impl ColIx {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    pub(crate) const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

///
/// StoreId
///
/// Identity of one open store, minted at open time. Two handles refer
/// to the same store exactly when their ids are equal; links are only
/// valid between rows that share a store id.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StoreId(Ulid);

impl StoreId {
    #[must_use]
    pub(crate) fn mint() -> Self {
        Self(Ulid::new())
    }

    #[must_use]
    pub const fn get(self) -> Ulid {
        self.0
    }
}

///
/// TESTS
///
