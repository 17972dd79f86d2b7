mod float;
mod id;
mod timestamp;

pub use float::{Float32, Float64};
pub use id::{ColIx, RowId, StoreId, TableIx};
pub use timestamp::Timestamp;
