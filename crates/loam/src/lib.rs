//! Core runtime for Loam: schema model, dynamic values, accessor
//! synthesis, change notification, link collections, and the object
//! lifecycle manager, bound to a columnar row engine through a narrow
//! trait.
#![warn(unreachable_pub)]

pub(crate) mod access;
pub(crate) mod lifecycle;

// public exports are one module level down
pub mod collection;
pub mod error;
pub mod notify;
pub mod object;
pub mod obs;
pub mod schema;
pub mod store;
pub mod types;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, engines, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        collection::{LinkCollection, ReverseLinkView},
        notify::{ChangeEvent, ChangeKind, ListChange, Observer},
        object::RecordInstance,
        schema::{IntWidth, ObjectSchema, PropertyDescriptor, PropertyKind, SchemaRegistry},
        store::Store,
        value::Value,
    };
}
