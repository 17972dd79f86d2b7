use crate::store::engine::EngineError;
use std::fmt;
use thiserror::Error as ThisError;

///
/// AccessError
///
/// Structured runtime error raised at the accessor boundary.
/// Every engine-level failure is translated into one of these kinds;
/// nothing is swallowed and nothing is reported asynchronously.
///

#[derive(Clone, Debug, ThisError)]
#[error("{message}")]
pub struct AccessError {
    pub kind: AccessErrorKind,
    pub message: String,
}

impl AccessError {
    /// Construct an error with an explicit kind and message.
    pub fn new(kind: AccessErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Value does not conform to the property's declared type.
    pub(crate) fn type_mismatch(
        schema: &str,
        property: &str,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self::new(
            AccessErrorKind::TypeMismatch,
            format!("'{schema}.{property}' expects {expected}, got {actual}"),
        )
    }

    /// Row deleted, or the instance was never attached to a live row.
    pub(crate) fn invalidated(schema: &str) -> Self {
        Self::new(
            AccessErrorKind::InvalidatedAccess,
            format!("'{schema}' object is invalidated or deleted"),
        )
    }

    /// Store accessed from a thread other than its owner.
    pub(crate) fn wrong_thread() -> Self {
        Self::new(
            AccessErrorKind::WrongThread,
            "store accessed from a thread other than the one that opened it",
        )
    }

    /// Mutation attempted outside a write transaction.
    pub(crate) fn not_in_write_transaction(schema: &str) -> Self {
        Self::new(
            AccessErrorKind::NotInWriteTransaction,
            format!("cannot mutate '{schema}' outside a write transaction"),
        )
    }

    /// Write to a primary-key property after insertion.
    pub(crate) fn immutable_primary_key(schema: &str, property: &str) -> Self {
        Self::new(
            AccessErrorKind::ImmutablePrimaryKey,
            format!("primary key '{schema}.{property}' cannot be changed after insertion"),
        )
    }

    /// Collection index outside the valid range.
    pub(crate) fn index_out_of_range(schema: &str, property: &str, index: usize, len: usize) -> Self {
        Self::new(
            AccessErrorKind::IndexOutOfRange,
            format!("index {index} out of range for '{schema}.{property}' (len {len})"),
        )
    }

    /// Direct link to a row owned by a different open store.
    pub(crate) fn cross_store_link(schema: &str) -> Self {
        Self::new(
            AccessErrorKind::CrossStoreLink,
            format!("'{schema}' object is managed by a different store; use create instead"),
        )
    }

    /// Operation the property kind does not support.
    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::new(AccessErrorKind::UnsupportedOperation, message)
    }

    /// Dynamic access with a property name the schema does not declare.
    pub(crate) fn unknown_property(schema: &str, property: &str) -> Self {
        Self::new(
            AccessErrorKind::UnknownProperty,
            format!("schema '{schema}' has no property named '{property}'"),
        )
    }

    /// Create-without-update on a primary key that already exists.
    pub(crate) fn duplicate_primary_key(schema: &str, key: impl fmt::Display) -> Self {
        Self::new(
            AccessErrorKind::DuplicatePrimaryKey,
            format!("'{schema}' already has an object with primary key {key}"),
        )
    }

    /// Engine invariant breakage surfaced through the accessor boundary.
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(AccessErrorKind::Internal, message)
    }

    /// Translate an engine failure into the domain taxonomy, naming
    /// the offending schema and property.
    pub(crate) fn from_engine(schema: &str, property: &str, err: &EngineError) -> Self {
        match err {
            EngineError::RowDetached { .. } => Self::invalidated(schema),
            EngineError::IndexOutOfRange { index, len } => {
                Self::index_out_of_range(schema, property, *index, *len)
            }
            EngineError::UnknownTable { .. }
            | EngineError::UnknownColumn { .. }
            | EngineError::CellKindMismatch { .. } => {
                Self::internal(format!("engine failure at '{schema}.{property}': {err}"))
            }
        }
    }

    #[must_use]
    pub fn display_with_kind(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}

///
/// AccessErrorKind
/// Domain taxonomy for accessor-layer failures.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessErrorKind {
    TypeMismatch,
    InvalidatedAccess,
    WrongThread,
    NotInWriteTransaction,
    ImmutablePrimaryKey,
    IndexOutOfRange,
    CrossStoreLink,
    UnsupportedOperation,
    UnknownProperty,
    DuplicatePrimaryKey,
    Internal,
}

impl fmt::Display for AccessErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TypeMismatch => "type_mismatch",
            Self::InvalidatedAccess => "invalidated_access",
            Self::WrongThread => "wrong_thread",
            Self::NotInWriteTransaction => "not_in_write_transaction",
            Self::ImmutablePrimaryKey => "immutable_primary_key",
            Self::IndexOutOfRange => "index_out_of_range",
            Self::CrossStoreLink => "cross_store_link",
            Self::UnsupportedOperation => "unsupported_operation",
            Self::UnknownProperty => "unknown_property",
            Self::DuplicatePrimaryKey => "duplicate_primary_key",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// SchemaError
///
/// Registry-build-time validation failures. These are raised once, at
/// store open, never during row access.
///

#[derive(Clone, Debug, ThisError)]
pub enum SchemaError {
    #[error("schema '{schema}' declared more than once")]
    DuplicateSchema { schema: String },

    #[error("schema '{schema}' declares property '{property}' more than once")]
    DuplicateProperty { schema: String, property: String },

    #[error("schema '{schema}' declares more than one primary key")]
    MultiplePrimaryKeys { schema: String },

    #[error("primary key '{schema}.{property}' must be a non-optional integer or text property")]
    InvalidPrimaryKey { schema: String, property: String },

    #[error("link property '{schema}.{property}' targets unknown schema '{target}'")]
    UnknownLinkTarget {
        schema: String,
        property: String,
        target: String,
    },

    #[error(
        "linking-objects property '{schema}.{property}' names '{target}.{origin}', which is not a link back to '{schema}'"
    )]
    InvalidBacklinkOrigin {
        schema: String,
        property: String,
        target: String,
        origin: String,
    },

    #[error("link property '{schema}.{property}' must be declared optional")]
    RequiredLink { schema: String, property: String },

    #[error("property '{schema}.{property}' uses the unsupported dynamic 'any' kind")]
    UnsupportedAny { schema: String, property: String },

    #[error("default value for '{schema}.{property}' does not match the declared property type")]
    DefaultTypeMismatch { schema: String, property: String },

    #[error("schema '{schema}' has no property named '{property}' for default value")]
    UnknownDefault { schema: String, property: String },
}

///
/// TESTS
///
