use crate::{types::ColIx, value::Value};
use serde::{Deserialize, Serialize};

///
/// IntWidth
///
/// Host representation width of an integer property. Storage is always
/// a 64-bit signed integer; writers widen and readers narrow by plain
/// truncation. Overflow on narrow is the caller's responsibility and is
/// intentionally not checked here.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    /// Truncate a stored 64-bit value down to this width.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn narrow(self, v: i64) -> i64 {
        match self {
            Self::W8 => v as i8 as i64,
            Self::W16 => v as i16 as i64,
            Self::W32 => v as i32 as i64,
            Self::W64 => v,
        }
    }
}

///
/// PropertyKind
///
/// Tagged semantic type of one property. Link kinds carry the target
/// schema by name; names are resolved to table indices once, when the
/// registry is built.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PropertyKind {
    Bool,
    Int(IntWidth),
    Float32,
    Float64,
    Text,
    Blob,
    Timestamp,
    /// Link to at most one row of the target schema.
    Object { target: String },
    /// Ordered link-list of rows of the target schema.
    List { target: String },
    /// Derived, read-only view of rows whose `origin_property` links here.
    LinkingObjects {
        target: String,
        origin_property: String,
    },
    /// Dynamic untyped kind. Rejected at schema creation.
    Any,
}

impl PropertyKind {
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Int(_)
                | Self::Float32
                | Self::Float64
                | Self::Text
                | Self::Blob
                | Self::Timestamp
        )
    }

    #[must_use]
    pub const fn is_link(&self) -> bool {
        matches!(self, Self::Object { .. })
    }

    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List { .. })
    }

    #[must_use]
    pub const fn is_backlink(&self) -> bool {
        matches!(self, Self::LinkingObjects { .. })
    }

    /// Backlink properties own no storage; everything else binds a column.
    #[must_use]
    pub const fn has_column(&self) -> bool {
        !self.is_backlink()
    }

    /// Stable label used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int(_) => "int",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Text => "text",
            Self::Blob => "blob",
            Self::Timestamp => "timestamp",
            Self::Object { .. } => "object",
            Self::List { .. } => "list",
            Self::LinkingObjects { .. } => "linking objects",
            Self::Any => "any",
        }
    }

    /// Whether a plain literal conforms to this kind. Used for default
    /// values at schema build; row-access validation lives in the
    /// coercion layer where failures carry full context.
    #[must_use]
    pub(crate) const fn accepts_literal(&self, value: &Value, optional: bool) -> bool {
        if value.is_null() {
            return optional;
        }

        match self {
            Self::Bool => matches!(value, Value::Bool(_)),
            Self::Int(_) => matches!(value, Value::Int(_)),
            Self::Float32 | Self::Float64 => value.is_numeric(),
            Self::Text => matches!(value, Value::Text(_)),
            Self::Blob => matches!(value, Value::Blob(_)),
            Self::Timestamp => matches!(value, Value::Timestamp(_)),
            _ => false,
        }
    }
}

///
/// PropertyDescriptor
///
/// One named, typed property of an object schema. The bound column
/// index is assigned once during registry build and immutable after.
///

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    name: String,
    kind: PropertyKind,
    optional: bool,
    primary_key: bool,
    column: Option<ColIx>,
}

impl PropertyDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
            primary_key: false,
            column: None,
        }
    }

    /// Mark the property as nullable.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark the property as the schema's primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    #[must_use]
    pub const fn is_optional(&self) -> bool {
        self.optional
    }

    #[must_use]
    pub const fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Bound column index; `None` for backlink properties.
    #[must_use]
    pub const fn column(&self) -> Option<ColIx> {
        self.column
    }

    pub(crate) const fn bind_column(&mut self, col: ColIx) {
        self.column = Some(col);
    }
}

///
/// TESTS
///
