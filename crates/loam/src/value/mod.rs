pub(crate) mod coerce;

use crate::{
    object::RecordInstance,
    types::{Float32, Float64, Timestamp},
};

///
/// Value
///
/// Dynamic value representation crossing the accessor boundary.
///
/// Null    → the absent value; maps to the engine null for optional slots.
/// Record  → an ordered field literal used to construct or resolve a row.
/// Object  → a live reference to a managed or unmanaged record instance.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float32(Float32),
    Float64(Float64),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(Timestamp),
    /// Ordered list of values. Used for link-list transport.
    List(Vec<Self>),
    /// Ordered (name, value) field literal. Field order is preserved.
    Record(Vec<(String, Self)>),
    Object(RecordInstance),
}

impl Value {
    ///
    /// CONSTRUCTION
    ///

    /// Build a `Value::Record` from owned field pairs.
    pub fn record<N, I>(fields: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Self)>,
    {
        Self::Record(
            fields
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Build a `Value::List` from owned items.
    pub fn from_list<T>(items: Vec<T>) -> Self
    where
        T: Into<Self>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    ///
    /// TYPES
    ///

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Stable label used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Timestamp(_) => "timestamp",
            Self::List(_) => "list",
            Self::Record(_) => "record",
            Self::Object(_) => "object",
        }
    }

    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float32(_) | Self::Float64(_))
    }

    ///
    /// CONVERSION
    ///

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(b) = self { Some(*b) } else { None }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        if let Self::Int(i) = self { Some(*i) } else { None }
    }

    #[must_use]
    pub const fn as_text(&self) -> Option<&str> {
        if let Self::Text(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_blob(&self) -> Option<&[u8]> {
        if let Self::Blob(b) = self {
            Some(b.as_slice())
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_timestamp(&self) -> Option<Timestamp> {
        if let Self::Timestamp(t) = self {
            Some(*t)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_list(&self) -> Option<&[Self]> {
        if let Self::List(xs) = self {
            Some(xs.as_slice())
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_record(&self) -> Option<&[(String, Self)]> {
        if let Self::Record(fields) = self {
            Some(fields.as_slice())
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<&RecordInstance> {
        if let Self::Object(obj) = self {
            Some(obj)
        } else {
            None
        }
    }

    /// Look up a field in a `Record` literal by name.
    #[must_use]
    pub fn record_field(&self, name: &str) -> Option<&Self> {
        self.as_record()?
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }
}

#[macro_export]
macro_rules! impl_from_for {
    ( $( $type:ty => $variant:ident ),* $(,)? ) => {
        $(
            impl From<$type> for Value {
                fn from(v: $type) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_for! {
    bool           => Bool,
    i8             => Int,
    i16            => Int,
    i32            => Int,
    i64            => Int,
    u8             => Int,
    u16            => Int,
    u32            => Int,
    Float32        => Float32,
    Float64        => Float64,
    &str           => Text,
    String         => Text,
    Vec<u8>        => Blob,
    Timestamp      => Timestamp,
    RecordInstance => Object,
}

impl From<Vec<Self>> for Value {
    fn from(vec: Vec<Self>) -> Self {
        Self::List(vec)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

///
/// TESTS
///
