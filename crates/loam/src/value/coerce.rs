//! Box/unbox: bidirectional conversion between the dynamic `Value`
//! representation and engine-native column values.
//!
//! Every conversion validates conformance first and fails with
//! `TypeMismatch` naming the expected and actual types. Numeric
//! targets accept any numeric dynamic value; everything else is
//! strict. Link coercion lives in the lifecycle manager, which owns
//! the resolve modes.

use crate::{
    error::AccessError,
    obs::{self, ObsEvent},
    schema::{PropertyDescriptor, PropertyKind},
    store::engine::ColumnValue,
    types::{Float32, Float64},
    value::Value,
};
use num_traits::ToPrimitive;

fn mismatch(schema: &str, property: &str, expected: &str, actual: &str) -> AccessError {
    obs::record(ObsEvent::CoercionFailure);
    AccessError::type_mismatch(schema, property, expected, actual)
}

///
/// UNBOX
///

/// Convert a dynamic value into the engine representation for one
/// scalar property. Integer values are already carried widened; the
/// matching narrow happens on read.
pub(crate) fn unbox_scalar(
    schema: &str,
    prop: &PropertyDescriptor,
    value: &Value,
) -> Result<ColumnValue, AccessError> {
    let expected = prop.kind().type_name();

    if value.is_null() {
        return if prop.is_optional() {
            Ok(ColumnValue::Null)
        } else {
            Err(mismatch(schema, prop.name(), expected, "null"))
        };
    }

    match prop.kind() {
        PropertyKind::Bool => match value {
            Value::Bool(b) => Ok(ColumnValue::Bool(*b)),
            other => Err(mismatch(schema, prop.name(), expected, other.type_name())),
        },

        PropertyKind::Int(_) => match value {
            Value::Int(i) => Ok(ColumnValue::Int(*i)),
            other => Err(mismatch(schema, prop.name(), expected, other.type_name())),
        },

        PropertyKind::Float32 => {
            let raw = match value {
                Value::Int(i) => i.to_f32(),
                Value::Float32(f) => Some(f.get()),
                Value::Float64(d) => d.get().to_f32(),
                _ => None,
            };

            let Some(raw) = raw else {
                return Err(mismatch(schema, prop.name(), expected, value.type_name()));
            };

            Float32::try_new(raw)
                .map(ColumnValue::Float32)
                .ok_or_else(|| mismatch(schema, prop.name(), "finite float32", "non-finite value"))
        }

        PropertyKind::Float64 => {
            let raw = match value {
                Value::Int(i) => i.to_f64(),
                Value::Float32(f) => Some(f64::from(f.get())),
                Value::Float64(d) => Some(d.get()),
                _ => None,
            };

            let Some(raw) = raw else {
                return Err(mismatch(schema, prop.name(), expected, value.type_name()));
            };

            Float64::try_new(raw)
                .map(ColumnValue::Float64)
                .ok_or_else(|| mismatch(schema, prop.name(), "finite float64", "non-finite value"))
        }

        PropertyKind::Text => match value {
            Value::Text(s) => Ok(ColumnValue::Text(s.clone())),
            other => Err(mismatch(schema, prop.name(), expected, other.type_name())),
        },

        PropertyKind::Blob => match value {
            Value::Blob(b) => Ok(ColumnValue::Blob(b.clone())),
            other => Err(mismatch(schema, prop.name(), expected, other.type_name())),
        },

        PropertyKind::Timestamp => match value {
            Value::Timestamp(t) => Ok(ColumnValue::Timestamp(*t)),
            other => Err(mismatch(schema, prop.name(), expected, other.type_name())),
        },

        PropertyKind::Any => Err(AccessError::unsupported(format!(
            "'{schema}.{}' is a dynamic 'any' property; writes are unsupported",
            prop.name()
        ))),

        PropertyKind::Object { .. } | PropertyKind::List { .. } | PropertyKind::LinkingObjects { .. } => {
            Err(AccessError::internal(format!(
                "scalar coercion reached link property '{schema}.{}'",
                prop.name()
            )))
        }
    }
}

///
/// BOX
///

/// Convert an engine value back into the dynamic representation,
/// narrowing integers to the property's declared width.
pub(crate) fn box_scalar(prop: &PropertyDescriptor, raw: ColumnValue) -> Value {
    match raw {
        ColumnValue::Null => Value::Null,
        ColumnValue::Bool(b) => Value::Bool(b),
        ColumnValue::Int(i) => match prop.kind() {
            PropertyKind::Int(width) => Value::Int(width.narrow(i)),
            _ => Value::Int(i),
        },
        ColumnValue::Float32(f) => Value::Float32(f),
        ColumnValue::Float64(f) => Value::Float64(f),
        ColumnValue::Text(s) => Value::Text(s),
        ColumnValue::Blob(b) => Value::Blob(b),
        ColumnValue::Timestamp(t) => Value::Timestamp(t),
        ColumnValue::Row(_) => Value::Null,
    }
}

///
/// SLOT VALIDATION
///

/// Validate a dynamic value for an unmanaged slot. Scalars are
/// normalized through unbox/box so unmanaged instances behave exactly
/// like managed rows; link slots keep the dynamic value as given.
pub(crate) fn validate_slot(
    schema: &str,
    prop: &PropertyDescriptor,
    value: Value,
) -> Result<Value, AccessError> {
    if prop.kind().is_scalar() {
        let raw = unbox_scalar(schema, prop, &value)?;
        return Ok(box_scalar(prop, raw));
    }

    match prop.kind() {
        PropertyKind::Object { .. } => match value {
            Value::Null | Value::Object(_) | Value::Record(_) => Ok(value),
            other => Err(mismatch(schema, prop.name(), "object", other.type_name())),
        },

        PropertyKind::List { .. } => match value {
            Value::Null => Ok(Value::List(Vec::new())),
            Value::List(items) => {
                for item in &items {
                    if !matches!(item, Value::Object(_) | Value::Record(_)) {
                        return Err(mismatch(schema, prop.name(), "object", item.type_name()));
                    }
                }
                Ok(Value::List(items))
            }
            other => Err(mismatch(schema, prop.name(), "list", other.type_name())),
        },

        PropertyKind::LinkingObjects { .. } => Err(AccessError::unsupported(format!(
            "'{schema}.{}' is a derived linking-objects view and cannot be written",
            prop.name()
        ))),

        PropertyKind::Any => Err(AccessError::unsupported(format!(
            "'{schema}.{}' is a dynamic 'any' property; writes are unsupported",
            prop.name()
        ))),

        _ => Err(AccessError::internal(format!(
            "slot validation reached scalar property '{schema}.{}'",
            prop.name()
        ))),
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::AccessErrorKind, schema::IntWidth, types::Timestamp};
    use proptest::prelude::*;

    fn prop(kind: PropertyKind) -> PropertyDescriptor {
        PropertyDescriptor::new("field", kind)
    }

    fn opt(kind: PropertyKind) -> PropertyDescriptor {
        PropertyDescriptor::new("field", kind).optional()
    }

    #[test]
    fn null_into_non_optional_is_a_type_mismatch() {
        for kind in [
            PropertyKind::Bool,
            PropertyKind::Int(IntWidth::W64),
            PropertyKind::Float64,
            PropertyKind::Text,
            PropertyKind::Blob,
            PropertyKind::Timestamp,
        ] {
            let err = unbox_scalar("S", &prop(kind), &Value::Null).unwrap_err();
            assert_eq!(err.kind, AccessErrorKind::TypeMismatch);
        }
    }

    #[test]
    fn null_into_optional_maps_to_engine_null() {
        let raw = unbox_scalar("S", &opt(PropertyKind::Text), &Value::Null).unwrap();
        assert_eq!(raw, ColumnValue::Null);
        assert_eq!(box_scalar(&opt(PropertyKind::Text), raw), Value::Null);
    }

    #[test]
    fn boundary_scalars_round_trip() {
        let cases = [
            (PropertyKind::Int(IntWidth::W64), Value::Int(0)),
            (PropertyKind::Int(IntWidth::W64), Value::Int(-1)),
            (PropertyKind::Int(IntWidth::W64), Value::Int(i64::MAX)),
            (PropertyKind::Int(IntWidth::W64), Value::Int(i64::MIN)),
            (PropertyKind::Text, Value::Text(String::new())),
            (PropertyKind::Blob, Value::Blob(Vec::new())),
            (PropertyKind::Bool, Value::Bool(false)),
            (
                PropertyKind::Timestamp,
                Value::Timestamp(Timestamp::EPOCH),
            ),
        ];

        for (kind, value) in cases {
            let p = prop(kind);
            let raw = unbox_scalar("S", &p, &value).unwrap();
            assert_eq!(box_scalar(&p, raw), value);
        }
    }

    #[test]
    fn float_targets_accept_any_numeric() {
        let p = prop(PropertyKind::Float64);
        let raw = unbox_scalar("S", &p, &Value::Int(3)).unwrap();
        assert_eq!(raw, ColumnValue::Float64(Float64::try_new(3.0).unwrap()));

        let p = prop(PropertyKind::Float32);
        let raw = unbox_scalar("S", &p, &Value::Float64(Float64::try_new(1.5).unwrap())).unwrap();
        assert_eq!(raw, ColumnValue::Float32(Float32::try_new(1.5).unwrap()));
    }

    #[test]
    fn int_targets_are_strict() {
        let p = prop(PropertyKind::Int(IntWidth::W64));
        let err = unbox_scalar("S", &p, &Value::Float64(Float64::try_new(1.0).unwrap()))
            .unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::TypeMismatch);
        assert!(err.message.contains("S.field"));
    }

    #[test]
    fn overflowing_float32_is_rejected_as_non_finite() {
        let p = prop(PropertyKind::Float32);
        let huge = Value::Float64(Float64::try_new(f64::MAX).unwrap());
        let err = unbox_scalar("S", &p, &huge).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::TypeMismatch);
        assert!(err.message.contains("non-finite"));
    }

    #[test]
    fn narrow_widths_round_trip_through_box() {
        let p = prop(PropertyKind::Int(IntWidth::W16));
        let raw = unbox_scalar("S", &p, &Value::Int(70_000)).unwrap();
        // stored widened; read narrows by truncation
        assert_eq!(raw, ColumnValue::Int(70_000));
        assert_eq!(box_scalar(&p, raw), Value::Int(70_000_i64 as i16 as i64));
    }

    #[test]
    fn slot_validation_normalizes_scalars_and_keeps_links() {
        let p = prop(PropertyKind::Float64);
        let v = validate_slot("S", &p, Value::Int(2)).unwrap();
        assert_eq!(v, Value::Float64(Float64::try_new(2.0).unwrap()));

        let link = opt(PropertyKind::Object {
            target: "Pet".into(),
        });
        let v = validate_slot("S", &link, Value::record([("name", Value::Text("Rex".into()))]))
            .unwrap();
        assert!(matches!(v, Value::Record(_)));

        let err = validate_slot("S", &link, Value::Int(1)).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::TypeMismatch);
    }

    #[test]
    fn list_slot_accepts_only_link_shaped_elements() {
        let p = prop(PropertyKind::List {
            target: "Pet".into(),
        });
        let err =
            validate_slot("S", &p, Value::List(vec![Value::Int(1)])).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::TypeMismatch);

        let v = validate_slot("S", &p, Value::Null).unwrap();
        assert_eq!(v, Value::List(Vec::new()));
    }

    proptest! {
        #[test]
        fn prop_int_round_trips(v in any::<i64>()) {
            let p = prop(PropertyKind::Int(IntWidth::W64));
            let raw = unbox_scalar("S", &p, &Value::Int(v)).unwrap();
            prop_assert_eq!(box_scalar(&p, raw), Value::Int(v));
        }

        #[test]
        fn prop_text_round_trips(s in ".*") {
            let p = prop(PropertyKind::Text);
            let raw = unbox_scalar("S", &p, &Value::Text(s.clone())).unwrap();
            prop_assert_eq!(box_scalar(&p, raw), Value::Text(s));
        }

        #[test]
        fn prop_blob_round_trips(b in proptest::collection::vec(any::<u8>(), 0..256)) {
            let p = prop(PropertyKind::Blob);
            let raw = unbox_scalar("S", &p, &Value::Blob(b.clone())).unwrap();
            prop_assert_eq!(box_scalar(&p, raw), Value::Blob(b));
        }

        #[test]
        fn prop_narrowing_matches_cast(v in any::<i64>()) {
            let p = prop(PropertyKind::Int(IntWidth::W8));
            let raw = unbox_scalar("S", &p, &Value::Int(v)).unwrap();
            prop_assert_eq!(box_scalar(&p, raw), Value::Int(v as i8 as i64));
        }
    }
}
