mod property;
mod registry;

pub use property::{IntWidth, PropertyDescriptor, PropertyKind};
pub use registry::SchemaRegistry;

use crate::{error::SchemaError, value::Value};
use std::collections::BTreeMap;

///
/// ObjectSchema
///
/// Ordered set of property descriptors for one record type, plus an
/// explicit default-value table consulted at unmanaged construction
/// and row creation. Created at store open, immutable afterward; owns
/// no row data.
///

#[derive(Clone, Debug)]
pub struct ObjectSchema {
    name: String,
    properties: Vec<PropertyDescriptor>,
    by_name: BTreeMap<String, usize>,
    primary_key: Option<usize>,
    defaults: BTreeMap<String, Value>,
}

impl ObjectSchema {
    /// Validate and construct a schema from its property descriptors.
    pub fn new(
        name: impl Into<String>,
        properties: Vec<PropertyDescriptor>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();

        let mut by_name = BTreeMap::new();
        let mut primary_key = None;

        for (index, prop) in properties.iter().enumerate() {
            if by_name.insert(prop.name().to_string(), index).is_some() {
                return Err(SchemaError::DuplicateProperty {
                    schema: name,
                    property: prop.name().to_string(),
                });
            }

            if matches!(prop.kind(), PropertyKind::Any) {
                return Err(SchemaError::UnsupportedAny {
                    schema: name,
                    property: prop.name().to_string(),
                });
            }

            if prop.kind().is_link() && !prop.is_optional() {
                return Err(SchemaError::RequiredLink {
                    schema: name,
                    property: prop.name().to_string(),
                });
            }

            if prop.is_primary_key() {
                if primary_key.is_some() {
                    return Err(SchemaError::MultiplePrimaryKeys { schema: name });
                }

                let keyable = matches!(prop.kind(), PropertyKind::Int(_) | PropertyKind::Text);
                if !keyable || prop.is_optional() {
                    return Err(SchemaError::InvalidPrimaryKey {
                        schema: name,
                        property: prop.name().to_string(),
                    });
                }

                primary_key = Some(index);
            }
        }

        Ok(Self {
            name,
            properties,
            by_name,
            primary_key,
            defaults: BTreeMap::new(),
        })
    }

    /// Attach a default value for one property, validated against its kind.
    pub fn with_default(
        mut self,
        property: &str,
        value: Value,
    ) -> Result<Self, SchemaError> {
        let Some((_, prop)) = self.property(property) else {
            return Err(SchemaError::UnknownDefault {
                schema: self.name,
                property: property.to_string(),
            });
        };

        if !prop.kind().accepts_literal(&value, prop.is_optional()) {
            return Err(SchemaError::DefaultTypeMismatch {
                schema: self.name,
                property: property.to_string(),
            });
        }

        self.defaults.insert(property.to_string(), value);
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Look up a property by name, returning its index and descriptor.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<(usize, &PropertyDescriptor)> {
        let index = *self.by_name.get(name)?;
        Some((index, &self.properties[index]))
    }

    #[must_use]
    pub fn property_at(&self, index: usize) -> &PropertyDescriptor {
        &self.properties[index]
    }

    #[must_use]
    pub const fn primary_key_index(&self) -> Option<usize> {
        self.primary_key
    }

    #[must_use]
    pub fn primary_key(&self) -> Option<&PropertyDescriptor> {
        self.primary_key.map(|ix| &self.properties[ix])
    }

    /// Default value for a property, if the schema declares one.
    #[must_use]
    pub fn default_for(&self, property: &str) -> Option<&Value> {
        self.defaults.get(property)
    }

    pub(crate) fn property_at_mut(&mut self, index: usize) -> &mut PropertyDescriptor {
        &mut self.properties[index]
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn text(name: &str) -> PropertyDescriptor {
        PropertyDescriptor::new(name, PropertyKind::Text)
    }

    #[test]
    fn rejects_duplicate_property_names() {
        let err = ObjectSchema::new("Person", vec![text("name"), text("name")]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateProperty { .. }));
    }

    #[test]
    fn rejects_dynamic_any_kind_at_creation() {
        let err = ObjectSchema::new(
            "Person",
            vec![PropertyDescriptor::new("anything", PropertyKind::Any)],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedAny { .. }));
    }

    #[test]
    fn rejects_optional_primary_key() {
        let err = ObjectSchema::new(
            "Account",
            vec![
                PropertyDescriptor::new("id", PropertyKind::Int(IntWidth::W64))
                    .primary_key()
                    .optional(),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPrimaryKey { .. }));
    }

    #[test]
    fn rejects_float_primary_key() {
        let err = ObjectSchema::new(
            "Account",
            vec![PropertyDescriptor::new("id", PropertyKind::Float64).primary_key()],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPrimaryKey { .. }));
    }

    #[test]
    fn rejects_required_object_link() {
        let err = ObjectSchema::new(
            "Person",
            vec![PropertyDescriptor::new(
                "dog",
                PropertyKind::Object {
                    target: "Dog".into(),
                },
            )],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::RequiredLink { .. }));
    }

    #[test]
    fn defaults_are_type_checked() {
        let schema = ObjectSchema::new("Person", vec![text("name")]).unwrap();
        let err = schema
            .clone()
            .with_default("name", Value::Int(1))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DefaultTypeMismatch { .. }));

        let schema = schema
            .with_default("name", Value::Text("anon".into()))
            .unwrap();
        assert_eq!(
            schema.default_for("name"),
            Some(&Value::Text("anon".into()))
        );
    }

    #[test]
    fn property_lookup_returns_declaration_index() {
        let schema = ObjectSchema::new("Person", vec![text("name"), text("city")]).unwrap();
        let (ix, prop) = schema.property("city").unwrap();
        assert_eq!(ix, 1);
        assert_eq!(prop.name(), "city");
        assert!(schema.property("missing").is_none());
    }
}
