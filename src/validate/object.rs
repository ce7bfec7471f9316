use super::{AnyValidator, Map, PathSegment, ValidationError, Validator, Value};
use std::collections::BTreeMap;

/// Validates string-keyed mappings field by field. Undeclared keys are dropped.
#[derive(Clone, Default)]
pub struct ObjectValidator {
    fields: BTreeMap<String, AnyValidator>,
}

pub fn object<K, I>(fields: I) -> ObjectValidator
where
    K: Into<String>,
    I: IntoIterator<Item = (K, AnyValidator)>,
{
    ObjectValidator {
        fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
    }
}

impl ObjectValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, validator: impl Validator + 'static) -> Self {
        self.fields.insert(name.into(), validator.boxed());
        self
    }

    pub fn fields(&self) -> &BTreeMap<String, AnyValidator> {
        &self.fields
    }

    /// Copy of this shape with one more field; `self` is left untouched.
    pub fn extend(&self, name: impl Into<String>, validator: impl Validator + 'static) -> Self {
        self.clone().field(name, validator)
    }

    /// Validates and unwraps into the resulting map. `Null` input yields `None`.
    pub fn validate_map(&self, value: Value) -> Result<Option<Map>, ValidationError> {
        Ok(self.validate(value)?.into_object())
    }
}

impl Validator for ObjectValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let mut input = match value {
            Value::Null => return Ok(Value::Null),
            Value::Object(map) => map,
            other => {
                return Err(ValidationError::new(format!(
                    "object value must be a string-keyed mapping (got {})",
                    other.kind()
                )))
            }
        };

        let mut result = Map::new();
        for (name, validator) in &self.fields {
            let raw = match input.remove(name) {
                Some(v) => v,
                None if validator.is_optional() => continue,
                None => Value::Null,
            };
            let validated = validator
                .validate(raw)
                .map_err(|e| e.within(PathSegment::Field(name.clone())))?;
            result.insert(name.clone(), validated);
        }

        Ok(Value::Object(result))
    }

    fn type_name(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(name, v)| format!("{}: {}", name, v.type_name()))
            .collect();
        format!("{{{}}}", fields.join(", "))
    }
}
