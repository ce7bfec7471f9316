use super::{AnyValidator, PathSegment, ValidationError, Validator, Value};

pub struct ArrayValidator {
    element: AnyValidator,
    min_len: Option<usize>,
    max_len: Option<usize>,
}

pub fn array(element: impl Validator + 'static) -> ArrayValidator {
    ArrayValidator {
        element: element.boxed(),
        min_len: None,
        max_len: None,
    }
}

impl ArrayValidator {
    pub fn min(mut self, min: usize) -> Self {
        self.min_len = Some(min);
        self
    }

    pub fn max(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }
}

impl Validator for ArrayValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let items = match value {
            Value::Null => return Ok(Value::Null),
            Value::Array(items) => items,
            other => {
                return Err(ValidationError::new(format!(
                    "value cannot be interpreted as 'array' (got {})",
                    other.kind()
                )))
            }
        };

        if let Some(min) = self.min_len {
            if items.len() < min {
                return Err(ValidationError::new(format!("array too short, min length is {}", min)));
            }
        }
        if let Some(max) = self.max_len {
            if items.len() > max {
                return Err(ValidationError::new(format!("array too long, max length is {}", max)));
            }
        }

        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                self.element
                    .validate(item)
                    .map_err(|e| e.within(PathSegment::Index(i)))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn type_name(&self) -> String {
        format!("[{}]", self.element.type_name())
    }
}
