//! Composable validators over loosely typed `Value`s.
//!
//! Leaves (`string`, `int`, `float`, `datetime`, `boolean`) map `Null` to `Null`; presence is
//! enforced by wrapping in `not_null`. `optional` only matters inside `object`, where it allows a
//! key to be missing. Validators are pure and hold no database knowledge.

mod array;
mod datetime;
mod number;
mod object;
mod string;
mod value;

pub use array::{array, ArrayValidator};
pub use datetime::{datetime, DateTimeValidator};
pub use number::{boolean, float, int, BooleanValidator, FloatValidator, IntValidator};
pub use object::{object, ObjectValidator};
pub use string::{string, StringCase, StringValidator};
pub use value::{Map, Value};

use std::fmt;
use std::sync::Arc;

/// One step of the path to a failing value: an object field or an array index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// Outermost segment first.
    pub path: Vec<PathSegment>,
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        ValidationError {
            path: Vec::new(),
            message: message.into(),
        }
    }

    /// Prefix the path with an enclosing segment.
    pub fn within(mut self, segment: PathSegment) -> Self {
        self.path.insert(0, segment);
        self
    }

    /// Rendered path, e.g. `groups[0].name`. Empty for top-level failures.
    pub fn path_string(&self) -> String {
        let mut out = String::new();
        for seg in &self.path {
            match seg {
                PathSegment::Field(name) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(name);
                }
                PathSegment::Index(i) => out.push_str(&format!("[{}]", i)),
            }
        }
        out
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path_string(), self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

pub trait Validator: Send + Sync {
    fn validate(&self, value: Value) -> Result<Value, ValidationError>;

    fn type_name(&self) -> String;

    /// Whether an enclosing object may omit this field entirely.
    fn is_optional(&self) -> bool {
        false
    }

    fn boxed(self) -> AnyValidator
    where
        Self: Sized + 'static,
    {
        AnyValidator(Arc::new(self))
    }
}

/// Type-erased, shareable validator handle.
#[derive(Clone)]
pub struct AnyValidator(Arc<dyn Validator>);

impl Validator for AnyValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        self.0.validate(value)
    }

    fn type_name(&self) -> String {
        self.0.type_name()
    }

    fn is_optional(&self) -> bool {
        self.0.is_optional()
    }

    fn boxed(self) -> AnyValidator
    where
        Self: Sized + 'static,
    {
        self
    }
}

impl fmt::Debug for AnyValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

/// Rejects `Null` before and after delegating.
pub struct NotNullValidator {
    inner: AnyValidator,
}

pub fn not_null(inner: impl Validator + 'static) -> NotNullValidator {
    NotNullValidator { inner: inner.boxed() }
}

impl Validator for NotNullValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        if value.is_null() {
            return Err(ValidationError::new("value cannot be null, it is required"));
        }
        let validated = self.inner.validate(value)?;
        if validated.is_null() {
            return Err(ValidationError::new("value cannot be null-equivalent, it is required"));
        }
        Ok(validated)
    }

    fn type_name(&self) -> String {
        format!("{}!", self.inner.type_name())
    }
}

/// Marks an object member as omissible. Does not make the value nullable.
pub struct OptionalValidator {
    inner: AnyValidator,
}

pub fn optional(inner: impl Validator + 'static) -> OptionalValidator {
    OptionalValidator { inner: inner.boxed() }
}

impl Validator for OptionalValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        self.inner.validate(value)
    }

    fn type_name(&self) -> String {
        format!("{}?", self.inner.type_name())
    }

    fn is_optional(&self) -> bool {
        true
    }
}

type TransformFn = dyn Fn(Value) -> Result<Value, String> + Send + Sync;

pub struct TransformValidator {
    inner: AnyValidator,
    transform: Box<TransformFn>,
}

/// Post-processes the validated value; an `Err` from `f` fails validation.
pub fn transform<F>(inner: impl Validator + 'static, f: F) -> TransformValidator
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
{
    TransformValidator {
        inner: inner.boxed(),
        transform: Box::new(f),
    }
}

impl Validator for TransformValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let validated = self.inner.validate(value)?;
        (self.transform)(validated).map_err(ValidationError::new)
    }

    fn type_name(&self) -> String {
        self.inner.type_name()
    }
}
