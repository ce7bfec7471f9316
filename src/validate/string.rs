use super::{ValidationError, Validator, Value};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringCase {
    Upper,
    Lower,
    Snake,
    Camel,
}

#[derive(Clone, Debug, Default)]
pub struct StringValidator {
    min_len: Option<usize>,
    max_len: Option<usize>,
    case: Option<StringCase>,
    trim: bool,
}

pub fn string() -> StringValidator {
    StringValidator::default()
}

fn snake_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[_a-z][_a-z0-9]*$").expect("valid snake_case pattern"))
}

fn camel_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9]*$").expect("valid camelCase pattern"))
}

impl StringValidator {
    /// Minimum length in characters.
    pub fn min(mut self, min: usize) -> Self {
        self.min_len = Some(min);
        self
    }

    /// Maximum length in characters.
    pub fn max(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }

    pub fn trim(mut self) -> Self {
        self.trim = true;
        self
    }

    pub fn upper(mut self) -> Self {
        self.case = Some(StringCase::Upper);
        self
    }

    pub fn lower(mut self) -> Self {
        self.case = Some(StringCase::Lower);
        self
    }

    pub fn snake(mut self) -> Self {
        self.case = Some(StringCase::Snake);
        self
    }

    pub fn camel(mut self) -> Self {
        self.case = Some(StringCase::Camel);
        self
    }
}

impl Validator for StringValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let mut s = match value {
            Value::Null => return Ok(Value::Null),
            Value::String(s) => s,
            other => {
                return Err(ValidationError::new(format!(
                    "value is not of type 'string' (got {})",
                    other.kind()
                )))
            }
        };

        if self.trim {
            let trimmed = s.trim();
            if trimmed.len() != s.len() {
                s = trimmed.to_string();
            }
        }

        if s.is_empty() {
            return Ok(Value::Null);
        }

        let len = s.chars().count();
        if let Some(min) = self.min_len {
            if len < min {
                return Err(ValidationError::new(format!("value too short, min length is {}", min)));
            }
        }
        if let Some(max) = self.max_len {
            if len > max {
                return Err(ValidationError::new(format!("value too long, max length is {}", max)));
            }
        }

        match self.case {
            Some(StringCase::Upper) => s = s.to_uppercase(),
            Some(StringCase::Lower) => s = s.to_lowercase(),
            Some(StringCase::Snake) => {
                if !snake_pattern().is_match(&s) {
                    return Err(ValidationError::new("invalid case, required case is 'snake'"));
                }
            }
            Some(StringCase::Camel) => {
                if !camel_pattern().is_match(&s) {
                    return Err(ValidationError::new("invalid case, required case is 'camel'"));
                }
            }
            None => {}
        }

        Ok(Value::String(s))
    }

    fn type_name(&self) -> String {
        "String".into()
    }
}
