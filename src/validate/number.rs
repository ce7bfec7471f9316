use super::{ValidationError, Validator, Value};

#[derive(Clone, Debug, Default)]
pub struct IntValidator {
    min: Option<i64>,
    max: Option<i64>,
}

pub fn int() -> IntValidator {
    IntValidator::default()
}

impl IntValidator {
    pub fn min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }
}

/// Parses `[+-]?(0b|0o|0x)?digits`; base 10 without a prefix.
fn parse_int_str(raw: &str) -> Result<i64, ValidationError> {
    let s = raw.trim();
    let (negative, unsigned) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (base, digits) = if let Some(rest) = unsigned.strip_prefix("0b") {
        (2, rest)
    } else if let Some(rest) = unsigned.strip_prefix("0o") {
        (8, rest)
    } else if let Some(rest) = unsigned.strip_prefix("0x") {
        (16, rest)
    } else {
        (10, unsigned)
    };

    let not_parseable = || ValidationError::new(format!("value not parseable as base-{} integer value", base));
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(not_parseable());
    }
    let magnitude = i128::from_str_radix(digits, base).map_err(|_| not_parseable())?;
    let signed = if negative { -magnitude } else { magnitude };
    i64::try_from(signed).map_err(|_| ValidationError::new("value out of range for a 64-bit integer"))
}

impl Validator for IntValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let i = match value {
            Value::Null => return Ok(Value::Null),
            Value::Int(i) => i,
            Value::UInt(u) => {
                i64::try_from(u).map_err(|_| ValidationError::new("value out of range for a 64-bit integer"))?
            }
            Value::Float(f) => {
                if !f.is_finite() {
                    return Err(ValidationError::new("value is not a finite number"));
                }
                // f64::round rounds half away from zero
                let rounded = f.round();
                if rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
                    return Err(ValidationError::new("value out of range for a 64-bit integer"));
                }
                rounded as i64
            }
            Value::String(s) => parse_int_str(&s)?,
            other => {
                return Err(ValidationError::new(format!(
                    "value is not interpretable as type 'Int' (got {})",
                    other.kind()
                )))
            }
        };

        if let Some(min) = self.min {
            if i < min {
                return Err(ValidationError::new(format!("value too small, minimum is {}", min)));
            }
        }
        if let Some(max) = self.max {
            if i > max {
                return Err(ValidationError::new(format!("value too big, maximum is {}", max)));
            }
        }

        Ok(Value::Int(i))
    }

    fn type_name(&self) -> String {
        "Int".into()
    }
}

#[derive(Clone, Debug, Default)]
pub struct FloatValidator {
    min: Option<f64>,
    max: Option<f64>,
    precision: Option<u32>,
}

pub fn float() -> FloatValidator {
    FloatValidator::default()
}

impl FloatValidator {
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Round to `precision` decimal places (half away from zero) before bounds are checked.
    pub fn round(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }
}

impl Validator for FloatValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let mut f = match value {
            Value::Null => return Ok(Value::Null),
            Value::Float(f) => f,
            Value::Int(i) => i as f64,
            Value::UInt(u) => u as f64,
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| ValidationError::new("value not parseable as float64 value"))?,
            other => {
                return Err(ValidationError::new(format!(
                    "value is not convertible to type 'Float' (got {})",
                    other.kind()
                )))
            }
        };

        if !f.is_finite() {
            return Err(ValidationError::new("value is not a finite number"));
        }
        if let Some(precision) = self.precision {
            let ratio = 10f64.powi(precision.min(i32::MAX as u32) as i32);
            let scaled = f * ratio;
            // beyond f64 resolution rounding is the identity
            if scaled.is_finite() {
                f = scaled.round() / ratio;
            }
        }
        if !f.is_finite() {
            return Err(ValidationError::new("value is not a finite number"));
        }

        if let Some(min) = self.min {
            if f < min {
                return Err(ValidationError::new(format!("value too small, minimum is {}", min)));
            }
        }
        if let Some(max) = self.max {
            if f > max {
                return Err(ValidationError::new(format!("value too big, maximum is {}", max)));
            }
        }

        Ok(Value::Float(f))
    }

    fn type_name(&self) -> String {
        "Float".into()
    }
}

#[derive(Clone, Debug, Default)]
pub struct BooleanValidator;

pub fn boolean() -> BooleanValidator {
    BooleanValidator
}

impl Validator for BooleanValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(ValidationError::new("value not parseable as boolean")),
            },
            other => Err(ValidationError::new(format!(
                "value is not of type 'Boolean' (got {})",
                other.kind()
            ))),
        }
    }

    fn type_name(&self) -> String {
        "Boolean".into()
    }
}
