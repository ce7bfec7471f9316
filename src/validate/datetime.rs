use super::{ValidationError, Validator, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

#[derive(Clone, Debug, Default)]
pub struct DateTimeValidator {
    min: Option<DateTime<Utc>>,
    max: Option<DateTime<Utc>>,
}

pub fn datetime() -> DateTimeValidator {
    DateTimeValidator::default()
}

/// Zoned formats tried after RFC 3339 and RFC 2822, in order.
const ZONED_FORMATS: &[&str] = &[
    // 01/02 03:04:05PM '06 -0700
    "%m/%d %I:%M:%S%p '%y %z",
    // Ruby date: Mon Jan 02 15:04:05 -0700 2006
    "%a %b %d %H:%M:%S %z %Y",
    // RFC 822 with numeric zone: 02 Jan 06 15:04 -0700
    "%d %b %y %H:%M %z",
];

/// Formats without a numeric offset, read as UTC. Zone abbreviations are skipped.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    // ANSI C: Mon Jan  2 15:04:05 2006
    "%a %b %e %H:%M:%S %Y",
    // Unix date: Mon Jan  2 15:04:05 MST 2006
    "%a %b %e %H:%M:%S %Z %Y",
    // RFC 850: Monday, 02-Jan-06 15:04:05 MST
    "%A, %d-%b-%y %H:%M:%S %Z",
];

/// First matching format wins.
fn parse_any_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    if let Ok(d) = DateTime::parse_from_rfc2822(s) {
        return Some(d.with_timezone(&Utc));
    }
    for format in ZONED_FORMATS {
        if let Ok(d) = DateTime::parse_from_str(s, format) {
            return Some(d.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(d) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&d));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|d| Utc.from_utc_datetime(&d));
    }
    None
}

impl DateTimeValidator {
    pub fn min(mut self, min: DateTime<Utc>) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: DateTime<Utc>) -> Self {
        self.max = Some(max);
        self
    }
}

impl Validator for DateTimeValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let d = match value {
            Value::Null => return Ok(Value::Null),
            Value::DateTime(d) => d,
            Value::String(s) => {
                parse_any_time(&s).ok_or_else(|| ValidationError::new("value is no parseable timestamp"))?
            }
            Value::Int(secs) => from_unix(secs)?,
            Value::UInt(secs) => from_unix(
                i64::try_from(secs).map_err(|_| ValidationError::new("unix timestamp out of range"))?,
            )?,
            other => {
                return Err(ValidationError::new(format!(
                    "value is not convertible to timestamp (got {})",
                    other.kind()
                )))
            }
        };

        if let Some(min) = self.min {
            if d < min {
                return Err(ValidationError::new(format!("timestamp too early, minimum is {}", min)));
            }
        }
        if let Some(max) = self.max {
            if d > max {
                return Err(ValidationError::new(format!("timestamp too late, maximum is {}", max)));
            }
        }

        Ok(Value::DateTime(d))
    }

    fn type_name(&self) -> String {
        "DateTime".into()
    }
}

fn from_unix(secs: i64) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| ValidationError::new("unix timestamp out of range"))
}
