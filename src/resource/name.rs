//! Identifier checks applied before any name is spliced into SQL text.

use crate::error::DefinitionError;
use regex::Regex;
use std::sync::OnceLock;

pub const NAME_PATTERN: &str = "^[A-Za-z0-9_]+$";
pub const SQL_TYPE_PATTERN: &str = r"^[A-Za-z0-9_]+(\[\])?$";

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NAME_PATTERN).expect("valid name pattern"))
}

fn sql_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SQL_TYPE_PATTERN).expect("valid sql type pattern"))
}

/// Resource, table, field, column, reference and junction table names.
pub fn check_name(name: &str) -> Result<(), DefinitionError> {
    if name_re().is_match(name) {
        Ok(())
    } else {
        Err(DefinitionError::InvalidName {
            name: name.to_string(),
            pattern: NAME_PATTERN,
        })
    }
}

/// Cast target of a static field's bound parameters, e.g. `uuid` or `text[]`.
pub fn check_sql_type(field: &str, sql_type: &str) -> Result<(), DefinitionError> {
    if sql_type_re().is_match(sql_type) {
        Ok(())
    } else {
        Err(DefinitionError::InvalidSqlType {
            field: field.to_string(),
            sql_type: sql_type.to_string(),
            pattern: SQL_TYPE_PATTERN,
        })
    }
}
