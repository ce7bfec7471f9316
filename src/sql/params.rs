//! Bind validated values to sqlx queries with their natural PostgreSQL types.

use crate::validate::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::QueryScalar;

pub type JsonRowQuery<'q> = QueryScalar<'q, Postgres, serde_json::Value, PgArguments>;

/// Binds one parameter. Integers go out as INT8, floats as FLOAT8, timestamps as TIMESTAMPTZ,
/// arrays and objects as JSONB and `Null` as an untyped text NULL.
pub fn bind_value<'q>(query: JsonRowQuery<'q>, value: &Value) -> JsonRowQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::UInt(u) => match i64::try_from(*u) {
            Ok(i) => query.bind(i),
            Err(_) => query.bind(u.to_string()),
        },
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.clone()),
        Value::DateTime(d) => query.bind(*d),
        Value::Array(_) | Value::Object(_) => query.bind(value.clone().into_json()),
    }
}

pub fn bind_all<'q>(mut query: JsonRowQuery<'q>, params: &[Value]) -> JsonRowQuery<'q> {
    for p in params {
        query = bind_value(query, p);
    }
    query
}
