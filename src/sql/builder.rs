//! Builds parameterized SELECT, INSERT, UPDATE and DELETE statements.
//! Identifiers come from compiled resource definitions only; values are always `$n` parameters.

use crate::validate::Value;

/// Alias of the resource's own table in every generated statement.
pub const MAIN_ALIAS: &str = "main";

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// `"alias"."column"`
pub fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", quoted(alias), quoted(column))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    /// One JSON document per result row of a SELECT.
    pub fn into_json_rows(self) -> QueryBuf {
        QueryBuf {
            sql: format!("SELECT to_jsonb(q) FROM ({}) AS q", self.sql),
            params: self.params,
        }
    }

    /// One JSON document per row returned by a data-modifying statement.
    pub fn into_json_returning(self) -> QueryBuf {
        QueryBuf {
            sql: format!("WITH q AS ({}) SELECT to_jsonb(q) FROM q", self.sql),
            params: self.params,
        }
    }
}

/// Statements that accept bound parameters and WHERE conditions.
/// Row-filter hooks receive the concrete query through this surface.
pub trait Conditional {
    fn params_mut(&mut self) -> &mut Vec<Value>;

    fn conditions_mut(&mut self) -> &mut Vec<String>;

    /// Registers a parameter and returns its placeholder, cast when `sql_type` is given.
    /// `Null` is inlined as `NULL` so it takes the type of its column.
    fn bind_as(&mut self, value: Value, sql_type: Option<&str>) -> String {
        placeholder(self.params_mut(), value, sql_type)
    }

    fn bind(&mut self, value: Value) -> String {
        self.bind_as(value, None)
    }

    /// Adds a condition; all conditions are joined with AND.
    fn and_where(&mut self, condition: impl Into<String>) -> &mut Self
    where
        Self: Sized,
    {
        self.conditions_mut().push(condition.into());
        self
    }

    /// `"alias"."column" = $n`, or `"alias"."column" IS NULL` for `Null`.
    fn where_eq(&mut self, alias: &str, column: &str, value: Value, sql_type: Option<&str>) -> &mut Self
    where
        Self: Sized,
    {
        let condition = if value.is_null() {
            format!("{} IS NULL", qualified(alias, column))
        } else {
            let placeholder = self.bind_as(value, sql_type);
            format!("{} = {}", qualified(alias, column), placeholder)
        };
        self.and_where(condition)
    }
}

fn placeholder(params: &mut Vec<Value>, value: Value, sql_type: Option<&str>) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }
    params.push(value);
    match sql_type {
        Some(t) => format!("${}::{}", params.len(), t),
        None => format!("${}", params.len()),
    }
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

fn returning_clause(returning: &[String]) -> String {
    if returning.is_empty() {
        String::new()
    } else {
        format!(" RETURNING {}", returning.join(", "))
    }
}

#[derive(Clone, Debug)]
pub struct SelectQuery {
    columns: Vec<String>,
    from: String,
    joins: Vec<String>,
    conditions: Vec<String>,
    group_by: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    params: Vec<Value>,
}

impl SelectQuery {
    pub fn from(table: &str, alias: &str) -> Self {
        SelectQuery {
            columns: Vec::new(),
            from: format!("{} AS {}", quoted(table), quoted(alias)),
            joins: Vec::new(),
            conditions: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            params: Vec::new(),
        }
    }

    /// Adds `<expr> AS "name"` to the select list.
    pub fn column(&mut self, expr: impl Into<String>, name: &str) -> &mut Self {
        self.columns.push(format!("{} AS {}", expr.into(), quoted(name)));
        self
    }

    pub fn left_join(&mut self, table: &str, alias: &str, condition: impl Into<String>) -> &mut Self {
        self.joins.push(format!(
            "LEFT JOIN {} AS {} ON {}",
            quoted(table),
            quoted(alias),
            condition.into()
        ));
        self
    }

    pub fn group_by(&mut self, expr: impl Into<String>) -> &mut Self {
        self.group_by.push(expr.into());
        self
    }

    pub fn order_by(&mut self, expr: impl Into<String>) -> &mut Self {
        self.order_by.push(expr.into());
        self
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.offset = Some(n);
        self
    }

    pub fn build(self) -> QueryBuf {
        let mut sql = format!("SELECT {} FROM {}", self.columns.join(", "), self.from);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&where_clause(&self.conditions));
        if !self.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.group_by.join(", ")));
        }
        if !self.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.order_by.join(", ")));
        }
        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        if let Some(n) = self.offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }
        QueryBuf {
            sql,
            params: self.params,
        }
    }
}

impl Conditional for SelectQuery {
    fn params_mut(&mut self) -> &mut Vec<Value> {
        &mut self.params
    }

    fn conditions_mut(&mut self) -> &mut Vec<String> {
        &mut self.conditions
    }
}

#[derive(Clone, Debug)]
pub struct InsertQuery {
    table: String,
    columns: Vec<String>,
    values: Vec<String>,
    returning: Vec<String>,
    params: Vec<Value>,
}

impl InsertQuery {
    pub fn into_table(table: &str, alias: &str) -> Self {
        InsertQuery {
            table: format!("{} AS {}", quoted(table), quoted(alias)),
            columns: Vec::new(),
            values: Vec::new(),
            returning: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn value(&mut self, column: &str, value: Value, sql_type: Option<&str>) -> &mut Self {
        let placeholder = placeholder(&mut self.params, value, sql_type);
        self.columns.push(quoted(column));
        self.values.push(placeholder);
        self
    }

    pub fn returning(&mut self, expr: impl Into<String>, name: &str) -> &mut Self {
        self.returning.push(format!("{} AS {}", expr.into(), quoted(name)));
        self
    }

    pub fn build(self) -> QueryBuf {
        let values = if self.columns.is_empty() {
            " DEFAULT VALUES".to_string()
        } else {
            format!(" ({}) VALUES ({})", self.columns.join(", "), self.values.join(", "))
        };
        QueryBuf {
            sql: format!("INSERT INTO {}{}{}", self.table, values, returning_clause(&self.returning)),
            params: self.params,
        }
    }
}

#[derive(Clone, Debug)]
pub struct UpdateQuery {
    table: String,
    sets: Vec<String>,
    conditions: Vec<String>,
    returning: Vec<String>,
    params: Vec<Value>,
}

impl UpdateQuery {
    pub fn table(table: &str, alias: &str) -> Self {
        UpdateQuery {
            table: format!("{} AS {}", quoted(table), quoted(alias)),
            sets: Vec::new(),
            conditions: Vec::new(),
            returning: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn set(&mut self, column: &str, value: Value, sql_type: Option<&str>) -> &mut Self {
        let placeholder = self.bind_as(value, sql_type);
        self.sets.push(format!("{} = {}", quoted(column), placeholder));
        self
    }

    pub fn returning(&mut self, expr: impl Into<String>, name: &str) -> &mut Self {
        self.returning.push(format!("{} AS {}", expr.into(), quoted(name)));
        self
    }

    pub fn build(self) -> QueryBuf {
        QueryBuf {
            sql: format!(
                "UPDATE {} SET {}{}{}",
                self.table,
                self.sets.join(", "),
                where_clause(&self.conditions),
                returning_clause(&self.returning)
            ),
            params: self.params,
        }
    }
}

impl Conditional for UpdateQuery {
    fn params_mut(&mut self) -> &mut Vec<Value> {
        &mut self.params
    }

    fn conditions_mut(&mut self) -> &mut Vec<String> {
        &mut self.conditions
    }
}

#[derive(Clone, Debug)]
pub struct DeleteQuery {
    table: String,
    conditions: Vec<String>,
    returning: Vec<String>,
    params: Vec<Value>,
}

impl DeleteQuery {
    pub fn from(table: &str, alias: &str) -> Self {
        DeleteQuery {
            table: format!("{} AS {}", quoted(table), quoted(alias)),
            conditions: Vec::new(),
            returning: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn returning(&mut self, expr: impl Into<String>, name: &str) -> &mut Self {
        self.returning.push(format!("{} AS {}", expr.into(), quoted(name)));
        self
    }

    pub fn build(self) -> QueryBuf {
        QueryBuf {
            sql: format!(
                "DELETE FROM {}{}{}",
                self.table,
                where_clause(&self.conditions),
                returning_clause(&self.returning)
            ),
            params: self.params,
        }
    }
}

impl Conditional for DeleteQuery {
    fn params_mut(&mut self) -> &mut Vec<Value> {
        &mut self.params
    }

    fn conditions_mut(&mut self) -> &mut Vec<String> {
        &mut self.conditions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_escapes() {
        assert_eq!(quoted("users"), "\"users\"");
        assert_eq!(quoted("a\"b"), "\"a\"\"b\"");
        assert_eq!(qualified("main", "id"), "\"main\".\"id\"");
    }

    #[test]
    fn test_select_full() {
        let mut q = SelectQuery::from("users", MAIN_ALIAS);
        q.column(qualified(MAIN_ALIAS, "id"), "id")
            .left_join("groups", "j0", "\"main\".\"group_id\" = \"j0\".\"id\"");
        q.where_eq(MAIN_ALIAS, "username", Value::from("x"), None)
            .where_eq(MAIN_ALIAS, "id", Value::from("u1"), Some("uuid"));
        q.group_by(qualified(MAIN_ALIAS, "id"))
            .order_by(qualified(MAIN_ALIAS, "id"))
            .limit(10)
            .offset(20);
        let built = q.build();
        assert_eq!(
            built.sql,
            "SELECT \"main\".\"id\" AS \"id\" FROM \"users\" AS \"main\" \
             LEFT JOIN \"groups\" AS \"j0\" ON \"main\".\"group_id\" = \"j0\".\"id\" \
             WHERE \"main\".\"username\" = $1 AND \"main\".\"id\" = $2::uuid \
             GROUP BY \"main\".\"id\" ORDER BY \"main\".\"id\" LIMIT 10 OFFSET 20"
        );
        assert_eq!(built.params, vec![Value::from("x"), Value::from("u1")]);
    }

    #[test]
    fn test_select_without_conditions() {
        let mut q = SelectQuery::from("users", MAIN_ALIAS);
        q.column("1", "one");
        assert_eq!(q.build().sql, "SELECT 1 AS \"one\" FROM \"users\" AS \"main\"");
    }

    #[test]
    fn test_json_wrappers() {
        let q = QueryBuf {
            sql: "SELECT 1".into(),
            params: vec![],
        };
        assert_eq!(q.clone().into_json_rows().sql, "SELECT to_jsonb(q) FROM (SELECT 1) AS q");
        assert_eq!(
            q.into_json_returning().sql,
            "WITH q AS (SELECT 1) SELECT to_jsonb(q) FROM q"
        );
    }

    #[test]
    fn test_insert() {
        let mut q = InsertQuery::into_table("users", MAIN_ALIAS);
        q.value("first_name", Value::from("Ada"), None)
            .value("id", Value::from("u1"), Some("uuid"))
            .returning(qualified(MAIN_ALIAS, "first_name"), "firstName");
        let built = q.build();
        assert_eq!(
            built.sql,
            "INSERT INTO \"users\" AS \"main\" (\"first_name\", \"id\") VALUES ($1, $2::uuid) \
             RETURNING \"main\".\"first_name\" AS \"firstName\""
        );
        assert_eq!(built.params.len(), 2);
    }

    #[test]
    fn test_insert_default_values() {
        let mut q = InsertQuery::into_table("counters", MAIN_ALIAS);
        q.returning(qualified(MAIN_ALIAS, "id"), "id");
        assert_eq!(
            q.build().sql,
            "INSERT INTO \"counters\" AS \"main\" DEFAULT VALUES RETURNING \"main\".\"id\" AS \"id\""
        );
    }

    #[test]
    fn test_update_params_in_order() {
        let mut q = UpdateQuery::table("users", MAIN_ALIAS);
        q.set("email", Value::from("a@b.c"), None);
        q.where_eq(MAIN_ALIAS, "id", Value::Int(7), None);
        q.returning(qualified(MAIN_ALIAS, "email"), "email");
        let built = q.build();
        assert_eq!(
            built.sql,
            "UPDATE \"users\" AS \"main\" SET \"email\" = $1 WHERE \"main\".\"id\" = $2 \
             RETURNING \"main\".\"email\" AS \"email\""
        );
        assert_eq!(built.params, vec![Value::from("a@b.c"), Value::Int(7)]);
    }

    #[test]
    fn test_null_is_inlined() {
        let mut q = UpdateQuery::table("users", MAIN_ALIAS);
        q.set("last_name", Value::Null, None)
            .set("id", Value::from("u2"), Some("uuid"));
        q.where_eq(MAIN_ALIAS, "id", Value::from("u1"), Some("uuid"));
        let built = q.build();
        assert_eq!(
            built.sql,
            "UPDATE \"users\" AS \"main\" SET \"last_name\" = NULL, \"id\" = $1::uuid WHERE \"main\".\"id\" = $2::uuid"
        );
        assert_eq!(built.params, vec![Value::from("u2"), Value::from("u1")]);
    }

    #[test]
    fn test_where_eq_null_is_null_check() {
        let mut q = SelectQuery::from("users", MAIN_ALIAS);
        q.column(qualified(MAIN_ALIAS, "id"), "id");
        q.where_eq(MAIN_ALIAS, "deleted_at", Value::Null, Some("timestamptz"));
        q.where_eq(MAIN_ALIAS, "id", Value::Int(1), None);
        let built = q.build();
        assert!(built
            .sql
            .ends_with("WHERE \"main\".\"deleted_at\" IS NULL AND \"main\".\"id\" = $1"));
        assert_eq!(built.params, vec![Value::Int(1)]);
    }

    #[test]
    fn test_delete() {
        let mut q = DeleteQuery::from("users", MAIN_ALIAS);
        q.where_eq(MAIN_ALIAS, "id", Value::Int(7), None);
        let bound = q.bind(Value::Bool(false));
        q.and_where(format!("{} = {}", qualified(MAIN_ALIAS, "archived"), bound));
        let built = q.build();
        assert_eq!(
            built.sql,
            "DELETE FROM \"users\" AS \"main\" WHERE \"main\".\"id\" = $1 AND \"main\".\"archived\" = $2"
        );
    }
}
