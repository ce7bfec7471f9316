//! Per-request query surface of a compiled resource.

use super::definition::Relation;
use super::table::TableResource;
use crate::database::Database;
use crate::error::{DatabaseError, ResourceError, Result};
use crate::sql::{
    qualified, quoted, Conditional, DeleteQuery, InsertQuery, QueryBuf, SelectQuery, UpdateQuery, MAIN_ALIAS,
};
use crate::validate::{array, not_null, Map, ObjectValidator, ValidationError, Validator, Value};
use std::collections::HashSet;
use std::sync::Arc;

const FIND_UNIQUE: &str = "find_unique";
const FIND_MANY: &str = "find_many";
const CREATE: &str = "create";
const MODIFY: &str = "modify";
const DELETE: &str = "delete";

/// Options of [`AttachedTableResource::find_many`].
#[derive(Clone, Debug, Default)]
pub struct FindManyOpts {
    /// Equality filters over static fields. `Null` means no filter.
    pub where_: Value,
    /// Reference names to aggregate into each row. Repeated names are included once.
    pub include: Vec<String>,
    /// Reserved.
    pub search: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl FindManyOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, where_: impl Into<Value>) -> Self {
        self.where_ = where_.into();
        self
    }

    pub fn include<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }
}

/// Join aliases `j0`, `j1`, ... local to one statement.
#[derive(Default)]
struct JoinAliases(usize);

impl JoinAliases {
    fn next(&mut self) -> String {
        let alias = format!("j{}", self.0);
        self.0 += 1;
        alias
    }
}

/// A resource bound to a database handle and a per-request context. Cheap; create one per request.
pub struct AttachedTableResource<'a, C> {
    resource: &'a TableResource<C>,
    db: &'a dyn Database,
    ctx: &'a C,
}

impl<'a, C> AttachedTableResource<'a, C> {
    pub(crate) fn new(resource: &'a TableResource<C>, db: &'a dyn Database, ctx: &'a C) -> Self {
        AttachedTableResource { resource, db, ctx }
    }

    pub fn resource(&self) -> &TableResource<C> {
        self.resource
    }

    /// Row matching the primary key in `where_`, or `None` when nothing matched.
    pub async fn find_unique(&self, where_: Value) -> Result<Option<Value>> {
        let filter = self.validate_input(FIND_UNIQUE, "where", self.resource.unique_where(), where_)?;
        self.select_unique(FIND_UNIQUE, filter).await
    }

    /// Rows matching the equality filters, each with the requested references aggregated as arrays.
    pub async fn find_many(&self, opts: FindManyOpts) -> Result<Vec<Value>> {
        let filter = self.validate_input(FIND_MANY, "where", self.resource.many_where(), opts.where_)?;

        let mut q = SelectQuery::from(self.resource.table_name(), MAIN_ALIAS);
        for (expr, name) in self.own_columns() {
            q.column(expr, name);
        }
        self.add_predicates(&mut q, filter);

        let mut shape = self.resource.output().clone();
        let mut aliases = JoinAliases::default();
        let mut seen = HashSet::new();
        for name in opts.include.into_iter().filter(|n| seen.insert(n.clone())) {
            let target = self.include(&mut q, &mut aliases, &name)?;
            shape = shape.field(name, not_null(array(target.output().clone())));
        }

        if !seen.is_empty() {
            for column in self.primary_key_columns() {
                q.group_by(column);
            }
        }
        for column in self.primary_key_columns() {
            q.order_by(column);
        }
        if let Some(n) = opts.limit {
            q.limit(n);
        }
        if let Some(n) = opts.offset {
            q.offset(n);
        }
        self.apply_filter(FIND_MANY, self.resource.props().select_filter.as_ref(), &mut q)?;

        let rows = self.fetch(FIND_MANY, q.build().into_json_rows()).await?;
        self.shape_rows(FIND_MANY, &shape, rows)
    }

    /// Inserts one row and returns it.
    pub async fn create(&self, data: Value) -> Result<Value> {
        let data = self.validate_input(CREATE, "data", self.resource.create_input(), data)?;

        let mut q = InsertQuery::into_table(self.resource.table_name(), MAIN_ALIAS);
        for (field, value) in data {
            if let Some((column, sql_type)) = self.column_of(&field) {
                q.value(column, value, sql_type);
            }
        }
        for (expr, name) in self.own_columns() {
            q.returning(expr, name);
        }

        let rows = self.fetch(CREATE, q.build().into_json_returning()).await?;
        self.shape_rows(CREATE, self.resource.output(), rows)?
            .into_iter()
            .next()
            .ok_or_else(|| ResourceError::Query {
                resource: self.resource.name().to_string(),
                operation: CREATE,
                source: DatabaseError::Sql(sqlx::Error::RowNotFound),
            })
    }

    /// Updates the supplied fields of the row matching `where_`. `None` when nothing matched.
    pub async fn modify(&self, where_: Value, data: Value) -> Result<Option<Value>> {
        let filter = self.validate_input(MODIFY, "where", self.resource.unique_where(), where_)?;
        let data = self.validate_input(MODIFY, "data", self.resource.modify_input(), data)?;
        if data.is_empty() {
            return self.select_unique(MODIFY, filter).await;
        }

        let mut q = UpdateQuery::table(self.resource.table_name(), MAIN_ALIAS);
        for (field, value) in data {
            if let Some((column, sql_type)) = self.column_of(&field) {
                q.set(column, value, sql_type);
            }
        }
        self.add_predicates(&mut q, filter);
        self.apply_filter(MODIFY, self.resource.props().update_filter.as_ref(), &mut q)?;
        for (expr, name) in self.own_columns() {
            q.returning(expr, name);
        }

        let rows = self.fetch(MODIFY, q.build().into_json_returning()).await?;
        Ok(self.shape_rows(MODIFY, self.resource.output(), rows)?.into_iter().next())
    }

    /// Deletes the row matching `where_` and returns it. `None` when nothing matched.
    pub async fn delete(&self, where_: Value) -> Result<Option<Value>> {
        let filter = self.validate_input(DELETE, "where", self.resource.unique_where(), where_)?;

        let mut q = DeleteQuery::from(self.resource.table_name(), MAIN_ALIAS);
        self.add_predicates(&mut q, filter);
        self.apply_filter(DELETE, self.resource.props().delete_filter.as_ref(), &mut q)?;
        for (expr, name) in self.own_columns() {
            q.returning(expr, name);
        }

        let rows = self.fetch(DELETE, q.build().into_json_returning()).await?;
        Ok(self.shape_rows(DELETE, self.resource.output(), rows)?.into_iter().next())
    }

    async fn select_unique(&self, operation: &'static str, filter: Map) -> Result<Option<Value>> {
        let mut q = SelectQuery::from(self.resource.table_name(), MAIN_ALIAS);
        for (expr, name) in self.own_columns() {
            q.column(expr, name);
        }
        self.add_predicates(&mut q, filter);
        self.apply_filter(operation, self.resource.props().select_filter.as_ref(), &mut q)?;
        q.limit(1);

        let rows = self.fetch(operation, q.build().into_json_rows()).await?;
        Ok(self.shape_rows(operation, self.resource.output(), rows)?.into_iter().next())
    }

    /// Joins the target of reference `name` and selects its rows as a JSON array column.
    fn include(
        &self,
        q: &mut SelectQuery,
        aliases: &mut JoinAliases,
        name: &str,
    ) -> Result<Arc<TableResource<C>>> {
        let reference = self
            .resource
            .references()
            .get(name)
            .ok_or_else(|| ResourceError::UnknownReference {
                resource: self.resource.name().to_string(),
                operation: FIND_MANY,
                reference: name.to_string(),
            })?;
        let target = reference
            .target
            .resolve()
            .ok_or_else(|| self.relation_error(name, "does not resolve to a resource".to_string()))?;

        let main = quoted(MAIN_ALIAS);
        let target_alias = aliases.next();
        match &reference.relation {
            Relation::Join(condition) => {
                q.left_join(target.table_name(), &target_alias, condition(&main, &quoted(&target_alias)));
            }
            Relation::Junction { table, conditions } => {
                let junction_alias = aliases.next();
                let conditions = conditions(&main, &quoted(&junction_alias), &quoted(&target_alias));
                let [to_junction, to_target]: [String; 2] = conditions.try_into().map_err(|c: Vec<String>| {
                    self.relation_error(name, format!("junction returned {} conditions, expected 2", c.len()))
                })?;
                q.left_join(table, &junction_alias, to_junction);
                q.left_join(target.table_name(), &target_alias, to_target);
            }
        }

        q.column(self.aggregate(&target, &target_alias), name);
        Ok(target)
    }

    /// `COALESCE(jsonb_agg(DISTINCT jsonb_build_object(..)) FILTER (..), '[]')`: one object per
    /// distinct joined row, an empty array when the join matched nothing.
    fn aggregate(&self, target: &TableResource<C>, alias: &str) -> String {
        let quoted_alias = quoted(alias);
        let mut args = Vec::new();
        for (name, field) in target.static_fields() {
            args.push(format!("'{}'", name));
            args.push(qualified(alias, field.column.as_deref().unwrap_or(name)));
        }
        for (name, field) in target.dynamic_fields() {
            args.push(format!("'{}'", name));
            args.push((field.expr)(&quoted_alias, self.ctx));
        }
        let present = target
            .primary_key()
            .first()
            .and_then(|f| target.column(f))
            .map(|column| format!(" FILTER (WHERE {} IS NOT NULL)", qualified(alias, column)))
            .unwrap_or_default();
        format!(
            "COALESCE(jsonb_agg(DISTINCT jsonb_build_object({})){}, '[]'::jsonb)",
            args.join(", "),
            present
        )
    }

    /// Static columns, then dynamic expressions, of the main table with their output names.
    fn own_columns(&self) -> Vec<(String, &str)> {
        let main = quoted(MAIN_ALIAS);
        let statics = self
            .resource
            .static_fields()
            .iter()
            .map(|(name, f)| (qualified(MAIN_ALIAS, f.column.as_deref().unwrap_or(name)), name.as_str()));
        let dynamics = self
            .resource
            .dynamic_fields()
            .iter()
            .map(|(name, f)| ((f.expr)(&main, self.ctx), name.as_str()));
        statics.chain(dynamics).collect()
    }

    fn primary_key_columns(&self) -> Vec<String> {
        self.resource
            .primary_key()
            .iter()
            .filter_map(|f| self.resource.column(f))
            .map(|column| qualified(MAIN_ALIAS, column))
            .collect()
    }

    fn column_of<'s>(&'s self, field: &'s str) -> Option<(&'s str, Option<&'s str>)> {
        let def = self.resource.static_fields().get(field)?;
        Some((def.column.as_deref().unwrap_or(field), def.sql_type.as_deref()))
    }

    /// One equality predicate per filter key.
    fn add_predicates<Q: Conditional>(&self, q: &mut Q, filter: Map) {
        for (field, value) in filter {
            if let Some((column, sql_type)) = self.column_of(&field) {
                q.where_eq(MAIN_ALIAS, column, value, sql_type);
            }
        }
    }

    fn apply_filter<Q>(
        &self,
        operation: &'static str,
        hook: Option<&Arc<dyn Fn(&mut Q, &C) -> std::result::Result<(), String> + Send + Sync>>,
        q: &mut Q,
    ) -> Result<()> {
        match hook {
            Some(f) => f(q, self.ctx).map_err(|message| ResourceError::Filter {
                resource: self.resource.name().to_string(),
                operation,
                message,
            }),
            None => Ok(()),
        }
    }

    /// `Null` input counts as an empty mapping.
    fn validate_input(
        &self,
        operation: &'static str,
        input: &'static str,
        validator: &ObjectValidator,
        value: Value,
    ) -> Result<Map> {
        let value = if value.is_null() { Value::Object(Map::new()) } else { value };
        let validated = validator
            .validate_map(value)
            .map_err(|source| ResourceError::Validation {
                resource: self.resource.name().to_string(),
                operation,
                input,
                source,
            })?;
        Ok(validated.unwrap_or_default())
    }

    async fn fetch(&self, operation: &'static str, query: QueryBuf) -> Result<Vec<serde_json::Value>> {
        self.db
            .fetch_json_rows(&query)
            .await
            .map_err(|source| ResourceError::Query {
                resource: self.resource.name().to_string(),
                operation,
                source,
            })
    }

    fn shape_rows(
        &self,
        operation: &'static str,
        shape: &ObjectValidator,
        rows: Vec<serde_json::Value>,
    ) -> Result<Vec<Value>> {
        rows.into_iter()
            .map(|row| {
                shape.validate(Value::from(row)).map_err(|source: ValidationError| {
                    tracing::warn!(
                        resource = %self.resource.name(),
                        operation,
                        error = %source,
                        "row does not match output shape"
                    );
                    ResourceError::OutputShape {
                        resource: self.resource.name().to_string(),
                        operation,
                        source,
                    }
                })
            })
            .collect()
    }

    fn relation_error(&self, reference: &str, message: String) -> ResourceError {
        ResourceError::Relation {
            resource: self.resource.name().to_string(),
            operation: FIND_MANY,
            reference: reference.to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{DynamicField, Reference, ReferenceTarget, StaticField, TableResourceProps};
    use crate::validate::{int, string};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Ctx {
        tenant: Option<i64>,
    }

    /// Records every statement and answers with queued row sets.
    #[derive(Default)]
    struct RecordingDb {
        queries: Mutex<Vec<QueryBuf>>,
        responses: Mutex<VecDeque<Vec<serde_json::Value>>>,
    }

    impl RecordingDb {
        fn answering(rows: Vec<serde_json::Value>) -> Self {
            let db = RecordingDb::default();
            db.responses.lock().unwrap().push_back(rows);
            db
        }

        fn queries(&self) -> Vec<QueryBuf> {
            self.queries.lock().unwrap().clone()
        }

        fn only_query(&self) -> QueryBuf {
            let queries = self.queries();
            assert_eq!(queries.len(), 1, "expected exactly one statement");
            queries[0].clone()
        }
    }

    #[async_trait]
    impl Database for RecordingDb {
        async fn fetch_json_rows(&self, query: &QueryBuf) -> std::result::Result<Vec<serde_json::Value>, DatabaseError> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    struct FailingDb;

    #[async_trait]
    impl Database for FailingDb {
        async fn fetch_json_rows(&self, _: &QueryBuf) -> std::result::Result<Vec<serde_json::Value>, DatabaseError> {
            Err(DatabaseError::Sql(sqlx::Error::PoolTimedOut))
        }
    }

    fn groups() -> Arc<TableResource<Ctx>> {
        let props = TableResourceProps::new("Group", "groups")
            .primary_key(["id"])
            .modifiable(["name"])
            .static_field("id", StaticField::new(int()))
            .static_field("name", StaticField::new(not_null(string())));
        Arc::new(TableResource::new(props).unwrap())
    }

    fn user_props() -> TableResourceProps<Ctx> {
        let groups = groups();
        TableResourceProps::new("User", "users")
            .primary_key(["id"])
            .create_only(["username"])
            .modifiable(["firstName"])
            .static_field("id", StaticField::new(int()))
            .static_field("username", StaticField::new(not_null(string())))
            .static_field("firstName", StaticField::new(string()).column("first_name"))
            .dynamic_field(
                "shout",
                DynamicField::new(string(), |alias: &str, _: &Ctx| format!("upper({}.\"username\")", alias)),
            )
            .reference(
                "groups",
                Reference::new(
                    groups.clone(),
                    Relation::junction("group_member_users", |l: &str, j: &str, r: &str| {
                        vec![
                            format!("{}.\"id\" = {}.\"member_user_id\"", l, j),
                            format!("{}.\"group_id\" = {}.\"id\"", j, r),
                        ]
                    }),
                ),
            )
            .reference(
                "primaryGroup",
                Reference::new(
                    groups.clone(),
                    Relation::join(|l: &str, r: &str| format!("{}.\"primary_group_id\" = {}.\"id\"", l, r)),
                ),
            )
            .reference(
                "broken",
                Reference::new(
                    groups,
                    Relation::junction("group_member_users", |l: &str, _: &str, r: &str| {
                        vec![format!("{}.\"id\" = {}.\"id\"", l, r)]
                    }),
                ),
            )
            .reference(
                "ghost",
                Reference::new(ReferenceTarget::<Ctx>::lazy(|| None), Relation::join(|_: &str, _: &str| "TRUE".into())),
            )
    }

    fn users() -> TableResource<Ctx> {
        TableResource::new(user_props()).unwrap()
    }

    fn obj(v: serde_json::Value) -> Value {
        Value::from(v)
    }

    const USER_COLUMNS: &str = "\"main\".\"first_name\" AS \"firstName\", \"main\".\"id\" AS \"id\", \
         \"main\".\"username\" AS \"username\", upper(\"main\".\"username\") AS \"shout\"";

    // ============================================================================
    // find_unique
    // ============================================================================

    #[tokio::test]
    async fn test_find_unique_statement_and_shape() {
        let db = RecordingDb::answering(vec![json!({
            "id": 1, "username": "ada", "firstName": "Ada", "shout": "ADA", "extra": true
        })]);
        let ctx = Ctx::default();
        let users = users();

        let row = users.attach(&db, &ctx).find_unique(obj(json!({"id": "1"}))).await.unwrap().unwrap();

        let q = db.only_query();
        assert_eq!(
            q.sql,
            format!(
                "SELECT to_jsonb(q) FROM (SELECT {} FROM \"users\" AS \"main\" WHERE \"main\".\"id\" = $1 LIMIT 1) AS q",
                USER_COLUMNS
            )
        );
        assert_eq!(q.params, vec![Value::Int(1)]);
        assert_eq!(row.get("username"), Some(&Value::from("ada")));
        assert_eq!(row.get("shout"), Some(&Value::from("ADA")));
        assert_eq!(row.get("extra"), None);
    }

    #[tokio::test]
    async fn test_find_unique_not_found_is_none() {
        let db = RecordingDb::default();
        let ctx = Ctx::default();
        let users = users();
        let row = users.attach(&db, &ctx).find_unique(obj(json!({"id": 42}))).await.unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_find_unique_invalid_where_runs_nothing() {
        let db = RecordingDb::default();
        let ctx = Ctx::default();
        let users = users();
        let err = users
            .attach(&db, &ctx)
            .find_unique(obj(json!({"id": [1]})))
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Validation { input: "where", .. }));
        assert!(err.is_client_error());
        assert_eq!(err.resource(), "User");
        assert_eq!(err.operation(), FIND_UNIQUE);
        assert!(db.queries().is_empty());
    }

    #[tokio::test]
    async fn test_query_failure_is_propagated() {
        let ctx = Ctx::default();
        let users = users();
        let err = users.attach(&FailingDb, &ctx).find_unique(obj(json!({"id": 1}))).await.unwrap_err();
        assert!(matches!(err, ResourceError::Query { source: DatabaseError::Sql(_), .. }));
        assert!(!err.is_client_error());
    }

    // ============================================================================
    // find_many
    // ============================================================================

    #[tokio::test]
    async fn test_find_many_filters_and_pages() {
        let db = RecordingDb::default();
        let ctx = Ctx::default();
        let users = users();
        let opts = FindManyOpts::new()
            .filter(obj(json!({"username": "ada", "firstName": null})))
            .limit(10)
            .offset(20);

        users.attach(&db, &ctx).find_many(opts).await.unwrap();

        let q = db.only_query();
        assert_eq!(
            q.sql,
            format!(
                "SELECT to_jsonb(q) FROM (SELECT {} FROM \"users\" AS \"main\" \
                 WHERE \"main\".\"first_name\" IS NULL AND \"main\".\"username\" = $1 \
                 ORDER BY \"main\".\"id\" LIMIT 10 OFFSET 20) AS q",
                USER_COLUMNS
            )
        );
        assert_eq!(q.params, vec![Value::from("ada")]);
    }

    #[tokio::test]
    async fn test_find_many_junction_and_join_includes() {
        let db = RecordingDb::answering(vec![
            json!({
                "id": 1, "username": "ada", "firstName": "Ada", "shout": "ADA",
                "groups": [{"id": 1, "name": "admins"}, {"id": 2, "name": "staff"}],
                "primaryGroup": [{"id": 1, "name": "admins"}]
            }),
            json!({
                "id": 2, "username": "bob", "firstName": null, "shout": "BOB",
                "groups": [], "primaryGroup": []
            }),
        ]);
        let ctx = Ctx::default();
        let users = users();
        let opts = FindManyOpts::new().include(["groups", "primaryGroup", "groups"]);

        let rows = users.attach(&db, &ctx).find_many(opts).await.unwrap();

        let sql = db.only_query().sql;
        assert!(sql.contains(
            "LEFT JOIN \"group_member_users\" AS \"j1\" ON \"main\".\"id\" = \"j1\".\"member_user_id\" \
             LEFT JOIN \"groups\" AS \"j0\" ON \"j1\".\"group_id\" = \"j0\".\"id\" \
             LEFT JOIN \"groups\" AS \"j2\" ON \"main\".\"primary_group_id\" = \"j2\".\"id\""
        ));
        assert!(sql.contains(
            "COALESCE(jsonb_agg(DISTINCT jsonb_build_object('id', \"j0\".\"id\", 'name', \"j0\".\"name\")) \
             FILTER (WHERE \"j0\".\"id\" IS NOT NULL), '[]'::jsonb) AS \"groups\""
        ));
        assert!(sql.contains("AS \"primaryGroup\""));
        assert_eq!(sql.matches("AS \"groups\"").count(), 1);
        assert!(sql.contains("GROUP BY \"main\".\"id\" ORDER BY \"main\".\"id\""));
        assert!(!sql.contains("\"j3\""));

        assert_eq!(rows.len(), 2);
        let groups = rows[0].get("groups").and_then(Value::as_array).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].get("name"), Some(&Value::from("staff")));
        assert_eq!(rows[1].get("groups"), Some(&Value::Array(vec![])));
        assert_eq!(rows[1].get("firstName"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_find_many_aliases_restart_per_call() {
        let db = RecordingDb::default();
        let ctx = Ctx::default();
        let users = users();
        let attached = users.attach(&db, &ctx);
        attached.find_many(FindManyOpts::new().include(["primaryGroup"])).await.unwrap();
        attached.find_many(FindManyOpts::new().include(["primaryGroup"])).await.unwrap();
        for q in db.queries() {
            assert!(q.sql.contains("AS \"j0\""));
            assert!(!q.sql.contains("\"j1\""));
        }
    }

    #[tokio::test]
    async fn test_find_many_unknown_include() {
        let db = RecordingDb::default();
        let ctx = Ctx::default();
        let users = users();
        let err = users
            .attach(&db, &ctx)
            .find_many(FindManyOpts::new().include(["friends"]))
            .await
            .unwrap_err();
        assert!(matches!(&err, ResourceError::UnknownReference { reference, .. } if reference == "friends"));
        assert!(err.is_client_error());
        assert!(db.queries().is_empty());
    }

    #[tokio::test]
    async fn test_find_many_junction_needs_two_conditions() {
        let db = RecordingDb::default();
        let ctx = Ctx::default();
        let users = users();
        let err = users
            .attach(&db, &ctx)
            .find_many(FindManyOpts::new().include(["broken"]))
            .await
            .unwrap_err();
        match err {
            ResourceError::Relation { reference, message, .. } => {
                assert_eq!(reference, "broken");
                assert_eq!(message, "junction returned 1 conditions, expected 2");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(db.queries().is_empty());
    }

    #[tokio::test]
    async fn test_find_many_unresolved_target() {
        let db = RecordingDb::default();
        let ctx = Ctx::default();
        let users = users();
        let err = users
            .attach(&db, &ctx)
            .find_many(FindManyOpts::new().include(["ghost"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Relation { .. }));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_find_many_output_shape_mismatch() {
        let db = RecordingDb::answering(vec![json!({
            "id": 1, "username": "ada", "firstName": "Ada", "shout": "ADA", "groups": null
        })]);
        let ctx = Ctx::default();
        let users = users();
        let err = users
            .attach(&db, &ctx)
            .find_many(FindManyOpts::new().include(["groups"]))
            .await
            .unwrap_err();
        match err {
            ResourceError::OutputShape { source, .. } => assert_eq!(source.path_string(), "groups"),
            other => panic!("unexpected error: {other}"),
        }
    }

    // ============================================================================
    // Row filters and context
    // ============================================================================

    fn tenant_users() -> TableResource<Ctx> {
        let props = user_props().select_filter(|q: &mut SelectQuery, ctx: &Ctx| match ctx.tenant {
            Some(t) => {
                let p = q.bind(Value::Int(t));
                q.and_where(format!("\"main\".\"tenant_id\" = {}", p));
                Ok(())
            }
            None => Err("tenant is required".into()),
        });
        TableResource::new(props).unwrap()
    }

    #[tokio::test]
    async fn test_select_filter_receives_context() {
        let db = RecordingDb::default();
        let ctx = Ctx { tenant: Some(7) };
        let users = tenant_users();
        users.attach(&db, &ctx).find_unique(obj(json!({"id": 1}))).await.unwrap();

        let q = db.only_query();
        assert!(q.sql.contains("WHERE \"main\".\"id\" = $1 AND \"main\".\"tenant_id\" = $2 LIMIT 1"));
        assert_eq!(q.params, vec![Value::Int(1), Value::Int(7)]);
    }

    #[tokio::test]
    async fn test_select_filter_rejection() {
        let db = RecordingDb::default();
        let ctx = Ctx::default();
        let users = tenant_users();
        let err = users
            .attach(&db, &ctx)
            .find_many(FindManyOpts::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Filter { message, .. } if message == "tenant is required"));
        assert!(db.queries().is_empty());
    }

    #[tokio::test]
    async fn test_delete_filter_null_match() {
        let props = user_props().delete_filter(|q: &mut DeleteQuery, _: &Ctx| {
            q.where_eq(MAIN_ALIAS, "archived_at", Value::Null, None);
            Ok(())
        });
        let users = TableResource::new(props).unwrap();
        let db = RecordingDb::default();
        let ctx = Ctx::default();
        users.attach(&db, &ctx).delete(obj(json!({"id": 1}))).await.unwrap();

        let q = db.only_query();
        assert!(q
            .sql
            .contains("WHERE \"main\".\"id\" = $1 AND \"main\".\"archived_at\" IS NULL RETURNING"));
        assert_eq!(q.params, vec![Value::Int(1)]);
    }

    // ============================================================================
    // Mutations
    // ============================================================================

    #[tokio::test]
    async fn test_create() {
        let db = RecordingDb::answering(vec![json!({
            "id": 3, "username": "grace", "firstName": "Grace", "shout": "GRACE"
        })]);
        let ctx = Ctx::default();
        let users = users();

        let row = users
            .attach(&db, &ctx)
            .create(obj(json!({"username": " grace ", "firstName": "Grace", "id": 99})))
            .await
            .unwrap();

        let q = db.only_query();
        assert_eq!(
            q.sql,
            format!(
                "WITH q AS (INSERT INTO \"users\" AS \"main\" (\"first_name\", \"username\") VALUES ($1, $2) \
                 RETURNING {}) SELECT to_jsonb(q) FROM q",
                USER_COLUMNS
            )
        );
        assert_eq!(q.params, vec![Value::from("Grace"), Value::from(" grace ")]);
        assert_eq!(row.get("id"), Some(&Value::Int(3)));
    }

    #[tokio::test]
    async fn test_create_requires_create_only_fields() {
        let db = RecordingDb::default();
        let ctx = Ctx::default();
        let users = users();
        let err = users
            .attach(&db, &ctx)
            .create(obj(json!({"firstName": "Grace"})))
            .await
            .unwrap_err();
        match err {
            ResourceError::Validation { input, source, .. } => {
                assert_eq!(input, "data");
                assert_eq!(source.path_string(), "username");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_modify_sets_only_supplied_fields() {
        let db = RecordingDb::default();
        let ctx = Ctx::default();
        let users = users();

        let row = users
            .attach(&db, &ctx)
            .modify(obj(json!({"id": 1})), obj(json!({"firstName": "Ada", "username": "ignored"})))
            .await
            .unwrap();

        assert!(row.is_none());
        let q = db.only_query();
        assert!(q.sql.starts_with(
            "WITH q AS (UPDATE \"users\" AS \"main\" SET \"first_name\" = $1 WHERE \"main\".\"id\" = $2 RETURNING"
        ));
        assert_eq!(q.params, vec![Value::from("Ada"), Value::Int(1)]);
    }

    #[tokio::test]
    async fn test_modify_without_data_reads_row() {
        let db = RecordingDb::default();
        let ctx = Ctx::default();
        let users = users();
        users
            .attach(&db, &ctx)
            .modify(obj(json!({"id": 1})), Value::Null)
            .await
            .unwrap();
        assert!(db.only_query().sql.starts_with("SELECT to_jsonb(q) FROM (SELECT"));
    }

    #[tokio::test]
    async fn test_delete() {
        let db = RecordingDb::answering(vec![json!({
            "id": 1, "username": "ada", "firstName": "Ada", "shout": "ADA"
        })]);
        let ctx = Ctx::default();
        let users = users();

        let row = users.attach(&db, &ctx).delete(obj(json!({"id": 1}))).await.unwrap();

        assert_eq!(row.and_then(|r| r.get("id").cloned()), Some(Value::Int(1)));
        let q = db.only_query();
        assert!(q
            .sql
            .starts_with("WITH q AS (DELETE FROM \"users\" AS \"main\" WHERE \"main\".\"id\" = $1 RETURNING"));
    }
}
