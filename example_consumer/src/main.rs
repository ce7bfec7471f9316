//! Example consumer: users and groups joined through `group_member_users`.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Needs `POSTGRES_DSN` (or `DATABASE_URL`), e.g. in a `.env` file.

use resource_kit::validate::{datetime, int, not_null, string};
use resource_kit::{
    DatabaseConfig, DynamicField, FindManyOpts, PgDatabase, Reference, Relation, StaticField, TableResource,
    TableResourceProps, Value,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// Per-request context handed to dynamic fields and row filters.
#[derive(Default)]
struct RequestContext {
    locale: Option<String>,
}

fn group_resource() -> Result<TableResource<RequestContext>, resource_kit::DefinitionError> {
    TableResource::new(
        TableResourceProps::new("Group", "groups")
            .primary_key(["id"])
            .modifiable(["name"])
            .static_field("id", StaticField::new(not_null(int())))
            .static_field("name", StaticField::new(not_null(string().trim().min(1).max(127)))),
    )
}

fn user_resource(groups: Arc<TableResource<RequestContext>>) -> Result<TableResource<RequestContext>, resource_kit::DefinitionError> {
    TableResource::new(
        TableResourceProps::new("User", "users")
            .primary_key(["id"])
            .create_only(["username"])
            .modifiable(["firstName", "lastName"])
            .static_field("id", StaticField::new(not_null(int())))
            .static_field("username", StaticField::new(not_null(string().trim().lower().max(63))))
            .static_field("firstName", StaticField::new(string().trim().max(127)).column("first_name"))
            .static_field("lastName", StaticField::new(string().trim().max(127)).column("last_name"))
            .static_field("createdAt", StaticField::new(not_null(datetime())).column("created_at"))
            .dynamic_field(
                "displayName",
                DynamicField::new(not_null(string()), |alias: &str, ctx: &RequestContext| {
                    let fallback = match ctx.locale.as_deref() {
                        Some("de") => "Unbekannt",
                        _ => "Unknown",
                    };
                    format!(
                        "COALESCE(NULLIF(TRIM(CONCAT_WS(' ', {a}.\"first_name\", {a}.\"last_name\")), ''), '{f}')",
                        a = alias,
                        f = fallback
                    )
                }),
            )
            .reference(
                "groups",
                Reference::new(
                    groups,
                    Relation::junction("group_member_users", |lhs: &str, junction: &str, rhs: &str| {
                        vec![
                            format!("{}.\"id\" = {}.\"member_user_id\"", lhs, junction),
                            format!("{}.\"group_id\" = {}.\"id\"", junction, rhs),
                        ]
                    }),
                ),
            ),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resource_kit=info")),
        )
        .init();

    let config = DatabaseConfig::from_env()?;
    let db = PgDatabase::connect(&config).await?;

    let migrations = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    let applied = db.migrate(&migrations).await?;
    tracing::info!(count = applied.len(), "migrations applied");

    let groups = Arc::new(group_resource()?);
    let users = user_resource(groups.clone())?;

    let ctx = RequestContext::default();
    let attached = users.attach(&db, &ctx);

    let rows = attached
        .find_many(FindManyOpts::new().include(["groups"]).limit(50))
        .await?;
    for row in &rows {
        println!("{}", serde_json::to_string_pretty(row)?);
    }

    let ada = attached
        .find_unique(Value::from(json!({ "id": 1 })))
        .await?;
    match ada {
        Some(user) => println!("user 1: {}", serde_json::to_string(&user)?),
        None => println!("user 1 not found"),
    }

    let admins = groups
        .attach(&db, &ctx)
        .find_many(FindManyOpts::new().filter(Value::from(json!({ "name": "admins" }))))
        .await?;
    tracing::info!(count = admins.len(), "groups named 'admins'");

    Ok(())
}
