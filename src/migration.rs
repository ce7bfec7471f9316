//! Apply ordered SQL scripts from a directory, tracking applied names in `__migrations`.

use crate::error::DatabaseError;
use sqlx::PgPool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const MIGRATIONS_TABLE: &str = "__migrations";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Migration {
    pub name: String,
    pub sql: String,
}

/// Reads `*.sql` files (non-empty stem) from `dir`, sorted by name.
pub async fn read_migrations(dir: &Path) -> Result<Vec<Migration>, DatabaseError> {
    let abs: PathBuf = std::path::absolute(dir)?;
    let meta = tokio::fs::metadata(&abs).await?;
    if !meta.is_dir() {
        return Err(DatabaseError::Migration(format!(
            "invalid migrations directory '{}': is not a directory",
            abs.display()
        )));
    }

    let mut migrations = Vec::new();
    let mut entries = tokio::fs::read_dir(&abs).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(name) = file_name.strip_suffix(".sql") else { continue };
        if name.is_empty() {
            continue;
        }
        let sql = tokio::fs::read_to_string(entry.path()).await.map_err(|e| {
            DatabaseError::Migration(format!("failed to read file '{}': {}", entry.path().display(), e))
        })?;
        migrations.push(Migration {
            name: name.to_string(),
            sql,
        });
    }

    migrations.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(migrations)
}

/// Drops migrations whose names were already applied; order is preserved.
pub fn pending(migrations: Vec<Migration>, applied: &HashSet<String>) -> Vec<Migration> {
    migrations.into_iter().filter(|m| !applied.contains(&m.name)).collect()
}

/// Applies all pending scripts from `dir` in one transaction. Returns the applied names.
pub async fn apply_migrations(pool: &PgPool, dir: &Path) -> Result<Vec<String>, DatabaseError> {
    let migrations = read_migrations(dir).await?;

    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            name VARCHAR(127) NOT NULL PRIMARY KEY,
            timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        MIGRATIONS_TABLE
    );
    sqlx::query(&ddl).execute(pool).await?;

    let applied: HashSet<String> = sqlx::query_scalar::<_, String>(&format!("SELECT name FROM {}", MIGRATIONS_TABLE))
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();

    let todo = pending(migrations, &applied);
    if todo.is_empty() {
        tracing::debug!(dir = %dir.display(), "no pending migrations");
        return Ok(Vec::new());
    }

    let mut tx = pool.begin().await?;
    for m in &todo {
        sqlx::raw_sql(&m.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::Migration(format!("failed to apply migration '{}': {}", m.name, e)))?;
        sqlx::query(&format!("INSERT INTO {} (name) VALUES ($1)", MIGRATIONS_TABLE))
            .bind(&m.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::Migration(format!("failed to log applied migration '{}': {}", m.name, e)))?;
        tracing::info!(migration = %m.name, "applied migration");
    }
    tx.commit().await?;

    Ok(todo.into_iter().map(|m| m.name).collect())
}
