//! Database settings from the process environment (`.env` is loaded when present).

use crate::error::DatabaseError;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        DatabaseConfig {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Reads `POSTGRES_DSN`, falling back to `DATABASE_URL`. `RESOURCE_KIT_MAX_CONNECTIONS` overrides the pool size.
    pub fn from_env() -> Result<Self, DatabaseError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DatabaseError> {
        let url = ["POSTGRES_DSN", "DATABASE_URL"]
            .into_iter()
            .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| DatabaseError::Config("env/POSTGRES_DSN (or DATABASE_URL) not defined".into()))?;

        let max_connections = match lookup("RESOURCE_KIT_MAX_CONNECTIONS") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                DatabaseError::Config(format!("env/RESOURCE_KIT_MAX_CONNECTIONS is not a number: '{}'", raw))
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(DatabaseConfig { url, max_connections })
    }
}
