//! Typed errors: definition time, database collaborator, and per-operation failures.

use crate::validate::ValidationError;
use thiserror::Error;

/// Raised while compiling `TableResourceProps`. A resource that failed to compile does not exist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("resource-related name '{name}' must comply with pattern {pattern}, but does not")]
    InvalidName { name: String, pattern: &'static str },
    #[error("sql type '{sql_type}' of static field '{field}' must comply with pattern {pattern}")]
    InvalidSqlType {
        field: String,
        sql_type: String,
        pattern: &'static str,
    },
    #[error("{set} references static field '{field}', which is not defined")]
    UnknownField { set: &'static str, field: String },
    #[error("create only field '{0}' is tagged as modifiable, which is not allowed")]
    CreateOnlyModifiable(String),
    #[error("field '{0}' is defined more than once, which is not allowed")]
    DuplicateField(String),
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("sql: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("migration: {0}")]
    Migration(String),
    #[error("config: {0}")]
    Config(String),
}

/// Failure of one operation on an attached resource.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Caller input did not match the derived input shape. Nothing was executed.
    #[error("invalid {input} input for '{resource}'.{operation}(..): {source}")]
    Validation {
        resource: String,
        operation: &'static str,
        input: &'static str,
        #[source]
        source: ValidationError,
    },
    #[error("'{resource}'.{operation}(..) failed to query database: {source}")]
    Query {
        resource: String,
        operation: &'static str,
        #[source]
        source: DatabaseError,
    },
    /// Rows returned by the database do not fit the derived output shape.
    #[error("'{resource}'.{operation}(..) failed to validate results: {source}")]
    OutputShape {
        resource: String,
        operation: &'static str,
        #[source]
        source: ValidationError,
    },
    /// Include of a reference the resource does not declare.
    #[error("'{resource}'.{operation}(..): tried to include reference '{reference}', which does not exist")]
    UnknownReference {
        resource: String,
        operation: &'static str,
        reference: String,
    },
    /// A declared reference could not be realized (unresolved target, malformed junction).
    #[error("'{resource}'.{operation}(..): reference '{reference}' {message}")]
    Relation {
        resource: String,
        operation: &'static str,
        reference: String,
        message: String,
    },
    #[error("'{resource}'.{operation}(..) row filter failed: {message}")]
    Filter {
        resource: String,
        operation: &'static str,
        message: String,
    },
}

impl ResourceError {
    /// True for errors the caller can fix by changing its request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ResourceError::Validation { .. } | ResourceError::UnknownReference { .. })
    }

    pub fn resource(&self) -> &str {
        match self {
            ResourceError::Validation { resource, .. }
            | ResourceError::Query { resource, .. }
            | ResourceError::OutputShape { resource, .. }
            | ResourceError::UnknownReference { resource, .. }
            | ResourceError::Relation { resource, .. }
            | ResourceError::Filter { resource, .. } => resource,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            ResourceError::Validation { operation, .. }
            | ResourceError::Query { operation, .. }
            | ResourceError::OutputShape { operation, .. }
            | ResourceError::UnknownReference { operation, .. }
            | ResourceError::Relation { operation, .. }
            | ResourceError::Filter { operation, .. } => operation,
        }
    }
}

pub type Result<T, E = ResourceError> = std::result::Result<T, E>;
