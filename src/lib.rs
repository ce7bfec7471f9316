//! Resource kit: declarative PostgreSQL table resources with derived validators and
//! JSON-assembled queries.

pub mod config;
pub mod database;
pub mod error;
pub mod migration;
pub mod resource;
pub mod sql;
pub mod validate;

pub use config::DatabaseConfig;
pub use database::{Database, PgDatabase};
pub use error::{DatabaseError, DefinitionError, ResourceError};
pub use migration::apply_migrations;
pub use resource::{
    AttachedTableResource, DynamicField, FindManyOpts, Reference, ReferenceTarget, Relation, StaticField,
    TableResource, TableResourceProps,
};
pub use validate::{ValidationError, Validator, Value};
