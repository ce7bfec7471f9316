//! Table resources: declarative props, the compiler and the per-request query surface.

mod attached;
mod definition;
mod name;
mod table;

pub use attached::{AttachedTableResource, FindManyOpts};
pub use definition::{
    DeleteFilter, DynamicField, ExprFn, JoinFn, JunctionFn, Reference, ReferenceTarget, Relation, SelectFilter,
    StaticField, TableResourceProps, UpdateFilter,
};
pub use name::{check_name, check_sql_type, NAME_PATTERN, SQL_TYPE_PATTERN};
pub use table::TableResource;
