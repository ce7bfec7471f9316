//! Declarative input of a table resource: fields, references and row-filter hooks.

use super::table::TableResource;
use crate::sql::{DeleteQuery, SelectQuery, UpdateQuery};
use crate::validate::{AnyValidator, Validator};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// `(alias, ctx) -> SQL expression`. The alias arrives quoted (`"main"`, `"j0"`).
pub type ExprFn<C> = dyn Fn(&str, &C) -> String + Send + Sync;
/// `(lhs, rhs) -> ON condition`.
pub type JoinFn = dyn Fn(&str, &str) -> String + Send + Sync;
/// `(lhs, junction, rhs) -> [lhs-junction condition, junction-rhs condition]`.
pub type JunctionFn = dyn Fn(&str, &str, &str) -> Vec<String> + Send + Sync;
pub type SelectFilter<C> = dyn Fn(&mut SelectQuery, &C) -> Result<(), String> + Send + Sync;
pub type UpdateFilter<C> = dyn Fn(&mut UpdateQuery, &C) -> Result<(), String> + Send + Sync;
pub type DeleteFilter<C> = dyn Fn(&mut DeleteQuery, &C) -> Result<(), String> + Send + Sync;

/// Column-backed field.
#[derive(Clone, Debug)]
pub struct StaticField {
    pub ty: AnyValidator,
    /// Defaults to the field name.
    pub column: Option<String>,
    /// Cast applied to bound parameters, e.g. `uuid`.
    pub sql_type: Option<String>,
}

impl StaticField {
    pub fn new(ty: impl Validator + 'static) -> Self {
        StaticField {
            ty: ty.boxed(),
            column: None,
            sql_type: None,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn sql_type(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = Some(sql_type.into());
        self
    }
}

/// Computed, read-only field.
pub struct DynamicField<C> {
    pub ty: AnyValidator,
    pub expr: Arc<ExprFn<C>>,
}

impl<C> DynamicField<C> {
    pub fn new<F>(ty: impl Validator + 'static, expr: F) -> Self
    where
        F: Fn(&str, &C) -> String + Send + Sync + 'static,
    {
        DynamicField {
            ty: ty.boxed(),
            expr: Arc::new(expr),
        }
    }
}

impl<C> Clone for DynamicField<C> {
    fn clone(&self) -> Self {
        DynamicField {
            ty: self.ty.clone(),
            expr: self.expr.clone(),
        }
    }
}

impl<C> fmt::Debug for DynamicField<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicField").field("ty", &self.ty).finish_non_exhaustive()
    }
}

/// How the target of a reference is reached from the main row.
#[derive(Clone)]
pub enum Relation {
    Join(Arc<JoinFn>),
    Junction {
        table: String,
        conditions: Arc<JunctionFn>,
    },
}

impl Relation {
    pub fn join<F>(f: F) -> Self
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        Relation::Join(Arc::new(f))
    }

    pub fn junction<F>(table: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str, &str, &str) -> Vec<String> + Send + Sync + 'static,
    {
        Relation::Junction {
            table: table.into(),
            conditions: Arc::new(f),
        }
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Join(_) => f.write_str("Join"),
            Relation::Junction { table, .. } => f.debug_struct("Junction").field("table", table).finish_non_exhaustive(),
        }
    }
}

type LazyTarget<C> = dyn Fn() -> Option<Arc<TableResource<C>>> + Send + Sync;

/// Target resource of a reference. `Lazy` resolves at query time, which allows
/// resources that reference each other.
pub enum ReferenceTarget<C> {
    Resource(Arc<TableResource<C>>),
    Lazy(Arc<LazyTarget<C>>),
}

impl<C> ReferenceTarget<C> {
    pub fn lazy<F>(f: F) -> Self
    where
        F: Fn() -> Option<Arc<TableResource<C>>> + Send + Sync + 'static,
    {
        ReferenceTarget::Lazy(Arc::new(f))
    }

    pub fn resolve(&self) -> Option<Arc<TableResource<C>>> {
        match self {
            ReferenceTarget::Resource(r) => Some(r.clone()),
            ReferenceTarget::Lazy(f) => f(),
        }
    }
}

impl<C> Clone for ReferenceTarget<C> {
    fn clone(&self) -> Self {
        match self {
            ReferenceTarget::Resource(r) => ReferenceTarget::Resource(r.clone()),
            ReferenceTarget::Lazy(f) => ReferenceTarget::Lazy(f.clone()),
        }
    }
}

impl<C> From<Arc<TableResource<C>>> for ReferenceTarget<C> {
    fn from(resource: Arc<TableResource<C>>) -> Self {
        ReferenceTarget::Resource(resource)
    }
}

pub struct Reference<C> {
    pub target: ReferenceTarget<C>,
    pub relation: Relation,
}

impl<C> Reference<C> {
    pub fn new(target: impl Into<ReferenceTarget<C>>, relation: Relation) -> Self {
        Reference {
            target: target.into(),
            relation,
        }
    }
}

impl<C> Clone for Reference<C> {
    fn clone(&self) -> Self {
        Reference {
            target: self.target.clone(),
            relation: self.relation.clone(),
        }
    }
}

impl<C> fmt::Debug for Reference<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference").field("relation", &self.relation).finish_non_exhaustive()
    }
}

/// Declarative definition, compiled by [`TableResource::new`].
pub struct TableResourceProps<C = ()> {
    pub name: String,
    pub table_name: String,
    pub primary_key: Vec<String>,
    pub create_only_fields: Vec<String>,
    pub modifiable_fields: Vec<String>,
    pub static_fields: BTreeMap<String, StaticField>,
    pub dynamic_fields: BTreeMap<String, DynamicField<C>>,
    pub references: BTreeMap<String, Reference<C>>,
    pub select_filter: Option<Arc<SelectFilter<C>>>,
    pub update_filter: Option<Arc<UpdateFilter<C>>>,
    pub delete_filter: Option<Arc<DeleteFilter<C>>>,
}

impl<C> TableResourceProps<C> {
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        TableResourceProps {
            name: name.into(),
            table_name: table_name.into(),
            primary_key: Vec::new(),
            create_only_fields: Vec::new(),
            modifiable_fields: Vec::new(),
            static_fields: BTreeMap::new(),
            dynamic_fields: BTreeMap::new(),
            references: BTreeMap::new(),
            select_filter: None,
            update_filter: None,
            delete_filter: None,
        }
    }

    pub fn primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn create_only<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.create_only_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn modifiable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modifiable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn static_field(mut self, name: impl Into<String>, field: StaticField) -> Self {
        self.static_fields.insert(name.into(), field);
        self
    }

    pub fn dynamic_field(mut self, name: impl Into<String>, field: DynamicField<C>) -> Self {
        self.dynamic_fields.insert(name.into(), field);
        self
    }

    pub fn reference(mut self, name: impl Into<String>, reference: Reference<C>) -> Self {
        self.references.insert(name.into(), reference);
        self
    }

    pub fn select_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut SelectQuery, &C) -> Result<(), String> + Send + Sync + 'static,
    {
        self.select_filter = Some(Arc::new(f));
        self
    }

    pub fn update_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut UpdateQuery, &C) -> Result<(), String> + Send + Sync + 'static,
    {
        self.update_filter = Some(Arc::new(f));
        self
    }

    pub fn delete_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut DeleteQuery, &C) -> Result<(), String> + Send + Sync + 'static,
    {
        self.delete_filter = Some(Arc::new(f));
        self
    }
}
