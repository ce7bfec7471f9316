//! Compilation of [`TableResourceProps`] into an immutable [`TableResource`].

use super::attached::AttachedTableResource;
use super::definition::{DynamicField, Reference, Relation, StaticField, TableResourceProps};
use super::name::{check_name, check_sql_type};
use crate::database::Database;
use crate::error::DefinitionError;
use crate::validate::{optional, AnyValidator, ObjectValidator, Validator};
use std::collections::BTreeMap;
use std::fmt;

/// Compiled resource. Read-only after construction and safe to share between attachments.
pub struct TableResource<C = ()> {
    props: TableResourceProps<C>,
    output: ObjectValidator,
    unique_where: ObjectValidator,
    many_where: ObjectValidator,
    create_input: ObjectValidator,
    modify_input: ObjectValidator,
}

impl<C> TableResource<C> {
    /// Checks every invariant of `props` (first violation wins) and derives the validators.
    pub fn new(mut props: TableResourceProps<C>) -> Result<Self, DefinitionError> {
        if props.name.is_empty() {
            return Err(DefinitionError::Empty("resource name"));
        }
        if props.table_name.is_empty() {
            return Err(DefinitionError::Empty("table name"));
        }
        if props.primary_key.is_empty() {
            return Err(DefinitionError::Empty("primary key"));
        }
        if props.static_fields.is_empty() {
            return Err(DefinitionError::Empty("static fields"));
        }

        check_name(&props.name)?;
        check_name(&props.table_name)?;

        for field in &props.primary_key {
            require_static(&props.static_fields, "primary key", field)?;
        }
        for field in &props.create_only_fields {
            require_static(&props.static_fields, "create only fields", field)?;
            if props.modifiable_fields.contains(field) {
                return Err(DefinitionError::CreateOnlyModifiable(field.clone()));
            }
        }
        for field in &props.modifiable_fields {
            require_static(&props.static_fields, "modifiable fields", field)?;
        }

        for (name, field) in props.static_fields.iter_mut() {
            check_name(name)?;
            let column = field.column.get_or_insert_with(|| name.clone());
            check_name(column)?;
            if let Some(sql_type) = &field.sql_type {
                check_sql_type(name, sql_type)?;
            }
            if props.dynamic_fields.contains_key(name) {
                return Err(DefinitionError::DuplicateField(name.clone()));
            }
        }
        for name in props.dynamic_fields.keys() {
            check_name(name)?;
        }
        for (name, reference) in &props.references {
            check_name(name)?;
            if props.static_fields.contains_key(name) || props.dynamic_fields.contains_key(name) {
                return Err(DefinitionError::DuplicateField(name.clone()));
            }
            if let Relation::Junction { table, .. } = &reference.relation {
                check_name(table)?;
            }
        }

        let ty = |field: &str| -> AnyValidator { props.static_fields[field].ty.clone() };

        let unique_where = props
            .primary_key
            .iter()
            .fold(ObjectValidator::new(), |o, f| o.field(f.clone(), ty(f)));
        let many_where = props
            .static_fields
            .iter()
            .fold(ObjectValidator::new(), |o, (name, f)| o.field(name.clone(), optional(f.ty.clone())));
        let create_input = props
            .modifiable_fields
            .iter()
            .chain(&props.create_only_fields)
            .fold(ObjectValidator::new(), |o, f| o.field(f.clone(), ty(f)));
        let modify_input = props
            .modifiable_fields
            .iter()
            .fold(ObjectValidator::new(), |o, f| o.field(f.clone(), optional(ty(f))));
        let output = props
            .dynamic_fields
            .iter()
            .map(|(name, f)| (name, f.ty.clone()))
            .chain(props.static_fields.iter().map(|(name, f)| (name, f.ty.clone())))
            .fold(ObjectValidator::new(), |o, (name, v)| o.field(name.clone(), v));

        Ok(TableResource {
            props,
            output,
            unique_where,
            many_where,
            create_input,
            modify_input,
        })
    }

    pub fn name(&self) -> &str {
        &self.props.name
    }

    pub fn table_name(&self) -> &str {
        &self.props.table_name
    }

    pub fn primary_key(&self) -> &[String] {
        &self.props.primary_key
    }

    pub fn static_fields(&self) -> &BTreeMap<String, StaticField> {
        &self.props.static_fields
    }

    pub fn dynamic_fields(&self) -> &BTreeMap<String, DynamicField<C>> {
        &self.props.dynamic_fields
    }

    pub fn references(&self) -> &BTreeMap<String, Reference<C>> {
        &self.props.references
    }

    pub(crate) fn props(&self) -> &TableResourceProps<C> {
        &self.props
    }

    /// Column backing a static field. Columns are filled in during compilation.
    pub fn column(&self, field: &str) -> Option<&str> {
        self.props.static_fields.get(field).and_then(|f| f.column.as_deref())
    }

    /// Row shape without relations.
    pub fn output(&self) -> &ObjectValidator {
        &self.output
    }

    /// Fields of [`Self::output`]; queries extend a copy of this with included relations.
    pub fn output_fields(&self) -> &BTreeMap<String, AnyValidator> {
        self.output.fields()
    }

    pub fn unique_where(&self) -> &ObjectValidator {
        &self.unique_where
    }

    pub fn many_where(&self) -> &ObjectValidator {
        &self.many_where
    }

    pub fn create_input(&self) -> &ObjectValidator {
        &self.create_input
    }

    pub fn modify_input(&self) -> &ObjectValidator {
        &self.modify_input
    }

    /// Binds the resource to a database handle and per-request context.
    pub fn attach<'a>(&'a self, db: &'a dyn Database, ctx: &'a C) -> AttachedTableResource<'a, C> {
        AttachedTableResource::new(self, db, ctx)
    }
}

impl<C> fmt::Debug for TableResource<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableResource")
            .field("name", &self.props.name)
            .field("table_name", &self.props.table_name)
            .field("output", &self.output.type_name())
            .finish_non_exhaustive()
    }
}

fn require_static(
    static_fields: &BTreeMap<String, StaticField>,
    set: &'static str,
    field: &str,
) -> Result<(), DefinitionError> {
    if static_fields.contains_key(field) {
        Ok(())
    } else {
        Err(DefinitionError::UnknownField {
            set,
            field: field.to_string(),
        })
    }
}
