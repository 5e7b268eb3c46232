//! Static bindings from entity properties to table columns.
//!
//! Each column fuses an accessor and a [`ValueHandler`] into one boxed write
//! function when the mapping is built, so writing a row is one dynamic call
//! per column and no type inspection at runtime.

use crate::error::{ColumnError, ColumnErrorKind, MappingError};
use connectors::sql::{
    base::error::BoxError,
    postgres::{
        binary::FieldWriter,
        handlers::{ValueHandler, ValueTypeHandler},
    },
};
use model::core::Value;
use planner::query::{ast::common::TableRef, binary_copy_in, dialect::Postgres};
use std::fmt;
use tokio_postgres::types::Type;
use tracing::debug;

type WriteFn<E> =
    Box<dyn Fn(&E, &mut FieldWriter<'_>) -> Result<(), ColumnErrorKind> + Send + Sync>;

/// One column of a [`Mapping`]: its name, type, and how to produce its field
/// from an entity.
pub struct Column<E> {
    name: String,
    pg_type: Type,
    write: WriteFn<E>,
}

impl<E> Column<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pg_type(&self) -> &Type {
        &self.pg_type
    }

    /// Writes this column's field for `entity`.
    pub fn write(&self, entity: &E, fields: &mut FieldWriter<'_>) -> Result<(), ColumnError> {
        (self.write)(entity, fields).map_err(|kind| ColumnError {
            column: self.name.clone(),
            kind,
        })
    }
}

impl<E> fmt::Debug for Column<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("pg_type", &self.pg_type)
            .finish_non_exhaustive()
    }
}

/// Ordered columns of one table, with the COPY command that loads them.
///
/// Column order is the declaration order and is also the field order on the
/// wire. A mapping is immutable and can be shared across sessions.
pub struct Mapping<E> {
    table: TableRef,
    columns: Vec<Column<E>>,
    copy_statement: String,
}

impl<E: 'static> Mapping<E> {
    pub fn builder(table: impl Into<String>) -> MappingBuilder<E> {
        MappingBuilder::new(TableRef::new(table))
    }

    pub fn builder_in_schema(
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> MappingBuilder<E> {
        MappingBuilder::new(TableRef::with_schema(schema, table))
    }
}

impl<E> Mapping<E> {
    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn columns(&self) -> &[Column<E>] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(Column::name)
    }

    /// `COPY <table> (<columns>) FROM STDIN WITH (FORMAT BINARY)`.
    pub fn copy_statement(&self) -> &str {
        &self.copy_statement
    }

    /// Writes every column of `entity`, in order, stopping at the first
    /// failure.
    pub fn write_row(&self, entity: &E, fields: &mut FieldWriter<'_>) -> Result<(), ColumnError> {
        self.columns
            .iter()
            .try_for_each(|column| column.write(entity, fields))
    }
}

impl<E> fmt::Debug for Mapping<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("table", &self.table)
            .field("columns", &self.columns)
            .finish()
    }
}

/// Collects column bindings for a [`Mapping`].
///
/// `H` is the handler for the column type and `P` the property type it
/// encodes. Binding variants differ only in how the accessor hands out the
/// property: owned, optional, borrowed, or fallible.
pub struct MappingBuilder<E> {
    table: TableRef,
    columns: Vec<Column<E>>,
    error: Option<MappingError>,
}

impl<E: 'static> MappingBuilder<E> {
    fn new(table: TableRef) -> Self {
        Self {
            table,
            columns: Vec::new(),
            error: None,
        }
    }

    fn push<F>(mut self, name: impl Into<String>, pg_type: Type, write: F) -> Self
    where
        F: Fn(&E, &mut FieldWriter<'_>) -> Result<(), ColumnErrorKind> + Send + Sync + 'static,
    {
        self.columns.push(Column {
            name: name.into(),
            pg_type,
            write: Box::new(write),
        });
        self
    }

    /// Non-null property returned by value.
    pub fn map<P, H, F>(self, name: impl Into<String>, handler: H, accessor: F) -> Self
    where
        P: 'static,
        H: ValueHandler<P> + 'static,
        F: Fn(&E) -> P + Send + Sync + 'static,
    {
        let pg_type = handler.pg_type();
        self.push(name, pg_type, move |entity, fields| {
            let value = accessor(entity);
            Ok(fields.write_field(&handler, Some(&value))?)
        })
    }

    /// Property that may be absent; `None` is written as NULL.
    pub fn map_nullable<P, H, F>(self, name: impl Into<String>, handler: H, accessor: F) -> Self
    where
        P: 'static,
        H: ValueHandler<P> + 'static,
        F: Fn(&E) -> Option<P> + Send + Sync + 'static,
    {
        let pg_type = handler.pg_type();
        self.push(name, pg_type, move |entity, fields| {
            let value = accessor(entity);
            Ok(fields.write_field(&handler, value.as_ref())?)
        })
    }

    /// Property borrowed from the entity, e.g. a `&str` field.
    pub fn map_ref<P, H, F>(self, name: impl Into<String>, handler: H, accessor: F) -> Self
    where
        P: ?Sized + 'static,
        H: ValueHandler<P> + 'static,
        F: for<'a> Fn(&'a E) -> &'a P + Send + Sync + 'static,
    {
        let pg_type = handler.pg_type();
        self.push(name, pg_type, move |entity, fields| {
            Ok(fields.write_field(&handler, Some(accessor(entity)))?)
        })
    }

    pub fn map_optional_ref<P, H, F>(self, name: impl Into<String>, handler: H, accessor: F) -> Self
    where
        P: ?Sized + 'static,
        H: ValueHandler<P> + 'static,
        F: for<'a> Fn(&'a E) -> Option<&'a P> + Send + Sync + 'static,
    {
        let pg_type = handler.pg_type();
        self.push(name, pg_type, move |entity, fields| {
            Ok(fields.write_field(&handler, accessor(entity))?)
        })
    }

    /// Property computed by a fallible accessor. Its error aborts the row as
    /// an accessor failure of this column.
    pub fn try_map<P, H, F, Err>(self, name: impl Into<String>, handler: H, accessor: F) -> Self
    where
        P: 'static,
        H: ValueHandler<P> + 'static,
        F: Fn(&E) -> Result<Option<P>, Err> + Send + Sync + 'static,
        Err: Into<BoxError>,
    {
        let pg_type = handler.pg_type();
        self.push(name, pg_type, move |entity, fields| {
            let value = accessor(entity).map_err(|err| ColumnErrorKind::Accessor(err.into()))?;
            Ok(fields.write_field(&handler, value.as_ref())?)
        })
    }

    /// Weakly typed column: the [`Value`] is coerced to `target` when
    /// written, and `Value::Null` becomes NULL.
    pub fn map_value<F>(mut self, name: impl Into<String>, target: Type, accessor: F) -> Self
    where
        F: for<'a> Fn(&'a E) -> &'a Value + Send + Sync + 'static,
    {
        let name = name.into();
        match ValueTypeHandler::new(target.clone()) {
            Some(handler) => self.map_ref(name, handler, accessor),
            None => {
                self.error.get_or_insert(MappingError::UnsupportedType {
                    column: name,
                    pg_type: target.name().to_string(),
                });
                self
            }
        }
    }

    /// Validates the columns and renders the COPY command.
    pub fn build(self) -> Result<Mapping<E>, MappingError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.table.name.trim().is_empty() {
            return Err(MappingError::EmptyTableName);
        }
        if self.columns.is_empty() {
            return Err(MappingError::NoColumns {
                table: self.table.to_string(),
            });
        }
        if i16::try_from(self.columns.len()).is_err() {
            return Err(MappingError::TooManyColumns {
                table: self.table.to_string(),
                count: self.columns.len(),
            });
        }

        let copy_statement = binary_copy_in(
            &Postgres,
            self.table.clone(),
            self.columns.iter().map(Column::name),
        );
        debug!("Built mapping for {}: {}", self.table, copy_statement);

        Ok(Mapping {
            table: self.table,
            columns: self.columns,
            copy_statement,
        })
    }
}
