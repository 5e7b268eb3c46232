use connectors::sql::{
    base::error::{BoxError, DbError},
    postgres::binary::WriterError,
};
use thiserror::Error;

/// Invalid column mappings, reported by `MappingBuilder::build`.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Mapping for table {table} has no columns")]
    NoColumns { table: String },

    #[error("Mapping for table {table} has {count} columns (at most {} allowed)", i16::MAX)]
    TooManyColumns { table: String, count: usize },

    #[error("Table name is empty")]
    EmptyTableName,

    /// `map_value` was given a column type values cannot be coerced to.
    #[error("Column {column} has unsupported type {pg_type} for dynamic values")]
    UnsupportedType { column: String, pg_type: String },
}

#[derive(Debug, Error)]
pub enum ColumnErrorKind {
    #[error(transparent)]
    Encode(#[from] WriterError),

    /// The accessor of a `try_map` column failed.
    #[error("Accessor failed: {0}")]
    Accessor(#[source] BoxError),
}

/// A column that failed to produce its field for one entity.
#[derive(Debug, Error)]
#[error("Column \"{column}\": {kind}")]
pub struct ColumnError {
    pub column: String,
    #[source]
    pub kind: ColumnErrorKind,
}

#[derive(Debug, Error)]
pub enum BulkInsertError {
    #[error("Failed to open COPY channel: {0}")]
    Channel(#[from] DbError),

    /// Encoding entity number `row` (zero based) failed. Nothing after it
    /// was written.
    #[error("Failed to save entity at row {row}: {source}")]
    SaveEntity {
        row: u64,
        #[source]
        source: ColumnError,
    },

    #[error("Binary writer error: {0}")]
    Writer(#[from] WriterError),

    /// The entity stream itself yielded an error.
    #[error("Entity source failed: {0}")]
    Source(#[source] BoxError),

    #[error("COPY session was aborted by an earlier failure")]
    Aborted,

    /// Writing the trailer, flushing, or closing the channel failed.
    #[error("Failed to complete COPY: {0}")]
    Teardown(#[source] WriterError),
}
