use thiserror::Error;

/// Boxed error used where the concrete error type belongs to a caller or a
/// transport implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while opening a bulk-load channel.
#[derive(Debug, Error)]
pub enum DbError {
    /// Any error reported by the Postgres driver.
    #[error("SQL error: {0}")]
    Sql(#[from] tokio_postgres::Error),

    /// A non-Postgres transport failed to produce a channel.
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),
}
