use crate::sql::base::{connection::CopyConnection, error::DbError};
use async_trait::async_trait;
use bytes::Bytes;
use tokio_postgres::{Client, CopyInSink, Transaction};
use tracing::debug;

#[async_trait]
impl CopyConnection for Client {
    type Error = tokio_postgres::Error;
    type Sink = CopyInSink<Bytes>;

    async fn open_copy(&self, statement: &str) -> Result<Self::Sink, DbError> {
        debug!("COPY statement: {}", statement);
        let sink = Client::copy_in(self, statement).await?;
        Ok(sink)
    }
}

/// Copying inside a transaction lets the caller roll back rows that were
/// already streamed when a session fails part way.
#[async_trait]
impl CopyConnection for Transaction<'_> {
    type Error = tokio_postgres::Error;
    type Sink = CopyInSink<Bytes>;

    async fn open_copy(&self, statement: &str) -> Result<Self::Sink, DbError> {
        debug!("COPY statement (in transaction): {}", statement);
        let sink = Transaction::copy_in(self, statement).await?;
        Ok(sink)
    }
}
