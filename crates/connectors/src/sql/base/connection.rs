use crate::sql::base::error::DbError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Sink;
use std::sync::Arc;

/// A connection able to open a `COPY ... FROM STDIN` channel.
///
/// The returned sink receives the raw bytes of the copy stream. Closing the
/// sink completes the copy; dropping it without closing aborts it.
#[async_trait]
pub trait CopyConnection: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Sink: Sink<Bytes, Error = Self::Error> + Send + 'static;

    /// Issues `statement` and returns the channel to stream rows into.
    async fn open_copy(&self, statement: &str) -> Result<Self::Sink, DbError>;
}

#[async_trait]
impl<C> CopyConnection for Arc<C>
where
    C: CopyConnection + ?Sized,
{
    type Error = C::Error;
    type Sink = C::Sink;

    async fn open_copy(&self, statement: &str) -> Result<Self::Sink, DbError> {
        self.as_ref().open_copy(statement).await
    }
}
