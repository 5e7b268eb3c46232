//! Bulk loading of entities through a binary COPY session.

use crate::{error::BulkInsertError, mapping::Mapping};
use bytes::Bytes;
use connectors::sql::{
    base::{connection::CopyConnection, error::BoxError},
    postgres::binary::{BinaryWriter, WriterState},
};
use engine_config::settings::CopySettings;
use futures::{Sink, TryStream, TryStreamExt};
use std::{
    borrow::Borrow,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Loads entities of type `E` into the table described by a [`Mapping`].
///
/// Each call opens its own COPY channel on the given connection, writes the
/// header, one row per entity and the trailer, then closes the channel.
/// Without a surrounding transaction, rows sent before a failure may still
/// be committed by the server; run the session on a
/// [`tokio_postgres::Transaction`] when that is not acceptable.
pub struct BulkInsert<E> {
    mapping: Arc<Mapping<E>>,
    settings: CopySettings,
}

impl<E> Clone for BulkInsert<E> {
    fn clone(&self) -> Self {
        Self {
            mapping: Arc::clone(&self.mapping),
            settings: self.settings,
        }
    }
}

impl<E> BulkInsert<E> {
    pub fn new(mapping: impl Into<Arc<Mapping<E>>>) -> Self {
        Self {
            mapping: mapping.into(),
            settings: CopySettings::default(),
        }
    }

    pub fn with_settings(self, settings: CopySettings) -> Self {
        Self { settings, ..self }
    }

    pub fn mapping(&self) -> &Mapping<E> {
        &self.mapping
    }

    pub fn settings(&self) -> &CopySettings {
        &self.settings
    }

    /// Writes `entities` in order and returns the number of rows written.
    ///
    /// The first entity that fails to encode ends the load; the channel is
    /// closed either way.
    pub async fn save_all<C, I>(&self, conn: &C, entities: I) -> Result<u64, BulkInsertError>
    where
        C: CopyConnection,
        I: IntoIterator,
        I::Item: Borrow<E>,
    {
        let mut writer = self.open_writer(conn).await?;

        let mut body = Ok(());
        for entity in entities {
            body = write_entity(&self.mapping, &mut writer, entity.borrow()).await;
            if body.is_err() {
                break;
            }
        }

        let rows = finish(&mut writer, body).await?;
        info!("Saved {} rows into {}", rows, self.mapping.table());
        Ok(rows)
    }

    /// Writes entities from a fallible stream, encoding up to `concurrency`
    /// of them at a time. Rows land in completion order.
    pub async fn save_stream<C, St>(
        &self,
        conn: &C,
        entities: St,
        concurrency: usize,
    ) -> Result<u64, BulkInsertError>
    where
        C: CopyConnection,
        St: TryStream<Ok = E>,
        St::Error: Into<BoxError>,
    {
        let session = self.session(conn).await?;

        let shared = &session;
        let body = entities
            .map_err(|err| BulkInsertError::Source(err.into()))
            .try_for_each_concurrent(concurrency.max(1), |entity| async move {
                shared.save(&entity).await.map(|_| ())
            })
            .await;

        session.complete(body).await
    }

    /// Opens a session that any number of tasks can write rows to.
    pub async fn session<C>(&self, conn: &C) -> Result<CopySession<E, C::Sink>, BulkInsertError>
    where
        C: CopyConnection,
    {
        let writer = self.open_writer(conn).await?;
        Ok(CopySession {
            inner: Arc::new(SessionInner {
                mapping: Arc::clone(&self.mapping),
                writer: Mutex::new(writer),
                failed: AtomicBool::new(false),
            }),
        })
    }

    async fn open_writer<C>(&self, conn: &C) -> Result<BinaryWriter<C::Sink>, BulkInsertError>
    where
        C: CopyConnection,
    {
        let sink = conn.open_copy(self.mapping.copy_statement()).await?;
        let mut writer = BinaryWriter::new(self.settings.buffer_size());
        writer.open(sink)?;
        Ok(writer)
    }
}

/// A COPY channel shared between producers.
///
/// Clones refer to the same channel. Each [`save`](Self::save) holds the
/// writer for exactly one row, so rows from different tasks never
/// interleave. Once any row fails the session is poisoned: later saves
/// return [`BulkInsertError::Aborted`]. [`finish`](Self::finish) must be
/// called to complete the COPY; dropping every clone aborts it.
pub struct CopySession<E, S> {
    inner: Arc<SessionInner<E, S>>,
}

struct SessionInner<E, S> {
    mapping: Arc<Mapping<E>>,
    writer: Mutex<BinaryWriter<S>>,
    failed: AtomicBool,
}

impl<E, S> Clone for CopySession<E, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E, S> CopySession<E, S>
where
    S: Sink<Bytes>,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    /// Writes one row and returns its zero-based position in the stream.
    pub async fn save(&self, entity: &E) -> Result<u64, BulkInsertError> {
        if self.is_failed() {
            return Err(BulkInsertError::Aborted);
        }

        let mut writer = self.inner.writer.lock().await;
        // Another producer may have failed while this one waited.
        if self.is_failed() {
            return Err(BulkInsertError::Aborted);
        }

        let row = writer.rows_written();
        match write_entity(&self.inner.mapping, &mut writer, entity).await {
            Ok(()) => Ok(row),
            Err(err) => {
                self.inner.failed.store(true, Ordering::Release);
                Err(err)
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        self.inner.failed.load(Ordering::Acquire)
    }

    pub fn mapping(&self) -> &Mapping<E> {
        &self.inner.mapping
    }

    pub async fn rows_written(&self) -> u64 {
        self.inner.writer.lock().await.rows_written()
    }

    /// Closes the channel and returns the number of rows written. A session
    /// that failed is still closed, and reports [`BulkInsertError::Aborted`].
    pub async fn finish(self) -> Result<u64, BulkInsertError> {
        self.complete(Ok(())).await
    }

    async fn complete(self, body: Result<(), BulkInsertError>) -> Result<u64, BulkInsertError> {
        let mut writer = self.inner.writer.lock().await;
        if writer.state() == WriterState::Closed {
            return body.map(|_| writer.rows_written());
        }

        let body = match body {
            Ok(()) if self.is_failed() => Err(BulkInsertError::Aborted),
            Ok(()) => Ok(()),
            Err(err) => {
                self.inner.failed.store(true, Ordering::Release);
                Err(err)
            }
        };

        let rows = finish(&mut writer, body).await?;
        info!("Saved {} rows into {}", rows, self.inner.mapping.table());
        Ok(rows)
    }
}

/// Starts a row and writes every mapped column of `entity`.
async fn write_entity<E, S>(
    mapping: &Mapping<E>,
    writer: &mut BinaryWriter<S>,
    entity: &E,
) -> Result<(), BulkInsertError>
where
    S: Sink<Bytes>,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let row = writer.rows_written();
    writer.start_row(mapping.column_count()).await?;

    let mut fields = writer.fields()?;
    mapping.write_row(entity, &mut fields).map_err(|source| {
        error!("Failed to save entity at row {}: {}", row, source);
        BulkInsertError::SaveEntity { row, source }
    })
}

/// Closes `writer` once the session body is done, whatever its outcome.
///
/// A close failure after a failed body is only logged: the body's error is
/// the one returned.
async fn finish<S>(
    writer: &mut BinaryWriter<S>,
    body: Result<(), BulkInsertError>,
) -> Result<u64, BulkInsertError>
where
    S: Sink<Bytes>,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let closed = writer.close().await;
    match (body, closed) {
        (Ok(()), Ok(())) => Ok(writer.rows_written()),
        (Ok(()), Err(err)) => {
            error!("Failed to complete COPY: {}", err);
            Err(BulkInsertError::Teardown(err))
        }
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!("Closing the COPY stream after a failure also failed: {}", close_err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use connectors::sql::{
        base::error::DbError,
        postgres::{
            binary::BinaryCopyReader,
            handlers::{Int4Handler, TextHandler},
        },
    };
    use futures::{StreamExt, channel::mpsc, stream};
    use std::{
        io,
        pin::Pin,
        sync::Mutex as StdMutex,
        task::{Context, Poll},
    };
    use tracing_test::traced_test;

    struct Item {
        id: i32,
        label: String,
    }

    fn item(id: i32, label: &str) -> Item {
        Item {
            id,
            label: label.to_string(),
        }
    }

    fn loader() -> BulkInsert<Item> {
        let mapping = Mapping::builder("items")
            .map("id", Int4Handler, |i: &Item| i.id)
            .map_ref("label", TextHandler, |i: &Item| i.label.as_str())
            .build()
            .unwrap();
        BulkInsert::new(mapping).with_settings(CopySettings::new(64).unwrap())
    }

    /// Hands out one in-memory channel and keeps its receiving end.
    #[derive(Default)]
    struct MemoryConnection {
        statement: StdMutex<Option<String>>,
        receiver: StdMutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
    }

    impl MemoryConnection {
        async fn received(&self) -> Vec<u8> {
            let rx = self.receiver.lock().unwrap().take().unwrap();
            rx.collect::<Vec<_>>().await.concat()
        }
    }

    #[async_trait]
    impl CopyConnection for MemoryConnection {
        type Error = mpsc::SendError;
        type Sink = mpsc::UnboundedSender<Bytes>;

        async fn open_copy(&self, statement: &str) -> Result<Self::Sink, DbError> {
            let (tx, rx) = mpsc::unbounded();
            *self.statement.lock().unwrap() = Some(statement.to_string());
            *self.receiver.lock().unwrap() = Some(rx);
            Ok(tx)
        }
    }

    /// Accepts data but fails to close, like a server rejecting the COPY.
    struct RejectingSink;

    impl Sink<Bytes> for RejectingSink {
        type Error = io::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, _item: Bytes) -> Result<(), io::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Ready(Err(io::Error::other("COPY rejected")))
        }
    }

    struct RejectingConnection;

    #[async_trait]
    impl CopyConnection for RejectingConnection {
        type Error = io::Error;
        type Sink = RejectingSink;

        async fn open_copy(&self, _statement: &str) -> Result<Self::Sink, DbError> {
            Ok(RejectingSink)
        }
    }

    #[tokio::test]
    async fn test_save_all_preserves_order() {
        let conn = MemoryConnection::default();
        let items = (0..20).map(|i| item(i, &format!("item-{i}"))).collect::<Vec<_>>();

        let rows = loader().save_all(&conn, &items).await.unwrap();
        assert_eq!(rows, 20);
        assert_eq!(
            conn.statement.lock().unwrap().as_deref(),
            Some(r#"COPY "items" ("id", "label") FROM STDIN WITH (FORMAT BINARY)"#)
        );

        let parsed = BinaryCopyReader::read_all(&conn.received().await).unwrap();
        let ids = parsed
            .iter()
            .map(|row| i32::from_be_bytes(row.get(0).unwrap().try_into().unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(ids, (0..20).collect::<Vec<_>>());
        assert_eq!(parsed[3].get(1), Some(&b"item-3"[..]));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failure_stops_before_next_entity() {
        let conn = MemoryConnection::default();
        let items = vec![item(1, "ok"), item(2, "bad\0"), item(3, "never")];

        let err = loader().save_all(&conn, items).await.unwrap_err();
        match err {
            BulkInsertError::SaveEntity { row, source } => {
                assert_eq!(row, 1);
                assert_eq!(source.column, "label");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(logs_contain("Failed to save entity at row 1"));

        // Closed anyway: the stream ends with the trailer, and the third
        // entity never reached it.
        let bytes = conn.received().await;
        assert_eq!(&bytes[bytes.len() - 2..], &[0xff, 0xff]);
        assert!(!bytes.windows(5).any(|w| w == b"never"));
    }

    #[tokio::test]
    async fn test_close_failure_is_teardown() {
        let err = loader()
            .save_all(&RejectingConnection, [item(1, "a")])
            .await
            .unwrap_err();
        assert!(matches!(err, BulkInsertError::Teardown(_)));
        assert_eq!(err.to_string(), "Failed to complete COPY: Transport error: COPY rejected");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_close_failure_does_not_mask_entity_error() {
        let err = loader()
            .save_all(&RejectingConnection, [item(1, "a\0")])
            .await
            .unwrap_err();
        assert!(matches!(err, BulkInsertError::SaveEntity { row: 0, .. }));
        assert!(logs_contain("also failed"));
    }

    #[tokio::test]
    async fn test_failed_session_rejects_saves() {
        let conn = MemoryConnection::default();
        let session = loader().session(&conn).await.unwrap();

        assert_eq!(session.save(&item(1, "a")).await.unwrap(), 0);
        assert!(session.save(&item(2, "\0")).await.is_err());
        assert!(session.is_failed());
        assert!(matches!(
            session.save(&item(3, "c")).await,
            Err(BulkInsertError::Aborted)
        ));
        assert!(matches!(
            session.finish().await,
            Err(BulkInsertError::Aborted)
        ));
    }

    #[tokio::test]
    async fn test_save_stream_source_error() {
        let conn = MemoryConnection::default();
        let entities = stream::iter(vec![
            Ok(item(1, "a")),
            Err(io::Error::other("source gone")),
            Ok(item(3, "c")),
        ]);

        let err = loader().save_stream(&conn, entities, 1).await.unwrap_err();
        assert_eq!(err.to_string(), "Entity source failed: source gone");
    }

    #[tokio::test]
    async fn test_save_stream_writes_every_entity() {
        let conn = MemoryConnection::default();
        let entities = stream::iter((0..50).map(|i| Ok::<_, io::Error>(item(i, "x"))));

        let rows = loader().save_stream(&conn, entities, 8).await.unwrap();
        assert_eq!(rows, 50);

        let parsed = BinaryCopyReader::read_all(&conn.received().await).unwrap();
        let mut ids = parsed
            .iter()
            .map(|row| i32::from_be_bytes(row.get(0).unwrap().try_into().unwrap()))
            .collect::<Vec<_>>();
        ids.sort_unstable();
        assert_eq!(ids, (0..50).collect::<Vec<_>>());
    }
}
