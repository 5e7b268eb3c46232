use crate::sql::postgres::{
    binary::{
        HEADER_EXTENSION_LEN, HEADER_FLAGS, SIGNATURE, TRAILER,
        error::{ProtocolError, WriterError},
        field::{FieldWriter, RowProgress},
    },
    handlers::ValueHandler,
};
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{Sink, SinkExt, future::poll_fn};
use std::pin::Pin;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Unopened,
    Open,
    Closed,
}

/// Encodes rows into the binary copy format and streams them to a sink.
///
/// Rows are assembled in one reusable buffer. The buffer is handed to the
/// sink as a single chunk once it holds `buffer_size` bytes, checked when the
/// next row starts, and a final time on [`close`](Self::close). A writer is
/// single use: after `close` it cannot be opened again.
pub struct BinaryWriter<S> {
    sink: Option<Pin<Box<S>>>,
    buf: BytesMut,
    buffer_size: usize,
    state: WriterState,
    row: Option<RowProgress>,
    rows_written: u64,
    bytes_sent: u64,
}

impl<S> BinaryWriter<S>
where
    S: Sink<Bytes>,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    pub fn new(buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            sink: None,
            buf: BytesMut::with_capacity(buffer_size),
            buffer_size,
            state: WriterState::Unopened,
            row: None,
            rows_written: 0,
            bytes_sent: 0,
        }
    }

    /// Binds the writer to `sink` and writes the stream header.
    pub fn open(&mut self, sink: S) -> Result<(), WriterError> {
        if self.state != WriterState::Unopened {
            return Err(ProtocolError::AlreadyOpened.into());
        }

        self.buf.put_slice(SIGNATURE);
        self.buf.put_i32(HEADER_FLAGS);
        self.buf.put_i32(HEADER_EXTENSION_LEN);

        self.sink = Some(Box::pin(sink));
        self.state = WriterState::Open;
        Ok(())
    }

    /// Starts a row of `field_count` fields. The previous row must be
    /// complete.
    pub async fn start_row(&mut self, field_count: usize) -> Result<(), WriterError> {
        self.ensure_open()?;

        if let Some(row) = self.row.filter(|row| !row.is_complete()) {
            return Err(ProtocolError::IncompleteRow {
                expected: row.expected,
                written: row.written,
            }
            .into());
        }
        let count = i16::try_from(field_count)
            .map_err(|_| ProtocolError::TooManyFields { count: field_count })?;

        if self.buf.len() >= self.buffer_size {
            self.send_buffer().await?;
        }

        self.buf.put_i16(count);
        self.row = Some(RowProgress::new(field_count));
        self.rows_written += 1;
        Ok(())
    }

    /// Field access for the current row.
    pub fn fields(&mut self) -> Result<FieldWriter<'_>, WriterError> {
        self.ensure_open()?;
        match self.row.as_mut() {
            Some(row) => Ok(FieldWriter::new(&mut self.buf, row)),
            None => Err(ProtocolError::ExtraField.into()),
        }
    }

    pub fn write_field<T, H>(&mut self, handler: &H, value: Option<&T>) -> Result<(), WriterError>
    where
        T: ?Sized,
        H: ValueHandler<T> + ?Sized,
    {
        self.fields()?.write_field(handler, value)
    }

    pub fn write_null(&mut self) -> Result<(), WriterError> {
        self.fields()?.write_null()
    }

    /// Sends whatever is buffered, regardless of the buffer threshold.
    pub async fn flush(&mut self) -> Result<(), WriterError> {
        self.ensure_open()?;
        self.send_buffer().await
    }

    /// Writes the trailer, sends the remaining bytes and closes the sink.
    ///
    /// Calling `close` again, or on a writer that was never opened, does
    /// nothing. The writer is `Closed` afterwards even when this fails; the
    /// sink is then dropped without being closed.
    pub async fn close(&mut self) -> Result<(), WriterError> {
        let was_open = self.state == WriterState::Open;
        self.state = WriterState::Closed;
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };
        if !was_open {
            return Ok(());
        }

        if let Some(row) = self.row.filter(|row| !row.is_complete()) {
            warn!(
                "Closing COPY stream after an incomplete row ({} of {} fields)",
                row.written, row.expected
            );
        }

        self.buf.put_i16(TRAILER);
        let chunk = self.buf.split().freeze();
        self.bytes_sent += chunk.len() as u64;
        sink.as_mut()
            .send(chunk)
            .await
            .map_err(WriterError::transport)?;
        sink.as_mut()
            .close()
            .await
            .map_err(WriterError::transport)?;

        debug!(
            "COPY stream closed: {} rows, {} bytes",
            self.rows_written, self.bytes_sent
        );
        Ok(())
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Rows started so far, including one still in progress.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Bytes handed to the sink so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn ensure_open(&self) -> Result<(), WriterError> {
        match self.state {
            WriterState::Open => Ok(()),
            _ => Err(ProtocolError::NotOpen.into()),
        }
    }

    async fn send_buffer(&mut self) -> Result<(), WriterError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let sink = self.sink.as_mut().ok_or(ProtocolError::NotOpen)?;

        // The buffer is only taken once the sink can accept it. A caller that
        // gives up while the sink is busy leaves every buffered row in place.
        poll_fn(|cx| sink.as_mut().poll_ready(cx))
            .await
            .map_err(WriterError::transport)?;

        let chunk = self.buf.split().freeze();
        let len = chunk.len();
        debug!("Flushing {} bytes to COPY stream", len);
        sink.as_mut()
            .start_send(chunk)
            .map_err(WriterError::transport)?;
        self.bytes_sent += len as u64;
        // `split` left the buffer without capacity.
        self.buf.reserve(self.buffer_size);

        sink.as_mut().flush().await.map_err(WriterError::transport)
    }
}

impl<S> Drop for BinaryWriter<S> {
    fn drop(&mut self) {
        if self.state == WriterState::Open {
            warn!(
                "Binary writer dropped while open after {} rows; the COPY is aborted",
                self.rows_written
            );
        }
    }
}
