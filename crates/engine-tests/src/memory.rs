//! An in-memory stand-in for a Postgres connection: every `open_copy`
//! returns the sending half of a channel and keeps the receiving half.

use async_trait::async_trait;
use bytes::Bytes;
use connectors::sql::base::{connection::CopyConnection, error::DbError};
use futures::{Sink, StreamExt, channel::mpsc, task::AtomicWaker};
use std::{
    io,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};

#[derive(Default)]
pub struct MemoryConnection {
    statements: Mutex<Vec<String>>,
    receivers: Mutex<Vec<mpsc::UnboundedReceiver<Bytes>>>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements issued so far, oldest first.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    /// Every byte sent on the oldest channel not yet taken. Waits until the
    /// channel is closed or its sender is dropped.
    pub async fn take_stream(&self) -> Vec<u8> {
        let rx = self.receivers.lock().unwrap().remove(0);
        rx.collect::<Vec<_>>().await.concat()
    }

    /// The chunks of the oldest channel, as the writer flushed them.
    pub async fn take_chunks(&self) -> Vec<Bytes> {
        let rx = self.receivers.lock().unwrap().remove(0);
        rx.collect().await
    }
}

#[async_trait]
impl CopyConnection for MemoryConnection {
    type Error = mpsc::SendError;
    type Sink = mpsc::UnboundedSender<Bytes>;

    async fn open_copy(&self, statement: &str) -> Result<Self::Sink, DbError> {
        let (tx, rx) = mpsc::unbounded();
        self.statements.lock().unwrap().push(statement.to_string());
        self.receivers.lock().unwrap().push(rx);
        Ok(tx)
    }
}

/// Refuses to open a channel, like a COPY naming a missing table.
pub struct RefusingConnection;

#[async_trait]
impl CopyConnection for RefusingConnection {
    type Error = io::Error;
    type Sink = BrokenSink;

    async fn open_copy(&self, statement: &str) -> Result<Self::Sink, DbError> {
        Err(DbError::Transport(
            format!("relation does not exist: {statement}").into(),
        ))
    }
}

/// Accepts `capacity` chunks, then fails like a dropped connection.
pub struct BrokenSink {
    capacity: usize,
}

impl Sink<Bytes> for BrokenSink {
    type Error = io::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(mut self: Pin<&mut Self>, _item: Bytes) -> Result<(), io::Error> {
        if self.capacity == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection lost"));
        }
        self.capacity -= 1;
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Hands out sinks that break after `capacity` chunks.
pub struct BrokenConnection {
    pub capacity: usize,
}

#[async_trait]
impl CopyConnection for BrokenConnection {
    type Error = io::Error;
    type Sink = BrokenSink;

    async fn open_copy(&self, _statement: &str) -> Result<Self::Sink, DbError> {
        Ok(BrokenSink {
            capacity: self.capacity,
        })
    }
}

#[derive(Default)]
struct Gate {
    shut: AtomicBool,
    waker: AtomicWaker,
    chunks: Mutex<Vec<Bytes>>,
}

/// A channel whose sink can be held busy, like a server that stops reading.
#[derive(Clone, Default)]
pub struct GatedConnection {
    gate: Arc<Gate>,
}

impl GatedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// While shut, the sink reports itself not ready.
    pub fn set_shut(&self, shut: bool) {
        self.gate.shut.store(shut, Ordering::SeqCst);
        if !shut {
            self.gate.waker.wake();
        }
    }

    /// Every byte the sink accepted so far.
    pub fn bytes(&self) -> Vec<u8> {
        self.gate.chunks.lock().unwrap().concat()
    }
}

#[async_trait]
impl CopyConnection for GatedConnection {
    type Error = io::Error;
    type Sink = GatedSink;

    async fn open_copy(&self, _statement: &str) -> Result<Self::Sink, DbError> {
        Ok(GatedSink {
            gate: Arc::clone(&self.gate),
        })
    }
}

pub struct GatedSink {
    gate: Arc<Gate>,
}

impl Sink<Bytes> for GatedSink {
    type Error = io::Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        self.gate.waker.register(cx.waker());
        if self.gate.shut.load(Ordering::SeqCst) {
            Poll::Pending
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<(), io::Error> {
        self.gate.chunks.lock().unwrap().push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }
}
