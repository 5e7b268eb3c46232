use crate::sql::{base::error::BoxError, postgres::handlers::EncodeError};
use thiserror::Error;

/// Misuse of the writer's call sequence. These are bugs in the caller, not
/// data problems, and leave the stream unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("writer is already open")]
    AlreadyOpened,

    #[error("writer is not open")]
    NotOpen,

    #[error("row with {count} fields exceeds the maximum of {}", i16::MAX)]
    TooManyFields { count: usize },

    #[error("previous row declared {expected} fields but only {written} were written")]
    IncompleteRow { expected: usize, written: usize },

    #[error("field written outside of a row, or past the declared field count")]
    ExtraField,
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("COPY protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// The sink rejected a chunk or failed to close.
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),
}

impl WriterError {
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        WriterError::Transport(Box::new(err))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, WriterError::Protocol(_))
    }
}
