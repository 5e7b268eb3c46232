//! Framing of the binary `COPY ... FROM STDIN` stream.
//!
//! ```text
//! header:  PGCOPY\n\xff\r\n\0 | i32 flags | i32 extension length
//! row:     i16 field count | (i32 length | payload)*   length -1 = NULL
//! trailer: i16 -1
//! ```

pub mod error;
pub mod field;
pub mod reader;
pub mod writer;

pub use error::{ProtocolError, WriterError};
pub use field::FieldWriter;
pub use reader::{BinaryCopyReader, CopyRow, ReadError};
pub use writer::{BinaryWriter, WriterState};

/// First 11 bytes of every binary copy stream.
pub const SIGNATURE: &[u8; 11] = b"PGCOPY\n\xff\r\n\0";
/// Header flags. Bit 16 would announce OIDs in every row, which is never used.
pub const HEADER_FLAGS: i32 = 0;
pub const HEADER_EXTENSION_LEN: i32 = 0;
/// Written in place of a field count to end the stream.
pub const TRAILER: i16 = -1;
/// Signature plus flags plus extension length.
pub const HEADER_LEN: usize = SIGNATURE.len() + 4 + 4;
