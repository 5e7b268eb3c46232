//! Parser for binary copy streams, the inverse of the writer's framing.
//! Payloads are returned raw; decoding them is left to the caller.

use crate::sql::postgres::binary::{HEADER_FLAGS, SIGNATURE, TRAILER};
use bytes::Buf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("stream does not start with the binary COPY signature")]
    BadSignature,

    #[error("unsupported header flags {0:#x}")]
    UnsupportedFlags(i32),

    #[error("unexpected end of stream at offset {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("invalid field count {count} at offset {offset}")]
    InvalidFieldCount { offset: usize, count: i16 },

    #[error("invalid field length {len} at offset {offset}")]
    InvalidFieldLength { offset: usize, len: i32 },

    #[error("stream ended without a trailer")]
    MissingTrailer,

    #[error("{0} bytes after the trailer")]
    TrailingBytes(usize),
}

/// One row: each field's payload, `None` for NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRow {
    fields: Vec<Option<Vec<u8>>>,
}

impl CopyRow {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Payload of field `idx`; `None` when the field is NULL or absent.
    pub fn get(&self, idx: usize) -> Option<&[u8]> {
        self.fields.get(idx)?.as_deref()
    }

    pub fn is_null(&self, idx: usize) -> bool {
        matches!(self.fields.get(idx), Some(None))
    }

    pub fn fields(&self) -> &[Option<Vec<u8>>] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<Option<Vec<u8>>> {
        self.fields
    }
}

/// Iterates the rows of a complete stream held in memory.
///
/// The header is checked by [`new`](Self::new). Iteration stops after the
/// trailer, or at the first error; bytes after the trailer are an error.
pub struct BinaryCopyReader<'a> {
    data: &'a [u8],
    total: usize,
    done: bool,
}

impl<'a> BinaryCopyReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, ReadError> {
        let mut reader = Self {
            data,
            total: data.len(),
            done: false,
        };
        reader.read_header()?;
        Ok(reader)
    }

    /// Parses `data` into rows, requiring a well-formed header and trailer.
    pub fn read_all(data: &'a [u8]) -> Result<Vec<CopyRow>, ReadError> {
        Self::new(data)?.collect()
    }

    fn offset(&self) -> usize {
        self.total - self.data.len()
    }

    fn ensure(&self, needed: usize) -> Result<(), ReadError> {
        if self.data.remaining() < needed {
            return Err(ReadError::Truncated {
                offset: self.offset(),
                needed: needed - self.data.remaining(),
            });
        }
        Ok(())
    }

    fn read_header(&mut self) -> Result<(), ReadError> {
        if !self.data.starts_with(SIGNATURE) {
            return Err(ReadError::BadSignature);
        }
        self.data.advance(SIGNATURE.len());

        self.ensure(8)?;
        let flags = self.data.get_i32();
        if flags != HEADER_FLAGS {
            return Err(ReadError::UnsupportedFlags(flags));
        }
        let extension = self.data.get_i32();
        let extension = usize::try_from(extension).map_err(|_| ReadError::InvalidFieldLength {
            offset: self.offset() - 4,
            len: extension,
        })?;
        self.ensure(extension)?;
        self.data.advance(extension);
        Ok(())
    }

    fn read_row(&mut self) -> Result<Option<CopyRow>, ReadError> {
        if self.data.is_empty() {
            return Err(ReadError::MissingTrailer);
        }
        self.ensure(2)?;
        let offset = self.offset();
        let count = self.data.get_i16();
        if count == TRAILER {
            if !self.data.is_empty() {
                return Err(ReadError::TrailingBytes(self.data.len()));
            }
            return Ok(None);
        }
        let count =
            usize::try_from(count).map_err(|_| ReadError::InvalidFieldCount { offset, count })?;

        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            self.ensure(4)?;
            let offset = self.offset();
            let len = self.data.get_i32();
            if len == -1 {
                fields.push(None);
                continue;
            }
            let size =
                usize::try_from(len).map_err(|_| ReadError::InvalidFieldLength { offset, len })?;
            self.ensure(size)?;
            fields.push(Some(self.data[..size].to_vec()));
            self.data.advance(size);
        }
        Ok(Some(CopyRow { fields }))
    }
}

impl Iterator for BinaryCopyReader<'_> {
    type Item = Result<CopyRow, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::postgres::binary::HEADER_LEN;

    fn header() -> Vec<u8> {
        let mut data = SIGNATURE.to_vec();
        data.extend_from_slice(&[0; 8]);
        data
    }

    #[test]
    fn test_reads_rows_and_nulls() {
        let mut data = header();
        data.extend_from_slice(&[0, 2, 0, 0, 0, 1, b'a', 0xff, 0xff, 0xff, 0xff]);
        data.extend_from_slice(&[0, 1, 0, 0, 0, 0]);
        data.extend_from_slice(&[0xff, 0xff]);

        let rows = BinaryCopyReader::read_all(&data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(0), Some(&b"a"[..]));
        assert!(rows[0].is_null(1));
        assert_eq!(rows[1].get(0), Some(&b""[..]));
        assert!(!rows[1].is_null(0));
    }

    #[test]
    fn test_rejects_malformed_streams() {
        assert_eq!(
            BinaryCopyReader::read_all(b"PGCOPY\n").unwrap_err(),
            ReadError::BadSignature
        );

        let data = header();
        assert_eq!(
            BinaryCopyReader::read_all(&data).unwrap_err(),
            ReadError::MissingTrailer
        );

        let mut data = header();
        data.extend_from_slice(&[0, 1, 0, 0, 0, 9, 1, 2]);
        assert_eq!(
            BinaryCopyReader::read_all(&data).unwrap_err(),
            ReadError::Truncated {
                offset: HEADER_LEN + 6,
                needed: 7
            }
        );

        let mut data = header();
        data.extend_from_slice(&[0xff, 0xff, 0]);
        assert_eq!(
            BinaryCopyReader::read_all(&data).unwrap_err(),
            ReadError::TrailingBytes(1)
        );

        let mut data = SIGNATURE.to_vec();
        data.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            BinaryCopyReader::new(&data),
            Err(ReadError::UnsupportedFlags(0x10000))
        ));
    }
}
