use crate::sql::postgres::{
    binary::error::{ProtocolError, WriterError},
    handlers::{NULL_LENGTH, ValueHandler, write_prefixed},
};
use bytes::{BufMut, BytesMut};

/// Field count declared by the current row and how many were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RowProgress {
    pub(crate) expected: usize,
    pub(crate) written: usize,
}

impl RowProgress {
    pub(crate) fn new(expected: usize) -> Self {
        Self {
            expected,
            written: 0,
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.written == self.expected
    }
}

/// Writes the fields of the row currently open on a
/// [`BinaryWriter`](super::BinaryWriter). Not generic over the sink.
pub struct FieldWriter<'a> {
    buf: &'a mut BytesMut,
    row: &'a mut RowProgress,
}

impl<'a> FieldWriter<'a> {
    pub(crate) fn new(buf: &'a mut BytesMut, row: &'a mut RowProgress) -> Self {
        Self { buf, row }
    }

    /// Writes one field: `None`, or a value the handler reports as null,
    /// becomes SQL NULL.
    ///
    /// On an encoding error the partial field is removed from the buffer
    /// and the row stays one field short.
    pub fn write_field<T, H>(&mut self, handler: &H, value: Option<&T>) -> Result<(), WriterError>
    where
        T: ?Sized,
        H: ValueHandler<T> + ?Sized,
    {
        self.reserve_field()?;

        let mark = self.buf.len();
        if let Err(err) = write_prefixed(handler, self.buf, value) {
            self.buf.truncate(mark);
            return Err(err.into());
        }

        self.row.written += 1;
        Ok(())
    }

    pub fn write_null(&mut self) -> Result<(), WriterError> {
        self.reserve_field()?;
        self.buf.put_i32(NULL_LENGTH);
        self.row.written += 1;
        Ok(())
    }

    /// Fields still expected in the current row.
    pub fn remaining(&self) -> usize {
        self.row.expected - self.row.written
    }

    fn reserve_field(&self) -> Result<(), WriterError> {
        if self.row.is_complete() {
            return Err(ProtocolError::ExtraField.into());
        }
        Ok(())
    }
}
