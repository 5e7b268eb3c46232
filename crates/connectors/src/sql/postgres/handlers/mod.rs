//! Encoders for the per-field payloads of the binary `COPY` format.
//!
//! A [`ValueHandler`] knows how to turn one Rust value into the exact bytes
//! the server expects for one column type. Handlers never write the 4-byte
//! length prefix or the NULL sentinel themselves; that framing is done once,
//! in [`write_prefixed`], for every handler.

use bytes::{BufMut, BytesMut};
use tokio_postgres::types::Type;

pub mod array;
pub mod character;
pub mod dynamic;
pub mod error;
pub mod geometric;
pub mod network;
pub mod numeric;
pub mod temporal;

pub use array::{ArrayHandler, NullableArrayHandler};
pub use character::{ByteaHandler, JsonHandler, JsonbHandler, TextHandler, UuidHandler};
pub use dynamic::ValueTypeHandler;
pub use error::EncodeError;
pub use geometric::{
    BoxHandler, CircleHandler, LineHandler, LsegHandler, PathHandler, PointHandler,
    PolygonHandler,
};
pub use network::InetHandler;
pub use numeric::{
    BoolHandler, Float4Handler, Float8Handler, Int2Handler, Int4Handler, Int8Handler,
    NumericHandler,
};
pub use temporal::{
    DateHandler, IntervalHandler, TimeHandler, TimestampHandler, TimestamptzHandler,
};

/// Length prefix that marks a NULL field.
pub const NULL_LENGTH: i32 = -1;

/// Encodes values of type `T` for one Postgres column type.
pub trait ValueHandler<T: ?Sized>: Send + Sync {
    /// The Postgres type this handler produces. Used for array element OIDs.
    fn pg_type(&self) -> Type;

    /// Whether `value` must be sent as SQL NULL. Only handlers over dynamic
    /// values need to override this.
    fn is_null(&self, _value: &T) -> bool {
        false
    }

    /// Number of payload bytes [`ValueHandler::write`] will produce for
    /// `value`, not counting the length prefix.
    fn length(&self, value: &T) -> Result<usize, EncodeError>;

    /// Appends the payload for `value` to `buf`.
    fn write(&self, buf: &mut BytesMut, value: &T) -> Result<(), EncodeError>;
}

/// Writes one length-prefixed field: `-1` for NULL, otherwise the payload
/// length followed by the payload.
///
/// The handler's reported length is checked against the bytes it actually
/// wrote, since a mismatch would desynchronize every following field.
pub fn write_prefixed<T, H>(
    handler: &H,
    buf: &mut BytesMut,
    value: Option<&T>,
) -> Result<(), EncodeError>
where
    T: ?Sized,
    H: ValueHandler<T> + ?Sized,
{
    let value = match value {
        Some(value) if !handler.is_null(value) => value,
        _ => {
            buf.put_i32(NULL_LENGTH);
            return Ok(());
        }
    };

    let expected = handler.length(value)?;
    let prefix = i32::try_from(expected).map_err(|_| EncodeError::TooLarge { len: expected })?;

    buf.reserve(4 + expected);
    buf.put_i32(prefix);
    let start = buf.len();
    handler.write(buf, value)?;

    let written = buf.len() - start;
    if written != expected {
        return Err(EncodeError::LengthMismatch {
            pg_type: handler.pg_type().name().to_string(),
            expected,
            written,
        });
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{ValueHandler, write_prefixed};
    use bytes::BytesMut;

    /// Encodes `value` with `handler` and returns the payload only, after
    /// checking that the length prefix and the reported length agree.
    pub fn encode<T, H>(handler: &H, value: &T) -> Vec<u8>
    where
        T: ?Sized,
        H: ValueHandler<T>,
    {
        let mut buf = BytesMut::new();
        write_prefixed(handler, &mut buf, Some(value)).expect("encode");

        let prefix = i32::from_be_bytes(buf[..4].try_into().unwrap());
        let payload = buf[4..].to_vec();
        assert_eq!(prefix as usize, payload.len(), "length prefix");
        assert_eq!(handler.length(value).unwrap(), payload.len(), "reported length");
        payload
    }
}
