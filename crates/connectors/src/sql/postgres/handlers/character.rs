use crate::sql::postgres::handlers::{EncodeError, ValueHandler};
use bytes::{BufMut, BytesMut};
use serde::Serialize;
use std::io;
use tokio_postgres::types::Type;
use uuid::Uuid;

const JSONB_VERSION: u8 = 1;

/// `text` (and `varchar`/`bpchar` columns, which accept the same encoding).
#[derive(Debug, Clone, Copy, Default)]
pub struct TextHandler;

impl<T> ValueHandler<T> for TextHandler
where
    T: AsRef<str> + ?Sized,
{
    fn pg_type(&self) -> Type {
        Type::TEXT
    }

    fn length(&self, value: &T) -> Result<usize, EncodeError> {
        Ok(value.as_ref().len())
    }

    fn write(&self, buf: &mut BytesMut, value: &T) -> Result<(), EncodeError> {
        let text = value.as_ref();
        // The server rejects NUL in text values, and fails the whole COPY
        // when it finds one.
        if let Some(offset) = text.bytes().position(|b| b == 0) {
            return Err(EncodeError::NulInText { offset });
        }
        buf.put_slice(text.as_bytes());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ByteaHandler;

impl<T> ValueHandler<T> for ByteaHandler
where
    T: AsRef<[u8]> + ?Sized,
{
    fn pg_type(&self) -> Type {
        Type::BYTEA
    }

    fn length(&self, value: &T) -> Result<usize, EncodeError> {
        Ok(value.as_ref().len())
    }

    fn write(&self, buf: &mut BytesMut, value: &T) -> Result<(), EncodeError> {
        buf.put_slice(value.as_ref());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidHandler;

impl ValueHandler<Uuid> for UuidHandler {
    fn pg_type(&self) -> Type {
        Type::UUID
    }

    fn length(&self, _value: &Uuid) -> Result<usize, EncodeError> {
        Ok(16)
    }

    fn write(&self, buf: &mut BytesMut, value: &Uuid) -> Result<(), EncodeError> {
        buf.put_slice(value.as_bytes());
        Ok(())
    }
}

/// Counts serialized bytes without keeping them.
#[derive(Default)]
struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.0 += bytes.len();
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn json_len<T: Serialize + ?Sized>(value: &T) -> Result<usize, EncodeError> {
    let mut counter = ByteCounter::default();
    serde_json::to_writer(&mut counter, value)?;
    Ok(counter.0)
}

/// `json`: any serializable value, sent as its JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHandler;

impl<T> ValueHandler<T> for JsonHandler
where
    T: Serialize + ?Sized,
{
    fn pg_type(&self) -> Type {
        Type::JSON
    }

    fn length(&self, value: &T) -> Result<usize, EncodeError> {
        json_len(value)
    }

    fn write(&self, buf: &mut BytesMut, value: &T) -> Result<(), EncodeError> {
        serde_json::to_writer(buf.writer(), value)?;
        Ok(())
    }
}

/// `jsonb`: a version byte followed by the JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonbHandler;

impl<T> ValueHandler<T> for JsonbHandler
where
    T: Serialize + ?Sized,
{
    fn pg_type(&self) -> Type {
        Type::JSONB
    }

    fn length(&self, value: &T) -> Result<usize, EncodeError> {
        Ok(1 + json_len(value)?)
    }

    fn write(&self, buf: &mut BytesMut, value: &T) -> Result<(), EncodeError> {
        buf.put_u8(JSONB_VERSION);
        serde_json::to_writer(buf.writer(), value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::postgres::handlers::test_support::encode;
    use serde_json::json;
    use tokio_postgres::types::FromSql;

    #[test]
    fn test_text_round_trip() {
        let payload = encode(&TextHandler, "zürich");
        assert_eq!(payload.len(), "zürich".len());
        assert_eq!(String::from_sql(&Type::TEXT, &payload).unwrap(), "zürich");

        let owned = String::from("owned");
        assert_eq!(encode(&TextHandler, &owned), b"owned".to_vec());
        assert!(encode(&TextHandler, "").is_empty());
    }

    #[test]
    fn test_text_rejects_nul() {
        let mut buf = BytesMut::new();
        let err = TextHandler.write(&mut buf, "ab\0c").unwrap_err();
        assert!(matches!(err, EncodeError::NulInText { offset: 2 }));
    }

    #[test]
    fn test_bytea_and_uuid() {
        let bytes = vec![0u8, 1, 255];
        assert_eq!(encode(&ByteaHandler, &bytes), bytes);

        let id = Uuid::new_v4();
        let payload = encode(&UuidHandler, &id);
        assert_eq!(Uuid::from_sql(&Type::UUID, &payload).unwrap(), id);
    }

    #[test]
    fn test_json_and_jsonb_round_trip() {
        let doc = json!({"name": "box", "sizes": [1, 2, 3], "nested": {"ok": true}});

        let payload = encode(&JsonHandler, &doc);
        let decoded = serde_json::Value::from_sql(&Type::JSON, &payload).unwrap();
        assert_eq!(decoded, doc);

        let payload = encode(&JsonbHandler, &doc);
        assert_eq!(payload[0], JSONB_VERSION);
        let decoded = serde_json::Value::from_sql(&Type::JSONB, &payload).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn test_json_accepts_serializable_structs() {
        #[derive(Serialize)]
        struct Tag<'a> {
            key: &'a str,
            weight: u8,
        }

        let payload = encode(&JsonbHandler, &Tag { key: "k", weight: 3 });
        assert_eq!(&payload[1..], br#"{"key":"k","weight":3}"#);
    }
}
