//! Encoding of weakly typed [`Value`]s into a column type chosen at runtime.

use crate::sql::postgres::handlers::{
    ArrayHandler, BoolHandler, ByteaHandler, DateHandler, EncodeError, Float4Handler,
    Float8Handler, Int2Handler, Int4Handler, Int8Handler, JsonHandler, JsonbHandler,
    NumericHandler, TextHandler, TimestampHandler, TimestamptzHandler, UuidHandler, ValueHandler,
};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use model::core::Value;
use rust_decimal::Decimal;
use std::borrow::Cow;
use tokio_postgres::types::Type;
use uuid::Uuid;

/// Encodes a [`Value`] as the column type given at construction, coercing
/// between compatible representations (an `Int` into `int2`, a `String` into
/// `uuid`, ...). `Value::Null` is written as SQL NULL.
#[derive(Debug, Clone)]
pub struct ValueTypeHandler {
    target: Type,
}

impl ValueTypeHandler {
    /// Returns `None` when values cannot be coerced to `target`.
    pub fn new(target: Type) -> Option<Self> {
        Self::supports(&target).then_some(Self { target })
    }

    pub fn supports(target: &Type) -> bool {
        [
            Type::BOOL,
            Type::INT2,
            Type::INT4,
            Type::INT8,
            Type::FLOAT4,
            Type::FLOAT8,
            Type::NUMERIC,
            Type::TEXT,
            Type::VARCHAR,
            Type::BPCHAR,
            Type::NAME,
            Type::BYTEA,
            Type::UUID,
            Type::JSON,
            Type::JSONB,
            Type::DATE,
            Type::TIMESTAMP,
            Type::TIMESTAMPTZ,
            Type::TEXT_ARRAY,
            Type::VARCHAR_ARRAY,
        ]
        .contains(target)
    }

    pub fn target(&self) -> &Type {
        &self.target
    }

    fn mismatch(&self, value: &Value) -> EncodeError {
        EncodeError::unsupported(
            format!("{} value {value}", value.kind()),
            self.target.name(),
        )
    }

    fn coerce<'a>(&self, value: &'a Value) -> Result<Coerced<'a>, EncodeError> {
        let target = &self.target;
        let coerced = match *target {
            Type::BOOL => Coerced::Bool(value.as_bool().ok_or_else(|| self.mismatch(value))?),
            Type::INT2 | Type::INT4 | Type::INT8 => {
                let v = match value {
                    Value::Uint(v) => {
                        i64::try_from(*v).map_err(|_| EncodeError::out_of_range(v, "i64"))?
                    }
                    _ => value.as_i64().ok_or_else(|| self.mismatch(value))?,
                };
                match *target {
                    Type::INT2 => Coerced::Int2(v),
                    Type::INT4 => Coerced::Int4(v),
                    _ => Coerced::Int8(v),
                }
            }
            Type::FLOAT4 => {
                let v = value.as_f64().ok_or_else(|| self.mismatch(value))?;
                let narrowed = v as f32;
                if v.is_finite() && narrowed.is_infinite() {
                    return Err(EncodeError::out_of_range(v, "f32"));
                }
                Coerced::Float4(narrowed)
            }
            Type::FLOAT8 => Coerced::Float8(value.as_f64().ok_or_else(|| self.mismatch(value))?),
            Type::NUMERIC => Coerced::Numeric(self.decimal(value)?),
            Type::BYTEA => match value {
                Value::Bytes(bytes) => Coerced::Bytea(bytes),
                Value::String(s) => Coerced::Bytea(s.as_bytes()),
                _ => return Err(self.mismatch(value)),
            },
            Type::UUID => match value {
                Value::Uuid(id) => Coerced::Uuid(*id),
                Value::String(s) => {
                    Coerced::Uuid(Uuid::parse_str(s.trim()).map_err(|_| self.mismatch(value))?)
                }
                _ => return Err(self.mismatch(value)),
            },
            Type::JSON | Type::JSONB => {
                let json = match value {
                    Value::Json(json) => Cow::Borrowed(json),
                    Value::String(s) => {
                        Cow::Owned(serde_json::from_str(s).map_err(|_| self.mismatch(value))?)
                    }
                    other => Cow::Owned(serde_json::to_value(other)?),
                };
                if *target == Type::JSON {
                    Coerced::Json(json)
                } else {
                    Coerced::Jsonb(json)
                }
            }
            Type::DATE => match value {
                Value::Date(date) => Coerced::Date(*date),
                Value::Timestamp(ts) => Coerced::Date(ts.date_naive()),
                Value::String(s) => Coerced::Date(
                    s.trim()
                        .parse::<NaiveDate>()
                        .map_err(|_| self.mismatch(value))?,
                ),
                _ => return Err(self.mismatch(value)),
            },
            Type::TIMESTAMP | Type::TIMESTAMPTZ => {
                let ts = self.timestamp(value)?;
                if *target == Type::TIMESTAMP {
                    Coerced::Timestamp(ts.naive_utc())
                } else {
                    Coerced::Timestamptz(ts)
                }
            }
            Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => match value {
                Value::StringArray(items) => Coerced::TextArray(items),
                _ => return Err(self.mismatch(value)),
            },
            _ => Coerced::Text(self.text(value)?),
        };
        Ok(coerced)
    }

    fn decimal(&self, value: &Value) -> Result<Decimal, EncodeError> {
        match value {
            Value::Int(v) => Ok(Decimal::from(*v)),
            Value::Uint(v) => Ok(Decimal::from(*v)),
            Value::Float(v) => Decimal::try_from(*v).map_err(|_| self.mismatch(value)),
            Value::String(s) => s.trim().parse::<Decimal>().map_err(|_| self.mismatch(value)),
            _ => Err(self.mismatch(value)),
        }
    }

    fn timestamp(&self, value: &Value) -> Result<DateTime<Utc>, EncodeError> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            Value::Date(date) => date
                .and_hms_opt(0, 0, 0)
                .map(|naive| naive.and_utc())
                .ok_or_else(|| self.mismatch(value)),
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|ts| ts.with_timezone(&Utc))
                .or_else(|_| {
                    s.trim()
                        .parse::<NaiveDateTime>()
                        .map(|naive| naive.and_utc())
                })
                .map_err(|_| self.mismatch(value)),
            _ => Err(self.mismatch(value)),
        }
    }

    fn text<'a>(&self, value: &'a Value) -> Result<Cow<'a, str>, EncodeError> {
        Ok(match value {
            Value::String(s) => Cow::Borrowed(s.as_str()),
            Value::Enum(_, variant) => Cow::Borrowed(variant.as_str()),
            Value::Int(v) => Cow::Owned(v.to_string()),
            Value::Uint(v) => Cow::Owned(v.to_string()),
            Value::Float(v) => Cow::Owned(v.to_string()),
            Value::Boolean(v) => Cow::Owned(v.to_string()),
            Value::Uuid(v) => Cow::Owned(v.to_string()),
            Value::Json(v) => Cow::Owned(v.to_string()),
            Value::Date(v) => Cow::Owned(v.to_string()),
            Value::Timestamp(v) => Cow::Owned(v.to_rfc3339()),
            Value::Bytes(_) | Value::StringArray(_) | Value::Null => {
                return Err(self.mismatch(value));
            }
        })
    }
}

/// A [`Value`] converted to the Rust type a typed handler accepts.
enum Coerced<'a> {
    Bool(bool),
    Int2(i64),
    Int4(i64),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    Text(Cow<'a, str>),
    Bytea(&'a [u8]),
    Uuid(Uuid),
    Json(Cow<'a, serde_json::Value>),
    Jsonb(Cow<'a, serde_json::Value>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Timestamptz(DateTime<Utc>),
    TextArray(&'a [String]),
}

impl Coerced<'_> {
    fn length(&self) -> Result<usize, EncodeError> {
        match self {
            Coerced::Bool(v) => BoolHandler.length(v),
            Coerced::Int2(v) => Int2Handler.length(v),
            Coerced::Int4(v) => Int4Handler.length(v),
            Coerced::Int8(v) => Int8Handler.length(v),
            Coerced::Float4(v) => Float4Handler.length(v),
            Coerced::Float8(v) => Float8Handler.length(v),
            Coerced::Numeric(v) => NumericHandler.length(v),
            Coerced::Text(v) => TextHandler.length(v),
            Coerced::Bytea(v) => ByteaHandler.length(*v),
            Coerced::Uuid(v) => UuidHandler.length(v),
            Coerced::Json(v) => JsonHandler.length(v),
            Coerced::Jsonb(v) => JsonbHandler.length(v),
            Coerced::Date(v) => DateHandler.length(v),
            Coerced::Timestamp(v) => TimestampHandler.length(v),
            Coerced::Timestamptz(v) => TimestamptzHandler.length(v),
            Coerced::TextArray(v) => ArrayHandler::new(TextHandler).length(*v),
        }
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        match self {
            Coerced::Bool(v) => BoolHandler.write(buf, v),
            Coerced::Int2(v) => Int2Handler.write(buf, v),
            Coerced::Int4(v) => Int4Handler.write(buf, v),
            Coerced::Int8(v) => Int8Handler.write(buf, v),
            Coerced::Float4(v) => Float4Handler.write(buf, v),
            Coerced::Float8(v) => Float8Handler.write(buf, v),
            Coerced::Numeric(v) => NumericHandler.write(buf, v),
            Coerced::Text(v) => TextHandler.write(buf, v),
            Coerced::Bytea(v) => ByteaHandler.write(buf, *v),
            Coerced::Uuid(v) => UuidHandler.write(buf, v),
            Coerced::Json(v) => JsonHandler.write(buf, v),
            Coerced::Jsonb(v) => JsonbHandler.write(buf, v),
            Coerced::Date(v) => DateHandler.write(buf, v),
            Coerced::Timestamp(v) => TimestampHandler.write(buf, v),
            Coerced::Timestamptz(v) => TimestamptzHandler.write(buf, v),
            Coerced::TextArray(v) => ArrayHandler::new(TextHandler).write(buf, *v),
        }
    }
}

impl ValueHandler<Value> for ValueTypeHandler {
    fn pg_type(&self) -> Type {
        self.target.clone()
    }

    fn is_null(&self, value: &Value) -> bool {
        value.is_null()
    }

    fn length(&self, value: &Value) -> Result<usize, EncodeError> {
        self.coerce(value)?.length()
    }

    fn write(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        self.coerce(value)?.write(buf)
    }
}
