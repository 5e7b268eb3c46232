use crate::sql::postgres::handlers::{
    EncodeError, ValueHandler, error::element_count, write_prefixed,
};
use bytes::{BufMut, BytesMut};
use tokio_postgres::types::Type;

/// ndim, has-null flag and element OID.
const ARRAY_HEADER_LEN: usize = 12;
/// Size and lower bound of the single dimension.
const DIMENSION_LEN: usize = 8;

/// Maps an element type to its one-dimensional array type.
pub fn array_type_of(element: &Type) -> Type {
    let known = [
        (Type::BOOL, Type::BOOL_ARRAY),
        (Type::INT2, Type::INT2_ARRAY),
        (Type::INT4, Type::INT4_ARRAY),
        (Type::INT8, Type::INT8_ARRAY),
        (Type::FLOAT4, Type::FLOAT4_ARRAY),
        (Type::FLOAT8, Type::FLOAT8_ARRAY),
        (Type::NUMERIC, Type::NUMERIC_ARRAY),
        (Type::TEXT, Type::TEXT_ARRAY),
        (Type::VARCHAR, Type::VARCHAR_ARRAY),
        (Type::BYTEA, Type::BYTEA_ARRAY),
        (Type::UUID, Type::UUID_ARRAY),
        (Type::JSON, Type::JSON_ARRAY),
        (Type::JSONB, Type::JSONB_ARRAY),
        (Type::DATE, Type::DATE_ARRAY),
        (Type::TIME, Type::TIME_ARRAY),
        (Type::TIMESTAMP, Type::TIMESTAMP_ARRAY),
        (Type::TIMESTAMPTZ, Type::TIMESTAMPTZ_ARRAY),
        (Type::INTERVAL, Type::INTERVAL_ARRAY),
        (Type::POINT, Type::POINT_ARRAY),
        (Type::LINE, Type::LINE_ARRAY),
        (Type::LSEG, Type::LSEG_ARRAY),
        (Type::BOX, Type::BOX_ARRAY),
        (Type::CIRCLE, Type::CIRCLE_ARRAY),
        (Type::PATH, Type::PATH_ARRAY),
        (Type::POLYGON, Type::POLYGON_ARRAY),
        (Type::INET, Type::INET_ARRAY),
    ];

    known
        .into_iter()
        .find(|(item, _)| item == element)
        .map_or(Type::ANYARRAY, |(_, array)| array)
}

fn array_len<'a, T, H, I>(element: &H, items: I) -> Result<usize, EncodeError>
where
    T: 'a,
    H: ValueHandler<T>,
    I: ExactSizeIterator<Item = Option<&'a T>>,
{
    if items.len() == 0 {
        return Ok(ARRAY_HEADER_LEN);
    }

    let mut len = ARRAY_HEADER_LEN + DIMENSION_LEN;
    for item in items {
        len += 4;
        if let Some(value) = item
            && !element.is_null(value)
        {
            len += element.length(value)?;
        }
    }
    Ok(len)
}

fn write_array<'a, T, H, I>(element: &H, buf: &mut BytesMut, items: I) -> Result<(), EncodeError>
where
    T: 'a,
    H: ValueHandler<T>,
    I: ExactSizeIterator<Item = Option<&'a T>> + Clone,
{
    let count = element_count("array", items.len())?;
    let has_null = items
        .clone()
        .any(|item| item.is_none_or(|value| element.is_null(value)));

    buf.put_i32(if count == 0 { 0 } else { 1 });
    buf.put_i32(i32::from(has_null));
    buf.put_u32(element.pg_type().oid());
    if count == 0 {
        return Ok(());
    }

    buf.put_i32(count);
    buf.put_i32(1);
    for item in items {
        write_prefixed(element, buf, item)?;
    }
    Ok(())
}

/// One-dimensional array of non-null elements, each encoded by `H`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayHandler<H> {
    element: H,
}

impl<H> ArrayHandler<H> {
    pub fn new(element: H) -> Self {
        Self { element }
    }
}

impl<T, H> ValueHandler<[T]> for ArrayHandler<H>
where
    H: ValueHandler<T>,
{
    fn pg_type(&self) -> Type {
        array_type_of(&self.element.pg_type())
    }

    fn length(&self, value: &[T]) -> Result<usize, EncodeError> {
        array_len(&self.element, value.iter().map(Some))
    }

    fn write(&self, buf: &mut BytesMut, value: &[T]) -> Result<(), EncodeError> {
        write_array(&self.element, buf, value.iter().map(Some))
    }
}

impl<T, H> ValueHandler<Vec<T>> for ArrayHandler<H>
where
    H: ValueHandler<T>,
{
    fn pg_type(&self) -> Type {
        array_type_of(&self.element.pg_type())
    }

    fn length(&self, value: &Vec<T>) -> Result<usize, EncodeError> {
        <Self as ValueHandler<[T]>>::length(self, value)
    }

    fn write(&self, buf: &mut BytesMut, value: &Vec<T>) -> Result<(), EncodeError> {
        <Self as ValueHandler<[T]>>::write(self, buf, value)
    }
}

/// One-dimensional array whose elements may be NULL.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullableArrayHandler<H> {
    element: H,
}

impl<H> NullableArrayHandler<H> {
    pub fn new(element: H) -> Self {
        Self { element }
    }
}

impl<T, H> ValueHandler<[Option<T>]> for NullableArrayHandler<H>
where
    H: ValueHandler<T>,
{
    fn pg_type(&self) -> Type {
        array_type_of(&self.element.pg_type())
    }

    fn length(&self, value: &[Option<T>]) -> Result<usize, EncodeError> {
        array_len(&self.element, value.iter().map(Option::as_ref))
    }

    fn write(&self, buf: &mut BytesMut, value: &[Option<T>]) -> Result<(), EncodeError> {
        write_array(&self.element, buf, value.iter().map(Option::as_ref))
    }
}

impl<T, H> ValueHandler<Vec<Option<T>>> for NullableArrayHandler<H>
where
    H: ValueHandler<T>,
{
    fn pg_type(&self) -> Type {
        array_type_of(&self.element.pg_type())
    }

    fn length(&self, value: &Vec<Option<T>>) -> Result<usize, EncodeError> {
        <Self as ValueHandler<[Option<T>]>>::length(self, value)
    }

    fn write(&self, buf: &mut BytesMut, value: &Vec<Option<T>>) -> Result<(), EncodeError> {
        <Self as ValueHandler<[Option<T>]>>::write(self, buf, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::postgres::handlers::test_support::encode;
    use crate::sql::postgres::handlers::{Int4Handler, PointHandler, TextHandler};
    use model::core::Point;
    use tokio_postgres::types::FromSql;

    #[test]
    fn test_int_array_round_trip() {
        let values = vec![1i32, -2, 300_000];
        let payload = encode(&ArrayHandler::new(Int4Handler), &values);
        assert_eq!(Vec::<i32>::from_sql(&Type::INT4_ARRAY, &payload).unwrap(), values);
    }

    #[test]
    fn test_text_array_round_trip() {
        let values = vec!["a".to_string(), String::new(), "ünï".to_string()];
        let handler = ArrayHandler::new(TextHandler);
        assert_eq!(ValueHandler::<Vec<String>>::pg_type(&handler), Type::TEXT_ARRAY);

        let payload = encode(&handler, &values);
        assert_eq!(Vec::<String>::from_sql(&Type::TEXT_ARRAY, &payload).unwrap(), values);
    }

    #[test]
    fn test_empty_array_has_no_dimensions() {
        let payload = encode(&ArrayHandler::new(Int4Handler), &Vec::<i32>::new());
        assert_eq!(payload.len(), ARRAY_HEADER_LEN);
        assert_eq!(&payload[..4], &0i32.to_be_bytes());
        assert!(Vec::<i32>::from_sql(&Type::INT4_ARRAY, &payload).unwrap().is_empty());
    }

    #[test]
    fn test_nullable_array_sets_null_flag() {
        let values = vec![Some(7i32), None, Some(9)];
        let payload = encode(&NullableArrayHandler::new(Int4Handler), &values);

        assert_eq!(&payload[4..8], &1i32.to_be_bytes());
        assert_eq!(
            Vec::<Option<i32>>::from_sql(&Type::INT4_ARRAY, &payload).unwrap(),
            values
        );
    }

    #[test]
    fn test_array_element_oid_comes_from_handler() {
        let payload = encode(&ArrayHandler::new(PointHandler), &vec![Point::new(1.0, 2.0)]);
        assert_eq!(&payload[8..12], &Type::POINT.oid().to_be_bytes());
        assert_eq!(payload.len(), ARRAY_HEADER_LEN + DIMENSION_LEN + 4 + 16);
    }
}
