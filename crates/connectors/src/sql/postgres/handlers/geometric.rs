use crate::sql::postgres::handlers::{EncodeError, ValueHandler, error::element_count};
use bytes::{BufMut, BytesMut};
use model::core::{Circle, Line, LineSegment, Path, PgBox, Point, Polygon};
use tokio_postgres::types::Type;

const POINT_LEN: usize = 16;

fn put_point(buf: &mut BytesMut, point: &Point) {
    buf.put_f64(point.x);
    buf.put_f64(point.y);
}

/// `point`: x then y, as two IEEE-754 doubles.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointHandler;

impl ValueHandler<Point> for PointHandler {
    fn pg_type(&self) -> Type {
        Type::POINT
    }

    fn length(&self, _value: &Point) -> Result<usize, EncodeError> {
        Ok(POINT_LEN)
    }

    fn write(&self, buf: &mut BytesMut, value: &Point) -> Result<(), EncodeError> {
        put_point(buf, value);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LineHandler;

impl ValueHandler<Line> for LineHandler {
    fn pg_type(&self) -> Type {
        Type::LINE
    }

    fn length(&self, _value: &Line) -> Result<usize, EncodeError> {
        Ok(24)
    }

    fn write(&self, buf: &mut BytesMut, value: &Line) -> Result<(), EncodeError> {
        buf.put_f64(value.a);
        buf.put_f64(value.b);
        buf.put_f64(value.c);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LsegHandler;

impl ValueHandler<LineSegment> for LsegHandler {
    fn pg_type(&self) -> Type {
        Type::LSEG
    }

    fn length(&self, _value: &LineSegment) -> Result<usize, EncodeError> {
        Ok(2 * POINT_LEN)
    }

    fn write(&self, buf: &mut BytesMut, value: &LineSegment) -> Result<(), EncodeError> {
        put_point(buf, &value.start);
        put_point(buf, &value.end);
        Ok(())
    }
}

/// `box`: the high corner, then the low corner.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxHandler;

impl ValueHandler<PgBox> for BoxHandler {
    fn pg_type(&self) -> Type {
        Type::BOX
    }

    fn length(&self, _value: &PgBox) -> Result<usize, EncodeError> {
        Ok(2 * POINT_LEN)
    }

    fn write(&self, buf: &mut BytesMut, value: &PgBox) -> Result<(), EncodeError> {
        put_point(buf, &value.high);
        put_point(buf, &value.low);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CircleHandler;

impl ValueHandler<Circle> for CircleHandler {
    fn pg_type(&self) -> Type {
        Type::CIRCLE
    }

    fn length(&self, _value: &Circle) -> Result<usize, EncodeError> {
        Ok(POINT_LEN + 8)
    }

    fn write(&self, buf: &mut BytesMut, value: &Circle) -> Result<(), EncodeError> {
        put_point(buf, &value.center);
        buf.put_f64(value.radius);
        Ok(())
    }
}

/// `path`: closed flag, point count, points.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathHandler;

impl ValueHandler<Path> for PathHandler {
    fn pg_type(&self) -> Type {
        Type::PATH
    }

    fn length(&self, value: &Path) -> Result<usize, EncodeError> {
        Ok(1 + 4 + value.points.len() * POINT_LEN)
    }

    fn write(&self, buf: &mut BytesMut, value: &Path) -> Result<(), EncodeError> {
        let count = element_count("path", value.points.len())?;
        buf.put_u8(u8::from(value.closed));
        buf.put_i32(count);
        for point in &value.points {
            put_point(buf, point);
        }
        Ok(())
    }
}

/// `polygon`: point count, points.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolygonHandler;

impl ValueHandler<Polygon> for PolygonHandler {
    fn pg_type(&self) -> Type {
        Type::POLYGON
    }

    fn length(&self, value: &Polygon) -> Result<usize, EncodeError> {
        Ok(4 + value.points.len() * POINT_LEN)
    }

    fn write(&self, buf: &mut BytesMut, value: &Polygon) -> Result<(), EncodeError> {
        let count = element_count("polygon", value.points.len())?;
        buf.put_i32(count);
        for point in &value.points {
            put_point(buf, point);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::postgres::handlers::write_prefixed;
    use crate::sql::postgres::handlers::test_support::encode;

    fn read_f64s(payload: &[u8]) -> Vec<f64> {
        payload
            .chunks_exact(8)
            .map(|chunk| f64::from_be_bytes(chunk.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_point_field_bytes() {
        let mut buf = BytesMut::new();
        write_prefixed(&PointHandler, &mut buf, Some(&Point::new(1.5, -2.25))).unwrap();

        let mut expected = vec![0, 0, 0, 16];
        expected.extend_from_slice(&1.5f64.to_be_bytes());
        expected.extend_from_slice(&(-2.25f64).to_be_bytes());
        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn test_fixed_size_shapes() {
        let line = Line::new(1.0, -1.0, 0.5);
        assert_eq!(read_f64s(&encode(&LineHandler, &line)), vec![1.0, -1.0, 0.5]);

        let lseg = LineSegment::new(Point::new(0.0, 1.0), Point::new(2.0, 3.0));
        assert_eq!(read_f64s(&encode(&LsegHandler, &lseg)), vec![0.0, 1.0, 2.0, 3.0]);

        let pg_box = PgBox::new(Point::new(0.0, 0.0), Point::new(4.0, 2.0));
        assert_eq!(read_f64s(&encode(&BoxHandler, &pg_box)), vec![4.0, 2.0, 0.0, 0.0]);

        let circle = Circle::new(Point::new(1.0, 1.0), 0.25);
        assert_eq!(read_f64s(&encode(&CircleHandler, &circle)), vec![1.0, 1.0, 0.25]);
    }

    #[test]
    fn test_path_and_polygon() {
        let points = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(1.0, 1.0)];

        let payload = encode(&PathHandler, &Path::closed(points.clone()));
        assert_eq!(payload[0], 1);
        assert_eq!(&payload[1..5], &3i32.to_be_bytes());
        assert_eq!(read_f64s(&payload[5..]), vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0]);

        let payload = encode(&PathHandler, &Path::open(vec![]));
        assert_eq!(payload, vec![0, 0, 0, 0, 0]);

        let payload = encode(&PolygonHandler, &Polygon::new(points));
        assert_eq!(payload.len(), 4 + 3 * 16);
        assert_eq!(&payload[..4], &3i32.to_be_bytes());
    }
}
