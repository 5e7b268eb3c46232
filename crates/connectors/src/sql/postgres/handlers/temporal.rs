use crate::sql::postgres::handlers::{EncodeError, ValueHandler};
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use model::core::Interval;
use tokio_postgres::types::Type;

/// `NaiveDate::num_days_from_ce` of 2000-01-01, the server's epoch.
const PG_EPOCH_DAYS_FROM_CE: i32 = 730_120;
/// Unix timestamp of 2000-01-01T00:00:00Z, in microseconds.
const PG_EPOCH_UNIX_MICROS: i64 = 946_684_800_000_000;

fn micros_since_pg_epoch(unix_micros: i64) -> Result<i64, EncodeError> {
    unix_micros
        .checked_sub(PG_EPOCH_UNIX_MICROS)
        .ok_or_else(|| EncodeError::out_of_range(unix_micros, "timestamp"))
}

/// `date`: days since 2000-01-01.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateHandler;

impl ValueHandler<NaiveDate> for DateHandler {
    fn pg_type(&self) -> Type {
        Type::DATE
    }

    fn length(&self, _value: &NaiveDate) -> Result<usize, EncodeError> {
        Ok(4)
    }

    fn write(&self, buf: &mut BytesMut, value: &NaiveDate) -> Result<(), EncodeError> {
        buf.put_i32(value.num_days_from_ce() - PG_EPOCH_DAYS_FROM_CE);
        Ok(())
    }
}

/// `time` (without time zone): microseconds since midnight.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeHandler;

impl ValueHandler<NaiveTime> for TimeHandler {
    fn pg_type(&self) -> Type {
        Type::TIME
    }

    fn length(&self, _value: &NaiveTime) -> Result<usize, EncodeError> {
        Ok(8)
    }

    fn write(&self, buf: &mut BytesMut, value: &NaiveTime) -> Result<(), EncodeError> {
        // A leap second is folded into the last second of the minute.
        let micros = i64::from(value.num_seconds_from_midnight()) * 1_000_000
            + i64::from(value.nanosecond().min(999_999_999) / 1_000);
        buf.put_i64(micros);
        Ok(())
    }
}

/// `timestamp` (without time zone): microseconds since 2000-01-01.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampHandler;

impl ValueHandler<NaiveDateTime> for TimestampHandler {
    fn pg_type(&self) -> Type {
        Type::TIMESTAMP
    }

    fn length(&self, _value: &NaiveDateTime) -> Result<usize, EncodeError> {
        Ok(8)
    }

    fn write(&self, buf: &mut BytesMut, value: &NaiveDateTime) -> Result<(), EncodeError> {
        buf.put_i64(micros_since_pg_epoch(value.and_utc().timestamp_micros())?);
        Ok(())
    }
}

/// `timestamptz`: the instant in UTC, microseconds since 2000-01-01.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestamptzHandler;

impl<Tz> ValueHandler<DateTime<Tz>> for TimestamptzHandler
where
    Tz: TimeZone,
{
    fn pg_type(&self) -> Type {
        Type::TIMESTAMPTZ
    }

    fn length(&self, _value: &DateTime<Tz>) -> Result<usize, EncodeError> {
        Ok(8)
    }

    fn write(&self, buf: &mut BytesMut, value: &DateTime<Tz>) -> Result<(), EncodeError> {
        buf.put_i64(micros_since_pg_epoch(value.timestamp_micros())?);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalHandler;

impl ValueHandler<Interval> for IntervalHandler {
    fn pg_type(&self) -> Type {
        Type::INTERVAL
    }

    fn length(&self, _value: &Interval) -> Result<usize, EncodeError> {
        Ok(16)
    }

    fn write(&self, buf: &mut BytesMut, value: &Interval) -> Result<(), EncodeError> {
        buf.put_i64(value.microseconds);
        buf.put_i32(value.days);
        buf.put_i32(value.months);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::postgres::handlers::test_support::encode;
    use chrono::{FixedOffset, Utc};
    use tokio_postgres::types::FromSql;

    #[test]
    fn test_epoch_constants() {
        let epoch = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        assert_eq!(epoch.num_days_from_ce(), PG_EPOCH_DAYS_FROM_CE);
        assert_eq!(
            epoch.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_micros(),
            PG_EPOCH_UNIX_MICROS
        );
    }

    #[test]
    fn test_date_round_trip() {
        let epoch = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        assert_eq!(encode(&DateHandler, &epoch), vec![0, 0, 0, 0]);

        for date in [
            NaiveDate::from_ymd_opt(1999, 12, 31).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            NaiveDate::from_ymd_opt(1900, 6, 15).unwrap(),
        ] {
            let payload = encode(&DateHandler, &date);
            assert_eq!(NaiveDate::from_sql(&Type::DATE, &payload).unwrap(), date);
        }
    }

    #[test]
    fn test_time_round_trip() {
        let time = NaiveTime::from_hms_micro_opt(23, 59, 58, 123_456).unwrap();
        let payload = encode(&TimeHandler, &time);
        assert_eq!(NaiveTime::from_sql(&Type::TIME, &payload).unwrap(), time);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let ts = NaiveDate::from_ymd_opt(1987, 7, 14)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 678_901)
            .unwrap();
        let payload = encode(&TimestampHandler, &ts);
        assert_eq!(NaiveDateTime::from_sql(&Type::TIMESTAMP, &payload).unwrap(), ts);
    }

    #[test]
    fn test_timestamptz_normalizes_to_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2021, 3, 4, 12, 0, 0).unwrap();
        let payload = encode(&TimestamptzHandler, &local);

        let decoded = DateTime::<Utc>::from_sql(&Type::TIMESTAMPTZ, &payload).unwrap();
        assert_eq!(decoded, Utc.with_ymd_and_hms(2021, 3, 4, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_interval_layout() {
        let payload = encode(&IntervalHandler, &Interval::new(14, 3, 5_000_000));
        assert_eq!(&payload[..8], &5_000_000i64.to_be_bytes());
        assert_eq!(&payload[8..12], &3i32.to_be_bytes());
        assert_eq!(&payload[12..], &14i32.to_be_bytes());
    }
}
