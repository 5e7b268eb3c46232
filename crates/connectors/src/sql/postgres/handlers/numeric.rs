use crate::sql::postgres::handlers::{EncodeError, ValueHandler};
use bytes::{BufMut, BytesMut};
use rust_decimal::Decimal;
use std::fmt::Display;
use tokio_postgres::types::Type;

macro_rules! integer_handler {
    ($(#[$doc:meta])* $name:ident, $int:ty, $pg_type:expr, $put:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl<T> ValueHandler<T> for $name
        where
            T: TryInto<$int> + Copy + Display,
        {
            fn pg_type(&self) -> Type {
                $pg_type
            }

            fn length(&self, _value: &T) -> Result<usize, EncodeError> {
                Ok(size_of::<$int>())
            }

            fn write(&self, buf: &mut BytesMut, value: &T) -> Result<(), EncodeError> {
                let v: $int = (*value)
                    .try_into()
                    .map_err(|_| EncodeError::out_of_range(value, stringify!($int)))?;
                buf.$put(v);
                Ok(())
            }
        }
    };
}

integer_handler!(
    /// `int2`: any integer that fits in an `i16`.
    Int2Handler,
    i16,
    Type::INT2,
    put_i16
);
integer_handler!(
    /// `int4`: any integer that fits in an `i32`.
    Int4Handler,
    i32,
    Type::INT4,
    put_i32
);
integer_handler!(
    /// `int8`: any integer that fits in an `i64`.
    Int8Handler,
    i64,
    Type::INT8,
    put_i64
);

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolHandler;

impl ValueHandler<bool> for BoolHandler {
    fn pg_type(&self) -> Type {
        Type::BOOL
    }

    fn length(&self, _value: &bool) -> Result<usize, EncodeError> {
        Ok(1)
    }

    fn write(&self, buf: &mut BytesMut, value: &bool) -> Result<(), EncodeError> {
        buf.put_u8(u8::from(*value));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Float4Handler;

impl ValueHandler<f32> for Float4Handler {
    fn pg_type(&self) -> Type {
        Type::FLOAT4
    }

    fn length(&self, _value: &f32) -> Result<usize, EncodeError> {
        Ok(4)
    }

    fn write(&self, buf: &mut BytesMut, value: &f32) -> Result<(), EncodeError> {
        buf.put_f32(*value);
        Ok(())
    }
}

/// `float8`: any value losslessly convertible to `f64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Float8Handler;

impl<T> ValueHandler<T> for Float8Handler
where
    T: Into<f64> + Copy,
{
    fn pg_type(&self) -> Type {
        Type::FLOAT8
    }

    fn length(&self, _value: &T) -> Result<usize, EncodeError> {
        Ok(8)
    }

    fn write(&self, buf: &mut BytesMut, value: &T) -> Result<(), EncodeError> {
        buf.put_f64((*value).into());
        Ok(())
    }
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NBASE: u128 = 10_000;

/// `numeric`, sent as base-10000 digit groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericHandler;

/// A decimal split into the fields of the server's numeric representation.
#[derive(Debug, PartialEq, Eq)]
struct NumericParts {
    weight: i16,
    sign: u16,
    scale: u16,
    digits: Vec<i16>,
}

impl NumericParts {
    fn from_decimal(value: &Decimal) -> Self {
        let scale = value.scale();
        let mantissa = value.mantissa().unsigned_abs();
        let divisor = 10u128.pow(scale);
        let mut int_part = mantissa / divisor;
        let frac_part = mantissa % divisor;

        let mut int_groups = Vec::new();
        while int_part > 0 {
            int_groups.push((int_part % NBASE) as i16);
            int_part /= NBASE;
        }
        int_groups.reverse();
        let mut weight = int_groups.len() as i16 - 1;

        // Left-align the fraction on a group boundary.
        let pad = (4 - scale % 4) % 4;
        let frac_groups = (scale + pad) / 4;
        let frac_scaled = frac_part * 10u128.pow(pad);
        let mut digits = int_groups;
        for i in (0..frac_groups).rev() {
            digits.push(((frac_scaled / NBASE.pow(i)) % NBASE) as i16);
        }

        while digits.last() == Some(&0) {
            digits.pop();
        }
        let leading_zeros = digits.iter().take_while(|d| **d == 0).count();
        digits.drain(..leading_zeros);
        weight -= leading_zeros as i16;

        if digits.is_empty() {
            weight = 0;
        }

        let sign = if value.is_sign_negative() && !digits.is_empty() {
            NUMERIC_NEG
        } else {
            NUMERIC_POS
        };

        Self {
            weight,
            sign,
            scale: scale as u16,
            digits,
        }
    }
}

impl ValueHandler<Decimal> for NumericHandler {
    fn pg_type(&self) -> Type {
        Type::NUMERIC
    }

    fn length(&self, value: &Decimal) -> Result<usize, EncodeError> {
        Ok(8 + 2 * NumericParts::from_decimal(value).digits.len())
    }

    fn write(&self, buf: &mut BytesMut, value: &Decimal) -> Result<(), EncodeError> {
        let parts = NumericParts::from_decimal(value);
        buf.put_i16(parts.digits.len() as i16);
        buf.put_i16(parts.weight);
        buf.put_u16(parts.sign);
        buf.put_u16(parts.scale);
        for digit in parts.digits {
            buf.put_i16(digit);
        }
        Ok(())
    }
}
