use crate::sql::postgres::handlers::{EncodeError, ValueHandler};
use bytes::{BufMut, BytesMut};
use std::net::IpAddr;
use tokio_postgres::types::Type;

// Address family codes used by the server, not the OS values.
const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// `inet` holding a single host address (full netmask).
#[derive(Debug, Clone, Copy, Default)]
pub struct InetHandler;

impl ValueHandler<IpAddr> for InetHandler {
    fn pg_type(&self) -> Type {
        Type::INET
    }

    fn length(&self, value: &IpAddr) -> Result<usize, EncodeError> {
        Ok(match value {
            IpAddr::V4(_) => 4 + 4,
            IpAddr::V6(_) => 4 + 16,
        })
    }

    fn write(&self, buf: &mut BytesMut, value: &IpAddr) -> Result<(), EncodeError> {
        match value {
            IpAddr::V4(addr) => {
                buf.put_slice(&[PGSQL_AF_INET, 32, 0, 4]);
                buf.put_slice(&addr.octets());
            }
            IpAddr::V6(addr) => {
                buf.put_slice(&[PGSQL_AF_INET6, 128, 0, 16]);
                buf.put_slice(&addr.octets());
            }
        }
        Ok(())
    }
}
