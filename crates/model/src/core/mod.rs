pub mod geometric;
pub mod interval;
pub mod value;

pub use geometric::{Circle, Line, LineSegment, Path, PgBox, Point, Polygon};
pub use interval::Interval;
pub use value::Value;
