#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use connectors::sql::postgres::handlers::{
    ArrayHandler, Int4Handler, Int8Handler, JsonbHandler, PointHandler, TextHandler,
    TimestamptzHandler,
};
use engine_core::mapping::Mapping;
use model::core::Point;
use serde_json::json;

/// Two-column entity used for the framing checks.
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub id: i32,
    pub name: String,
}

pub fn pairs(count: i32) -> Vec<Pair> {
    (0..count)
        .map(|id| Pair {
            id,
            name: format!("pair-{id}"),
        })
        .collect()
}

pub fn pair_mapping() -> Mapping<Pair> {
    Mapping::builder("pairs")
        .map("id", Int4Handler, |p: &Pair| p.id)
        .map_ref("name", TextHandler, |p: &Pair| p.name.as_str())
        .build()
        .expect("pair mapping")
}

/// A sensor reading, covering scalar, geometric, temporal, array, JSON and
/// nullable columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub id: i64,
    pub sensor: String,
    pub location: Point,
    pub taken_at: DateTime<Utc>,
    pub note: Option<String>,
    pub tags: Vec<String>,
    pub attrs: serde_json::Value,
}

pub fn readings(count: i64) -> Vec<Reading> {
    (0..count)
        .map(|id| Reading {
            id,
            sensor: format!("sensor-{}", id % 3),
            location: Point::new(id as f64 * 0.5, -(id as f64)),
            taken_at: Utc.timestamp_opt(1_700_000_000 + id * 60, 0).unwrap(),
            note: (id % 2 == 0).then(|| format!("note {id}")),
            tags: vec!["a".into(), format!("t{id}")],
            attrs: json!({ "seq": id }),
        })
        .collect()
}

pub fn reading_mapping(table: &str) -> Mapping<Reading> {
    Mapping::builder(table)
        .map("id", Int8Handler, |r: &Reading| r.id)
        .map_ref("sensor", TextHandler, |r: &Reading| r.sensor.as_str())
        .map("location", PointHandler, |r: &Reading| r.location)
        .map("taken_at", TimestamptzHandler, |r: &Reading| r.taken_at)
        .map_optional_ref("note", TextHandler, |r: &Reading| r.note.as_deref())
        .map_ref("tags", ArrayHandler::new(TextHandler), |r: &Reading| {
            r.tags.as_slice()
        })
        .map_ref("attrs", JsonbHandler, |r: &Reading| &r.attrs)
        .build()
        .expect("reading mapping")
}

pub const READINGS_TABLE_DDL: &str = r#"
    id BIGINT PRIMARY KEY,
    sensor TEXT NOT NULL,
    location POINT NOT NULL,
    taken_at TIMESTAMPTZ NOT NULL,
    note TEXT,
    tags TEXT[] NOT NULL,
    attrs JSONB NOT NULL
"#;

pub fn be_i32(payload: &[u8]) -> i32 {
    i32::from_be_bytes(payload.try_into().expect("4-byte field"))
}

pub fn be_i64(payload: &[u8]) -> i64 {
    i64::from_be_bytes(payload.try_into().expect("8-byte field"))
}

pub fn point(payload: &[u8]) -> Point {
    let x = f64::from_be_bytes(payload[..8].try_into().expect("x"));
    let y = f64::from_be_bytes(payload[8..16].try_into().expect("y"));
    Point::new(x, y)
}
