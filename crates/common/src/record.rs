//! Records and their uniqueness key

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary key of a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Two-axis position of a record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i32,
    pub y: f64,
}

impl Coordinates {
    pub fn new(x: i32, y: f64) -> Self {
        Self { x, y }
    }

    /// Uniqueness key for these coordinates
    pub fn key(&self) -> CoordinateKey {
        CoordinateKey::new(self.x, self.y)
    }
}

/// Deterministic, hashable encoding of a coordinate pair
///
/// `y` is stored by bit pattern with `-0.0` folded onto `0.0` and every NaN
/// folded onto one canonical NaN, so equal coordinates always produce equal
/// keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoordinateKey {
    x: i32,
    y_bits: u64,
}

impl CoordinateKey {
    pub fn new(x: i32, y: f64) -> Self {
        let y = if y == 0.0 {
            0.0
        } else if y.is_nan() {
            f64::NAN
        } else {
            y
        };
        Self {
            x,
            y_bits: y.to_bits(),
        }
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> f64 {
        f64::from_bits(self.y_bits)
    }

    /// Fixed-width big-endian encoding, used as a storage key
    pub fn to_bytes(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[..4].copy_from_slice(&self.x.to_be_bytes());
        out[4..].copy_from_slice(&self.y_bits.to_be_bytes());
        out
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y())
    }
}

/// A record handled by the import workflow
///
/// Field-level validation belongs to the record model; the coordinator only
/// relies on `coordinates` as the uniqueness key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl Record {
    pub fn new(name: impl Into<String>, coordinates: Option<Coordinates>) -> Self {
        Self {
            name: name.into(),
            coordinates,
            attributes: serde_json::Value::Null,
        }
    }

    pub fn with_attributes(mut self, attributes: serde_json::Value) -> Self {
        self.attributes = attributes;
        self
    }

    /// Uniqueness key, if the record has coordinates
    pub fn coordinate_key(&self) -> Option<CoordinateKey> {
        self.coordinates.map(|c| c.key())
    }
}
