//! Record Module
//!
//! Time-stamped data points as they arrive from clients.
//!
//! A [`TsRecord`] carries one timestamp for one device and any number of
//! measurement values taken at that instant.

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

/// Declared type of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float,
    Double,
    Text,
}

impl DataType {
    /// Fixed in-memory width of a value, 0 for variable-width text
    pub fn value_size(self) -> usize {
        match self {
            DataType::Boolean => 1,
            DataType::Int32 | DataType::Float => 4,
            DataType::Int64 | DataType::Double => 8,
            DataType::Text => 0,
        }
    }

    /// Tag byte used by the durable file encoding
    pub fn as_u8(self) -> u8 {
        match self {
            DataType::Boolean => 0,
            DataType::Int32 => 1,
            DataType::Int64 => 2,
            DataType::Float => 3,
            DataType::Double => 4,
            DataType::Text => 5,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(DataType::Boolean),
            1 => Some(DataType::Int32),
            2 => Some(DataType::Int64),
            3 => Some(DataType::Float),
            4 => Some(DataType::Double),
            5 => Some(DataType::Text),
            _ => None,
        }
    }
}

/// A single typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Text(String),
}

impl Value {
    /// Parse the string form of a value of the given type
    pub fn parse(data_type: DataType, raw: &str) -> Result<Self> {
        let invalid = || AtlasError::InvalidValue {
            data_type,
            value: raw.to_string(),
        };
        let trimmed = raw.trim();
        let value = match data_type {
            DataType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => Value::Boolean(true),
                "false" | "0" => Value::Boolean(false),
                _ => return Err(invalid()),
            },
            DataType::Int32 => Value::Int32(trimmed.parse().map_err(|_| invalid())?),
            DataType::Int64 => Value::Int64(trimmed.parse().map_err(|_| invalid())?),
            DataType::Float => Value::Float(trimmed.parse().map_err(|_| invalid())?),
            DataType::Double => Value::Double(trimmed.parse().map_err(|_| invalid())?),
            DataType::Text => Value::Text(raw.to_string()),
        };
        Ok(value)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Value::Boolean(_) => DataType::Boolean,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Text(_) => DataType::Text,
        }
    }

    /// Bytes this value occupies in a memtable
    pub fn mem_size(&self) -> usize {
        match self {
            Value::Text(s) => s.len(),
            other => other.data_type().value_size(),
        }
    }
}

/// One measurement value inside a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub measurement: String,
    pub value: Value,
}

impl DataPoint {
    pub fn new(measurement: impl Into<String>, value: Value) -> Self {
        Self {
            measurement: measurement.into(),
            value,
        }
    }
}

/// All values of one device at one timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsRecord {
    pub device: String,
    pub time: i64,
    pub points: Vec<DataPoint>,
}

impl TsRecord {
    pub fn new(device: impl Into<String>, time: i64) -> Self {
        Self {
            device: device.into(),
            time,
            points: Vec::new(),
        }
    }

    /// Add a measurement value (builder style)
    pub fn with_point(mut self, measurement: impl Into<String>, value: Value) -> Self {
        self.points.push(DataPoint::new(measurement, value));
        self
    }

    /// Estimated memory footprint once buffered
    ///
    /// 8 bytes for the timestamp, plus each point's measurement name and
    /// value width.
    pub fn mem_size(&self) -> u64 {
        let points: usize = self
            .points
            .iter()
            .map(|p| p.measurement.len() + p.value.mem_size())
            .sum();
        8 + points as u64
    }
}

/// A (timestamp, value) pair read back from a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeValuePair {
    pub time: i64,
    pub value: Value,
}

impl TimeValuePair {
    pub fn new(time: i64, value: Value) -> Self {
        Self { time, value }
    }
}
