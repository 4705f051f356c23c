//! Chunk encoding and decoding

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{AtlasError, Result};
use crate::memtable::{MemSeries, SeriesKey};
use crate::record::{DataType, TimeValuePair, Value};
use crate::storage::ChunkMetadata;

use super::CHUNK_FRAME_HEADER;

/// Decoded chunk payload
#[derive(Debug)]
pub(crate) struct DecodedChunk {
    pub device: String,
    pub measurement: String,
    pub data_type: DataType,
    pub version: u64,
    pub points: Vec<TimeValuePair>,
}

/// Append the frame for one series to `buf`, returning its metadata
///
/// Points are written sorted by time with duplicates resolved, so every
/// chunk is internally ordered.
pub(crate) fn encode_chunk(
    buf: &mut BytesMut,
    key: &SeriesKey,
    series: &MemSeries,
    version: u64,
    file_offset: u64,
) -> Result<ChunkMetadata> {
    let points = series.sorted();
    let (start_time, end_time) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (first.time, last.time),
        _ => {
            return Err(AtlasError::Storage(format!(
                "refusing to encode empty series {}",
                key
            )))
        }
    };

    let mut payload = BytesMut::new();
    put_str(&mut payload, &key.device)?;
    put_str(&mut payload, &key.measurement)?;
    payload.put_u8(series.data_type().as_u8());
    payload.put_u64_le(version);
    payload.put_u32_le(points.len() as u32);
    for point in &points {
        payload.put_i64_le(point.time);
        put_value(&mut payload, &point.value);
    }

    let crc = crc32fast::hash(&payload);
    let frame_offset = file_offset + buf.len() as u64;
    buf.put_u32_le(payload.len() as u32);
    buf.put_u32_le(crc);
    buf.extend_from_slice(&payload);

    Ok(ChunkMetadata {
        device: key.device.clone(),
        measurement: key.measurement.clone(),
        data_type: series.data_type(),
        version,
        offset: frame_offset,
        size: (CHUNK_FRAME_HEADER + payload.len()) as u32,
        num_points: points.len() as u32,
        start_time,
        end_time,
    })
}

/// Decode a full chunk frame (length + CRC + payload)
pub(crate) fn decode_chunk(frame: &[u8]) -> Result<DecodedChunk> {
    if frame.len() < CHUNK_FRAME_HEADER {
        return Err(AtlasError::Storage("chunk frame too short".to_string()));
    }
    let mut head = &frame[..CHUNK_FRAME_HEADER];
    let len = head.get_u32_le() as usize;
    let expected = head.get_u32_le();

    let payload = frame
        .get(CHUNK_FRAME_HEADER..CHUNK_FRAME_HEADER + len)
        .ok_or_else(|| AtlasError::Storage("chunk payload truncated".to_string()))?;
    let actual = crc32fast::hash(payload);
    if actual != expected {
        return Err(AtlasError::ChecksumMismatch { expected, actual });
    }

    let mut cur = payload;
    let device = get_str(&mut cur)?;
    let measurement = get_str(&mut cur)?;
    ensure(&cur, 1 + 8 + 4)?;
    let tag = cur.get_u8();
    let data_type = DataType::from_u8(tag)
        .ok_or_else(|| AtlasError::Storage(format!("unknown data type tag {}", tag)))?;
    let version = cur.get_u64_le();
    let count = cur.get_u32_le() as usize;

    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        ensure(&cur, 8)?;
        let time = cur.get_i64_le();
        let value = get_value(&mut cur, data_type)?;
        points.push(TimeValuePair::new(time, value));
    }

    Ok(DecodedChunk {
        device,
        measurement,
        data_type,
        version,
        points,
    })
}

// =============================================================================
// Private Helpers
// =============================================================================

fn put_str(buf: &mut BytesMut, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| AtlasError::Storage(format!("name too long: {} bytes", s.len())))?;
    buf.put_u16_le(len);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn get_str(cur: &mut &[u8]) -> Result<String> {
    ensure(cur, 2)?;
    let len = cur.get_u16_le() as usize;
    ensure(cur, len)?;
    let s = String::from_utf8(cur[..len].to_vec())
        .map_err(|e| AtlasError::Storage(format!("invalid utf-8 in chunk: {}", e)))?;
    cur.advance(len);
    Ok(s)
}

fn put_value(buf: &mut BytesMut, value: &Value) {
    match value {
        Value::Boolean(v) => buf.put_u8(u8::from(*v)),
        Value::Int32(v) => buf.put_i32_le(*v),
        Value::Int64(v) => buf.put_i64_le(*v),
        Value::Float(v) => buf.put_f32_le(*v),
        Value::Double(v) => buf.put_f64_le(*v),
        Value::Text(s) => {
            buf.put_u32_le(s.len() as u32);
            buf.extend_from_slice(s.as_bytes());
        }
    }
}

fn get_value(cur: &mut &[u8], data_type: DataType) -> Result<Value> {
    let value = match data_type {
        DataType::Boolean => {
            ensure(cur, 1)?;
            Value::Boolean(cur.get_u8() != 0)
        }
        DataType::Int32 => {
            ensure(cur, 4)?;
            Value::Int32(cur.get_i32_le())
        }
        DataType::Int64 => {
            ensure(cur, 8)?;
            Value::Int64(cur.get_i64_le())
        }
        DataType::Float => {
            ensure(cur, 4)?;
            Value::Float(cur.get_f32_le())
        }
        DataType::Double => {
            ensure(cur, 8)?;
            Value::Double(cur.get_f64_le())
        }
        DataType::Text => {
            ensure(cur, 4)?;
            let len = cur.get_u32_le() as usize;
            ensure(cur, len)?;
            let s = String::from_utf8(cur[..len].to_vec())
                .map_err(|e| AtlasError::Storage(format!("invalid utf-8 in chunk: {}", e)))?;
            cur.advance(len);
            Value::Text(s)
        }
    };
    Ok(value)
}

fn ensure(cur: &[u8], needed: usize) -> Result<()> {
    if cur.remaining() < needed {
        return Err(AtlasError::Storage(format!(
            "chunk truncated: need {} bytes, {} left",
            needed,
            cur.remaining()
        )));
    }
    Ok(())
}
