//! Payload decoder (§4.4 step 1, "Payload decoder" in the component table).
//!
//! Turns a message's raw bytes into a structured intermediate based on
//! its [`Encoding`] tag, per `orchestrator/serialization.py::decode_payload`:
//! `json` parses to a JSON value, `jpeg`/`base64` unwrap to raw bytes,
//! `npz` unpacks to a named-array mapping, anything else passes the
//! bytes through unchanged.

use std::collections::HashMap;
use std::io::Read;

use base64::Engine;
use bytes::Bytes;
use serde_json::Value;

use crate::error::PipelineError;
use crate::message::{EdgeMessage, Encoding};
use crate::wire::DType;

/// One array recovered from an `.npz` archive.
#[derive(Debug, Clone)]
pub struct NamedArray {
    pub dtype: DType,
    pub shape: Vec<i64>,
    pub data: Bytes,
}

/// Structured intermediate a connector's raw payload decodes into.
#[derive(Debug, Clone)]
pub enum Payload {
    Json(Value),
    Bytes(Bytes),
    NamedArrays(HashMap<String, NamedArray>),
}

/// Exhaustive match over the closed `Encoding` set (REDESIGN FLAGS
/// "Payload decoding dispatch"): adding a format is a compile-time
/// concern rather than a runtime string lookup.
pub fn decode(message: &EdgeMessage) -> Result<Payload, PipelineError> {
    match message.encoding {
        Encoding::Json => {
            let value: Value = serde_json::from_slice(&message.payload)
                .map_err(|e| PipelineError::Preprocess(format!("invalid json payload: {e}")))?;
            Ok(Payload::Json(value))
        }
        Encoding::Jpeg => Ok(Payload::Bytes(Bytes::copy_from_slice(&message.payload))),
        Encoding::Base64 => {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(&message.payload)
                .map_err(|e| PipelineError::Preprocess(format!("invalid base64 payload: {e}")))?;
            Ok(Payload::Bytes(Bytes::from(decoded)))
        }
        Encoding::Npz => decode_npz(&message.payload).map(Payload::NamedArrays),
        Encoding::Bgr | Encoding::Raw => Ok(Payload::Bytes(Bytes::copy_from_slice(&message.payload))),
    }
}

/// Unpack a `.npz` archive (a zip of `.npy` files) into a named-array map.
fn decode_npz(bytes: &[u8]) -> Result<HashMap<String, NamedArray>, PipelineError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| PipelineError::Preprocess(format!("invalid npz archive: {e}")))?;

    let mut arrays = HashMap::with_capacity(archive.len());
    for idx in 0..archive.len() {
        let mut entry = archive
            .by_index(idx)
            .map_err(|e| PipelineError::Preprocess(format!("invalid npz entry: {e}")))?;
        let name = entry
            .name()
            .trim_end_matches(".npy")
            .to_string();
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buf)
            .map_err(|e| PipelineError::Preprocess(format!("failed reading npz entry: {e}")))?;
        let array = parse_npy(&buf)?;
        arrays.insert(name, array);
    }
    Ok(arrays)
}

/// Parse a single `.npy` (v1.0/v2.0) buffer: magic, version, header
/// dict (ASCII), then raw row-major bytes.
fn parse_npy(buf: &[u8]) -> Result<NamedArray, PipelineError> {
    const MAGIC: &[u8] = b"\x93NUMPY";
    if buf.len() < MAGIC.len() + 4 || &buf[..MAGIC.len()] != MAGIC {
        return Err(PipelineError::Preprocess("npy magic mismatch".to_string()));
    }
    let major = buf[MAGIC.len()];
    let mut offset = MAGIC.len() + 2; // skip magic + major/minor
    let (header_len, header_start) = if major == 1 {
        let len = u16::from_le_bytes([buf[offset], buf[offset + 1]]) as usize;
        (len, offset + 2)
    } else {
        let len = u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
            as usize;
        (len, offset + 4)
    };
    offset = header_start + header_len;
    if buf.len() < offset {
        return Err(PipelineError::Preprocess("npy header truncated".to_string()));
    }
    let header = std::str::from_utf8(&buf[header_start..header_start + header_len])
        .map_err(|_| PipelineError::Preprocess("npy header is not utf-8".to_string()))?;

    let descr = extract_dict_str(header, "descr")
        .ok_or_else(|| PipelineError::Preprocess("npy header missing descr".to_string()))?;
    let dtype = match descr.trim_start_matches(['<', '>', '|']) {
        "f4" => DType::Float32,
        "f2" => DType::Float16,
        "i1" => DType::Int8,
        "i4" => DType::Int32,
        other => {
            return Err(PipelineError::Preprocess(format!(
                "unsupported npy dtype '{other}'"
            )))
        }
    };
    let shape = extract_shape(header)
        .ok_or_else(|| PipelineError::Preprocess("npy header missing shape".to_string()))?;

    Ok(NamedArray {
        dtype,
        shape,
        data: Bytes::copy_from_slice(&buf[offset..]),
    })
}

fn extract_dict_str(header: &str, key: &str) -> Option<String> {
    let marker = format!("'{key}':");
    let start = header.find(&marker)? + marker.len();
    let rest = header[start..].trim_start();
    let rest = rest.strip_prefix('\'')?;
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

fn extract_shape(header: &str) -> Option<Vec<i64>> {
    let marker = "'shape':";
    let start = header.find(marker)? + marker.len();
    let rest = header[start..].trim_start();
    let rest = rest.strip_prefix('(')?;
    let end = rest.find(')')?;
    let inner = &rest[..end];
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{EdgeMessage, Encoding};

    #[test]
    fn decodes_json_payload() {
        let msg = EdgeMessage::new("s1", br#"{"a":1.0}"#.to_vec(), Encoding::Json);
        match decode(&msg).unwrap() {
            Payload::Json(Value::Object(map)) => assert_eq!(map["a"], 1.0),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn decodes_base64_payload() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"hello");
        let msg = EdgeMessage::new("s1", encoded.into_bytes(), Encoding::Base64);
        match decode(&msg).unwrap() {
            Payload::Bytes(b) => assert_eq!(&b[..], b"hello"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn unknown_encoding_passes_bytes_through() {
        let msg = EdgeMessage::new("s1", vec![1, 2, 3], Encoding::Raw);
        match decode(&msg).unwrap() {
            Payload::Bytes(b) => assert_eq!(&b[..], &[1, 2, 3]),
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
