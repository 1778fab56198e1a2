//! The one fully-worked preprocess/postprocess plugin pair, grounded in
//! `orchestrator/plugins/env.py`. Environmental sensors (temperature,
//! humidity, pressure, ...) report a flat JSON object of numeric
//! readings; `vector_to_tensor` packs the sorted values into a single
//! `float32` tensor, and the two postprocess variants turn the
//! gateway's response back into agent-facing JSON.

use bytes::Bytes;
use serde_json::{json, Value};

use crate::error::PipelineError;
use crate::gateway::InferenceResult;
use crate::message::EdgeMessage;
use crate::payload::Payload;
use crate::wire::{DType, TensorDescriptor};

/// Pack a reading into a `[1, n]` float32 tensor. A JSON object is
/// filtered to its numeric fields, taken in sorted-key order so
/// encode/decode agree on which column is which reading without
/// carrying names over the wire; a JSON array is taken as an
/// already-ordered flat vector. Anything else is rejected.
pub fn vector_to_tensor(
    message: &mut EdgeMessage,
    payload: &Payload,
) -> Result<Vec<TensorDescriptor>, PipelineError> {
    let values: Vec<f32> = match payload {
        Payload::Json(Value::Object(map)) => {
            let mut keys: Vec<&String> = map
                .keys()
                .filter(|k| map[*k].is_number())
                .collect();
            keys.sort();

            let values = keys.iter().map(|key| map[*key].as_f64().unwrap() as f32).collect();

            message
                .metadata
                .extra
                .insert("env_fields".to_string(), json!(keys));

            values
        }
        Payload::Json(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| PipelineError::Preprocess(format!("array element '{v}' is not numeric")))
            })
            .collect::<Result<Vec<f64>, _>>()?
            .into_iter()
            .map(|v| v as f32)
            .collect(),
        _ => {
            return Err(PipelineError::Preprocess(
                "env.vector_to_tensor requires a json object or list payload".to_string(),
            ));
        }
    };

    let mut raw = Vec::with_capacity(values.len() * 4);
    for v in &values {
        raw.extend_from_slice(&v.to_le_bytes());
    }

    Ok(vec![TensorDescriptor::new(
        DType::Float32,
        vec![1, values.len() as i32],
        Bytes::from(raw),
    )])
}

/// Pass the gateway's first output vector straight through as a named
/// list, pairing the sensor id back with the inferred values.
pub fn identity_vector(
    response: &InferenceResult,
    message: &EdgeMessage,
) -> Result<Value, PipelineError> {
    let floats = first_output_as_f32(response)?;
    Ok(json!({
        "sensor": message.sensor_id,
        "vector": floats,
    }))
}

/// Top-k softmax over the gateway's first output vector, matching
/// `env.py::softmax_topk`'s classification postprocess. Returns a bare
/// `[{index, confidence}, ...]` list, not wrapped in a sensor envelope.
pub fn softmax_topk(
    response: &InferenceResult,
    _message: &EdgeMessage,
) -> Result<Value, PipelineError> {
    const K: usize = 3;
    let logits = first_output_as_f32(response)?;
    if logits.is_empty() {
        return Err(PipelineError::Postprocess(
            "env.softmax_topk requires a non-empty output vector".to_string(),
        ));
    }

    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    let probs: Vec<f32> = exps.iter().map(|&e| e / sum).collect();

    let mut ranked: Vec<(usize, f32)> = probs.iter().cloned().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    ranked.truncate(K.min(ranked.len()));

    let top: Vec<Value> = ranked
        .into_iter()
        .map(|(index, confidence)| json!({"index": index, "confidence": confidence}))
        .collect();

    Ok(Value::Array(top))
}

fn first_output_as_f32(response: &InferenceResult) -> Result<Vec<f32>, PipelineError> {
    let blob = response
        .outputs
        .first()
        .ok_or_else(|| PipelineError::Postprocess("gateway response has no outputs".to_string()))?;
    if blob.len() % 4 != 0 {
        return Err(PipelineError::Postprocess(
            "output blob length is not a multiple of 4".to_string(),
        ));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Encoding;

    #[test]
    fn vector_to_tensor_packs_sorted_fields() {
        let mut msg = EdgeMessage::new(
            "s1",
            br#"{"temp": 21.5, "humidity": 40.0}"#.to_vec(),
            Encoding::Json,
        );
        let payload = Payload::Json(serde_json::from_slice(&msg.payload).unwrap());
        let tensors = vector_to_tensor(&mut msg, &payload).unwrap();
        assert_eq!(tensors.len(), 1);
        assert_eq!(tensors[0].dims, vec![1, 2]);
        // sorted keys: humidity, temp
        let raw = &tensors[0].raw;
        let first = f32::from_le_bytes(raw[0..4].try_into().unwrap());
        let second = f32::from_le_bytes(raw[4..8].try_into().unwrap());
        assert_eq!(first, 40.0);
        assert_eq!(second, 21.5);
        assert_eq!(
            msg.metadata.extra["env_fields"],
            json!(["humidity", "temp"])
        );
    }

    #[test]
    fn identity_vector_round_trips_sensor_and_values() {
        let msg = EdgeMessage::new("s1", b"{}".to_vec(), Encoding::Json);
        let response = InferenceResult {
            status: 0,
            outputs: vec![Bytes::copy_from_slice(&1.0f32.to_le_bytes())],
        };
        let out = identity_vector(&response, &msg).unwrap();
        assert_eq!(out["sensor"], "s1");
        assert_eq!(out["vector"], json!([1.0]));
    }

    #[test]
    fn softmax_topk_ranks_by_confidence() {
        let msg = EdgeMessage::new("s1", b"{}".to_vec(), Encoding::Json);
        let mut raw = Vec::new();
        for v in [0.1f32, 5.0, 0.2] {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        let response = InferenceResult {
            status: 0,
            outputs: vec![Bytes::from(raw)],
        };
        let out = softmax_topk(&response, &msg).unwrap();
        assert_eq!(out[0]["index"], 1);
    }

    #[test]
    fn vector_to_tensor_accepts_array_payload() {
        let mut msg = EdgeMessage::new("s1", b"[1.0, 2.0, 3.0]".to_vec(), Encoding::Json);
        let payload = Payload::Json(serde_json::from_slice(&msg.payload).unwrap());
        let tensors = vector_to_tensor(&mut msg, &payload).unwrap();
        assert_eq!(tensors[0].dims, vec![1, 3]);
        let raw = &tensors[0].raw;
        assert_eq!(f32::from_le_bytes(raw[0..4].try_into().unwrap()), 1.0);
        assert_eq!(f32::from_le_bytes(raw[4..8].try_into().unwrap()), 2.0);
        assert_eq!(f32::from_le_bytes(raw[8..12].try_into().unwrap()), 3.0);
    }

    #[test]
    fn vector_to_tensor_filters_non_numeric_object_fields() {
        let mut msg = EdgeMessage::new("s1", br#"{"a": 1.0, "name": "x", "b": 2.0}"#.to_vec(), Encoding::Json);
        let payload = Payload::Json(serde_json::from_slice(&msg.payload).unwrap());
        let tensors = vector_to_tensor(&mut msg, &payload).unwrap();
        assert_eq!(tensors[0].dims, vec![1, 2]);
        assert_eq!(msg.metadata.extra["env_fields"], json!(["a", "b"]));
    }
}
